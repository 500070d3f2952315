//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-screening\
//!   macOS:   ~/Library/Application Support/voice-screening/
//!   Linux:   ~/.config/voice-screening/
//!
//! Data dir (models, recordings):
//!   Windows: %LOCALAPPDATA%\voice-screening\
//!   macOS:   ~/Library/Application Support/voice-screening/
//!   Linux:   ~/.local/share/voice-screening/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for `.onnx` classifier files.
    pub models_dir: PathBuf,
    /// Directory recordings are written to by default.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-screening";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
            recordings_dir: data_dir.join("recordings"),
        }
    }

    /// Resolve a model asset name against [`models_dir`](Self::models_dir).
    pub fn model_file(&self, name: impl AsRef<Path>) -> PathBuf {
        resolve_under(&self.models_dir, name.as_ref())
    }

    /// Resolve a recording name against [`recordings_dir`](Self::recordings_dir).
    pub fn recording_file(&self, name: impl AsRef<Path>) -> PathBuf {
        resolve_under(&self.recordings_dir, name.as_ref())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_under(dir: &Path, name: &Path) -> PathBuf {
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.recordings_dir.ends_with("recordings"));
    }

    #[test]
    fn relative_names_join_absolute_names_stay() {
        let paths = AppPaths::new();
        assert_eq!(
            paths.model_file("speech_model.onnx"),
            paths.models_dir.join("speech_model.onnx")
        );

        let absolute = std::env::temp_dir().join("voice_model.onnx");
        assert_eq!(paths.model_file(&absolute), absolute);
        assert_eq!(
            paths.recording_file("take.wav"),
            paths.recordings_dir.join("take.wav")
        );
    }
}
