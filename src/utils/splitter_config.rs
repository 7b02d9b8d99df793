//! Konfiguracja splittera z pliku JSON (exr_splitter.json obok pliku .exe)
//! Brak pliku oznacza ustawienia domyślne

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::processing::layer_export::ChannelPacking;
use crate::utils::error_handling::{Result, SplitError};

pub const CONFIG_FILE_NAME: &str = "exr_splitter.json";

/// Compression of the output EXR files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputCompression {
    None,
    Rle,
    Zip1,
    #[default]
    Zip16,
    Piz,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub packing: ChannelPacking,
    pub compression: OutputCompression,
    /// Delete the outputs of a run that failed part way.
    pub cleanup_on_failure: bool,
    /// File name label of the plane without a prefix.
    pub default_plane_label: String,
    /// Where outputs go; next to the input when unset.
    pub output_dir: Option<PathBuf>,
    pub output_extension: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            packing: ChannelPacking::Compact,
            compression: OutputCompression::Zip16,
            cleanup_on_failure: true,
            default_plane_label: "RGBA".to_string(),
            output_dir: None,
            output_extension: "exr".to_string(),
        }
    }
}

/// Zwraca ścieżkę do pliku konfiguracyjnego w katalogu .exe
pub fn default_config_path() -> Result<PathBuf> {
    let exe_path = env::current_exe()?;
    let exe_dir = exe_path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "executable has no parent directory")
    })?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

/// Loads the configuration.
///
/// An explicit path must exist and parse. Without one, the file next to the executable
/// is used when present, and the defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<SplitterConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    match default_config_path() {
        Ok(path) if path.exists() => load_config_from(&path),
        Ok(_) => Ok(SplitterConfig::default()),
        Err(e) => {
            log::warn!("[config] cannot locate {}: {}. Using defaults.", CONFIG_FILE_NAME, e);
            Ok(SplitterConfig::default())
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<SplitterConfig> {
    let content = fs::read_to_string(path)
        .map_err(|source| SplitError::ConfigRead { path: path.to_path_buf(), source })?;
    let config: SplitterConfig = serde_json::from_str(&content)
        .map_err(|source| SplitError::ConfigParse { path: path.to_path_buf(), source })?;
    log::debug!("[config] loaded {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SplitterConfig::default();
        assert_eq!(config.packing, ChannelPacking::Compact);
        assert_eq!(config.default_plane_label, "RGBA");
        assert_eq!(config.output_extension, "exr");
        assert!(config.cleanup_on_failure);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "packing": "fixed-rgba", "compression": "piz" }"#).unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.packing, ChannelPacking::FixedRgba);
        assert_eq!(config.compression, OutputCompression::Piz);
        assert_eq!(config.default_plane_label, "RGBA");
        assert!(config.cleanup_on_failure);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SplitterConfig {
            output_dir: Some(PathBuf::from("/tmp/planes")),
            cleanup_on_failure: false,
            ..SplitterConfig::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: SplitterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(dir.path().join("nope.json").as_path()));
        assert!(matches!(result, Err(SplitError::ConfigRead { .. })));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ packing: compact").unwrap();
        assert!(matches!(load_config(Some(path.as_path())), Err(SplitError::ConfigParse { .. })));
    }
}
