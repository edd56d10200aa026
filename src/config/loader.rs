//! Configuration file loading and parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::Error;

use super::paths;

/// Configuration loaded from TOML file.
///
/// Missing keys stay empty (`None`) so they do not override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub model_cache: Option<PathBuf>,

    #[serde(default)]
    pub graph_weight: Option<f64>,
}

/// Load configuration from the default TOML file, if it exists.
pub fn load_from_file() -> Result<Option<ConfigFile>, Error> {
    load_from_path(&paths::config_file())
}

/// Load configuration from a specific TOML file, if it exists.
pub fn load_from_path(config_path: &Path) -> Result<Option<ConfigFile>, Error> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(config_path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            config_path.display()
        ))
    })?;

    let config: ConfigFile = toml::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {e}",
            config_path.display()
        ))
    })?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_toml() {
        let content = r#"
This is not valid TOML
 [[unclosed bracket
 "#;

        let result: Result<ConfigFile, _> = toml::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_config_file() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert!(config.database_path.is_none());
        assert!(config.embedding_model.is_none());
        assert!(config.model_cache.is_none());
        assert!(config.graph_weight.is_none());
    }

    #[test]
    fn test_config_file_partial_toml() {
        let content = r#"
            database_path = "/test/db.db"
            graph_weight = 0.25
        "#;

        let config: ConfigFile = toml::from_str(content).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/test/db.db")));
        assert_eq!(config.graph_weight, Some(0.25));
        assert!(config.embedding_model.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("similarity_threshold = 0.9");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(load_from_path(&path).unwrap().is_none());

        std::fs::write(&path, "embedding_model = \"hashing\"\n").unwrap();
        let config = load_from_path(&path).unwrap().unwrap();
        assert_eq!(config.embedding_model.as_deref(), Some("hashing"));

        std::fs::write(&path, "graph_weight = \"heavy\"\n").unwrap();
        assert!(matches!(load_from_path(&path), Err(Error::Config(_))));
    }
}
