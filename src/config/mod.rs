//! Configuration system for engramdb.

mod env_parser;
mod loader;
mod overrides;
mod paths;
mod validation;

#[cfg(test)]
mod tests_utils;

use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingModelType;
use crate::errors::Error;
use crate::query::DEFAULT_GRAPH_WEIGHT;

pub use loader::ConfigFile;

/// Configuration values with priority: defaults < config file < env vars.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database.
    pub database_path: PathBuf,

    /// Embedding model short name (e.g. "bge-small") or HuggingFace id.
    pub embedding_model: String,

    /// Directory for caching ONNX models.
    pub model_cache: PathBuf,

    /// Share of similarity propagated across one connection in hybrid queries.
    pub graph_weight: f64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = paths::data_dir();

        Self {
            database_path: data_dir.join("engrams.db"),
            embedding_model: EmbeddingModelType::BgeSmall.as_str().to_string(),
            model_cache: data_dir.join("models"),
            graph_weight: DEFAULT_GRAPH_WEIGHT,
        }
    }
}

impl Config {
    /// Load configuration with defaults, file values, and environment overrides.
    pub fn load() -> Result<Self, Error> {
        Self::from_sources(loader::load_from_file()?)
    }

    /// Like `load`, reading the config file from `path` instead of the
    /// default location.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        Self::from_sources(loader::load_from_path(path)?)
    }

    fn from_sources(file_config: Option<ConfigFile>) -> Result<Self, Error> {
        let mut config = Config::default();

        if let Some(file) = file_config {
            config.merge_from_file(file);
        }

        overrides::apply_env_overrides(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Merge configuration from a file into this config.
    fn merge_from_file(&mut self, file: ConfigFile) {
        if let Some(mut database_path) = file.database_path {
            paths::expand_tilde(&mut database_path);
            self.database_path = database_path;
        }
        if let Some(embedding_model) = file.embedding_model {
            self.embedding_model = embedding_model;
        }
        if let Some(mut model_cache) = file.model_cache {
            paths::expand_tilde(&mut model_cache);
            self.model_cache = model_cache;
        }
        if let Some(graph_weight) = file.graph_weight {
            self.graph_weight = graph_weight;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), Error> {
        let validator = validation::ConfigValidator {
            database_path: &self.database_path,
            embedding_model: &self.embedding_model,
            graph_weight: self.graph_weight,
        };

        validator.validate()
    }

    /// The configured embedding model.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name matches no supported model.
    pub fn embedding_model_type(&self) -> Result<EmbeddingModelType, Error> {
        self.embedding_model
            .parse()
            .map_err(|e: Error| Error::Config(e.to_string()))
    }

    /// Ensure parent directories for database and cache paths exist.
    pub fn ensure_directories(&self) -> Result<(), Error> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!(
                        "Failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        if !self.model_cache.as_os_str().is_empty() {
            std::fs::create_dir_all(&self.model_cache).map_err(|e| {
                Error::Config(format!(
                    "Failed to create model cache directory {}: {e}",
                    self.model_cache.display()
                ))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tests_utils::{ENV_MUTEX, cleanup_env_vars, set_env_var};

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.database_path.ends_with(".engramdb/engrams.db"));
        assert_eq!(config.embedding_model, "bge-small");
        assert!(config.model_cache.ends_with(".engramdb/models"));
        assert_eq!(config.graph_weight, 0.5);
        assert_eq!(
            config.embedding_model_type().unwrap(),
            EmbeddingModelType::BgeSmall
        );
    }

    #[test]
    fn test_load_without_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        cleanup_env_vars();

        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("missing.toml")).unwrap();

        assert!(config.database_path.ends_with(".engramdb/engrams.db"));
        assert_eq!(config.embedding_model, "bge-small");
    }

    #[test]
    fn test_file_overrides_defaults_and_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        cleanup_env_vars();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            concat!(
                "embedding_model = \"hashing\"\n",
                "graph_weight = 0.2\n",
                "database_path = \"/data/file.db\"\n",
            ),
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.embedding_model, "hashing");
        assert_eq!(config.graph_weight, 0.2);
        assert_eq!(config.database_path, PathBuf::from("/data/file.db"));

        set_env_var("ENGRAMDB_GRAPH_WEIGHT", "0.9");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.graph_weight, 0.9);
        assert_eq!(config.embedding_model, "hashing");

        cleanup_env_vars();
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        cleanup_env_vars();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "embedding_model = \"word2vec\"\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "graph_weight = 3.0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            database_path: dir.path().join("nested/db/engrams.db"),
            model_cache: dir.path().join("cache/models"),
            ..Config::default()
        };

        config.ensure_directories().unwrap();
        assert!(dir.path().join("nested/db").is_dir());
        assert!(dir.path().join("cache/models").is_dir());
    }
}
