//! Configuration validation logic.

use std::path::Path;

use crate::embedding::EmbeddingModelType;
use crate::errors::Error;

/// Validates configuration values.
pub struct ConfigValidator<'a> {
    pub database_path: &'a Path,
    pub embedding_model: &'a str,
    pub graph_weight: f64,
}

impl ConfigValidator<'_> {
    /// Validate all configuration values for correctness and constraints.
    ///
    /// Checks that:
    /// - Graph weight is finite and between 0.0 and 1.0
    /// - Embedding model names a supported model
    /// - Database path is not empty
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any validation check fails.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_graph_weight()?;
        self.validate_embedding_model()?;
        self.validate_database_path()?;

        Ok(())
    }

    fn validate_graph_weight(&self) -> Result<(), Error> {
        if !self.graph_weight.is_finite() {
            return Err(Error::Config(
                "Invalid graph weight: NaN and infinity are not allowed".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.graph_weight) {
            return Err(Error::Config(format!(
                "Invalid graph weight: {} (must be between 0.0 and 1.0)",
                self.graph_weight
            )));
        }

        Ok(())
    }

    fn validate_embedding_model(&self) -> Result<(), Error> {
        if self.embedding_model.trim().is_empty() {
            return Err(Error::Config("Embedding model cannot be empty".to_string()));
        }
        self.embedding_model
            .parse::<EmbeddingModelType>()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(())
    }

    fn validate_database_path(&self) -> Result<(), Error> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        Ok(())
    }
}
