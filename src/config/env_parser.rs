//! Environment variable parsing utilities for configuration.

use std::path::PathBuf;

use crate::errors::Error;

use super::paths;

/// Parse environment variable value or return error if empty/whitespace.
fn parse_env_string(name: &str, value: &str) -> Result<String, Error> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} cannot be empty")));
    }
    Ok(value.trim().to_string())
}

/// Parse environment variable as a path, expanding tilde.
fn parse_env_path(name: &str, value: &str) -> Result<PathBuf, Error> {
    let value = parse_env_string(name, value)?;
    Ok(paths::expand_tilde_path(&PathBuf::from(value)))
}

/// Parse environment variable as a f64; range is checked by validation.
fn parse_env_float(name: &str, value: &str) -> Result<f64, Error> {
    parse_env_string(name, value)?
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {name} value: {e}")))
}

/// Apply ENGRAMDB_DATABASE_PATH environment variable override.
pub fn apply_database_path_override(database_path: &mut PathBuf) -> Result<(), Error> {
    if let Ok(val) = std::env::var("ENGRAMDB_DATABASE_PATH") {
        *database_path = parse_env_path("ENGRAMDB_DATABASE_PATH", &val)?;
    }
    Ok(())
}

/// Apply ENGRAMDB_EMBEDDING_MODEL environment variable override.
pub fn apply_embedding_model_override(embedding_model: &mut String) -> Result<(), Error> {
    if let Ok(val) = std::env::var("ENGRAMDB_EMBEDDING_MODEL") {
        *embedding_model = parse_env_string("ENGRAMDB_EMBEDDING_MODEL", &val)?;
    }
    Ok(())
}

/// Apply ENGRAMDB_MODEL_CACHE environment variable override.
pub fn apply_model_cache_override(model_cache: &mut PathBuf) -> Result<(), Error> {
    if let Ok(val) = std::env::var("ENGRAMDB_MODEL_CACHE") {
        *model_cache = parse_env_path("ENGRAMDB_MODEL_CACHE", &val)?;
    }
    Ok(())
}

/// Apply ENGRAMDB_GRAPH_WEIGHT environment variable override.
pub fn apply_graph_weight_override(graph_weight: &mut f64) -> Result<(), Error> {
    if let Ok(val) = std::env::var("ENGRAMDB_GRAPH_WEIGHT") {
        *graph_weight = parse_env_float("ENGRAMDB_GRAPH_WEIGHT", &val)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_string_empty() {
        let result = parse_env_string("TEST_VAR", "");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_env_string_whitespace() {
        let result = parse_env_string("TEST_VAR", "   ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_env_string_trims() {
        let result = parse_env_string("TEST_VAR", " hashing ");
        assert_eq!(result.unwrap(), "hashing");
    }

    #[test]
    fn test_parse_env_float() {
        assert_eq!(parse_env_float("TEST_FLOAT", "0.5").unwrap(), 0.5);
        assert!(matches!(
            parse_env_float("TEST_FLOAT", "invalid"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_parse_env_path_absolute() {
        let path = parse_env_path("TEST_PATH", "/var/lib/engrams.db").unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/engrams.db"));
    }
}
