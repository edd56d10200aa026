//! Environment variable overrides for configuration.

use crate::errors::Error;

use super::Config;
use super::env_parser;

/// Apply every `ENGRAMDB_*` environment variable override to `config`.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), Error> {
    env_parser::apply_database_path_override(&mut config.database_path)?;
    env_parser::apply_embedding_model_override(&mut config.embedding_model)?;
    env_parser::apply_model_cache_override(&mut config.model_cache)?;
    env_parser::apply_graph_weight_override(&mut config.graph_weight)?;
    Ok(())
}
