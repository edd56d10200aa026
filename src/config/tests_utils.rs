//! Shared test utilities for config module tests.

use std::sync::Mutex;

/// Mutex to serialize environment variable tests and prevent race conditions.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Every variable read by `Config::load`.
pub const ENV_VARS: [&str; 4] = [
    "ENGRAMDB_DATABASE_PATH",
    "ENGRAMDB_EMBEDDING_MODEL",
    "ENGRAMDB_MODEL_CACHE",
    "ENGRAMDB_GRAPH_WEIGHT",
];

pub fn set_env_var(name: &str, value: &str) {
    // SAFETY: callers hold ENV_MUTEX, so no other test thread touches the environment.
    #[allow(clippy::disallowed_methods)]
    unsafe {
        std::env::set_var(name, value);
    }
}

/// Clean up environment variables used by engramdb config.
pub fn cleanup_env_vars() {
    for var in ENV_VARS {
        // SAFETY: callers hold ENV_MUTEX.
        #[allow(clippy::disallowed_methods)]
        unsafe {
            std::env::remove_var(var);
        }
    }
}
