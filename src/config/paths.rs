//! Path expansion utilities for tilde (`~`) substitution.

use std::path::{Path, PathBuf};

/// Expand `~` to home directory in a PathBuf (in-place).
pub fn expand_tilde(path: &mut PathBuf) {
    *path = expand_tilde_path(path);
}

/// Expand `~` to home directory in a PathBuf (returns new PathBuf).
pub fn expand_tilde_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Base directory for engramdb data (`~/.engramdb`).
pub fn data_dir() -> PathBuf {
    // Use home directory with sensible fallback for systems without HOME
    let home = dirs::home_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    home.join(".engramdb")
}

/// Location of the optional TOML config file.
pub fn config_file() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let config_dir = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
    config_dir.join("engramdb/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let mut path = PathBuf::from("~/test/path");
        expand_tilde(&mut path);

        assert!(!path.starts_with("~"));
        assert!(path.starts_with(&home));
        assert!(path.ends_with("test/path"));
    }

    #[test]
    fn test_expand_tilde_no_tilde() {
        let mut path = PathBuf::from("/absolute/path");
        let original = path.clone();

        expand_tilde(&mut path);

        assert_eq!(path, original);
    }

    #[test]
    fn test_tilde_inside_name_untouched() {
        let path = PathBuf::from("~backup/db");
        assert_eq!(expand_tilde_path(&path), path);
    }

    #[test]
    fn test_config_file_location() {
        assert!(config_file().ends_with("engramdb/config.toml"));
        assert!(data_dir().ends_with(".engramdb"));
    }
}
