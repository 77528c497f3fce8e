//! Configuration file resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MPQ_CONFIG";

/// Configuration file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config file, if it exists
///
/// Returns `None` when no file applies; callers then use built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    let user_config = default_config_path()?;
    if user_config.exists() {
        debug!("Using per-user config file {}", user_config.display());
        Some(user_config)
    } else {
        None
    }
}

/// Platform config location, e.g. `~/.config/mpq/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mpq").join("config.toml"))
}

/// Read a configuration file to a string, mapping failures to `Error::Config`
pub fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TEST_ENV_VAR: &str = "MPQ_CONFIG_TEST_ONLY";

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(TEST_ENV_VAR, "/from/env.toml");
        let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), TEST_ENV_VAR);
        std::env::remove_var(TEST_ENV_VAR);
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));
    }

    #[test]
    #[serial]
    fn test_environment_variable_used_without_cli() {
        std::env::set_var(TEST_ENV_VAR, "/from/env.toml");
        let resolved = resolve_config_path(None, TEST_ENV_VAR);
        std::env::remove_var(TEST_ENV_VAR);
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
    }

    #[test]
    #[serial]
    fn test_empty_environment_variable_ignored() {
        std::env::set_var(TEST_ENV_VAR, "");
        let resolved = resolve_config_path(None, TEST_ENV_VAR);
        std::env::remove_var(TEST_ENV_VAR);
        assert_ne!(resolved, Some(PathBuf::new()));
    }

    #[test]
    fn test_read_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_config_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
