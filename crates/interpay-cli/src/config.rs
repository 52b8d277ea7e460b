//! Configuration loading from `~/.interpay/config.toml`.

use interpay_types::config::SessionConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load the session configuration from disk, falling back to defaults.
///
/// A missing, unreadable or unparsable file is logged and replaced by the
/// default configuration; loading never fails.
pub fn load_config(path: Option<&Path>) -> SessionConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        return SessionConfig::default();
    }

    let contents = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            return SessionConfig::default();
        }
    };

    match toml::from_str::<SessionConfig>(&contents) {
        Ok(config) => {
            info!(path = %config_path.display(), "Loaded configuration");
            sanitize(config)
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to parse config, using defaults"
            );
            SessionConfig::default()
        }
    }
}

/// Replace values the session cannot run with.
fn sanitize(mut config: SessionConfig) -> SessionConfig {
    let defaults = SessionConfig::default();
    if config.invite_timeout_secs == 0 {
        warn!(
            default = defaults.invite_timeout_secs,
            "invite_timeout_secs must be positive, using default"
        );
        config.invite_timeout_secs = defaults.invite_timeout_secs;
    }
    if config.service_type.trim().is_empty() {
        warn!(default = %defaults.service_type, "service_type is empty, using default");
        config.service_type = defaults.service_type;
    }
    if config.display_name.trim().is_empty() {
        warn!(default = %defaults.display_name, "display_name is empty, using default");
        config.display_name = defaults.display_name;
    }
    config
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    interpay_home().join("config.toml")
}

/// Get the Interpay home directory.
pub fn interpay_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".interpay")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Some(Path::new("/nonexistent/interpay/config.toml")));
        assert_eq!(config.service_type, "interpay-mpc");
        assert_eq!(config.invite_timeout_secs, 10);
    }

    #[test]
    fn test_load_config_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            display_name = "Tienda Lupita"
            invite_timeout_secs = 5

            [trust]
            allow_list = ["Beto's iPad"]
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.display_name, "Tienda Lupita");
        assert_eq!(config.invite_timeout_secs, 5);
        assert_eq!(config.service_type, "interpay-mpc");
        assert!(config.trust.auto_accept);
        assert_eq!(config.trust.allow_list, vec!["Beto's iPad".to_string()]);
    }

    #[test]
    fn test_load_config_garbage_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "display_name = [unclosed").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_zero_timeout_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "invite_timeout_secs = 0\nservice_type = \"\"").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.invite_timeout_secs, 10);
        assert_eq!(config.service_type, "interpay-mpc");
    }

    #[test]
    fn test_default_path_under_home() {
        let path = default_config_path();
        assert!(path.ends_with(".interpay/config.toml"));
    }
}
