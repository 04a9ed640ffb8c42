//! Configuration file loading

use super::schema::Config;
use crate::error::{CspError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Find user config by checking environment and standard locations
    pub fn find_user_config() -> Option<PathBuf> {
        // 1. $CSP_COLLECTOR_CONFIG
        if let Ok(path) = env::var("CSP_COLLECTOR_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        // 2. $XDG_CONFIG_HOME/csp-collector/config.toml
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            let p = PathBuf::from(xdg).join("csp-collector/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        // 3. ~/.config/csp-collector/config.toml
        if let Ok(home) = env::var("HOME") {
            let p = PathBuf::from(home).join(".config/csp-collector/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CspError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Parse config from TOML text
    pub fn parse(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load config from an explicit path, the user config, or defaults
    /// Priority: explicit path > user config > built-in defaults
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Config> {
        if let Some(explicit) = path {
            tracing::debug!("Loading explicit config from {:?}", explicit);
            return Self::load_from_file(&explicit);
        }

        match Self::find_user_config() {
            Some(user) => {
                tracing::debug!("Loading user config from {:?}", user);
                Self::load_from_file(&user)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Config::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.max_body_bytes, 65536);
        assert_eq!(config.storage.data_dir, PathBuf::from("static"));
        assert_eq!(config.site.title, "CSP Reports");
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:9000"

[storage]
data_dir = "/var/lib/csp"

[site]
title = "Acme CSP Reporting"
"#;

        let config = ConfigLoader::parse(toml_str).unwrap();
        assert_eq!(config.server.listen.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.max_body_bytes, 65536);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/csp"));
        assert_eq!(config.site.title, "Acme CSP Reporting");
    }

    #[test]
    fn test_parse_empty_toml() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = ConfigLoader::parse("[server]\nport = 80\n");
        assert!(matches!(result, Err(CspError::ConfigParse(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nmax_body_bytes = 1024").unwrap();

        let config = ConfigLoader::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.server.max_body_bytes, 1024);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = ConfigLoader::load_from_file("/nonexistent/csp-collector.toml");
        assert!(matches!(result, Err(CspError::ConfigLoad { .. })));
    }
}
