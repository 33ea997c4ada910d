//! Load gateway config: defaults, then an optional JSON file, then `DOCREST_*` environment overrides.

use crate::config::types::GatewayConfig;
use crate::config::validate_config;
use crate::error::ConfigError;
use std::path::Path;
use std::str::FromStr;

/// Config file read from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Load config for the server. A missing file is not an error; a malformed one is.
/// `.env` in the working directory is loaded first so its values reach the overrides.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut config = match std::fs::read_to_string(path) {
        Ok(raw) => parse_config(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            GatewayConfig::default()
        }
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(serde_json::from_str(raw)?)
}

/// Apply `DOCREST_*` overrides using `lookup` (std::env in production, a map in tests).
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("DOCREST_DB_HOST") {
        config.store.host = v;
    }
    if let Some(v) = lookup("DOCREST_DB_PORT") {
        config.store.port = parse_var("DOCREST_DB_PORT", &v)?;
    }
    if let Some(v) = lookup("DOCREST_DB_USER") {
        config.store.username = v;
    }
    if let Some(v) = lookup("DOCREST_DB_PASSWORD") {
        config.store.password = Some(v).filter(|s| !s.is_empty());
    }
    if let Some(v) = lookup("DOCREST_DB_SCHEMA") {
        config.store.schema = v;
    }
    if let Some(v) = lookup("DOCREST_SERVER_ADDRESS") {
        config.server.address = v;
    }
    if let Some(v) = lookup("DOCREST_SERVER_PORT") {
        config.server.port = parse_var("DOCREST_SERVER_PORT", &v)?;
    }
    if let Some(v) = lookup("DOCREST_DEFAULT_PAGE_SIZE") {
        config.default_page_size = if v.trim().is_empty() {
            None
        } else {
            Some(parse_var("DOCREST_DEFAULT_PAGE_SIZE", &v)?)
        };
    }
    Ok(())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Load(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Flavor;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(r#"{"store": {"port": 6543}, "flavor": "nounderscore"}"#).unwrap();
        assert_eq!(config.store.port, 6543);
        assert_eq!(config.store.host, "localhost");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.flavor, Flavor::NoUnderscore);
        assert!(config.default_page_size.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DOCREST_DB_HOST", "db.internal"),
            ("DOCREST_SERVER_PORT", "8080"),
            ("DOCREST_DEFAULT_PAGE_SIZE", "50"),
        ]);
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|s| s.to_string())).unwrap();
        assert_eq!(config.store.host, "db.internal");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.default_page_size, Some(50));
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(&mut config, |k| {
            (k == "DOCREST_DB_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("DOCREST_DB_PORT"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/docrest/config.json"))).unwrap();
        assert_eq!(config.server.address, "0.0.0.0");
    }
}
