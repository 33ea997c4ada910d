//! Config validation: values the server cannot start with.

use crate::config::GatewayConfig;
use crate::error::ConfigError;
use crate::store::names::is_sql_identifier;

pub fn validate_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    let store = &config.store;
    if store.host.trim().is_empty() {
        return Err(ConfigError::Validation("store.host must not be empty".into()));
    }
    if store.port == 0 {
        return Err(ConfigError::Validation("store.port must be non-zero".into()));
    }
    if store.max_connections == 0 {
        return Err(ConfigError::Validation("store.max_connections must be at least 1".into()));
    }
    if !is_sql_identifier(&store.schema) {
        return Err(ConfigError::Validation(format!(
            "store.schema '{}' is not a valid identifier",
            store.schema
        )));
    }
    if config.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be non-zero".into()));
    }
    if config.default_page_size == Some(0) {
        return Err(ConfigError::Validation("default_page_size must be at least 1".into()));
    }
    if let Some(ac) = &config.access_control {
        if ac.header.trim().is_empty() {
            return Err(ConfigError::Validation("access_control.header must not be empty".into()));
        }
        if ac.keys.is_empty() && ac.read_only_keys.is_empty() {
            return Err(ConfigError::Validation(
                "access_control requires at least one key".into(),
            ));
        }
    }
    Ok(())
}
