//! Gateway config types matching `config.json`. Every field has a default so a partial file is valid.

use crate::flavor::Flavor;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub flavor: Flavor,
    /// Pretty-print response bodies.
    pub pretty_json: bool,
    pub debug: bool,
    /// Applied to list requests without `limit`. None means unbounded.
    pub default_page_size: Option<u32>,
    pub access_control: Option<AccessControlConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            flavor: Flavor::Regular,
            pretty_json: false,
            debug: false,
            default_page_size: None,
            access_control: None,
        }
    }
}

/// Connection settings for the PostgreSQL document backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Database used for CREATE/DROP DATABASE and listing; never exposed as a logical database.
    pub maintenance_database: String,
    /// Schema holding one table per collection inside every logical database.
    pub schema: String,
    pub max_connections: u32,
    /// Deadline for acquiring a pooled connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Create the PostgreSQL database on first reference.
    pub create_databases: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            host: "localhost".into(),
            port: 5432,
            username: "postgres".into(),
            password: None,
            maintenance_database: "postgres".into(),
            schema: "docrest".into(),
            max_connections: 5,
            connect_timeout_secs: 5,
            create_databases: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0".into(),
            port: 3000,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// API-key gate settings. Keys in `read_only_keys` may only issue GET/HEAD.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessControlConfig {
    #[serde(default = "default_key_header")]
    pub header: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub read_only_keys: Vec<String>,
}

fn default_key_header() -> String {
    "X-API-Key".into()
}
