//! Shared application state: the connection registry, the command table and the config.

use crate::commands::CommandRegistry;
use crate::config::GatewayConfig;
use crate::registry::ConnectionRegistry;
use crate::store::Connector;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub commands: Arc<CommandRegistry>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// State with a fresh registry over `connector` and the built-in commands.
    pub fn new(connector: Arc<dyn Connector>, config: GatewayConfig) -> Self {
        Self::with_commands(connector, config, CommandRegistry::with_builtins())
    }

    pub fn with_commands(connector: Arc<dyn Connector>, config: GatewayConfig, commands: CommandRegistry) -> Self {
        AppState {
            registry: Arc::new(ConnectionRegistry::new(connector)),
            commands: Arc::new(commands),
            config: Arc::new(config),
        }
    }
}
