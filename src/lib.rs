//! docrest: a generic REST gateway over a document store. Databases, collections and items
//! are URL path segments; HTTP verbs map to CRUD and administrative operations.

pub mod access;
pub mod commands;
pub mod config;
pub mod error;
pub mod flavor;
pub mod handlers;
pub mod query;
pub mod registry;
pub mod response;
pub mod route;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use access::{AccessGate, ApiKeyGate};
pub use commands::{AdminCommand, CommandRegistry};
pub use config::{load_config, validate_config, GatewayConfig};
pub use error::{AppError, ConfigError};
pub use flavor::Flavor;
pub use query::{SortDirection, TranslatedQuery};
pub use registry::ConnectionRegistry;
pub use response::Envelope;
pub use route::Route;
pub use routes::{app, common_routes, gateway_routes};
pub use service::{AdminService, CrudService};
pub use state::AppState;
pub use store::{Connector, Database, Document, MemoryConnector, PgConnector, ID_FIELD};
