//! HTTP handlers for the database/collection/item hierarchy.

pub mod gateway;
pub use gateway::*;
