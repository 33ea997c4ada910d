//! Safe SQL builder for collection tables: identifiers quoted, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
