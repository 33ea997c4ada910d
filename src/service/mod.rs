//! Services behind the HTTP handlers: document CRUD and administrative operations.

mod admin;
mod crud;
mod validation;
pub use admin::AdminService;
pub use crud::CrudService;
pub use validation::RequestValidator;
