// src/lib.rs
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod repository;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use domain::catalog::PermissionCatalog;
pub use domain::permission::NestedPermissions;
pub use domain::wire::WirePermission;
pub use error::{AppError, AppResult};
