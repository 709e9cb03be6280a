//! User-registration service built on the engine.
//!
//! Wires a generic-flavour [`engine::Engine`] with a user list read model
//! and sets up structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod reply;
pub mod telemetry;
pub mod users;

pub use config::{AppConfig, LogFormat};
pub use error::{AppError, Result};
pub use reply::Reply;
pub use users::{USERS, UserService, user_list, user_schemas};

