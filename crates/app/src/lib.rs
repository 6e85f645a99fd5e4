//! Application layer: configuration, collaborator seams and the services that wire the
//! wallet, group and transaction ledgers together.

pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod journal;
pub mod services;
pub mod sweep;

pub use config::{AppConfig, ConfigError};
pub use context::Caller;
pub use error::{ServiceError, ServiceResult};
pub use services::AppServices;
