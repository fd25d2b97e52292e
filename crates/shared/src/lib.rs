//! Shared errors and configuration for the wallet backend.
//!
//! This crate provides common types used across all other crates:
//! - `AppError` / `AppResult` - application-level error handling
//! - `AppConfig` - layered configuration loading

pub mod config;
pub mod error;

pub use config::{AppConfig, AuthorizationSettings, ServerConfig, WalletSettings};
pub use error::{AppError, AppResult};
