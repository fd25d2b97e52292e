//! POS balance authorizations: reserve now, settle or release later.

mod error;
mod service;
mod sweeper;
mod types;

pub use error::AuthorizationError;
pub use service::{AuthorizationEvent, AuthorizationNotifier, AuthorizationService, LogNotifier};
pub use sweeper::ExpirationSweeper;
pub use types::{AuthorizationStatus, BalanceAuthorization};
