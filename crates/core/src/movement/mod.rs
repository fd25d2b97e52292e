//! Movement types, statuses and the movement type catalog.

mod catalog;
mod types;

pub use catalog::{codes, MovementTypeCatalog};
pub use types::{ExternalReference, Movement, MovementCategory, MovementStatus, MovementType};

pub(crate) use types::MovementDraft;
