//! Request-scoped audit context.

use serde::{Deserialize, Serialize};

/// Audit context attached to every movement and authorization.
///
/// Carried explicitly through service calls so the ledger records who
/// (or what) triggered each balance change without reaching into any
/// web-framework request type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Client IP address, if the operation came over HTTP.
    pub ip_address: Option<String>,
    /// Client user agent, if the operation came over HTTP.
    pub user_agent: Option<String>,
    /// Logical system that originated the operation (e.g. "POS", "APP").
    pub origin_system: Option<String>,
}

impl OperationContext {
    /// Context for an internal job or background task.
    #[must_use]
    pub fn system(origin: &str) -> Self {
        Self {
            ip_address: None,
            user_agent: None,
            origin_system: Some(origin.to_string()),
        }
    }
}
