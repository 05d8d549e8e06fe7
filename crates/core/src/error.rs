//! Domain errors shared by the core, ledger, and HTTP layers.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A subscription or delivery id that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Rejected subscription input or an unreadable import.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The row is in a state that does not allow the operation, such as
    /// retrying a delivery that already succeeded.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Inbound webhook signature missing or wrong.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Serialization or encoding failure; never shown to callers.
    #[error("Internal error: {0}")]
    Internal(String),
}
