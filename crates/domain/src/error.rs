//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;
use crate::stock::StockError;

/// How a caller should treat an error.
///
/// The surrounding API layer maps each kind to a fixed status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced order, item, product, payment or customer does not exist.
    NotFound,
    /// The request breaks a business rule; nothing was written.
    BadRequest,
    /// Another mutation on the same order or product won the race.
    Conflict,
    Internal,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A stock ledger rule was violated.
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A collaborator (catalog, customer directory) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Order(err) if err.is_not_found() => ErrorKind::NotFound,
            DomainError::Order(_) | DomainError::Stock(_) => ErrorKind::BadRequest,
            DomainError::EventStore(err) if err.is_conflict() => ErrorKind::Conflict,
            DomainError::EventStore(_)
            | DomainError::Collaborator(_)
            | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if re-running the operation from a fresh read may succeed.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
