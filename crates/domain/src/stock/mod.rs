//! Product stock ledger.
//!
//! Each product has one stream of `StockMoved` events. The movement log is
//! append-only by construction, and `current_stock` is the running sum of the
//! movement quantities, restored from the latest snapshot plus the tail.

mod aggregate;
mod events;

pub use aggregate::ProductStock;
pub use events::{MovementType, NewStockMovement, StockEvent, StockMovement};

use thiserror::Error;

/// Errors raised by the stock ledger. All of them leave the stock unchanged.
#[derive(Debug, Error)]
pub enum StockError {
    /// IN and OUT take a strictly positive quantity.
    #[error("Invalid {movement_type} quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity {
        movement_type: MovementType,
        quantity: i64,
    },

    #[error("insufficient stock: {current} available, {requested} requested")]
    InsufficientStock { current: i64, requested: i64 },

    #[error("stock cannot be negative (current {current}, adjustment {adjustment})")]
    NegativeStock { current: i64, adjustment: i64 },

    /// The resulting stock would not fit in an `i64`.
    #[error("stock would exceed the supported range (current {current}, change {quantity})")]
    StockOutOfRange { current: i64, quantity: i64 },
}
