//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
pub mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::{CreateOrder, OrderPatch};
pub use events::{
    CustomerChangedData, ItemDeliveredData, OrderCancelledData, OrderCreatedData,
    OrderDeletedData, OrderEvent, PaymentRemovedData, StatusesRecomputedData,
};
pub use status::{DeliveryStatus, OrderStatus, PaymentStatus, Statuses};
pub use value_objects::{Money, NewOrderItem, OrderDelivery, OrderItem, Payment, PaymentMethod};

use common::{OrderItemId, PaymentId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is already created.
    #[error("Order already created")]
    AlreadyCreated,

    /// A command reached an order that has no events yet.
    #[error("Order has not been created")]
    NotCreated,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid unit price: {price} (must not be negative)")]
    InvalidPrice { price: Money },

    #[error("Invalid payment amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Money },

    /// A sum of money left the range a `Money` can hold.
    #[error("{what} exceeds the supported amount range")]
    AmountOutOfRange { what: &'static str },

    #[error("Order item not found: {item_id}")]
    ItemNotFound { item_id: OrderItemId },

    #[error("Payment not found: {payment_id}")]
    PaymentNotFound { payment_id: PaymentId },

    #[error(
        "delivery exceeds ordered quantity \
         (ordered {ordered}, delivered {delivered}, requested {requested})"
    )]
    DeliveryExceedsOrdered {
        ordered: u32,
        delivered: u32,
        requested: u32,
    },

    /// No delivery, payment or update is accepted once an order is canceled.
    #[error("Cannot {action} a canceled order")]
    Canceled { action: &'static str },

    #[error("Order is already canceled")]
    AlreadyCancelled,
}

impl OrderError {
    /// Returns true for errors that mean a referenced child does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrderError::ItemNotFound { .. } | OrderError::PaymentNotFound { .. }
        )
    }
}
