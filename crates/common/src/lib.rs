//! Identifiers and audit stamps shared by the event store and the fulfillment domain.

pub mod types;

pub use types::{
    AggregateId, Audit, CustomerId, DeliveryId, MovementId, OrderId, OrderItemId, PaymentId,
    ProductId, UserId,
};
