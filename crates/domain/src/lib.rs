//! Order fulfillment and inventory consistency engine.
//!
//! This crate keeps an order's total, delivered quantities, payments, the
//! product stock ledgers and the three derived statuses consistent across
//! create, deliver, pay, cancel and delete:
//! - [`Order`]: order, items, payments and delivery log as one aggregate
//! - [`ProductStock`]: append-only stock movements per product
//! - [`order::status`]: the pure status deriver
//! - [`UnitOfWork`]: atomic commits spanning an order and its products' stock
//! - [`StreamLocks`]: per-stream queueing of writers inside one process
//! - [`FulfillmentService`]: the operations exposed to the rest of the system

pub mod aggregate;
pub mod config;
pub mod error;
pub mod locks;
pub mod order;
pub mod ports;
pub mod service;
pub mod stock;
pub mod telemetry;
pub mod unit_of_work;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use config::{FulfillmentConfig, LogFormat};
pub use error::{DomainError, ErrorKind};
pub use locks::StreamLocks;
pub use order::{
    CreateOrder, DeliveryStatus, Money, NewOrderItem, Order, OrderDelivery, OrderError,
    OrderEvent, OrderItem, OrderPatch, OrderStatus, Payment, PaymentMethod, PaymentStatus,
};
pub use ports::{
    Customer, CustomerDirectory, FixedIdentity, IdentityContext, InMemoryCustomerDirectory,
    InMemoryProductCatalog, Product, ProductCatalog,
};
pub use service::FulfillmentService;
pub use stock::{
    MovementType, NewStockMovement, ProductStock, StockError, StockEvent, StockMovement,
};
pub use telemetry::init_tracing;
pub use unit_of_work::UnitOfWork;
