//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{
    AggregateId, Audit, CustomerId, DeliveryId, OrderId, OrderItemId, PaymentId, ProductId,
};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    DeliveryStatus, Money, NewOrderItem, OrderDelivery, OrderError, OrderEvent, OrderItem,
    OrderStatus, Payment, PaymentMethod, PaymentStatus,
    events::{ItemDeliveredData, OrderCreatedData, StatusesRecomputedData},
    status::{self, FulfillmentTotals, Statuses},
};

/// Order aggregate root.
///
/// One consistency boundary for the order, its items, its payments and its
/// delivery log. The three status fields are only ever written by a
/// `StatusesRecomputed` event (or by cancellation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    customer_id: Option<CustomerId>,
    items: Vec<OrderItem>,
    payments: Vec<Payment>,
    deliveries: Vec<OrderDelivery>,
    total_amount: Money,
    order_status: OrderStatus,
    payment_status: PaymentStatus,
    delivery_status: DeliveryStatus,
    created: Option<Audit>,
    updated: Option<Audit>,

    #[serde(default)]
    deleted: bool,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id.map(AggregateId::from)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderCreated(data) => self.apply_order_created(data),
            OrderEvent::CustomerChanged(data) => {
                self.customer_id = Some(data.customer_id);
                self.updated = Some(data.changed);
            }
            OrderEvent::ItemDelivered(data) => self.apply_item_delivered(data),
            OrderEvent::DeliveryRecorded(delivery) => self.deliveries.push(delivery),
            OrderEvent::PaymentReceived(payment) => {
                self.updated = Some(payment.received);
                self.payments.push(payment);
            }
            OrderEvent::PaymentRemoved(data) => {
                self.payments.retain(|p| p.id != data.payment_id);
                self.updated = Some(data.removed);
            }
            OrderEvent::StatusesRecomputed(data) => self.apply_statuses(data),
            OrderEvent::OrderCancelled(data) => {
                self.order_status = OrderStatus::Canceled;
                self.updated = Some(data.cancelled);
            }
            OrderEvent::OrderDeleted(data) => {
                self.deleted = true;
                self.updated = Some(data.deleted);
            }
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn order_id(&self) -> Option<OrderId> {
        self.id
    }

    /// True once created and until deleted.
    pub fn exists(&self) -> bool {
        self.id.is_some() && !self.deleted
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn payment(&self, payment_id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == payment_id)
    }

    /// Delivery log entries in recording order.
    pub fn deliveries(&self) -> &[OrderDelivery] {
        &self.deliveries
    }

    pub fn delivery(&self, delivery_id: DeliveryId) -> Option<&OrderDelivery> {
        self.deliveries.iter().find(|d| d.id == delivery_id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.payments
            .iter()
            .fold(Money::zero(), |acc, p| acc.saturating_add(p.amount))
    }

    pub fn ordered_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    pub fn delivered_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.delivered_quantity)).sum()
    }

    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery_status
    }

    pub fn is_canceled(&self) -> bool {
        self.order_status == OrderStatus::Canceled
    }

    pub fn created(&self) -> Option<Audit> {
        self.created
    }

    pub fn updated(&self) -> Option<Audit> {
        self.updated
    }

    /// Items with stock out of the warehouse, as (product, delivered quantity).
    pub fn delivered_items(&self) -> Vec<(ProductId, u32)> {
        self.items
            .iter()
            .filter(|i| i.delivered_quantity > 0)
            .map(|i| (i.product_id, i.delivered_quantity))
            .collect()
    }

    /// Runs the status deriver over the current sums.
    pub fn derive_statuses(&self) -> Statuses {
        status::derive(FulfillmentTotals {
            ordered_quantity: self.ordered_quantity(),
            delivered_quantity: self.delivered_quantity(),
            total_amount: self.total_amount,
            paid_amount: self.paid_amount(),
        })
    }
}

// Command methods (return events)
impl Order {
    /// Creates the order with its items.
    ///
    /// Each item gets a fresh id and starts with nothing delivered.
    pub fn create(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<NewOrderItem>,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }

        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    price: item.unit_price,
                });
            }
            lines.push(OrderItem {
                id: OrderItemId::new(),
                product_id: item.product_id,
                quantity: item.quantity,
                delivered_quantity: 0,
                unit_price: item.unit_price,
            });
        }

        let total = lines
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.total_price()?))
            .ok_or(OrderError::AmountOutOfRange {
                what: "Order total",
            })?;

        Ok(vec![OrderEvent::order_created(
            order_id,
            customer_id,
            lines,
            total,
            audit,
        )])
    }

    /// Reassigns the order to another customer.
    pub fn update_customer(
        &self,
        customer_id: Option<CustomerId>,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_not_canceled("update")?;

        match customer_id {
            Some(customer_id) if self.customer_id != Some(customer_id) => {
                Ok(vec![OrderEvent::customer_changed(customer_id, audit)])
            }
            _ => Ok(vec![]),
        }
    }

    /// Delivers `quantity` units of one item.
    ///
    /// Produces the item delivery, a matching log entry and a full status
    /// recompute. Stock is handled by the caller against the product ledger.
    pub fn deliver_item(
        &self,
        item_id: OrderItemId,
        quantity: u32,
        product_name: Option<&str>,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self
            .item(item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;

        self.ensure_not_canceled("deliver")?;

        if quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity });
        }

        if quantity > item.remaining() {
            return Err(OrderError::DeliveryExceedsOrdered {
                ordered: item.quantity,
                delivered: item.delivered_quantity,
                requested: quantity,
            });
        }

        let note = format!("Delivered {}x {}", quantity, product_name.unwrap_or("item"));
        let events = vec![
            OrderEvent::item_delivered(item_id, quantity, audit),
            OrderEvent::delivery_recorded(
                DeliveryId::new(),
                self.current_id()?,
                Some(note),
                audit.at,
                audit,
            ),
        ];

        Ok(self.with_recompute(events, audit))
    }

    /// Writes a standalone delivery log entry. Touches neither stock nor
    /// delivered quantities.
    pub fn record_delivery(
        &self,
        delivery_id: DeliveryId,
        note: Option<String>,
        delivered_at: Option<DateTime<Utc>>,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_not_canceled("record a delivery for")?;

        Ok(vec![OrderEvent::delivery_recorded(
            delivery_id,
            self.current_id()?,
            note,
            delivered_at.unwrap_or(audit.at),
            audit,
        )])
    }

    pub fn receive_payment(
        &self,
        payment_id: PaymentId,
        amount: Money,
        method: PaymentMethod,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_not_canceled("pay")?;

        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount { amount });
        }
        if self.paid_amount().checked_add(amount).is_none() {
            return Err(OrderError::AmountOutOfRange {
                what: "Paid amount",
            });
        }

        let payment = Payment {
            id: payment_id,
            order_id: self.current_id()?,
            amount,
            method,
            received: audit,
        };

        Ok(self.with_recompute(vec![OrderEvent::payment_received(payment)], audit))
    }

    /// Removes a payment. May demote the payment status and reopen a
    /// completed order.
    pub fn remove_payment(
        &self,
        payment_id: PaymentId,
        audit: Audit,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.payment(payment_id).is_none() {
            return Err(OrderError::PaymentNotFound { payment_id });
        }

        self.ensure_not_canceled("remove a payment from")?;

        Ok(self.with_recompute(vec![OrderEvent::payment_removed(payment_id, audit)], audit))
    }

    /// Re-derives all three statuses from the current sums.
    pub fn recalculate(&self, audit: Audit) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_not_canceled("recalculate")?;
        Ok(self.with_recompute(vec![], audit))
    }

    /// Cancels the order. Delivery and payment statuses keep their last values.
    pub fn cancel(&self, audit: Audit) -> Result<Vec<OrderEvent>, OrderError> {
        if self.is_canceled() {
            return Err(OrderError::AlreadyCancelled);
        }

        Ok(vec![OrderEvent::order_cancelled(audit)])
    }

    pub fn delete(&self, audit: Audit) -> Result<Vec<OrderEvent>, OrderError> {
        self.current_id()?;
        Ok(vec![OrderEvent::order_deleted(audit)])
    }

    fn ensure_not_canceled(&self, action: &'static str) -> Result<(), OrderError> {
        if self.is_canceled() {
            Err(OrderError::Canceled { action })
        } else {
            Ok(())
        }
    }

    fn current_id(&self) -> Result<OrderId, OrderError> {
        self.id.ok_or(OrderError::NotCreated)
    }

    /// Appends a `StatusesRecomputed` event derived from the state the
    /// pending events would leave behind.
    fn with_recompute(&self, mut events: Vec<OrderEvent>, audit: Audit) -> Vec<OrderEvent> {
        let mut preview = self.clone();
        preview.apply_events(events.iter().cloned());
        events.push(OrderEvent::statuses_recomputed(
            preview.derive_statuses(),
            audit,
        ));
        events
    }
}

// Apply event helpers
impl Order {
    fn apply_order_created(&mut self, data: OrderCreatedData) {
        self.id = Some(data.order_id);
        self.customer_id = Some(data.customer_id);
        self.items = data.items;
        self.total_amount = data.total_amount;
        self.order_status = OrderStatus::Open;
        self.payment_status = PaymentStatus::Unpaid;
        self.delivery_status = DeliveryStatus::NotDelivered;
        self.created = Some(data.created);
        self.updated = Some(data.created);
    }

    fn apply_item_delivered(&mut self, data: ItemDeliveredData) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == data.item_id) {
            item.delivered_quantity += data.quantity;
        }
        self.updated = Some(data.delivered);
    }

    fn apply_statuses(&mut self, data: StatusesRecomputedData) {
        self.delivery_status = data.delivery_status;
        self.payment_status = data.payment_status;
        self.order_status = data.order_status;
        self.updated = Some(data.recomputed);
    }
}
