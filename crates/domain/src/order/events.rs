//! Order domain events.

use chrono::{DateTime, Utc};
use common::{Audit, CustomerId, DeliveryId, OrderId, OrderItemId, PaymentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;

use super::{
    DeliveryStatus, Money, OrderDelivery, OrderItem, OrderStatus, Payment, PaymentStatus, Statuses,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order and its items were created.
    OrderCreated(OrderCreatedData),

    /// The order was reassigned to another customer.
    CustomerChanged(CustomerChangedData),

    /// Quantity was delivered against one item.
    ItemDelivered(ItemDeliveredData),

    /// A delivery log entry was written.
    DeliveryRecorded(OrderDelivery),

    PaymentReceived(Payment),

    PaymentRemoved(PaymentRemovedData),

    /// The three statuses were re-derived.
    StatusesRecomputed(StatusesRecomputedData),

    OrderCancelled(OrderCancelledData),

    /// The order was deleted. It reads as absent from then on.
    OrderDeleted(OrderDeletedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::CustomerChanged(_) => "CustomerChanged",
            OrderEvent::ItemDelivered(_) => "ItemDelivered",
            OrderEvent::DeliveryRecorded(_) => "DeliveryRecorded",
            OrderEvent::PaymentReceived(_) => "PaymentReceived",
            OrderEvent::PaymentRemoved(_) => "PaymentRemoved",
            OrderEvent::StatusesRecomputed(_) => "StatusesRecomputed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderDeleted(_) => "OrderDeleted",
        }
    }

    fn entity_refs(&self) -> Vec<Uuid> {
        match self {
            OrderEvent::OrderCreated(data) => data.items.iter().map(|i| i.id.as_uuid()).collect(),
            OrderEvent::DeliveryRecorded(delivery) => vec![delivery.id.as_uuid()],
            OrderEvent::PaymentReceived(payment) => vec![payment.id.as_uuid()],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,

    /// Sum of quantity x unit price over all items. Never recomputed.
    pub total_amount: Money,

    pub created: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerChangedData {
    pub customer_id: CustomerId,
    pub changed: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDeliveredData {
    pub item_id: OrderItemId,
    pub quantity: u32,
    pub delivered: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRemovedData {
    pub payment_id: PaymentId,
    pub removed: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusesRecomputedData {
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub recomputed: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub cancelled: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeletedData {
    pub deleted: Audit,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn order_created(
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        total_amount: Money,
        created: Audit,
    ) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            customer_id,
            items,
            total_amount,
            created,
        })
    }

    pub fn customer_changed(customer_id: CustomerId, changed: Audit) -> Self {
        OrderEvent::CustomerChanged(CustomerChangedData {
            customer_id,
            changed,
        })
    }

    pub fn item_delivered(item_id: OrderItemId, quantity: u32, delivered: Audit) -> Self {
        OrderEvent::ItemDelivered(ItemDeliveredData {
            item_id,
            quantity,
            delivered,
        })
    }

    pub fn delivery_recorded(
        id: DeliveryId,
        order_id: OrderId,
        note: Option<String>,
        delivered_at: DateTime<Utc>,
        audit: Audit,
    ) -> Self {
        OrderEvent::DeliveryRecorded(OrderDelivery {
            id,
            order_id,
            delivered_at,
            delivered_by: audit.by,
            note,
        })
    }

    pub fn payment_received(payment: Payment) -> Self {
        OrderEvent::PaymentReceived(payment)
    }

    pub fn payment_removed(payment_id: PaymentId, removed: Audit) -> Self {
        OrderEvent::PaymentRemoved(PaymentRemovedData {
            payment_id,
            removed,
        })
    }

    pub fn statuses_recomputed(statuses: Statuses, recomputed: Audit) -> Self {
        OrderEvent::StatusesRecomputed(StatusesRecomputedData {
            delivery_status: statuses.delivery,
            payment_status: statuses.payment,
            order_status: statuses.order,
            recomputed,
        })
    }

    pub fn order_cancelled(cancelled: Audit) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData { cancelled })
    }

    pub fn order_deleted(deleted: Audit) -> Self {
        OrderEvent::OrderDeleted(OrderDeletedData { deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PaymentMethod;
    use common::{ProductId, UserId};

    fn audit() -> Audit {
        Audit::now(UserId::new())
    }

    fn item(quantity: u32, unit_cents: i64) -> OrderItem {
        OrderItem {
            id: OrderItemId::new(),
            product_id: ProductId::new(),
            quantity,
            delivered_quantity: 0,
            unit_price: Money::from_cents(unit_cents),
        }
    }

    #[test]
    fn test_order_created_carries_total() {
        let event = OrderEvent::order_created(
            OrderId::new(),
            CustomerId::new(),
            vec![item(10, 500), item(5, 200)],
            Money::from_cents(6000),
            audit(),
        );

        let OrderEvent::OrderCreated(data) = &event else {
            panic!("expected OrderCreated");
        };
        assert_eq!(data.total_amount, Money::from_cents(6000));
        assert_eq!(event.event_type(), "OrderCreated");
    }

    #[test]
    fn test_entity_refs_name_children() {
        let items = vec![item(1, 100), item(2, 100)];
        let ids: Vec<Uuid> = items.iter().map(|i| i.id.as_uuid()).collect();
        let created = OrderEvent::order_created(
            OrderId::new(),
            CustomerId::new(),
            items,
            Money::zero(),
            audit(),
        );
        assert_eq!(created.entity_refs(), ids);

        let payment = Payment {
            id: PaymentId::new(),
            order_id: OrderId::new(),
            amount: Money::from_cents(100),
            method: PaymentMethod::Cash,
            received: audit(),
        };
        let payment_id = payment.id;
        assert_eq!(
            OrderEvent::payment_received(payment).entity_refs(),
            vec![payment_id.as_uuid()]
        );

        assert!(OrderEvent::order_cancelled(audit()).entity_refs().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrderEvent::item_delivered(OrderItemId::new(), 3, audit());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "ItemDelivered");
        assert_eq!(json["data"]["quantity"], 3);

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "ItemDelivered");
    }
}
