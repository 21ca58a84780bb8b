//! Status derivation.
//!
//! Delivery and payment status are pure functions of the current item and
//! payment sums, and completion is derived from both. All three are always
//! recomputed together so they can never drift apart.

use serde::{Deserialize, Serialize};

use super::Money;

/// Overall order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Open,
    Completed,
    /// Terminal. Only set by cancellation, never by derivation.
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    PartiallyPaid,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    #[default]
    NotDelivered,
    PartiallyDelivered,
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// The three derived statuses of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statuses {
    pub delivery: DeliveryStatus,
    pub payment: PaymentStatus,
    pub order: OrderStatus,
}

/// Sums the deriver reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FulfillmentTotals {
    pub ordered_quantity: u64,
    pub delivered_quantity: u64,
    pub total_amount: Money,
    pub paid_amount: Money,
}

pub fn delivery_status(ordered: u64, delivered: u64) -> DeliveryStatus {
    if delivered == 0 {
        DeliveryStatus::NotDelivered
    } else if delivered < ordered {
        DeliveryStatus::PartiallyDelivered
    } else {
        DeliveryStatus::Delivered
    }
}

pub fn payment_status(total: Money, paid: Money) -> PaymentStatus {
    if paid.is_zero() {
        PaymentStatus::Unpaid
    } else if paid < total {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Paid
    }
}

/// Derives delivery status, then payment status, then completion.
///
/// The order status is `Completed` exactly when the order is fully delivered
/// and fully paid, and `Open` otherwise. Removing a payment therefore reopens
/// a completed order.
pub fn derive(totals: FulfillmentTotals) -> Statuses {
    let delivery = delivery_status(totals.ordered_quantity, totals.delivered_quantity);
    let payment = payment_status(totals.total_amount, totals.paid_amount);
    let order = if delivery == DeliveryStatus::Delivered && payment == PaymentStatus::Paid {
        OrderStatus::Completed
    } else {
        OrderStatus::Open
    };

    Statuses {
        delivery,
        payment,
        order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(ordered: u64, delivered: u64, total: i64, paid: i64) -> FulfillmentTotals {
        FulfillmentTotals {
            ordered_quantity: ordered,
            delivered_quantity: delivered,
            total_amount: Money::from_cents(total),
            paid_amount: Money::from_cents(paid),
        }
    }

    #[test]
    fn test_delivery_status_thresholds() {
        assert_eq!(delivery_status(15, 0), DeliveryStatus::NotDelivered);
        assert_eq!(delivery_status(15, 10), DeliveryStatus::PartiallyDelivered);
        assert_eq!(delivery_status(15, 15), DeliveryStatus::Delivered);
    }

    #[test]
    fn test_payment_status_thresholds() {
        let total = Money::from_cents(6000);
        assert_eq!(payment_status(total, Money::zero()), PaymentStatus::Unpaid);
        assert_eq!(
            payment_status(total, Money::from_cents(3000)),
            PaymentStatus::PartiallyPaid
        );
        assert_eq!(
            payment_status(total, Money::from_cents(6000)),
            PaymentStatus::Paid
        );
        assert_eq!(
            payment_status(total, Money::from_cents(7000)),
            PaymentStatus::Paid
        );
    }

    #[test]
    fn test_completed_only_when_delivered_and_paid() {
        assert_eq!(derive(totals(15, 15, 6000, 6000)).order, OrderStatus::Completed);
        assert_eq!(derive(totals(15, 10, 6000, 6000)).order, OrderStatus::Open);
        assert_eq!(derive(totals(15, 15, 6000, 5999)).order, OrderStatus::Open);
        assert_eq!(derive(totals(15, 0, 6000, 0)).order, OrderStatus::Open);
    }

    #[test]
    fn test_removing_payment_reopens() {
        let completed = derive(totals(5, 5, 1000, 1000));
        let after_removal = derive(totals(5, 5, 1000, 400));

        assert_eq!(completed.order, OrderStatus::Completed);
        assert_eq!(after_removal.payment, PaymentStatus::PartiallyPaid);
        assert_eq!(after_removal.order, OrderStatus::Open);
    }

    #[test]
    fn test_statuses_serialize_in_upper_snake_case() {
        let json = serde_json::to_value(derive(totals(2, 1, 100, 0))).unwrap();
        assert_eq!(json["delivery"], "PARTIALLY_DELIVERED");
        assert_eq!(json["payment"], "UNPAID");
        assert_eq!(json["order"], "OPEN");
    }
}
