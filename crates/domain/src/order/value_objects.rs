//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{Audit, DeliveryId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Adds two amounts, or `None` if the sum leaves the `i64` cent range.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    pub fn saturating_add(self, rhs: Money) -> Money {
        Money::from_cents(self.cents.saturating_add(rhs.cents))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

/// A line requested when creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,

    /// Price per unit, frozen into the order at creation.
    pub unit_price: Money,
}

impl NewOrderItem {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,

    /// Quantity ordered.
    pub quantity: u32,

    /// Quantity delivered so far; never decreases and never exceeds `quantity`.
    pub delivered_quantity: u32,

    pub unit_price: Money,
}

impl OrderItem {
    /// Returns quantity * unit_price, or `None` if it does not fit in cents.
    pub fn total_price(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }

    /// Quantity still to deliver.
    pub fn remaining(&self) -> u32 {
        self.quantity - self.delivered_quantity
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    CreditCard,
    Other,
}

/// A payment received against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,

    /// Always greater than zero.
    pub amount: Money,

    pub method: PaymentMethod,

    /// The user who received the payment, and when.
    pub received: Audit,
}

/// A human-readable delivery log entry.
///
/// Independent of the per-item `delivered_quantity` bookkeeping: an order can
/// carry entries that do not map to a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub delivered_at: DateTime<Utc>,
    pub delivered_by: UserId,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.units(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(6000).to_string(), "60.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!(a.checked_add(b), Some(Money::from_cents(1500)));
        assert_eq!(a.checked_multiply(3), Some(Money::from_cents(3000)));
        assert_eq!(a.saturating_add(b).cents(), 1500);
    }

    #[test]
    fn test_money_overflow_is_detected() {
        let huge = Money::from_cents(i64::MAX / 2);

        assert_eq!(huge.checked_multiply(3), None);
        assert_eq!(huge.checked_add(huge).map(|m| m.cents()), Some(i64::MAX - 1));
        assert_eq!(huge.checked_add(huge).and_then(|m| m.checked_add(huge)), None);
        assert_eq!(
            Money::from_cents(i64::MAX).saturating_add(Money::from_cents(1)).cents(),
            i64::MAX
        );
    }

    #[test]
    fn test_money_sign() {
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(-100).is_negative());
    }

    #[test]
    fn test_order_item_totals() {
        let item = OrderItem {
            id: OrderItemId::new(),
            product_id: ProductId::new(),
            quantity: 10,
            delivered_quantity: 4,
            unit_price: Money::from_cents(500),
        };
        assert_eq!(item.total_price(), Some(Money::from_cents(5000)));
        assert_eq!(item.remaining(), 6);
    }

    #[test]
    fn test_payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"BANK_TRANSFER\""
        );
        let method: PaymentMethod = serde_json::from_str("\"CREDIT_CARD\"").unwrap();
        assert_eq!(method, PaymentMethod::CreditCard);
    }
}
