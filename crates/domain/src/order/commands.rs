//! Order commands.

use common::{CustomerId, OrderId, ProductId};

use super::{Money, NewOrderItem};

/// Command to create an order together with its items.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order id to create. Generated up front so a retried attempt
    /// creates the same order.
    pub order_id: OrderId,

    pub customer_id: CustomerId,
    pub items: Vec<NewOrderItem>,
}

impl CreateOrder {
    /// Creates a command with a generated order id and no items.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            order_id: OrderId::new(),
            customer_id,
            items: Vec::new(),
        }
    }

    /// Adds a line to the command.
    pub fn with_item(mut self, product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        self.items
            .push(NewOrderItem::new(product_id, quantity, unit_price));
        self
    }
}

/// Changes allowed on an existing order. Only the customer can change.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub customer_id: Option<CustomerId>,
}

impl OrderPatch {
    pub fn customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_builder() {
        let customer_id = CustomerId::new();
        let product = ProductId::new();

        let cmd = CreateOrder::for_customer(customer_id)
            .with_item(product, 10, Money::from_cents(500))
            .with_item(ProductId::new(), 5, Money::from_cents(200));

        assert_eq!(cmd.customer_id, customer_id);
        assert_eq!(cmd.items.len(), 2);
        assert_eq!(cmd.items[0].product_id, product);
        assert_eq!(cmd.items[0].quantity, 10);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let customer_id = CustomerId::new();
        let a = CreateOrder::for_customer(customer_id);
        let b = CreateOrder::for_customer(customer_id);
        assert_ne!(a.order_id, b.order_id);
    }

    #[test]
    fn test_patch() {
        assert!(OrderPatch::default().customer_id.is_none());
        let id = CustomerId::new();
        assert_eq!(OrderPatch::customer(id).customer_id, Some(id));
    }
}
