use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Every entity in the system gets its own id type so that an order id can
/// never be passed where a product id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Key of an event stream in the event store.
    AggregateId
);

uuid_id!(
    /// Identifies an order (the aggregate root of the fulfillment stream).
    OrderId
);

uuid_id!(
    /// Identifies a line item inside an order.
    OrderItemId
);

uuid_id!(
    /// Identifies a product in the catalog; also keys the product's stock ledger.
    ProductId
);

uuid_id!(
    /// Identifies a customer.
    CustomerId
);

uuid_id!(
    /// Identifies the user performing an action.
    UserId
);

uuid_id!(
    /// Identifies a payment recorded against an order.
    PaymentId
);

uuid_id!(
    /// Identifies a delivery log entry.
    DeliveryId
);

uuid_id!(
    /// Identifies a stock movement.
    MovementId
);

impl From<OrderId> for AggregateId {
    fn from(id: OrderId) -> Self {
        AggregateId::from_uuid(id.as_uuid())
    }
}

impl From<ProductId> for AggregateId {
    fn from(id: ProductId) -> Self {
        AggregateId::from_uuid(id.as_uuid())
    }
}

/// Who performed a state change, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

impl Audit {
    /// Stamps an action by `user` at the current time.
    pub fn now(user: UserId) -> Self {
        Self {
            by: user,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
        assert_ne!(AggregateId::new(), AggregateId::new());
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(ProductId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn stream_keys_reuse_the_entity_uuid() {
        let order_id = OrderId::new();
        let product_id = ProductId::new();
        assert_eq!(AggregateId::from(order_id).as_uuid(), order_id.as_uuid());
        assert_eq!(AggregateId::from(product_id).as_uuid(), product_id.as_uuid());
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let id = PaymentId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let back: PaymentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn audit_now_records_the_actor() {
        let user = UserId::new();
        let audit = Audit::now(user);
        assert_eq!(audit.by, user);
        assert!(audit.at <= Utc::now());
    }
}
