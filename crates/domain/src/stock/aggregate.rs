use common::{AggregateId, MovementId, ProductId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{MovementType, NewStockMovement, StockError, StockEvent, StockMovement};

/// Stock ledger of one product.
///
/// `current_stock` always equals the sum of every recorded movement quantity
/// and is never negative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductStock {
    product_id: Option<ProductId>,

    #[serde(default)]
    version: Version,

    current_stock: i64,
    movement_count: u64,
}

impl Aggregate for ProductStock {
    type Event = StockEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "ProductStock"
    }

    fn id(&self) -> Option<AggregateId> {
        self.product_id.map(AggregateId::from)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            StockEvent::StockMoved(movement) => {
                self.product_id = Some(movement.product_id);
                self.current_stock = self.current_stock.saturating_add(movement.quantity);
                self.movement_count += 1;
            }
        }
    }
}

impl SnapshotCapable for ProductStock {
    fn snapshot_interval() -> usize {
        25
    }
}

impl ProductStock {
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn movement_count(&self) -> u64 {
        self.movement_count
    }

    /// Validates a movement against the current stock and signs its quantity.
    ///
    /// - IN: quantity must be positive; stored as is.
    /// - OUT: quantity must be positive and covered by current stock; stored
    ///   negated.
    /// - ADJUSTMENT: signed; the resulting stock must not be negative.
    ///
    /// A movement that would push the stock past `i64::MAX` is rejected.
    pub fn validate_movement(
        &self,
        movement: NewStockMovement,
    ) -> Result<StockMovement, StockError> {
        let signed = match movement.movement_type {
            MovementType::In => {
                ensure_positive(movement.movement_type, movement.quantity)?;
                self.stock_after(movement.quantity)?;
                movement.quantity
            }
            MovementType::Out => {
                ensure_positive(movement.movement_type, movement.quantity)?;
                if self.current_stock < movement.quantity {
                    return Err(StockError::InsufficientStock {
                        current: self.current_stock,
                        requested: movement.quantity,
                    });
                }
                -movement.quantity
            }
            MovementType::Adjustment => {
                if self.stock_after(movement.quantity)? < 0 {
                    return Err(StockError::NegativeStock {
                        current: self.current_stock,
                        adjustment: movement.quantity,
                    });
                }
                movement.quantity
            }
        };

        Ok(StockMovement {
            id: MovementId::new(),
            product_id: movement.product_id,
            quantity: signed,
            movement_type: movement.movement_type,
            related_order_id: movement.related_order_id,
            reason: movement.reason,
            created: movement.audit,
        })
    }
}

impl ProductStock {
    fn stock_after(&self, quantity: i64) -> Result<i64, StockError> {
        self.current_stock
            .checked_add(quantity)
            .ok_or(StockError::StockOutOfRange {
                current: self.current_stock,
                quantity,
            })
    }
}

fn ensure_positive(movement_type: MovementType, quantity: i64) -> Result<(), StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity {
            movement_type,
            quantity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Audit, UserId};

    fn movement(product_id: ProductId, quantity: i64, kind: MovementType) -> NewStockMovement {
        NewStockMovement::new(product_id, quantity, kind, Audit::now(UserId::new()))
    }

    fn record(
        stock: &ProductStock,
        movement: NewStockMovement,
    ) -> Result<Vec<StockEvent>, StockError> {
        stock
            .validate_movement(movement)
            .map(|moved| vec![StockEvent::StockMoved(moved)])
    }

    fn stocked(quantity: i64) -> (ProductStock, ProductId) {
        let product_id = ProductId::new();
        let mut stock = ProductStock::default();
        let events = record(&stock, movement(product_id, quantity, MovementType::In)).unwrap();
        stock.apply_events(events);
        (stock, product_id)
    }

    #[test]
    fn test_in_adds_stock() {
        let (stock, product_id) = stocked(20);
        assert_eq!(stock.current_stock(), 20);
        assert_eq!(stock.product_id(), Some(product_id));
        assert_eq!(stock.movement_count(), 1);
    }

    #[test]
    fn test_out_is_stored_negated() {
        let (mut stock, product_id) = stocked(20);
        let events = record(&stock, movement(product_id, 8, MovementType::Out)).unwrap();
        assert_eq!(events[0].movement().quantity, -8);

        stock.apply_events(events);
        assert_eq!(stock.current_stock(), 12);
    }

    #[test]
    fn test_out_beyond_stock_fails() {
        let (stock, product_id) = stocked(20);
        let err = record(&stock, movement(product_id, 25, MovementType::Out)).unwrap_err();

        assert!(matches!(
            err,
            StockError::InsufficientStock {
                current: 20,
                requested: 25
            }
        ));
        assert_eq!(stock.current_stock(), 20);
    }

    #[test]
    fn test_out_of_exact_stock_succeeds() {
        let (mut stock, product_id) = stocked(5);
        let events = record(&stock, movement(product_id, 5, MovementType::Out)).unwrap();
        stock.apply_events(events);
        assert_eq!(stock.current_stock(), 0);
    }

    #[test]
    fn test_in_and_out_need_positive_quantity() {
        let (stock, product_id) = stocked(5);
        for (quantity, kind) in [
            (0, MovementType::In),
            (-3, MovementType::In),
            (0, MovementType::Out),
            (-1, MovementType::Out),
        ] {
            assert!(matches!(
                record(&stock, movement(product_id, quantity, kind)),
                Err(StockError::InvalidQuantity { .. })
            ));
        }
    }

    #[test]
    fn test_negative_adjustment_below_zero_fails() {
        let (stock, product_id) = stocked(10);
        let err = record(&stock, movement(product_id, -15, MovementType::Adjustment)).unwrap_err();

        assert!(err.to_string().starts_with("stock cannot be negative"));
        assert_eq!(stock.current_stock(), 10);
    }

    #[test]
    fn test_adjustments_are_signed() {
        let (mut stock, product_id) = stocked(10);
        for quantity in [-10, 3, 0] {
            let adjustment = movement(product_id, quantity, MovementType::Adjustment);
            let events = record(&stock, adjustment).unwrap();
            stock.apply_events(events);
        }
        assert_eq!(stock.current_stock(), 3);
        assert_eq!(stock.movement_count(), 4);
    }

    #[test]
    fn test_in_past_range_is_rejected() {
        let (stock, product_id) = stocked(i64::MAX);
        let err = record(&stock, movement(product_id, 1, MovementType::In)).unwrap_err();

        assert!(matches!(
            err,
            StockError::StockOutOfRange {
                current: i64::MAX,
                quantity: 1
            }
        ));
        assert_eq!(stock.current_stock(), i64::MAX);
        assert_eq!(stock.movement_count(), 1);
    }

    #[test]
    fn test_adjustment_past_range_is_rejected() {
        let (stock, product_id) = stocked(10);
        let err = record(
            &stock,
            movement(product_id, i64::MAX, MovementType::Adjustment),
        )
        .unwrap_err();

        assert!(matches!(err, StockError::StockOutOfRange { current: 10, .. }));
        assert_eq!(stock.current_stock(), 10);

        let err = record(
            &stock,
            movement(product_id, i64::MIN, MovementType::Adjustment),
        )
        .unwrap_err();
        assert!(matches!(err, StockError::NegativeStock { .. }));
    }
}
