//! Stock ledger events.

use common::{Audit, MovementId, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested movement, before validation.
///
/// `quantity` is as entered: positive for IN and OUT, signed for ADJUSTMENT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockMovement {
    pub product_id: ProductId,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub related_order_id: Option<OrderId>,
    pub reason: Option<String>,
    pub audit: Audit,
}

impl NewStockMovement {
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        movement_type: MovementType,
        audit: Audit,
    ) -> Self {
        Self {
            product_id,
            quantity,
            movement_type,
            related_order_id: None,
            reason: None,
            audit,
        }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.related_order_id = Some(order_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A recorded movement. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,

    /// Signed: negative for OUT and for downward adjustments.
    pub quantity: i64,

    pub movement_type: MovementType,
    pub related_order_id: Option<OrderId>,
    pub reason: Option<String>,
    pub created: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    StockMoved(StockMovement),
}

impl StockEvent {
    pub fn movement(&self) -> &StockMovement {
        match self {
            StockEvent::StockMoved(movement) => movement,
        }
    }
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockMoved(_) => "StockMoved",
        }
    }

    fn entity_refs(&self) -> Vec<Uuid> {
        vec![self.movement().id.as_uuid()]
    }
}
