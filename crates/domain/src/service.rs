//! Order fulfillment service.
//!
//! Owns every operation that touches an order together with the stock of the
//! products it delivers. Each call loads what it needs into a fresh
//! [`UnitOfWork`], validates against that state and commits everything in one
//! atomic write. Writers to the same streams queue on [`StreamLocks`] first.
//! A concurrency conflict from another process re-runs the call from a fresh
//! load after a short backoff.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{
    AggregateId, Audit, CustomerId, DeliveryId, OrderId, OrderItemId, PaymentId, ProductId,
};
use event_store::{EventStore, EventStoreExt};

use crate::config::FulfillmentConfig;
use crate::error::DomainError;
use crate::locks::StreamLocks;
use crate::order::{
    CreateOrder, Money, Order, OrderDelivery, OrderPatch, OrderStatus, Payment, PaymentMethod,
};
use crate::ports::{Customer, CustomerDirectory, IdentityContext, Product, ProductCatalog};
use crate::stock::{MovementType, NewStockMovement, ProductStock, StockEvent, StockMovement};
use crate::unit_of_work::UnitOfWork;

/// Keeps orders, payments, deliveries and product stock consistent.
pub struct FulfillmentService<S, P, C, I>
where
    S: EventStore,
    P: ProductCatalog,
    C: CustomerDirectory,
    I: IdentityContext,
{
    store: S,
    products: P,
    customers: C,
    identity: I,
    config: FulfillmentConfig,
    locks: StreamLocks,
}

impl<S, P, C, I> FulfillmentService<S, P, C, I>
where
    S: EventStore,
    P: ProductCatalog,
    C: CustomerDirectory,
    I: IdentityContext,
{
    /// Creates a service with the default configuration.
    pub fn new(store: S, products: P, customers: C, identity: I) -> Self {
        Self::with_config(store, products, customers, identity, FulfillmentConfig::default())
    }

    pub fn with_config(
        store: S,
        products: P,
        customers: C,
        identity: I,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            products,
            customers,
            identity,
            config,
            locks: StreamLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // Orders

    /// Creates an order and its items. No stock is checked or moved.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let order = self
            .with_retry("create_order", || self.try_create_order(cmd.clone()))
            .await?;

        metrics::counter!("fulfillment_orders_created_total").increment(1);
        tracing::info!(
            order_id = %cmd.order_id,
            customer_id = %cmd.customer_id,
            total = %order.total_amount(),
            "order created"
        );
        Ok(order)
    }

    async fn try_create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        self.require_customer(cmd.customer_id).await?;
        for item in &cmd.items {
            self.require_product(item.product_id).await?;
        }

        let _order_lock = self.locks.lock(cmd.order_id.into()).await;
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load(cmd.order_id.into()).await?;
        let events = order.create(cmd.order_id, cmd.customer_id, cmd.items, self.audit())?;
        uow.stage(cmd.order_id.into(), &mut order, events)?;
        uow.commit().await?;

        Ok(order)
    }

    /// Applies a patch. Only the customer can be changed.
    #[tracing::instrument(skip(self))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, DomainError> {
        self.with_retry("update_order", || async {
            if let Some(customer_id) = patch.customer_id {
                self.require_customer(customer_id).await?;
            }

            let _order_lock = self.locks.lock(order_id.into()).await;
            let mut uow = UnitOfWork::new(&self.store);
            let mut order = self.load_order(&mut uow, order_id).await?;
            let events = order.update_customer(patch.customer_id, self.audit())?;
            uow.stage(order_id.into(), &mut order, events)?;
            uow.commit().await?;

            Ok(order)
        })
        .await
    }

    /// Cancels the order and returns every delivered unit to stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let order = self
            .with_retry("cancel_order", || async {
                let audit = self.audit();
                let _order_lock = self.locks.lock(order_id.into()).await;
                let mut uow = UnitOfWork::new(&self.store);
                let mut order = self.load_order(&mut uow, order_id).await?;

                let delivered = order.delivered_items();
                let stock_ids = delivered.iter().map(|&(id, _)| AggregateId::from(id));
                let _stock_locks = self.locks.lock_all(stock_ids).await;
                let events = order.cancel(audit)?;
                uow.stage(order_id.into(), &mut order, events)?;

                let reason = format!("Canceled order {order_id}: stock returned");
                self.return_stock(&mut uow, order_id, delivered, &reason, audit)
                    .await?;
                uow.commit().await?;

                Ok(order)
            })
            .await?;

        tracing::info!(%order_id, "order canceled");
        Ok(order)
    }

    /// Deletes the order, first returning delivered stock unless a
    /// cancellation already did.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<(), DomainError> {
        self.with_retry("delete_order", || async {
            let audit = self.audit();
            let _order_lock = self.locks.lock(order_id.into()).await;
            let mut uow = UnitOfWork::new(&self.store);
            let mut order = self.load_order(&mut uow, order_id).await?;

            let delivered = if order.is_canceled() {
                Vec::new()
            } else {
                order.delivered_items()
            };
            let stock_ids = delivered.iter().map(|&(id, _)| AggregateId::from(id));
            let _stock_locks = self.locks.lock_all(stock_ids).await;
            let events = order.delete(audit)?;
            uow.stage(order_id.into(), &mut order, events)?;

            let reason = format!("Deleted order {order_id}: stock returned");
            self.return_stock(&mut uow, order_id, delivered, &reason, audit)
                .await?;
            uow.commit().await?;

            Ok(())
        })
        .await?;

        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    /// Returns the order, or `None` if it was never created or was deleted.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let order: Order = uow.load(order_id.into()).await?;
        Ok(order.exists().then_some(order))
    }

    /// Re-derives delivery, payment and completion status from current sums.
    #[tracing::instrument(skip(self))]
    pub async fn recalculate_order_statuses(
        &self,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.with_retry("recalculate_order_statuses", || async {
            let _order_lock = self.locks.lock(order_id.into()).await;
            let mut uow = UnitOfWork::new(&self.store);
            let mut order = self.load_order(&mut uow, order_id).await?;
            let before = order.order_status();

            let events = order.recalculate(self.audit())?;
            uow.stage(order_id.into(), &mut order, events)?;
            uow.commit().await?;

            log_status_change(order_id, before, &order);
            Ok(order)
        })
        .await
    }

    // Deliveries

    /// Delivers `quantity` units of an item: moves the stock out, records the
    /// delivery and recomputes the order statuses in one commit.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_order_item(
        &self,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<Order, DomainError> {
        let order = self
            .with_retry("deliver_order_item", || {
                self.try_deliver_order_item(item_id, quantity)
            })
            .await?;

        metrics::counter!("fulfillment_deliveries_total").increment(1);
        tracing::info!(%item_id, quantity, status = ?order.delivery_status(), "item delivered");
        Ok(order)
    }

    async fn try_deliver_order_item(
        &self,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<Order, DomainError> {
        let not_found = || DomainError::not_found("OrderItem", item_id);

        let owner = self
            .store
            .locate_owner(item_id.as_uuid())
            .await?
            .ok_or_else(not_found)?;

        let _order_lock = self.locks.lock(owner).await;
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load(owner).await?;
        let (order_id, product_id) = match (order.order_id(), order.item(item_id)) {
            (Some(order_id), Some(item)) if order.exists() => (order_id, item.product_id),
            _ => return Err(not_found()),
        };

        let product = self.products.find_product(product_id).await?;
        let audit = self.audit();
        let before = order.order_status();

        let events = order.deliver_item(
            item_id,
            quantity,
            product.as_ref().map(|p| p.name.as_str()),
            audit,
        )?;

        let _stock_lock = self.locks.lock(product_id.into()).await;
        let mut stock: ProductStock = uow.load(product_id.into()).await?;
        let movement = stock.validate_movement(
            NewStockMovement::new(product_id, i64::from(quantity), MovementType::Out, audit)
                .for_order(order_id)
                .with_reason(format!("Delivered for order {order_id}")),
        )?;

        uow.stage(order_id.into(), &mut order, events)?;
        uow.stage(
            product_id.into(),
            &mut stock,
            vec![StockEvent::StockMoved(movement)],
        )?;
        uow.commit().await?;

        count_movement(MovementType::Out);
        log_status_change(order_id, before, &order);
        Ok(order)
    }

    /// Delivery log of an order, newest first.
    pub async fn list_order_deliveries(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderDelivery>, DomainError> {
        let order = self.read_order(order_id).await?;

        let mut deliveries: Vec<OrderDelivery> =
            order.deliveries().iter().rev().cloned().collect();
        deliveries.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));
        Ok(deliveries)
    }

    /// Writes a standalone delivery note. Stock and delivered quantities are
    /// left alone.
    #[tracing::instrument(skip(self))]
    pub async fn create_order_delivery(
        &self,
        order_id: OrderId,
        note: Option<String>,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<OrderDelivery, DomainError> {
        let delivery_id = DeliveryId::new();

        let delivery = self
            .with_retry("create_order_delivery", || async {
                let _order_lock = self.locks.lock(order_id.into()).await;
                let mut uow = UnitOfWork::new(&self.store);
                let mut order = self.load_order(&mut uow, order_id).await?;
                let events =
                    order.record_delivery(delivery_id, note.clone(), delivered_at, self.audit())?;
                uow.stage(order_id.into(), &mut order, events)?;
                uow.commit().await?;

                order
                    .delivery(delivery_id)
                    .cloned()
                    .ok_or_else(|| DomainError::not_found("OrderDelivery", delivery_id))
            })
            .await?;

        tracing::info!(%order_id, %delivery_id, "delivery recorded");
        Ok(delivery)
    }

    // Payments

    /// Records a payment and recomputes the order statuses.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Payment, DomainError> {
        let payment_id = PaymentId::new();

        let payment = self
            .with_retry("create_payment", || async {
                let _order_lock = self.locks.lock(order_id.into()).await;
                let mut uow = UnitOfWork::new(&self.store);
                let mut order = self.load_order(&mut uow, order_id).await?;
                let before = order.order_status();

                let events = order.receive_payment(payment_id, amount, method, self.audit())?;
                uow.stage(order_id.into(), &mut order, events)?;
                uow.commit().await?;

                log_status_change(order_id, before, &order);
                order
                    .payment(payment_id)
                    .cloned()
                    .ok_or_else(|| DomainError::not_found("Payment", payment_id))
            })
            .await?;

        metrics::counter!("fulfillment_payments_total").increment(1);
        tracing::info!(%order_id, %payment_id, %amount, "payment received");
        Ok(payment)
    }

    /// Removes a payment. The order may drop back from COMPLETED to OPEN.
    #[tracing::instrument(skip(self))]
    pub async fn delete_payment(&self, payment_id: PaymentId) -> Result<(), DomainError> {
        self.with_retry("delete_payment", || async {
            let owner = self
                .store
                .locate_owner(payment_id.as_uuid())
                .await?
                .ok_or_else(|| DomainError::not_found("Payment", payment_id))?;

            let _order_lock = self.locks.lock(owner).await;
            let mut uow = UnitOfWork::new(&self.store);
            let mut order: Order = uow.load(owner).await?;
            let order_id = match order.order_id() {
                Some(order_id) if order.exists() && order.payment(payment_id).is_some() => {
                    order_id
                }
                _ => return Err(DomainError::not_found("Payment", payment_id)),
            };
            let before = order.order_status();

            let events = order.remove_payment(payment_id, self.audit())?;
            uow.stage(owner, &mut order, events)?;
            uow.commit().await?;

            log_status_change(order_id, before, &order);
            Ok(())
        })
        .await?;

        tracing::info!(%payment_id, "payment removed");
        Ok(())
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, DomainError> {
        let not_found = || DomainError::not_found("Payment", payment_id);

        let owner = self
            .store
            .locate_owner(payment_id.as_uuid())
            .await?
            .ok_or_else(not_found)?;

        let mut uow = UnitOfWork::new(&self.store);
        let order: Order = uow.load(owner).await?;
        if !order.exists() {
            return Err(not_found());
        }
        order.payment(payment_id).cloned().ok_or_else(not_found)
    }

    // Stock

    /// Records a manual IN, OUT or ADJUSTMENT movement for a product.
    #[tracing::instrument(skip(self))]
    pub async fn create_stock_movement(
        &self,
        product_id: ProductId,
        quantity: i64,
        movement_type: MovementType,
        reason: Option<String>,
    ) -> Result<StockMovement, DomainError> {
        let movement = self
            .with_retry("create_stock_movement", || async {
                self.require_product(product_id).await?;

                let mut request =
                    NewStockMovement::new(product_id, quantity, movement_type, self.audit());
                if let Some(reason) = &reason {
                    request = request.with_reason(reason.clone());
                }

                let _stock_lock = self.locks.lock(product_id.into()).await;
                let mut uow = UnitOfWork::new(&self.store);
                let mut stock: ProductStock = uow.load(product_id.into()).await?;
                let movement = stock.validate_movement(request)?;
                uow.stage(
                    product_id.into(),
                    &mut stock,
                    vec![StockEvent::StockMoved(movement.clone())],
                )?;
                uow.commit().await?;

                Ok(movement)
            })
            .await?;

        count_movement(movement_type);
        tracing::info!(
            %product_id,
            quantity = movement.quantity,
            movement_type = %movement_type,
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// Current stock of a product; 0 if it never moved.
    pub async fn current_stock(&self, product_id: ProductId) -> Result<i64, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let stock: ProductStock = uow.load(product_id.into()).await?;
        Ok(stock.current_stock())
    }

    /// Every movement recorded for a product, oldest first.
    pub async fn stock_movements(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockMovement>, DomainError> {
        let envelopes = self.store.read_full_stream(product_id.into()).await?;

        let mut movements = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let StockEvent::StockMoved(movement) = envelope.decode::<StockEvent>()?;
            movements.push(movement);
        }
        Ok(movements)
    }
}

// Helpers
impl<S, P, C, I> FulfillmentService<S, P, C, I>
where
    S: EventStore,
    P: ProductCatalog,
    C: CustomerDirectory,
    I: IdentityContext,
{
    /// Runs `attempt` until it succeeds, fails with anything but a conflict,
    /// or runs out of retries. The wait between runs doubles each time, up to
    /// 64 times the configured backoff.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let started = Instant::now();
        let mut retries = 0;

        let result = loop {
            match attempt().await {
                Err(error) if error.is_conflict() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    metrics::counter!(
                        "fulfillment_conflict_retries_total",
                        "operation" => operation
                    )
                    .increment(1);
                    tracing::warn!(operation, retries, %error, "concurrency conflict, retrying");

                    let backoff = self
                        .config
                        .conflict_backoff
                        .saturating_mul(1 << (retries - 1).min(6));
                    tokio::time::sleep(backoff).await;
                }
                other => break other,
            }
        };

        metrics::histogram!("fulfillment_operation_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            tracing::warn!(operation, kind = ?error.kind(), %error, "operation rejected");
        }
        result
    }

    fn audit(&self) -> Audit {
        Audit::now(self.identity.current_user())
    }

    async fn require_customer(&self, customer_id: CustomerId) -> Result<Customer, DomainError> {
        self.customers
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Customer", customer_id))
    }

    async fn require_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        self.products
            .find_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))
    }

    async fn load_order(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        let order: Order = uow.load(order_id.into()).await?;
        if !order.exists() {
            return Err(DomainError::not_found("Order", order_id));
        }
        Ok(order)
    }

    async fn read_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        self.load_order(&mut uow, order_id).await
    }

    /// Stages one IN movement per delivered item, loading each product's
    /// ledger once.
    async fn return_stock(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        order_id: OrderId,
        delivered: Vec<(ProductId, u32)>,
        reason: &str,
        audit: Audit,
    ) -> Result<(), DomainError> {
        let mut ledgers: HashMap<ProductId, ProductStock> = HashMap::new();

        for (product_id, quantity) in delivered {
            let stock = match ledgers.entry(product_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(uow.load(product_id.into()).await?),
            };

            let movement = stock.validate_movement(
                NewStockMovement::new(product_id, i64::from(quantity), MovementType::In, audit)
                    .for_order(order_id)
                    .with_reason(reason),
            )?;
            uow.stage(
                product_id.into(),
                stock,
                vec![StockEvent::StockMoved(movement)],
            )?;

            count_movement(MovementType::In);
            tracing::debug!(%order_id, %product_id, quantity, "stock returned");
        }

        Ok(())
    }
}

fn count_movement(movement_type: MovementType) {
    metrics::counter!("fulfillment_stock_movements_total", "type" => movement_type.as_str())
        .increment(1);
}

fn log_status_change(order_id: OrderId, before: OrderStatus, order: &Order) {
    match (before, order.order_status()) {
        (OrderStatus::Open, OrderStatus::Completed) => {
            tracing::info!(%order_id, "order completed");
        }
        (OrderStatus::Completed, OrderStatus::Open) => {
            tracing::info!(%order_id, "order reopened");
        }
        _ => {}
    }
}

impl<S, P, C, I> std::fmt::Debug for FulfillmentService<S, P, C, I>
where
    S: EventStore,
    P: ProductCatalog,
    C: CustomerDirectory,
    I: IdentityContext,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulfillmentService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
