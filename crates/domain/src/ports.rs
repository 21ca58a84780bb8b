//! Collaborators the fulfillment engine consumes, with in-memory implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::order::Money;

/// Catalog view of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,

    /// Current catalog price. Orders freeze their own unit price at creation.
    pub list_price: Money,
}

impl Product {
    pub fn new(name: impl Into<String>, list_price: Money) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            list_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
        }
    }
}

/// Product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, DomainError>;
}

/// Customer lookup.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_customer(&self, id: CustomerId) -> Result<Option<Customer>, DomainError>;
}

/// Supplies the acting user for audit fields.
pub trait IdentityContext: Send + Sync {
    fn current_user(&self) -> UserId;
}

/// In-memory product catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove(&self, id: ProductId) -> Option<Product> {
        self.products.write().await.remove(&id)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}

/// In-memory customer directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find_customer(&self, id: CustomerId) -> Result<Option<Customer>, DomainError> {
        Ok(self.customers.read().await.get(&id).cloned())
    }
}

/// Identity that always answers with the same user.
#[derive(Debug, Clone, Copy)]
pub struct FixedIdentity(UserId);

impl FixedIdentity {
    pub fn new(user: UserId) -> Self {
        Self(user)
    }
}

impl IdentityContext for FixedIdentity {
    fn current_user(&self) -> UserId {
        self.0
    }
}
