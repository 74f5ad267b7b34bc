use crate::domain::model::{JurisdictionTax, Order, OrderPage};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Persistence collaborator. Opaque to the core beyond success or failure.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores one order and returns its assigned id.
    async fn create(&self, order: &Order) -> Result<i64>;

    /// Stores a flushed batch. Callers never pass an empty slice.
    async fn batch_create(&self, orders: &[Order]) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Orders in id order, skipping `offset` and returning at most `limit`.
    async fn list(&self, offset: usize, limit: usize) -> Result<OrderPage>;
}

/// Point → tax record lookup used by the single-create path and the import pipeline.
pub trait TaxLookup: Send + Sync {
    fn tax_for(&self, longitude: f64, latitude: f64) -> Option<&JurisdictionTax>;
}
