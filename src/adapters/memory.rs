use crate::core::{Order, OrderRepository, Result};
use crate::domain::model::OrderPage;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    orders: Vec<Order>,
    batch_sizes: Vec<usize>,
    next_id: i64,
}

impl MemoryState {
    fn push(&mut self, order: &Order) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.orders.push(Order {
            id,
            ..order.clone()
        });
        id
    }
}

/// Keeps orders in memory. Backs `--dry-run` and the tests.
#[derive(Debug, Default)]
pub struct MemoryOrderRepository {
    state: Mutex<MemoryState>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Sizes of the batches received through `batch_create`, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().await.batch_sizes.clone()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<i64> {
        Ok(self.state.lock().await.push(order))
    }

    async fn batch_create(&self, orders: &[Order]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.batch_sizes.push(orders.len());
        for order in orders {
            state.push(order);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|order| order.id == id).cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<OrderPage> {
        let state = self.state.lock().await;
        Ok(OrderPage {
            orders: state.orders.iter().skip(offset).take(limit).cloned().collect(),
            total: state.orders.len(),
        })
    }
}
