use crate::core::admission::{ImportGate, ImportSlot};
use crate::core::classifier::classify;
use crate::core::pipeline::{ImportPipeline, ImportSettings};
use crate::core::{ImportSummary, Order, OrderRepository, RawOrder, TaxLookup};
use crate::domain::model::{CreateOrderRequest, OrderListQuery, OrderPage};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_import_file, Validate};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Resolves to the import's counts once its pipeline finishes.
pub type ImportHandle = JoinHandle<ImportSummary>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub import: ImportSettings,
    pub max_concurrent_imports: usize,
    pub max_file_size_bytes: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            import: ImportSettings::default(),
            max_concurrent_imports: 4,
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Entry point for both order paths: single create and gated bulk import.
pub struct OrderEngine {
    lookup: Arc<dyn TaxLookup>,
    repository: Arc<dyn OrderRepository>,
    gate: ImportGate,
    settings: EngineSettings,
}

impl OrderEngine {
    pub fn new(
        lookup: Arc<dyn TaxLookup>,
        repository: Arc<dyn OrderRepository>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            lookup,
            repository,
            gate: ImportGate::new(settings.max_concurrent_imports),
            settings,
        }
    }

    pub fn gate(&self) -> &ImportGate {
        &self.gate
    }

    /// Validates, prices and persists one order. A point outside every
    /// jurisdiction is not an error: it yields an `out_of_scope` order.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        let raw = RawOrder::try_from(request)?;
        let tax = self.lookup.tax_for(raw.longitude, raw.latitude);
        let mut order = classify(&raw, tax);

        let id = self
            .repository
            .create(&order)
            .await
            .map_err(|e| EtlError::PersistenceError {
                message: format!("failed to create order: {}", e),
            })?;
        order.id = id;

        tracing::info!(id, status = order.status.as_str(), "Created order");
        Ok(order)
    }

    pub async fn get_order(&self, id: i64) -> Result<Order> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(EtlError::OrderNotFound { id })
    }

    pub async fn list_orders(&self, query: OrderListQuery) -> Result<OrderPage> {
        query.validate()?;
        let page = self.repository.list(query.offset(), query.limit()).await?;
        tracing::debug!(
            page = query.page,
            returned = page.orders.len(),
            total = page.total,
            "Listed orders"
        );
        Ok(page)
    }

    /// Starts a background import if a slot is free, otherwise rejects at once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_import<R>(&self, source: R) -> Result<ImportHandle>
    where
        R: Read + Send + 'static,
    {
        let slot = self.acquire_slot()?;
        Ok(self.spawn_pipeline(slot, source))
    }

    /// Checks the file, takes a slot, then opens the file. The slot goes back
    /// to the pool if opening fails.
    pub fn submit_import_file<P: AsRef<Path>>(&self, path: P) -> Result<ImportHandle> {
        let path = path.as_ref();
        validate_import_file(path, self.settings.max_file_size_bytes)?;

        let slot = self.acquire_slot()?;
        let file = File::open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to open import file");
            e
        })?;

        tracing::info!(path = %path.display(), "Accepted import for processing");
        Ok(self.spawn_pipeline(slot, file))
    }

    fn acquire_slot(&self) -> Result<ImportSlot> {
        self.gate.try_acquire().ok_or_else(|| {
            tracing::warn!(capacity = self.gate.capacity(), "Rejected import: no free slot");
            EtlError::TooManyImports {
                capacity: self.gate.capacity(),
            }
        })
    }

    fn spawn_pipeline<R>(&self, slot: ImportSlot, source: R) -> ImportHandle
    where
        R: Read + Send + 'static,
    {
        let pipeline = ImportPipeline::new(
            Arc::clone(&self.lookup),
            Arc::clone(&self.repository),
            self.settings.import.clone(),
        );
        let runtime = tokio::runtime::Handle::current();

        // 讀取是阻塞 I/O，放到 blocking 執行緒
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            runtime.block_on(pipeline.run(source))
        })
    }
}
