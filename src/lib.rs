pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{Cli, Command};
pub use config::TomlConfig;

pub use adapters::{CsvOrderRepository, MemoryOrderRepository};
pub use crate::core::{
    admission::ImportGate,
    etl::{EngineSettings, ImportHandle, OrderEngine},
    geometry::GeometryStore,
    pipeline::{ImportPipeline, ImportSettings},
    resolver::{load_tax_table, JurisdictionResolver},
};
pub use domain::model::{
    CreateOrderRequest, ImportOutcome, ImportSummary, Order, OrderListQuery, OrderPage, OrderStatus,
};
pub use utils::error::{EtlError, Result};
