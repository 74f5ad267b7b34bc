pub mod admission;
pub mod classifier;
pub mod etl;
pub mod geometry;
pub mod pipeline;
pub mod resolver;

pub use crate::domain::model::{ImportOutcome, ImportSummary, Order, RawOrder};
pub use crate::domain::ports::{OrderRepository, TaxLookup};
pub use crate::utils::error::Result;
