//! Streaming CSV import.
//!
//! Rows are read, parsed, priced and buffered one at a time; every
//! `batch_size` orders the buffer is handed to the repository. The run is
//! bounded by one deadline taken at start and checked before each row.
//!
//! After the read loop ends, for any reason (end of input, deadline, or a
//! source I/O error), whatever is still buffered is flushed once. Rows that
//! were accepted before the deadline are never dropped silently.

use crate::core::classifier::classify;
use crate::core::{ImportOutcome, ImportSummary, OrderRepository, RawOrder, TaxLookup};
use crate::domain::model::Order;
use crate::utils::error::RowError;
use chrono::NaiveDateTime;
use csv::StringRecord;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum columns per row: id, longitude, latitude, timestamp, subtotal.
pub const MIN_COLUMNS: usize = 5;

/// Fixed timestamp layout, fractional seconds optional.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub timeout: Duration,
    /// Treat the first row as a header and skip it without counting.
    pub has_headers: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            timeout: Duration::from_secs(300),
            has_headers: false,
        }
    }
}

/// Absolute point in time after which no new row is started.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        // saturate absurd timeouts instead of overflowing the clock
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365));
        Self { at }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Parses one CSV row. Columns past the fifth are ignored.
pub fn parse_row(record: &StringRecord) -> Result<RawOrder, RowError> {
    if record.len() < MIN_COLUMNS {
        return Err(RowError::ColumnCount {
            expected: MIN_COLUMNS,
            actual: record.len(),
        });
    }

    let longitude = parse_number("longitude", &record[1])?;
    let latitude = parse_number("latitude", &record[2])?;
    let timestamp = NaiveDateTime::parse_from_str(&record[3], TIMESTAMP_FORMAT)
        .map_err(|_| RowError::InvalidTimestamp {
            value: record[3].to_string(),
        })?
        .and_utc();
    let subtotal = parse_number("subtotal", &record[4])?;

    Ok(RawOrder {
        longitude,
        latitude,
        subtotal,
        timestamp,
    })
}

fn parse_number(column: &'static str, value: &str) -> Result<f64, RowError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowError::InvalidNumber {
            column,
            value: value.to_string(),
        })
}

#[derive(Debug, Default)]
struct RunCounters {
    processed: usize,
    failed: usize,
    batches_flushed: usize,
    batches_failed: usize,
}

pub struct ImportPipeline {
    lookup: Arc<dyn TaxLookup>,
    repository: Arc<dyn OrderRepository>,
    settings: ImportSettings,
}

impl ImportPipeline {
    pub fn new(
        lookup: Arc<dyn TaxLookup>,
        repository: Arc<dyn OrderRepository>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            lookup,
            repository,
            settings,
        }
    }

    /// Runs one import to completion and returns its counts.
    ///
    /// Row and batch failures are logged and counted, never returned. The
    /// source is consumed and dropped before this returns.
    pub async fn run<R: Read>(&self, source: R) -> ImportSummary {
        let started = Instant::now();
        let deadline = Deadline::after(self.settings.timeout);
        let batch_size = self.settings.batch_size.max(1);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.settings.has_headers)
            .flexible(true)
            .from_reader(source);

        let mut counters = RunCounters::default();
        let mut batch: Vec<Order> = Vec::with_capacity(batch_size);
        let mut record = StringRecord::new();

        let outcome = loop {
            if deadline.is_expired() {
                tracing::error!(
                    timeout = ?self.settings.timeout,
                    processed = counters.processed,
                    "Import processing timeout reached"
                );
                break ImportOutcome::TimedOut;
            }

            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break ImportOutcome::Completed,
                Err(e) if e.is_io_error() => {
                    tracing::error!(error = %e, "Failed to read import source");
                    break ImportOutcome::ReadFailed;
                }
                Err(e) => {
                    let err = RowError::Malformed {
                        message: e.to_string(),
                    };
                    tracing::warn!(error = %err, "Skipping invalid row");
                    counters.failed += 1;
                    continue;
                }
            }

            let raw = match parse_row(&record) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        line = ?record.position().map(|p| p.line()),
                        record = ?record,
                        error = %e,
                        "Skipping invalid row"
                    );
                    counters.failed += 1;
                    continue;
                }
            };

            let tax = self.lookup.tax_for(raw.longitude, raw.latitude);
            batch.push(classify(&raw, tax));
            counters.processed += 1;

            if batch.len() >= batch_size {
                self.flush(&mut batch, &mut counters).await;
            }
        };

        if !batch.is_empty() {
            tracing::debug!(remaining = batch.len(), "Flushing remaining orders");
            self.flush(&mut batch, &mut counters).await;
        }

        // 關閉來源
        drop(reader);

        let summary = ImportSummary {
            processed: counters.processed,
            failed: counters.failed,
            batches_flushed: counters.batches_flushed,
            batches_failed: counters.batches_failed,
            outcome,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            total_processed = summary.processed,
            total_failed = summary.failed,
            batches_flushed = summary.batches_flushed,
            batches_failed = summary.batches_failed,
            outcome = ?summary.outcome,
            duration = ?summary.elapsed,
            "Import processing finished"
        );

        summary
    }

    async fn flush(&self, batch: &mut Vec<Order>, counters: &mut RunCounters) {
        match self.repository.batch_create(batch).await {
            Ok(()) => {
                counters.batches_flushed += 1;
                tracing::debug!(batch_size = batch.len(), "Persisted order batch");
            }
            Err(e) => {
                counters.batches_failed += 1;
                tracing::error!(error = %e, batch_size = batch.len(), "Failed to persist order batch");
            }
        }
        batch.clear();
    }
}
