use crate::core::{Order, OrderRepository, Result};
use crate::domain::model::{OrderPage, OrderStatus, TaxRateBreakdown};
use crate::utils::error::EtlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::StringRecord;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const ORDERS_FILE_NAME: &str = "orders.csv";

const HEADER: [&str; 15] = [
    "id",
    "latitude",
    "longitude",
    "total_amount",
    "tax_amount",
    "composite_tax_rate",
    "state_rate",
    "county_rate",
    "city_rate",
    "special_rate",
    "jurisdictions",
    "reporting_code",
    "status",
    "created_at",
    "updated_at",
];

/// Append handle plus the length and id counter of what is known to be on disk.
struct CsvSink {
    file: File,
    committed_len: u64,
    next_id: i64,
}

/// Appends orders to `<base_path>/orders.csv`, assigning sequential ids.
///
/// Ids continue from the number of rows already in the file. All file work
/// runs on the blocking pool.
pub struct CsvOrderRepository {
    path: PathBuf,
    sink: Arc<Mutex<CsvSink>>,
}

impl CsvOrderRepository {
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        fs::create_dir_all(&base_path)?;
        let path = base_path.as_ref().join(ORDERS_FILE_NAME);

        let existing = if path.exists() {
            csv::Reader::from_path(&path)?.records().count() as i64
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut sink = CsvSink {
            committed_len: file.metadata()?.len(),
            file,
            next_id: existing,
        };
        if sink.committed_len == 0 {
            let header = encode(|writer| writer.write_record(HEADER))?;
            sink.write_committed(&header)?;
        }

        tracing::debug!(path = %path.display(), existing, "Opened order CSV store");
        Ok(Self {
            path,
            sink: Arc::new(Mutex::new(sink)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `work` on the blocking pool while holding the sink, so reads never
    /// observe half a batch.
    async fn with_sink<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut CsvSink, &Path) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut sink = sink.lock().map_err(|_| EtlError::PersistenceError {
                message: "order store lock poisoned".to_string(),
            })?;
            work(&mut sink, &path)
        })
        .await
        .map_err(|e| EtlError::PersistenceError {
            message: format!("order store task failed: {}", e),
        })?
    }
}

impl CsvSink {
    /// Appends every order or none. Returns the first assigned id.
    fn append(&mut self, orders: &[Order]) -> Result<i64> {
        let first_id = self.next_id + 1;
        let bytes = encode(|writer| {
            for (offset, order) in orders.iter().enumerate() {
                writer.write_record(order_record(first_id + offset as i64, order))?;
            }
            Ok(())
        })?;

        self.write_committed(&bytes)?;
        self.next_id += orders.len() as i64;
        Ok(first_id)
    }

    fn write_committed(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.file.write_all(bytes).and_then(|()| self.file.flush()) {
            // cut any partial tail so only whole batches stay on disk
            if let Err(rollback) = self.file.set_len(self.committed_len) {
                tracing::error!(error = %rollback, "Failed to roll back partial order write");
            }
            return Err(EtlError::PersistenceError {
                message: format!("failed to write orders file: {}", e),
            });
        }
        self.committed_len += bytes.len() as u64;
        Ok(())
    }
}

fn encode<F>(write: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut scratch = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    write(&mut scratch)?;
    scratch.into_inner().map_err(|e| EtlError::PersistenceError {
        message: format!("failed to encode orders: {}", e.error()),
    })
}

fn order_record(id: i64, order: &Order) -> [String; 15] {
    [
        id.to_string(),
        order.latitude.to_string(),
        order.longitude.to_string(),
        order.total_amount.to_string(),
        order.tax_amount.to_string(),
        order.composite_tax_rate.to_string(),
        order.breakdown.state_rate.to_string(),
        order.breakdown.county_rate.to_string(),
        order.breakdown.city_rate.to_string(),
        order.breakdown.special_rate.to_string(),
        order.jurisdictions.join(";"),
        order.reporting_code.clone(),
        order.status.as_str().to_string(),
        order.created_at.to_rfc3339(),
        order.updated_at.to_rfc3339(),
    ]
}

fn corrupt(record: &StringRecord, column: &str) -> EtlError {
    EtlError::PersistenceError {
        message: format!(
            "corrupt {} in stored order at line {}",
            column,
            record.position().map(|p| p.line()).unwrap_or_default()
        ),
    }
}

fn parse_order_record(record: &StringRecord) -> Result<Order> {
    if record.len() != HEADER.len() {
        return Err(corrupt(record, "row"));
    }

    let number = |idx: usize| -> Result<f64> {
        record[idx]
            .parse::<f64>()
            .map_err(|_| corrupt(record, HEADER[idx]))
    };
    let timestamp = |idx: usize| -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&record[idx])
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| corrupt(record, HEADER[idx]))
    };

    Ok(Order {
        id: record[0].parse().map_err(|_| corrupt(record, "id"))?,
        latitude: number(1)?,
        longitude: number(2)?,
        total_amount: number(3)?,
        tax_amount: number(4)?,
        composite_tax_rate: number(5)?,
        breakdown: TaxRateBreakdown {
            state_rate: number(6)?,
            county_rate: number(7)?,
            city_rate: number(8)?,
            special_rate: number(9)?,
        },
        jurisdictions: if record[10].is_empty() {
            Vec::new()
        } else {
            record[10].split(';').map(str::to_string).collect()
        },
        reporting_code: record[11].to_string(),
        status: record[12]
            .parse::<OrderStatus>()
            .map_err(|_| corrupt(record, "status"))?,
        created_at: timestamp(13)?,
        updated_at: timestamp(14)?,
    })
}

#[async_trait]
impl OrderRepository for CsvOrderRepository {
    async fn create(&self, order: &Order) -> Result<i64> {
        let order = order.clone();
        self.with_sink(move |sink, _| sink.append(std::slice::from_ref(&order)))
            .await
    }

    async fn batch_create(&self, orders: &[Order]) -> Result<()> {
        let orders = orders.to_vec();
        self.with_sink(move |sink, _| sink.append(&orders).map(|_| ()))
            .await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        self.with_sink(move |_, path| {
            let mut reader = csv::Reader::from_path(path)?;
            for record in reader.records() {
                let record = record?;
                if record.get(0) == Some(id.to_string().as_str()) {
                    return parse_order_record(&record).map(Some);
                }
            }
            Ok(None)
        })
        .await
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<OrderPage> {
        self.with_sink(move |_, path| {
            let mut reader = csv::Reader::from_path(path)?;
            let mut orders = Vec::new();
            let mut total = 0;
            for record in reader.records() {
                let record = record?;
                if total >= offset && orders.len() < limit {
                    orders.push(parse_order_record(&record)?);
                }
                total += 1;
            }
            Ok(OrderPage { orders, total })
        })
        .await
    }
}
