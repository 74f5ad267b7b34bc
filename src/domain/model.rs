use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_range, Validate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Tax policy for one jurisdiction, keyed by the boundary `NAME` in a [`TaxTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionTax {
    pub composite_rate: f64,
    #[serde(default)]
    pub breakdown: JurisdictionTaxBreakdown,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionTaxBreakdown {
    #[serde(default)]
    pub state: f64,
    #[serde(default)]
    pub county: f64,
    #[serde(default)]
    pub city: f64,
    #[serde(default)]
    pub special: f64,
}

pub type TaxTable = HashMap<String, JurisdictionTax>;

/// Minimal parsed unit of an order, from either a CSV row or a request body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawOrder {
    pub longitude: f64,
    pub latitude: f64,
    pub subtotal: f64,
    pub timestamp: DateTime<Utc>,
}

/// Body of a single-order creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub subtotal: f64,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<()> {
        validate_range("latitude", self.latitude, -90.0, 90.0)?;
        validate_range("longitude", self.longitude, -180.0, 180.0)?;

        if !self.subtotal.is_finite() || self.subtotal < 0.0 {
            return Err(EtlError::ValidationError {
                message: "subtotal cannot be negative".to_string(),
            });
        }

        match self.timestamp {
            Some(ts) if ts != DateTime::<Utc>::UNIX_EPOCH => Ok(()),
            _ => Err(EtlError::ValidationError {
                message: "timestamp is required".to_string(),
            }),
        }
    }
}

impl TryFrom<CreateOrderRequest> for RawOrder {
    type Error = EtlError;

    fn try_from(request: CreateOrderRequest) -> Result<Self> {
        request.validate()?;
        let timestamp = request.timestamp.ok_or_else(|| EtlError::ValidationError {
            message: "timestamp is required".to_string(),
        })?;

        Ok(RawOrder {
            longitude: request.longitude,
            latitude: request.latitude,
            subtotal: request.subtotal,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Completed,
    OutOfScope,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Completed => "completed",
            OrderStatus::OutOfScope => "out_of_scope",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "completed" => Ok(OrderStatus::Completed),
            "out_of_scope" => Ok(OrderStatus::OutOfScope),
            other => Err(EtlError::ValidationError {
                message: format!("unknown order status '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxRateBreakdown {
    pub state_rate: f64,
    pub county_rate: f64,
    pub city_rate: f64,
    pub special_rate: f64,
}

/// A priced order. `id` stays 0 until the repository assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub total_amount: f64,
    pub tax_amount: f64,
    pub composite_tax_rate: f64,
    pub breakdown: TaxRateBreakdown,
    pub jurisdictions: Vec<String>,
    pub reporting_code: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    Completed,
    TimedOut,
    ReadFailed,
}

/// Aggregate result of one import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub processed: usize,
    pub failed: usize,
    pub batches_flushed: usize,
    pub batches_failed: usize,
    pub outcome: ImportOutcome,
    pub elapsed: Duration,
}

impl ImportSummary {
    pub fn total_rows(&self) -> usize {
        self.processed + self.failed
    }
}

/// Largest page a single list request may ask for.
pub const MAX_PAGE_SIZE: usize = 12_000;

/// 1-based page request for reading stored orders back in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub page: usize,
    pub page_size: usize,
}

impl OrderListQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }
}

impl Validate for OrderListQuery {
    fn validate(&self) -> Result<()> {
        validate_range("page", self.page, 1, usize::MAX)?;
        validate_range("page_size", self.page_size, 1, MAX_PAGE_SIZE)
    }
}

/// One page of stored orders plus the total number stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            longitude: -73.9,
            latitude: 40.7,
            timestamp: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            subtotal: 100.0,
        }
    }

    #[test]
    fn test_valid_request_converts() {
        let raw = RawOrder::try_from(request()).unwrap();
        assert_eq!(raw.longitude, -73.9);
        assert_eq!(raw.subtotal, 100.0);
    }

    #[test]
    fn test_request_validation_rules() {
        let mut req = request();
        req.latitude = 91.0;
        assert!(req.validate().is_err());

        let mut req = request();
        req.longitude = -180.5;
        assert!(req.validate().is_err());

        let mut req = request();
        req.subtotal = -0.01;
        assert!(req.validate().is_err());

        let mut req = request();
        req.timestamp = None;
        assert!(req.validate().is_err());

        let mut req = request();
        req.timestamp = Some(DateTime::<Utc>::UNIX_EPOCH);
        assert!(req.validate().is_err());

        let mut req = request();
        req.longitude = 180.0;
        req.latitude = -90.0;
        req.subtotal = 0.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_tax_config_entry_deserializes() {
        let json = r#"{
            "composite_rate": 0.08875,
            "breakdown": {"state": 0.04, "county": 0.0, "city": 0.045, "special": 0.00375},
            "names": ["New York State", "New York City"],
            "code": "NYC"
        }"#;
        let tax: JurisdictionTax = serde_json::from_str(json).unwrap();
        assert_eq!(tax.code, "NYC");
        assert_eq!(tax.breakdown.special, 0.00375);
        assert_eq!(tax.names.len(), 2);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OutOfScope).unwrap(),
            "\"out_of_scope\""
        );
        assert_eq!(OrderStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn test_status_parses_stored_form() {
        for status in [OrderStatus::Completed, OrderStatus::OutOfScope] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_list_query_paging() {
        let query = OrderListQuery {
            page: 3,
            page_size: 20,
        };
        assert!(query.validate().is_ok());
        assert_eq!(query.offset(), 40);
        assert_eq!(query.limit(), 20);

        for (page, page_size) in [(0, 10), (1, 0), (1, MAX_PAGE_SIZE + 1)] {
            assert!(OrderListQuery { page, page_size }.validate().is_err());
        }
    }
}
