use crate::domain::model::{JurisdictionTax, Order, OrderStatus, RawOrder, TaxRateBreakdown};

/// Prices a raw order against an optional tax record.
///
/// Timestamps come from the raw order rather than the wall clock, so the same
/// input always yields the same `Order` (ids excepted; persistence sets those).
pub fn classify(raw: &RawOrder, tax: Option<&JurisdictionTax>) -> Order {
    match tax {
        Some(tax) => completed_order(raw, tax),
        None => out_of_scope_order(raw),
    }
}

fn out_of_scope_order(raw: &RawOrder) -> Order {
    Order {
        id: 0,
        latitude: raw.latitude,
        longitude: raw.longitude,
        total_amount: raw.subtotal,
        tax_amount: 0.0,
        composite_tax_rate: 0.0,
        breakdown: TaxRateBreakdown::default(),
        jurisdictions: Vec::new(),
        reporting_code: String::new(),
        status: OrderStatus::OutOfScope,
        created_at: raw.timestamp,
        updated_at: raw.timestamp,
    }
}

fn completed_order(raw: &RawOrder, tax: &JurisdictionTax) -> Order {
    Order {
        id: 0,
        latitude: raw.latitude,
        longitude: raw.longitude,
        total_amount: raw.subtotal,
        tax_amount: raw.subtotal * tax.composite_rate,
        composite_tax_rate: tax.composite_rate,
        breakdown: TaxRateBreakdown {
            state_rate: tax.breakdown.state,
            county_rate: tax.breakdown.county,
            city_rate: tax.breakdown.city,
            special_rate: tax.breakdown.special,
        },
        jurisdictions: tax.names.clone(),
        reporting_code: tax.code.clone(),
        status: OrderStatus::Completed,
        created_at: raw.timestamp,
        updated_at: raw.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::JurisdictionTaxBreakdown;
    use chrono::{TimeZone, Utc};

    fn raw(subtotal: f64) -> RawOrder {
        RawOrder {
            longitude: 5.0,
            latitude: 5.0,
            subtotal,
            timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn nyc() -> JurisdictionTax {
        JurisdictionTax {
            composite_rate: 0.08875,
            breakdown: JurisdictionTaxBreakdown {
                state: 0.04,
                county: 0.0,
                city: 0.045,
                special: 0.00375,
            },
            names: vec!["New York State".to_string(), "New York City".to_string()],
            code: "NYC".to_string(),
        }
    }

    #[test]
    fn test_completed_order_copies_tax_record() {
        let tax = nyc();
        let order = classify(&raw(200.0), Some(&tax));

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total_amount, 200.0);
        assert_eq!(order.tax_amount, 200.0 * 0.08875);
        assert_eq!(order.composite_tax_rate, 0.08875);
        assert_eq!(order.breakdown.city_rate, 0.045);
        assert_eq!(order.breakdown.special_rate, 0.00375);
        assert_eq!(order.jurisdictions, tax.names);
        assert_eq!(order.reporting_code, "NYC");
        assert_eq!(order.id, 0);
    }

    #[test]
    fn test_missing_tax_yields_out_of_scope() {
        let order = classify(&raw(50.0), None);

        assert_eq!(order.status, OrderStatus::OutOfScope);
        assert_eq!(order.total_amount, 50.0);
        assert_eq!(order.tax_amount, 0.0);
        assert_eq!(order.composite_tax_rate, 0.0);
        assert_eq!(order.breakdown, TaxRateBreakdown::default());
        assert!(order.jurisdictions.is_empty());
        assert!(order.reporting_code.is_empty());
    }

    #[test]
    fn test_timestamps_come_from_input() {
        let input = raw(10.0);
        let order = classify(&input, None);

        assert_eq!(order.created_at, input.timestamp);
        assert_eq!(order.updated_at, input.timestamp);
    }

    #[test]
    fn test_classification_is_repeatable() {
        let tax = nyc();
        let input = raw(123.45);

        assert_eq!(classify(&input, Some(&tax)), classify(&input, Some(&tax)));
        assert_eq!(classify(&input, None), classify(&input, None));
    }
}
