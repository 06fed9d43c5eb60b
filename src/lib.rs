//! # Payment Report Builder
//!
//! A library for turning itemized payment records (mixed currencies,
//! mixed collection methods) into period-bounded weekly reconciliation
//! tables for a real-estate developer.
//!
//! ## Core Concepts
//!
//! - **Payment**: one validated collection event, produced from an
//!   untyped imported row and immutable thereafter
//! - **Rate Store**: a sparse calendar-date → selling-rate snapshot;
//!   conversion walks back up to 7 days over unpublished weekends and
//!   holidays
//! - **Immediate vs deferred**: regular payments convert at the payment
//!   date; check payments carry a second, deferred value converted at
//!   their maturity date
//! - **Week bucket**: a fixed Monday–Sunday partition; every pivot is a
//!   rectangular customer×date grid with trailing totals
//!
//! ## Example
//!
//! ```rust,ignore
//! use payment_report_builder::*;
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let mut store = RateStore::new();
//! store.insert(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(), dec!(41.25));
//!
//! let builder = ReportBuilder::new(store);
//! let outcome = builder.import(&rows, &previously_accepted);
//! let report = builder.build(
//!     &outcome.accepted,
//!     NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
//! )?;
//! println!("{}", report.to_json_string()?);
//! ```
//!
//! The engine is synchronous and free of I/O: file parsing, rate
//! fetching, persistence and rendering all live in outside collaborators.

pub mod aggregate;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod rates;
pub mod schema;
pub mod utils;

pub use aggregate::{aggregate, AggregateRow, Cell, Pivot, ReportModel, WeekBucket, WeekSection};
pub use dedup::{DuplicateCandidate, DuplicateDetector};
pub use error::{ReportError, Result};
pub use normalize::{normalize_batch, normalize_row, ColumnMap, Field, ImportOutcome};
pub use rates::{Conversion, Converter, RateStore, FALLBACK_WINDOW_DAYS};
pub use schema::{
    CollectionMethod, Currency, Payment, RawRow, RowError, RowWarning, WarningKind,
    DEFAULT_MATURITY_DAYS,
};
pub use utils::{canonical_name, week_end, week_mondays_in_range, week_start};

use chrono::NaiveDate;
use log::info;

/// Orchestrates one import-and-report cycle against a fixed rate
/// snapshot. The store is read-only for the lifetime of the builder, so
/// every `build` call over the same inputs produces the same report.
pub struct ReportBuilder {
    store: RateStore,
}

impl ReportBuilder {
    pub fn new(store: RateStore) -> Self {
        Self { store }
    }

    pub fn rate_store(&self) -> &RateStore {
        &self.store
    }

    /// Normalizes raw rows into payments, collecting per-row errors and
    /// warnings and flagging duplicate candidates against `existing` and
    /// against the batch itself.
    pub fn import(&self, rows: &[RawRow], existing: &[Payment]) -> ImportOutcome {
        info!("Importing batch of {} row(s)", rows.len());
        normalize_batch(rows, existing)
    }

    /// Builds the weekly report model for `[start, end]`.
    pub fn build(
        &self,
        payments: &[Payment],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ReportModel> {
        aggregate(payments, &self.store, start, end)
    }
}

/// Convenience wrapper around [`normalize_batch`].
pub fn import_payment_rows(rows: &[RawRow], existing: &[Payment]) -> ImportOutcome {
    normalize_batch(rows, existing)
}

/// Convenience wrapper around [`aggregate`].
pub fn build_weekly_report(
    payments: &[Payment],
    store: &RateStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ReportModel> {
    aggregate(payments, store, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(index: usize, pairs: &[(&str, &str)]) -> RawRow {
        let values: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRow::new(index, values)
    }

    #[test]
    fn test_import_then_build() {
        let store: RateStore = [(d(2025, 9, 1), dec!(40))].into_iter().collect();
        let builder = ReportBuilder::new(store);

        let rows = vec![
            row(
                0,
                &[
                    ("Müşteri Adı Soyadı", "Ayşe Kaya"),
                    ("Tarih", "01.09.2025"),
                    ("Proje Adı", "Site A"),
                    ("Ödenen Tutar", "4000"),
                    ("Ödenen Döviz", "TL"),
                ],
            ),
            row(
                1,
                &[
                    ("Müşteri Adı Soyadı", "Ali Demir"),
                    ("Tarih", "02.09.2025"),
                    ("Proje Adı", "Site A"),
                    ("Ödenen Tutar", "150"),
                    ("Ödenen Döviz", "USD"),
                ],
            ),
        ];

        let outcome = builder.import(&rows, &[]);
        assert_eq!(outcome.accepted.len(), 2);
        assert!(outcome.errors.is_empty());

        let report = builder
            .build(&outcome.accepted, d(2025, 9, 1), d(2025, 9, 7))
            .unwrap();
        assert_eq!(report.weeks.len(), 1);
        // 4000 TL / 40 = 100, plus 150 USD unchanged (rate falls back
        // from the 2nd to the 1st).
        assert_eq!(report.weeks[0].immediate.grand_total, dec!(250.00));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let store: RateStore = [(d(2025, 9, 1), dec!(41.37))].into_iter().collect();
        let builder = ReportBuilder::new(store);
        let payments = vec![Payment {
            customer_name: "Ayşe Kaya".to_string(),
            project: "Site A".to_string(),
            payment_date: d(2025, 9, 3),
            amount: dec!(12345.67),
            currency: Currency::Local,
            collection_method: CollectionMethod::CashOrTransfer,
            channel: "Havale".to_string(),
            check_amount: None,
            check_maturity_date: None,
        }];
        let first = builder
            .build(&payments, d(2025, 9, 1), d(2025, 9, 7))
            .unwrap();
        let second = builder
            .build(&payments, d(2025, 9, 1), d(2025, 9, 7))
            .unwrap();
        assert_eq!(first, second);
    }
}
