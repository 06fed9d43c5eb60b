use crate::utils::canonical_name;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Days added to the payment date when a check row arrives without a
/// maturity date. The caller may correct the default before aggregation.
pub const DEFAULT_MATURITY_DAYS: u64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Currency {
    /// The payment's original domestic denomination, requiring conversion.
    Local,
    /// The common denomination all reports normalize to.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CollectionMethod {
    CashOrTransfer,
    /// Deferred payment realized at a future maturity date.
    Check,
    Other,
}

/// One collection event, produced by the normalizer from one raw row and
/// immutable thereafter. The aggregator consumes payments by reference and
/// never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub customer_name: String,
    pub project: String,
    pub payment_date: NaiveDate,
    /// Always positive; denominated in `currency`.
    pub amount: Decimal,
    pub currency: Currency,
    pub collection_method: CollectionMethod,
    /// Free-form account/source label. Not part of the duplicate key.
    pub channel: String,
    /// Deferred value of a check payment. Defaults to `amount` when the
    /// method is Check and the source row carried no separate figure.
    pub check_amount: Option<Decimal>,
    /// Present and >= `payment_date` whenever the method is Check.
    pub check_maturity_date: Option<NaiveDate>,
}

impl Payment {
    pub fn is_check(&self) -> bool {
        self.collection_method == CollectionMethod::Check
    }

    /// The amount realized at maturity: the explicit check amount, or the
    /// payment's full value when none was recorded.
    pub fn deferred_amount(&self) -> Decimal {
        self.check_amount.unwrap_or(self.amount)
    }

    /// The maturity date, falling back to payment date + 180 days.
    pub fn maturity_date(&self) -> NaiveDate {
        self.check_maturity_date.unwrap_or_else(|| {
            self.payment_date
                .checked_add_days(Days::new(DEFAULT_MATURITY_DAYS))
                .unwrap_or(self.payment_date)
        })
    }

    /// Customer name in the canonical comparison form used by the
    /// duplicate detector and the pivot row ordering.
    pub fn comparison_name(&self) -> String {
        canonical_name(&self.customer_name)
    }
}

/// One untyped imported row: header text mapped to cell text, plus the
/// zero-based index of the row in its source. File parsing happens outside
/// the engine; this is the only shape it accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    pub index: usize,
    pub values: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(index: usize, values: BTreeMap<String, String>) -> Self {
        Self { index, values }
    }

    /// Cell text under `header`, trimmed; None when absent or blank.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.values
            .get(header)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// A malformed row, collected during normalization. One bad row never
/// aborts the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WarningKind {
    /// Day-first and month-first readings both plausible; day-first used.
    AmbiguousDateFormat,
    /// Separator role inferred by the trailing-3-digits heuristic.
    AmbiguousAmountFormat,
}

/// A parse-time warning surfaced alongside the accepted payment rather
/// than swallowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowWarning {
    pub row_index: usize,
    pub kind: WarningKind,
    pub raw: String,
}
