use crate::schema::Payment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A candidate row that matched one or more already-accepted payments.
/// Not an error: an adjudication request. The engine never decides whether
/// an ambiguous duplicate is imported; the calling layer renders the
/// conflicts and feeds the resolution back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub row_index: usize,
    pub payment: Payment,
    pub conflicts: Vec<Payment>,
}

/// Flags candidate payments as duplicates of already-accepted records.
///
/// Two records match when the customer name is equal after canonical
/// normalization, the payment date is equal at day granularity, the
/// currency is the same and the amounts differ by at most the tolerance.
/// Project and channel are deliberately not part of the key: a transfer
/// re-entered under a different account label is still a duplicate.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    tolerance: Decimal,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self {
            // Absolute tolerance in the record's own currency.
            tolerance: Decimal::new(1, 2),
        }
    }
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All accepted payments conflicting with `candidate`. Amounts are
    /// never compared across currencies.
    pub fn conflicts_with<'a, I>(&self, candidate: &Payment, accepted: I) -> Vec<&'a Payment>
    where
        I: IntoIterator<Item = &'a Payment>,
    {
        let name = candidate.comparison_name();
        accepted
            .into_iter()
            .filter(|existing| {
                existing.payment_date == candidate.payment_date
                    && existing.currency == candidate.currency
                    && (existing.amount - candidate.amount).abs() <= self.tolerance
                    && existing.comparison_name() == name
            })
            .collect()
    }

    pub fn is_duplicate<'a, I>(&self, candidate: &Payment, accepted: I) -> bool
    where
        I: IntoIterator<Item = &'a Payment>,
    {
        !self.conflicts_with(candidate, accepted).is_empty()
    }
}
