//! Weekly bucketing and pivot construction.
//!
//! Payments inside a requested date range are partitioned into
//! Monday-anchored week buckets. Each bucket yields three rectangular
//! pivots: the immediate table (every collection method, converted at the
//! payment date) and a deferred pair for check payments (raw local
//! amounts, and reference amounts converted at the maturity date). Every
//! pivot carries trailing row and column totals plus the grand-total
//! corner, and every cell records whether a conversion took place so
//! renderers can distinguish converted values.

use crate::error::{ReportError, Result};
use crate::rates::{Converter, RateStore};
use crate::schema::Payment;
use crate::utils::{canonical_name, week_mondays_in_range, week_start};
use chrono::{Days, NaiveDate};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A contiguous Monday..Sunday range used as a partition key. Buckets
/// always span exactly 7 calendar days regardless of how the report range
/// truncates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekBucket {
    pub monday: NaiveDate,
}

impl WeekBucket {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            monday: week_start(date),
        }
    }

    pub fn sunday(&self) -> NaiveDate {
        self.monday
            .checked_add_days(Days::new(6))
            .unwrap_or(self.monday)
    }

    /// The 7 dates Monday..Sunday, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        (0..7)
            .filter_map(|offset| self.monday.checked_add_days(Days::new(offset)))
            .collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.monday && date <= self.sunday()
    }
}

/// One pivot cell. A cell whose conversion failed for the whole fallback
/// window stays `Unresolved`; it is never defaulted to zero or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "PascalCase")]
pub enum Cell {
    Empty,
    Amount {
        value: Decimal,
        /// True when at least one contributing amount was converted from
        /// local to reference currency.
        converted: bool,
    },
    Unresolved {
        requested: NaiveDate,
    },
}

impl Cell {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Cell::Amount { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Cell::Unresolved { .. })
    }

    fn absorb_amount(&mut self, amount: Decimal, was_converted: bool) {
        *self = match *self {
            Cell::Empty => Cell::Amount {
                value: amount,
                converted: was_converted,
            },
            Cell::Amount { value, converted } => Cell::Amount {
                value: value + amount,
                converted: converted || was_converted,
            },
            unresolved @ Cell::Unresolved { .. } => unresolved,
        };
    }

    fn mark_unresolved(&mut self, requested: NaiveDate) {
        *self = Cell::Unresolved { requested };
    }
}

/// One (customer, project) row of a pivot: per-date cells plus the
/// trailing row total over resolved cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub customer_name: String,
    pub project: String,
    pub cells: Vec<Cell>,
    pub total: Decimal,
}

/// A rectangular customer×date grid for one week. Columns are the 7
/// bucket dates ascending; rows are sorted by customer name
/// (case-insensitively) then project; totals trail the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub columns: Vec<NaiveDate>,
    pub rows: Vec<AggregateRow>,
    pub column_totals: Vec<Decimal>,
    /// The grand-total corner: sum of every resolved cell in the body.
    pub grand_total: Decimal,
}

impl Pivot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn unresolved_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .filter(|cell| cell.is_unresolved())
            .count()
    }
}

struct PivotBuilder {
    columns: Vec<NaiveDate>,
    rows: BTreeMap<(String, String), (String, String, Vec<Cell>)>,
}

impl PivotBuilder {
    fn new(bucket: WeekBucket) -> Self {
        Self {
            columns: bucket.days(),
            rows: BTreeMap::new(),
        }
    }

    fn cell(&mut self, payment: &Payment) -> Option<&mut Cell> {
        let index = self
            .columns
            .iter()
            .position(|d| *d == payment.payment_date)?;
        let width = self.columns.len();
        let key = (
            canonical_name(&payment.customer_name),
            payment.project.to_lowercase(),
        );
        let (_, _, cells) = self.rows.entry(key).or_insert_with(|| {
            (
                payment.customer_name.clone(),
                payment.project.clone(),
                vec![Cell::Empty; width],
            )
        });
        cells.get_mut(index)
    }

    fn add_amount(&mut self, payment: &Payment, amount: Decimal, was_converted: bool) {
        if let Some(cell) = self.cell(payment) {
            cell.absorb_amount(amount, was_converted);
        }
    }

    fn add_unresolved(&mut self, payment: &Payment, requested: NaiveDate) {
        if let Some(cell) = self.cell(payment) {
            cell.mark_unresolved(requested);
        }
    }

    fn finish(self) -> Pivot {
        let columns = self.columns;
        let mut column_totals = vec![Decimal::ZERO; columns.len()];
        let mut grand_total = Decimal::ZERO;

        // BTreeMap keys are canonical (lowercased) names, so iteration
        // order is already the required row order.
        let rows: Vec<AggregateRow> = self
            .rows
            .into_values()
            .map(|(customer_name, project, cells)| {
                let mut total = Decimal::ZERO;
                for (index, cell) in cells.iter().enumerate() {
                    if let Some(value) = cell.value() {
                        total += value;
                        column_totals[index] += value;
                    }
                }
                grand_total += total;
                AggregateRow {
                    customer_name,
                    project,
                    cells,
                    total,
                }
            })
            .collect();

        Pivot {
            columns,
            rows,
            column_totals,
            grand_total,
        }
    }
}

/// One week of the report: the immediate-payment pivot in reference
/// currency plus the deferred (check) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSection {
    pub bucket: WeekBucket,
    pub immediate: Pivot,
    pub deferred_local: Pivot,
    pub deferred_reference: Pivot,
}

/// The structured aggregate model consumed by rendering collaborators.
/// Week sections are ordered chronologically and cover every week
/// intersecting the requested range, empty ones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weeks: Vec<WeekSection>,
}

impl ReportModel {
    /// Cells across the whole report whose conversion could not be
    /// resolved within the fallback window.
    pub fn unresolved_count(&self) -> usize {
        self.weeks
            .iter()
            .map(|week| {
                week.immediate.unresolved_count() + week.deferred_reference.unresolved_count()
            })
            .sum()
    }

    /// JSON form for rendering/export collaborators outside the engine.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds the period-bounded weekly report.
///
/// Payments outside `[start, end]` are ignored. Immediate amounts convert
/// at the payment date; deferred (check) amounts convert at the maturity
/// date, both under the converter's fallback rule. A missing rate marks
/// the affected cell unresolved and aggregation continues; it never
/// aborts the batch.
pub fn aggregate(
    payments: &[Payment],
    store: &RateStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ReportModel> {
    if start > end {
        return Err(ReportError::InvalidDateRange { start, end });
    }

    let converter = Converter::new(store);

    let mut by_week: BTreeMap<NaiveDate, Vec<&Payment>> = BTreeMap::new();
    let mut in_range = 0usize;
    for payment in payments {
        if payment.payment_date < start || payment.payment_date > end {
            continue;
        }
        in_range += 1;
        by_week
            .entry(week_start(payment.payment_date))
            .or_default()
            .push(payment);
    }

    let mondays = week_mondays_in_range(start, end);
    info!(
        "Aggregating {} of {} payment(s) into {} week bucket(s)",
        in_range,
        payments.len(),
        mondays.len()
    );

    let empty: Vec<&Payment> = Vec::new();
    let mut weeks = Vec::with_capacity(mondays.len());

    for monday in mondays {
        let bucket = WeekBucket { monday };
        let bucket_payments = by_week.get(&monday).unwrap_or(&empty);

        let mut immediate = PivotBuilder::new(bucket);
        let mut deferred_local = PivotBuilder::new(bucket);
        let mut deferred_reference = PivotBuilder::new(bucket);

        for payment in bucket_payments {
            match converter.convert(payment.amount, payment.currency, payment.payment_date) {
                Ok(conversion) => {
                    immediate.add_amount(payment, conversion.amount, conversion.converted)
                }
                Err(ReportError::RateUnavailable { requested }) => {
                    debug!(
                        "No rate for {} within the fallback window; cell left unresolved",
                        requested
                    );
                    immediate.add_unresolved(payment, requested);
                }
                Err(other) => return Err(other),
            }

            if payment.is_check() {
                deferred_local.add_amount(payment, payment.deferred_amount(), false);

                let maturity = payment.maturity_date();
                match converter.convert(payment.deferred_amount(), payment.currency, maturity) {
                    Ok(conversion) => deferred_reference.add_amount(
                        payment,
                        conversion.amount,
                        conversion.converted,
                    ),
                    Err(ReportError::RateUnavailable { requested }) => {
                        debug!(
                            "No rate at maturity {} within the fallback window; cell left unresolved",
                            requested
                        );
                        deferred_reference.add_unresolved(payment, requested);
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        weeks.push(WeekSection {
            bucket,
            immediate: immediate.finish(),
            deferred_local: deferred_local.finish(),
            deferred_reference: deferred_reference.finish(),
        });
    }

    Ok(ReportModel {
        start_date: start,
        end_date: end,
        weeks,
    })
}
