use crate::error::{ReportError, Result};
use crate::schema::Currency;
use chrono::{Days, NaiveDate};
use log::warn;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of calendar days the converter walks backward from the
/// requested date before giving up with `RateUnavailable`. Covers
/// weekends and holiday runs where no official rate is published.
pub const FALLBACK_WINDOW_DAYS: u64 = 7;

/// Sparse calendar-date -> reference-currency selling rate map. Dumb
/// key-value by contract: no interpolation, no fallback policy here.
/// Weekends and holidays are absent by design, not by error. Population
/// (network fetch, caching) belongs to the surrounding system; the engine
/// treats a store as a read-only snapshot for the duration of one
/// aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateStore {
    rates: BTreeMap<NaiveDate, Decimal>,
}

impl RateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the selling rate for one date. Non-positive rates are
    /// refused so conversion can never divide by zero.
    pub fn insert(&mut self, date: NaiveDate, rate: Decimal) {
        if rate <= Decimal::ZERO {
            warn!("Ignoring non-positive rate {} for {}", rate, date);
            return;
        }
        self.rates.insert(date, rate);
    }

    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        self.rates.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl FromIterator<(NaiveDate, Decimal)> for RateStore {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, Decimal)>>(iter: T) -> Self {
        let mut store = RateStore::new();
        for (date, rate) in iter {
            store.insert(date, rate);
        }
        store
    }
}

/// Outcome of one conversion. `rate_date_used` reports which calendar day
/// actually supplied the rate, which differs from the requested date when
/// the fallback walk was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: Decimal,
    pub rate_used: Decimal,
    pub rate_date_used: NaiveDate,
    /// True when a local-currency amount was actually converted, false
    /// when the input was already reference currency.
    pub converted: bool,
}

/// Converts local-currency amounts to reference currency against a fixed
/// rate snapshot. For a fixed store, `convert` is a pure function of
/// `(amount, currency, as_of)`.
pub struct Converter<'a> {
    store: &'a RateStore,
}

impl<'a> Converter<'a> {
    pub fn new(store: &'a RateStore) -> Self {
        Self { store }
    }

    /// Converts `amount` to reference currency as of `as_of`.
    ///
    /// Reference input is returned unchanged with rate 1. Local input uses
    /// the rate published on `as_of`, or the nearest prior rate within the
    /// fallback window. The rate is expressed as reference-per-local, so
    /// conversion is `amount / rate`, rounded once to 2 decimal places
    /// half-to-even. Results are never re-rounded downstream.
    pub fn convert(
        &self,
        amount: Decimal,
        currency: Currency,
        as_of: NaiveDate,
    ) -> Result<Conversion> {
        if currency == Currency::Reference {
            return Ok(Conversion {
                amount,
                rate_used: Decimal::ONE,
                rate_date_used: as_of,
                converted: false,
            });
        }

        let (rate, rate_date) = self.lookup_with_fallback(as_of)?;
        let converted =
            (amount / rate).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);

        Ok(Conversion {
            amount: converted,
            rate_used: rate,
            rate_date_used: rate_date,
            converted: true,
        })
    }

    fn lookup_with_fallback(&self, as_of: NaiveDate) -> Result<(Decimal, NaiveDate)> {
        for back in 0..=FALLBACK_WINDOW_DAYS {
            let date = match as_of.checked_sub_days(Days::new(back)) {
                Some(date) => date,
                None => break,
            };
            if let Some(rate) = self.store.get(date) {
                return Ok((rate, date));
            }
        }
        Err(ReportError::RateUnavailable { requested: as_of })
    }
}
