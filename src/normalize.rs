//! Raw-row validation and canonicalization.
//!
//! Import files arrive with unpredictable column arrangements, mixed date
//! formats and locale-dependent number formatting. This module resolves
//! headers against a declarative alias table, parses one row into a
//! [`Payment`], and routes bad rows into per-index error lists instead of
//! aborting the batch.

use crate::dedup::{DuplicateCandidate, DuplicateDetector};
use crate::schema::{
    CollectionMethod, Currency, Payment, RawRow, RowError, RowWarning, WarningKind,
    DEFAULT_MATURITY_DAYS,
};
use chrono::{Datelike, Days, NaiveDate};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Logical fields the normalizer can resolve from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    CustomerName,
    PaymentDate,
    Project,
    Amount,
    Currency,
    Channel,
    CollectionMethod,
    CheckAmount,
    CheckMaturityDate,
}

struct FieldSpec {
    field: Field,
    primary: &'static str,
    aliases: &'static [&'static str],
}

/// Primary header names and accepted aliases for each logical field.
/// Source exports are Turkish-first with occasional English re-labeling.
const FIELD_SPECS: &[FieldSpec] = &[
    FieldSpec {
        field: Field::CustomerName,
        primary: "Müşteri Adı Soyadı",
        aliases: &[
            "Müşteri",
            "Müşteri Adı",
            "Ad Soyad",
            "Adı Soyadı",
            "Customer",
            "Customer Name",
            "Client Name",
            "İsim",
        ],
    },
    FieldSpec {
        field: Field::PaymentDate,
        primary: "Tarih",
        aliases: &[
            "Ödeme Tarihi",
            "İşlem Tarihi",
            "Date",
            "Payment Date",
            "Transaction Date",
        ],
    },
    FieldSpec {
        field: Field::Project,
        primary: "Proje Adı",
        aliases: &["Proje", "Proje Kodu", "Project", "Project Name", "Project Code"],
    },
    FieldSpec {
        field: Field::Amount,
        primary: "Ödenen Tutar",
        aliases: &[
            "Tutar",
            "Toplam Tutar",
            "Miktar",
            "Amount",
            "Paid Amount",
            "Payment Amount",
        ],
    },
    FieldSpec {
        field: Field::Currency,
        primary: "Ödenen Döviz",
        aliases: &["Döviz", "Para Birimi", "Para Cinsi", "Currency", "Currency Type"],
    },
    FieldSpec {
        field: Field::Channel,
        primary: "Hesap Adı",
        aliases: &[
            "Ödeme Kanalı",
            "Kanal",
            "Hesap",
            "Banka",
            "Channel",
            "Payment Channel",
            "Account",
            "Account Name",
        ],
    },
    FieldSpec {
        field: Field::CollectionMethod,
        primary: "Tahsilat Şekli",
        aliases: &[
            "Ödeme Şekli",
            "Ödeme Türü",
            "Collection Method",
            "Payment Method",
            "Payment Type",
        ],
    },
    FieldSpec {
        field: Field::CheckAmount,
        primary: "Çek Tutarı",
        aliases: &["Cek Tutari", "Check Amount"],
    },
    FieldSpec {
        field: Field::CheckMaturityDate,
        primary: "Çek Vade Tarihi",
        aliases: &["Cek Vade Tarihi", "Vade Tarihi", "Check Maturity Date", "Maturity Date"],
    },
];

const CHECK_SPELLINGS: &[&str] = &["ÇEK", "CEK", "CHECK"];
const CASH_SPELLINGS: &[&str] = &["NAKİT", "NAKIT", "CASH", "HAVALE", "TRANSFER", "EFT"];
const LOCAL_SPELLINGS: &[&str] = &["TL", "TRY", "TURKISH LIRA", "TÜRK LİRASI", "TÜRK LIRASI"];
const REFERENCE_SPELLINGS: &[&str] = &["USD", "US DOLLAR", "DOLAR", "$"];

/// Mapping of logical fields to the actual header names of one import,
/// resolved once per batch. Resolution is three-stage: exact primary
/// match, case-insensitive primary/alias match, then substring match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMap {
    columns: BTreeMap<Field, String>,
}

impl ColumnMap {
    pub fn resolve<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|h| h.as_ref().trim().to_string())
            .collect();
        let mut columns = BTreeMap::new();

        for spec in FIELD_SPECS {
            if let Some(header) = Self::find_header(spec, &headers) {
                debug!("Resolved {:?} to column '{}'", spec.field, header);
                columns.insert(spec.field, header);
            }
        }

        Self { columns }
    }

    fn find_header(spec: &FieldSpec, headers: &[String]) -> Option<String> {
        if headers.iter().any(|h| h.as_str() == spec.primary) {
            return Some(spec.primary.to_string());
        }

        let names: Vec<String> = std::iter::once(spec.primary)
            .chain(spec.aliases.iter().copied())
            .map(str::to_lowercase)
            .collect();

        for header in headers {
            let lower = header.to_lowercase();
            if names.iter().any(|name| *name == lower) {
                return Some(header.clone());
            }
        }

        for header in headers {
            let lower = header.to_lowercase();
            if names
                .iter()
                .any(|name| lower.contains(name.as_str()) || name.contains(lower.as_str()))
            {
                return Some(header.clone());
            }
        }

        None
    }

    pub fn header(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    fn value<'a>(&self, row: &'a RawRow, field: Field) -> Option<&'a str> {
        self.header(field).and_then(|header| row.get(header))
    }
}

/// Result of normalizing one import batch. Accepted payments are ready
/// for aggregation; errors and warnings are keyed by source row index;
/// duplicates await adjudication by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub accepted: Vec<Payment>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
    pub duplicates: Vec<DuplicateCandidate>,
}

impl ImportOutcome {
    /// Moves a flagged duplicate into the accepted set after the caller
    /// has adjudicated it. Returns false when no candidate carries the
    /// given row index.
    pub fn admit(&mut self, row_index: usize) -> bool {
        match self
            .duplicates
            .iter()
            .position(|c| c.row_index == row_index)
        {
            Some(position) => {
                let candidate = self.duplicates.remove(position);
                self.accepted.push(candidate.payment);
                true
            }
            None => false,
        }
    }
}

/// Validates and canonicalizes a whole batch of raw rows.
///
/// Duplicate candidates are checked against `existing` (previously
/// persisted payments) and against rows accepted earlier in this same
/// batch, and are returned for adjudication instead of being silently
/// dropped or silently imported.
pub fn normalize_batch(rows: &[RawRow], existing: &[Payment]) -> ImportOutcome {
    let headers: BTreeSet<&String> = rows.iter().flat_map(|r| r.values.keys()).collect();
    let map = ColumnMap::resolve(headers);
    let detector = DuplicateDetector::new();

    let mut outcome = ImportOutcome::default();

    for row in rows {
        match normalize_row(row, &map) {
            Ok((payment, mut row_warnings)) => {
                outcome.warnings.append(&mut row_warnings);

                let conflicts: Vec<Payment> = detector
                    .conflicts_with(&payment, existing.iter().chain(outcome.accepted.iter()))
                    .into_iter()
                    .cloned()
                    .collect();

                if conflicts.is_empty() {
                    outcome.accepted.push(payment);
                } else {
                    debug!(
                        "Row {} flagged as duplicate with {} conflict(s)",
                        row.index,
                        conflicts.len()
                    );
                    outcome.duplicates.push(DuplicateCandidate {
                        row_index: row.index,
                        payment,
                        conflicts,
                    });
                }
            }
            Err(error) => {
                warn!("Row {} rejected: {}", error.row_index, error.reason);
                outcome.errors.push(error);
            }
        }
    }

    info!(
        "Normalized batch: {} accepted, {} rejected, {} duplicate candidate(s), {} warning(s)",
        outcome.accepted.len(),
        outcome.errors.len(),
        outcome.duplicates.len(),
        outcome.warnings.len()
    );

    outcome
}

/// Validates and canonicalizes one raw row. All problems with the row are
/// collected into a single `RowError`; no partial payment is produced.
pub fn normalize_row(row: &RawRow, map: &ColumnMap) -> Result<(Payment, Vec<RowWarning>), RowError> {
    let mut reasons: Vec<String> = Vec::new();
    let mut warnings: Vec<RowWarning> = Vec::new();

    let customer_name = match map.value(row, Field::CustomerName) {
        Some(name) => name.to_string(),
        None => {
            reasons.push("missing customer name".to_string());
            String::new()
        }
    };

    let project = match map.value(row, Field::Project) {
        Some(project) => project.to_string(),
        None => {
            reasons.push("missing project".to_string());
            String::new()
        }
    };

    let payment_date = match map.value(row, Field::PaymentDate) {
        Some(raw) => match parse_date(raw) {
            Some((date, ambiguous)) => {
                if ambiguous {
                    warnings.push(RowWarning {
                        row_index: row.index,
                        kind: WarningKind::AmbiguousDateFormat,
                        raw: raw.to_string(),
                    });
                }
                Some(date)
            }
            None => {
                reasons.push(format!("unparseable date '{raw}'"));
                None
            }
        },
        None => {
            reasons.push("missing payment date".to_string());
            None
        }
    };

    let amount = match map.value(row, Field::Amount) {
        Some(raw) => match parse_amount(raw) {
            Some((value, ambiguous)) => {
                if ambiguous {
                    warnings.push(RowWarning {
                        row_index: row.index,
                        kind: WarningKind::AmbiguousAmountFormat,
                        raw: raw.to_string(),
                    });
                }
                if value <= Decimal::ZERO {
                    reasons.push(format!("non-positive amount '{raw}'"));
                    None
                } else {
                    Some(value)
                }
            }
            None => {
                reasons.push(format!("unparseable amount '{raw}'"));
                None
            }
        },
        None => {
            reasons.push("missing amount".to_string());
            None
        }
    };

    let currency = match map.value(row, Field::Currency) {
        Some(raw) => match parse_currency(raw) {
            Some(currency) => currency,
            None => {
                reasons.push(format!("unrecognized currency '{raw}'"));
                Currency::Local
            }
        },
        None => Currency::Local,
    };

    let channel = map
        .value(row, Field::Channel)
        .unwrap_or_default()
        .to_string();

    let method_text = map.value(row, Field::CollectionMethod);
    let explicit_check = method_text.is_some_and(is_check_spelling);

    let check_amount_field = match map.value(row, Field::CheckAmount) {
        Some(raw) => match parse_amount(raw) {
            Some((value, ambiguous)) => {
                if ambiguous {
                    warnings.push(RowWarning {
                        row_index: row.index,
                        kind: WarningKind::AmbiguousAmountFormat,
                        raw: raw.to_string(),
                    });
                }
                (value > Decimal::ZERO).then_some(value)
            }
            None => {
                reasons.push(format!("unparseable check amount '{raw}'"));
                None
            }
        },
        None => None,
    };

    // The two check signals are OR'd; the explicit method field decides
    // which amount is authoritative when both are present.
    let is_check = explicit_check || check_amount_field.is_some();

    let maturity = match map.value(row, Field::CheckMaturityDate) {
        Some(raw) => match parse_date(raw) {
            Some((date, ambiguous)) => {
                if ambiguous {
                    warnings.push(RowWarning {
                        row_index: row.index,
                        kind: WarningKind::AmbiguousDateFormat,
                        raw: raw.to_string(),
                    });
                }
                Some(date)
            }
            None => {
                reasons.push(format!("unparseable check maturity date '{raw}'"));
                None
            }
        },
        None => None,
    };

    if let (Some(payment_date), Some(maturity)) = (payment_date, maturity) {
        if is_check && maturity < payment_date {
            reasons.push(format!(
                "check maturity {maturity} precedes payment date {payment_date}"
            ));
        }
    }

    if !reasons.is_empty() {
        return Err(RowError {
            row_index: row.index,
            reason: reasons.join(", "),
        });
    }

    // Both unwraps guarded by the reasons check above.
    let payment_date = payment_date.expect("validated");
    let amount = amount.expect("validated");

    let collection_method = if is_check {
        CollectionMethod::Check
    } else {
        match method_text {
            None => CollectionMethod::CashOrTransfer,
            Some(text) if is_cash_spelling(text) => CollectionMethod::CashOrTransfer,
            Some(_) => CollectionMethod::Other,
        }
    };

    let (check_amount, check_maturity_date) = if is_check {
        let deferred = check_amount_field.unwrap_or(amount);
        let maturity = maturity.unwrap_or_else(|| {
            payment_date
                .checked_add_days(Days::new(DEFAULT_MATURITY_DAYS))
                .unwrap_or(payment_date)
        });
        (Some(deferred), Some(maturity))
    } else {
        (None, None)
    };

    Ok((
        Payment {
            customer_name,
            project,
            payment_date,
            amount,
            currency,
            collection_method,
            channel,
            check_amount,
            check_maturity_date,
        },
        warnings,
    ))
}

fn is_check_spelling(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    CHECK_SPELLINGS.contains(&upper.as_str())
}

fn is_cash_spelling(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    CASH_SPELLINGS.contains(&upper.as_str())
}

fn parse_currency(text: &str) -> Option<Currency> {
    let upper = text.trim().to_uppercase();
    if upper.is_empty() || LOCAL_SPELLINGS.contains(&upper.as_str()) {
        Some(Currency::Local)
    } else if REFERENCE_SPELLINGS.contains(&upper.as_str()) {
        Some(Currency::Reference)
    } else {
        None
    }
}

const ISO_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DAY_FIRST_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y"];

/// Parses a textual calendar date. A trailing time-of-day is discarded.
///
/// Year-first forms are recognized by a 4-digit leading component;
/// everything else is read day-first, the fixed rule for this crate. The
/// returned flag is true when a month-first reading would also have been
/// a valid, different date. Two-digit years land in the 2000s.
pub fn parse_date(text: &str) -> Option<(NaiveDate, bool)> {
    let date_part = text.split_whitespace().next()?;
    let leading_digits = date_part
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();

    if leading_digits == 4 {
        for format in ISO_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
                return Some((date, false));
            }
        }
        return None;
    }

    for format in DAY_FIRST_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            // chrono's %Y happily reads "25" as the year 25.
            let date = if date.year() < 100 {
                NaiveDate::from_ymd_opt(date.year() + 2000, date.month(), date.day())?
            } else {
                date
            };
            let day = date.day();
            let month = date.month();
            let swapped_is_valid = day <= 12
                && day != month
                && NaiveDate::from_ymd_opt(date.year(), day, month).is_some();
            return Some((date, swapped_is_valid));
        }
    }

    None
}

/// Parses a monetary amount, tolerating currency symbols and both comma
/// and dot as decimal or group separators.
///
/// With both separators present, the rightmost one is the decimal point.
/// With a single separator, one followed by exactly three digits at the
/// end of the string is treated as a group separator; the returned flag
/// marks that heuristic call as ambiguous.
pub fn parse_amount(text: &str) -> Option<(Decimal, bool)> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '₺' | '$' | '€'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let (normalized, ambiguous) = match (commas, dots) {
        (0, 0) => (cleaned, false),
        (0, 1) | (1, 0) => {
            let separator = if commas == 1 { ',' } else { '.' };
            let tail_len = cleaned
                .rsplit(separator)
                .next()
                .map(str::len)
                .unwrap_or(0);
            let tail_is_digits = cleaned
                .rsplit(separator)
                .next()
                .is_some_and(|tail| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()));
            if tail_len == 3 && tail_is_digits {
                // "1,234" reads as one-thousand-234, not 1.234.
                (cleaned.replace(separator, ""), true)
            } else {
                (cleaned.replace(separator, "."), false)
            }
        }
        (_, 0) => (cleaned.replace(',', ""), false),
        (0, _) => (cleaned.replace('.', ""), false),
        _ => {
            // Both present: rightmost separator is the decimal point.
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            let (decimal, group) = if last_comma > last_dot {
                (',', '.')
            } else {
                ('.', ',')
            };
            let stripped = cleaned.replace(group, "");
            if stripped.matches(decimal).count() > 1 {
                return None;
            }
            (stripped.replace(decimal, "."), false)
        }
    };

    Decimal::from_str(&normalized)
        .ok()
        .map(|value| (value, ambiguous))
}
