use chrono::{Datelike, Days, NaiveDate};

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Sunday of the week containing `date`.
pub fn week_end(date: NaiveDate) -> NaiveDate {
    week_start(date)
        .checked_add_days(Days::new(6))
        .unwrap_or(date)
}

/// Every Monday whose week intersects `[start, end]`, ascending.
pub fn week_mondays_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut mondays = Vec::new();
    let mut current = week_start(start);
    while current <= end {
        mondays.push(current);
        current = match current.checked_add_days(Days::new(7)) {
            Some(next) => next,
            None => break,
        };
    }
    mondays
}

/// Canonical form of a customer name for comparison: trimmed, inner
/// whitespace collapsed to single spaces, lowercased. Dotted capital I
/// (U+0130) lowercases to `i` + combining dot; the combining mark is
/// stripped so `ALİ` and `Ali` compare equal.
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace('\u{0307}', "")
}
