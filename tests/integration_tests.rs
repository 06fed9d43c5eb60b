use chrono::NaiveDate;
use payment_report_builder::*;
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
fn full_pipeline_raw_rows_to_report() {
    // Rates published on weekdays only; the weekend is sparse by design.
    let mut store = RateStore::new();
    store.insert(d(2025, 9, 1), dec!(40.00)); // Monday
    store.insert(d(2025, 9, 2), dec!(41.00));
    store.insert(d(2025, 9, 3), dec!(42.00));
    store.insert(d(2025, 9, 5), dec!(41.25)); // Friday
    store.insert(d(2026, 2, 27), dec!(50.00)); // near the check maturity

    let rows = vec![
        row(
            0,
            &[
                ("Müşteri Adı Soyadı", "Ayşe Kaya"),
                ("Tarih", "01.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "4.000"),
                ("Ödenen Döviz", "TL"),
                ("Hesap Adı", "Yapı Kredi TL"),
            ],
        ),
        row(
            1,
            &[
                ("Müşteri Adı Soyadı", "Ali Demir"),
                ("Tarih", "03.09.2025"),
                ("Proje Adı", "Site B"),
                ("Ödenen Tutar", "100"),
                ("Ödenen Döviz", "USD"),
                ("Hesap Adı", "Çarşı USD"),
            ],
        ),
        // Check payment with an explicit method and no maturity date:
        // maturity defaults to 180 days after the payment date.
        row(
            2,
            &[
                ("Müşteri Adı Soyadı", "Zeynep Acar"),
                ("Tarih", "01.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "2000"),
                ("Ödenen Döviz", "TL"),
                ("Tahsilat Şekli", "Çek"),
            ],
        ),
        // Saturday payment: no Saturday rate, Friday's must be used.
        row(
            3,
            &[
                ("Müşteri Adı Soyadı", "Ali Demir"),
                ("Tarih", "06.09.2025"),
                ("Proje Adı", "Site B"),
                ("Ödenen Tutar", "825"),
                ("Ödenen Döviz", "TL"),
            ],
        ),
    ];

    let builder = ReportBuilder::new(store);
    let outcome = builder.import(&rows, &[]);
    assert_eq!(outcome.accepted.len(), 4);
    assert!(outcome.errors.is_empty());
    assert!(outcome.duplicates.is_empty());

    let report = builder
        .build(&outcome.accepted, d(2025, 9, 1), d(2025, 9, 7))
        .unwrap();
    assert_eq!(report.weeks.len(), 1);
    let week = &report.weeks[0];

    // 4000/40 = 100, 100 USD as-is, 2000/40 = 50, 825/41.25 = 20.
    assert_eq!(week.immediate.grand_total, dec!(270.00));
    assert_eq!(report.unresolved_count(), 0);

    // Deferred tables carry only the check payment.
    assert_eq!(week.deferred_local.rows.len(), 1);
    assert_eq!(week.deferred_local.grand_total, dec!(2000));
    // Maturity 2026-02-28 has no rate; 2026-02-27 does: 2000/50 = 40.
    assert_eq!(week.deferred_reference.grand_total, dec!(40.00));
}

#[test]
fn saturday_conversion_reports_friday_rate_date() {
    let mut store = RateStore::new();
    store.insert(d(2025, 9, 5), dec!(41.25)); // Friday

    let converter = Converter::new(&store);
    let conversion = converter
        .convert(dec!(825), Currency::Local, d(2025, 9, 6))
        .unwrap();
    assert_eq!(conversion.rate_date_used, d(2025, 9, 5));
    assert_eq!(conversion.amount, dec!(20.00));
    assert!(conversion.converted);
}

#[test]
fn duplicate_check_rows_flagged_then_admitted_with_defaulted_maturity() {
    let rows = vec![
        row(
            0,
            &[
                ("Müşteri Adı Soyadı", "Ayşe Kaya"),
                ("Tarih", "01.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "1000"),
                ("Tahsilat Şekli", "Çek"),
                ("Çek Vade Tarihi", "01.03.2026"),
            ],
        ),
        // Same customer (case/spacing differs), same day, same amount:
        // flagged regardless of the differing project, maturity unset.
        row(
            1,
            &[
                ("Müşteri Adı Soyadı", "ayşe  kaya"),
                ("Tarih", "01.09.2025"),
                ("Proje Adı", "Site B"),
                ("Ödenen Tutar", "1000.00"),
                ("Tahsilat Şekli", "ÇEK"),
            ],
        ),
    ];

    let mut outcome = import_payment_rows(&rows, &[]);
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.duplicates.len(), 1);
    let candidate = &outcome.duplicates[0];
    assert_eq!(candidate.row_index, 1);
    assert_eq!(candidate.conflicts.len(), 1);
    assert_eq!(candidate.conflicts[0].customer_name, "Ayşe Kaya");

    // The caller adjudicates and imports it anyway.
    assert!(outcome.admit(1));
    assert_eq!(outcome.accepted.len(), 2);
    let admitted = &outcome.accepted[1];
    // Maturity was unset, so it defaulted to payment date + 180 days.
    assert_eq!(admitted.check_maturity_date, Some(d(2026, 2, 28)));
    // The first row kept its explicit maturity.
    assert_eq!(outcome.accepted[0].check_maturity_date, Some(d(2026, 3, 1)));
}

#[test]
fn bad_rows_never_abort_the_batch() {
    let rows = vec![
        row(
            0,
            &[
                ("Müşteri Adı Soyadı", "Ayşe Kaya"),
                ("Tarih", "31.13.2025"), // no 13th month
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "1000"),
            ],
        ),
        row(
            1,
            &[
                ("Müşteri Adı Soyadı", "Ali Demir"),
                ("Tarih", "02.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "zero"),
            ],
        ),
        row(
            2,
            &[
                ("Müşteri Adı Soyadı", "Zeynep Acar"),
                ("Tarih", "02.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "500"),
            ],
        ),
    ];

    let outcome = import_payment_rows(&rows, &[]);
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.accepted[0].customer_name, "Zeynep Acar");
    assert_eq!(outcome.errors.len(), 2);
    let indices: Vec<usize> = outcome.errors.iter().map(|e| e.row_index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn ambiguous_formats_surface_warnings_but_rows_import() {
    let rows = vec![row(
        0,
        &[
            ("Müşteri Adı Soyadı", "Ayşe Kaya"),
            ("Tarih", "03/04/2025"),   // 3 April under the day-first rule
            ("Proje Adı", "Site A"),
            ("Ödenen Tutar", "1,234"), // grouping under the 3-digit rule
        ],
    )];

    let outcome = import_payment_rows(&rows, &[]);
    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.accepted[0].payment_date, d(2025, 4, 3));
    assert_eq!(outcome.accepted[0].amount, dec!(1234));

    let kinds: Vec<WarningKind> = outcome.warnings.iter().map(|w| w.kind).collect();
    assert!(kinds.contains(&WarningKind::AmbiguousDateFormat));
    assert!(kinds.contains(&WarningKind::AmbiguousAmountFormat));
}

#[test]
fn every_pivot_kind_satisfies_the_corner_invariant() {
    let mut store = RateStore::new();
    for day in 1..=30 {
        store.insert(d(2025, 9, day), dec!(40));
    }
    for day in 1..=31 {
        store.insert(d(2026, 3, day), dec!(50));
    }

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
                ("Tarih", "10.09.2025"),
                ("Proje Adı", "Site B"),
                ("Ödenen Tutar", "2000"),
                ("Ödenen Döviz", "TL"),
                ("Tahsilat Şekli", "Çek"),
                ("Çek Tutarı", "1500"),
                ("Çek Vade Tarihi", "10.03.2026"),
            ],
        ),
        row(
            2,
            &[
                ("Müşteri Adı Soyadı", "Zeynep Acar"),
                ("Tarih", "17.09.2025"),
                ("Proje Adı", "Site A"),
                ("Ödenen Tutar", "250"),
                ("Ödenen Döviz", "USD"),
            ],
        ),
    ];

    let builder = ReportBuilder::new(store);
    let outcome = builder.import(&rows, &[]);
    assert_eq!(outcome.accepted.len(), 3);

    let report = builder
        .build(&outcome.accepted, d(2025, 9, 1), d(2025, 9, 21))
        .unwrap();
    assert_eq!(report.weeks.len(), 3);

    for week in &report.weeks {
        for pivot in [&week.immediate, &week.deferred_local, &week.deferred_reference] {
            let body: rust_decimal::Decimal = pivot
                .rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .filter_map(|c| c.value())
                .sum();
            assert_eq!(pivot.grand_total, body);
            let column_sum: rust_decimal::Decimal = pivot.column_totals.iter().copied().sum();
            assert_eq!(pivot.grand_total, column_sum);
            let row_sum: rust_decimal::Decimal = pivot.rows.iter().map(|r| r.total).sum();
            assert_eq!(pivot.grand_total, row_sum);
            assert_eq!(pivot.columns.len(), 7);
        }
    }
}
