//! # Fixture Dataset Tests
//!
//! Load the bundled 1960-2022 sample export from disk and check the response
//! formats produced for the request handlers.

use std::path::PathBuf;

use isrv_data::{Dataset, WdiTable};

fn fixture() -> WdiTable {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/wdi_sample.csv");
    WdiTable::load(&path).unwrap()
}

#[test]
fn loads_sixty_three_years() {
    let table = fixture();
    assert_eq!(table.len(), 5);
    assert_eq!(table.first_year(), 1960);
    assert_eq!(table.last_year(), 2022);
    assert!(table.records().iter().all(|r| r.values.len() == 63));
}

#[test]
fn full_series_query() {
    let response = fixture().query("DEU", "NY.GDP.MKTP.CD");
    let fields: Vec<&str> = response.split(';').collect();
    assert_eq!(fields.len(), 2 + 63);
    assert_eq!(&fields[..2], &["DEU", "NY.GDP.MKTP.CD"]);
    assert_eq!(fields[2], "0");
    assert_eq!(fields[2 + 30], "900000000000");
}

#[test]
fn single_year_query() {
    assert_eq!(
        fixture().query_year("DEU", "NY.GDP.MKTP.CD", 1990),
        "DEU;NY.GDP.MKTP.CD;1990;900000000000"
    );
}

#[test]
fn report_over_all_countries() {
    assert_eq!(
        fixture().report("SP.POP.TOTL"),
        "DEU;73100000;FRA;50000000;KOR;0;"
    );
}

#[test]
fn quoted_country_names_keep_commas() {
    let table = fixture();
    let kor = table.series("KOR", "SP.POP.TOTL").unwrap();
    assert_eq!(kor.country_name, "Korea, Rep.");
}
