use std::fs;
use std::path::Path;

use storecast::{DatasetConfig, DatasetError, SalesDataset};
use tempfile::TempDir;

const STORE_HEADER: &str = "Store,StoreType,Assortment,CompetitionDistance,CompetitionOpenSinceMonth,CompetitionOpenSinceYear,Promo2,Promo2SinceWeek,Promo2SinceYear,PromoInterval";
const SALES_HEADER: &str = "Id,Store,DayOfWeek,Date,Open,Promo,StateHoliday,SchoolHoliday";

fn write_tables(dir: &Path, sales_rows: &[&str], store_rows: &[&str]) -> DatasetConfig {
    let sales_csv = dir.join("test.csv");
    let store_csv = dir.join("store.csv");

    let mut sales = String::from(SALES_HEADER);
    for row in sales_rows {
        sales.push('\n');
        sales.push_str(row);
    }
    fs::write(&sales_csv, sales).unwrap();

    let mut stores = String::from(STORE_HEADER);
    for row in store_rows {
        stores.push('\n');
        stores.push_str(row);
    }
    fs::write(&store_csv, stores).unwrap();

    DatasetConfig {
        sales_csv,
        store_csv,
    }
}

#[test]
fn merges_store_metadata_onto_sales_rows() {
    let dir = TempDir::new().unwrap();
    let cfg = write_tables(
        dir.path(),
        &[
            "1,22,4,2015-09-17,1,1,0,0",
            "2,31,4,2015-09-17,1,0,0,0",
        ],
        &[
            "22,a,a,1270,9,2008,1,13,2010,\"Jan,Apr,Jul,Oct\"",
            "31,d,c,,,,0,,,",
        ],
    );

    let dataset = SalesDataset::load(&cfg).unwrap();
    assert_eq!(dataset.len(), 2);

    let store_22 = dataset.rows_for_store(22);
    assert_eq!(store_22.len(), 1);
    assert_eq!(store_22[0].store_type, "a");
    assert_eq!(store_22[0].competition_distance, Some(1270.0));
    assert_eq!(
        store_22[0].promo_interval.as_deref(),
        Some("Jan,Apr,Jul,Oct")
    );

    let store_31 = dataset.rows_for_store(31);
    assert_eq!(store_31.len(), 1);
    assert_eq!(store_31[0].store_type, "d");
    assert_eq!(store_31[0].competition_distance, None);
    assert_eq!(store_31[0].promo_interval, None);
}

#[test]
fn rows_with_missing_open_are_dropped_at_load() {
    let dir = TempDir::new().unwrap();
    let cfg = write_tables(
        dir.path(),
        &[
            "1,22,4,2015-09-17,1,1,0,0",
            "2,22,5,2015-09-18,,1,0,0",
            "3,22,6,2015-09-19,0,0,0,0",
        ],
        &["22,a,a,1270,9,2008,0,,,"],
    );

    let dataset = SalesDataset::load(&cfg).unwrap();
    // The missing-open row is gone; the closed row stays in the dataset.
    assert_eq!(dataset.len(), 2);
    // rows_for_store additionally filters the closed day out.
    assert_eq!(dataset.rows_for_store(22).len(), 1);
}

#[test]
fn unknown_store_yields_an_empty_selection() {
    let dir = TempDir::new().unwrap();
    let cfg = write_tables(
        dir.path(),
        &["1,22,4,2015-09-17,1,1,0,0"],
        &["22,a,a,1270,9,2008,0,,,"],
    );

    let dataset = SalesDataset::load(&cfg).unwrap();
    assert!(dataset.rows_for_store(999).is_empty());
}

#[test]
fn sales_row_without_store_metadata_is_an_error() {
    let dir = TempDir::new().unwrap();
    let cfg = write_tables(
        dir.path(),
        &["1,99,4,2015-09-17,1,1,0,0"],
        &["22,a,a,1270,9,2008,0,,,"],
    );

    let err = SalesDataset::load(&cfg).unwrap_err();
    match err {
        DatasetError::MissingStoreMetadata { store } => assert_eq!(store, 99),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreadable_table_is_a_csv_error() {
    let dir = TempDir::new().unwrap();
    let cfg = DatasetConfig {
        sales_csv: dir.path().join("missing.csv"),
        store_csv: dir.path().join("also_missing.csv"),
    };

    let err = SalesDataset::load(&cfg).unwrap_err();
    assert!(matches!(err, DatasetError::Csv { .. }));
}
