//! Forecast-horizon sales dataset: the sales table left-merged with the
//! per-store metadata table on store identifier.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::clean::RawRecord;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("sales row references store {store} with no metadata row")]
    MissingStoreMetadata { store: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub sales_csv: PathBuf,
    pub store_csv: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sales_csv: PathBuf::from("data/test.csv"),
            store_csv: PathBuf::from("data/store.csv"),
        }
    }
}

/// One row of the forecast-horizon sales table.
#[derive(Debug, Clone, Deserialize)]
struct SalesRow {
    #[serde(rename = "Id")]
    _id: i64,
    #[serde(rename = "Store")]
    store: i64,
    #[serde(rename = "DayOfWeek")]
    day_of_week: i64,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "Promo")]
    promo: i64,
    #[serde(rename = "StateHoliday")]
    state_holiday: String,
    #[serde(rename = "SchoolHoliday")]
    school_holiday: i64,
}

/// One row of the per-store metadata table.
#[derive(Debug, Clone, Deserialize)]
struct StoreRow {
    #[serde(rename = "Store")]
    store: i64,
    #[serde(rename = "StoreType")]
    store_type: String,
    #[serde(rename = "Assortment")]
    assortment: String,
    #[serde(rename = "CompetitionDistance")]
    competition_distance: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceMonth")]
    competition_open_since_month: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceYear")]
    competition_open_since_year: Option<f64>,
    #[serde(rename = "Promo2")]
    promo2: i64,
    #[serde(rename = "Promo2SinceWeek")]
    promo2_since_week: Option<f64>,
    #[serde(rename = "Promo2SinceYear")]
    promo2_since_year: Option<f64>,
    #[serde(rename = "PromoInterval")]
    promo_interval: Option<String>,
}

/// The merged dataset, loaded once at startup. Rows whose `Open` field is
/// missing carry no usable observation and are dropped at load.
#[derive(Debug, Clone)]
pub struct SalesDataset {
    records: Vec<RawRecord>,
}

impl SalesDataset {
    /// Builds a dataset from already-merged records, bypassing the CSV
    /// tables. The relay only needs `rows_for_store` semantics.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn load(cfg: &DatasetConfig) -> Result<Self, DatasetError> {
        let stores = read_store_table(cfg)?;
        let sales = read_sales_table(cfg)?;

        let mut records = Vec::with_capacity(sales.len());
        let mut missing_open_dropped = 0usize;

        for row in sales {
            let Some(open) = row.open else {
                missing_open_dropped += 1;
                continue;
            };
            let meta = stores
                .get(&row.store)
                .ok_or(DatasetError::MissingStoreMetadata { store: row.store })?;

            records.push(RawRecord {
                store: row.store,
                day_of_week: row.day_of_week,
                date: row.date,
                open: open as i64,
                promo: row.promo,
                state_holiday: row.state_holiday,
                school_holiday: row.school_holiday,
                store_type: meta.store_type.clone(),
                assortment: meta.assortment.clone(),
                competition_distance: meta.competition_distance,
                competition_open_since_month: meta.competition_open_since_month,
                competition_open_since_year: meta.competition_open_since_year,
                promo2: meta.promo2,
                promo2_since_week: meta.promo2_since_week,
                promo2_since_year: meta.promo2_since_year,
                promo_interval: meta.promo_interval.clone(),
            });
        }

        info!(
            component = "dataset",
            event = "dataset.load.finish",
            sales_csv = %cfg.sales_csv.display(),
            store_csv = %cfg.store_csv.display(),
            stores = stores.len(),
            rows = records.len(),
            missing_open_dropped
        );

        Ok(Self { records })
    }

    /// Open-day rows for one store, in dataset order.
    pub fn rows_for_store(&self, store: i64) -> Vec<RawRecord> {
        self.records
            .iter()
            .filter(|record| record.store == store && record.open != 0)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn read_store_table(cfg: &DatasetConfig) -> Result<HashMap<i64, StoreRow>, DatasetError> {
    let mut reader = csv::Reader::from_path(&cfg.store_csv).map_err(|source| DatasetError::Csv {
        path: cfg.store_csv.clone(),
        source,
    })?;

    let mut stores = HashMap::new();
    for result in reader.deserialize::<StoreRow>() {
        let row = result.map_err(|source| DatasetError::Csv {
            path: cfg.store_csv.clone(),
            source,
        })?;
        stores.insert(row.store, row);
    }
    Ok(stores)
}

fn read_sales_table(cfg: &DatasetConfig) -> Result<Vec<SalesRow>, DatasetError> {
    let mut reader = csv::Reader::from_path(&cfg.sales_csv).map_err(|source| DatasetError::Csv {
        path: cfg.sales_csv.clone(),
        source,
    })?;

    let mut sales = Vec::new();
    for result in reader.deserialize::<SalesRow>() {
        sales.push(result.map_err(|source| DatasetError::Csv {
            path: cfg.sales_csv.clone(),
            source,
        })?);
    }
    Ok(sales)
}
