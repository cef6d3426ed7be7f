//! Scaling, categorical encoding, cyclical encoding, and projection onto
//! the model's fixed feature schema.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::artifacts::ScalerArtifacts;
use crate::clean::DataError;
use crate::features::{FeatureRecord, StateHoliday};

pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// The model's input contract. Column order and count are invariant; any
/// change here breaks every downstream model.
pub const MODEL_FEATURE_COLUMNS: [&str; 20] = [
    "store",
    "promo",
    "store_type",
    "assortment",
    "competition_distance",
    "competition_open_since_month",
    "competition_open_since_year",
    "promo2",
    "promo2_since_week",
    "promo2_since_year",
    "competition_time_month",
    "promo_time_week",
    "month_cos",
    "month_sin",
    "day_sin",
    "day_cos",
    "day_of_week_sin",
    "day_of_week_cos",
    "week_of_year_cos",
    "week_of_year_sin",
];

/// One-hot indicator block for the state-holiday label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHolidayOneHot {
    pub state_holiday_regular_day: bool,
    pub state_holiday_public_holiday: bool,
    pub state_holiday_easter_holiday: bool,
    pub state_holiday_christmas: bool,
}

impl StateHolidayOneHot {
    pub fn from_label(state_holiday: StateHoliday) -> Self {
        Self {
            state_holiday_regular_day: matches!(state_holiday, StateHoliday::RegularDay),
            state_holiday_public_holiday: matches!(state_holiday, StateHoliday::PublicHoliday),
            state_holiday_easter_holiday: matches!(state_holiday, StateHoliday::EasterHoliday),
            state_holiday_christmas: matches!(state_holiday, StateHoliday::Christmas),
        }
    }
}

/// A fully encoded record before projection. Carries every encoded column,
/// including the ones the model schema does not keep (scaled year, one-hot
/// state-holiday block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRow {
    pub store: i64,
    pub day_of_week: i64,
    pub promo: i64,
    pub school_holiday: i64,
    pub is_promo: i64,
    pub store_type: f64,
    pub assortment: i64,
    pub competition_distance: f64,
    pub competition_open_since_month: i64,
    pub competition_open_since_year: i64,
    pub promo2: i64,
    pub promo2_since_week: i64,
    pub promo2_since_year: i64,
    pub competition_time_month: f64,
    pub promo_time_week: f64,
    pub year: f64,
    pub month: i64,
    pub day: i64,
    pub week_of_year: i64,
    pub state_holiday: StateHolidayOneHot,
    pub month_sin: f64,
    pub month_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub day_of_week_sin: f64,
    pub day_of_week_cos: f64,
    pub week_of_year_sin: f64,
    pub week_of_year_cos: f64,
}

/// The model's input row: exactly the 20 columns of
/// [`MODEL_FEATURE_COLUMNS`], in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFeatureVector {
    pub store: f64,
    pub promo: f64,
    pub store_type: f64,
    pub assortment: f64,
    pub competition_distance: f64,
    pub competition_open_since_month: f64,
    pub competition_open_since_year: f64,
    pub promo2: f64,
    pub promo2_since_week: f64,
    pub promo2_since_year: f64,
    pub competition_time_month: f64,
    pub promo_time_week: f64,
    pub month_cos: f64,
    pub month_sin: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub day_of_week_sin: f64,
    pub day_of_week_cos: f64,
    pub week_of_year_cos: f64,
    pub week_of_year_sin: f64,
}

impl EncodedFeatureVector {
    /// Values in schema column order.
    pub fn to_values(&self) -> [f64; 20] {
        [
            self.store,
            self.promo,
            self.store_type,
            self.assortment,
            self.competition_distance,
            self.competition_open_since_month,
            self.competition_open_since_year,
            self.promo2,
            self.promo2_since_week,
            self.promo2_since_year,
            self.competition_time_month,
            self.promo_time_week,
            self.month_cos,
            self.month_sin,
            self.day_sin,
            self.day_cos,
            self.day_of_week_sin,
            self.day_of_week_cos,
            self.week_of_year_cos,
            self.week_of_year_sin,
        ]
    }
}

/// Fingerprint of the model schema (version + ordered column list).
pub fn model_schema_fingerprint() -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{MODEL_SCHEMA_VERSION};columns:"));
    for column in MODEL_FEATURE_COLUMNS {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

/// Encodes one derived record. Transform-only: the artifacts' fitted
/// parameters are read, never updated.
pub fn encode_row(
    row: usize,
    record: &FeatureRecord,
    artifacts: &ScalerArtifacts,
) -> Result<EncodedRow, DataError> {
    let store_type = artifacts
        .store_type_encoder
        .transform(&record.store_type)
        .ok_or_else(|| DataError::UnmappedCode {
            row,
            field: "store_type",
            value: record.store_type.clone(),
        })?;

    let (month_sin, month_cos) = cyclical_pair(record.month as f64, 12.0);
    let (day_sin, day_cos) = cyclical_pair(record.day as f64, 30.0);
    let (day_of_week_sin, day_of_week_cos) = cyclical_pair(record.day_of_week as f64, 7.0);
    let (week_of_year_sin, week_of_year_cos) = cyclical_pair(record.week_of_year as f64, 52.0);

    Ok(EncodedRow {
        store: record.store,
        day_of_week: record.day_of_week,
        promo: record.promo,
        school_holiday: record.school_holiday,
        is_promo: record.is_promo,
        store_type,
        assortment: record.assortment.ordinal(),
        competition_distance: artifacts
            .competition_distance_scaler
            .transform(record.competition_distance),
        competition_open_since_month: record.competition_open_since_month,
        competition_open_since_year: record.competition_open_since_year,
        promo2: record.promo2,
        promo2_since_week: record.promo2_since_week,
        promo2_since_year: record.promo2_since_year,
        competition_time_month: artifacts
            .competition_time_month_scaler
            .transform(record.competition_time_month as f64),
        promo_time_week: artifacts
            .promo_time_week_scaler
            .transform(record.promo_time_week as f64),
        year: artifacts.year_scaler.transform(record.year as f64),
        month: record.month,
        day: record.day,
        week_of_year: record.week_of_year,
        state_holiday: StateHolidayOneHot::from_label(record.state_holiday),
        month_sin,
        month_cos,
        day_sin,
        day_cos,
        day_of_week_sin,
        day_of_week_cos,
        week_of_year_sin,
        week_of_year_cos,
    })
}

/// Projects an encoded row onto the model schema, dropping every column the
/// model was not trained on.
pub fn project(row: &EncodedRow) -> EncodedFeatureVector {
    EncodedFeatureVector {
        store: row.store as f64,
        promo: row.promo as f64,
        store_type: row.store_type,
        assortment: row.assortment as f64,
        competition_distance: row.competition_distance,
        competition_open_since_month: row.competition_open_since_month as f64,
        competition_open_since_year: row.competition_open_since_year as f64,
        promo2: row.promo2 as f64,
        promo2_since_week: row.promo2_since_week as f64,
        promo2_since_year: row.promo2_since_year as f64,
        competition_time_month: row.competition_time_month,
        promo_time_week: row.promo_time_week,
        month_cos: row.month_cos,
        month_sin: row.month_sin,
        day_sin: row.day_sin,
        day_cos: row.day_cos,
        day_of_week_sin: row.day_of_week_sin,
        day_of_week_cos: row.day_of_week_cos,
        week_of_year_cos: row.week_of_year_cos,
        week_of_year_sin: row.week_of_year_sin,
    }
}

/// Encodes a derived batch in input order.
pub fn encode_features(
    records: &[FeatureRecord],
    artifacts: &ScalerArtifacts,
) -> Result<Vec<EncodedFeatureVector>, DataError> {
    let mut vectors = Vec::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        let encoded = encode_row(row, record, artifacts)?;
        vectors.push(project(&encoded));
    }

    info!(
        component = "pipeline",
        event = "pipeline.encode.finish",
        rows = vectors.len(),
        column_count = MODEL_FEATURE_COLUMNS.len()
    );

    Ok(vectors)
}

/// Standard angular encoding: `sin(2π·x/period)`, `cos(2π·x/period)`.
fn cyclical_pair(value: f64, period: f64) -> (f64, f64) {
    let angle = value * (2.0 * PI / period);
    (angle.sin(), angle.cos())
}
