//! Raw sales record cleaning: schema normalization, typing, null filling.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Distance sentinel for "no known competitor".
pub const NO_COMPETITOR_DISTANCE: f64 = 200_000.0;

/// Promo-interval sentinel for "no promo campaign".
pub const NO_PROMO_INTERVAL: &str = "";

/// Month abbreviations as the promo-interval lists spell them.
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sept", "Oct", "Nov", "Dec",
];

#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid batch payload: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("unparseable date '{value}' at row {row}")]
    UnparseableDate { row: usize, value: String },
    #[error("unmapped {field} code '{value}' at row {row}")]
    UnmappedCode {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("no calendar date for competition open year {year} month {month} at row {row}")]
    InvalidCompetitionSince { row: usize, year: i64, month: i64 },
    #[error("no ISO week {week} in year {year} at row {row}")]
    InvalidPromoSince { row: usize, year: i64, week: i64 },
    #[error("{predictions} predictions do not align with {originals} original rows")]
    PredictionCountMismatch {
        predictions: usize,
        originals: usize,
    },
}

/// One sales observation exactly as the upstream schema ships it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Store")]
    pub store: i64,
    #[serde(rename = "DayOfWeek")]
    pub day_of_week: i64,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Open")]
    pub open: i64,
    #[serde(rename = "Promo")]
    pub promo: i64,
    #[serde(rename = "StateHoliday")]
    pub state_holiday: String,
    #[serde(rename = "SchoolHoliday")]
    pub school_holiday: i64,
    #[serde(rename = "StoreType")]
    pub store_type: String,
    #[serde(rename = "Assortment")]
    pub assortment: String,
    #[serde(rename = "CompetitionDistance")]
    pub competition_distance: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceMonth")]
    pub competition_open_since_month: Option<f64>,
    #[serde(rename = "CompetitionOpenSinceYear")]
    pub competition_open_since_year: Option<f64>,
    #[serde(rename = "Promo2")]
    pub promo2: i64,
    #[serde(rename = "Promo2SinceWeek")]
    pub promo2_since_week: Option<f64>,
    #[serde(rename = "Promo2SinceYear")]
    pub promo2_since_year: Option<f64>,
    #[serde(rename = "PromoInterval")]
    pub promo_interval: Option<String>,
}

/// A RawRecord after renaming, typing, and null filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub store: i64,
    pub day_of_week: i64,
    pub date: NaiveDate,
    pub open: i64,
    pub promo: i64,
    pub state_holiday: String,
    pub school_holiday: i64,
    pub store_type: String,
    pub assortment: String,
    pub competition_distance: f64,
    pub competition_open_since_month: i64,
    pub competition_open_since_year: i64,
    pub promo2: i64,
    pub promo2_since_week: i64,
    pub promo2_since_year: i64,
    pub promo_interval: String,
    pub is_promo: i64,
}

/// Parses a row-oriented JSON batch into raw records.
///
/// A missing required field or a type mismatch rejects the whole batch.
pub fn parse_raw_batch(payload: &str) -> Result<Vec<RawRecord>, DataError> {
    Ok(serde_json::from_str(payload)?)
}

pub fn month_abbreviation(month: u32) -> &'static str {
    MONTH_ABBREVIATIONS[(month - 1) as usize]
}

/// Cleans a raw batch. Pure: the input batch is left untouched.
pub fn clean_records(records: &[RawRecord]) -> Result<Vec<CleanedRecord>, DataError> {
    let mut cleaned = Vec::with_capacity(records.len());

    for (row, raw) in records.iter().enumerate() {
        let date = parse_record_date(&raw.date).ok_or_else(|| DataError::UnparseableDate {
            row,
            value: raw.date.clone(),
        })?;

        let competition_distance = raw
            .competition_distance
            .unwrap_or(NO_COMPETITOR_DISTANCE);
        // Absent competition/promo2 anchors are assumed to start at the
        // observation's own date.
        let competition_open_since_year = raw
            .competition_open_since_year
            .map(|v| v as i64)
            .unwrap_or(i64::from(date.year()));
        let competition_open_since_month = raw
            .competition_open_since_month
            .map(|v| v as i64)
            .unwrap_or(i64::from(date.month()));
        let promo2_since_year = raw
            .promo2_since_year
            .map(|v| v as i64)
            .unwrap_or(i64::from(date.year()));
        let promo2_since_week = raw
            .promo2_since_week
            .map(|v| v as i64)
            .unwrap_or(i64::from(date.iso_week().week()));

        let promo_interval = raw
            .promo_interval
            .clone()
            .unwrap_or_else(|| NO_PROMO_INTERVAL.to_string());
        let is_promo = if promo_interval == NO_PROMO_INTERVAL {
            0
        } else if promo_interval
            .split(',')
            .any(|entry| entry == month_abbreviation(date.month()))
        {
            1
        } else {
            0
        };

        cleaned.push(CleanedRecord {
            store: raw.store,
            day_of_week: raw.day_of_week,
            date,
            open: raw.open,
            promo: raw.promo,
            state_holiday: raw.state_holiday.clone(),
            school_holiday: raw.school_holiday,
            store_type: raw.store_type.clone(),
            assortment: raw.assortment.clone(),
            competition_distance,
            competition_open_since_month,
            competition_open_since_year,
            promo2: raw.promo2,
            promo2_since_week,
            promo2_since_year,
            promo_interval,
            is_promo,
        });
    }

    info!(
        component = "pipeline",
        event = "pipeline.clean.finish",
        rows = cleaned.len()
    );

    Ok(cleaned)
}

fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    None
}
