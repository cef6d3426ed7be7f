//! Prediction formatting: inverse of the model's log-space output, merged
//! back onto the pre-encoding records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clean::{CleanedRecord, DataError};

/// A pre-encoding record plus the model's prediction in sales units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
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
    pub prediction: f64,
}

/// Attaches predictions to their originating records, reversing the log1p
/// transform the model was trained under. Row order is preserved; the two
/// slices must already be aligned row-for-row.
pub fn format_predictions(
    originals: &[CleanedRecord],
    model_output: &[f64],
) -> Result<Vec<PredictionRow>, DataError> {
    if originals.len() != model_output.len() {
        return Err(DataError::PredictionCountMismatch {
            predictions: model_output.len(),
            originals: originals.len(),
        });
    }

    let rows = originals
        .iter()
        .zip(model_output)
        .map(|(record, log_prediction)| PredictionRow {
            store: record.store,
            day_of_week: record.day_of_week,
            date: record.date,
            open: record.open,
            promo: record.promo,
            state_holiday: record.state_holiday.clone(),
            school_holiday: record.school_holiday,
            store_type: record.store_type.clone(),
            assortment: record.assortment.clone(),
            competition_distance: record.competition_distance,
            competition_open_since_month: record.competition_open_since_month,
            competition_open_since_year: record.competition_open_since_year,
            promo2: record.promo2,
            promo2_since_week: record.promo2_since_week,
            promo2_since_year: record.promo2_since_year,
            promo_interval: record.promo_interval.clone(),
            is_promo: record.is_promo,
            prediction: log_prediction.exp_m1(),
        })
        .collect::<Vec<_>>();

    info!(
        component = "pipeline",
        event = "pipeline.format.finish",
        rows = rows.len()
    );

    Ok(rows)
}

/// Row-oriented JSON array with ISO-8601 dates.
pub fn predictions_to_json(rows: &[PredictionRow]) -> Result<String, DataError> {
    Ok(serde_json::to_string(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{clean_records, RawRecord};

    fn originals(count: usize) -> Vec<CleanedRecord> {
        let raw: Vec<RawRecord> = (0..count)
            .map(|idx| RawRecord {
                store: idx as i64 + 1,
                day_of_week: 3,
                date: "2015-06-10".to_string(),
                open: 1,
                promo: 0,
                state_holiday: "0".to_string(),
                school_holiday: 0,
                store_type: "a".to_string(),
                assortment: "a".to_string(),
                competition_distance: Some(1270.0),
                competition_open_since_month: Some(9.0),
                competition_open_since_year: Some(2008.0),
                promo2: 0,
                promo2_since_week: None,
                promo2_since_year: None,
                promo_interval: None,
            })
            .collect();
        clean_records(&raw).unwrap()
    }

    #[test]
    fn reverses_log1p_and_preserves_row_order() {
        let originals = originals(3);
        let model_output = [8.5_f64, 9.1, 7.3];

        let rows = format_predictions(&originals, &model_output).unwrap();

        assert_eq!(rows.len(), 3);
        for (idx, row) in rows.iter().enumerate() {
            assert_eq!(row.store, idx as i64 + 1);
            assert!((row.prediction - model_output[idx].exp_m1()).abs() < 1e-9);
        }
    }

    #[test]
    fn length_mismatch_is_an_error_not_misalignment() {
        let originals = originals(2);
        let err = format_predictions(&originals, &[8.5]).unwrap_err();
        match err {
            DataError::PredictionCountMismatch {
                predictions,
                originals,
            } => {
                assert_eq!(predictions, 1);
                assert_eq!(originals, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn json_output_is_row_oriented_with_iso_dates() {
        let originals = originals(1);
        let rows = format_predictions(&originals, &[0.0]).unwrap();
        let json = predictions_to_json(&rows).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &parsed.as_array().unwrap()[0];
        assert_eq!(first["date"], "2015-06-10");
        assert_eq!(first["prediction"], 0.0);
        assert_eq!(first["store"], 1);
    }
}
