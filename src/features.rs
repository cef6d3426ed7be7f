//! Calendar and competition/promotion feature derivation.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clean::{CleanedRecord, DataError};

/// Days per month / per week used for the elapsed-time features. These are
/// deliberate approximations; the model's columns were fitted against them.
const DAYS_PER_MONTH: i64 = 30;
const DAYS_PER_WEEK: i64 = 7;

/// A store's product-range tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assortment {
    Basic,
    Extra,
    Extended,
}

impl Assortment {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "a" => Some(Self::Basic),
            "b" => Some(Self::Extra),
            "c" => Some(Self::Extended),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Extra => "extra",
            Self::Extended => "extended",
        }
    }

    /// Ordered encoding: basic < extra < extended.
    pub fn ordinal(self) -> i64 {
        match self {
            Self::Basic => 1,
            Self::Extra => 2,
            Self::Extended => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateHoliday {
    RegularDay,
    PublicHoliday,
    EasterHoliday,
    Christmas,
}

impl StateHoliday {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::RegularDay),
            "a" => Some(Self::PublicHoliday),
            "b" => Some(Self::EasterHoliday),
            "c" => Some(Self::Christmas),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RegularDay => "regular_day",
            Self::PublicHoliday => "public_holiday",
            Self::EasterHoliday => "easter_holiday",
            Self::Christmas => "christmas",
        }
    }
}

/// A cleaned record augmented with derived features; closed-store rows and
/// the cleaning-only bookkeeping columns are gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub store: i64,
    pub day_of_week: i64,
    pub date: NaiveDate,
    pub promo: i64,
    pub state_holiday: StateHoliday,
    pub school_holiday: i64,
    pub store_type: String,
    pub assortment: Assortment,
    pub competition_distance: f64,
    pub competition_open_since_month: i64,
    pub competition_open_since_year: i64,
    pub promo2: i64,
    pub promo2_since_week: i64,
    pub promo2_since_year: i64,
    pub is_promo: i64,
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub week_of_year: i64,
    pub year_week: String,
    pub competition_since: NaiveDate,
    pub competition_time_month: i64,
    pub promo_since: NaiveDate,
    pub promo_time_week: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedBatch {
    pub records: Vec<FeatureRecord>,
    /// Input indices of the rows that survived the open-store filter, in
    /// order. Lets callers align pre-encoding originals with encoded rows.
    pub kept_rows: Vec<usize>,
    pub closed_rows_dropped: usize,
}

/// Derives features for a cleaned batch. Rows with `open == 0` contribute
/// no output row; everything else maps one-to-one in input order.
pub fn derive_features(records: &[CleanedRecord]) -> Result<DerivedBatch, DataError> {
    let mut out = Vec::with_capacity(records.len());
    let mut kept_rows = Vec::with_capacity(records.len());
    let mut closed_rows_dropped = 0usize;

    for (row, cleaned) in records.iter().enumerate() {
        if cleaned.open == 0 {
            closed_rows_dropped += 1;
            continue;
        }

        let assortment =
            Assortment::from_code(&cleaned.assortment).ok_or_else(|| DataError::UnmappedCode {
                row,
                field: "assortment",
                value: cleaned.assortment.clone(),
            })?;
        let state_holiday = StateHoliday::from_code(&cleaned.state_holiday).ok_or_else(|| {
            DataError::UnmappedCode {
                row,
                field: "state_holiday",
                value: cleaned.state_holiday.clone(),
            }
        })?;

        let competition_since = competition_since(
            row,
            cleaned.competition_open_since_year,
            cleaned.competition_open_since_month,
        )?;
        let competition_time_month = (cleaned.date - competition_since)
            .num_days()
            .div_euclid(DAYS_PER_MONTH);

        let promo_since = promo_since(row, cleaned.promo2_since_year, cleaned.promo2_since_week)?;
        let promo_time_week = (cleaned.date - promo_since)
            .num_days()
            .div_euclid(DAYS_PER_WEEK);

        out.push(FeatureRecord {
            store: cleaned.store,
            day_of_week: cleaned.day_of_week,
            date: cleaned.date,
            promo: cleaned.promo,
            state_holiday,
            school_holiday: cleaned.school_holiday,
            store_type: cleaned.store_type.clone(),
            assortment,
            competition_distance: cleaned.competition_distance,
            competition_open_since_month: cleaned.competition_open_since_month,
            competition_open_since_year: cleaned.competition_open_since_year,
            promo2: cleaned.promo2,
            promo2_since_week: cleaned.promo2_since_week,
            promo2_since_year: cleaned.promo2_since_year,
            is_promo: cleaned.is_promo,
            year: i64::from(cleaned.date.year()),
            month: i64::from(cleaned.date.month()),
            day: i64::from(cleaned.date.day()),
            week_of_year: i64::from(cleaned.date.iso_week().week()),
            year_week: cleaned.date.format("%Y-%W").to_string(),
            competition_since,
            competition_time_month,
            promo_since,
            promo_time_week,
        });
        kept_rows.push(row);
    }

    info!(
        component = "pipeline",
        event = "pipeline.derive.finish",
        rows_in = records.len(),
        rows_out = out.len(),
        closed_rows_dropped
    );

    Ok(DerivedBatch {
        records: out,
        kept_rows,
        closed_rows_dropped,
    })
}

/// First day of the competition-open month.
fn competition_since(row: usize, year: i64, month: i64) -> Result<NaiveDate, DataError> {
    let (y, m) = (i32::try_from(year).ok(), u32::try_from(month).ok());
    y.zip(m)
        .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
        .ok_or(DataError::InvalidCompetitionSince { row, year, month })
}

/// Monday of the promo2-since ISO week, shifted back one week.
fn promo_since(row: usize, year: i64, week: i64) -> Result<NaiveDate, DataError> {
    let (y, w) = (i32::try_from(year).ok(), u32::try_from(week).ok());
    y.zip(w)
        .and_then(|(y, w)| NaiveDate::from_isoywd_opt(y, w, Weekday::Mon))
        .map(|monday| monday - Duration::days(7))
        .ok_or(DataError::InvalidPromoSince { row, year, week })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{clean_records, RawRecord};

    fn cleaned(date: &str, open: i64) -> CleanedRecord {
        let raw = RawRecord {
            store: 1,
            day_of_week: 3,
            date: date.to_string(),
            open,
            promo: 1,
            state_holiday: "0".to_string(),
            school_holiday: 0,
            store_type: "a".to_string(),
            assortment: "a".to_string(),
            competition_distance: Some(1270.0),
            competition_open_since_month: Some(9.0),
            competition_open_since_year: Some(2008.0),
            promo2: 1,
            promo2_since_week: Some(14.0),
            promo2_since_year: Some(2011.0),
            promo_interval: Some("Jan,Apr,Jul,Oct".to_string()),
        };
        clean_records(&[raw]).unwrap().remove(0)
    }

    #[test]
    fn derives_calendar_fields_and_year_week_string() {
        let batch = derive_features(&[cleaned("2015-06-10", 1)]).unwrap();
        let record = &batch.records[0];

        assert_eq!(record.year, 2015);
        assert_eq!(record.month, 6);
        assert_eq!(record.day, 10);
        assert_eq!(record.week_of_year, 24);
        assert_eq!(record.year_week, "2015-23");
    }

    #[test]
    fn competition_age_floor_divides_elapsed_days_by_thirty() {
        let batch = derive_features(&[cleaned("2015-06-10", 1)]).unwrap();
        let record = &batch.records[0];

        assert_eq!(
            record.competition_since,
            NaiveDate::from_ymd_opt(2008, 9, 1).unwrap()
        );
        // 2473 elapsed days / 30.
        assert_eq!(record.competition_time_month, 82);
    }

    #[test]
    fn promo_age_floor_divides_elapsed_days_by_seven() {
        let batch = derive_features(&[cleaned("2015-06-10", 1)]).unwrap();
        let record = &batch.records[0];

        // Monday of ISO week 14/2011 is 2011-04-04; minus 7 days.
        assert_eq!(
            record.promo_since,
            NaiveDate::from_ymd_opt(2011, 3, 28).unwrap()
        );
        // 1535 elapsed days / 7.
        assert_eq!(record.promo_time_week, 219);
    }

    #[test]
    fn remaps_assortment_and_state_holiday_labels() {
        let mut input = cleaned("2015-06-10", 1);
        input.assortment = "c".to_string();
        input.state_holiday = "b".to_string();

        let batch = derive_features(&[input]).unwrap();
        assert_eq!(batch.records[0].assortment, Assortment::Extended);
        assert_eq!(batch.records[0].assortment.label(), "extended");
        assert_eq!(batch.records[0].state_holiday, StateHoliday::EasterHoliday);
        assert_eq!(batch.records[0].state_holiday.label(), "easter_holiday");
    }

    #[test]
    fn regular_day_code_zero_maps_to_regular_day() {
        let batch = derive_features(&[cleaned("2015-06-10", 1)]).unwrap();
        assert_eq!(batch.records[0].state_holiday, StateHoliday::RegularDay);
        assert_eq!(batch.records[0].state_holiday.label(), "regular_day");
    }

    #[test]
    fn unmapped_codes_reject_the_batch() {
        let mut bad_assortment = cleaned("2015-06-10", 1);
        bad_assortment.assortment = "z".to_string();
        let err = derive_features(&[bad_assortment]).unwrap_err();
        assert!(matches!(
            err,
            DataError::UnmappedCode {
                field: "assortment",
                ..
            }
        ));

        let mut bad_holiday = cleaned("2015-06-10", 1);
        bad_holiday.state_holiday = "x".to_string();
        let err = derive_features(&[bad_holiday]).unwrap_err();
        assert!(matches!(
            err,
            DataError::UnmappedCode {
                field: "state_holiday",
                ..
            }
        ));
    }

    #[test]
    fn closed_store_rows_are_dropped_and_counted() {
        let batch = derive_features(&[
            cleaned("2015-06-10", 1),
            cleaned("2015-06-11", 0),
            cleaned("2015-06-12", 1),
        ])
        .unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.closed_rows_dropped, 1);
        assert_eq!(batch.kept_rows, vec![0, 2]);
    }

    #[test]
    fn invalid_competition_month_is_an_error() {
        let mut input = cleaned("2015-06-10", 1);
        input.competition_open_since_month = 13;
        let err = derive_features(&[input]).unwrap_err();
        assert!(matches!(err, DataError::InvalidCompetitionSince { .. }));
    }

    #[test]
    fn nonexistent_iso_week_is_an_error() {
        // 2015 has 53 ISO weeks, 2011 has 52.
        let mut valid = cleaned("2015-06-10", 1);
        valid.promo2_since_year = 2015;
        valid.promo2_since_week = 53;
        assert!(derive_features(&[valid]).is_ok());

        let mut invalid = cleaned("2015-06-10", 1);
        invalid.promo2_since_year = 2011;
        invalid.promo2_since_week = 53;
        let err = derive_features(&[invalid]).unwrap_err();
        assert!(matches!(err, DataError::InvalidPromoSince { .. }));
    }
}
