//! Pre-fitted scaler and encoder artifacts.
//!
//! Fitting happens in an offline preparation step that writes the blobs to
//! disk; the request path only ever calls `transform` on loaded parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub const COMPETITION_DISTANCE_SCALER: &str = "competition_distance_scaler";
pub const COMPETITION_TIME_MONTH_SCALER: &str = "competition_time_month_scaler";
pub const PROMO_TIME_WEEK_SCALER: &str = "promo_time_week_scaler";
pub const YEAR_SCALER: &str = "year_scaler";
pub const STORE_TYPE_ENCODER: &str = "store_type_encoder";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact {path} has format version {actual}, expected {expected}")]
    FormatVersionMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
    #[error("artifact {path} is named '{actual}', expected '{expected}'")]
    NameMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("artifact {path} holds a {actual} transformer, expected {expected}")]
    KindMismatch {
        path: PathBuf,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("cannot fit '{name}' on an empty batch")]
    EmptyFit { name: String },
}

/// Median/IQR scaler: `(x - center) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    pub center: f64,
    pub scale: f64,
}

impl RobustScaler {
    pub fn fit(name: &str, values: &[f64]) -> Result<Self, ArtifactError> {
        if values.is_empty() {
            return Err(ArtifactError::EmptyFit {
                name: name.to_string(),
            });
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let center = quantile(&sorted, 0.5);
        let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);
        Ok(Self {
            center,
            scale: if iqr == 0.0 { 1.0 } else { iqr },
        })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }
}

/// Range scaler: `(x - data_min) / (data_max - data_min)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: f64,
    pub data_max: f64,
}

impl MinMaxScaler {
    pub fn fit(name: &str, values: &[f64]) -> Result<Self, ArtifactError> {
        if values.is_empty() {
            return Err(ArtifactError::EmptyFit {
                name: name.to_string(),
            });
        }

        let data_min = values.iter().copied().fold(f64::MAX, f64::min);
        let data_max = values.iter().copied().fold(f64::MIN, f64::max);
        Ok(Self { data_min, data_max })
    }

    pub fn transform(&self, value: f64) -> f64 {
        let range = self.data_max - self.data_min;
        let scale = if range == 0.0 { 1.0 } else { range };
        (value - self.data_min) / scale
    }
}

/// Category-to-integer encoder over a fixed, sorted class list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(name: &str, values: &[S]) -> Result<Self, ArtifactError> {
        if values.is_empty() {
            return Err(ArtifactError::EmptyFit {
                name: name.to_string(),
            });
        }

        let mut classes: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Ok(Self { classes })
    }

    /// Returns the class index, or `None` for a category absent from the
    /// fitted class list.
    pub fn transform(&self, value: &str) -> Option<f64> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .ok()
            .map(|idx| idx as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactParams {
    Robust(RobustScaler),
    MinMax(MinMaxScaler),
    Label(LabelEncoder),
}

impl ArtifactParams {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Robust(_) => "robust",
            Self::MinMax(_) => "min_max",
            Self::Label(_) => "label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBlob {
    pub format_version: u32,
    pub name: String,
    #[serde(flatten)]
    pub params: ArtifactParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactsConfig {
    pub artifact_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("parameter"),
        }
    }
}

/// The five pre-fitted transformers the encoder applies at request time.
///
/// Loaded once at process start; immutable for the life of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerArtifacts {
    pub competition_distance_scaler: RobustScaler,
    pub competition_time_month_scaler: RobustScaler,
    pub promo_time_week_scaler: MinMaxScaler,
    pub year_scaler: MinMaxScaler,
    pub store_type_encoder: LabelEncoder,
}

pub const ARTIFACT_NAMES: [&str; 5] = [
    COMPETITION_DISTANCE_SCALER,
    COMPETITION_TIME_MONTH_SCALER,
    PROMO_TIME_WEEK_SCALER,
    YEAR_SCALER,
    STORE_TYPE_ENCODER,
];

impl ScalerArtifacts {
    pub fn load(cfg: &ArtifactsConfig) -> Result<Self, ArtifactError> {
        let dir = &cfg.artifact_dir;
        let artifacts = Self {
            competition_distance_scaler: expect_robust(dir, COMPETITION_DISTANCE_SCALER)?,
            competition_time_month_scaler: expect_robust(dir, COMPETITION_TIME_MONTH_SCALER)?,
            promo_time_week_scaler: expect_min_max(dir, PROMO_TIME_WEEK_SCALER)?,
            year_scaler: expect_min_max(dir, YEAR_SCALER)?,
            store_type_encoder: expect_label(dir, STORE_TYPE_ENCODER)?,
        };

        info!(
            component = "artifacts",
            event = "artifacts.load.finish",
            artifact_dir = %dir.display(),
            artifact_count = ARTIFACT_NAMES.len()
        );

        Ok(artifacts)
    }

    /// Offline counterpart of `load`: write all five fitted transformers as
    /// versioned blobs into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        save_blob(dir, COMPETITION_DISTANCE_SCALER, ArtifactParams::Robust(self.competition_distance_scaler.clone()))?;
        save_blob(dir, COMPETITION_TIME_MONTH_SCALER, ArtifactParams::Robust(self.competition_time_month_scaler.clone()))?;
        save_blob(dir, PROMO_TIME_WEEK_SCALER, ArtifactParams::MinMax(self.promo_time_week_scaler.clone()))?;
        save_blob(dir, YEAR_SCALER, ArtifactParams::MinMax(self.year_scaler.clone()))?;
        save_blob(dir, STORE_TYPE_ENCODER, ArtifactParams::Label(self.store_type_encoder.clone()))?;
        Ok(())
    }
}

fn artifact_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

fn load_blob(dir: &Path, name: &str) -> Result<ArtifactBlob, ArtifactError> {
    let path = artifact_path(dir, name);
    let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
        path: path.clone(),
        source,
    })?;
    let blob: ArtifactBlob = serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.clone(),
        source,
    })?;

    if blob.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::FormatVersionMismatch {
            path,
            expected: ARTIFACT_FORMAT_VERSION,
            actual: blob.format_version,
        });
    }
    if blob.name != name {
        return Err(ArtifactError::NameMismatch {
            path,
            expected: name.to_string(),
            actual: blob.name,
        });
    }

    Ok(blob)
}

fn save_blob(dir: &Path, name: &str, params: ArtifactParams) -> Result<(), ArtifactError> {
    let blob = ArtifactBlob {
        format_version: ARTIFACT_FORMAT_VERSION,
        name: name.to_string(),
        params,
    };
    let path = artifact_path(dir, name);
    let raw = serde_json::to_string_pretty(&blob).map_err(|source| ArtifactError::Parse {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, raw).map_err(|source| ArtifactError::Io { path, source })
}

fn expect_robust(dir: &Path, name: &str) -> Result<RobustScaler, ArtifactError> {
    let blob = load_blob(dir, name)?;
    match blob.params {
        ArtifactParams::Robust(scaler) => Ok(scaler),
        other => Err(ArtifactError::KindMismatch {
            path: artifact_path(dir, name),
            expected: "robust",
            actual: other.kind_name(),
        }),
    }
}

fn expect_min_max(dir: &Path, name: &str) -> Result<MinMaxScaler, ArtifactError> {
    let blob = load_blob(dir, name)?;
    match blob.params {
        ArtifactParams::MinMax(scaler) => Ok(scaler),
        other => Err(ArtifactError::KindMismatch {
            path: artifact_path(dir, name),
            expected: "min_max",
            actual: other.kind_name(),
        }),
    }
}

fn expect_label(dir: &Path, name: &str) -> Result<LabelEncoder, ArtifactError> {
    let blob = load_blob(dir, name)?;
    match blob.params {
        ArtifactParams::Label(encoder) => Ok(encoder),
        other => Err(ArtifactError::KindMismatch {
            path: artifact_path(dir, name),
            expected: "label",
            actual: other.kind_name(),
        }),
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
