//! End-to-end transformation pipeline.

use tracing::info;

use crate::artifacts::ScalerArtifacts;
use crate::clean::{clean_records, CleanedRecord, DataError, RawRecord};
use crate::encode::{encode_features, EncodedFeatureVector};
use crate::features::derive_features;
use crate::predict::{format_predictions, PredictionRow};

/// A raw batch after cleaning, derivation, and encoding.
///
/// `originals` holds the pre-encoding records of exactly the rows that
/// survived the open-store filter, in batch order, so index `i` of
/// `vectors` always corresponds to index `i` of `originals`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub originals: Vec<CleanedRecord>,
    pub vectors: Vec<EncodedFeatureVector>,
    pub closed_rows_dropped: usize,
}

/// The deterministic raw-records-to-model-input pipeline.
///
/// Constructed once with the pre-fitted artifacts; holds no other state and
/// never mutates the artifacts, so it is safe to share across requests.
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    artifacts: ScalerArtifacts,
}

impl ForecastPipeline {
    pub fn new(artifacts: ScalerArtifacts) -> Self {
        Self { artifacts }
    }

    /// Runs clean → derive → encode on a raw batch.
    pub fn prepare(&self, raw: &[RawRecord]) -> Result<PreparedBatch, DataError> {
        info!(
            component = "pipeline",
            event = "pipeline.prepare.start",
            rows = raw.len()
        );

        let cleaned = clean_records(raw)?;
        let derived = derive_features(&cleaned)?;
        let vectors = encode_features(&derived.records, &self.artifacts)?;
        let originals: Vec<CleanedRecord> = derived
            .kept_rows
            .iter()
            .map(|&idx| cleaned[idx].clone())
            .collect();

        info!(
            component = "pipeline",
            event = "pipeline.prepare.finish",
            rows_in = raw.len(),
            rows_out = vectors.len(),
            closed_rows_dropped = derived.closed_rows_dropped
        );

        Ok(PreparedBatch {
            originals,
            vectors,
            closed_rows_dropped: derived.closed_rows_dropped,
        })
    }

    /// Maps raw model output back onto the prepared batch's originals.
    pub fn format_predictions(
        &self,
        prepared: &PreparedBatch,
        model_output: &[f64],
    ) -> Result<Vec<PredictionRow>, DataError> {
        format_predictions(&prepared.originals, model_output)
    }
}
