//! Storecast core crate.
//!
//! Implemented scope:
//! - pre-fitted scaler/encoder artifacts with an offline fit step
//! - the deterministic sales-to-features pipeline (clean, derive, encode)
//! - prediction formatting back onto pre-encoding records
//! - the CSV sales dataset and the chat-webhook relay around the pipeline

mod artifacts;
mod clean;
mod dataset;
mod encode;
mod features;
mod observability;
mod pipeline;
mod predict;
mod relay;

pub use artifacts::{
    ArtifactBlob, ArtifactError, ArtifactParams, ArtifactsConfig, LabelEncoder, MinMaxScaler,
    RobustScaler, ScalerArtifacts, ARTIFACT_FORMAT_VERSION, ARTIFACT_NAMES,
    COMPETITION_DISTANCE_SCALER, COMPETITION_TIME_MONTH_SCALER, PROMO_TIME_WEEK_SCALER,
    STORE_TYPE_ENCODER, YEAR_SCALER,
};
pub use clean::{
    clean_records, month_abbreviation, parse_raw_batch, CleanedRecord, DataError, RawRecord,
    MONTH_ABBREVIATIONS, NO_COMPETITOR_DISTANCE, NO_PROMO_INTERVAL,
};
pub use dataset::{DatasetConfig, DatasetError, SalesDataset};
pub use encode::{
    encode_features, encode_row, model_schema_fingerprint, project, EncodedFeatureVector,
    EncodedRow, StateHolidayOneHot, MODEL_FEATURE_COLUMNS, MODEL_SCHEMA_VERSION,
};
pub use features::{derive_features, Assortment, DerivedBatch, FeatureRecord, StateHoliday};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_artifacts_loaded, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError,
};
pub use pipeline::{ForecastPipeline, PreparedBatch};
pub use predict::{format_predictions, predictions_to_json, PredictionRow};
pub use relay::{
    handle_chat_message, parse_store_id, relay_config_from_env, relay_router, ChatMessage,
    HttpInferenceClient, HttpReplySender, InferenceClient, RelayAppState, RelayConfig,
    ReplySender, UpstreamError, REPLY_STORE_NOT_AVAILABLE, REPLY_UPSTREAM_UNAVAILABLE,
    REPLY_WRONG_STORE_ID,
};
