//! Chat relay: one inbound store-forecast request in, one reply out.
//!
//! The decision table is explicit: an unparseable store id, a store with no
//! open rows, and a healthy forecast each map to exactly one reply. Upstream
//! failures are logged and mapped to a sentinel reply, never propagated.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::SalesDataset;
use crate::encode::EncodedFeatureVector;
use crate::pipeline::ForecastPipeline;

pub const REPLY_WRONG_STORE_ID: &str = "Store ID is Wrong";
pub const REPLY_STORE_NOT_AVAILABLE: &str = "Store Not Available";
pub const REPLY_UPSTREAM_UNAVAILABLE: &str =
    "Prediction service unavailable, try again later";

/// Typed inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("inference transport error: {0}")]
    Transport(String),
    #[error("inference service returned status {0}")]
    Status(u16),
    #[error("invalid inference payload: {0}")]
    InvalidPayload(String),
    #[error("inference returned {got} predictions for {expected} rows")]
    CountMismatch { expected: usize, got: usize },
    #[error("reply send failed: {0}")]
    ReplySend(String),
}

/// External model inference: one prediction per encoded row, same order.
pub trait InferenceClient: Send + Sync + 'static {
    fn predict(&self, vectors: &[EncodedFeatureVector]) -> Result<Vec<f64>, UpstreamError>;
}

/// Outbound chat reply delivery.
pub trait ReplySender: Send + Sync + 'static {
    fn send(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub inference_url: String,
    pub chat_api_base: String,
    pub chat_token: String,
    pub http_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://127.0.0.1:9000/predict".to_string(),
            chat_api_base: "https://api.telegram.org".to_string(),
            chat_token: String::new(),
            http_timeout_ms: 15_000,
        }
    }
}

pub fn relay_config_from_env() -> RelayConfig {
    let mut config = RelayConfig::default();

    if let Ok(url) = std::env::var("STORECAST_INFERENCE_URL") {
        if !url.trim().is_empty() {
            config.inference_url = url.trim().to_string();
        }
    }
    if let Ok(base) = std::env::var("STORECAST_CHAT_API_BASE") {
        if !base.trim().is_empty() {
            config.chat_api_base = base.trim().to_string();
        }
    }
    if let Ok(token) = std::env::var("STORECAST_CHAT_TOKEN") {
        config.chat_token = token.trim().to_string();
    }
    if let Ok(timeout) = std::env::var("STORECAST_HTTP_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.trim().parse() {
            config.http_timeout_ms = parsed;
        }
    }

    config
}

/// Store id as typed in chat: digits with an optional leading command slash.
pub fn parse_store_id(text: &str) -> Option<i64> {
    text.replace('/', "").trim().parse().ok()
}

/// Runs the relay decision table for one message and returns the reply text.
pub fn handle_chat_message(
    dataset: &SalesDataset,
    pipeline: &ForecastPipeline,
    inference: &dyn InferenceClient,
    message: &ChatMessage,
) -> String {
    info!(
        component = "relay",
        event = "relay.message.received",
        chat_id = message.chat_id
    );

    let Some(store_id) = parse_store_id(&message.text) else {
        info!(
            component = "relay",
            event = "relay.store_id.invalid",
            chat_id = message.chat_id,
            text = %message.text
        );
        return REPLY_WRONG_STORE_ID.to_string();
    };

    let rows = dataset.rows_for_store(store_id);
    if rows.is_empty() {
        info!(
            component = "relay",
            event = "relay.store.unavailable",
            chat_id = message.chat_id,
            store_id
        );
        return REPLY_STORE_NOT_AVAILABLE.to_string();
    }

    let prepared = match pipeline.prepare(&rows) {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!(
                component = "relay",
                event = "relay.pipeline.error",
                store_id,
                error = %err
            );
            return REPLY_UPSTREAM_UNAVAILABLE.to_string();
        }
    };

    let predictions = match inference.predict(&prepared.vectors) {
        Ok(predictions) if predictions.len() == prepared.vectors.len() => predictions,
        Ok(predictions) => {
            let err = UpstreamError::CountMismatch {
                expected: prepared.vectors.len(),
                got: predictions.len(),
            };
            warn!(
                component = "relay",
                event = "relay.upstream.error",
                store_id,
                error = %err
            );
            return REPLY_UPSTREAM_UNAVAILABLE.to_string();
        }
        Err(err) => {
            warn!(
                component = "relay",
                event = "relay.upstream.error",
                store_id,
                error = %err
            );
            return REPLY_UPSTREAM_UNAVAILABLE.to_string();
        }
    };

    let formatted = match pipeline.format_predictions(&prepared, &predictions) {
        Ok(rows) => rows,
        Err(err) => {
            warn!(
                component = "relay",
                event = "relay.pipeline.error",
                store_id,
                error = %err
            );
            return REPLY_UPSTREAM_UNAVAILABLE.to_string();
        }
    };

    let total: f64 = formatted.iter().map(|row| row.prediction).sum();
    format!(
        "Store Number {store_id} will sell R${} in the next 6 weeks",
        format_currency(total)
    )
}

/// Two decimals with thousands separators.
fn format_currency(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}

pub struct HttpInferenceClient {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpInferenceClient {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

impl InferenceClient for HttpInferenceClient {
    fn predict(&self, vectors: &[EncodedFeatureVector]) -> Result<Vec<f64>, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(vectors)
            .send()
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response
            .json::<Vec<f64>>()
            .map_err(|err| UpstreamError::InvalidPayload(err.to_string()))
    }
}

pub struct HttpReplySender {
    send_url: String,
    client: reqwest::blocking::Client,
}

impl HttpReplySender {
    pub fn new(api_base: &str, token: &str, timeout_ms: u64) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| UpstreamError::ReplySend(err.to_string()))?;
        Ok(Self {
            send_url: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
            client,
        })
    }
}

impl ReplySender for HttpReplySender {
    fn send(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .map_err(|err| UpstreamError::ReplySend(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::ReplySend(format!("status {status}")));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RelayAppState {
    pub dataset: Arc<SalesDataset>,
    pub pipeline: Arc<ForecastPipeline>,
    pub inference: Arc<dyn InferenceClient>,
    pub replies: Arc<dyn ReplySender>,
}

pub fn relay_router(state: RelayAppState) -> Router {
    Router::new()
        .route("/", get(get_banner).post(post_webhook))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct WebhookUpdate {
    message: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    chat: WebhookChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookChat {
    id: i64,
}

async fn get_banner() -> Html<&'static str> {
    Html("<h1>Storecast Forecast Relay</h1>")
}

async fn post_webhook(
    State(state): State<RelayAppState>,
    Json(update): Json<WebhookUpdate>,
) -> impl IntoResponse {
    let Some(message) = update.message else {
        return StatusCode::OK;
    };
    let Some(text) = message.text else {
        return StatusCode::OK;
    };

    let chat = ChatMessage {
        chat_id: message.chat.id,
        text,
    };

    let joined = tokio::task::spawn_blocking(move || {
        let reply =
            handle_chat_message(&state.dataset, &state.pipeline, state.inference.as_ref(), &chat);

        match state.replies.send(chat.chat_id, &reply) {
            Ok(()) => info!(
                component = "relay",
                event = "relay.reply.sent",
                chat_id = chat.chat_id,
                reply = %reply
            ),
            Err(err) => warn!(
                component = "relay",
                event = "relay.reply.error",
                chat_id = chat.chat_id,
                error = %err
            ),
        }
    })
    .await;

    if joined.is_err() {
        warn!(component = "relay", event = "relay.task.panicked");
    }

    StatusCode::OK
}
