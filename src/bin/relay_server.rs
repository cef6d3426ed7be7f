use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use storecast::{
    init_logging, log_app_bind, log_app_start, log_artifacts_loaded, logging_config_from_env,
    relay_config_from_env, relay_router, ArtifactsConfig, DatasetConfig, ForecastPipeline,
    HttpInferenceClient, HttpReplySender, RelayAppState, SalesDataset, ScalerArtifacts,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let addr: SocketAddr = std::env::var("STORECAST_RELAY_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let artifacts_cfg = artifacts_config_from_env();
    let artifacts = ScalerArtifacts::load(&artifacts_cfg)?;
    log_artifacts_loaded(
        &artifacts_cfg.artifact_dir.display().to_string(),
        storecast::ARTIFACT_NAMES.len(),
    );

    let dataset = SalesDataset::load(&dataset_config_from_env())?;
    let relay_cfg = relay_config_from_env();

    let state = RelayAppState {
        dataset: Arc::new(dataset),
        pipeline: Arc::new(ForecastPipeline::new(artifacts)),
        inference: Arc::new(HttpInferenceClient::new(
            &relay_cfg.inference_url,
            relay_cfg.http_timeout_ms,
        )?),
        replies: Arc::new(HttpReplySender::new(
            &relay_cfg.chat_api_base,
            &relay_cfg.chat_token,
            relay_cfg.http_timeout_ms,
        )?),
    };

    let app = relay_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn artifacts_config_from_env() -> ArtifactsConfig {
    let mut cfg = ArtifactsConfig::default();
    if let Ok(dir) = std::env::var("STORECAST_ARTIFACT_DIR") {
        if !dir.trim().is_empty() {
            cfg.artifact_dir = PathBuf::from(dir.trim());
        }
    }
    cfg
}

fn dataset_config_from_env() -> DatasetConfig {
    let mut cfg = DatasetConfig::default();
    if let Ok(path) = std::env::var("STORECAST_SALES_CSV") {
        if !path.trim().is_empty() {
            cfg.sales_csv = PathBuf::from(path.trim());
        }
    }
    if let Ok(path) = std::env::var("STORECAST_STORE_CSV") {
        if !path.trim().is_empty() {
            cfg.store_csv = PathBuf::from(path.trim());
        }
    }
    cfg
}
