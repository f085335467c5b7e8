/**
 * API HTTP COLLECTEUR - Exposition des résultats du daemon
 *
 * RÔLE : front-end minimal devant le daemon, pour le scraper Prometheus et
 * pour l'inspection humaine.
 *
 * ROUTES :
 * - GET /health          -> "ok" (liveness, toujours 200)
 * - GET /system/health   -> DaemonHealth en JSON
 * - GET /metrics         -> texte agrégé + lignes host_* (format exposition)
 * - GET /metrics/samples -> lots de samples bruts en JSON
 *
 * Un daemon arrêté répond 503 sur les routes /metrics*.
 */

use crate::codec;
use crate::daemon::{Daemon, DaemonError};
use crate::health::DaemonHealth;
use crate::models::SampleBatch;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use tracing::warn;

pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct AppState {
    pub daemon: Daemon,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/metrics", get(get_metrics))
        .route("/metrics/samples", get(get_samples))
        .with_state(app_state)
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let code = match self {
            DaemonError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
            DaemonError::AlreadyRunning => StatusCode::CONFLICT,
        };
        (code, self.to_string()).into_response()
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<DaemonHealth> {
    Json(app.daemon.health())
}

// GET /metrics
async fn get_metrics(State(app): State<AppState>) -> Result<Response, DaemonError> {
    let (composed, hosts) = tokio::try_join!(app.daemon.composed_result(), app.daemon.host_result())
        .inspect_err(|e| warn!(error = %e, "metrics requested while daemon is stopped"))?;

    let body = render_exposition(&composed, &hosts);
    Ok(([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response())
}

// GET /metrics/samples
async fn get_samples(State(app): State<AppState>) -> Result<Json<Vec<SampleBatch>>, DaemonError> {
    let batches = app.daemon.sample_result().await?;
    Ok(Json(batches.as_ref().clone()))
}

/// Aggregated text followed by one line per host usage sample.
pub fn render_exposition(composed: &str, host_batches: &[SampleBatch]) -> String {
    let mut body = composed.to_string();
    for sample in host_batches.iter().flat_map(|b| b.samples.iter()) {
        body.push_str(&codec::compose(sample));
    }
    body
}
