//! Local trigger entry points.
//!
//! Both accept the same payload the real notification carries and answer
//! with a bare acknowledgment. An unparsable body is treated as an empty
//! payload, which the dispatcher acknowledges as having nothing to do.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ApiState;
use crate::pipeline::{Ack, StorageEvent, SummarizeEvent, Trigger};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/summarize", post(summarize))
        .with_state(state)
}

fn payload<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        debug!("Ignoring unparsable trigger body: {}", e);
        T::default()
    })
}

fn acknowledge(ack: Ack) -> impl IntoResponse {
    let (status, text) = match ack {
        Ack::Handled => (StatusCode::OK, "ok"),
        Ack::Redeliver => (StatusCode::SERVICE_UNAVAILABLE, "retry"),
    };
    (status, [(header::CONTENT_TYPE, "text/plain")], text)
}

/// POST /transcribe - `{ "bucket", "name", "contentType" }`
async fn transcribe(State(state): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let event: StorageEvent = payload(&body);
    acknowledge(state.dispatcher.dispatch(Trigger::Transcribe(event)).await)
}

/// POST /summarize - `{ "job_id" }`
async fn summarize(State(state): State<ApiState>, body: Bytes) -> impl IntoResponse {
    let event: SummarizeEvent = payload(&body);
    acknowledge(state.dispatcher.dispatch(Trigger::Summarize(event)).await)
}
