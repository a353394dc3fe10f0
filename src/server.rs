//! HTTP surface. Built with `--features server`.
//!
//! Every concept route is `POST /api/{concept}/{op}` with a JSON object
//! body. Routes on the configured inclusion list go straight to the
//! concept; everything else becomes a `Requesting.request` cascade and
//! the response is whatever rule answered it. A request no rule answers
//! is a wiring gap and is reported as 504.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::concept::{Reply, Rows};
use crate::config::WeftConfig;
use crate::engine::Engine;
use crate::record::FieldMap;

pub struct AppState {
    pub engine: Engine,
    pub config: WeftConfig,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    concepts: usize,
    rules: usize,
    cascades_run: u64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/{concept}/{op}", post(concept_route))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        concepts: state.engine.concepts().len(),
        rules: state.engine.rule_names().len(),
        cascades_run: state.engine.cascades_run(),
    })
}

async fn concept_route(
    State(state): State<Arc<AppState>>,
    Path((concept, op)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let fields = match body {
        Value::Object(map) => map,
        Value::Null => FieldMap::new(),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Expected a JSON object body, got {other}.") })),
            );
        }
    };

    let route = format!("/{concept}/{op}");
    if state.config.is_passthrough(&route) {
        passthrough(&state, &concept, &op, &fields).await
    } else {
        cascade(&state, &route, fields).await
    }
}

/// Invoke the concept directly, bypassing the rule engine.
async fn passthrough(
    state: &AppState,
    concept: &str,
    op: &str,
    fields: &FieldMap,
) -> (StatusCode, Json<Value>) {
    let target = match state.engine.concepts().get(concept) {
        Ok(target) => target,
        Err(e) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() })));
        }
    };
    if op.starts_with('_') {
        match target.query(op, fields).await {
            Rows::Rows(rows) => (StatusCode::OK, Json(Value::Array(rows.into_iter().map(Value::Object).collect()))),
            Rows::Error(message) => (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))),
        }
    } else {
        match target.action(op, fields).await {
            Reply::Success(output) => (StatusCode::OK, Json(Value::Object(output))),
            Reply::Error(message) => (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))),
        }
    }
}

/// Run the route through the rule engine and relay whatever answered it.
async fn cascade(state: &AppState, route: &str, fields: FieldMap) -> (StatusCode, Json<Value>) {
    let cascade = match state.engine.handle_request(route, fields).await {
        Ok(cascade) => cascade,
        Err(e) => {
            tracing::error!(route, error = %e, "cascade failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let audit = cascade.audit();
    if !audit.is_clean() {
        tracing::warn!(route, ?audit, "request/respond contract violated");
    }

    match cascade.response() {
        Some(body) if body.contains_key("error") => {
            (StatusCode::BAD_REQUEST, Json(Value::Object(body)))
        }
        Some(body) => (StatusCode::OK, Json(Value::Object(body))),
        None => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": format!("No rule answered the request for '{route}'.") })),
        ),
    }
}
