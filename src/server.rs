//! HTTP surface: one POST route that runs a batch and reports it.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::error;

use crate::executor::{join_error_message, BatchExecutor};
use crate::types::{AttemptRecord, BatchRequest, BatchResponse, Identity};

/// Path the probe is served on.
pub const QUERY_ROUTE: &str = "/api/ws_query";

pub fn router(executor: Arc<BatchExecutor>) -> Router {
    Router::new()
        .route(QUERY_ROUTE, post(ws_query))
        .with_state(executor)
}

/// Always answers 200 with the batch report, whatever the individual attempts
/// did. Only a failure outside the batch itself produces a 500.
async fn ws_query(
    State(executor): State<Arc<BatchExecutor>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let diagnostic = format!("{rejection}\n{rejection:?}");
            return unhandled_response(executor.identity(), diagnostic).into_response();
        }
    };

    let batch_executor = Arc::clone(&executor);
    match tokio::spawn(async move { batch_executor.run(request).await }).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => unhandled_response(executor.identity(), join_error_message(e)).into_response(),
    }
}

/// The single-record report for a failure nothing else captured.
pub fn unhandled_response(
    identity: &Identity,
    diagnostic: String,
) -> (StatusCode, Json<BatchResponse>) {
    error!(error = %diagnostic, "unhandled failure");
    let record = AttemptRecord::unhandled(identity, diagnostic);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(BatchResponse::new(identity.driver_name.clone(), vec![record])),
    )
}
