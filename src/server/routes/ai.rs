use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::ai::{self, TestSummary};
use crate::auth::require_session;
use crate::error::AppError;
use crate::github::FileContent;
use crate::server::error::{error_response, json_body, respond};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct SummariesBody {
    #[serde(default)]
    files: Vec<FileContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestCodeBody {
    file: Option<FileContent>,
    test_summary: Option<TestSummary>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/test-summaries", post(test_summaries))
        .route("/ai/test-code", post(test_code))
}

async fn test_summaries(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SummariesBody>, JsonRejection>,
) -> Response {
    let dev = state.development();
    if let Err(err) = require_session(state.hosting.as_ref(), &headers).await {
        return error_response(&AppError::from(err), dev);
    }
    let body = match json_body(payload) {
        Ok(body) => body,
        Err(err) => return error_response(&err, dev),
    };

    let result = ai::generate_test_summaries(
        state.model.as_ref(),
        &body.files,
        state.config.ai.max_prompt_bytes,
    )
    .await;
    respond(result, dev)
}

async fn test_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TestCodeBody>, JsonRejection>,
) -> Response {
    let dev = state.development();
    if let Err(err) = require_session(state.hosting.as_ref(), &headers).await {
        return error_response(&AppError::from(err), dev);
    }
    let (file, summary) = match json_body(payload) {
        Ok(TestCodeBody {
            file: Some(file),
            test_summary: Some(summary),
        }) => (file, summary),
        Ok(_) => {
            let err = AppError::validation("File and test summary are required");
            return error_response(&err, dev);
        }
        Err(err) => return error_response(&err, dev),
    };

    let result = ai::generate_test_code(
        state.model.as_ref(),
        file,
        summary,
        state.config.ai.max_prompt_bytes,
    )
    .await;
    respond(result, dev)
}
