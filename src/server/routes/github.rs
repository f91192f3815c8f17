use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::require_session;
use crate::browser::{self, DEFAULT_BRANCH};
use crate::error::AppError;
use crate::files;
use crate::github::FileRef;
use crate::publisher::{self, PublishRequest};
use crate::server::error::{error_response, json_body, respond};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct ContentsQuery {
    branch: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilesBody {
    #[serde(default)]
    files: Vec<FileRef>,
    branch: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github/repositories", get(repositories))
        .route("/github/repositories/{owner}/{repo}/branches", get(branches))
        .route("/github/repositories/{owner}/{repo}/contents", get(contents))
        .route(
            "/github/repositories/{owner}/{repo}/files/content",
            post(file_contents),
        )
        .route(
            "/github/repositories/{owner}/{repo}/pull-request",
            post(pull_request),
        )
}

/// Blank or missing branch parameters fall back to the default branch.
fn branch_or_default(branch: Option<String>) -> String {
    branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

async fn repositories(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let dev = state.development();
    let session = match require_session(state.hosting.as_ref(), &headers).await {
        Ok(session) => session,
        Err(err) => return error_response(&AppError::from(err), dev),
    };

    let result = browser::list_repositories(state.hosting.as_ref(), &session).await;
    respond(result, dev)
}

async fn branches(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let dev = state.development();
    let session = match require_session(state.hosting.as_ref(), &headers).await {
        Ok(session) => session,
        Err(err) => return error_response(&AppError::from(err), dev),
    };

    let result = browser::list_branches(state.hosting.as_ref(), &session, &owner, &repo).await;
    respond(result, dev)
}

async fn contents(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<ContentsQuery>,
    headers: HeaderMap,
) -> Response {
    let dev = state.development();
    let session = match require_session(state.hosting.as_ref(), &headers).await {
        Ok(session) => session,
        Err(err) => return error_response(&AppError::from(err), dev),
    };

    let branch = branch_or_default(query.branch);
    let path = query.path.unwrap_or_default();
    let result = browser::list_code_files(
        state.hosting.as_ref(),
        &session,
        &owner,
        &repo,
        &path,
        &branch,
    )
    .await;
    respond(result, dev)
}

async fn file_contents(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<FilesBody>, JsonRejection>,
) -> Response {
    let dev = state.development();
    let session = match require_session(state.hosting.as_ref(), &headers).await {
        Ok(session) => session,
        Err(err) => return error_response(&AppError::from(err), dev),
    };
    let body = match json_body(payload) {
        Ok(body) => body,
        Err(err) => return error_response(&err, dev),
    };

    let branch = branch_or_default(body.branch);
    let result = files::fetch_contents(
        state.hosting.as_ref(),
        &session,
        &owner,
        &repo,
        &branch,
        &body.files,
    )
    .await;
    respond(result, dev)
}

async fn pull_request(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Response {
    let dev = state.development();
    let session = match require_session(state.hosting.as_ref(), &headers).await {
        Ok(session) => session,
        Err(err) => return error_response(&AppError::from(err), dev),
    };
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(err) => return error_response(&err, dev),
    };

    let result = publisher::publish(state.hosting.as_ref(), &session, &owner, &repo, request).await;
    respond(result, dev)
}
