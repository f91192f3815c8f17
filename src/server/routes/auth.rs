use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::server::error::{json_body, respond};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct ExchangeBody {
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthorizeUrl {
    url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/github/exchange", post(exchange))
        .route("/auth/github/url", get(authorize_url))
}

async fn exchange(
    State(state): State<AppState>,
    payload: Result<Json<ExchangeBody>, JsonRejection>,
) -> Response {
    let result = match json_body(payload) {
        Ok(body) => auth::exchange(state.hosting.as_ref(), body.code.as_deref()).await,
        Err(err) => Err(err),
    };
    respond(result, state.development())
}

async fn authorize_url(State(state): State<AppState>) -> Response {
    let result = auth::authorize_url(&state.config.github).map(|url| AuthorizeUrl { url });
    respond(result, state.development())
}
