pub mod ai;
pub mod auth;
pub mod github;

use axum::response::Response;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::error::error_response;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub async fn not_found() -> Response {
    error_response(&AppError::NotFound, false)
}
