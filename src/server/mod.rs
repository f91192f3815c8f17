pub mod error;
pub mod rate_limit;
pub mod routes;

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::ai::CompletionModel;
use crate::config::{Config, ConfigError};
use crate::error::AppError;
use crate::github::HostingApi;
use rate_limit::RateLimiter;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hosting: Arc<dyn HostingApi>,
    pub model: Arc<dyn CompletionModel>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: Config,
        hosting: Arc<dyn HostingApi>,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        Self {
            config: Arc::new(config),
            hosting,
            model,
            limiter,
        }
    }

    pub fn development(&self) -> bool {
        self.config.server.development
    }
}

fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidValue {
        key: "server.allowed_origin",
        value: origin.to_string(),
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(panic = %detail, "request handler panicked");
    error::error_response(&AppError::Internal { detail }, false)
}

pub fn router(state: AppState) -> Result<Router, ConfigError> {
    let cors = cors_layer(&state.config.server.allowed_origin)?;
    let body_limit = state.config.server.body_limit_bytes;

    let api = Router::new()
        .merge(routes::auth::router())
        .merge(routes::github::router())
        .merge(routes::ai::router());

    Ok(Router::new()
        .nest("/api", api)
        .route("/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state))
}

pub async fn serve(state: AppState) -> Result<(), ServeError> {
    let addr = state.config.server.bind;
    let app = router(state)?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
