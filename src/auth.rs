use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use reqwest::Url;
use tracing::{error, info, instrument, warn};

use crate::config::GitHubConfig;
use crate::error::{AppError, AuthError};
use crate::github::{HostingApi, Session};

const OAUTH_SCOPE: &str = "repo,user:email";

/// Trade an OAuth `code` for a token and the user's profile.
///
/// Provider errors are logged and collapsed into [`AuthError::ExchangeFailed`].
#[instrument(skip_all)]
pub async fn exchange(hosting: &dyn HostingApi, code: Option<&str>) -> Result<Session, AppError> {
    let code = code
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::validation("Authorization code is required"))?;

    let access_token = hosting.exchange_code(code).await.map_err(|err| {
        error!(error = %err, "GitHub OAuth exchange failed");
        AuthError::ExchangeFailed
    })?;

    let user = hosting.authenticated_user(&access_token).await.map_err(|err| {
        error!(error = %err, "failed to load user after OAuth exchange");
        AuthError::ExchangeFailed
    })?;

    if user.login.is_empty() {
        error!("GitHub returned a user without a login");
        return Err(AuthError::ExchangeFailed.into());
    }

    info!(login = %user.login, "user authenticated");
    Ok(Session { access_token, user })
}

/// Build the GitHub authorize URL the browser is redirected to.
pub fn authorize_url(github: &GitHubConfig) -> Result<String, AppError> {
    let (client_id, redirect_uri) = match (&github.client_id, &github.redirect_uri) {
        (Some(id), Some(uri)) if !id.is_empty() && !uri.is_empty() => (id, uri),
        _ => {
            error!("GitHub OAuth client id or redirect URI is not configured");
            return Err(AppError::Config("Invalid server configuration".to_string()));
        }
    };

    let base = format!("{}/login/oauth/authorize", github.oauth_base.trim_end_matches('/'));
    let url = Url::parse_with_params(
        &base,
        &[
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", OAUTH_SCOPE),
        ],
    )
    .map_err(|err| {
        error!(error = %err, "failed to build GitHub authorize URL");
        AppError::Config("Failed to generate authorization URL".to_string())
    })?;

    Ok(url.into())
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Capability check run at the top of every protected handler.
pub async fn require_session(
    hosting: &dyn HostingApi,
    headers: &HeaderMap,
) -> Result<Session, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    validate_token(hosting, token).await
}

/// Resolve the user behind `token`, rejecting invalid or expired tokens.
pub async fn validate_token(hosting: &dyn HostingApi, token: &str) -> Result<Session, AuthError> {
    match hosting.authenticated_user(token).await {
        Ok(user) => Ok(Session {
            access_token: token.to_string(),
            user,
        }),
        Err(err) => {
            warn!(error = %err, "token validation failed");
            Err(AuthError::InvalidToken)
        }
    }
}
