use thiserror::Error;

/// Why a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Access token required")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Authentication failed")]
    ExchangeFailed,
}

/// Errors surfaced to API clients.
///
/// `Display` is always the client-safe message. Upstream failures carry the
/// original error text in `detail`, which is logged where the error is created
/// and only echoed back in development mode.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Config(String),

    #[error("{message}")]
    Fetch { message: &'static str, detail: String },

    #[error("{message}")]
    Ai { message: &'static str, detail: String },

    #[error("{message}")]
    Pr { message: &'static str, detail: String },

    #[error("Route not found")]
    NotFound,

    #[error("Something went wrong")]
    Internal { detail: String },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn fetch(message: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{message}");
        AppError::Fetch {
            message,
            detail: err.to_string(),
        }
    }

    pub fn ai(message: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{message}");
        AppError::Ai {
            message,
            detail: err.to_string(),
        }
    }

    pub fn pr(message: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{message}");
        AppError::Pr {
            message,
            detail: err.to_string(),
        }
    }

    /// Upstream error text, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::Fetch { detail, .. }
            | AppError::Ai { detail, .. }
            | AppError::Pr { detail, .. }
            | AppError::Internal { detail } => Some(detail),
            _ => None,
        }
    }
}
