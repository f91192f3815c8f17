pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::GitHubClient;
pub use types::{
    BranchRef, CommittedFile, ContentEntry, Contents, FileContent, FileRef, PullRequestResult,
    RepositoryRef, Session, User,
};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("GitHub OAuth error {error}: {description}")]
    OAuth { error: String, description: String },

    #[error("Reference already exists: {0}")]
    RefExists(String),

    #[error("No inline content returned for {0}")]
    MissingContent(String),

    #[error("Could not decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),
}

impl GitHubError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitHubError::Status { status: 404, .. })
    }
}

/// A file write on a branch. `content` is plain text; the client encodes it.
#[derive(Debug, Clone)]
pub struct FileChange<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    /// Blob sha of the existing file when updating in place
    pub sha: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

/// The subset of the GitHub REST API this service relies on.
/// Implementations must be Send + Sync so they can be shared across requests.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Trade an OAuth authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<String, GitHubError>;

    /// `GET /user`, also used to validate tokens.
    async fn authenticated_user(&self, token: &str) -> Result<User, GitHubError>;

    /// Repositories of the authenticated user, most recently updated first (max 100).
    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryRef>, GitHubError>;

    /// Branches of a repository (max 50).
    async fn list_branches(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchRef>, GitHubError>;

    /// Raw contents of `path` at `branch`: a listing for directories, one entry for files.
    async fn get_contents(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Contents, GitHubError>;

    /// Head commit sha of a branch.
    async fn branch_head(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError>;

    /// Create `refs/heads/{branch}` at `sha`. Fails with [`GitHubError::RefExists`]
    /// when the ref is already present.
    async fn create_branch(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError>;

    /// Create or update a file on a branch.
    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        change: &FileChange<'_>,
    ) -> Result<CommittedFile, GitHubError>;

    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequestResult, GitHubError>;
}

/// Decode the base64 body of a single-file contents response.
/// GitHub wraps the payload at 60 columns, so whitespace is stripped first.
pub fn decode_content(entry: &ContentEntry) -> Result<String, GitHubError> {
    let raw = entry
        .content
        .as_deref()
        .ok_or_else(|| GitHubError::MissingContent(entry.path.clone()))?;

    if let Some(encoding) = entry.encoding.as_deref() {
        if encoding != "base64" {
            return Err(GitHubError::Decode {
                path: entry.path.clone(),
                reason: format!("unsupported encoding {encoding}"),
            });
        }
    }

    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| GitHubError::Decode {
        path: entry.path.clone(),
        reason: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn encode_content(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}
