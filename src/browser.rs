use tracing::{debug, instrument};

use crate::error::AppError;
use crate::github::{BranchRef, Contents, FileRef, HostingApi, RepositoryRef, Session};

/// Extensions of files offered for test generation.
pub const CODE_EXTENSIONS: &[&str] = &[
    ".js", ".ts", ".jsx", ".tsx", ".py", ".java", ".go", ".cpp", ".c", ".cs", ".rb", ".php",
];

pub const DEFAULT_BRANCH: &str = "main";

pub fn is_code_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CODE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[instrument(skip_all, fields(user = %session.user.login))]
pub async fn list_repositories(
    hosting: &dyn HostingApi,
    session: &Session,
) -> Result<Vec<RepositoryRef>, AppError> {
    hosting
        .list_repositories(&session.access_token)
        .await
        .map_err(|err| AppError::fetch("Failed to fetch repositories", err))
}

#[instrument(skip(hosting, session))]
pub async fn list_branches(
    hosting: &dyn HostingApi,
    session: &Session,
    owner: &str,
    repo: &str,
) -> Result<Vec<BranchRef>, AppError> {
    hosting
        .list_branches(&session.access_token, owner, repo)
        .await
        .map_err(|err| AppError::fetch("Failed to fetch branches", err))
}

/// Flat listing of source files directly under `path`.
///
/// Directories are not descended into, and a path naming a single file yields
/// an empty list.
#[instrument(skip(hosting, session))]
pub async fn list_code_files(
    hosting: &dyn HostingApi,
    session: &Session,
    owner: &str,
    repo: &str,
    path: &str,
    branch: &str,
) -> Result<Vec<FileRef>, AppError> {
    let contents = hosting
        .get_contents(&session.access_token, owner, repo, path, branch)
        .await
        .map_err(|err| AppError::fetch("Failed to fetch repository contents", err))?;

    let files = match contents {
        Contents::Directory(entries) => entries
            .into_iter()
            .filter(|entry| entry.kind == "file" && is_code_file(&entry.name))
            .map(FileRef::from)
            .collect(),
        Contents::File(_) => Vec::new(),
    };
    debug!(files = files.len(), "filtered code files");
    Ok(files)
}
