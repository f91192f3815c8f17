use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::github::{decode_content, Contents, FileContent, FileRef, GitHubError, HostingApi, Session};

pub const MAX_FILES: usize = 10;
pub const MAX_TOTAL_BYTES: u64 = 5 * 1024 * 1024;

/// Reject batches that are empty, too many, or too large. Runs before any network call.
pub fn validate_batch(files: &[FileRef]) -> Result<(), AppError> {
    if files.is_empty() {
        return Err(AppError::validation("At least one file must be selected"));
    }
    if files.len() > MAX_FILES {
        return Err(AppError::validation("Maximum 10 files can be processed at once"));
    }
    // Sizes come from the client, so the sum may not fit in a u64
    let total = files.iter().try_fold(0u64, |acc, f| acc.checked_add(f.size));
    if total.map_or(true, |total| total > MAX_TOTAL_BYTES) {
        return Err(AppError::validation("Total file size exceeds 5MB limit"));
    }
    Ok(())
}

/// Fetch and decode every file in the batch.
///
/// The batch is all-or-nothing: the first failing file aborts the request.
#[instrument(skip(hosting, session, files), fields(files = files.len()))]
pub async fn fetch_contents(
    hosting: &dyn HostingApi,
    session: &Session,
    owner: &str,
    repo: &str,
    branch: &str,
    files: &[FileRef],
) -> Result<Vec<FileContent>, AppError> {
    validate_batch(files)?;

    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        let content = fetch_one(hosting, session, owner, repo, branch, file)
            .await
            .map_err(|err| AppError::fetch("Failed to fetch file content", err))?;
        contents.push(content);
    }

    info!(files = contents.len(), "fetched file contents");
    Ok(contents)
}

async fn fetch_one(
    hosting: &dyn HostingApi,
    session: &Session,
    owner: &str,
    repo: &str,
    branch: &str,
    file: &FileRef,
) -> Result<FileContent, GitHubError> {
    debug!(path = %file.path, "fetching file");
    let entry = match hosting
        .get_contents(&session.access_token, owner, repo, &file.path, branch)
        .await?
    {
        Contents::File(entry) => entry,
        Contents::Directory(_) => return Err(GitHubError::MissingContent(file.path.clone())),
    };

    let content = decode_content(&entry)?;
    Ok(FileContent {
        file: FileRef {
            name: if file.name.is_empty() { entry.name } else { file.name.clone() },
            path: file.path.clone(),
            size: entry.size,
            sha: entry.sha,
            kind: file.kind.clone(),
        },
        content,
    })
}
