use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::ai::{slugify, test_file_name, TestSummary};
use crate::error::AppError;
use crate::github::{
    Contents, FileChange, FileRef, GitHubError, HostingApi, NewPullRequest, PullRequestResult,
    Session,
};

const FAILURE: &str = "Failed to create pull request";

/// Body of a pull-request request from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub test_code: Option<String>,
    pub test_summary: Option<TestSummary>,
    pub original_file: Option<FileRef>,
    pub branch: Option<String>,
}

/// Name of the branch carrying tests for `summary`. Stable, so retries reuse it.
pub fn feature_branch(summary: &TestSummary) -> String {
    let slug = slugify(&summary.title);
    if slug.is_empty() {
        "add-tests/generated".to_string()
    } else {
        format!("add-tests/{slug}")
    }
}

fn pull_request_body(summary: &TestSummary, source: &str, test_path: &str) -> String {
    format!(
        "## Generated tests\n\n\
         **Scenario:** {title}\n\n\
         {description}\n\n\
         - Source file: `{source}`\n\
         - Test file: `{test_path}`\n",
        title = summary.title,
        description = summary.description,
    )
}

/// Commit the generated test to a feature branch and open a pull request
/// against the branch the user selected.
#[instrument(skip(hosting, session, request), fields(owner = %owner, repo = %repo))]
pub async fn publish(
    hosting: &dyn HostingApi,
    session: &Session,
    owner: &str,
    repo: &str,
    request: PublishRequest,
) -> Result<PullRequestResult, AppError> {
    let (Some(test_code), Some(summary), Some(original_file)) =
        (request.test_code, request.test_summary, request.original_file)
    else {
        return Err(AppError::validation(
            "Test code, test summary and original file are required",
        ));
    };
    let base = request
        .branch
        .filter(|branch| !branch.trim().is_empty())
        .ok_or_else(|| AppError::validation("Base branch is required"))?;

    let head = feature_branch(&summary);
    let test_path = test_file_name(&original_file.path, &summary);
    let token = session.access_token.as_str();

    let base_sha = hosting
        .branch_head(token, owner, repo, &base)
        .await
        .map_err(|err| AppError::pr(FAILURE, err))?;

    match hosting.create_branch(token, owner, repo, &head, &base_sha).await {
        Ok(()) => info!(branch = %head, "created branch"),
        Err(GitHubError::RefExists(_)) => info!(branch = %head, "branch already exists, reusing it"),
        Err(err) => return Err(AppError::pr(FAILURE, err)),
    }

    let existing_sha = existing_file_sha(hosting, token, owner, repo, &test_path, &head)
        .await
        .map_err(|err| AppError::pr(FAILURE, err))?;
    debug!(path = %test_path, update = existing_sha.is_some(), "writing test file");

    let message = format!("Add tests: {}", summary.title);
    let committed = hosting
        .put_file(
            token,
            owner,
            repo,
            &FileChange {
                path: &test_path,
                content: &test_code,
                message: &message,
                branch: &head,
                sha: existing_sha.as_deref(),
            },
        )
        .await
        .map_err(|err| AppError::pr(FAILURE, err))?;
    debug!(path = %committed.path, sha = %committed.sha, "committed test file");

    let body = pull_request_body(&summary, &original_file.path, &test_path);
    let pull = hosting
        .create_pull_request(
            token,
            owner,
            repo,
            &NewPullRequest {
                title: &message,
                body: &body,
                head: &head,
                base: &base,
            },
        )
        .await
        .map_err(|err| AppError::pr(FAILURE, err))?;

    info!(number = pull.number, url = %pull.url, "opened pull request");
    Ok(pull)
}

/// Blob sha of `path` on `branch`, or `None` when it does not exist yet.
async fn existing_file_sha(
    hosting: &dyn HostingApi,
    token: &str,
    owner: &str,
    repo: &str,
    path: &str,
    branch: &str,
) -> Result<Option<String>, GitHubError> {
    match hosting.get_contents(token, owner, repo, path, branch).await {
        Ok(Contents::File(entry)) => Ok(Some(entry.sha)),
        Ok(Contents::Directory(_)) => Ok(None),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::mock::{MockHosting, VALID_TOKEN};

    fn session() -> Session {
        Session {
            access_token: VALID_TOKEN.to_string(),
            user: MockHosting::user(),
        }
    }

    fn request() -> PublishRequest {
        PublishRequest {
            test_code: Some("test('adds', () => expect(sum(1, 2)).toBe(3));".to_string()),
            test_summary: Some(TestSummary {
                title: "Adds two numbers".to_string(),
                description: "sum(1, 2) returns 3".to_string(),
                file: None,
            }),
            original_file: Some(FileRef {
                path: "src/sum.js".to_string(),
                ..Default::default()
            }),
            branch: Some("main".to_string()),
        }
    }

    #[test]
    fn test_feature_branch_name() {
        let summary = TestSummary {
            title: "Adds Two Numbers!".to_string(),
            description: "d".to_string(),
            file: None,
        };
        assert_eq!(feature_branch(&summary), "add-tests/adds-two-numbers");
    }

    #[tokio::test]
    async fn test_publish_creates_branch_file_and_pull() {
        let hosting = MockHosting::new();
        let pull = publish(&hosting, &session(), "acme", "app", request()).await.unwrap();

        assert_eq!(pull.number, 12);
        assert_eq!(pull.title, "Add tests: Adds two numbers");
        assert!(hosting
            .existing_refs
            .lock()
            .unwrap()
            .contains(&"add-tests/adds-two-numbers".to_string()));

        let written = hosting.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "tests/sum-adds-two-numbers.test.js");
        assert!(written[0].1.contains("toBe(3)"));
        assert_eq!(written[0].2, None);

        let pulls = hosting.pulls.lock().unwrap();
        assert_eq!(pulls[0].1, "add-tests/adds-two-numbers");
        assert_eq!(pulls[0].2, "main");
    }

    #[tokio::test]
    async fn test_existing_branch_is_reused() {
        let hosting = MockHosting::new();
        hosting
            .existing_refs
            .lock()
            .unwrap()
            .push("add-tests/adds-two-numbers".to_string());

        let pull = publish(&hosting, &session(), "acme", "app", request()).await;
        assert!(pull.is_ok());
        assert_eq!(hosting.pulls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_test_file_is_updated_in_place() {
        let hosting = MockHosting::new();
        hosting.set_file("tests/sum-adds-two-numbers.test.js", "old");

        publish(&hosting, &session(), "acme", "app", request()).await.unwrap();
        let written = hosting.written.lock().unwrap();
        assert_eq!(
            written[0].2.as_deref(),
            Some("sha-tests/sum-adds-two-numbers.test.js")
        );
    }

    #[tokio::test]
    async fn test_missing_fields_are_validation_errors() {
        let hosting = MockHosting::new();
        let mut no_code = request();
        no_code.test_code = None;
        assert!(matches!(
            publish(&hosting, &session(), "acme", "app", no_code).await,
            Err(AppError::Validation(_))
        ));

        let mut blank_branch = request();
        blank_branch.branch = Some(" ".to_string());
        assert!(matches!(
            publish(&hosting, &session(), "acme", "app", blank_branch).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(hosting.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_base_branch_is_pr_error() {
        let hosting = MockHosting::new();
        let mut req = request();
        req.branch = Some("does-not-exist".to_string());
        let err = publish(&hosting, &session(), "acme", "app", req).await.unwrap_err();
        assert!(matches!(err, AppError::Pr { .. }));
        assert_eq!(err.to_string(), "Failed to create pull request");
    }

    #[tokio::test]
    async fn test_pull_request_failure_is_pr_error() {
        let hosting = MockHosting {
            fail_pull_request: true,
            ..MockHosting::default()
        };
        let err = publish(&hosting, &session(), "acme", "app", request()).await.unwrap_err();
        assert!(matches!(err, AppError::Pr { .. }));
        assert!(err.detail().unwrap().contains("already exists"));
    }
}
