use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{
    BranchRef, CommittedFile, ContentEntry, Contents, PullRequestResult, RepositoryRef, User,
};
use super::{encode_content, FileChange, GitHubError, HostingApi, NewPullRequest};

pub const VALID_TOKEN: &str = "gho_valid";

/// In-memory hosting API for tests. Unknown tokens are rejected like an expired token.
pub struct MockHosting {
    pub calls: AtomicUsize,
    pub oauth_code: Option<String>,
    pub repositories: Vec<RepositoryRef>,
    pub branches: Vec<BranchRef>,
    /// key: path → listing or single entry
    pub contents: Mutex<HashMap<String, Vec<ContentEntry>>>,
    pub files: Mutex<HashMap<String, String>>,
    pub existing_refs: Mutex<Vec<String>>,
    pub fail_listing: bool,
    pub fail_pull_request: bool,
    pub written: Mutex<Vec<(String, String, Option<String>)>>,
    pub pulls: Mutex<Vec<(String, String, String)>>,
}

impl Default for MockHosting {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            oauth_code: Some("good-code".to_string()),
            repositories: vec![RepositoryRef {
                id: 7,
                name: "app".to_string(),
                full_name: "acme/app".to_string(),
                description: Some("demo".to_string()),
                language: Some("JavaScript".to_string()),
                updated_at: Some("2024-05-01T10:00:00Z".to_string()),
                private: false,
            }],
            branches: vec![BranchRef {
                name: "main".to_string(),
                sha: "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00".to_string(),
            }],
            contents: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            existing_refs: Mutex::new(vec!["main".to_string()]),
            fail_listing: false,
            fail_pull_request: false,
            written: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }
}

impl MockHosting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user() -> User {
        User {
            id: 1,
            login: "octocat".to_string(),
            name: Some("The Octocat".to_string()),
            email: None,
            avatar_url: Some("https://avatars.example/1".to_string()),
        }
    }

    /// Register a directory listing under `path`.
    pub fn set_listing(&self, path: &str, entries: Vec<ContentEntry>) {
        self.contents.lock().unwrap().insert(path.to_string(), entries);
    }

    /// Register a file body served from the contents endpoint.
    pub fn set_file(&self, path: &str, text: &str) {
        self.files.lock().unwrap().insert(path.to_string(), text.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_token(&self, token: &str) -> Result<(), GitHubError> {
        if token == VALID_TOKEN {
            Ok(())
        } else {
            Err(GitHubError::Status {
                status: 401,
                message: "Bad credentials".to_string(),
            })
        }
    }

    fn listing_failure() -> GitHubError {
        GitHubError::Status {
            status: 502,
            message: "upstream unavailable".to_string(),
        }
    }
}

pub fn entry(path: &str, kind: &str, size: u64) -> ContentEntry {
    ContentEntry {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        size,
        sha: format!("sha-{path}"),
        kind: kind.to_string(),
        content: None,
        encoding: None,
    }
}

#[async_trait]
impl HostingApi for MockHosting {
    async fn exchange_code(&self, code: &str) -> Result<String, GitHubError> {
        self.record();
        if self.oauth_code.as_deref() == Some(code) {
            Ok(VALID_TOKEN.to_string())
        } else {
            Err(GitHubError::OAuth {
                error: "bad_verification_code".to_string(),
                description: "The code passed is incorrect or expired.".to_string(),
            })
        }
    }

    async fn authenticated_user(&self, token: &str) -> Result<User, GitHubError> {
        self.record();
        self.check_token(token)?;
        Ok(Self::user())
    }

    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryRef>, GitHubError> {
        self.record();
        self.check_token(token)?;
        if self.fail_listing {
            return Err(Self::listing_failure());
        }
        Ok(self.repositories.clone())
    }

    async fn list_branches(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
    ) -> Result<Vec<BranchRef>, GitHubError> {
        self.record();
        self.check_token(token)?;
        if self.fail_listing {
            return Err(Self::listing_failure());
        }
        Ok(self.branches.clone())
    }

    async fn get_contents(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
        path: &str,
        _branch: &str,
    ) -> Result<Contents, GitHubError> {
        self.record();
        self.check_token(token)?;
        if self.fail_listing {
            return Err(Self::listing_failure());
        }
        if let Some(entries) = self.contents.lock().unwrap().get(path) {
            return Ok(Contents::Directory(entries.clone()));
        }
        let files = self.files.lock().unwrap();
        let text = files.get(path).ok_or_else(|| GitHubError::Status {
            status: 404,
            message: "Not Found".to_string(),
        })?;
        let mut single = entry(path, "file", text.len() as u64);
        single.content = Some(encode_content(text));
        single.encoding = Some("base64".to_string());
        Ok(Contents::File(single))
    }

    async fn branch_head(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        self.record();
        self.check_token(token)?;
        self.branches
            .iter()
            .find(|b| b.name == branch)
            .map(|b| b.sha.clone())
            .ok_or_else(|| GitHubError::Status {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    async fn create_branch(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
        branch: &str,
        _sha: &str,
    ) -> Result<(), GitHubError> {
        self.record();
        self.check_token(token)?;
        let mut refs = self.existing_refs.lock().unwrap();
        if refs.iter().any(|r| r == branch) {
            return Err(GitHubError::RefExists(branch.to_string()));
        }
        refs.push(branch.to_string());
        Ok(())
    }

    async fn put_file(
        &self,
        token: &str,
        _owner: &str,
        _repo: &str,
        change: &FileChange<'_>,
    ) -> Result<CommittedFile, GitHubError> {
        self.record();
        self.check_token(token)?;
        self.written.lock().unwrap().push((
            change.path.to_string(),
            change.content.to_string(),
            change.sha.map(str::to_string),
        ));
        Ok(CommittedFile {
            path: change.path.to_string(),
            sha: "blob-new".to_string(),
        })
    }

    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequestResult, GitHubError> {
        self.record();
        self.check_token(token)?;
        if self.fail_pull_request {
            return Err(GitHubError::Status {
                status: 422,
                message: "A pull request already exists".to_string(),
            });
        }
        self.pulls.lock().unwrap().push((
            pull.title.to_string(),
            pull.head.to_string(),
            pull.base.to_string(),
        ));
        Ok(PullRequestResult {
            number: 12,
            url: format!("https://github.com/{owner}/{repo}/pull/12"),
            title: pull.title.to_string(),
        })
    }
}
