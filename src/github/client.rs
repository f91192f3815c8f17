use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::types::{
    BranchRef, CommittedFile, ContentEntry, Contents, PullRequestResult, RepositoryRef, User,
};
use super::{encode_content, FileChange, GitHubError, HostingApi, NewPullRequest};
use crate::config::Config;

const USER_AGENT: &str = concat!("test-case-generator/", env!("CARGO_PKG_VERSION"));
const API_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// GitHub REST client backed by reqwest.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct UserResponse {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct RepoResponse {
    id: u64,
    name: String,
    full_name: String,
    description: Option<String>,
    language: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    private: bool,
}

#[derive(Deserialize)]
struct BranchResponse {
    name: String,
    commit: ShaHolder,
}

#[derive(Deserialize)]
struct ShaHolder {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaHolder,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Deserialize)]
struct PutFileResponse {
    content: PutFileContent,
}

#[derive(Deserialize)]
struct PutFileContent {
    path: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    title: String,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: config.github.api_base.clone(),
            oauth_base: config.github.oauth_base.clone(),
            client_id: config.github.client_id.clone(),
            client_secret: config.github.client_secret.clone(),
            redirect_uri: config.github.redirect_uri.clone(),
        })
    }

    fn api_url<I>(&self, segments: I) -> Result<Url, GitHubError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        build_url(&self.api_base, segments)
    }

    fn request(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header(ACCEPT, API_ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

/// Append percent-encoded path segments to a base URL.
fn build_url<I>(base: &str, segments: I) -> Result<Url, GitHubError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = Url::parse(base).map_err(|_| GitHubError::InvalidUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| GitHubError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-success response into [`GitHubError::Status`], keeping GitHub's `message`.
async fn check(response: Response) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GitHubError::Status {
        status: status.as_u16(),
        message: api_message(&body),
    })
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn is_ref_exists(status: u16, message: &str) -> bool {
    status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() && message.contains("already exists")
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[async_trait]
impl HostingApi for GitHubClient {
    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<String, GitHubError> {
        let url = build_url(&self.oauth_base, ["login", "oauth", "access_token"])?;
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "code": code,
            "redirect_uri": self.redirect_uri,
        });

        debug!("exchanging OAuth code");
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let token = check(response).await?.json::<TokenResponse>().await?;

        if let Some(error) = token.error {
            return Err(GitHubError::OAuth {
                error,
                description: token.error_description.unwrap_or_default(),
            });
        }
        token.access_token.ok_or_else(|| GitHubError::OAuth {
            error: "missing_token".to_string(),
            description: "response did not include an access token".to_string(),
        })
    }

    #[instrument(skip_all)]
    async fn authenticated_user(&self, token: &str) -> Result<User, GitHubError> {
        let url = self.api_url(["user"])?;
        let response = self.request(self.http.get(url), token).send().await?;
        let user = check(response).await?.json::<UserResponse>().await?;
        debug!(login = %user.login, "resolved authenticated user");

        Ok(User {
            id: user.id,
            login: user.login,
            name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
        })
    }

    #[instrument(skip_all)]
    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryRef>, GitHubError> {
        let url = self.api_url(["user", "repos"])?;
        let response = self
            .request(self.http.get(url), token)
            .query(&[("sort", "updated"), ("per_page", "100")])
            .send()
            .await?;
        let repos = check(response).await?.json::<Vec<RepoResponse>>().await?;
        debug!(count = repos.len(), "received repositories");

        Ok(repos
            .into_iter()
            .map(|repo| RepositoryRef {
                id: repo.id,
                name: repo.name,
                full_name: repo.full_name,
                description: repo.description,
                language: repo.language,
                updated_at: repo.updated_at,
                private: repo.private,
            })
            .collect())
    }

    #[instrument(skip(self, token))]
    async fn list_branches(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<BranchRef>, GitHubError> {
        let url = self.api_url(["repos", owner, repo, "branches"])?;
        let response = self
            .request(self.http.get(url), token)
            .query(&[("per_page", "50")])
            .send()
            .await?;
        let branches = check(response).await?.json::<Vec<BranchResponse>>().await?;
        debug!(count = branches.len(), "received branches");

        Ok(branches
            .into_iter()
            .map(|branch| BranchRef {
                name: branch.name,
                sha: branch.commit.sha,
            })
            .collect())
    }

    #[instrument(skip(self, token))]
    async fn get_contents(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Contents, GitHubError> {
        let mut url = self.api_url(["repos", owner, repo, "contents"])?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.api_base.clone()))?
            .extend(path_segments(path));

        let response = self
            .request(self.http.get(url), token)
            .query(&[("ref", branch)])
            .send()
            .await?;
        let contents = check(response).await?.json::<ContentsResponse>().await?;

        Ok(match contents {
            ContentsResponse::Directory(entries) => {
                debug!(entries = entries.len(), "received directory listing");
                Contents::Directory(entries)
            }
            ContentsResponse::File(entry) => Contents::File(entry),
        })
    }

    #[instrument(skip(self, token))]
    async fn branch_head(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let mut url = self.api_url(["repos", owner, repo, "git", "ref", "heads"])?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.api_base.clone()))?
            .extend(path_segments(branch));

        let response = self.request(self.http.get(url), token).send().await?;
        let reference = check(response).await?.json::<RefResponse>().await?;
        Ok(reference.object.sha)
    }

    #[instrument(skip(self, token))]
    async fn create_branch(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = self.api_url(["repos", owner, repo, "git", "refs"])?;
        let body = serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": sha,
        });

        let response = self.request(self.http.post(url), token).json(&body).send().await?;
        match check(response).await {
            Ok(_) => Ok(()),
            Err(GitHubError::Status { status, message }) if is_ref_exists(status, &message) => {
                Err(GitHubError::RefExists(branch.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, token, change), fields(path = %change.path, branch = %change.branch))]
    async fn put_file(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        change: &FileChange<'_>,
    ) -> Result<CommittedFile, GitHubError> {
        let mut url = self.api_url(["repos", owner, repo, "contents"])?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.api_base.clone()))?
            .extend(path_segments(change.path));

        let mut body = serde_json::json!({
            "message": change.message,
            "content": encode_content(change.content),
            "branch": change.branch,
        });
        if let Some(sha) = change.sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self.request(self.http.put(url), token).json(&body).send().await?;
        let written = check(response).await?.json::<PutFileResponse>().await?;
        debug!(sha = %written.content.sha, "committed file");

        Ok(CommittedFile {
            path: written.content.path,
            sha: written.content.sha,
        })
    }

    #[instrument(skip(self, token, pull), fields(head = %pull.head, base = %pull.base))]
    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequestResult, GitHubError> {
        let url = self.api_url(["repos", owner, repo, "pulls"])?;
        let body = serde_json::json!({
            "title": pull.title,
            "body": pull.body,
            "head": pull.head,
            "base": pull.base,
        });

        let response = self.request(self.http.post(url), token).json(&body).send().await?;
        let created = check(response).await?.json::<PullResponse>().await?;
        debug!(number = created.number, "opened pull request");

        Ok(PullRequestResult {
            number: created.number,
            url: created.html_url,
            title: created.title,
        })
    }
}
