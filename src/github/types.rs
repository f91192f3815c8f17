use serde::{Deserialize, Serialize};

/// Authenticated GitHub user as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// A validated bearer token together with the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub updated_at: Option<String>,
    pub private: bool,
}

impl RepositoryRef {
    /// Split `owner/name` into its parts.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        self.full_name.split_once('/')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

impl BranchRef {
    /// Abbreviated commit sha for display.
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }
}

/// A file entry from a repository listing. Fields the client omits default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default)]
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha: String,
    #[serde(rename = "type", default = "file_kind")]
    pub kind: String,
}

fn file_kind() -> String {
    "file".to_string()
}

impl FileRef {
    pub fn file_name(&self) -> &str {
        if self.name.is_empty() {
            self.path.rsplit('/').next().unwrap_or(&self.path)
        } else {
            &self.name
        }
    }
}

/// A [`FileRef`] with its decoded text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(flatten)]
    pub file: FileRef,
    pub content: String,
}

impl FileContent {
    pub fn path(&self) -> &str {
        &self.file.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestResult {
    pub number: u64,
    pub url: String,
    pub title: String,
}

/// Result of a create-or-update file call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    pub path: String,
    pub sha: String,
}

/// Body of a contents request: either a directory listing or a single entry.
#[derive(Debug, Clone)]
pub enum Contents {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

/// One entry of the contents endpoint. `content` is only present for single files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl From<ContentEntry> for FileRef {
    fn from(entry: ContentEntry) -> Self {
        FileRef {
            name: entry.name,
            path: entry.path,
            size: entry.size,
            sha: entry.sha,
            kind: entry.kind,
        }
    }
}
