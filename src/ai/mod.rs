pub mod gemini;
#[cfg(test)]
pub mod mock;
pub mod parse;
pub mod prompt;

pub use gemini::GeminiModel;
pub use parse::SummaryParse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::github::FileContent;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Model returned no candidates: {0}")]
    Blocked(String),

    #[error("Model is not configured: {0}")]
    Config(String),
}

/// A candidate test case proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub title: String,
    pub description: String,
    /// Source file the summary was generated for, when the model says so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTest {
    pub test_code: String,
    pub test_file_name: String,
    pub original_file: FileContent,
    pub test_summary: TestSummary,
}

/// A text-completion backend. Must be Send + Sync to be shared by request handlers.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Send one prompt and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Ask the model for test summaries covering `files`.
///
/// Malformed replies degrade to a single raw summary; only a failed call is an error.
#[instrument(skip_all, fields(model = model.name(), files = files.len()))]
pub async fn generate_test_summaries(
    model: &dyn CompletionModel,
    files: &[FileContent],
    max_prompt_bytes: usize,
) -> Result<Vec<TestSummary>, AppError> {
    if files.is_empty() {
        return Err(AppError::validation("Files array is required"));
    }

    let prompt = prompt::summaries_prompt(files);
    if prompt.len() > max_prompt_bytes {
        return Err(AppError::validation(format!(
            "Selected files are too large to analyze at once (limit {max_prompt_bytes} bytes)"
        )));
    }

    let raw = model
        .complete(&prompt)
        .await
        .map_err(|err| AppError::ai("Failed to generate test summaries", err))?;
    debug!(raw = %raw, "model output (summaries)");

    let parsed = parse::parse_summaries(&raw);
    if let SummaryParse::RawFallback(_) = parsed {
        info!("model reply was not JSON, returning raw output");
    }
    let summaries = parsed.into_summaries();
    info!(summaries = summaries.len(), "generated test summaries");
    Ok(summaries)
}

/// Ask the model for the test file implementing `summary` against `file`.
#[instrument(skip_all, fields(model = model.name(), path = %file.path(), title = %summary.title))]
pub async fn generate_test_code(
    model: &dyn CompletionModel,
    file: FileContent,
    summary: TestSummary,
    max_prompt_bytes: usize,
) -> Result<GeneratedTest, AppError> {
    let prompt = prompt::test_code_prompt(&file, &summary);
    if prompt.len() > max_prompt_bytes {
        return Err(AppError::validation(format!(
            "Source file is too large to analyze (limit {max_prompt_bytes} bytes)"
        )));
    }

    let raw = model
        .complete(&prompt)
        .await
        .map_err(|err| AppError::ai("Failed to generate test code", err))?;
    debug!(raw = %raw, "model output (test code)");

    let test_code = parse::extract_test_code(&raw);
    let test_file_name = test_file_name(file.path(), &summary);
    info!(test_file = %test_file_name, bytes = test_code.len(), "generated test code");

    Ok(GeneratedTest {
        test_code,
        test_file_name,
        original_file: file,
        test_summary: summary,
    })
}

/// Lowercase, collapse every run of non-alphanumerics into one `-`, trim `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `tests/<stem>-<slug>.test.<ext>` for a source path and summary.
///
/// The stem stops at the first dot of the file name and the extension is the
/// text after the last one, so `api.client.ts` yields `api-….test.ts`.
/// Unlike a plain `<stem>-<slug>.test.<ext>` template, an empty slug drops the
/// `-<slug>` part and a name without a dot drops `.<ext>`, so `main.go` with a
/// title of `!!!` gives `tests/main.test.go` and not `tests/main-.test.go`.
pub fn test_file_name(path: &str, summary: &TestSummary) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.split('.').next().unwrap_or(name);
    let ext = name.rsplit_once('.').map(|(_, ext)| ext);
    let slug = slugify(&summary.title);

    let mut file = format!("tests/{stem}");
    if !slug.is_empty() {
        file.push('-');
        file.push_str(&slug);
    }
    file.push_str(".test");
    if let Some(ext) = ext {
        file.push('.');
        file.push_str(ext);
    }
    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::MockModel;
    use crate::github::FileRef;

    fn summary(title: &str) -> TestSummary {
        TestSummary {
            title: title.to_string(),
            description: "d".to_string(),
            file: None,
        }
    }

    fn source(path: &str) -> FileContent {
        FileContent {
            file: FileRef {
                path: path.to_string(),
                ..Default::default()
            },
            content: "export const id = (x) => x;".to_string(),
        }
    }

    #[test]
    fn test_file_name_examples() {
        assert_eq!(
            test_file_name("src/foo.js", &summary("Handles Null Input!")),
            "tests/foo-handles-null-input.test.js"
        );
        assert_eq!(
            test_file_name("lib/api.client.ts", &summary("  --Retry  on 503--")),
            "tests/api-retry-on-503.test.ts"
        );
        assert_eq!(test_file_name("main.go", &summary("!!!")), "tests/main.test.go");
        assert_eq!(test_file_name("Makefile", &summary("Builds")), "tests/Makefile-builds.test");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Handles Null Input!"), "handles-null-input");
        assert_eq!(slugify("a__b  c"), "a-b-c");
        assert_eq!(slugify("Ünïcode café"), "n-code-caf");
        assert_eq!(slugify(""), "");
    }

    #[tokio::test]
    async fn test_generate_summaries_parses_reply() {
        let model = MockModel::replying(r#"[{"title":"A","description":"B"}]"#);
        let summaries = generate_test_summaries(&model, &[source("src/id.js")], 1_000_000)
            .await
            .unwrap();
        assert_eq!(summaries, vec![TestSummary {
            title: "A".to_string(),
            description: "B".to_string(),
            file: None,
        }]);
        assert!(model.last_prompt().unwrap().contains("File: src/id.js"));
    }

    #[tokio::test]
    async fn test_generate_summaries_never_fails_on_prose() {
        let model = MockModel::replying("Sorry, I can't help with that.");
        let summaries = generate_test_summaries(&model, &[source("src/id.js")], 1_000_000)
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, parse::RAW_FALLBACK_TITLE);
    }

    #[tokio::test]
    async fn test_generate_summaries_requires_files() {
        let model = MockModel::replying("[]");
        let err = generate_test_summaries(&model, &[], 1_000_000).await.unwrap_err();
        assert_eq!(err.to_string(), "Files array is required");
        assert!(model.last_prompt().is_none());
    }

    #[tokio::test]
    async fn test_generate_summaries_prompt_cap() {
        let model = MockModel::replying("[]");
        let err = generate_test_summaries(&model, &[source("src/id.js")], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(model.last_prompt().is_none());
    }

    #[tokio::test]
    async fn test_model_failure_is_ai_error() {
        let model = MockModel::failing();
        let err = generate_test_summaries(&model, &[source("src/id.js")], 1_000_000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate test summaries");
        assert!(err.detail().unwrap().contains("quota"));

        let err = generate_test_code(&model, source("src/id.js"), summary("x"), 1_000_000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate test code");
    }

    #[tokio::test]
    async fn test_generate_test_code() {
        let model = MockModel::replying(r#"```json
{"code": "import { id } from '../src/id';\ntest('id', () => expect(id(1)).toBe(1));"}
```"#);
        let generated = generate_test_code(&model, source("src/id.js"), summary("Returns input"), 1_000_000)
            .await
            .unwrap();
        assert_eq!(generated.test_file_name, "tests/id-returns-input.test.js");
        assert!(generated.test_code.starts_with("import { id }"));
        assert_eq!(generated.original_file.path(), "src/id.js");
        assert_eq!(generated.test_summary.title, "Returns input");

        let json = serde_json::to_value(&generated).unwrap();
        assert!(json.get("testCode").is_some());
        assert!(json.get("testFileName").is_some());
        assert!(json.get("originalFile").is_some());
    }
}
