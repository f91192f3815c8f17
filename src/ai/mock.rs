use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompletionModel, ModelError};

/// Canned completion backend for tests.
pub struct MockModel {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails like an exhausted quota.
    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| ModelError::Status {
            status: 429,
            message: "Resource has been exhausted (e.g. check quota).".to_string(),
        })
    }
}
