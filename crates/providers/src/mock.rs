use crate::backend::ChatBackend;

use chatbubble_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted replies for deterministic testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MockResponse {
    /// Successful reply; `delay_ms` simulates backend latency
    Text {
        content: String,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Request fails before a usable response arrives
    Error { message: String },
    /// Response arrives without reply text
    Malformed,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        MockResponse::Text { content: content.into(), delay_ms: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        MockResponse::Error { message: message.into() }
    }
}

/// Mock configuration from TOML file
#[derive(Debug, Deserialize)]
struct MockConfig {
    responses: Vec<MockResponse>,
}

/// Backend that plays back a fixed list of responses, one per request
pub struct MockBackend {
    responses: Vec<MockResponse>,
    current: AtomicUsize,
}

impl MockBackend {
    pub fn new(responses_file: Option<&Path>) -> Self {
        let responses = if let Some(path) = responses_file {
            Self::load_responses(path)
        } else {
            vec![MockResponse::text("Mock response - configure responses_file in config")]
        };

        Self::with_responses(responses)
    }

    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self { responses, current: AtomicUsize::new(0) }
    }

    fn load_responses(path: &Path) -> Vec<MockResponse> {
        if !path.exists() {
            tracing::warn!("Mock responses file not found: {}", path.display());
            return vec![MockResponse::text(format!("Mock responses file not found: {}", path.display()))];
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<MockConfig>(&content) {
                Ok(config) => config.responses,
                Err(e) => {
                    tracing::error!("Failed to parse mock responses: {}", e);
                    vec![MockResponse::error(format!("Failed to parse mock responses: {}", e))]
                }
            },
            Err(e) => {
                tracing::error!("Failed to read mock responses file: {}", e);
                vec![MockResponse::error(format!("Failed to read mock responses file: {}", e))]
            }
        }
    }

    fn next_response(&self) -> MockResponse {
        let index = self.current.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(index) {
            Some(response) => response.clone(),
            None => MockResponse::text(format!(
                "No more mock responses configured (requested: {}, available: {})",
                index + 1,
                self.responses.len()
            )),
        }
    }

    /// Number of requests served so far
    pub fn calls(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatBackend for MockBackend {
    async fn send(&self, input: &str) -> Result<String> {
        tracing::trace!(input_len = input.len(), "Mock backend request");

        match self.next_response() {
            MockResponse::Text { content, delay_ms } => {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Ok(content)
            }
            MockResponse::Error { message } => Err(Error::Network(message)),
            MockResponse::Malformed => Err(Error::MalformedResponse("scripted malformed response".to_string())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
