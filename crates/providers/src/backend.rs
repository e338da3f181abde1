use crate::langflow::LangflowBackend;
use crate::mock::MockBackend;

use chatbubble_core::{ProviderConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// A remote (or scripted) conversational service
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one user turn and wait for the reply text.
    ///
    /// Implementations never retry.
    async fn send(&self, input: &str) -> Result<String>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_from_config(config: &ProviderConfig) -> Result<Arc<dyn ChatBackend>> {
        match config {
            ProviderConfig::Langflow { url, tweaks, headers, timeout_secs, .. } => {
                let mut backend = LangflowBackend::new(url.clone())
                    .with_tweaks(tweaks.clone())
                    .with_headers(headers.clone())
                    .with_timeout(Duration::from_secs(*timeout_secs))?;

                if let Some(key) = config.api_key() {
                    backend = backend.with_api_key(key);
                }

                Ok(Arc::new(backend))
            }
            ProviderConfig::Mock { responses_file } => Ok(Arc::new(MockBackend::new(responses_file.as_deref()))),
        }
    }
}
