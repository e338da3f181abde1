//! Langflow flow-run endpoint
use crate::backend::ChatBackend;

use chatbubble_core::logging::preview;
use chatbubble_core::{Error, Result};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

/// JSON pointer to the reply text inside a run response
const REPLY_POINTER: &str = "/outputs/0/outputs/0/results/message/text";

/// Request body for `POST /api/v1/run/<flow>`
#[derive(Debug, Clone, Serialize)]
pub struct LangflowRequest<'a> {
    pub input_value: &'a str,
    pub output_type: &'static str,
    pub input_type: &'static str,
    pub tweaks: &'a Map<String, Value>,
}

impl<'a> LangflowRequest<'a> {
    pub fn chat(input_value: &'a str, tweaks: &'a Map<String, Value>) -> Self {
        Self { input_value, output_type: "chat", input_type: "chat", tweaks }
    }
}

/// Pull the reply out of a run response.
///
/// Returns `None` when the path is missing, not a string, or empty.
pub fn extract_reply(response: &Value) -> Option<String> {
    response
        .pointer(REPLY_POINTER)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub struct LangflowBackend {
    client: HttpClient,
    url: String,
    api_key: Option<String>,
    tweaks: Map<String, Value>,
    headers: HashMap<String, String>,
}

impl LangflowBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(),
            url: url.into(),
            api_key: None,
            tweaks: Map::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_tweaks(mut self, tweaks: Map<String, Value>) -> Self {
        self.tweaks = tweaks;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Rebuild the HTTP client with an overall request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl ChatBackend for LangflowBackend {
    #[instrument(skip(self, input), fields(url = %self.url, input_len = input.len()))]
    async fn send(&self, input: &str) -> Result<String> {
        let body = LangflowRequest::chat(input, &self.tweaks);

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        tracing::debug!("Sending chat request");
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Backend returned error: {}", preview(&body, 200));
            return Err(Error::Network(format!("HTTP {}", status)));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Response body is not JSON: {}", e)))?;

        match extract_reply(&data) {
            Some(reply) => {
                tracing::debug!("Received reply: {}", preview(&reply, 80));
                Ok(reply)
            }
            None => {
                tracing::warn!("Unexpected response structure: {}", preview(&data.to_string(), 200));
                Err(Error::MalformedResponse(format!("no reply text at {}", REPLY_POINTER)))
            }
        }
    }

    fn name(&self) -> &str {
        "langflow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run_response(text: &str) -> Value {
        json!({
            "session_id": "abc",
            "outputs": [{
                "inputs": {"input_value": "hello"},
                "outputs": [{
                    "results": {"message": {"text": text, "sender": "Machine"}}
                }]
            }]
        })
    }

    #[test]
    fn test_extract_reply() {
        assert_eq!(extract_reply(&run_response("Hi there!")), Some("Hi there!".to_string()));
    }

    #[test]
    fn test_extract_reply_rejects_other_shapes() {
        assert_eq!(extract_reply(&json!({})), None);
        assert_eq!(extract_reply(&json!({"outputs": []})), None);
        assert_eq!(extract_reply(&json!({"outputs": [{"outputs": [{"results": {}}]}]})), None);
        assert_eq!(extract_reply(&run_response("")), None);

        let numeric = json!({"outputs": [{"outputs": [{"results": {"message": {"text": 42}}}]}]});
        assert_eq!(extract_reply(&numeric), None);
    }

    #[test]
    fn test_request_body_shape() {
        let mut tweaks = Map::new();
        tweaks.insert("ChatInput-PLr2q".to_string(), json!({}));

        let body = serde_json::to_value(LangflowRequest::chat("hello", &tweaks)).unwrap();
        assert_eq!(
            body,
            json!({
                "input_value": "hello",
                "output_type": "chat",
                "input_type": "chat",
                "tweaks": {"ChatInput-PLr2q": {}}
            })
        );
    }

    #[tokio::test]
    async fn test_send_returns_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/run/flow"))
            .and(header("authorization", "Bearer token-123"))
            .and(body_partial_json(json!({"input_value": "hello", "input_type": "chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_response("**Hi** there!")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = LangflowBackend::new(format!("{}/api/v1/run/flow", server.uri())).with_api_key("token-123");
        let reply = backend.send("hello").await.unwrap();
        assert_eq!(reply, "**Hi** there!");
    }

    #[tokio::test]
    async fn test_send_forwards_extra_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_response("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let headers = HashMap::from([("X-Requested-With".to_string(), "XMLHttpRequest".to_string())]);
        let backend = LangflowBackend::new(server.uri()).with_headers(headers);
        assert_eq!(backend.send("hi").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"outputs": []})))
            .mount(&server)
            .await;

        let err = LangflowBackend::new(server.uri()).send("hello").await.unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[tokio::test]
    async fn test_error_status_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(run_response("ignored")))
            .mount(&server)
            .await;

        let err = LangflowBackend::new(server.uri()).send("hello").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let err = LangflowBackend::new(server.uri()).send("hello").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        let server = MockServer::start().await;
        let url = server.uri();
        drop(server);

        let backend = LangflowBackend::new(url).with_timeout(Duration::from_secs(2)).unwrap();
        let err = backend.send("hello").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)).set_body_json(run_response("late")))
            .mount(&server)
            .await;

        let backend = LangflowBackend::new(server.uri()).with_timeout(Duration::from_millis(50)).unwrap();
        let err = backend.send("hello").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
