use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use finex_core::config::{ProviderConfig, ProviderKind};
use finex_core::error::{FinexError, ProviderError, ProviderErrorKind, Result};

use crate::provider::{ChatProvider, ExtractionRequest};

/// Chat-completions client for Azure OpenAI deployments and the OpenAI API.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    kind: ProviderKind,
    url: Url,
    api_key: String,
}

// ── Chat completions request/response types ────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

// ── Implementation ─────────────────────────────────────────────────────────

impl OpenAiChatProvider {
    /// Build the HTTP client once; the configured timeout applies to every call.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Self::with_client(config, Self::client_builder(config))
    }

    fn client_builder(config: &ProviderConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder().timeout(config.timeout())
    }

    fn with_client(config: &ProviderConfig, builder: reqwest::ClientBuilder) -> Result<Self> {
        let client = builder
            .build()
            .map_err(|e| FinexError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            kind: config.kind,
            url: Self::completions_url(config)?,
            api_key: config.api_key.clone(),
        })
    }

    fn completions_url(config: &ProviderConfig) -> Result<Url> {
        let base = config.endpoint.trim_end_matches('/');
        let raw = match config.kind {
            ProviderKind::Azure => {
                format!("{base}/openai/deployments/{}/chat/completions", config.model)
            }
            ProviderKind::OpenAi => format!("{base}/chat/completions"),
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| FinexError::Config(format!("invalid endpoint `{}`: {e}", config.endpoint)))?;
        if config.kind == ProviderKind::Azure {
            url.query_pairs_mut()
                .append_pair("api-version", &config.api_version);
        }
        Ok(url)
    }

    fn request_body(request: &ExtractionRequest) -> ChatRequest<'_> {
        ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: &request.json_schema,
                },
            },
        }
    }

    fn classify_status(status: StatusCode, body: &str) -> ProviderError {
        let kind = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Authentication,
            StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderErrorKind::Timeout,
            _ => ProviderErrorKind::Status,
        };
        ProviderError::new(kind, format!("provider returned {status}: {body}"))
            .with_status(status.as_u16())
    }

    fn parse_completion(body: &str) -> std::result::Result<String, ProviderError> {
        let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::MalformedPayload,
                format!("failed to parse completion response: {e}"),
            )
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::MalformedPayload, "completion has no choices")
        })?;

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Err(ProviderError::new(ProviderErrorKind::Refused, refusal));
        }

        match choice.message.content.filter(|c| !c.trim().is_empty()) {
            Some(content) => Ok(content),
            None => Err(ProviderError::new(
                ProviderErrorKind::MalformedPayload,
                format!(
                    "completion has no message content (finish_reason: {})",
                    choice.finish_reason.as_deref().unwrap_or("none")
                ),
            )),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Azure => "azure_openai",
            ProviderKind::OpenAi => "openai",
        }
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<String> {
        tracing::debug!(
            provider = self.name(),
            model = %request.model,
            source = %request.source,
            prompt_len = request.user.len(),
            "Sending extraction request"
        );

        let builder = self.client.post(self.url.clone());
        let builder = match self.kind {
            ProviderKind::Azure => builder.header("api-key", &self.api_key),
            ProviderKind::OpenAi => builder.bearer_auth(&self.api_key),
        };

        let response = builder
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ProviderErrorKind::Timeout
                } else {
                    ProviderErrorKind::Transport
                };
                ProviderError::new(kind, format!("HTTP request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let kind = if e.is_timeout() {
                ProviderErrorKind::Timeout
            } else {
                ProviderErrorKind::MalformedPayload
            };
            ProviderError::new(kind, format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &body).into());
        }

        let content = Self::parse_completion(&body)?;
        tracing::debug!(
            provider = self.name(),
            response_len = content.len(),
            "Received extraction response"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    fn config(kind: ProviderKind, endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            kind,
            api_key: "key".into(),
            api_version: "2024-08-01-preview".into(),
            endpoint: endpoint.into(),
            model: "gpt-4o".into(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout_secs: 30,
            max_retries: 0,
        }
    }

    #[test]
    fn azure_url_targets_deployment_with_api_version() {
        let url = OpenAiChatProvider::completions_url(&config(
            ProviderKind::Azure,
            "https://finex.openai.azure.com/",
        ))
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://finex.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn openai_url_appends_chat_completions() {
        let url = OpenAiChatProvider::completions_url(&config(
            ProviderKind::OpenAi,
            "https://api.openai.com/v1",
        ))
        .unwrap();
        assert_eq!(url.as_str(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn invalid_endpoint_is_config_error() {
        let err = OpenAiChatProvider::new(&config(ProviderKind::Azure, "not a url")).err().unwrap();
        assert!(matches!(err, FinexError::Config(_)));
    }

    fn sample_request() -> ExtractionRequest {
        ExtractionRequest {
            source: "doc.pdf".into(),
            model: "gpt-4o".into(),
            system: "sys".into(),
            user: "usr".into(),
            schema_name: "financial_statement".into(),
            json_schema: serde_json::json!({"type": "object"}),
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    #[test]
    fn request_body_uses_strict_json_schema() {
        let request = sample_request();
        let body = serde_json::to_value(OpenAiChatProvider::request_body(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["response_format"]["json_schema"]["name"], "financial_statement");
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ProviderErrorKind::Authentication),
            (StatusCode::FORBIDDEN, ProviderErrorKind::Authentication),
            (StatusCode::TOO_MANY_REQUESTS, ProviderErrorKind::RateLimited),
            (StatusCode::GATEWAY_TIMEOUT, ProviderErrorKind::Timeout),
            (StatusCode::INTERNAL_SERVER_ERROR, ProviderErrorKind::Status),
        ];
        for (status, kind) in cases {
            let err = OpenAiChatProvider::classify_status(status, "{}");
            assert_eq!(err.kind, kind, "status {status}");
            assert_eq!(err.status, Some(status.as_u16()));
        }
    }

    #[test]
    fn parse_completion_returns_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"empresa\":\"X\"}"},"finish_reason":"stop"}]}"#;
        assert_eq!(
            OpenAiChatProvider::parse_completion(body).unwrap(),
            r#"{"empresa":"X"}"#
        );
    }

    #[test]
    fn parse_completion_rejects_bad_envelopes() {
        let err = OpenAiChatProvider::parse_completion("<html>").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedPayload);

        let err = OpenAiChatProvider::parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedPayload);

        let err = OpenAiChatProvider::parse_completion(
            r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedPayload);
        assert!(err.message.contains("length"));

        let err = OpenAiChatProvider::parse_completion(
            r#"{"choices":[{"message":{"content":null,"refusal":"I can't help with that."}}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Refused);
    }

    // ── Live requests against a local listener ──

    /// Read one HTTP request, headers and body.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer a single request with `status` and `body`; the task yields the request.
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            request
        });
        (base, server)
    }

    fn local_provider(config: &ProviderConfig) -> OpenAiChatProvider {
        let builder = OpenAiChatProvider::client_builder(config).no_proxy();
        OpenAiChatProvider::with_client(config, builder).unwrap()
    }

    fn provider_error(err: FinexError) -> ProviderError {
        match err {
            FinexError::Provider(e) => e,
            other => panic!("expected a provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completion_content_is_returned() {
        let envelope = r#"{"choices":[{"message":{"role":"assistant","content":"{\"empresa\":\"Monark\"}"},"finish_reason":"stop"}]}"#;
        let (base, server) = serve_once("200 OK", envelope.to_string()).await;
        let provider = local_provider(&config(ProviderKind::OpenAi, &format!("{base}/v1")));

        let content = provider.complete(&sample_request()).await.unwrap();

        assert_eq!(content, r#"{"empresa":"Monark"}"#);
        let request = server.await.unwrap();
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.starts_with("post /v1/chat/completions http/1.1"));
        assert!(lowered.contains("authorization: bearer key"));
        assert!(request.contains(r#""strict":true"#));
    }

    #[tokio::test]
    async fn rate_limit_status_is_classified() {
        let (base, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"slow down"}}"#.to_string(),
        )
        .await;
        let provider = local_provider(&config(ProviderKind::OpenAi, &base));

        let err = provider_error(provider.complete(&sample_request()).await.unwrap_err());

        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("slow down"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn azure_rejected_key_is_an_authentication_error() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"error":"bad key"}"#.to_string()).await;
        let provider = local_provider(&config(ProviderKind::Azure, &base));

        let err = provider_error(provider.complete(&sample_request()).await.unwrap_err());

        assert_eq!(err.kind, ProviderErrorKind::Authentication);
        assert_eq!(err.status, Some(401));
        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with(
            "post /openai/deployments/gpt-4o/chat/completions?api-version=2024-08-01-preview http/1.1"
        ));
        assert!(request.contains("api-key: key"));
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let _silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });
        let mut cfg = config(ProviderKind::OpenAi, &base);
        cfg.timeout_secs = 1;
        let provider = local_provider(&cfg);

        let err = provider_error(provider.complete(&sample_request()).await.unwrap_err());

        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }
}
