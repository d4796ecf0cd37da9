//! Generation backend boundary and the Gemini REST client.
//!
//! The chat session only sees [`GenerationBackend`]: a system instruction,
//! prior turns and the new message go in; answer text and any web grounding
//! references come out. [`GeminiClient`] implements it against the
//! `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use kbchat_shared::{ChatTurn, GenerationConfig, KbChatError, Result, Role};

/// User-Agent sent with every generation request.
const USER_AGENT: &str = concat!("kbchat/", env!("CARGO_PKG_VERSION"));

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: String,
    /// Earlier turns, oldest first.
    pub history: Vec<ChatTurn>,
    pub message: String,
}

/// A web source the backend cited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroundingReference {
    pub title: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    /// Answer text; may be empty.
    pub text: String,
    pub grounding: Vec<GroundingReference>,
}

/// Something that can turn a request into an answer.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<B: GenerationBackend + ?Sized> GenerationBackend for Box<B> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&'static str>, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl GenerateContentResponse {
    fn into_response(self) -> GenerationResponse {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return GenerationResponse::default();
        };

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let grounding = candidate
            .grounding_metadata
            .map(|m| {
                m.grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web)
                    .filter_map(|web| {
                        web.uri.map(|uri| GroundingReference {
                            title: web.title,
                            uri,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        GenerationResponse { text, grounding }
    }
}

// ---------------------------------------------------------------------------
// Gemini client
// ---------------------------------------------------------------------------

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    config: GenerationConfig,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Build a client; the API key is read from `config.api_key_env` per call.
    pub fn new(config: GenerationConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            KbChatError::config(format!("invalid generation.base_url '{}': {e}", config.base_url))
        })?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            api_key: None,
        })
    }

    /// Use an explicit key instead of the environment.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        match std::env::var(&self.config.api_key_env) {
            Ok(val) if !val.trim().is_empty() => Ok(val),
            _ => Err(KbChatError::MissingCredentials {
                env_var: self.config.api_key_env.clone(),
            }),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_body(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content::text(Some(turn.role.as_str()), &turn.text))
            .collect();
        contents.push(Content::text(Some(Role::User.as_str()), &request.message));

        let tools = if self.config.web_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };

        GenerateContentRequest {
            system_instruction: Content::text(None, &request.system_instruction),
            contents,
            generation_config: WireGenerationConfig {
                temperature: self.config.temperature,
            },
            tools,
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    #[instrument(skip_all, fields(model = %self.config.model, history = request.history.len()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let api_key = self.resolve_api_key()?;
        let body = self.build_body(request);
        let url = self.endpoint();

        debug!(%url, "sending generateContent request");
        let started = std::time::Instant::now();

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbChatError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KbChatError::Generation(format!(
                "HTTP {status}: {}",
                detail.trim()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| KbChatError::Generation(format!("invalid response body: {e}")))?;
        let result = parsed.into_response();

        info!(
            chars = result.text.chars().count(),
            grounding = result.grounding.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation complete"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> GenerationConfig {
        GenerationConfig {
            base_url: format!("{}/v1beta", server.uri()),
            api_key_env: "KBCHAT_TEST_NONEXISTENT_GEMINI_KEY".into(),
            ..Default::default()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_instruction: "instruction with context".into(),
            history: vec![ChatTurn::user("안녕"), ChatTurn::model("안녕하세요")],
            message: "호핑 가격 얼마예요?".into(),
        }
    }

    #[tokio::test]
    async fn test_generate_parses_text_and_grounding() {
        let server = MockServer::start().await;

        let reply = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "호핑은 "}, {"text": "2000페소입니다."}]
                },
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://example.com/hopping", "title": "example.com"}},
                        {"retrievedContext": {}}
                    ]
                }
            }]
        });

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "systemInstruction": {"parts": [{"text": "instruction with context"}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "안녕"}]},
                    {"role": "model", "parts": [{"text": "안녕하세요"}]},
                    {"role": "user", "parts": [{"text": "호핑 가격 얼마예요?"}]}
                ],
                "generationConfig": {"temperature": 0.1},
                "tools": [{"googleSearch": {}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(config_for(&server))
            .unwrap()
            .with_api_key("test-key");
        let response = client.generate(&request()).await.unwrap();

        assert_eq!(response.text, "호핑은 2000페소입니다.");
        assert_eq!(
            response.grounding,
            vec![GroundingReference {
                title: Some("example.com".into()),
                uri: "https://example.com/hopping".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = GeminiClient::new(config_for(&server)).unwrap();
        let err = client.generate(&request()).await.unwrap_err();

        assert!(err.is_missing_credentials());
        assert!(err.to_string().contains("KBCHAT_TEST_NONEXISTENT_GEMINI_KEY"));
    }

    #[tokio::test]
    async fn test_http_error_is_generation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config_for(&server))
            .unwrap()
            .with_api_key("test-key");
        let err = client.generate(&request()).await.unwrap_err();

        match err {
            KbChatError::Generation(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_yield_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config_for(&server))
            .unwrap()
            .with_api_key("test-key");
        let response = client.generate(&request()).await.unwrap();

        assert!(response.text.is_empty());
        assert!(response.grounding.is_empty());
    }

    #[test]
    fn test_web_search_can_be_disabled() {
        let config = GenerationConfig {
            web_search: false,
            ..Default::default()
        };
        let client = GeminiClient::new(config).unwrap();
        let body = serde_json::to_value(client.build_body(&request())).unwrap();

        assert!(body.get("tools").is_none());
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = GenerationConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        let err = GeminiClient::new(config).unwrap_err();
        assert!(matches!(err, KbChatError::Config { .. }));
    }
}
