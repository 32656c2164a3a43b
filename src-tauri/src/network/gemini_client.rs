use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{DetectionPayload, DetectionService, RewriteService, ServiceError};
use crate::rewrite::RewriteRequest;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REWRITE_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_DETECTION_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_ERROR_BODY_CHARS: usize = 300;

const REWRITE_TEMPERATURE: f32 = 1.0;
const REWRITE_TOP_P: f32 = 0.95;
const REWRITE_TOP_K: u32 = 64;

const EDITOR_SYSTEM_INSTRUCTION: &str = "You are an elite ghostwriter and editor. Rewrite text so it reads as if a thoughtful person wrote it.

CORE RULES:
1. Natural voice: eliminate robotic patterns. Use colloquialisms where appropriate for the requested style.
2. Burstiness: vary sentence structure and length significantly.
3. Perspective: strictly retain the original point of view (first person stays first person, etc.).
4. No stock phrasing: never use 'In conclusion', 'Moreover', 'Delve', 'Underscore', 'Crucial', 'Navigate', 'Landscape'.
5. Accuracy: keep the original meaning intact.";

const DETECTION_PROMPT_HEADER: &str = "Act as a highly accurate AI content detector. Analyze the text below.

CRITERIA:
- Does it feel robotic or formulaic?
- Are sentences too uniform in length?
- Does it use excessive transition words (Furthermore, Thus)?

Note: High-quality, coherent writing is NOT necessarily AI. If the text has variance and natural flow, score it as Human (0-20%).
Only score high if you are certain it is machine-generated.";

const DETECTION_PROMPT_FOOTER: &str = "Return JSON:
- score: 0-100 (Probability of AI)
- label: \"Human\", \"AI\", or \"Mixed\"";

const SAFETY_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub rewrite_model: String,
    pub detection_model: String,
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            rewrite_model: DEFAULT_REWRITE_MODEL.to_string(),
            detection_model: DEFAULT_DETECTION_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    rewrite_model: String,
    detection_model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, ServiceError> {
        if let Some(reason) = self
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(ServiceError::Blocked(reason));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(String::new());
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            if let Some(reason) = candidate.finish_reason {
                if SAFETY_FINISH_REASONS.contains(&reason.as_str()) {
                    return Err(ServiceError::Blocked(reason));
                }
            }
        }

        Ok(text)
    }
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ServiceError::ClientBuild(err.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rewrite_model: config.rewrite_model,
            detection_model: config.detection_model,
        })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<String, ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(
            model,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generateContent responded"
        );

        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.to_string(),
                message: extract_api_error_message(&body),
            });
        }

        let parsed = serde_json::from_str::<GenerateContentResponse>(&body).map_err(|err| {
            warn!("failed to decode generateContent response: {err}");
            ServiceError::Decode(err)
        })?;
        parsed.into_text()
    }
}

#[async_trait]
impl RewriteService for GeminiClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, ServiceError> {
        let prompt = request.prompt();
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: EDITOR_SYSTEM_INSTRUCTION,
                }],
            }),
            generation_config: GenerationConfig {
                temperature: Some(REWRITE_TEMPERATURE),
                top_p: Some(REWRITE_TOP_P),
                top_k: Some(REWRITE_TOP_K),
                ..GenerationConfig::default()
            },
        };

        self.generate(&self.rewrite_model, &body).await
    }
}

#[async_trait]
impl DetectionService for GeminiClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn detect(&self, text: &str) -> Result<DetectionPayload, ServiceError> {
        let prompt = detection_prompt(text);
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &prompt }],
            }],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json"),
                response_schema: Some(json!({
                    "type": "OBJECT",
                    "properties": {
                        "score": { "type": "INTEGER" },
                        "label": { "type": "STRING" }
                    }
                })),
                ..GenerationConfig::default()
            },
        };

        let raw = self.generate(&self.detection_model, &body).await?;
        if raw.trim().is_empty() {
            return Ok(DetectionPayload::default());
        }
        serde_json::from_str::<DetectionPayload>(raw.trim()).map_err(ServiceError::Decode)
    }
}

fn detection_prompt(text: &str) -> String {
    format!("{DETECTION_PROMPT_HEADER}\n\nText: \"{text}\"\n\n{DETECTION_PROMPT_FOOTER}")
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    // The request URL can carry digits (ports, model versions) that would
    // otherwise be read as status codes downstream.
    ServiceError::Transport(err.without_url().to_string())
}

fn extract_api_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        let message = envelope.error.message.trim();
        let status = envelope.error.status.trim();
        return match (message.is_empty(), status.is_empty()) {
            (false, false) => format!("{message} ({status})"),
            (false, true) => message.to_string(),
            (true, false) => status.to_string(),
            (true, true) => "unknown service error".to_string(),
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error body".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::modes::{RewriteMode, Tone};
    use crate::rewrite::Submission;

    fn client_for(server: &MockServer, api_key: &str) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: api_key.to_string(),
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            ..GeminiConfig::default()
        })
        .expect("client should build")
    }

    fn academic_request(text: &str) -> RewriteRequest {
        let submission =
            Submission::new(text, RewriteMode::Academic, Tone::NEUTRAL).expect("non-empty text");
        RewriteRequest::from_submission(&submission)
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
    }

    #[tokio::test]
    async fn rewrite_posts_prompt_with_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-3-pro-preview:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "topK": 64 }
            })))
            .respond_with(text_response("  A feline rested upon the rug.  "))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "test-key");
        let text = client
            .rewrite(&academic_request("The cat sat on the mat."))
            .await
            .expect("rewrite should succeed");

        assert_eq!(text, "  A feline rested upon the rug.  ");
    }

    #[tokio::test]
    async fn rate_limited_response_keeps_status_and_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, "test-key");
        let err = client
            .rewrite(&academic_request("hello"))
            .await
            .expect_err("429 should fail");

        let message = err.to_string();
        assert!(message.starts_with("429"), "unexpected message: {message}");
        assert!(message.contains("RESOURCE_EXHAUSTED"));
    }

    #[tokio::test]
    async fn blocked_prompt_is_reported_as_safety_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, "test-key");
        let err = client
            .rewrite(&academic_request("hello"))
            .await
            .expect_err("blocked prompt should fail");

        assert!(matches!(err, ServiceError::Blocked(reason) if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, "   ");
        assert!(!RewriteService::is_configured(&client));
        let err = client
            .rewrite(&academic_request("hello"))
            .await
            .expect_err("missing key should fail");
        assert!(matches!(err, ServiceError::MissingApiKey));
    }

    #[tokio::test]
    async fn detect_parses_json_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-3-flash-preview:generateContent"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(text_response(r#"{"score": 12, "label": "Human"}"#))
            .mount(&server)
            .await;

        let client = client_for(&server, "test-key");
        let payload = client
            .detect("Some rewritten text.")
            .await
            .expect("detection should succeed");

        assert_eq!(payload.score, Some(12.0));
        assert_eq!(payload.label.as_deref(), Some("Human"));
    }

    #[test]
    fn api_error_message_falls_back_to_raw_body() {
        assert_eq!(
            extract_api_error_message("upstream overloaded"),
            "upstream overloaded"
        );
        assert_eq!(extract_api_error_message("  "), "empty error body");
        assert_eq!(
            extract_api_error_message(r#"{"error":{"message":"API key not valid."}}"#),
            "API key not valid."
        );
    }

    #[test]
    fn empty_candidate_with_safety_finish_reason_is_blocked() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "PROHIBITED_CONTENT" }]
        }))
        .expect("response should parse");

        assert!(matches!(
            response.into_text(),
            Err(ServiceError::Blocked(reason)) if reason == "PROHIBITED_CONTENT"
        ));
    }
}
