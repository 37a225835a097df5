/*!
 * OpenRouter / OpenAI-compatible streaming chat client.
 *
 * Requests are sent to `{base_url}/chat/completions` with `stream: true` and
 * the server-sent event stream is folded into the complete assistant text.
 * When talking to OpenRouter itself, each request pins one upstream provider
 * with fallbacks disabled so that rotation stays under our control.
 */

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use log::{debug, error, trace, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{ChatMessage, ChatRequest, Provider};
use crate::translation::stop::StopFlag;

/// Default OpenRouter API base
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const APP_TITLE: &str = "booktrans";
const APP_REFERER: &str = env!("CARGO_PKG_REPOSITORY");

/// Provider routing preferences understood by OpenRouter
#[derive(Debug, Serialize, PartialEq)]
struct ProviderRouting {
    order: Vec<String>,
    allow_fallbacks: bool,
}

/// Body of a streaming chat completion request
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    max_tokens: u32,
    frequency_penalty: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderRouting>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes are buffered until a full line is available so that multi-byte
/// characters split across network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every complete frame now available
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            let text = String::from_utf8_lossy(&line);
            if let Some(frame) = Self::parse_line(text.trim_end_matches(['\r', '\n'])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        let text = String::from_utf8_lossy(&rest);
        Self::parse_line(text.trim())
    }

    fn parse_line(line: &str) -> Option<SseFrame> {
        // Blank separators and ": keep-alive" comments carry nothing
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == "[DONE]" {
            Some(SseFrame::Done)
        } else if payload.is_empty() {
            None
        } else {
            Some(SseFrame::Data(payload.to_string()))
        }
    }
}

/// Extract `choices[0].delta.content` from a stream payload
pub fn delta_content(payload: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    chunk.choices.into_iter().next()?.delta?.content
}

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub base_url: String,
    pub api_key: String,
    /// Idle timeout for connecting and for each stream frame
    pub timeout: Duration,
}

/// Streaming chat client
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    settings: EndpointSettings,
}

impl OpenRouterClient {
    pub fn new(settings: EndpointSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// Whether the endpoint is OpenRouter itself
    pub fn is_openrouter(&self) -> bool {
        self.settings.base_url.contains("openrouter.ai")
    }

    fn timeout_error(&self) -> ProviderError {
        ProviderError::Timeout(self.settings.timeout.as_secs_f64())
    }

    fn build_body<'a>(&self, request: &'a ChatRequest) -> CompletionBody<'a> {
        let params = &request.params;
        CompletionBody {
            model: &params.model,
            messages: &request.messages,
            temperature: params.temperature,
            stream: true,
            max_tokens: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
            top_p: params.top_p,
            top_k: (params.top_k > 0).then_some(params.top_k),
            provider: request.route.as_ref().map(|route| ProviderRouting {
                order: vec![route.clone()],
                allow_fallbacks: false,
            }),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&self.build_body(request));

        if self.is_openrouter() {
            builder = builder.header("X-Title", APP_TITLE);
            if !APP_REFERER.is_empty() {
                builder = builder.header("HTTP-Referer", APP_REFERER);
            }
        }

        let response = tokio::time::timeout(self.settings.timeout, builder.send())
            .await
            .map_err(|_| self.timeout_error())??;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Completion API error ({}): {}", status, error_text);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_text,
            });
        }
        Ok(response)
    }

    /// List the upstream providers OpenRouter offers for `model_id`
    pub async fn list_endpoints(&self, model_id: &str) -> Result<Vec<EndpointInfo>, ProviderError> {
        let url = endpoints_url(&self.settings.base_url, model_id)?;
        debug!("Requesting endpoints from {}", url);

        let response = tokio::time::timeout(Duration::from_secs(30), self.client.get(url).send())
            .await
            .map_err(|_| ProviderError::Timeout(30.0))??;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        parse_endpoints(&body)
    }
}

#[async_trait]
impl Provider for OpenRouterClient {
    async fn complete(&self, request: ChatRequest, stop: &StopFlag) -> Result<String, ProviderError> {
        let response = self.send(&request).await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut text = String::new();
        let mut frames = 0usize;

        'stream: loop {
            if stop.is_stopped() {
                return Err(ProviderError::Cancelled);
            }

            let next = tokio::time::timeout(self.settings.timeout, stream.next())
                .await
                .map_err(|_| self.timeout_error())?;

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    // Keep what arrived; the payload may already be complete
                    warn!("Stream error after {} frames: {}", frames, e);
                    break;
                }
                None => break,
            };

            for frame in decoder.push(&bytes) {
                frames += 1;
                match frame {
                    SseFrame::Done => break 'stream,
                    SseFrame::Data(payload) => {
                        if let Some(content) = delta_content(&payload) {
                            trace!("{}", content);
                            text.push_str(&content);
                        }
                    }
                }
            }
        }

        if let Some(SseFrame::Data(payload)) = decoder.finish() {
            if let Some(content) = delta_content(&payload) {
                text.push_str(&content);
            }
        }

        debug!("Processed {} stream frames ({} chars)", frames, text.chars().count());
        Ok(text)
    }

    fn name(&self) -> &str {
        if self.is_openrouter() { "openrouter" } else { "custom-endpoint" }
    }
}

/// Upstream provider offering a model through OpenRouter
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointInfo {
    /// Identifier usable in the provider rotation list
    pub provider_id: String,
    pub provider_name: String,
    /// Prompt/completion price per million tokens, when published
    pub pricing: Option<String>,
    pub context_length: Option<u64>,
    pub quantization: String,
    pub uptime: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EndpointsEnvelope {
    data: EndpointsData,
}

#[derive(Debug, Deserialize)]
struct EndpointsData {
    #[serde(default)]
    endpoints: Vec<EndpointRecord>,
}

#[derive(Debug, Deserialize)]
struct EndpointRecord {
    provider_name: String,
    tag: Option<String>,
    quantization: Option<String>,
    pricing: Option<Value>,
    context_length: Option<u64>,
    uptime_last_30m: Option<f64>,
}

/// Routing id for an endpoint: its tag, else `name[/quantization]` lowercased
pub fn endpoint_provider_id(provider_name: &str, tag: Option<&str>, quantization: Option<&str>) -> String {
    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        return tag.to_string();
    }
    match quantization.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}/{}", provider_name.to_lowercase(), q.to_lowercase()),
        None => provider_name.to_lowercase(),
    }
}

fn price(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn format_pricing(pricing: &Value) -> Option<String> {
    let object = pricing.as_object()?;
    let prompt = price(object.get("prompt")) * 1_000_000.0;
    let completion = price(object.get("completion")) * 1_000_000.0;
    Some(format!("${:.3}/${:.3} per 1M tokens", prompt, completion))
}

/// Build `{base}/models/{author}/{slug}/endpoints` for a model id
pub fn endpoints_url(base_url: &str, model_id: &str) -> Result<Url, ProviderError> {
    let clean = model_id
        .split(' ')
        .next()
        .unwrap_or_default()
        .split('(')
        .next()
        .unwrap_or_default()
        .trim();
    let (author, slug) = clean
        .split_once('/')
        .ok_or_else(|| ProviderError::Transport(format!("Model id '{}' is not of the form author/slug", model_id)))?;

    let mut url = Url::parse(base_url).map_err(|e| ProviderError::Transport(format!("Invalid base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::Transport(format!("Base URL cannot be a base: {}", base_url)))?
        .pop_if_empty()
        .push("models")
        .push(author)
        .push(slug)
        .push("endpoints");
    Ok(url)
}

/// Decode the endpoints listing response
pub fn parse_endpoints(body: &str) -> Result<Vec<EndpointInfo>, ProviderError> {
    let envelope: EndpointsEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    Ok(envelope
        .data
        .endpoints
        .into_iter()
        .map(|record| EndpointInfo {
            provider_id: endpoint_provider_id(&record.provider_name, record.tag.as_deref(), record.quantization.as_deref()),
            pricing: record.pricing.as_ref().and_then(format_pricing),
            context_length: record.context_length,
            quantization: record
                .quantization
                .filter(|q| !q.is_empty())
                .unwrap_or_else(|| "full precision".to_string()),
            uptime: record.uptime_last_30m,
            provider_name: record.provider_name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SamplingParams;

    fn request(route: Option<&str>, top_k: u32) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            params: SamplingParams {
                model: "deepseek/deepseek-v3.2-exp".to_string(),
                temperature: 0.9,
                max_tokens: 12000,
                frequency_penalty: 0.0,
                top_p: 0.95,
                top_k,
            },
            route: route.map(str::to_string),
        }
    }

    fn client(base_url: &str) -> OpenRouterClient {
        OpenRouterClient::new(EndpointSettings {
            base_url: base_url.to_string(),
            api_key: "key".to_string(),
            timeout: Duration::from_secs(10),
        })
        .unwrap()
    }

    #[test]
    fn test_sseDecoder_withSplitLines_shouldEmitCompleteFrames() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let frames = decoder.push(b"1}\n\n: OPENROUTER PROCESSING\ndata: [DONE]\n");
        assert_eq!(frames, vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]);
    }

    #[test]
    fn test_sseDecoder_withSplitMultibyteChar_shouldDecodeIntact() {
        let mut decoder = SseDecoder::new();
        let line = "data: アキラ\n".as_bytes();
        assert!(decoder.push(&line[..8]).is_empty());
        let frames = decoder.push(&line[8..]);
        assert_eq!(frames, vec![SseFrame::Data("アキラ".to_string())]);
    }

    #[test]
    fn test_sseDecoder_finish_shouldFlushUnterminatedLine() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::Data("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_deltaContent_withVariousPayloads_shouldExtractContentOnly() {
        assert_eq!(
            delta_content(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#),
            Some("Hel".to_string())
        );
        assert_eq!(delta_content(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(delta_content(r#"{"choices":[]}"#), None);
        assert_eq!(delta_content("not json"), None);
    }

    #[test]
    fn test_buildBody_withRouteAndTopK_shouldIncludeRouting() {
        let client = client(OPENROUTER_BASE_URL);
        let request = request(Some("novita/fp8"), 40);
        let body = serde_json::to_value(client.build_body(&request)).unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["top_k"], 40);
        assert_eq!(body["provider"]["order"][0], "novita/fp8");
        assert_eq!(body["provider"]["allow_fallbacks"], false);
    }

    #[test]
    fn test_buildBody_withoutRouteAndZeroTopK_shouldOmitOptionalFields() {
        let client = client("https://llm.chutes.ai/v1");
        let request = request(None, 0);
        let body = serde_json::to_value(client.build_body(&request)).unwrap();

        assert!(body.get("top_k").is_none());
        assert!(body.get("provider").is_none());
        assert!(!client.is_openrouter());
        assert_eq!(client.name(), "custom-endpoint");
    }

    #[test]
    fn test_endpointProviderId_shouldPreferTagThenQuantization() {
        assert_eq!(endpoint_provider_id("Novita", Some("novita/fp8"), Some("fp8")), "novita/fp8");
        assert_eq!(endpoint_provider_id("DeepInfra", None, Some("FP4")), "deepinfra/fp4");
        assert_eq!(endpoint_provider_id("Chutes", Some(""), None), "chutes");
    }

    #[test]
    fn test_endpointsUrl_withDecoratedModelId_shouldEncodeSegments() {
        let url = endpoints_url(OPENROUTER_BASE_URL, "deepseek/deepseek-v3.2-exp (free)").unwrap();
        assert_eq!(
            url.as_str(),
            "https://openrouter.ai/api/v1/models/deepseek/deepseek-v3.2-exp/endpoints"
        );
        assert!(endpoints_url(OPENROUTER_BASE_URL, "no-slash").is_err());
    }

    #[test]
    fn test_parseEndpoints_withListing_shouldBuildInfo() {
        let body = r#"{"data": {"id": "x", "endpoints": [
            {"provider_name": "Novita", "tag": "novita/fp8", "quantization": "fp8",
             "pricing": {"prompt": "0.00000027", "completion": "0.0000004"},
             "context_length": 163840, "uptime_last_30m": 99.5},
            {"provider_name": "GMICloud", "quantization": null}
        ]}}"#;
        let endpoints = parse_endpoints(body).unwrap();

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].provider_id, "novita/fp8");
        assert_eq!(endpoints[0].pricing.as_deref(), Some("$0.270/$0.400 per 1M tokens"));
        assert_eq!(endpoints[1].provider_id, "gmicloud");
        assert_eq!(endpoints[1].quantization, "full precision");
        assert!(parse_endpoints("[]").is_err());
    }
}
