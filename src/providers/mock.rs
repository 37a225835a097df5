/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with a translation payload
 * - `MockProvider::failing()` - Always fails with a transport error
 * - `MockProvider::malformed()` - Returns text without a JSON payload
 * - `MockProvider::failing_routes(..)` - Fails only for the given upstream routes
 * - `MockProvider::with_responder(..)` - Scripted responses per request
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::{ChatRequest, Provider};
use crate::translation::stop::StopFlag;

const TEXT_START: &str = "```[START]\n";
const TEXT_END: &str = "\n```[END]";

/// Scripted response function: receives the request and its 0-based index
pub type Responder = Arc<dyn Fn(&ChatRequest, usize) -> Result<String, ProviderError> + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Clone)]
pub enum MockBehavior {
    /// Always succeeds with `[TRANSLATED] <chunk>`
    Working,
    /// Always fails with a transport error
    Failing,
    /// Returns prose without any JSON object
    Malformed,
    /// Fails for the listed routes and works for the rest
    FailingRoutes(HashSet<String>),
    /// Sleeps before answering like `Working`
    Slow { delay_ms: u64 },
    /// Custom response function
    Scripted(Responder),
}

impl std::fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => f.write_str("Working"),
            Self::Failing => f.write_str("Failing"),
            Self::Malformed => f.write_str("Malformed"),
            Self::FailingRoutes(routes) => f.debug_tuple("FailingRoutes").field(routes).finish(),
            Self::Slow { delay_ms } => f.debug_struct("Slow").field("delay_ms", delay_ms).finish(),
            Self::Scripted(_) => f.write_str("Scripted"),
        }
    }
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn malformed() -> Self {
        Self::new(MockBehavior::Malformed)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn failing_routes<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockBehavior::FailingRoutes(routes.into_iter().map(Into::into).collect()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(MockBehavior::Scripted(Arc::new(responder)))
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    /// Route of every request received, in arrival order
    pub fn routes(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|c| c.route.clone()).collect()
    }

    /// Pull the chunk text out of the `TEXT TO TRANSLATE` message
    pub fn chunk_text(request: &ChatRequest) -> Option<String> {
        request.messages.iter().rev().find_map(|message| {
            let start = message.content.find(TEXT_START)? + TEXT_START.len();
            let end = message.content[start..].find(TEXT_END)? + start;
            Some(message.content[start..end].to_string())
        })
    }

    /// Translation payload the working mock answers with
    pub fn translation_payload(translation: &str) -> String {
        let payload = serde_json::json!({ "complete_translation": translation });
        format!("```json\n{}\n```", payload)
    }

    fn working_response(request: &ChatRequest) -> String {
        let chunk = Self::chunk_text(request).unwrap_or_default();
        Self::translation_payload(&format!("[TRANSLATED] {}", chunk))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: ChatRequest, stop: &StopFlag) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(request.clone());

        if stop.is_stopped() {
            return Err(ProviderError::Cancelled);
        }

        match &self.behavior {
            MockBehavior::Working => Ok(Self::working_response(&request)),

            MockBehavior::Failing => Err(ProviderError::Transport("Simulated provider failure".to_string())),

            MockBehavior::Malformed => Ok("I am sorry, here is some prose instead of JSON.".to_string()),

            MockBehavior::FailingRoutes(routes) => match &request.route {
                Some(route) if routes.contains(route) => Err(ProviderError::ApiError {
                    status_code: 503,
                    message: format!("Simulated failure for {}", route),
                }),
                _ => Ok(Self::working_response(&request)),
            },

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(*delay_ms)).await;
                Ok(Self::working_response(&request))
            }

            MockBehavior::Scripted(responder) => responder(&request, count),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
