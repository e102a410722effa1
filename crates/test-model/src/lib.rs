//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use travel_assistant_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, OpaqueMessage,
    ResponseChunk,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    turn_idx: usize,
    preset: PresetResponse,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn next_event(&mut self) -> Result<Option<ModelResponseEvent>, Error> {
        if let Some(PresetFailure::AfterEvents(count)) = self.preset.failure {
            if self.event_idx >= count {
                return Err(Error {
                    message: "connection reset",
                    kind: ErrorKind::Other,
                });
            }
        }

        let events = &self.preset.events;
        if self.event_idx < events.len() {
            let event = match &events[self.event_idx] {
                PresetEvent::Text(text) => ModelResponseEvent::Chunk(
                    ResponseChunk::structured([text.clone()]),
                ),
                PresetEvent::FlatText(text) => {
                    ModelResponseEvent::Chunk(ResponseChunk::flat(text.clone()))
                }
                PresetEvent::Chunk(chunk) => {
                    ModelResponseEvent::Chunk(chunk.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            };
            self.event_idx += 1;
            return Ok(Some(event));
        }

        if self.event_idx == events.len() {
            self.event_idx += 1;
            let has_tool_call = events
                .iter()
                .any(|event| matches!(event, PresetEvent::ToolCall(_)));
            return Ok(Some(ModelResponseEvent::Completed(if has_tool_call {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            })));
        }

        // In case this method is called after completion.
        Ok(None)
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(this.next_event())
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        let id = format!("turn:{}", self.turn_idx);
        Some(OpaqueMessage::new(id, self.preset.clone()))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Every request takes the next response from the script, in the order
/// they were added, and records the request so that tests can inspect
/// what has been sent. If the script is exhausted, the request fails.
///
/// Clones share the same script, so a test can keep one handle while
/// the other is moved into the code under test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script.lock().unwrap().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    /// Returns the number of streaming requests received so far.
    pub fn streaming_request_count(&self) -> usize {
        let script = self.script.lock().unwrap();
        script.requests.iter().filter(|req| req.stream).count()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script.lock().unwrap();
        script.requests.push(req.clone());
        let turn_idx = script.requests.len() - 1;

        let result = match script.responses.pop_front() {
            None => Err(Error {
                message: "no enough responses",
                kind: ErrorKind::RateLimitExceeded,
            }),
            Some(preset)
                if preset.failure == Some(PresetFailure::OnRequest) =>
            {
                Err(Error {
                    message: "request rejected",
                    kind: ErrorKind::Other,
                })
            }
            Some(preset) => Ok(TestModelResponse {
                turn_idx,
                preset,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}
