use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use travel_assistant_model::{
    Candidate as ChunkCandidate, CandidateContent, ContentPart, ErrorKind,
    ModelFinishReason, ModelResponse, ModelResponseEvent, OpaqueMessage,
    ResponseChunk, ToolCallRequest,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{
    Candidate, Content, GenerateContentResponse, LOCAL_CALL_ID_PREFIX, Part,
};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(0);

/// Where the response payloads come from.
enum Source {
    /// A `streamGenerateContent` body, one payload per event.
    Sse(Sse),
    /// A `generateContent` body, a single payload.
    Body(Option<GenerateContentResponse>),
}

impl Source {
    async fn next_payload(
        &mut self,
    ) -> Result<Option<GenerateContentResponse>, Error> {
        match self {
            Source::Sse(sse) => {
                let event = match sse.next_event().await {
                    Ok(Some(event)) => event,
                    Ok(None) => return Ok(None),
                    Err(err) => {
                        return Err(Error::new(
                            format!("{err:?}"),
                            ErrorKind::InvalidResponse,
                        ));
                    }
                };
                trace!("got sse event: {event}");
                serde_json::from_str(&event).map(Some).map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::InvalidResponse)
                })
            }
            Source::Body(body) => Ok(body.take()),
        }
    }
}

struct PartialState {
    source: Source,
    response_id: Option<String>,
    // Parts of the model turn, kept so that the turn can be replayed in
    // a follow-up request after its tool calls are answered.
    parts: Vec<Part>,
    pending_tool_calls: VecDeque<ToolCallRequest>,
    has_tool_calls: bool,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
}

impl PartialState {
    fn new(source: Source) -> Self {
        Self {
            source,
            response_id: None,
            parts: Default::default(),
            pending_tool_calls: Default::default(),
            has_tool_calls: false,
            pending_finish_reason: None,
        }
    }

    #[inline]
    fn finish(self) -> Option<(String, Content)> {
        if self.parts.is_empty() {
            return None;
        }
        let id = self.response_id.unwrap_or_else(|| {
            let idx = NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed);
            format!("local-turn:{idx}")
        });
        Some((
            id,
            Content {
                role: Some("model".to_owned()),
                parts: self.parts,
            },
        ))
    }

    fn record_candidate(&mut self, candidate: &Candidate) {
        for part in candidate.content.iter().flat_map(|c| &c.parts) {
            if let Some(call) = &part.function_call {
                let id = call.id.clone().unwrap_or_else(|| {
                    let idx = NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed);
                    format!("{LOCAL_CALL_ID_PREFIX}{idx}")
                });
                self.pending_tool_calls.push_back(ToolCallRequest {
                    id,
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                });
                self.has_tool_calls = true;
            }

            match self.parts.last_mut() {
                Some(last) if last.is_plain_text() && part.is_plain_text() => {
                    let text = part.text.as_deref().unwrap_or_default();
                    last.text.get_or_insert_default().push_str(text);
                }
                _ => self.parts.push(part.clone()),
            }
        }

        if let Some(reason) = &candidate.finish_reason {
            if matches!(
                reason.as_str(),
                "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII"
            ) {
                warn!("candidate finished early: {reason}");
            }
            self.pending_finish_reason = Some(if self.has_tool_calls {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            });
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Content)>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        Self::with_source(Source::Sse(sse))
    }

    #[inline]
    pub fn from_body(body: GenerateContentResponse) -> Self {
        Self::with_source(Source::Body(Some(body)))
    }

    fn with_source(source: Source) -> Self {
        let partial_state = PartialState::new(source);
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            full_msg: None,
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.full_msg = partial_state.finish();
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The source may still have more data to pull, create a new future
        // for the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, content)| OpaqueMessage::new(id, content.clone()))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    // The order of events are important. A payload is emitted as a chunk
    // first, then the tool calls it carried, and finally the finish reason.
    if let Some(tool_call) = partial_state.pending_tool_calls.pop_front() {
        return Ok((Some(ModelResponseEvent::ToolCall(tool_call)), partial_state));
    }
    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    let Some(payload) = partial_state.source.next_payload().await? else {
        return Ok((None, partial_state));
    };

    if let Some(block_reason) = payload
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(Error::new(
            format!("prompt blocked: {block_reason}"),
            ErrorKind::Moderated,
        ));
    }
    if partial_state.response_id.is_none() {
        partial_state.response_id = payload.response_id.clone();
    }
    if let Some(candidate) = payload.candidates.first() {
        partial_state.record_candidate(candidate);
    }

    let chunk = ResponseChunk::Structured {
        candidates: payload.candidates.iter().map(chunk_candidate).collect(),
    };
    Ok((Some(ModelResponseEvent::Chunk(chunk)), partial_state))
}

fn chunk_candidate(candidate: &Candidate) -> ChunkCandidate {
    ChunkCandidate {
        content: candidate.content.as_ref().map(|content| CandidateContent {
            parts: content
                .parts
                .iter()
                .map(|part| ContentPart {
                    text: part.text.clone(),
                    thought: part.thought.unwrap_or(false),
                })
                .collect(),
        }),
    }
}
