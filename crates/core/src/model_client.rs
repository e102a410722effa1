use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tracing::Instrument;
use travel_assistant_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent, OpaqueMessage,
};

pub(crate) type BoxedProviderError = Box<dyn ModelProviderError>;

type SendRequestResult = Result<ModelClientResponse, BoxedProviderError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(ModelClientResponse {
                            inner: Box::pin(resp),
                        }),
                        Err(err) => {
                            error!("got an error: {err:?}");
                            Err(Box::new(err) as BoxedProviderError)
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response, whose events are pulled
    /// by the caller.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelClientResponse, BoxedProviderError> {
        (self.handler_fn)(req).await
    }
}

/// A response from the model client.
///
/// Dropping it stops receiving the response.
pub struct ModelClientResponse {
    inner: Pin<Box<dyn ErasedResponse>>,
}

impl ModelClientResponse {
    /// Waits for the next event, returns `None` once the response has
    /// completed.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    pub async fn next_event(
        &mut self,
    ) -> Result<Option<ModelResponseEvent>, BoxedProviderError> {
        let event = poll_fn(|cx| self.inner.as_mut().poll_next_event(cx)).await;
        match &event {
            Ok(Some(event)) => trace!("got an event: {event:?}"),
            Ok(None) => trace!("finished a request"),
            Err(err) => error!("got an error: {err:?}"),
        }
        event
    }

    /// Returns the model turn of this response, see
    /// [`ModelResponse::make_opaque_message`].
    #[inline]
    pub fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.inner.make_opaque_message()
    }
}

trait ErasedResponse: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, BoxedProviderError>>;

    fn make_opaque_message(&self) -> Option<OpaqueMessage>;
}

impl<R: ModelResponse> ErasedResponse for R {
    #[inline]
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, BoxedProviderError>> {
        ModelResponse::poll_next_event(self, cx)
            .map_err(|err| Box::new(err) as BoxedProviderError)
    }

    #[inline]
    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        ModelResponse::make_opaque_message(self)
    }
}

#[cfg(test)]
mod tests {
    use travel_assistant_model::{ErrorKind, ModelMessage};
    use travel_assistant_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "gemini-2.5-flash".to_owned(),
            system_instruction: String::new(),
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
            response_schema: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::Text("How ".to_owned()),
            PresetEvent::FlatText("are ".to_owned()),
            PresetEvent::Text("you?".to_owned()),
        ]));

        let model_client = ModelClient::new(model_provider);
        let mut resp = model_client.send_request(request()).await.unwrap();

        let mut transcript = String::new();
        let mut completed = false;
        while let Some(event) = resp.next_event().await.unwrap() {
            match event {
                ModelResponseEvent::Chunk(chunk) => {
                    transcript.push_str(&chunk.text().unwrap());
                }
                ModelResponseEvent::Completed(_) => completed = true,
                ModelResponseEvent::ToolCall(_) => unreachable!(),
            }
        }
        assert_eq!(transcript, "How are you?");
        assert!(completed);
        assert!(resp.make_opaque_message().is_some());
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let err = model_client.send_request(request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }
}
