//! Streams a generated answer into a transcript.

use std::pin::pin;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use travel_assistant_model::ModelMessage;

use crate::conversation::Transcript;
use crate::gateway::{Gateway, GatewayError, GenerationConfig};

/// Runs one streaming generation and writes the growing answer into the
/// last exchange of `transcript`.
///
/// A snapshot of the transcript is yielded for every chunk that carried
/// some text. Nothing is yielded for an empty transcript. The first error
/// is yielded and ends the stream.
pub fn stream_response<'a>(
    gateway: &Gateway,
    transcript: &'a mut Transcript,
    model: &str,
    config: &GenerationConfig,
    messages: &[ModelMessage],
) -> impl Stream<Item = Result<Transcript, GatewayError>> + Send + use<'a> {
    let chunks = gateway.generate_stream(model, config, messages);

    stream! {
        let mut chunks = pin!(chunks);
        let mut full_response = String::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let Some(text) = chunk.text() else {
                continue;
            };
            full_response.push_str(&text);
            if transcript.set_last_assistant(full_response.as_str()) {
                yield Ok(transcript.clone());
            }
        }
    }
}
