//! Turns a transcript into the messages sent to the model.

use travel_assistant_model::ModelMessage;

use crate::conversation::{Exchange, Transcript};

/// The number of exchanges kept by default.
pub const DEFAULT_MAX_EXCHANGES: usize = 10;

/// Builds the model messages for the last `max_exchanges` exchanges of
/// the transcript.
///
/// Older exchanges are dropped. The last exchange is the one being
/// answered, so only its user text is taken. Empty texts are skipped, and
/// a window of 0 is treated as 1.
pub fn build(transcript: &Transcript, max_exchanges: usize) -> Vec<ModelMessage> {
    let exchanges = transcript.exchanges();
    let window = max_exchanges.max(1);
    let recent = &exchanges[exchanges.len().saturating_sub(window)..];
    let Some((current, previous)) = recent.split_last() else {
        return vec![];
    };

    let mut messages = Vec::with_capacity(previous.len() * 2 + 1);
    for Exchange { user, assistant } in previous {
        if let Some(user) = non_empty(user) {
            messages.push(ModelMessage::User(user.to_owned()));
        }
        if let Some(assistant) = non_empty(assistant) {
            messages.push(ModelMessage::Model(assistant.to_owned()));
        }
    }
    if let Some(user) = non_empty(&current.user) {
        messages.push(ModelMessage::User(user.to_owned()));
    }
    trace!("built {} messages from the transcript", messages.len());
    messages
}

#[inline]
fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|s| !s.is_empty())
}
