//! Conversation-related types.

/// One user message and the assistant's answer to it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Exchange {
    /// What the user said, if anything.
    pub user: Option<String>,
    /// The assistant's answer, `None` while it is still being generated.
    pub assistant: Option<String>,
}

impl Exchange {
    /// Creates an in-flight exchange that waits for the answer.
    #[inline]
    pub fn new<S: Into<String>>(user: S) -> Self {
        Self {
            user: Some(user.into()),
            assistant: None,
        }
    }

    /// Creates an exchange that has been answered.
    #[inline]
    pub fn resolved<U: Into<String>, A: Into<String>>(
        user: U,
        assistant: A,
    ) -> Self {
        Self {
            user: Some(user.into()),
            assistant: Some(assistant.into()),
        }
    }

    /// Returns both texts if neither of them is missing or empty.
    pub fn as_resolved(&self) -> Option<(&str, &str)> {
        let user = self.user.as_deref().filter(|s| !s.is_empty())?;
        let assistant = self.assistant.as_deref().filter(|s| !s.is_empty())?;
        Some((user, assistant))
    }
}

/// Represents a conversation as the user sees it.
///
/// Only the last exchange may still be waiting for its answer. The turn
/// handling code rewrites the answer of the last exchange and never
/// touches the earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Transcript {
    exchanges: Vec<Exchange>,
}

impl Transcript {
    /// Creates a transcript from existing exchanges.
    #[inline]
    pub fn from_exchanges(exchanges: Vec<Exchange>) -> Self {
        Self { exchanges }
    }

    /// Appends an exchange.
    #[inline]
    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    /// Appends a user message whose answer is yet to come.
    ///
    /// A previous exchange that never got an answer is closed with an
    /// empty one first.
    pub fn push_user<S: Into<String>>(&mut self, user: S) {
        if let Some(last) = self.exchanges.last_mut() {
            last.assistant.get_or_insert_default();
        }
        self.push(Exchange::new(user));
    }

    /// Returns all exchanges, oldest first.
    #[inline]
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Returns the last exchange.
    #[inline]
    pub fn last(&self) -> Option<&Exchange> {
        self.exchanges.last()
    }

    /// Overwrites the answer of the last exchange.
    ///
    /// Returns `false` if the transcript is empty, in which case nothing
    /// is written.
    pub fn set_last_assistant<S: Into<String>>(&mut self, text: S) -> bool {
        match self.exchanges.last_mut() {
            Some(last) => {
                last.assistant = Some(text.into());
                true
            }
            None => false,
        }
    }

    /// Returns the exchanges whose user and assistant texts are both
    /// present, in order.
    pub fn resolved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exchanges.iter().filter_map(Exchange::as_resolved)
    }

    /// Removes all exchanges.
    #[inline]
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    /// Returns the number of exchanges.
    #[inline]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Returns `true` if there are no exchanges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
