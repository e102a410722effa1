use serde::{Deserialize, Serialize};

/// A piece of a model response carrying (possibly) some text.
///
/// Providers deliver text in one of two shapes. Structured providers send
/// candidates whose content is split into parts, while simpler providers
/// send a flat text field. Either shape may carry no text at all, e.g. a
/// chunk that only holds a function call or usage metadata.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    /// A chunk with candidate contents.
    Structured {
        /// Candidates of the response, the first one is the primary.
        candidates: Vec<Candidate>,
    },
    /// A chunk with a single text field.
    Flat {
        /// The text of this chunk.
        text: Option<String>,
    },
}

impl ResponseChunk {
    /// Creates a flat chunk with the given text.
    #[inline]
    pub fn flat<S: Into<String>>(text: S) -> Self {
        Self::Flat {
            text: Some(text.into()),
        }
    }

    /// Creates a structured chunk with a single candidate made of the
    /// given text parts.
    pub fn structured<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts = parts.into_iter().map(ContentPart::text).collect();
        Self::Structured {
            candidates: vec![Candidate {
                content: Some(CandidateContent { parts }),
            }],
        }
    }

    /// Extracts the text carried by this chunk.
    ///
    /// Returns `None` if the chunk contributes no text.
    pub fn text(&self) -> Option<String> {
        let text = match self {
            Self::Structured { candidates } => structured_text(candidates),
            Self::Flat { text } => text.clone(),
        };
        text.filter(|t| !t.is_empty())
    }
}

fn structured_text(candidates: &[Candidate]) -> Option<String> {
    let content = candidates.first()?.content.as_ref()?;
    let mut text = None::<String>;
    for part in &content.parts {
        if part.thought {
            continue;
        }
        if let Some(part_text) = &part.text {
            text.get_or_insert_default().push_str(part_text);
        }
    }
    text
}

/// A candidate in a structured chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Content of the candidate, missing when the candidate is empty
    /// (e.g. the final chunk that only carries a finish reason).
    pub content: Option<CandidateContent>,
}

/// The content of a candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateContent {
    /// Parts of the content.
    pub parts: Vec<ContentPart>,
}

/// A single part of a candidate content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentPart {
    /// Text of this part, if it's a text part.
    pub text: Option<String>,
    /// Whether this part is a thought summary rather than answer text.
    pub thought: bool,
}

impl ContentPart {
    /// Creates a plain text part.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            thought: false,
        }
    }
}
