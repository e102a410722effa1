//! Second-pass review of the assistant's last answer.

use std::fmt::Write;

use serde::Deserialize;
use serde_json::{Value, json};
use travel_assistant_model::ModelMessage;

use crate::conversation::Transcript;
use crate::gateway::{Gateway, GenerationConfig};

/// The outcome of a review.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct VerificationVerdict {
    /// Whether the last answer should be thrown away and regenerated.
    pub needs_correction: bool,
    /// What was wrong with the answer and how to fix it.
    pub feedback: String,
}

impl VerificationVerdict {
    fn failed(cause: impl std::fmt::Display) -> Self {
        Self {
            needs_correction: false,
            feedback: format!("Verification failed: {cause}"),
        }
    }
}

/// The JSON schema the verifier model has to answer with.
pub fn verification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "needs_correction": {
                "type": "boolean",
                "description": "True if the last response needs to be removed and regenerated"
            },
            "feedback": {
                "type": "string",
                "description": "Detailed explanation of what was wrong and what to fix"
            }
        },
        "required": ["needs_correction", "feedback"]
    })
}

/// Reviews the last answer of a transcript with a separate model.
#[derive(Clone)]
pub struct Verifier {
    gateway: Gateway,
    model: String,
    config: GenerationConfig,
}

impl Verifier {
    /// Creates a verifier that runs `model` with the given system
    /// instruction.
    pub fn new<M, S>(gateway: Gateway, model: M, system_instruction: S) -> Self
    where
        M: Into<String>,
        S: Into<String>,
    {
        let config = GenerationConfig::new(system_instruction)
            .with_response_schema(verification_schema());
        Self {
            gateway,
            model: model.into(),
            config,
        }
    }

    /// Reviews the last resolved exchange of the transcript, taking the
    /// exchanges before it as context.
    ///
    /// Never fails. If the review can't be done, the answer is let through
    /// and the feedback tells why.
    pub async fn verify(&self, transcript: &Transcript) -> VerificationVerdict {
        let Some(context) = review_context(transcript) else {
            return VerificationVerdict::failed("there is no answer to verify");
        };
        let messages = [ModelMessage::User(context)];
        let text =
            match self.gateway.generate(&self.model, &self.config, &messages).await
            {
                Ok(text) => text,
                Err(err) => {
                    warn!("verifier request failed: {err}");
                    return VerificationVerdict::failed(err);
                }
            };

        match parse_verdict(&text) {
            Ok(verdict) => {
                debug!(
                    needs_correction = verdict.needs_correction,
                    "got a verdict: {}", verdict.feedback
                );
                verdict
            }
            Err(err) => {
                warn!("malformed verdict {text:?}: {err}");
                VerificationVerdict::failed(err)
            }
        }
    }
}

fn review_context(transcript: &Transcript) -> Option<String> {
    let resolved: Vec<_> = transcript.resolved().collect();
    let ((last_user, last_assistant), previous) = resolved.split_last()?;

    let mut context = String::new();
    if !previous.is_empty() {
        context.push_str("=== CONVERSATION HISTORY ===\n");
        for (idx, (user, assistant)) in previous.iter().enumerate() {
            let n = idx + 1;
            _ = writeln!(context, "User {n}: {user}");
            _ = writeln!(context, "Assistant {n}: {assistant}");
        }
        context.push('\n');
    }
    context.push_str("=== LAST EXCHANGE TO VERIFY ===\n");
    _ = writeln!(context, "User: {last_user}");
    _ = write!(context, "Assistant: {last_assistant}");
    Some(context)
}

fn parse_verdict(text: &str) -> Result<VerificationVerdict, serde_json::Error> {
    serde_json::from_str(strip_code_fence(text.trim()))
}

/// Removes a Markdown code fence around the payload, if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return text;
    };
    // Skip the info string, e.g. "json".
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}
