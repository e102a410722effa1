//! End-to-end handling of one conversation turn.

mod builder;
#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::pin::pin;

use async_stream::stream;
use futures_util::{Stream, StreamExt};

pub use builder::{
    DEFAULT_CORRECTION_TEMPLATE, DEFAULT_TRAVELER_MODEL, DEFAULT_VERIFIER_MODEL,
    OrchestratorBuilder,
};

use crate::conversation::{Exchange, Transcript};
use crate::gateway::{Gateway, GenerationConfig};
use crate::history;
use crate::streaming::stream_response;
use crate::verifier::Verifier;

/// Shown in place of an answer that is being corrected.
pub const CORRECTION_PLACEHOLDER: &str = "I apologize, my previous answer \
    wasn't accurate. Let me correct it...";

const ERROR_NOTE_PREFIX: &str = "Sorry, I encountered an error: ";

/// The stage a turn is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnStage {
    /// The answer is being streamed.
    Generating,
    /// The answer is being reviewed, nothing is streamed meanwhile.
    Verifying,
    /// The answer was rejected and a new one is being streamed.
    Correcting,
    /// The turn is over.
    Done,
}

/// Handles conversation turns: streams an answer, has it reviewed, and
/// streams a corrected answer if the review asks for it.
pub struct Orchestrator {
    gateway: Gateway,
    verifier: Verifier,
    traveler_model: String,
    normal_config: GenerationConfig,
    correction_template: String,
    max_history: usize,
    on_stage: Option<Box<dyn Fn(TurnStage) + Send + Sync>>,
}

impl Orchestrator {
    /// Handles the last exchange of the transcript, which the caller has
    /// appended beforehand.
    ///
    /// The returned stream yields a snapshot of the transcript after every
    /// change to the last exchange. Within one generation the answer only
    /// grows. If a correction happens, the answer is replaced by
    /// [`CORRECTION_PLACEHOLDER`] once before the corrected answer streams.
    ///
    /// Errors never escape. A failed generation is reported as the answer
    /// text and ends the turn. Nothing happens until the stream is polled,
    /// and dropping it abandons the turn.
    pub fn handle_turn<'a>(
        &'a self,
        transcript: &'a mut Transcript,
    ) -> impl Stream<Item = Transcript> + Send + 'a {
        stream! {
            self.notify(TurnStage::Generating);
            // Both generations answer the same messages.
            let messages = history::build(transcript, self.max_history);
            debug!("handling a turn with {} messages", messages.len());

            let mut config = Cow::Borrowed(&self.normal_config);
            let mut correcting = false;
            loop {
                let mut answered = false;
                let mut failure = None;
                {
                    let mut snapshots = pin!(stream_response(
                        &self.gateway,
                        transcript,
                        &self.traveler_model,
                        &config,
                        &messages,
                    ));
                    while let Some(snapshot) = snapshots.next().await {
                        match snapshot {
                            Ok(snapshot) => {
                                answered = true;
                                yield snapshot;
                            }
                            Err(err) => {
                                failure = Some(err);
                                break;
                            }
                        }
                    }
                }

                if let Some(err) = failure {
                    error!("generation failed: {err}");
                    let note = format!("{ERROR_NOTE_PREFIX}{err}");
                    let text = if correcting {
                        format!("{CORRECTION_PLACEHOLDER}\n\n{note}")
                    } else {
                        note
                    };
                    transcript.set_last_assistant(text);
                    yield transcript.clone();
                    break;
                }
                // The corrected answer is final.
                if correcting {
                    break;
                }
                if !answered {
                    debug!("no answer was generated, skipping verification");
                    break;
                }
                if transcript.last().and_then(Exchange::as_resolved).is_none() {
                    debug!("nothing to verify in the last exchange");
                    break;
                }

                self.notify(TurnStage::Verifying);
                let verdict = self.verifier.verify(transcript).await;
                if !verdict.needs_correction {
                    break;
                }

                info!("correcting the answer: {}", verdict.feedback);
                transcript.set_last_assistant(CORRECTION_PLACEHOLDER);
                yield transcript.clone();

                self.notify(TurnStage::Correcting);
                config = Cow::Owned(GenerationConfig {
                    system_instruction: self.corrected_instruction(&verdict.feedback),
                    ..self.normal_config.clone()
                });
                correcting = true;
            }
            self.notify(TurnStage::Done);
        }
    }

    fn corrected_instruction(&self, feedback: &str) -> String {
        self.correction_template
            .replace("{{SYSTEM_PROMPT}}", &self.normal_config.system_instruction)
            .replace("{{FEEDBACK}}", feedback)
    }

    #[inline]
    fn notify(&self, stage: TurnStage) {
        trace!("entering {stage:?}");
        if let Some(on_stage) = &self.on_stage {
            on_stage(stage);
        }
    }
}
