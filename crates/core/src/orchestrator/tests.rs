use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use travel_assistant_model::ModelMessage;
use travel_assistant_test_model::{
    PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
};

use super::*;
use crate::conversation::Exchange;
use crate::gateway::GatewayBuilder;
use crate::history::DEFAULT_MAX_EXCHANGES;

const SYSTEM_INSTRUCTION: &str = "You are a Travel Assistant.";

fn verdict(needs_correction: bool, feedback: &str) -> PresetResponse {
    PresetResponse::with_texts([format!(
        "{{\"needs_correction\": {needs_correction}, \"feedback\": \"{feedback}\"}}"
    )])
}

struct Harness {
    provider: TestModelProvider,
    stages: Arc<Mutex<Vec<TurnStage>>>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(responses: Vec<PresetResponse>) -> Self {
        Self::with_max_history(responses, DEFAULT_MAX_EXCHANGES)
    }

    fn with_max_history(
        responses: Vec<PresetResponse>,
        max_history: usize,
    ) -> Self {
        let mut provider = TestModelProvider::default();
        for response in responses {
            provider.add_response(response);
        }
        let stages = Arc::new(Mutex::new(vec![]));
        let gateway =
            GatewayBuilder::with_model_provider(provider.clone()).build();
        let orchestrator = OrchestratorBuilder::with_gateway(gateway)
            .with_system_instruction(SYSTEM_INSTRUCTION)
            .with_verifier_instruction("You are a verifier.")
            .with_max_history(max_history)
            .on_stage({
                let stages = Arc::clone(&stages);
                move |stage| stages.lock().unwrap().push(stage)
            })
            .build();
        Self {
            provider,
            stages,
            orchestrator,
        }
    }

    async fn run(&self, transcript: &mut Transcript) -> Vec<String> {
        self.orchestrator
            .handle_turn(transcript)
            .map(|snapshot| {
                snapshot
                    .last()
                    .and_then(|exchange| exchange.assistant.clone())
                    .unwrap_or_default()
            })
            .collect()
            .await
    }

    fn stages(&self) -> Vec<TurnStage> {
        self.stages.lock().unwrap().clone()
    }
}

fn paris_weather() -> Transcript {
    Transcript::from_exchanges(vec![Exchange::new(
        "What's the weather in Paris on 2025-08-20?",
    )])
}

#[tokio::test]
async fn test_verified_answer() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Par", "tly cloudy, 22°C."]),
        verdict(false, ""),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers, ["Par", "Partly cloudy, 22°C."]);
    assert_eq!(
        transcript.last().unwrap().assistant.as_deref(),
        Some("Partly cloudy, 22°C.")
    );
    assert_eq!(harness.provider.streaming_request_count(), 1);
    assert_eq!(harness.provider.requests().len(), 2);
    assert_eq!(
        harness.stages(),
        [TurnStage::Generating, TurnStage::Verifying, TurnStage::Done]
    );
}

#[tokio::test]
async fn test_corrected_answer() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Par", "tly cloudy, 22°F."]),
        verdict(true, "temperature unit wrong"),
        PresetResponse::with_texts(["Partly cloudy, ", "22°C."]),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(
        answers,
        [
            "Par",
            "Partly cloudy, 22°F.",
            CORRECTION_PLACEHOLDER,
            "Partly cloudy, ",
            "Partly cloudy, 22°C.",
        ]
    );
    assert_eq!(
        harness.stages(),
        [
            TurnStage::Generating,
            TurnStage::Verifying,
            TurnStage::Correcting,
            TurnStage::Done,
        ]
    );

    let requests = harness.provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(harness.provider.streaming_request_count(), 2);
    let (first, correction) = (&requests[0], &requests[2]);
    assert_eq!(first.system_instruction, SYSTEM_INSTRUCTION);
    assert!(correction.system_instruction.starts_with(SYSTEM_INSTRUCTION));
    assert!(
        correction
            .system_instruction
            .contains("temperature unit wrong")
    );
    // Same messages, same tools.
    assert_eq!(correction.messages, first.messages);
    assert_eq!(correction.tools, first.tools);
}

#[tokio::test]
async fn test_generation_error() {
    let harness = Harness::new(vec![PresetResponse::rejected()]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers.len(), 1);
    assert!(answers[0].starts_with("Sorry, I encountered an error: "));
    assert!(answers[0].contains("request rejected"));
    // No verification.
    assert_eq!(harness.provider.requests().len(), 1);
    assert_eq!(harness.stages(), [TurnStage::Generating, TurnStage::Done]);
}

#[tokio::test]
async fn test_generation_error_after_partial_answer() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Partly", " cloudy"])
            .with_failure(PresetFailure::AfterEvents(1)),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0], "Partly");
    // The partial answer is replaced by the note, not appended to.
    assert!(answers[1].starts_with("Sorry, I encountered an error: "));
    assert!(answers[1].contains("connection reset"));
    assert_eq!(
        transcript.last().unwrap().assistant.as_deref(),
        Some(answers[1].as_str())
    );
    assert_eq!(harness.provider.requests().len(), 1);
    assert_eq!(harness.stages(), [TurnStage::Generating, TurnStage::Done]);
}

#[tokio::test]
async fn test_correction_error() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Partly cloudy, 22°F."]),
        verdict(true, "temperature unit wrong"),
        PresetResponse::rejected(),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[1], CORRECTION_PLACEHOLDER);
    let expected_prefix =
        format!("{CORRECTION_PLACEHOLDER}\n\nSorry, I encountered an error: ");
    assert!(answers[2].starts_with(&expected_prefix));
    assert_eq!(harness.provider.requests().len(), 3);
}

#[tokio::test]
async fn test_no_answer_skips_verification() {
    let harness = Harness::new(vec![PresetResponse::with_events([
        PresetEvent::FlatText(String::new()),
    ])]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert!(answers.is_empty());
    assert_eq!(transcript.last().unwrap().assistant, None);
    assert_eq!(harness.provider.requests().len(), 1);
}

#[tokio::test]
async fn test_exchange_without_question_skips_verification() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Anything else?"]),
        verdict(true, "should not be asked"),
    ]);
    let mut transcript = Transcript::from_exchanges(vec![
        Exchange::resolved("Hi", "Hello!"),
        Exchange {
            user: None,
            assistant: None,
        },
    ]);

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers, ["Anything else?"]);
    assert_eq!(harness.provider.requests().len(), 1);
    assert_eq!(harness.stages(), [TurnStage::Generating, TurnStage::Done]);
}

#[tokio::test]
async fn test_failed_verification_keeps_answer() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["Sunny."]),
        PresetResponse::with_texts(["not json"]),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    assert_eq!(answers, ["Sunny."]);
    assert_eq!(harness.provider.streaming_request_count(), 1);
}

#[tokio::test]
async fn test_history_window() {
    let harness = Harness::with_max_history(
        vec![
            PresetResponse::with_texts(["Sure."]),
            verdict(false, ""),
        ],
        10,
    );
    let mut transcript = Transcript::default();
    for idx in 0..12 {
        transcript.push(Exchange::resolved(
            format!("question {idx}"),
            format!("answer {idx}"),
        ));
    }
    transcript.push_user("One more question");

    harness.run(&mut transcript).await;
    let requests = harness.provider.requests();
    let messages = &requests[0].messages;
    assert_eq!(messages.len(), 19);
    assert_eq!(messages[0], ModelMessage::User("question 3".to_owned()));
    assert_eq!(
        messages[18],
        ModelMessage::User("One more question".to_owned())
    );
    // The earlier exchanges stay untouched.
    assert_eq!(
        transcript.exchanges()[11],
        Exchange::resolved("question 11", "answer 11")
    );
}

#[tokio::test]
async fn test_answers_grow_within_a_phase() {
    let harness = Harness::new(vec![
        PresetResponse::with_texts(["It", " will", " rain", "."]),
        verdict(true, "it will not rain"),
        PresetResponse::with_texts(["Sunny", " all", " day."]),
    ]);
    let mut transcript = paris_weather();

    let answers = harness.run(&mut transcript).await;
    let boundary = answers
        .iter()
        .position(|answer| answer == CORRECTION_PLACEHOLDER)
        .unwrap();
    for phase in [&answers[..boundary], &answers[boundary + 1..]] {
        for pair in phase.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }
    }
}
