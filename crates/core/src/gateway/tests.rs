use std::future::ready;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use travel_assistant_model::{
    ErrorKind, ModelMessage, ToolCallRequest, ToolCallResult,
};
use travel_assistant_test_model::{
    PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
};

use super::*;
use crate::tool::{Error as ToolError, ToolResult};

#[derive(Deserialize)]
struct ExchangeInput {
    from_currency: String,
    to_currency: String,
    amount: f64,
}

struct FakeExchangeTool(Value);

impl Tool for FakeExchangeTool {
    type Input = ExchangeInput;

    fn name(&self) -> &str {
        "get_currency_exchange"
    }

    fn description(&self) -> &str {
        "Converts an amount between two currencies"
    }

    fn parameter_schema(&self) -> &Value {
        &self.0
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let result = if input.to_currency == "EUR" {
            Ok(json!({
                "from": input.from_currency,
                "to": input.to_currency,
                "converted_amount": input.amount * 0.5,
            }))
        } else {
            Err(ToolError::not_found()
                .with_reason(format!("Currency '{}' not found", input.to_currency)))
        };
        ready(result)
    }
}

fn exchange_call(id: &str, to_currency: &str) -> PresetEvent {
    PresetEvent::ToolCall(ToolCallRequest {
        id: id.to_owned(),
        name: "get_currency_exchange".to_owned(),
        arguments: json!({
            "from_currency": "USD",
            "to_currency": to_currency,
            "amount": 10.0,
        }),
    })
}

fn gateway_with(provider: TestModelProvider) -> Gateway {
    GatewayBuilder::with_model_provider(provider)
        .with_tool(FakeExchangeTool(json!({ "type": "object" })))
        .build()
}

fn user_messages(text: &str) -> Vec<ModelMessage> {
    vec![ModelMessage::User(text.to_owned())]
}

async fn collect_text(
    stream: impl Stream<Item = Result<ResponseChunk, GatewayError>>,
) -> Result<String, GatewayError> {
    let mut stream = pin!(stream);
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?.text().unwrap_or_default());
    }
    Ok(text)
}

#[tokio::test]
async fn test_stream_without_tools() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        PresetEvent::Text("Par".to_owned()),
        PresetEvent::Chunk(ResponseChunk::Flat { text: None }),
        PresetEvent::FlatText("tly cloudy.".to_owned()),
    ]));
    let gateway = gateway_with(provider.clone());

    let config = GenerationConfig::new("Be brief.").with_tools();
    let stream = gateway.generate_stream(
        "gemini-2.5-flash",
        &config,
        &user_messages("Weather in Paris?"),
    );
    assert_eq!(collect_text(stream).await.unwrap(), "Partly cloudy.");

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "gemini-2.5-flash");
    assert_eq!(requests[0].system_instruction, "Be brief.");
    assert_eq!(requests[0].tools.len(), 1);
    assert!(requests[0].stream);
}

#[tokio::test]
async fn test_tool_loop() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        PresetEvent::Text("Let me check. ".to_owned()),
        exchange_call("call:1", "EUR"),
        exchange_call("call:2", "XXX"),
    ]));
    provider.add_response(PresetResponse::with_texts([
        "10 USD is 5 EUR. ",
        "I couldn't find the currency XXX.",
    ]));
    let gateway = gateway_with(provider.clone());

    let config = GenerationConfig::new("Be brief.").with_tools();
    let stream = gateway.generate_stream(
        "gemini-2.5-flash",
        &config,
        &user_messages("Convert 10 USD to EUR and XXX"),
    );
    assert_eq!(
        collect_text(stream).await.unwrap(),
        "Let me check. 10 USD is 5 EUR. I couldn't find the currency XXX."
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let messages = &requests[1].messages;
    assert_eq!(messages.len(), 4);
    assert!(matches!(&messages[1], ModelMessage::Opaque(msg) if msg.id() == "turn:0"));
    assert_eq!(
        messages[2],
        ModelMessage::ToolResult(ToolCallResult {
            id: "call:1".to_owned(),
            name: "get_currency_exchange".to_owned(),
            content: json!({
                "from": "USD",
                "to": "EUR",
                "converted_amount": 5.0,
            }),
        })
    );
    let ModelMessage::ToolResult(result) = &messages[3] else {
        panic!("expected a tool result, got {:?}", messages[3]);
    };
    assert_eq!(result.content, json!({ "error": "Currency 'XXX' not found" }));
}

#[tokio::test]
async fn test_too_many_tool_rounds() {
    let mut provider = TestModelProvider::default();
    for idx in 0..3 {
        provider.add_response(PresetResponse::with_events([exchange_call(
            &format!("call:{idx}"),
            "EUR",
        )]));
    }
    let gateway = GatewayBuilder::with_model_provider(provider.clone())
        .with_tool(FakeExchangeTool(json!({ "type": "object" })))
        .with_max_tool_rounds(1)
        .build();

    let config = GenerationConfig::new("").with_tools();
    let stream =
        gateway.generate_stream("gemini-2.5-flash", &config, &user_messages("Hi"));
    let err = collect_text(stream).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn test_generate() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_texts([
        "{\"needs_correction\": ",
        "false, \"feedback\": \"\"}",
    ]));
    let gateway = gateway_with(provider.clone());

    let config = GenerationConfig::new("You are a verifier.")
        .with_response_schema(json!({ "type": "object" }));
    let text = gateway
        .generate("gemini-2.5-pro", &config, &user_messages("Review this"))
        .await
        .unwrap();
    assert_eq!(text, "{\"needs_correction\": false, \"feedback\": \"\"}");

    let requests = provider.requests();
    assert!(!requests[0].stream);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[0].response_schema, Some(json!({ "type": "object" })));
}

#[tokio::test]
async fn test_provider_errors() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::rejected());
    provider.add_response(
        PresetResponse::with_texts(["Partly", " cloudy"])
            .with_failure(PresetFailure::AfterEvents(1)),
    );
    let gateway = gateway_with(provider);
    let config = GenerationConfig::new("").with_tools();

    let err = gateway
        .generate("gemini-2.5-flash", &config, &user_messages("Hi"))
        .await
        .unwrap_err();
    assert!(err.message().contains("request rejected"));

    let mut stream = pin!(gateway.generate_stream(
        "gemini-2.5-flash",
        &config,
        &user_messages("Hi"),
    ));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text().as_deref(), Some("Partly"));
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
}
