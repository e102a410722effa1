use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use travel_assistant_model::{ModelMessage, ModelRequest, ModelTool};

/// Prefix of tool call ids made up locally for calls the server sent
/// without an id. Those ids are never sent back to the server.
pub const LOCAL_CALL_ID_PREFIX: &str = "local-call:";

// -------------------------------------
// Types exchanged in both directions
// -------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Whether this part is nothing but answer text, so that it can be
    /// merged with its neighbours.
    #[inline]
    pub fn is_plain_text(&self) -> bool {
        self.text.is_some()
            && self.thought.is_none()
            && self.thought_signature.is_none()
            && self.function_call.is_none()
            && self.function_response.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub response_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters_json_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_json_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

// -----------
// Conversions
// -----------

pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    let system_instruction = if req.system_instruction.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![Part::text(&req.system_instruction)],
        })
    };
    let tools = if req.tools.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations: req.tools.iter().map(create_tool).collect(),
        }]
    };
    let generation_config =
        req.response_schema.as_ref().map(|schema| GenerationConfig {
            response_mime_type: "application/json",
            response_json_schema: schema.clone(),
        });

    GenerateContentRequest {
        contents: create_contents(&req.messages),
        system_instruction,
        tools,
        generation_config,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PartGroup {
    FunctionCalls,
    FunctionResponses,
}

fn create_contents(messages: &[ModelMessage]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::with_capacity(messages.len());
    let mut last_group = None;

    for msg in messages {
        let (role, part, group) = match msg {
            ModelMessage::User(text) => ("user", Part::text(text), None),
            ModelMessage::Model(text) => ("model", Part::text(text), None),
            ModelMessage::ToolCall(call) => {
                let part = Part {
                    function_call: Some(FunctionCall {
                        id: remote_call_id(&call.id),
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    ..Default::default()
                };
                ("model", part, Some(PartGroup::FunctionCalls))
            }
            ModelMessage::ToolResult(result) => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        id: remote_call_id(&result.id),
                        name: result.name.clone(),
                        response: as_object(&result.content),
                    }),
                    ..Default::default()
                };
                ("user", part, Some(PartGroup::FunctionResponses))
            }
            ModelMessage::Opaque(opaque) => {
                last_group = None;
                // Opaque messages from this provider always hold `Content`.
                match opaque.to_raw::<Content>() {
                    Some(content) => contents.push(content.clone()),
                    None => warn!("dropping a foreign opaque message: {opaque:?}"),
                }
                continue;
            }
        };

        // Parallel calls and their results must be sent as a single turn.
        let merge = group.is_some() && group == last_group;
        last_group = group;
        match contents.last_mut() {
            Some(last) if merge => last.parts.push(part),
            _ => contents.push(Content {
                role: Some(role.to_owned()),
                parts: vec![part],
            }),
        }
    }
    contents
}

#[inline]
fn remote_call_id(id: &str) -> Option<String> {
    if id.starts_with(LOCAL_CALL_ID_PREFIX) {
        None
    } else {
        Some(id.to_owned())
    }
}

#[inline]
fn as_object(value: &Value) -> Value {
    if value.is_object() {
        value.clone()
    } else {
        json!({ "output": value })
    }
}

fn create_tool(tool: &ModelTool) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.trim().to_owned(),
        parameters_json_schema: strip_meta_schema(&tool.parameters),
    }
}

/// The server rejects the `$schema` keyword that schema generators emit.
fn strip_meta_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "$schema")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Map<_, _>>(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use travel_assistant_model::{
        OpaqueMessage, ToolCallRequest, ToolCallResult,
    };

    use super::*;

    fn request_with(messages: Vec<ModelMessage>) -> ModelRequest {
        ModelRequest {
            model: "gemini-2.5-flash".to_owned(),
            system_instruction: String::new(),
            messages,
            tools: vec![],
            response_schema: None,
            stream: true,
        }
    }

    #[test]
    fn test_create_request() {
        let mut request = request_with(vec![
            ModelMessage::User("Weather in Paris?".to_owned()),
            ModelMessage::Model("Sunny.".to_owned()),
            ModelMessage::User("And tomorrow?".to_owned()),
        ]);
        request.system_instruction = "You are a travel assistant.".to_owned();
        request.tools = vec![ModelTool {
            name: "get_currency_exchange".to_owned(),
            description: "\nConverts currencies.\n".to_owned(),
            parameters: json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "type": "object",
                "properties": { "amount": { "type": "number" } }
            }),
        }];

        let body = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "Weather in Paris?" }] },
                    { "role": "model", "parts": [{ "text": "Sunny." }] },
                    { "role": "user", "parts": [{ "text": "And tomorrow?" }] }
                ],
                "systemInstruction": {
                    "parts": [{ "text": "You are a travel assistant." }]
                },
                "tools": [{
                    "functionDeclarations": [{
                        "name": "get_currency_exchange",
                        "description": "Converts currencies.",
                        "parametersJsonSchema": {
                            "type": "object",
                            "properties": { "amount": { "type": "number" } }
                        }
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_structured_output_request() {
        let mut request =
            request_with(vec![ModelMessage::User("Review this".to_owned())]);
        request.response_schema = Some(json!({ "type": "object" }));

        let body = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            body["generationConfig"],
            json!({
                "responseMimeType": "application/json",
                "responseJsonSchema": { "type": "object" }
            })
        );
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_round_trip_contents() {
        let model_turn = Content {
            role: Some("model".to_owned()),
            parts: vec![Part {
                function_call: Some(FunctionCall {
                    id: None,
                    name: "get_currency_exchange".to_owned(),
                    args: json!({ "from_currency": "USD" }),
                }),
                thought_signature: Some("c2ln".to_owned()),
                ..Default::default()
            }],
        };
        let request = request_with(vec![
            ModelMessage::User("Convert 10 USD".to_owned()),
            ModelMessage::Opaque(OpaqueMessage::new("turn:0", model_turn)),
            ModelMessage::ToolResult(ToolCallResult {
                id: format!("{LOCAL_CALL_ID_PREFIX}0"),
                name: "get_currency_exchange".to_owned(),
                content: json!({ "error": "Currency 'XXX' not found" }),
            }),
            ModelMessage::ToolResult(ToolCallResult {
                id: "call-7".to_owned(),
                name: "get_destination_weather_forecast".to_owned(),
                content: json!("plain"),
            }),
        ]);

        let body = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            body["contents"][1],
            json!({
                "role": "model",
                "parts": [{
                    "thoughtSignature": "c2ln",
                    "functionCall": {
                        "name": "get_currency_exchange",
                        "args": { "from_currency": "USD" }
                    }
                }]
            })
        );
        assert_eq!(
            body["contents"][2],
            json!({
                "role": "user",
                "parts": [
                    { "functionResponse": {
                        "name": "get_currency_exchange",
                        "response": { "error": "Currency 'XXX' not found" }
                    } },
                    { "functionResponse": {
                        "id": "call-7",
                        "name": "get_destination_weather_forecast",
                        "response": { "output": "plain" }
                    } }
                ]
            })
        );
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_fallback_tool_calls_are_grouped() {
        let call = |id: &str| {
            ModelMessage::ToolCall(ToolCallRequest {
                id: id.to_owned(),
                name: "get_local_attractions_opentripmap".to_owned(),
                arguments: json!({ "destination": "Rome" }),
            })
        };
        let request = request_with(vec![
            ModelMessage::User("Museums and parks in Rome?".to_owned()),
            call("a"),
            call("b"),
        ]);

        let body = serde_json::to_value(create_request(&request)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(contents[1]["parts"][1]["functionCall"]["id"], "b");
    }
}
