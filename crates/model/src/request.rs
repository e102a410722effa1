use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpaqueMessage;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// Name of the model that should serve this request.
    pub model: String,
    /// The system instructions, empty if there are none.
    pub system_instruction: String,
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
    /// If set, the model is asked to produce JSON that conforms to this
    /// schema instead of free-form text.
    pub response_schema: Option<Value>,
    /// Whether the response should be streamed incrementally.
    ///
    /// Providers that don't distinguish between the two modes may ignore
    /// this flag, the response is always consumed as a sequence of events.
    pub stream: bool,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// A user input text.
    User(String),
    /// A text produced by the model.
    Model(String),
    /// A tool call the model asked for.
    ///
    /// Only used when the provider can't supply an [`OpaqueMessage`]
    /// for the turn that contained the call.
    ToolCall(ToolCallRequest),
    /// A tool call result.
    ToolResult(ToolCallResult),
    /// An opaque message (usually a model turn recorded by the provider).
    Opaque(OpaqueMessage),
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments object to pass to the function.
    pub arguments: Value,
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// Name of the tool that produced this result.
    pub name: String,
    /// The payload returned by the tool, always a JSON object.
    pub content: Value,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
