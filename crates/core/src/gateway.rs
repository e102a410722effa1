//! The model gateway, which runs the tool call loop on top of a model
//! provider.

#[cfg(test)]
mod tests;

use std::fmt::{self, Display};
use std::pin::pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use travel_assistant_model::{
    ErrorKind, ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponseEvent, ResponseChunk,
};

use crate::model_client::{BoxedProviderError, ModelClient};
use crate::tool::{AnyTool, Executor as ToolExecutor, Tool, ToolObject};

/// The number of tool call rounds a single generation may take by default.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Describes a failed generation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
}

impl GatewayError {
    fn from_provider(err: BoxedProviderError) -> Self {
        Self {
            kind: err.kind(),
            message: format!("{err}"),
        }
    }

    fn too_many_tool_rounds(max_rounds: usize) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: format!(
                "the model kept calling tools after {max_rounds} rounds"
            ),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GatewayError {}

/// How a generation should be configured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationConfig {
    /// The system instruction.
    pub system_instruction: String,
    /// Whether the registered tools are offered to the model.
    pub use_tools: bool,
    /// If set, the model answers with JSON conforming to this schema.
    pub response_schema: Option<Value>,
}

impl GenerationConfig {
    /// Creates a configuration with the given system instruction, no tools
    /// and free-form output.
    #[inline]
    pub fn new<S: Into<String>>(system_instruction: S) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            use_tools: false,
            response_schema: None,
        }
    }

    /// Offers the registered tools to the model.
    #[inline]
    pub fn with_tools(mut self) -> Self {
        self.use_tools = true;
        self
    }

    /// Asks the model for JSON output conforming to the schema.
    #[inline]
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// [`Gateway`] builder.
pub struct GatewayBuilder {
    model_client: ModelClient,
    tools: Vec<Box<dyn ToolObject>>,
    max_tool_rounds: usize,
}

impl GatewayBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            tools: vec![],
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Sets how many tool call rounds a single generation may take.
    #[inline]
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Builds the gateway.
    #[inline]
    pub fn build(self) -> Gateway {
        Gateway {
            model_client: self.model_client,
            tool_executor: Arc::new(ToolExecutor::with_tools(self.tools)),
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

/// A client of the model provider that owns the registered tools.
///
/// When the model asks for tools, the gateway runs them one by one, appends
/// the model turn and the results to the messages, and asks again. Text of
/// every round is passed through. Cloning is cheap, clones share the
/// provider and the tools.
#[derive(Clone)]
pub struct Gateway {
    model_client: ModelClient,
    tool_executor: Arc<ToolExecutor>,
    max_tool_rounds: usize,
}

impl Gateway {
    /// Generates a response incrementally.
    ///
    /// The returned stream is independent of `self` and the arguments. It
    /// ends after the first error.
    pub fn generate_stream(
        &self,
        model: &str,
        config: &GenerationConfig,
        messages: &[ModelMessage],
    ) -> impl Stream<Item = Result<ResponseChunk, GatewayError>> + Send + use<>
    {
        self.run(model, config, messages.to_vec(), true)
    }

    /// Generates a complete response and returns its text.
    pub async fn generate(
        &self,
        model: &str,
        config: &GenerationConfig,
        messages: &[ModelMessage],
    ) -> Result<String, GatewayError> {
        let mut chunks = pin!(self.run(model, config, messages.to_vec(), false));
        let mut text = String::new();
        while let Some(chunk) = chunks.next().await {
            if let Some(chunk_text) = chunk?.text() {
                text.push_str(&chunk_text);
            }
        }
        Ok(text)
    }

    fn run(
        &self,
        model: &str,
        config: &GenerationConfig,
        mut messages: Vec<ModelMessage>,
        stream: bool,
    ) -> impl Stream<Item = Result<ResponseChunk, GatewayError>> + Send + use<>
    {
        let model_client = self.model_client.clone();
        let tool_executor = Arc::clone(&self.tool_executor);
        let max_tool_rounds = self.max_tool_rounds;
        let tools = if config.use_tools {
            tool_executor.definitions()
        } else {
            vec![]
        };
        let model = model.to_owned();
        let system_instruction = config.system_instruction.clone();
        let response_schema = config.response_schema.clone();

        try_stream! {
            let mut round = 0;
            loop {
                let req = ModelRequest {
                    model: model.clone(),
                    system_instruction: system_instruction.clone(),
                    messages: messages.clone(),
                    tools: tools.clone(),
                    response_schema: response_schema.clone(),
                    stream,
                };
                debug!(%model, round, messages = req.messages.len(), "sending a request");
                let mut resp = model_client
                    .send_request(req)
                    .await
                    .map_err(GatewayError::from_provider)?;

                let mut tool_calls = vec![];
                while let Some(event) = resp
                    .next_event()
                    .await
                    .map_err(GatewayError::from_provider)?
                {
                    match event {
                        ModelResponseEvent::Chunk(chunk) => {
                            yield chunk;
                        }
                        ModelResponseEvent::ToolCall(call) => {
                            tool_calls.push(call);
                        }
                        ModelResponseEvent::Completed(reason) => {
                            trace!("model finished with {reason:?}");
                        }
                    }
                }
                if tool_calls.is_empty() {
                    break;
                }

                round += 1;
                if round > max_tool_rounds {
                    warn!("giving up after {max_tool_rounds} tool call rounds");
                    Err(GatewayError::too_many_tool_rounds(max_tool_rounds))?;
                }

                // Prefer the model turn recorded by the provider.
                match resp.make_opaque_message() {
                    Some(opaque_msg) => messages.push(ModelMessage::Opaque(opaque_msg)),
                    None => messages.extend(
                        tool_calls.iter().cloned().map(ModelMessage::ToolCall),
                    ),
                }
                for call in tool_calls {
                    let result = tool_executor.execute(call).await;
                    messages.push(ModelMessage::ToolResult(result));
                }
            }
        }
    }
}
