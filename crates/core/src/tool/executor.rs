use std::collections::HashMap;

use serde_json::json;
use tracing::Instrument;
use travel_assistant_model::{ModelTool, ToolCallRequest, ToolCallResult};

use crate::tool::ToolObject;

/// An executor that handles tool call requests from the model.
pub struct Executor {
    tools: HashMap<String, Box<dyn ToolObject>>,
    // Registration order, so that the declarations sent to the model are
    // stable across requests.
    order: Vec<String>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut tool_map = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name().to_owned();
            if tool_map.insert(name.clone(), tool).is_some() {
                warn!("tool registered twice: {name}");
                continue;
            }
            order.push(name);
        }
        Self {
            tools: tool_map,
            order,
        }
    }

    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Runs the requested tool.
    ///
    /// Never fails: unknown tools, bad arguments and tool errors are all
    /// turned into error payloads for the model.
    pub fn execute(
        &self,
        req: ToolCallRequest,
    ) -> impl Future<Output = ToolCallResult> + Send + 'static {
        let ToolCallRequest {
            id,
            name,
            arguments,
        } = req;
        let span = debug_span!("tool call", tool = %name, id = %id);
        let fut = self.tools.get(&name).map(|tool| {
            trace!("calling a tool ({id}) with args: {arguments:?}");
            tool.execute(arguments)
        });

        async move {
            let content = match fut {
                None => {
                    warn!("tool not found: {name}");
                    json!({ "error": format!("Unknown tool: {name}") })
                }
                Some(fut) => match fut.await {
                    Ok(content) => content,
                    Err(err) => {
                        debug!("tool failed: {err}");
                        err.to_payload()
                    }
                },
            };
            ToolCallResult { id, name, content }
        }
        .instrument(span)
    }
}
