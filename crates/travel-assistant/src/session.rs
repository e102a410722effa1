use futures_util::Stream;
use reqwest::Client;
use travel_assistant_core::tool::Tool;
use travel_assistant_core::{
    GatewayBuilder, Orchestrator, OrchestratorBuilder, Transcript, TurnStage,
};
use travel_assistant_model::ModelProvider;

use crate::config::AppConfig;
use crate::prompts::{
    CORRECTION_TEMPLATE, PromptMetadata, travel_instruction,
    verifier_instruction,
};
use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    gateway_builder: GatewayBuilder,
    traveler_model: Option<String>,
    verifier_model: Option<String>,
    max_history: Option<usize>,
    metadata: Option<PromptMetadata>,
    on_stage: Option<Box<dyn Fn(TurnStage) + Send + Sync>>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let gateway_builder = GatewayBuilder::with_model_provider(provider);
        Self {
            gateway_builder,
            traveler_model: None,
            verifier_model: None,
            max_history: None,
            metadata: None,
            on_stage: None,
        }
    }

    /// Adds a tool the assistant can use.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.gateway_builder = self.gateway_builder.with_tool(tool);
        self
    }

    /// Adds the weather, currency and attractions tools, with the API keys
    /// of the configuration.
    pub fn with_travel_tools(self, client: &Client, config: &AppConfig) -> Self {
        self.with_tool(WeatherTool::new(
            client.clone(),
            &config.openweather_api_key,
        ))
        .with_tool(CurrencyTool::new(
            client.clone(),
            &config.exchange_rate_api_key,
        ))
        .with_tool(AttractionsTool::new(
            client.clone(),
            &config.open_trip_map_api_key,
        ))
    }

    /// Applies the model and history settings of the configuration.
    pub fn with_app_config(mut self, config: &AppConfig) -> Self {
        self.traveler_model = Some(config.traveler_model.clone());
        self.verifier_model = Some(config.verifier_model.clone());
        self.max_history = Some(config.max_history);
        self
    }

    /// Sets the metadata the system instructions are completed with.
    #[inline]
    pub fn with_prompt_metadata(mut self, metadata: PromptMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attaches a callback to be invoked when a turn enters a new stage.
    #[inline]
    pub fn on_stage(
        mut self,
        on_stage: impl Fn(TurnStage) + Send + Sync + 'static,
    ) -> Self {
        self.on_stage = Some(Box::new(on_stage));
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let metadata = self.metadata.unwrap_or_else(|| {
            PromptMetadata::new(
                chrono::Local::now().naive_local(),
                Err("not fetched".to_owned()),
            )
        });

        let mut builder =
            OrchestratorBuilder::with_gateway(self.gateway_builder.build())
                .with_system_instruction(travel_instruction(&metadata))
                .with_verifier_instruction(verifier_instruction(&metadata))
                .with_correction_template(CORRECTION_TEMPLATE);
        if let Some(model) = self.traveler_model {
            builder = builder.with_traveler_model(model);
        }
        if let Some(model) = self.verifier_model {
            builder = builder.with_verifier_model(model);
        }
        if let Some(max_history) = self.max_history {
            builder = builder.with_max_history(max_history);
        }
        if let Some(on_stage) = self.on_stage {
            builder = builder.on_stage(on_stage);
        }

        Session {
            orchestrator: builder.build(),
            transcript: Transcript::default(),
        }
    }
}

/// A chat session with the travel assistant.
///
/// The session owns the conversation, and every message is answered in the
/// context of the earlier ones until the session is cleared.
pub struct Session {
    orchestrator: Orchestrator,
    transcript: Transcript,
}

impl Session {
    /// Sends a message to the session.
    ///
    /// The returned stream yields a snapshot of the conversation whenever
    /// the answer changes, see [`Orchestrator::handle_turn`]. An earlier
    /// turn that ended without an answer is kept with an empty one.
    pub fn send_message<'a>(
        &'a mut self,
        message: &str,
    ) -> impl Stream<Item = Transcript> + Send + 'a {
        self.transcript.push_user(message);
        self.orchestrator.handle_turn(&mut self.transcript)
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Forgets the conversation.
    #[inline]
    pub fn clear(&mut self) {
        self.transcript.clear();
    }
}
