use super::{Orchestrator, TurnStage};
use crate::gateway::{Gateway, GenerationConfig};
use crate::history::DEFAULT_MAX_EXCHANGES;
use crate::verifier::Verifier;

/// The model that answers the user by default.
pub const DEFAULT_TRAVELER_MODEL: &str = "gemini-2.5-flash";

/// The model that reviews the answers by default.
pub const DEFAULT_VERIFIER_MODEL: &str = "gemini-2.5-pro";

/// The default template of the system instruction used for corrections.
///
/// `{{SYSTEM_PROMPT}}` is replaced with the normal system instruction and
/// `{{FEEDBACK}}` with the reviewer's feedback.
pub const DEFAULT_CORRECTION_TEMPLATE: &str = "{{SYSTEM_PROMPT}}

A reviewer checked your previous answer to the user question and gave the \
following feedback:
{{FEEDBACK}}

Provide a corrected answer that addresses these issues.";

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder {
    gateway: Gateway,
    traveler_model: String,
    verifier_model: String,
    system_instruction: String,
    verifier_instruction: String,
    correction_template: String,
    max_history: usize,
    on_stage: Option<Box<dyn Fn(TurnStage) + Send + Sync>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the gateway shared by both models.
    #[inline]
    pub fn with_gateway(gateway: Gateway) -> Self {
        Self {
            gateway,
            traveler_model: DEFAULT_TRAVELER_MODEL.to_owned(),
            verifier_model: DEFAULT_VERIFIER_MODEL.to_owned(),
            system_instruction: String::new(),
            verifier_instruction: String::new(),
            correction_template: DEFAULT_CORRECTION_TEMPLATE.to_owned(),
            max_history: DEFAULT_MAX_EXCHANGES,
            on_stage: None,
        }
    }

    /// Sets the model that answers the user.
    #[inline]
    pub fn with_traveler_model<S: Into<String>>(mut self, model: S) -> Self {
        self.traveler_model = model.into();
        self
    }

    /// Sets the model that reviews the answers.
    #[inline]
    pub fn with_verifier_model<S: Into<String>>(mut self, model: S) -> Self {
        self.verifier_model = model.into();
        self
    }

    /// Sets the system instruction for answering.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Sets the system instruction for reviewing.
    #[inline]
    pub fn with_verifier_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.verifier_instruction = instruction.into();
        self
    }

    /// Sets the template of the correction system instruction, see
    /// [`DEFAULT_CORRECTION_TEMPLATE`].
    #[inline]
    pub fn with_correction_template<S: Into<String>>(
        mut self,
        template: S,
    ) -> Self {
        self.correction_template = template.into();
        self
    }

    /// Sets how many recent exchanges are sent to the model.
    #[inline]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
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

    /// Builds the orchestrator.
    pub fn build(self) -> Orchestrator {
        let Self {
            gateway,
            traveler_model,
            verifier_model,
            system_instruction,
            verifier_instruction,
            correction_template,
            max_history,
            on_stage,
        } = self;

        let verifier =
            Verifier::new(gateway.clone(), verifier_model, verifier_instruction);
        Orchestrator {
            gateway,
            verifier,
            traveler_model,
            normal_config: GenerationConfig::new(system_instruction).with_tools(),
            correction_template,
            max_history,
            on_stage,
        }
    }
}
