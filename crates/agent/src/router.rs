use std::sync::Arc;

use cloudpilot_core::domain::capability::ResolvedInvocation;
use cloudpilot_core::domain::conversation::ConversationTurn;
use cloudpilot_core::errors::{CapabilityError, ReasoningError};
use tracing::info;

use crate::llm::{ProviderDecision, ReasoningProvider};
use crate::tools::CapabilityRegistry;

#[derive(Clone, Debug, PartialEq)]
pub enum RouteDecision {
    DirectReply(String),
    Invoke(ResolvedInvocation),
}

/// Picks zero or one capability for the latest turn.
///
/// Registry and schema failures never leave this type: a hallucinated name or
/// a partially bound parameter set becomes a clarifying `DirectReply`.
pub struct IntentRouter {
    registry: Arc<CapabilityRegistry>,
    reasoner: Arc<dyn ReasoningProvider>,
}

impl IntentRouter {
    pub fn new(registry: Arc<CapabilityRegistry>, reasoner: Arc<dyn ReasoningProvider>) -> Self {
        Self { registry, reasoner }
    }

    pub async fn select(
        &self,
        history: &[ConversationTurn],
        correlation_id: &str,
    ) -> Result<RouteDecision, ReasoningError> {
        let decision = self.reasoner.classify(history, self.registry.all()).await?;

        let (capability_name, raw_parameters) = match decision {
            ProviderDecision::DirectReply(text) => return Ok(RouteDecision::DirectReply(text)),
            ProviderDecision::Invoke { capability_name, raw_parameters } => {
                (capability_name, raw_parameters)
            }
        };

        let bound = self
            .registry
            .lookup(&capability_name)
            .and_then(|descriptor| descriptor.bind(&raw_parameters));

        match bound {
            Ok(invocation) => {
                info!(
                    event_name = "agent.router.selected",
                    correlation_id,
                    capability = %invocation.capability,
                    "router selected capability"
                );
                Ok(RouteDecision::Invoke(invocation))
            }
            Err(error) => {
                info!(
                    event_name = "agent.router.clarify",
                    correlation_id,
                    capability = %capability_name,
                    error_kind = %error.kind(),
                    "router resolved selection failure into clarification"
                );
                Ok(RouteDecision::DirectReply(self.clarification(&error)))
            }
        }
    }

    fn clarification(&self, error: &CapabilityError) -> String {
        match error {
            CapabilityError::UnknownCapability(name) => format!(
                "I don't have an operation called `{name}`. I can run: {}.",
                self.registry.names().join(", ")
            ),
            CapabilityError::MissingParameter { capability, missing } => {
                let fields = missing.iter().map(|name| format!("`{name}`")).collect::<Vec<_>>();
                format!(
                    "To run `{capability}` I still need {}. Could you provide {}?",
                    fields.join(", "),
                    if fields.len() == 1 { "it" } else { "them" }
                )
            }
            CapabilityError::InvalidParameter { capability, parameter, expected } => format!(
                "The `{parameter}` value for `{capability}` must be {expected}. Could you restate it?"
            ),
        }
    }
}
