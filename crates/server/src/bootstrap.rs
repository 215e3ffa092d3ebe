use std::sync::Arc;

use cloudpilot_agent::{
    GuardrailPolicy, OpenAiCompatibleReasoner, Orchestrator, ReasoningProvider, RuleBasedReasoner,
    SandboxCloud,
};
use cloudpilot_core::audit::{ActionOutcome, ActionRecord, AuditSink};
use cloudpilot_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions};
use cloudpilot_core::errors::ReasoningError;
use thiserror::Error;
use tracing::{info, warn};

use crate::sessions::{SessionLimits, SessionStore};

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SessionStore,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reasoning provider setup failed: {0}")]
    Reasoner(#[source] ReasoningError),
}

/// Forwards every action record to the structured log.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, session_id: &str, record: &ActionRecord) {
        match &record.outcome {
            ActionOutcome::Success => info!(
                event_name = "audit.action.recorded",
                session_id,
                record_id = %record.record_id,
                sequence = record.sequence,
                capability = %record.capability,
                outcome = "success",
                "action recorded"
            ),
            ActionOutcome::Failure { kind, .. } => warn!(
                event_name = "audit.action.recorded",
                session_id,
                record_id = %record.record_id,
                sequence = record.sequence,
                capability = %record.capability,
                outcome = "failure",
                error_kind = %kind,
                "action recorded"
            ),
        }
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = %config.llm.provider,
        "starting application bootstrap"
    );

    let reasoner = reasoner_for(&config)?;
    let orchestrator = Orchestrator::new(
        reasoner,
        Arc::new(SandboxCloud::seeded()),
        GuardrailPolicy::from(&config.guardrails),
    )
    .with_audit_sink(Arc::new(TracingAuditSink));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        capabilities = orchestrator.registry().len(),
        mutations_enabled = config.guardrails.mutations_enabled,
        "orchestrator initialized"
    );

    let sessions =
        SessionStore::new(config.cloud.credentials(), SessionLimits::from(&config.server));
    Ok(Application { config, orchestrator: Arc::new(orchestrator), sessions })
}

fn reasoner_for(config: &AppConfig) -> Result<Arc<dyn ReasoningProvider>, BootstrapError> {
    match config.llm.provider {
        LlmProvider::Rules => Ok(Arc::new(RuleBasedReasoner::new())),
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            let reasoner = OpenAiCompatibleReasoner::from_config(&config.llm)
                .map_err(BootstrapError::Reasoner)?;
            Ok(Arc::new(reasoner))
        }
    }
}

#[cfg(test)]
mod tests {
    use cloudpilot_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions { overrides, ..LoadOptions::default() }
    }

    #[tokio::test]
    async fn bootstrap_with_rule_based_reasoner_exposes_full_catalog() {
        let app = bootstrap(options(ConfigOverrides {
            llm_provider: Some(LlmProvider::Rules),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed offline");

        assert_eq!(app.orchestrator.registry().len(), 9);
        assert!(app.sessions.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_openai_key_is_missing() {
        let result = bootstrap(options(ConfigOverrides {
            llm_provider: Some(LlmProvider::OpenAi),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().expect("missing key should fail").to_string();
        assert!(message.contains("llm.api_key"));
    }
}
