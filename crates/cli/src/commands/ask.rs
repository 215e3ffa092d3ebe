use std::sync::Arc;

use cloudpilot_agent::{
    GuardrailPolicy, Orchestrator, RuleBasedReasoner, SandboxCloud, Session, TurnRequest,
};
use cloudpilot_core::config::{AppConfig, LoadOptions};
use cloudpilot_core::domain::conversation::Message;
use cloudpilot_core::domain::credentials::CredentialSet;

use super::CommandResult;

pub struct CredentialArgs {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
}

/// Runs a single turn offline and prints the resulting `TurnResult`.
pub fn run(message: &str, credentials: Option<CredentialArgs>) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_input", "message must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("ask", "config_validation", error.to_string(), 2)
        }
    };

    let credentials = credentials
        .map(|args| {
            let region = args.region.unwrap_or_else(|| config.cloud.default_region.clone());
            CredentialSet::new(args.access_key_id, args.secret_access_key, region)
        })
        .or_else(|| config.cloud.credentials());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(RuleBasedReasoner::new()),
        Arc::new(SandboxCloud::seeded()),
        GuardrailPolicy::from(&config.guardrails),
    );
    let mut session = Session::new("cli");
    let mut request = TurnRequest::new(vec![Message::user(message)]);
    if let Some(credentials) = credentials {
        request = request.with_credentials(credentials);
    }

    let result = runtime.block_on(orchestrator.submit(&mut session, request));
    let mut output = CommandResult::json("ask", &result);
    if result.error.is_some() && output.exit_code == 0 {
        output.exit_code = 1;
    }
    output
}
