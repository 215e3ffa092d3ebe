use std::time::Duration;

use async_trait::async_trait;
use cloudpilot_core::config::LlmConfig;
use cloudpilot_core::domain::capability::{
    CapabilityDescriptor, CapabilityId, RawParameters, ResolvedInvocation,
};
use cloudpilot_core::domain::conversation::{ConversationTurn, Role};
use cloudpilot_core::domain::turn::ExecutionOutcome;
use cloudpilot_core::errors::ReasoningError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const SYSTEM_PROMPT: &str = "You are CloudPilot, an AI assistant specialized in AWS cloud operations. \
You can help with AWS infrastructure management, security best practices, and resource optimization.";

pub const CREDENTIALS_REQUEST_MESSAGE: &str = "I'll need your AWS credentials to perform this operation. \
Don't worry - your credentials will be used securely and only for this specific task. \
Please provide them in the prompt.";

/// What a reasoning provider proposes for a turn, before registry checks.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderDecision {
    DirectReply(String),
    Invoke { capability_name: String, raw_parameters: RawParameters },
}

/// Result of the pipeline that the synthesizer turns into prose.
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisOutcome {
    DirectReply(String),
    CredentialsRequired { capability: CapabilityId },
    Refused { capability: CapabilityId, reason: String },
    Executed { capability: CapabilityId, outcome: ExecutionOutcome, warning: Option<String> },
}

impl SynthesisOutcome {
    /// Deterministic rendering; used by the offline reasoner and when synthesis fails.
    pub fn describe(&self) -> String {
        match self {
            Self::DirectReply(text) => text.clone(),
            Self::CredentialsRequired { .. } => CREDENTIALS_REQUEST_MESSAGE.to_string(),
            Self::Refused { capability, reason } => {
                format!("I can't run `{capability}` right now: {reason}")
            }
            Self::Executed { capability, outcome, warning } => {
                let mut text = match outcome {
                    ExecutionOutcome::Success { result } => {
                        let rendered = serde_json::to_string_pretty(result)
                            .unwrap_or_else(|_| result.to_string());
                        format!("Successfully executed `{capability}`.\n{rendered}")
                    }
                    ExecutionOutcome::Failure { kind, detail } => format!(
                        "The `{capability}` operation failed ({kind}): {detail}. \
                         It was not retried; tell me if you want to try again."
                    ),
                };
                if let Some(warning) = warning {
                    text.push_str(&format!("\n\nWarning: {warning}"));
                }
                text
            }
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Executed { warning: Some(warning), .. } => Some(warning),
            _ => None,
        }
    }
}

pub struct SynthesisContext<'a> {
    pub history: &'a [ConversationTurn],
    pub request: &'a str,
    pub outcome: &'a SynthesisOutcome,
}

#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn classify(
        &self,
        history: &[ConversationTurn],
        catalog: &[CapabilityDescriptor],
    ) -> Result<ProviderDecision, ReasoningError>;

    /// Optional warning about a mutating invocation about to run.
    async fn advise(&self, invocation: &ResolvedInvocation)
        -> Result<Option<String>, ReasoningError>;

    async fn synthesize(&self, context: SynthesisContext<'_>) -> Result<String, ReasoningError>;
}

/// Reasoning provider backed by an OpenAI-compatible `/chat/completions` API.
pub struct OpenAiCompatibleReasoner {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl std::fmt::Debug for OpenAiCompatibleReasoner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleReasoner")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// HTTPS everywhere; plain HTTP only for a local model server.
pub fn validate_base_url(base_url: &str) -> Result<(), String> {
    let parsed = reqwest::Url::parse(base_url)
        .map_err(|error| format!("invalid base_url `{base_url}`: {error}"))?;
    let host = parsed.host_str().unwrap_or("");

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1") => Ok(()),
        "http" => Err(format!(
            "plain http is only allowed for localhost model servers (base_url `{base_url}`)"
        )),
        scheme => Err(format!("unsupported url scheme `{scheme}` in base_url `{base_url}`")),
    }
}

impl OpenAiCompatibleReasoner {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ReasoningError> {
        let base_url = config.effective_base_url().ok_or_else(|| {
            ReasoningError::Unavailable("no base url configured for llm provider".to_string())
        })?;
        Self::new(&base_url, config.api_key.clone(), &config.model, config.timeout_secs)
            .map(|reasoner| reasoner.with_max_retries(config.max_retries))
    }

    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, ReasoningError> {
        validate_base_url(base_url).map_err(ReasoningError::Rejected)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| ReasoningError::Unavailable(format!("http client: {error}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_retries: 0,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn chat(&self, messages: Vec<Value>, tools: Vec<Value>) -> Result<Value, ReasoningError> {
        let mut body = json!({ "model": self.model, "messages": messages });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        let mut attempt = 0;
        loop {
            match self.chat_once(&body).await {
                Err(ReasoningError::Unavailable(detail)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.reasoning.retry",
                        attempt,
                        detail = %detail,
                        "reasoning provider unavailable, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn chat_once(&self, body: &Value) -> Result<Value, ReasoningError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(event_name = "agent.reasoning.request", model = %self.model, url = %url);

        let mut request = self.client.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| ReasoningError::Unavailable(error.to_string()))?;
        let status = response.status();
        let text =
            response.text().await.map_err(|error| ReasoningError::Unavailable(error.to_string()))?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ReasoningError::Unavailable(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(ReasoningError::Rejected(format!("status {status}: {}", truncate(&text))));
        }

        serde_json::from_str(&text)
            .map_err(|error| ReasoningError::MalformedResponse(format!("invalid json: {error}")))
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiCompatibleReasoner {
    async fn classify(
        &self,
        history: &[ConversationTurn],
        catalog: &[CapabilityDescriptor],
    ) -> Result<ProviderDecision, ReasoningError> {
        let tools = catalog.iter().map(CapabilityDescriptor::tool_schema).collect();
        let response = self.chat(chat_messages(history), tools).await?;
        parse_classification(&response)
    }

    async fn advise(
        &self,
        invocation: &ResolvedInvocation,
    ) -> Result<Option<String>, ReasoningError> {
        let operation = json!({
            "capability": invocation.capability,
            "service": invocation.service(),
            "parameters": invocation.parameters,
        });
        let prompt = format!(
            "Please analyze this AWS operation for potential security issues and best practices.\n\n\
             Operation: {operation}\n\n\
             Respond only with JSON of the form \
             {{\"is_valid\": boolean, \"security_concerns\": [string], \"recommendation\": string}}. \
             Flag overly broad permission grants such as wildcard actions or resources and \
             administrator-equivalent policies."
        );
        let messages = vec![
            json!({ "role": "system", "content": SYSTEM_PROMPT }),
            json!({ "role": "user", "content": prompt }),
        ];

        let response = self.chat(messages, Vec::new()).await?;
        parse_advice(&completion_text(&response)?)
    }

    async fn synthesize(&self, context: SynthesisContext<'_>) -> Result<String, ReasoningError> {
        if let SynthesisOutcome::DirectReply(text) = context.outcome {
            return Ok(text.clone());
        }

        let mut messages = chat_messages(context.history);
        messages.push(json!({
            "role": "system",
            "content": format!(
                "The user asked: {}\nOutcome of the requested operation:\n{}\n\
                 Explain this outcome to the user in plain language. Do not invent results.",
                context.request,
                context.outcome.describe()
            ),
        }));

        let response = self.chat(messages, Vec::new()).await?;
        completion_text(&response)
    }
}

fn chat_messages(history: &[ConversationTurn]) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !history.iter().any(|turn| turn.role() == Role::System) {
        messages.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
    }
    messages.extend(
        history
            .iter()
            .map(|turn| json!({ "role": turn.role().as_str(), "content": turn.content() })),
    );
    messages
}

/// Reads a `/chat/completions` response as either a tool call or a direct reply.
pub fn parse_classification(response: &Value) -> Result<ProviderDecision, ReasoningError> {
    let message = response["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .ok_or_else(|| ReasoningError::MalformedResponse("no choices in response".to_string()))?;

    if let Some(tool_calls) = message["tool_calls"].as_array().filter(|calls| !calls.is_empty()) {
        if tool_calls.len() > 1 {
            warn!(
                event_name = "agent.reasoning.extra_tool_calls",
                count = tool_calls.len(),
                "provider proposed more than one tool call; only the first is considered"
            );
        }
        let function = &tool_calls[0]["function"];
        let capability_name = function["name"]
            .as_str()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ReasoningError::MalformedResponse("tool call without name".to_string()))?
            .to_string();

        let raw_parameters = match &function["arguments"] {
            Value::String(arguments) if arguments.trim().is_empty() => RawParameters::new(),
            Value::String(arguments) => match serde_json::from_str::<Value>(arguments) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(ReasoningError::MalformedResponse(format!(
                        "tool call arguments for `{capability_name}` are not a JSON object"
                    )))
                }
            },
            Value::Object(map) => map.clone(),
            Value::Null => RawParameters::new(),
            _ => {
                return Err(ReasoningError::MalformedResponse(format!(
                    "tool call arguments for `{capability_name}` are not a JSON object"
                )))
            }
        };

        return Ok(ProviderDecision::Invoke { capability_name, raw_parameters });
    }

    match message["content"].as_str().map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => Ok(ProviderDecision::DirectReply(text.to_string())),
        None => Err(ReasoningError::MalformedResponse(
            "response has neither content nor tool calls".to_string(),
        )),
    }
}

pub fn completion_text(response: &Value) -> Result<String, ReasoningError> {
    response["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReasoningError::MalformedResponse("empty completion".to_string()))
}

/// Turns the advisor's JSON verdict into a single warning string, if any.
pub fn parse_advice(text: &str) -> Result<Option<String>, ReasoningError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json_slice = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(ReasoningError::MalformedResponse("advice is not JSON".to_string())),
    };
    let verdict: Value = serde_json::from_str(json_slice)
        .map_err(|error| ReasoningError::MalformedResponse(format!("advice json: {error}")))?;

    let concerns = verdict["security_concerns"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if concerns.is_empty() {
        return Ok(None);
    }
    Ok(Some(concerns.join("; ")))
}

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(500);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
