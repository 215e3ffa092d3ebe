use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cloudpilot_core::config::{AppConfig, LoadOptions};
use toml::Value;

const REDACTED: &str = "<redacted>";
const UNSET: &str = "<unset>";

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let secret = |present: bool| (if present { REDACTED } else { UNSET }).to_string();
    let fields = vec![
        field("llm.provider", config.llm.provider.to_string(), &["CLOUDPILOT_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["CLOUDPILOT_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| UNSET.to_string()),
            &["CLOUDPILOT_LLM_BASE_URL"],
        ),
        field(
            "llm.api_key",
            secret(config.llm.api_key.is_some()),
            &["CLOUDPILOT_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        field(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["CLOUDPILOT_LLM_TIMEOUT_SECS"],
        ),
        field(
            "llm.max_retries",
            config.llm.max_retries.to_string(),
            &["CLOUDPILOT_LLM_MAX_RETRIES"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CLOUDPILOT_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["CLOUDPILOT_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["CLOUDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field(
            "server.session_idle_secs",
            config.server.session_idle_secs.to_string(),
            &["CLOUDPILOT_SERVER_SESSION_IDLE_SECS"],
        ),
        field(
            "server.max_sessions",
            config.server.max_sessions.to_string(),
            &["CLOUDPILOT_SERVER_MAX_SESSIONS"],
        ),
        field(
            "cloud.default_region",
            config.cloud.default_region.clone(),
            &["CLOUDPILOT_CLOUD_REGION", "AWS_REGION"],
        ),
        field(
            "cloud.access_key_id",
            config
                .cloud
                .access_key_id
                .as_deref()
                .map(mask_key)
                .unwrap_or_else(|| UNSET.to_string()),
            &["CLOUDPILOT_CLOUD_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"],
        ),
        field(
            "cloud.secret_access_key",
            secret(config.cloud.secret_access_key.is_some()),
            &["CLOUDPILOT_CLOUD_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"],
        ),
        field(
            "guardrails.mutations_enabled",
            config.guardrails.mutations_enabled.to_string(),
            &["CLOUDPILOT_GUARDRAILS_MUTATIONS_ENABLED"],
        ),
        field(
            "guardrails.deny_broad_grants",
            config.guardrails.deny_broad_grants.to_string(),
            &["CLOUDPILOT_GUARDRAILS_DENY_BROAD_GRANTS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["CLOUDPILOT_LOGGING_LEVEL", "CLOUDPILOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["CLOUDPILOT_LOGGING_FORMAT", "CLOUDPILOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn field(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    ["cloudpilot.toml", "config/cloudpilot.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn mask_key(key: &str) -> String {
    let trimmed = key.trim();
    match trimmed.char_indices().rev().nth(3) {
        Some((start, _)) if trimmed.len() > 4 => format!("****{}", &trimmed[start..]),
        _ => "****".to_string(),
    }
}
