use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::credentials::{CredentialSet, DEFAULT_REGION};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub cloud: CloudConfig,
    pub guardrails: GuardrailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Sessions untouched for this long are evicted, ended or not.
    pub session_idle_secs: u64,
    pub max_sessions: usize,
}

#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub default_region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct GuardrailConfig {
    pub mutations_enabled: bool,
    pub deny_broad_grants: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Rules,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub server_port: Option<u16>,
    pub cloud_region: Option<String>,
    pub mutations_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                session_idle_secs: 3600,
                max_sessions: 1024,
            },
            cloud: CloudConfig {
                default_region: DEFAULT_REGION.to_string(),
                access_key_id: None,
                secret_access_key: None,
            },
            guardrails: GuardrailConfig { mutations_enabled: true, deny_broad_grants: false },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    /// Base URL to call for OpenAI-compatible providers.
    pub fn effective_base_url(&self) -> Option<String> {
        match self.provider {
            LlmProvider::Rules => None,
            LlmProvider::OpenAi => Some(
                self.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ),
            LlmProvider::Ollama => self.base_url.clone(),
        }
    }
}

impl CloudConfig {
    /// Process-wide credentials used to seed new sessions, if fully configured.
    pub fn credentials(&self) -> Option<CredentialSet> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret)) => Some(CredentialSet::new(
                access_key_id.clone(),
                secret.expose_secret().to_string(),
                self.default_region.clone(),
            )),
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("cloudpilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
            }
            if let Some(max_sessions) = server.max_sessions {
                self.server.max_sessions = max_sessions;
            }
        }

        if let Some(cloud) = patch.cloud {
            if let Some(default_region) = cloud.default_region {
                self.cloud.default_region = default_region;
            }
            if let Some(access_key_id) = cloud.access_key_id {
                self.cloud.access_key_id = Some(access_key_id);
            }
            if let Some(secret_access_key_value) = cloud.secret_access_key {
                self.cloud.secret_access_key = Some(secret_value(secret_access_key_value));
            }
        }

        if let Some(guardrails) = patch.guardrails {
            if let Some(mutations_enabled) = guardrails.mutations_enabled {
                self.guardrails.mutations_enabled = mutations_enabled;
            }
            if let Some(deny_broad_grants) = guardrails.deny_broad_grants {
                self.guardrails.deny_broad_grants = deny_broad_grants;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLOUDPILOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CLOUDPILOT_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"))
        {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLOUDPILOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CLOUDPILOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CLOUDPILOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CLOUDPILOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOUDPILOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("CLOUDPILOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CLOUDPILOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLOUDPILOT_SERVER_PORT") {
            self.server.port = parse_u16("CLOUDPILOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLOUDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CLOUDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOUDPILOT_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs =
                parse_u64("CLOUDPILOT_SERVER_SESSION_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOUDPILOT_SERVER_MAX_SESSIONS") {
            self.server.max_sessions = parse_usize("CLOUDPILOT_SERVER_MAX_SESSIONS", &value)?;
        }

        let region = read_env("CLOUDPILOT_CLOUD_REGION").or_else(|| read_env("AWS_REGION"));
        if let Some(value) = region {
            self.cloud.default_region = value;
        }
        let access_key_id =
            read_env("CLOUDPILOT_CLOUD_ACCESS_KEY_ID").or_else(|| read_env("AWS_ACCESS_KEY_ID"));
        if let Some(value) = access_key_id {
            self.cloud.access_key_id = Some(value);
        }
        let secret_access_key = read_env("CLOUDPILOT_CLOUD_SECRET_ACCESS_KEY")
            .or_else(|| read_env("AWS_SECRET_ACCESS_KEY"));
        if let Some(value) = secret_access_key {
            self.cloud.secret_access_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("CLOUDPILOT_GUARDRAILS_MUTATIONS_ENABLED") {
            self.guardrails.mutations_enabled =
                parse_bool("CLOUDPILOT_GUARDRAILS_MUTATIONS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CLOUDPILOT_GUARDRAILS_DENY_BROAD_GRANTS") {
            self.guardrails.deny_broad_grants =
                parse_bool("CLOUDPILOT_GUARDRAILS_DENY_BROAD_GRANTS", &value)?;
        }

        let log_level =
            read_env("CLOUDPILOT_LOGGING_LEVEL").or_else(|| read_env("CLOUDPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLOUDPILOT_LOGGING_FORMAT").or_else(|| read_env("CLOUDPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(cloud_region) = overrides.cloud_region {
            self.cloud.default_region = cloud_region;
        }
        if let Some(mutations_enabled) = overrides.mutations_enabled {
            self.guardrails.mutations_enabled = mutations_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_cloud(&self.cloud)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cloudpilot.toml"), PathBuf::from("config/cloudpilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.session_idle_secs == 0 || server.max_sessions == 0 {
        return Err(ConfigError::Validation(
            "server.session_idle_secs and server.max_sessions must be greater than zero"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_cloud(cloud: &CloudConfig) -> Result<(), ConfigError> {
    if cloud.default_region.trim().is_empty() {
        return Err(ConfigError::Validation("cloud.default_region must not be empty".to_string()));
    }

    let has_key = cloud.access_key_id.as_ref().is_some_and(|value| !value.trim().is_empty());
    let has_secret = cloud
        .secret_access_key
        .as_ref()
        .is_some_and(|value| !value.expose_secret().trim().is_empty());
    if has_key != has_secret {
        return Err(ConfigError::Validation(
            "cloud.access_key_id and cloud.secret_access_key must be set together".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    cloud: Option<CloudPatch>,
    guardrails: Option<GuardrailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
    max_sessions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CloudPatch {
    default_region: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailPatch {
    mutations_enabled: Option<bool>,
    deny_broad_grants: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// Every environment variable this module reads; tests clear them around each case.
pub const ENV_KEYS: [&str; 24] = [
    "CLOUDPILOT_LLM_PROVIDER",
    "CLOUDPILOT_LLM_API_KEY",
    "OPENAI_API_KEY",
    "CLOUDPILOT_LLM_BASE_URL",
    "CLOUDPILOT_LLM_MODEL",
    "CLOUDPILOT_LLM_TIMEOUT_SECS",
    "CLOUDPILOT_LLM_MAX_RETRIES",
    "CLOUDPILOT_SERVER_BIND_ADDRESS",
    "CLOUDPILOT_SERVER_PORT",
    "CLOUDPILOT_SERVER_GRACEFUL_SHUTDOWN_SECS",
    "CLOUDPILOT_SERVER_SESSION_IDLE_SECS",
    "CLOUDPILOT_SERVER_MAX_SESSIONS",
    "CLOUDPILOT_CLOUD_REGION",
    "AWS_REGION",
    "CLOUDPILOT_CLOUD_ACCESS_KEY_ID",
    "AWS_ACCESS_KEY_ID",
    "CLOUDPILOT_CLOUD_SECRET_ACCESS_KEY",
    "AWS_SECRET_ACCESS_KEY",
    "CLOUDPILOT_GUARDRAILS_MUTATIONS_ENABLED",
    "CLOUDPILOT_GUARDRAILS_DENY_BROAD_GRANTS",
    "CLOUDPILOT_LOGGING_LEVEL",
    "CLOUDPILOT_LOG_LEVEL",
    "CLOUDPILOT_LOGGING_FORMAT",
    "CLOUDPILOT_LOG_FORMAT",
];

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat, ENV_KEYS,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in ENV_KEYS.iter().chain(["TEST_CLOUDPILOT_KEY"].iter()) {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Rules, "default provider should be rules")?;
        ensure(config.cloud.credentials().is_none(), "no process credentials by default")?;
        ensure(config.guardrails.mutations_enabled, "mutations should be enabled by default")?;
        ensure(config.cloud.default_region == "ap-south-1", "default region should be ap-south-1")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("TEST_CLOUDPILOT_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cloudpilot.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_CLOUDPILOT_KEY}"
model = "gpt-4o"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.llm.effective_base_url().as_deref() == Some("https://api.openai.com/v1"),
                "openai base url should default",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn aws_environment_variables_seed_process_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("AWS_ACCESS_KEY_ID", "AKIAPROCESS0001");
        env::set_var("AWS_SECRET_ACCESS_KEY", "process-secret");
        env::set_var("AWS_REGION", "eu-west-1");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let credentials = config.cloud.credentials().ok_or("credentials should be seeded")?;

            ensure(credentials.access_key_id() == "AKIAPROCESS0001", "access key from env")?;
            ensure(credentials.region() == "eu-west-1", "region from AWS_REGION")
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("CLOUDPILOT_LLM_MODEL", "model-from-env");
        env::set_var("CLOUDPILOT_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cloudpilot.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[server]
port = 9000

[logging]
level = "error"
format = "pretty"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    server_port: Some(9100),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.logging.level == "warn", "env log level alias should win over file")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "file log format should win over default",
            )?;
            ensure(config.server.port == 9100, "override port should win")
        })();

        clear_vars();
        result
    }

    #[test]
    fn half_configured_cloud_credentials_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("AWS_ACCESS_KEY_ID", "AKIAONLYKEY");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("must be set together")
                ),
                "validation failure should mention paired credentials",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn session_bounds_come_from_env_and_reject_zero() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("CLOUDPILOT_SERVER_MAX_SESSIONS", "16");
        env::set_var("CLOUDPILOT_SERVER_SESSION_IDLE_SECS", "90");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.server.max_sessions == 16, "max sessions from env")?;
            ensure(config.server.session_idle_secs == 90, "idle window from env")?;

            env::set_var("CLOUDPILOT_SERVER_MAX_SESSIONS", "0");
            ensure(
                matches!(
                    AppConfig::load(LoadOptions::default()),
                    Err(ConfigError::Validation(ref message)) if message.contains("max_sessions")
                ),
                "zero session cap should fail validation",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn openai_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("CLOUDPILOT_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected missing api key to fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
                "validation failure should mention llm.api_key",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("AWS_ACCESS_KEY_ID", "AKIADEBUGCHECK");
        env::set_var("AWS_SECRET_ACCESS_KEY", "very-secret-value");
        env::set_var("CLOUDPILOT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("very-secret-value"), "debug should not contain cloud secret")?;
            ensure(!debug.contains("sk-secret-value"), "debug should not contain llm api key")?;
            let credentials = config.cloud.credentials().ok_or("credentials should be seeded")?;
            ensure(
                !format!("{credentials:?}").contains("very-secret-value"),
                "credential debug should not contain secret",
            )
        })();

        clear_vars();
        result
    }
}
