use cloudpilot_agent::{
    CapabilityRegistry, GuardrailPolicy, OpenAiCompatibleReasoner, ValidationGate,
};
use cloudpilot_core::config::{AppConfig, LlmProvider, LoadOptions};
use cloudpilot_core::domain::capability::{CapabilityDescriptor, CapabilityId};
use cloudpilot_core::domain::turn::{DenyReason, ValidationVerdict};
use serde::Serialize;
use serde_json::{Map, Value};

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_reasoner(&config));
            checks.push(check_registry());
            checks.push(check_gate(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["reasoning_provider", "capability_registry", "validation_gate"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_reasoner(config: &AppConfig) -> DoctorCheck {
    let name = "reasoning_provider";
    match config.llm.provider {
        LlmProvider::Rules => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: "rule-based reasoner (offline)".to_string(),
        },
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            match OpenAiCompatibleReasoner::from_config(&config.llm) {
                Ok(_) => DoctorCheck {
                    name,
                    status: CheckStatus::Pass,
                    details: format!(
                        "{} client configured for `{}` using model `{}`",
                        config.llm.provider,
                        config.llm.effective_base_url().unwrap_or_default(),
                        config.llm.model
                    ),
                },
                Err(error) => {
                    DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() }
                }
            }
        }
    }
}

fn check_registry() -> DoctorCheck {
    let registry = CapabilityRegistry::new();
    let missing = CapabilityId::ALL
        .iter()
        .filter(|id| registry.lookup(id.as_str()).is_err())
        .map(|id| id.as_str())
        .collect::<Vec<_>>();

    if missing.is_empty() {
        DoctorCheck {
            name: "capability_registry",
            status: CheckStatus::Pass,
            details: format!("{} capabilities registered", registry.len()),
        }
    } else {
        DoctorCheck {
            name: "capability_registry",
            status: CheckStatus::Fail,
            details: format!("missing capabilities: {}", missing.join(", ")),
        }
    }
}

/// Runs the gate against fixed probes: a read needs nothing, a mutation needs credentials.
fn check_gate(config: &AppConfig) -> DoctorCheck {
    let name = "validation_gate";
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name,
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let mut probe = Map::new();
    probe.insert("bucket_name".to_string(), Value::String("doctor-probe".to_string()));
    let read = CapabilityDescriptor::for_id(CapabilityId::ListEc2Instances).bind(&Map::new());
    let write = CapabilityDescriptor::for_id(CapabilityId::CreateS3Bucket).bind(&probe);
    let (read, write) = match (read, write) {
        (Ok(read), Ok(write)) => (read, write),
        (Err(error), _) | (_, Err(error)) => {
            return DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() };
        }
    };

    let gate = ValidationGate::new(GuardrailPolicy::from(&config.guardrails));
    let (read_verdict, write_verdict) = runtime.block_on(async {
        (gate.evaluate(&read, false).await, gate.evaluate(&write, false).await)
    });

    let read_ok = read_verdict == ValidationVerdict::Allow;
    let write_ok =
        write_verdict == ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired };
    if read_ok && write_ok {
        DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!(
                "reads allowed without credentials, mutations gated (mutations_enabled={})",
                config.guardrails.mutations_enabled
            ),
        }
    } else {
        DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("unexpected verdicts: read={read_verdict:?}, write={write_verdict:?}"),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
