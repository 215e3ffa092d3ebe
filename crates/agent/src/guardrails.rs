use std::sync::Arc;

use cloudpilot_core::config::GuardrailConfig;
use cloudpilot_core::domain::capability::{CapabilityCategory, Invocation, ResolvedInvocation};
use cloudpilot_core::domain::turn::{DenyReason, ValidationVerdict};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::ReasoningProvider;

const PRIVILEGED_MANAGED_POLICIES: [&str; 3] =
    ["AdministratorAccess", "PowerUserAccess", "IAMFullAccess"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub mutations_enabled: bool,
    pub deny_broad_grants: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { mutations_enabled: true, deny_broad_grants: false }
    }
}

impl From<&GuardrailConfig> for GuardrailPolicy {
    fn from(config: &GuardrailConfig) -> Self {
        Self {
            mutations_enabled: config.mutations_enabled,
            deny_broad_grants: config.deny_broad_grants,
        }
    }
}

/// Single choke point between routing and execution.
///
/// The verdict depends on the capability category, which every descriptor is
/// required to declare, so a new capability cannot slip past unclassified.
pub struct ValidationGate {
    policy: GuardrailPolicy,
    advisor: Option<Arc<dyn ReasoningProvider>>,
}

impl ValidationGate {
    pub fn new(policy: GuardrailPolicy) -> Self {
        Self { policy, advisor: None }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn ReasoningProvider>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    pub async fn evaluate(
        &self,
        invocation: &ResolvedInvocation,
        credentials_present: bool,
    ) -> ValidationVerdict {
        let verdict = match invocation.category() {
            CapabilityCategory::ReadOnly | CapabilityCategory::Advisory => ValidationVerdict::Allow,
            CapabilityCategory::Mutating => {
                self.evaluate_mutation(invocation, credentials_present).await
            }
        };

        info!(
            event_name = "agent.gate.verdict",
            capability = %invocation.capability,
            credentials_present,
            verdict = ?verdict,
            "validation gate evaluated invocation"
        );
        verdict
    }

    async fn evaluate_mutation(
        &self,
        invocation: &ResolvedInvocation,
        credentials_present: bool,
    ) -> ValidationVerdict {
        if !credentials_present {
            return ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired };
        }

        if !self.policy.mutations_enabled {
            return ValidationVerdict::Deny {
                reason: DenyReason::Policy(
                    "resource-changing operations are disabled by the operator".to_string(),
                ),
            };
        }

        let findings = broad_grant_findings(&invocation.invocation);
        if !findings.is_empty() && self.policy.deny_broad_grants {
            return ValidationVerdict::Deny { reason: DenyReason::Policy(findings.join("; ")) };
        }

        let mut reasons = findings;
        if let Some(advice) = self.consult_advisor(invocation).await {
            reasons.push(advice);
        }

        if reasons.is_empty() {
            ValidationVerdict::Allow
        } else {
            ValidationVerdict::AllowWithWarning { reason: reasons.join("; ") }
        }
    }

    async fn consult_advisor(&self, invocation: &ResolvedInvocation) -> Option<String> {
        let advisor = self.advisor.as_ref()?;
        match advisor.advise(invocation).await {
            Ok(advice) => advice.filter(|text| !text.trim().is_empty()),
            Err(error) => {
                warn!(
                    event_name = "agent.gate.advisor_unavailable",
                    capability = %invocation.capability,
                    error = %error,
                    "advisor failed; continuing without advisory warning"
                );
                None
            }
        }
    }
}

/// Deterministic detection of administrator-equivalent or wildcard grants.
pub fn broad_grant_findings(invocation: &Invocation) -> Vec<String> {
    match invocation {
        Invocation::AssignPolicyToRole { policy_arn, role_name } => {
            policy_arn_finding(policy_arn, role_name).into_iter().collect()
        }
        Invocation::CreateIamRole { policy_document, .. } => policy_document_findings(policy_document),
        _ => Vec::new(),
    }
}

fn policy_arn_finding(policy_arn: &str, role_name: &str) -> Option<String> {
    let policy_name = policy_arn.rsplit('/').next().unwrap_or(policy_arn);
    let privileged = PRIVILEGED_MANAGED_POLICIES.contains(&policy_name);
    if privileged || policy_name.ends_with("FullAccess") {
        Some(format!(
            "`{policy_name}` grants administrator-equivalent or service-wide access to role \
             `{role_name}`; prefer a least-privilege policy"
        ))
    } else {
        None
    }
}

fn policy_document_findings(document: &Value) -> Vec<String> {
    let statements = match &document["Statement"] {
        Value::Array(statements) => statements.iter().collect::<Vec<_>>(),
        statement @ Value::Object(_) => vec![statement],
        _ => Vec::new(),
    };

    let mut findings = Vec::new();
    for statement in statements {
        if statement["Effect"].as_str() != Some("Allow") {
            continue;
        }
        if has_wildcard(&statement["Action"], &["*", "*:*"]) {
            findings.push("policy document allows every action (`\"Action\": \"*\"`)".to_string());
        }
        if has_wildcard(&statement["Resource"], &["*"]) {
            findings.push("policy document applies to every resource (`\"Resource\": \"*\"`)".to_string());
        }
    }
    findings.dedup();
    findings
}

fn has_wildcard(value: &Value, wildcards: &[&str]) -> bool {
    match value {
        Value::String(text) => wildcards.contains(&text.as_str()),
        Value::Array(items) => items.iter().any(|item| has_wildcard(item, wildcards)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use cloudpilot_core::domain::capability::{
        CapabilityDescriptor, CapabilityId, ResolvedInvocation,
    };
    use cloudpilot_core::domain::conversation::ConversationTurn;
    use cloudpilot_core::domain::turn::{DenyReason, ValidationVerdict};
    use cloudpilot_core::errors::ReasoningError;
    use serde_json::{json, Value};

    use super::{GuardrailPolicy, ValidationGate};
    use crate::llm::{ProviderDecision, ReasoningProvider, SynthesisContext};

    struct Advisor(Result<Option<String>, ReasoningError>);

    #[async_trait]
    impl ReasoningProvider for Advisor {
        async fn classify(
            &self,
            _history: &[ConversationTurn],
            _catalog: &[CapabilityDescriptor],
        ) -> Result<ProviderDecision, ReasoningError> {
            Ok(ProviderDecision::DirectReply(String::new()))
        }

        async fn advise(
            &self,
            _invocation: &ResolvedInvocation,
        ) -> Result<Option<String>, ReasoningError> {
            self.0.clone()
        }

        async fn synthesize(
            &self,
            _context: SynthesisContext<'_>,
        ) -> Result<String, ReasoningError> {
            Ok(String::new())
        }
    }

    fn bind(id: CapabilityId, parameters: Value) -> ResolvedInvocation {
        let map = match parameters {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        CapabilityDescriptor::for_id(id).bind(&map).expect("parameters should bind")
    }

    fn bucket() -> ResolvedInvocation {
        bind(CapabilityId::CreateS3Bucket, json!({ "bucket_name": "logs-2024" }))
    }

    #[tokio::test]
    async fn mutating_capabilities_never_allowed_without_credentials() {
        let gate = ValidationGate::new(GuardrailPolicy::default());
        let mutating = [
            bucket(),
            bind(
                CapabilityId::CreateIamRole,
                json!({ "name": "r", "policy_document": { "Version": "2012-10-17" } }),
            ),
            bind(
                CapabilityId::AssignPolicyToRole,
                json!({ "role_name": "r", "policy_arn": "arn:aws:iam::aws:policy/ReadOnlyAccess" }),
            ),
            bind(
                CapabilityId::CreateLambdaFunction,
                json!({
                    "name": "f", "role_arn": "arn:aws:iam::1:role/r", "runtime": "python3.12",
                    "handler": "app.handler", "zip_file_path": "f.zip"
                }),
            ),
        ];

        for invocation in &mutating {
            assert_eq!(
                gate.evaluate(invocation, false).await,
                ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired }
            );
        }
    }

    #[tokio::test]
    async fn read_only_and_advisory_are_always_allowed() {
        let gate = ValidationGate::new(GuardrailPolicy {
            mutations_enabled: false,
            deny_broad_grants: true,
        });

        let list = bind(CapabilityId::ListEc2Instances, json!({}));
        let suggest = bind(CapabilityId::SuggestIamPolicy, json!({ "description": "read s3" }));
        assert_eq!(gate.evaluate(&list, false).await, ValidationVerdict::Allow);
        assert_eq!(gate.evaluate(&suggest, false).await, ValidationVerdict::Allow);
    }

    #[tokio::test]
    async fn administrator_attachment_is_allowed_with_warning() {
        let gate = ValidationGate::new(GuardrailPolicy::default());
        let invocation = bind(
            CapabilityId::AssignPolicyToRole,
            json!({
                "role_name": "ci-deployer",
                "policy_arn": "arn:aws:iam::aws:policy/AdministratorAccess"
            }),
        );

        let verdict = gate.evaluate(&invocation, true).await;
        let reason = verdict.warning().unwrap_or_default();
        assert!(verdict.permits_execution());
        assert!(reason.contains("AdministratorAccess"), "unexpected reason: {reason}");
    }

    #[tokio::test]
    async fn wildcard_policy_document_is_flagged_and_can_be_denied() {
        let invocation = bind(
            CapabilityId::CreateIamRole,
            json!({
                "name": "everything",
                "policy_document": {
                    "Version": "2012-10-17",
                    "Statement": [{ "Effect": "Allow", "Action": "*", "Resource": "*" }]
                }
            }),
        );

        let warn_gate = ValidationGate::new(GuardrailPolicy::default());
        assert!(matches!(
            warn_gate.evaluate(&invocation, true).await,
            ValidationVerdict::AllowWithWarning { ref reason } if reason.contains("every action")
        ));

        let deny_gate = ValidationGate::new(GuardrailPolicy {
            mutations_enabled: true,
            deny_broad_grants: true,
        });
        assert!(matches!(
            deny_gate.evaluate(&invocation, true).await,
            ValidationVerdict::Deny { reason: DenyReason::Policy(_) }
        ));
    }

    #[tokio::test]
    async fn disabled_mutations_are_refused_after_credential_check() {
        let gate = ValidationGate::new(GuardrailPolicy {
            mutations_enabled: false,
            deny_broad_grants: false,
        });

        assert_eq!(
            gate.evaluate(&bucket(), false).await,
            ValidationVerdict::Deny { reason: DenyReason::CredentialsRequired }
        );
        assert!(matches!(
            gate.evaluate(&bucket(), true).await,
            ValidationVerdict::Deny { reason: DenyReason::Policy(_) }
        ));
    }

    #[tokio::test]
    async fn advisor_warning_is_surfaced_and_failures_are_ignored() {
        let warning_gate = ValidationGate::new(GuardrailPolicy::default())
            .with_advisor(Arc::new(Advisor(Ok(Some("bucket name reveals environment".into())))));
        assert_eq!(
            warning_gate.evaluate(&bucket(), true).await,
            ValidationVerdict::AllowWithWarning {
                reason: "bucket name reveals environment".to_string()
            }
        );

        let failing_gate = ValidationGate::new(GuardrailPolicy::default())
            .with_advisor(Arc::new(Advisor(Err(ReasoningError::Unavailable("timeout".into())))));
        assert_eq!(failing_gate.evaluate(&bucket(), true).await, ValidationVerdict::Allow);
    }
}
