use async_trait::async_trait;
use cloudpilot_core::domain::capability::{
    CapabilityDescriptor, CapabilityId, RawParameters, ResolvedInvocation,
};
use cloudpilot_core::domain::conversation::{last_user_turn, ConversationTurn};
use cloudpilot_core::errors::ReasoningError;
use serde_json::Value;

use crate::llm::{ProviderDecision, ReasoningProvider, SynthesisContext};

pub const HELP_REPLY: &str = "I can help with AWS operations: listing EC2 instances, \
checking S3 bucket sizes and file counts, describing IAM roles, suggesting IAM policies, \
creating S3 buckets, Lambda functions and IAM roles, and attaching policies to roles. \
What would you like to do?";

const DESTRUCTIVE_REPLY: &str = "I can't delete, stop or terminate resources. \
I can list and describe resources, create S3 buckets, Lambda functions and IAM roles, \
and attach policies to roles.";

const CREATE_WORDS: [&str; 5] = ["create", "make", "new", "provision", "add"];
const DESTRUCTIVE_WORDS: [&str; 6] = ["delete", "remove", "terminate", "destroy", "stop", "drop"];
const STOPWORDS: [&str; 19] = [
    "named", "called", "the", "a", "an", "to", "for", "with", "that", "which", "and", "please",
    "in", "on", "of", "my", "is", "policy", "using",
];
const MANAGED_POLICIES: [&str; 9] = [
    "AdministratorAccess",
    "PowerUserAccess",
    "IAMFullAccess",
    "ReadOnlyAccess",
    "AmazonS3ReadOnlyAccess",
    "AmazonS3FullAccess",
    "AmazonEC2ReadOnlyAccess",
    "AmazonEC2FullAccess",
    "AWSLambda_FullAccess",
];
const RUNTIME_PREFIXES: [&str; 7] = ["python", "nodejs", "java", "dotnet", "ruby", "provided", "go"];

/// Offline reasoning provider driven by keyword and token extraction.
///
/// Anything it cannot map to exactly one capability becomes a direct reply;
/// it never guesses an action.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedReasoner;

impl RuleBasedReasoner {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, text: &str) -> ProviderDecision {
        let utterance = Utterance::parse(text);
        if utterance.is_empty() {
            return ProviderDecision::DirectReply(HELP_REPLY.to_string());
        }

        if utterance.has_any(&DESTRUCTIVE_WORDS) {
            return ProviderDecision::DirectReply(DESTRUCTIVE_REPLY.to_string());
        }

        if utterance.has_any(&["suggest", "recommend", "draft", "generate", "write"])
            && utterance.has("policy")
        {
            return invoke(
                CapabilityId::SuggestIamPolicy,
                vec![("description", Some(Value::String(text.trim().to_string())))],
            );
        }

        if utterance.has_any(&["attach", "assign", "grant"])
            && (utterance.has("policy") || utterance.policy_arn().is_some())
        {
            return invoke(
                CapabilityId::AssignPolicyToRole,
                vec![
                    ("role_name", utterance.role_name().map(Value::String)),
                    ("policy_arn", utterance.policy_arn().map(Value::String)),
                ],
            );
        }

        if utterance.has_any(&CREATE_WORDS) {
            if utterance.has_any(&["bucket", "buckets"]) {
                return invoke(
                    CapabilityId::CreateS3Bucket,
                    vec![("bucket_name", utterance.bucket_name().map(Value::String))],
                );
            }
            if utterance.has_any(&["lambda", "function"]) {
                return invoke(
                    CapabilityId::CreateLambdaFunction,
                    vec![
                        ("name", utterance.explicit_name().map(Value::String)),
                        ("role_arn", utterance.arn_containing(":role/").map(Value::String)),
                        ("runtime", utterance.runtime().map(Value::String)),
                        ("handler", utterance.token_after(&["handler"]).map(Value::String)),
                        ("zip_file_path", utterance.zip_path().map(Value::String)),
                    ],
                );
            }
            if utterance.has("role") {
                return invoke(
                    CapabilityId::CreateIamRole,
                    vec![
                        ("name", utterance.role_name().map(Value::String)),
                        ("policy_document", utterance.json.clone()),
                    ],
                );
            }
        }

        if utterance.has("role")
            && utterance.has_any(&["describe", "details", "show", "about", "info", "get"])
        {
            return invoke(
                CapabilityId::DescribeIamRole,
                vec![("role_name", utterance.role_name().map(Value::String))],
            );
        }

        if utterance.has_any(&["ec2", "instance", "instances", "servers", "vms"]) {
            return invoke(CapabilityId::ListEc2Instances, Vec::new());
        }

        if utterance.has_any(&["bucket", "buckets", "s3"]) {
            if utterance.has_any(&["file", "files", "object", "objects"]) {
                return invoke(
                    CapabilityId::GetS3BucketFileCount,
                    vec![("bucket_name", utterance.existing_bucket_name().map(Value::String))],
                );
            }
            if utterance.has_any(&["size", "sizes", "big", "storage", "usage", "large", "list", "show"])
            {
                return invoke(CapabilityId::GetS3BucketSizes, Vec::new());
            }
        }

        ProviderDecision::DirectReply(HELP_REPLY.to_string())
    }
}

#[async_trait]
impl ReasoningProvider for RuleBasedReasoner {
    async fn classify(
        &self,
        history: &[ConversationTurn],
        _catalog: &[CapabilityDescriptor],
    ) -> Result<ProviderDecision, ReasoningError> {
        Ok(match last_user_turn(history) {
            Some(turn) => self.decide(turn.content()),
            None => ProviderDecision::DirectReply(HELP_REPLY.to_string()),
        })
    }

    async fn advise(
        &self,
        _invocation: &ResolvedInvocation,
    ) -> Result<Option<String>, ReasoningError> {
        Ok(None)
    }

    async fn synthesize(&self, context: SynthesisContext<'_>) -> Result<String, ReasoningError> {
        Ok(context.outcome.describe())
    }
}

fn invoke(capability: CapabilityId, parameters: Vec<(&str, Option<Value>)>) -> ProviderDecision {
    let raw_parameters = parameters
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect::<RawParameters>();
    ProviderDecision::Invoke { capability_name: capability.as_str().to_string(), raw_parameters }
}

struct Utterance {
    tokens: Vec<String>,
    lowered: Vec<String>,
    quoted: Option<String>,
    json: Option<Value>,
}

impl Utterance {
    fn parse(text: &str) -> Self {
        // An inline JSON document is only ever a policy; names come from the prose before it.
        let (prose, json) = match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                let json = serde_json::from_str::<Value>(&text[start..=end])
                    .ok()
                    .filter(Value::is_object);
                (&text[..start], json)
            }
            _ => (text, None),
        };

        let tokens = tokenize(prose);
        let lowered = tokens.iter().map(|token| token.to_ascii_lowercase()).collect();
        Self { tokens, lowered, quoted: quoted(prose), json }
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn has(&self, word: &str) -> bool {
        self.lowered.iter().any(|token| token == word)
    }

    fn has_any(&self, words: &[&str]) -> bool {
        words.iter().any(|word| self.has(word))
    }

    fn token_after(&self, markers: &[&str]) -> Option<String> {
        self.lowered.iter().enumerate().find_map(|(index, token)| {
            if !markers.contains(&token.as_str()) {
                return None;
            }
            let next = self.lowered.get(index + 1)?;
            (!STOPWORDS.contains(&next.as_str())).then(|| self.tokens[index + 1].clone())
        })
    }

    fn explicit_name(&self) -> Option<String> {
        self.quoted.clone().or_else(|| self.token_after(&["named", "called"]))
    }

    fn bucket_name(&self) -> Option<String> {
        self.explicit_name().or_else(|| {
            self.token_after(&["bucket"]).filter(|token| looks_like_resource_name(token))
        })
    }

    fn existing_bucket_name(&self) -> Option<String> {
        self.explicit_name()
            .or_else(|| {
                self.token_after(&["bucket"]).filter(|token| looks_like_resource_name(token))
            })
            .or_else(|| self.token_after(&["in"]).filter(|token| looks_like_resource_name(token)))
    }

    fn role_name(&self) -> Option<String> {
        if let Some(name) = self.explicit_name() {
            return Some(name);
        }
        if let Some(name) = self.token_after(&["role"]) {
            return Some(name);
        }
        // "... to the deploy-bot role"
        self.lowered.iter().position(|token| token == "role").and_then(|index| {
            let previous = self.tokens.get(index.checked_sub(1)?)?;
            looks_like_resource_name(previous).then(|| previous.clone())
        })
    }

    fn arn_containing(&self, marker: &str) -> Option<String> {
        self.tokens
            .iter()
            .find(|token| token.starts_with("arn:aws:iam::") && token.contains(marker))
            .cloned()
    }

    fn policy_arn(&self) -> Option<String> {
        if let Some(arn) = self.arn_containing(":policy/") {
            return Some(arn);
        }
        let managed = self.tokens.iter().find_map(|token| {
            MANAGED_POLICIES.iter().find(|policy| policy.eq_ignore_ascii_case(token)).copied()
        });
        let managed = managed.or_else(|| {
            self.has_any(&["admin", "administrator"]).then_some("AdministratorAccess")
        });
        managed.map(|policy| format!("arn:aws:iam::aws:policy/{policy}"))
    }

    fn runtime(&self) -> Option<String> {
        self.lowered
            .iter()
            .find(|token| {
                RUNTIME_PREFIXES.iter().any(|prefix| token.starts_with(prefix))
                    && token.chars().any(|character| character.is_ascii_digit())
            })
            .cloned()
    }

    fn zip_path(&self) -> Option<String> {
        self.tokens.iter().find(|token| token.to_ascii_lowercase().ends_with(".zip")).cloned()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_matches(|character: char| {
                    matches!(character, ',' | '?' | '!' | '"' | '`' | '(' | ')' | ';' | '\'')
                })
                .trim_end_matches(['.', ':'])
                .to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn quoted(text: &str) -> Option<String> {
    ['`', '"'].into_iter().find_map(|delimiter| {
        let start = text.find(delimiter)? + 1;
        let length = text[start..].find(delimiter)?;
        let value = text[start..start + length].trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn looks_like_resource_name(token: &str) -> bool {
    !STOPWORDS.contains(&token.to_ascii_lowercase().as_str())
        && token.chars().any(|character| {
            matches!(character, '-' | '_' | '.') || character.is_ascii_digit()
        })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{RuleBasedReasoner, HELP_REPLY};
    use crate::llm::ProviderDecision;

    fn invoked(decision: ProviderDecision) -> (String, serde_json::Map<String, Value>) {
        match decision {
            ProviderDecision::Invoke { capability_name, raw_parameters } => {
                (capability_name, raw_parameters)
            }
            ProviderDecision::DirectReply(text) => (format!("reply: {text}"), Default::default()),
        }
    }

    #[test]
    fn list_instances_maps_to_read_only_capability() {
        let (name, parameters) = invoked(RuleBasedReasoner::new().decide("List my EC2 instances"));

        assert_eq!(name, "list_ec2_instances");
        assert!(parameters.is_empty());
    }

    #[test]
    fn bucket_creation_extracts_backticked_name() {
        let (name, parameters) =
            invoked(RuleBasedReasoner::new().decide("Create an S3 bucket named `logs-2024`"));

        assert_eq!(name, "create_s3_bucket");
        assert_eq!(parameters["bucket_name"], "logs-2024");
    }

    #[test]
    fn bucket_creation_without_name_leaves_parameter_out() {
        let (name, parameters) = invoked(RuleBasedReasoner::new().decide("Please create a bucket"));

        assert_eq!(name, "create_s3_bucket");
        assert!(!parameters.contains_key("bucket_name"));
    }

    #[test]
    fn administrator_attachment_resolves_managed_policy_arn() {
        let (name, parameters) = invoked(
            RuleBasedReasoner::new()
                .decide("Attach the AdministratorAccess policy to the role ci-deployer"),
        );

        assert_eq!(name, "assign_policy_to_role");
        assert_eq!(parameters["role_name"], "ci-deployer");
        assert_eq!(parameters["policy_arn"], "arn:aws:iam::aws:policy/AdministratorAccess");
    }

    #[test]
    fn lambda_creation_collects_every_field() {
        let (name, parameters) = invoked(RuleBasedReasoner::new().decide(
            "Create a lambda function named ingest-events with role \
             arn:aws:iam::123456789012:role/lambda-exec runtime python3.12 \
             handler app.handler from build/ingest.zip",
        ));

        assert_eq!(name, "create_lambda_function");
        assert_eq!(parameters["name"], "ingest-events");
        assert_eq!(parameters["role_arn"], "arn:aws:iam::123456789012:role/lambda-exec");
        assert_eq!(parameters["runtime"], "python3.12");
        assert_eq!(parameters["handler"], "app.handler");
        assert_eq!(parameters["zip_file_path"], "build/ingest.zip");
    }

    #[test]
    fn role_creation_reads_inline_policy_document() {
        let (name, parameters) = invoked(RuleBasedReasoner::new().decide(
            r#"Create a role named deploy-bot with {"Version":"2012-10-17","Statement":[]}"#,
        ));

        assert_eq!(name, "create_iam_role");
        assert_eq!(parameters["name"], "deploy-bot");
        assert_eq!(parameters["policy_document"]["Version"], "2012-10-17");
    }

    #[test]
    fn file_count_accepts_optional_bucket() {
        let reasoner = RuleBasedReasoner::new();

        let (name, parameters) = invoked(reasoner.decide("How many files are in my buckets?"));
        assert_eq!(name, "get_s3_bucket_file_count");
        assert!(parameters.is_empty());

        let (_, parameters) = invoked(reasoner.decide("Count the files in bucket media-assets"));
        assert_eq!(parameters["bucket_name"], "media-assets");
    }

    #[test]
    fn ambiguous_and_destructive_requests_get_direct_replies() {
        let reasoner = RuleBasedReasoner::new();

        assert_eq!(
            reasoner.decide("hello there"),
            ProviderDecision::DirectReply(HELP_REPLY.to_string())
        );
        assert!(matches!(
            reasoner.decide("delete the bucket logs-2024"),
            ProviderDecision::DirectReply(text) if text.contains("can't delete")
        ));
    }
}
