//! Capability identifiers, descriptors and typed invocations.
//!
//! The set of operations is closed: a name coming back from a reasoning
//! provider only becomes executable after `CapabilityId::parse` accepts it and
//! the descriptor binds its raw parameters into an [`Invocation`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::CapabilityError;

pub type RawParameters = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    GetS3BucketFileCount,
    GetS3BucketSizes,
    ListEc2Instances,
    DescribeIamRole,
    SuggestIamPolicy,
    CreateS3Bucket,
    CreateLambdaFunction,
    CreateIamRole,
    AssignPolicyToRole,
}

impl CapabilityId {
    pub const ALL: [CapabilityId; 9] = [
        Self::GetS3BucketFileCount,
        Self::GetS3BucketSizes,
        Self::ListEc2Instances,
        Self::DescribeIamRole,
        Self::SuggestIamPolicy,
        Self::CreateS3Bucket,
        Self::CreateLambdaFunction,
        Self::CreateIamRole,
        Self::AssignPolicyToRole,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetS3BucketFileCount => "get_s3_bucket_file_count",
            Self::GetS3BucketSizes => "get_s3_bucket_sizes",
            Self::ListEc2Instances => "list_ec2_instances",
            Self::DescribeIamRole => "describe_iam_role",
            Self::SuggestIamPolicy => "suggest_iam_policy",
            Self::CreateS3Bucket => "create_s3_bucket",
            Self::CreateLambdaFunction => "create_lambda_function",
            Self::CreateIamRole => "create_iam_role",
            Self::AssignPolicyToRole => "assign_policy_to_role",
        }
    }

    pub fn parse(name: &str) -> Result<Self, CapabilityError> {
        let normalized = name.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| CapabilityError::UnknownCapability(name.to_string()))
    }

    pub fn category(&self) -> CapabilityCategory {
        match self {
            Self::GetS3BucketFileCount
            | Self::GetS3BucketSizes
            | Self::ListEc2Instances
            | Self::DescribeIamRole => CapabilityCategory::ReadOnly,
            Self::SuggestIamPolicy => CapabilityCategory::Advisory,
            Self::CreateS3Bucket
            | Self::CreateLambdaFunction
            | Self::CreateIamRole
            | Self::AssignPolicyToRole => CapabilityCategory::Mutating,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::GetS3BucketFileCount | Self::GetS3BucketSizes | Self::CreateS3Bucket => "s3",
            Self::ListEc2Instances => "ec2",
            Self::DescribeIamRole
            | Self::SuggestIamPolicy
            | Self::CreateIamRole
            | Self::AssignPolicyToRole => "iam",
            Self::CreateLambdaFunction => "lambda",
        }
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityCategory {
    ReadOnly,
    Mutating,
    Advisory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Object,
}

impl ParameterKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Object => "object",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParameterSpec {
    const fn required(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    const fn optional(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    pub id: CapabilityId,
    pub category: CapabilityCategory,
    pub service: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

impl CapabilityDescriptor {
    pub fn for_id(id: CapabilityId) -> Self {
        use ParameterKind::{Object, String};

        let (description, parameters) = match id {
            CapabilityId::GetS3BucketFileCount => (
                "Returns the number of files in an S3 bucket or all buckets",
                vec![ParameterSpec::optional(
                    "bucket_name",
                    String,
                    "Name of the specific S3 bucket to check. If not provided, checks all buckets.",
                )],
            ),
            CapabilityId::GetS3BucketSizes => {
                ("Returns total size of all accessible S3 buckets", Vec::new())
            }
            CapabilityId::ListEc2Instances => {
                ("Returns list of EC2 instances with their details", Vec::new())
            }
            CapabilityId::DescribeIamRole => (
                "Returns details about an IAM role",
                vec![ParameterSpec::required("role_name", String, "Name of the IAM role")],
            ),
            CapabilityId::SuggestIamPolicy => (
                "Suggests an IAM policy based on a description of required permissions",
                vec![ParameterSpec::required(
                    "description",
                    String,
                    "Description of the required permissions",
                )],
            ),
            CapabilityId::CreateS3Bucket => (
                "Creates a new S3 bucket",
                vec![ParameterSpec::required(
                    "bucket_name",
                    String,
                    "Name of the S3 bucket to create",
                )],
            ),
            CapabilityId::CreateLambdaFunction => (
                "Creates a new Lambda function",
                vec![
                    ParameterSpec::required("name", String, "Name of the Lambda function"),
                    ParameterSpec::required(
                        "role_arn",
                        String,
                        "ARN of the IAM role for the function",
                    ),
                    ParameterSpec::required(
                        "runtime",
                        String,
                        "Runtime environment (e.g., python3.9)",
                    ),
                    ParameterSpec::required(
                        "handler",
                        String,
                        "Function handler (e.g., index.handler)",
                    ),
                    ParameterSpec::required(
                        "zip_file_path",
                        String,
                        "Path to the zip file containing function code",
                    ),
                ],
            ),
            CapabilityId::CreateIamRole => (
                "Creates a new IAM role",
                vec![
                    ParameterSpec::required("name", String, "Name of the IAM role"),
                    ParameterSpec::required("policy_document", Object, "IAM policy document"),
                ],
            ),
            CapabilityId::AssignPolicyToRole => (
                "Attaches an existing policy to an IAM role",
                vec![
                    ParameterSpec::required("role_name", String, "Name of the IAM role"),
                    ParameterSpec::required("policy_arn", String, "ARN of the policy to attach"),
                ],
            ),
        };

        Self { id, category: id.category(), service: id.service(), description, parameters }
    }

    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|spec| spec.required)
    }

    /// Function-tool schema handed to the reasoning provider as one menu entry.
    pub fn tool_schema(&self) -> Value {
        let properties = self
            .parameters
            .iter()
            .map(|spec| {
                (
                    spec.name.to_string(),
                    json!({ "type": spec.kind.json_type(), "description": spec.description }),
                )
            })
            .collect::<Map<String, Value>>();
        let required = self.required_parameters().map(|spec| spec.name).collect::<Vec<_>>();

        let mut parameters = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            parameters["required"] = json!(required);
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description,
                "parameters": parameters,
            }
        })
    }

    /// Checks `raw` against the schema and produces a fully bound invocation.
    pub fn bind(&self, raw: &RawParameters) -> Result<ResolvedInvocation, CapabilityError> {
        let mut missing = Vec::new();
        let mut bound = BTreeMap::new();

        for spec in &self.parameters {
            match raw.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        missing.push(spec.name.to_string());
                    }
                }
                Some(Value::String(text)) if spec.kind == ParameterKind::String => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        if spec.required {
                            missing.push(spec.name.to_string());
                        }
                    } else {
                        bound.insert(spec.name, Value::String(trimmed.to_string()));
                    }
                }
                Some(value @ Value::Object(_)) if spec.kind == ParameterKind::Object => {
                    bound.insert(spec.name, value.clone());
                }
                // Some providers send nested documents JSON-encoded as a string.
                Some(Value::String(text)) if spec.kind == ParameterKind::Object => {
                    match serde_json::from_str::<Value>(text) {
                        Ok(value @ Value::Object(_)) => {
                            bound.insert(spec.name, value);
                        }
                        _ => return Err(self.invalid(spec)),
                    }
                }
                Some(_) => return Err(self.invalid(spec)),
            }
        }

        if !missing.is_empty() {
            return Err(CapabilityError::MissingParameter {
                capability: self.name().to_string(),
                missing,
            });
        }

        let invocation = Invocation::from_bound(self.id, &mut bound);
        let parameters = invocation.parameters();
        Ok(ResolvedInvocation { capability: self.id, invocation, parameters })
    }

    fn invalid(&self, spec: &ParameterSpec) -> CapabilityError {
        CapabilityError::InvalidParameter {
            capability: self.name().to_string(),
            parameter: spec.name.to_string(),
            expected: match spec.kind {
                ParameterKind::String => "a string",
                ParameterKind::Object => "a JSON object",
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaFunctionSpec {
    pub name: String,
    pub role_arn: String,
    pub runtime: String,
    pub handler: String,
    pub zip_file_path: String,
}

/// Typed arguments for exactly one capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum Invocation {
    GetS3BucketFileCount { bucket_name: Option<String> },
    GetS3BucketSizes,
    ListEc2Instances,
    DescribeIamRole { role_name: String },
    SuggestIamPolicy { description: String },
    CreateS3Bucket { bucket_name: String },
    CreateLambdaFunction(LambdaFunctionSpec),
    CreateIamRole { name: String, policy_document: Value },
    AssignPolicyToRole { role_name: String, policy_arn: String },
}

impl Invocation {
    // Only called after `bind` has checked presence and type of every required field.
    fn from_bound(id: CapabilityId, bound: &mut BTreeMap<&'static str, Value>) -> Self {
        let mut text = |key: &str| match bound.remove(key) {
            Some(Value::String(value)) => value,
            _ => String::new(),
        };

        match id {
            CapabilityId::GetS3BucketFileCount => {
                let bucket_name = text("bucket_name");
                Self::GetS3BucketFileCount {
                    bucket_name: (!bucket_name.is_empty()).then_some(bucket_name),
                }
            }
            CapabilityId::GetS3BucketSizes => Self::GetS3BucketSizes,
            CapabilityId::ListEc2Instances => Self::ListEc2Instances,
            CapabilityId::DescribeIamRole => Self::DescribeIamRole { role_name: text("role_name") },
            CapabilityId::SuggestIamPolicy => {
                Self::SuggestIamPolicy { description: text("description") }
            }
            CapabilityId::CreateS3Bucket => {
                Self::CreateS3Bucket { bucket_name: text("bucket_name") }
            }
            CapabilityId::CreateLambdaFunction => Self::CreateLambdaFunction(LambdaFunctionSpec {
                name: text("name"),
                role_arn: text("role_arn"),
                runtime: text("runtime"),
                handler: text("handler"),
                zip_file_path: text("zip_file_path"),
            }),
            CapabilityId::CreateIamRole => {
                let name = text("name");
                let policy_document = bound.remove("policy_document").unwrap_or(Value::Null);
                Self::CreateIamRole { name, policy_document }
            }
            CapabilityId::AssignPolicyToRole => Self::AssignPolicyToRole {
                role_name: text("role_name"),
                policy_arn: text("policy_arn"),
            },
        }
    }

    pub fn capability(&self) -> CapabilityId {
        match self {
            Self::GetS3BucketFileCount { .. } => CapabilityId::GetS3BucketFileCount,
            Self::GetS3BucketSizes => CapabilityId::GetS3BucketSizes,
            Self::ListEc2Instances => CapabilityId::ListEc2Instances,
            Self::DescribeIamRole { .. } => CapabilityId::DescribeIamRole,
            Self::SuggestIamPolicy { .. } => CapabilityId::SuggestIamPolicy,
            Self::CreateS3Bucket { .. } => CapabilityId::CreateS3Bucket,
            Self::CreateLambdaFunction(_) => CapabilityId::CreateLambdaFunction,
            Self::CreateIamRole { .. } => CapabilityId::CreateIamRole,
            Self::AssignPolicyToRole { .. } => CapabilityId::AssignPolicyToRole,
        }
    }

    /// Flat parameter map, as recorded in the audit trail before redaction.
    pub fn parameters(&self) -> RawParameters {
        let mut map = Map::new();
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            Self::GetS3BucketFileCount { bucket_name } => {
                if let Some(bucket_name) = bucket_name {
                    put("bucket_name", json!(bucket_name));
                }
            }
            Self::GetS3BucketSizes | Self::ListEc2Instances => {}
            Self::DescribeIamRole { role_name } => put("role_name", json!(role_name)),
            Self::SuggestIamPolicy { description } => put("description", json!(description)),
            Self::CreateS3Bucket { bucket_name } => put("bucket_name", json!(bucket_name)),
            Self::CreateLambdaFunction(spec) => {
                put("name", json!(spec.name));
                put("role_arn", json!(spec.role_arn));
                put("runtime", json!(spec.runtime));
                put("handler", json!(spec.handler));
                put("zip_file_path", json!(spec.zip_file_path));
            }
            Self::CreateIamRole { name, policy_document } => {
                put("name", json!(name));
                put("policy_document", policy_document.clone());
            }
            Self::AssignPolicyToRole { role_name, policy_arn } => {
                put("role_name", json!(role_name));
                put("policy_arn", json!(policy_arn));
            }
        }
        map
    }
}

/// A capability bound to concrete values for one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedInvocation {
    pub capability: CapabilityId,
    pub invocation: Invocation,
    pub parameters: RawParameters,
}

impl ResolvedInvocation {
    pub fn category(&self) -> CapabilityCategory {
        self.capability.category()
    }

    pub fn service(&self) -> &'static str {
        self.capability.service()
    }

    pub fn is_mutating(&self) -> bool {
        self.category() == CapabilityCategory::Mutating
    }
}
