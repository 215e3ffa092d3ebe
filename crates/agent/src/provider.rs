use async_trait::async_trait;
use cloudpilot_core::domain::capability::LambdaFunctionSpec;
use cloudpilot_core::domain::credentials::CredentialSet;
use cloudpilot_core::errors::ProviderError;
use serde_json::Value;

/// Cloud control-plane primitives, one per capability.
///
/// Implementations validate credentials on first real use and report every
/// failure through the typed `ProviderError` taxonomy.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn get_s3_bucket_file_count(
        &self,
        bucket_name: Option<&str>,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn get_s3_bucket_sizes(
        &self,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn list_ec2_instances(
        &self,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn describe_iam_role(
        &self,
        role_name: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn suggest_iam_policy(
        &self,
        description: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn create_s3_bucket(
        &self,
        bucket_name: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn create_lambda_function(
        &self,
        spec: &LambdaFunctionSpec,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn create_iam_role(
        &self,
        name: &str,
        policy_document: &Value,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;

    async fn assign_policy_to_role(
        &self,
        role_name: &str,
        policy_arn: &str,
        credentials: Option<&CredentialSet>,
    ) -> Result<Value, ProviderError>;
}
