use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_REGION: &str = "ap-south-1";

/// Cloud access credentials held in volatile session memory only.
///
/// There is intentionally no `Serialize` impl: a credential set cannot end up in
/// a response payload or on disk by accident. `Debug` masks both halves.
#[derive(Clone)]
pub struct CredentialSet {
    access_key_id: String,
    secret_access_key: SecretString,
    region: String,
}

impl CredentialSet {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let region = if region.trim().is_empty() { DEFAULT_REGION.to_string() } else { region };
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            region,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Only resource-provider implementations should call this.
    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    pub fn masked_access_key_id(&self) -> String {
        mask_key(&self.access_key_id)
    }
}

impl PartialEq for CredentialSet {
    fn eq(&self, other: &Self) -> bool {
        self.access_key_id == other.access_key_id
            && self.region == other.region
            && self.secret_access_key.expose_secret() == other.secret_access_key.expose_secret()
    }
}

impl Eq for CredentialSet {}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.masked_access_key_id())
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Inbound wire shape used by transports (`accessKeyId`, `secretAccessKey`, `region`).
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("access_key_id", &mask_key(&self.access_key_id))
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl From<CredentialPayload> for CredentialSet {
    fn from(payload: CredentialPayload) -> Self {
        Self::new(payload.access_key_id, payload.secret_access_key, payload.region)
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn mask_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.len() <= 4 {
        return "****".to_string();
    }
    let suffix: String =
        trimmed.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{suffix}")
}

#[cfg(test)]
mod tests {
    use super::{CredentialPayload, CredentialSet, DEFAULT_REGION};

    #[test]
    fn debug_output_never_contains_secret_or_full_key() {
        let credentials =
            CredentialSet::new("AKIAEXAMPLE12345678", "wJalrXUtnFEMI/K7MDENG", "us-east-1");
        let debug = format!("{credentials:?}");

        assert!(!debug.contains("wJalrXUtnFEMI"));
        assert!(!debug.contains("AKIAEXAMPLE12345678"));
        assert!(debug.contains("****5678"));
        assert!(debug.contains("us-east-1"));
    }

    #[test]
    fn blank_region_falls_back_to_default() {
        let credentials = CredentialSet::new("AKIAEXAMPLE", "secret", "  ");
        assert_eq!(credentials.region(), DEFAULT_REGION);
    }

    #[test]
    fn payload_defaults_region_when_omitted() {
        let payload: CredentialPayload = serde_json::from_str(
            r#"{"accessKeyId":"AKIAEXAMPLE","secretAccessKey":"shh"}"#,
        )
        .expect("payload should parse");
        let credentials = CredentialSet::from(payload);

        assert_eq!(credentials.access_key_id(), "AKIAEXAMPLE");
        assert_eq!(credentials.secret_access_key(), "shh");
        assert_eq!(credentials.region(), DEFAULT_REGION);
    }
}
