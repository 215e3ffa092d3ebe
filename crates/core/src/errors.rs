use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by every layer of the turn pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCapability,
    MissingParameter,
    CredentialsRequired,
    AuthorizationDenied,
    InvalidRequest,
    Transient,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownCapability => "unknown_capability",
            Self::MissingParameter => "missing_parameter",
            Self::CredentialsRequired => "credentials_required",
            Self::AuthorizationDenied => "authorization_denied",
            Self::InvalidRequest => "invalid_request",
            Self::Transient => "transient",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("capability `{capability}` is missing required parameters: {missing:?}")]
    MissingParameter { capability: String, missing: Vec<String> },
    #[error("capability `{capability}` parameter `{parameter}` must be {expected}")]
    InvalidParameter { capability: String, parameter: String, expected: &'static str },
}

impl CapabilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCapability(_) => ErrorKind::UnknownCapability,
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } => {
                ErrorKind::MissingParameter
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credentials are required for this operation")]
    CredentialsRequired,
}

/// Typed failure raised by a resource-provider primitive.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("internal provider failure: {0}")]
    Internal(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(detail)
            | Self::AuthorizationDenied(detail)
            | Self::InvalidRequest(detail)
            | Self::Internal(detail) => detail,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("reasoning provider unavailable: {0}")]
    Unavailable(String),
    #[error("reasoning provider returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("reasoning provider rejected the request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error("session `{0}` was not found")]
    SessionNotFound(String),
    #[error("session `{0}` has ended")]
    SessionEnded(String),
    #[error("conversation history does not match session `{0}`")]
    HistoryMismatch(String),
    #[error("session capacity of {0} is exhausted")]
    SessionLimitReached(usize),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested session does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Capability(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::HistoryMismatch(_) | ApplicationError::SessionEnded(_) => {
                Self::BadRequest { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Credential(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::SessionNotFound(_) => {
                Self::NotFound { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Provider(ProviderError::Transient(message))
            | ApplicationError::Reasoning(ReasoningError::Unavailable(message)) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::SessionLimitReached(_) => {
                let message = value.to_string();
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Provider(error) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Reasoning(error) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
        }
    }
}
