pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{ActionOutcome, ActionRecord, AuditSink, AuditTrail, InMemoryAuditSink};
pub use domain::capability::{
    CapabilityCategory, CapabilityDescriptor, CapabilityId, Invocation, LambdaFunctionSpec,
    ParameterKind, ParameterSpec, RawParameters, ResolvedInvocation,
};
pub use domain::conversation::{ConversationTurn, Message, Role};
pub use domain::credentials::{CredentialPayload, CredentialSet};
pub use domain::turn::{DenyReason, ExecutionOutcome, TurnResult, TurnState, ValidationVerdict};
pub use errors::{
    ApplicationError, CapabilityError, CredentialError, ErrorKind, InterfaceError, ProviderError,
    ReasoningError,
};
