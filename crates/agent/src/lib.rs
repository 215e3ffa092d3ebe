//! Agent runtime - turns one conversation turn into at most one cloud action
//!
//! The pipeline for a submitted turn:
//! 1. **Routing** (`router`) - the reasoning provider picks zero or one capability
//!    from the closed catalog in `tools`; unknown names and missing parameters
//!    become clarifying replies.
//! 2. **Validation** (`guardrails`) - every invocation passes the gate; mutating
//!    capabilities need credentials from the session's `credentials` broker.
//! 3. **Execution** (`executor`) - the resource provider primitive runs once and
//!    exactly one `ActionRecord` is appended to the session audit trail.
//! 4. **Synthesis** (`runtime`) - the reasoning provider phrases the outcome.
//!
//! # Key Types
//!
//! - `Orchestrator` - per-turn state machine (see `runtime` module)
//! - `Session` - history, credentials and audit trail for one conversation
//! - `ReasoningProvider` / `ResourceProvider` - pluggable collaborators
//!
//! # Safety Principle
//!
//! The language model only ever proposes. Whether an action may run, and with
//! which credentials, is decided deterministically by the gate and the broker.

pub mod conversation;
pub mod credentials;
pub mod executor;
pub mod guardrails;
pub mod llm;
pub mod provider;
pub mod router;
pub mod runtime;
pub mod sandbox;
pub mod session;
pub mod tools;

pub use conversation::RuleBasedReasoner;
pub use credentials::CredentialBroker;
pub use executor::ExecutionEngine;
pub use guardrails::{GuardrailPolicy, ValidationGate};
pub use llm::{OpenAiCompatibleReasoner, ProviderDecision, ReasoningProvider, SynthesisOutcome};
pub use provider::ResourceProvider;
pub use router::{IntentRouter, RouteDecision};
pub use runtime::{Orchestrator, TurnRequest};
pub use sandbox::SandboxCloud;
pub use session::{InterruptedExecution, Session};
pub use tools::CapabilityRegistry;
