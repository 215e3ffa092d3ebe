use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use cloudpilot_agent::{Orchestrator, Session, TurnRequest};
use cloudpilot_core::audit::ActionRecord;
use cloudpilot_core::config::ServerConfig;
use cloudpilot_core::domain::capability::CapabilityDescriptor;
use cloudpilot_core::domain::conversation::Message;
use cloudpilot_core::domain::credentials::{CredentialPayload, CredentialSet};
use cloudpilot_core::domain::turn::TurnResult;
use cloudpilot_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { max_sessions: 1024, idle_ttl: Duration::from_secs(3600) }
    }
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_ttl: Duration::from_secs(config.session_idle_secs),
        }
    }
}

struct StoredSession {
    handle: SessionHandle,
    last_used: Instant,
}

/// Process-local sessions. Each session has its own async lock so turns on one
/// session are serialized while different sessions proceed independently.
///
/// The store holds at most `max_sessions`; sessions idle past `idle_ttl` are
/// evicted, ended or not, so an ended session's audit stays readable only
/// until then.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, StoredSession>>>,
    seed_credentials: Option<CredentialSet>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(seed_credentials: Option<CredentialSet>, limits: SessionLimits) -> Self {
        Self { sessions: Arc::default(), seed_credentials, limits }
    }

    pub fn create(&self) -> Result<String, ApplicationError> {
        let now = Instant::now();
        let mut sessions = self.lock();
        if sessions.len() >= self.limits.max_sessions {
            evict_idle(&mut sessions, self.limits.idle_ttl, now);
        }
        if sessions.len() >= self.limits.max_sessions {
            return Err(ApplicationError::SessionLimitReached(self.limits.max_sessions));
        }

        let id = Uuid::new_v4().to_string();
        let session = match &self.seed_credentials {
            Some(credentials) => Session::with_credentials(id.clone(), credentials.clone()),
            None => Session::new(id.clone()),
        };
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        sessions.insert(id.clone(), StoredSession { handle, last_used: now });
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<SessionHandle, ApplicationError> {
        let mut sessions = self.lock();
        let stored = sessions
            .get_mut(id)
            .ok_or_else(|| ApplicationError::SessionNotFound(id.to_string()))?;
        stored.last_used = Instant::now();
        Ok(stored.handle.clone())
    }

    /// Evicts sessions idle past the limit and returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        evict_idle(&mut self.lock(), self.limits.idle_ttl, now)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A session whose handle is cloned elsewhere is mid-request and is kept.
fn evict_idle(
    sessions: &mut HashMap<String, StoredSession>,
    idle_ttl: Duration,
    now: Instant,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, stored| {
        Arc::strong_count(&stored.handle) > 1
            || now.saturating_duration_since(stored.last_used) < idle_ttl
    });
    before - sessions.len()
}

/// Periodically evicts idle sessions until the task is aborted.
pub fn spawn_sweeper(store: SessionStore) -> JoinHandle<()> {
    let period = store.limits.idle_ttl.min(MAX_SWEEP_PERIOD);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = store.sweep();
            if evicted > 0 {
                info!(
                    event_name = "api.session.evicted",
                    evicted,
                    remaining = store.len(),
                    "idle sessions evicted"
                );
            }
        }
    })
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SessionStore,
}

#[derive(Debug, Deserialize)]
pub struct TurnPayload {
    pub history: Vec<Message>,
    #[serde(default)]
    pub credentials: Option<CredentialPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub session_id: String,
    pub closed: bool,
    pub records: Vec<ActionRecord>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
    correlation_id: String,
}

/// Transport wrapper so handlers can return `InterfaceError` directly.
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            InterfaceError::Internal { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail: detail.clone(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/capabilities", get(list_capabilities))
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/{id}", axum::routing::delete(end_session))
        .route("/api/v1/sessions/{id}/turns", post(submit_turn))
        .route("/api/v1/sessions/{id}/credentials", put(supply_credentials))
        .route("/api/v1/sessions/{id}/audit", get(audit_trail))
        .with_state(state)
}

async fn list_capabilities(State(state): State<ApiState>) -> Json<Vec<CapabilityDescriptor>> {
    Json(state.orchestrator.registry().all().to_vec())
}

async fn create_session(
    State(state): State<ApiState>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = state.sessions.create().map_err(|error| {
        warn!(
            event_name = "api.session.rejected",
            correlation_id = %correlation_id,
            error = %error,
            "session capacity exhausted"
        );
        error.into_interface(&correlation_id)
    })?;
    info!(event_name = "api.session.created", session_id = %session_id, "session created");
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

fn validate_credentials(
    payload: &CredentialPayload,
    correlation_id: &str,
) -> Result<(), ApiError> {
    if payload.access_key_id.trim().is_empty() || payload.secret_access_key.trim().is_empty() {
        return Err(InterfaceError::BadRequest {
            message: "accessKeyId and secretAccessKey must not be empty".to_string(),
            correlation_id: correlation_id.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn submit_turn(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(payload): Json<TurnPayload>,
) -> Result<Json<TurnResult>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let handle = state.sessions.get(&id).map_err(|error| error.into_interface(&correlation_id))?;

    let mut request = TurnRequest::new(payload.history);
    if let Some(credentials) = payload.credentials {
        validate_credentials(&credentials, &correlation_id)?;
        request = request.with_credentials(credentials.into());
    }

    let mut session = handle.lock().await;
    let result = state.orchestrator.submit(&mut session, request).await;
    if let Some(error) = &result.error {
        warn!(
            event_name = "api.turn.rejected",
            session_id = %id,
            correlation_id = %correlation_id,
            error = %error,
            "turn rejected"
        );
    }
    Ok(Json(result))
}

async fn supply_credentials(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(payload): Json<CredentialPayload>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let handle = state.sessions.get(&id).map_err(|error| error.into_interface(&correlation_id))?;

    validate_credentials(&payload, &correlation_id)?;

    let mut session = handle.lock().await;
    if session.is_closed() {
        return Err(ApplicationError::SessionEnded(id).into_interface(correlation_id).into());
    }
    session.supply_credentials(payload.into());
    info!(
        event_name = "api.credentials.supplied",
        session_id = %id,
        correlation_id = %correlation_id,
        "credentials supplied"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn audit_trail(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<AuditResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let handle = state.sessions.get(&id).map_err(|error| error.into_interface(correlation_id))?;
    let session = handle.lock().await;

    Ok(Json(AuditResponse {
        session_id: id,
        closed: session.is_closed(),
        records: session.audit().records().to_vec(),
    }))
}

/// Ends the session; its audit trail stays readable.
async fn end_session(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let handle = state.sessions.get(&id).map_err(|error| error.into_interface(correlation_id))?;
    handle.lock().await.end();
    info!(event_name = "api.session.ended", session_id = %id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}
