//! Resolves `Authorization: Bearer <token>` into a [`Caller`] stored in request
//! extensions. Handlers take the caller explicitly and gate on it.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::auth::{self, Registrar, Session};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub enum Caller {
    /// Public route, or no credential while auth is optional.
    Anonymous,
    Authenticated { session: Session, token: String },
}

impl Caller {
    pub fn require_teacher(&self) -> AppResult<()> {
        match self {
            Caller::Anonymous => Ok(()),
            Caller::Authenticated { session, .. } => session.require_teacher(),
        }
    }

    pub fn require_view_of(&self, student_id: i64) -> AppResult<()> {
        match self {
            Caller::Anonymous => Ok(()),
            Caller::Authenticated { session, .. } => session.require_view_of(student_id),
        }
    }

    pub fn require_session(&self) -> AppResult<(&Session, &str)> {
        match self {
            Caller::Anonymous => Err(AppError::Unauthorized("login required".to_string())),
            Caller::Authenticated { session, token } => Ok((session, token)),
        }
    }

    pub fn registrar(&self, require_auth: bool) -> Registrar {
        match self {
            Caller::Anonymous if !require_auth => Registrar::Teacher,
            Caller::Authenticated { session, .. } if session.require_teacher().is_ok() => {
                Registrar::Teacher
            }
            _ => Registrar::SelfService,
        }
    }

    /// Key under which this caller's drafts are kept.
    pub fn draft_owner(&self) -> String {
        match self {
            Caller::Anonymous => "anonymous".to_string(),
            Caller::Authenticated { session, .. } => format!("user:{}", session.user_id),
        }
    }
}

fn is_public_path(path: &str) -> bool {
    matches!(
        path,
        "/" | "/api/health" | "/api/auth/login" | "/api/auth/register"
    )
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn resolve(state: &AppState, public: bool, token: Option<String>) -> AppResult<Caller> {
    let Some(token) = token else {
        if state.config.require_auth && !public {
            return Err(AppError::Unauthorized("missing bearer token".to_string()));
        }
        return Ok(Caller::Anonymous);
    };
    let lookup = token.clone();
    let session = state
        .db
        .call(move |conn| auth::authenticate(conn, &lookup))
        .await;
    match session {
        Ok(session) => Ok(Caller::Authenticated { session, token }),
        // A stale token does not block login or registration.
        Err(AppError::Unauthorized(_)) if public => Ok(Caller::Anonymous),
        Err(e) => Err(e),
    }
}

pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let public = is_public_path(request.uri().path());
    let token = bearer_token(&request);
    match resolve(&state, public, token).await {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
