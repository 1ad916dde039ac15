use std::sync::Arc;

use axum::{
    Router, debug_handler,
    body::Bytes,
    extract::{Extension, Json},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use e2e_auth::{AuthMode, SharedAuthTicketStore};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, info, warn};

use crate::{
    config::GatewayConfig,
    guards::GuardRegistry,
    session::{SessionStore, cookie_value, set_cookie_value},
};

pub const TOKEN_NAME: &str = "pest-e2e";

#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub tickets: SharedAuthTicketStore,
    pub guards: GuardRegistry,
    pub sessions: Arc<SessionStore>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        tickets: SharedAuthTicketStore,
        guards: GuardRegistry,
    ) -> Self {
        Self {
            tickets,
            guards,
            sessions: Arc::new(SessionStore::new(time::Duration::seconds(
                config.session_idle_seconds,
            ))),
            config,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ApiError {
    pub message: String,
}

/// Every way a ticket redemption can be refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("E2E auth endpoint is only available for testing.")]
    Forbidden,
    #[error("The ticket is invalid or expired.")]
    InvalidTicket,
    #[error("The mode must be a valid auth mode.")]
    InvalidMode,
    #[error("The guard must be a valid auth guard.")]
    InvalidGuard,
    #[error("User not found for ticket.")]
    UserNotFound,
    #[error("Guard does not support session authentication.")]
    SessionsUnsupported,
    #[error("User model cannot issue tokens.")]
    TokensUnsupported,
    #[error("Unable to issue token.")]
    TokenFailed,
}

impl LoginError {
    pub fn status(&self) -> StatusCode {
        match self {
            LoginError::Forbidden => StatusCode::FORBIDDEN,
            LoginError::InvalidTicket | LoginError::UserNotFound => StatusCode::UNAUTHORIZED,
            LoginError::InvalidMode | LoginError::InvalidGuard => StatusCode::UNPROCESSABLE_ENTITY,
            LoginError::SessionsUnsupported
            | LoginError::TokensUnsupported
            | LoginError::TokenFailed => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl From<LoginError> for (StatusCode, Json<ApiError>) {
    fn from(err: LoginError) -> Self {
        (
            err.status(),
            Json(ApiError {
                message: err.to_string(),
            }),
        )
    }
}

pub fn build_router(state: GatewayState) -> Router {
    let route = state.config.auth_route.clone();
    Router::new()
        .route(&route, post(login))
        .route("/me", get(me))
        .layer(Extension(Arc::new(state)))
}

#[debug_handler]
async fn login(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, (StatusCode, Json<ApiError>)> {
    let span = tracing::info_span!("e2e.auth.login");
    handle_login(&state, &headers, &body)
        .instrument(span)
        .await
        .map_err(|err| {
            debug!(status = err.status().as_u16(), reason = %err, "auth ticket refused");
            err.into()
        })
}

pub async fn handle_login(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, LoginError> {
    if !state.config.is_testing() || !has_test_header(&state.config, headers) {
        warn!("auth endpoint called outside testing");
        return Err(LoginError::Forbidden);
    }

    let input = parse_body(body);
    let ticket = input.get("ticket").and_then(Value::as_str).unwrap_or("");
    // burnt from here on, whatever follows
    let record = state
        .tickets
        .consume(ticket)
        .ok_or(LoginError::InvalidTicket)?;

    let mode = parse_mode(input.get("mode"))?;
    let guard_name = match input.get("guard") {
        None | Some(Value::Null) => record.guard.clone(),
        Some(Value::String(name)) if name.is_empty() => record.guard.clone(),
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(LoginError::InvalidGuard),
    };
    let guard = state.guards.get(&guard_name).ok_or_else(|| {
        debug!(guard = %guard_name, known = ?state.guards.names(), "unknown guard");
        LoginError::InvalidGuard
    })?;

    let user = guard
        .provider()
        .retrieve_by_id(&record.user_id)
        .ok_or(LoginError::UserNotFound)?;

    match mode {
        AuthMode::Session => {
            if !guard.supports_sessions() {
                return Err(LoginError::SessionsUnsupported);
            }
            let session = state.sessions.login(&guard.name, user.auth_identifier());
            info!(user = %record.user_id, guard = %guard.name, mode = %mode, "e2e session started");
            let cookie = set_cookie_value(&state.config.session_cookie, &session);
            Ok(([(SET_COOKIE, cookie)], Json(json!({}))).into_response())
        }
        AuthMode::Sanctum => {
            let issuer = user.token_issuer().ok_or(LoginError::TokensUnsupported)?;
            let token = issuer.create_token(TOKEN_NAME).map_err(|err| {
                warn!(error = %err, "token issuing failed");
                LoginError::TokenFailed
            })?;
            if token.is_empty() {
                return Err(LoginError::TokenFailed);
            }
            info!(user = %record.user_id, guard = %guard.name, mode = %mode, "e2e token issued");
            Ok(Json(json!({ "token": token })).into_response())
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CurrentUser {
    pub id: e2e_auth::UserId,
    pub guard: String,
}

/// Reports the user bound to the session cookie.
#[debug_handler]
async fn me(
    Extension(state): Extension<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<CurrentUser>, (StatusCode, Json<ApiError>)> {
    let session = cookie_value(&headers, &state.config.session_cookie)
        .and_then(|id| state.sessions.get(&id))
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError {
                    message: "Unauthenticated.".into(),
                }),
            )
        })?;
    Ok(Json(CurrentUser {
        id: session.user_id,
        guard: session.guard,
    }))
}

fn has_test_header(config: &GatewayConfig, headers: &HeaderMap) -> bool {
    headers
        .get(config.header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == config.header_value)
}

/// Malformed bodies read as empty input so the ticket check answers first.
fn parse_body(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn parse_mode(raw: Option<&Value>) -> Result<AuthMode, LoginError> {
    match raw {
        None | Some(Value::Null) => Ok(AuthMode::default()),
        Some(Value::String(mode)) => mode.parse().map_err(|_| LoginError::InvalidMode),
        Some(_) => Err(LoginError::InvalidMode),
    }
}
