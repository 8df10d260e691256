use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_sessions::{Expiry, Session};

use super::{ApiError, ApiResponse, AppState};
use super::types::{
    LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UserInfoResponse,
};
use crate::services::rate_limit::{Decision, EndpointClass};
use crate::services::session::{SessionClaims, SessionExpiry};

/// Session key under which issued claims are stored. The claims are the
/// only session payload; there is no second user store to keep in sync.
const CLAIMS_KEY: &str = "claims";

// ============================================================================
// Client key resolution
// ============================================================================

/// The rate-limiting identity of the caller: the socket peer address, or
/// the first `X-Forwarded-For` entry when the peer is a trusted proxy.
pub struct ClientKey(pub String);

impl FromRequestParts<Arc<AppState>> for ClientKey {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string);

        let trusted = {
            let config = state.config().read().await;
            config.security.trusted_proxy_ips.clone()
        };

        let key = match (peer, forwarded) {
            (Some(peer), Some(forwarded)) if trusted.iter().any(|ip| *ip == peer) => forwarded,
            (Some(peer), _) => peer,
            (None, _) => "unknown".to_string(),
        };

        Ok(Self(key))
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Session-claims gate for protected routes. Claims issued at login are
/// the single source of truth for identity and role.
pub async fn require_session(
    session: Session,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(claims)) = session.get::<SessionClaims>(CLAIMS_KEY).await {
        tracing::Span::current().record("user_id", &claims.username);
        return Ok(next.run(request).await);
    }

    let response = (StatusCode::UNAUTHORIZED, "Unauthorized");
    Ok(response.into_response())
}

/// Budget check for everything under /api, independent of the stricter
/// login and registration budgets.
pub async fn general_rate_limit(
    State(state): State<Arc<AppState>>,
    ClientKey(client_key): ClientKey,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Decision::Deny { retry_after } = state
        .limiter()
        .check(&client_key, EndpointClass::General)
    {
        return Err(ApiError::RateLimited {
            retry_after_seconds: retry_after.as_secs().max(1),
        });
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Verify credentials and establish a session carrying the issued claims.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientKey(client_key): ClientKey,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let claims = state
        .auth()
        .authenticate(
            &client_key,
            &payload.username,
            &payload.password,
            payload.remember,
        )
        .await?;

    apply_expiry(&session, &claims);
    if let Err(e) = session.insert(CLAIMS_KEY, &claims).await {
        return Err(ApiError::internal(format!("Failed to create session: {e}")));
    }

    Ok(Json(ApiResponse::success(LoginResponse {
        username: claims.username,
        display_name: claims.display_name,
        role: claims.role,
    })))
}

/// POST /auth/logout
/// Invalidate the current session
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    (StatusCode::OK, "Logged out")
}

/// POST /auth/register
/// Self-registration. Always creates a standard-role account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientKey(client_key): ClientKey,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .registration()
        .register(
            &client_key,
            &payload.username,
            &payload.display_name,
            &payload.password,
            &payload.confirm_password,
        )
        .await?;

    tracing::info!("Account registered: {}", account.username);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(MessageResponse {
            message: "Account created".to_string(),
        })),
    ))
}

/// GET /auth/me
/// Current session claims (requires authentication)
pub async fn get_current_user(
    session: Session,
) -> Result<Json<ApiResponse<UserInfoResponse>>, ApiError> {
    let claims = get_session_claims(&session).await?;

    Ok(Json(ApiResponse::success(UserInfoResponse {
        username: claims.username,
        display_name: claims.display_name,
        role: claims.role,
        issued_at: claims.issued_at,
    })))
}

// ============================================================================
// Helpers
// ============================================================================

/// Map the claims' expiry policy onto the session cookie.
fn apply_expiry(session: &Session, claims: &SessionClaims) {
    let expiry = match claims.expiry {
        SessionExpiry::Idle(seconds) => Expiry::OnInactivity(time::Duration::seconds(
            i64::try_from(seconds).unwrap_or(i64::MAX),
        )),
        SessionExpiry::Absolute(seconds) => Expiry::AtDateTime(
            time::OffsetDateTime::now_utc()
                + time::Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX)),
        ),
    };

    session.set_expiry(Some(expiry));
}

/// Get claims from session, returns error if not authenticated
async fn get_session_claims(session: &Session) -> Result<SessionClaims, ApiError> {
    session
        .get::<SessionClaims>(CLAIMS_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
}
