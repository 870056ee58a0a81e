use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use gymledger_shared::auth::Role;
use gymledger_shared::jwt::{self, JwtClaims};
use tracing::{error, warn};

use super::{AppError, AppState};

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

/// Authenticated caller, placed in request extensions by [`require_bearer`].
#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

impl AuthCtx {
    /// Member the caller acts as. Ledger routes take identity only from here,
    /// never from the request body.
    pub fn member_id(&self) -> Result<i32, AppError> {
        match (self.claims.role, self.claims.member_id) {
            (Role::Member, Some(id)) => Ok(id),
            _ => Err(AppError::forbidden()),
        }
    }
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return unauthorized();
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    validate_claims(&state, &claims).map_err(|e| {
        warn!(error=?e, username=%claims.sub, "auth: validate_claims failed");
        AppError::unauthorized()
    })?;

    let jti = claims.jti.clone();
    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state
        .store
        .touch_session_with_cutoff(&jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %jti,
                username = %claims.sub,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::from(e));
        }
    }
    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(
    state: &AppState,
    username: &str,
    role: Role,
    member_id: Option<i32>,
) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: username.to_string(),
        jti: jti.clone(),
        exp,
        role,
        member_id,
    };

    validate_claims(state, &claims)?;

    state
        .store
        .create_session(&jti, username)
        .await
        .map_err(|e| {
            error!(username, error=%e, "login: create_session failed");
            AppError::from(e)
        })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}

/// Token claims must still match the configured user: same role, and for
/// members the same member binding.
fn validate_claims(state: &AppState, claims: &JwtClaims) -> Result<(), AppError> {
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == claims.sub)
        .ok_or_else(|| {
            warn!(username = %claims.sub, "issue_jwt: unknown user");
            AppError::forbidden()
        })?;

    if user.role != claims.role {
        warn!(
            username = %claims.sub,
            requested_role = ?claims.role,
            actual_role = ?user.role,
            "issue_jwt: role mismatch"
        );
        return Err(AppError::forbidden());
    }

    match claims.role {
        Role::Staff => {
            if claims.member_id.is_some() {
                warn!(username = %claims.sub, "issue_jwt: staff token must not carry a member");
                return Err(AppError::forbidden());
            }
        }
        Role::Member => {
            let member_id = claims.member_id.ok_or_else(|| {
                warn!(username = %claims.sub, "issue_jwt: member token missing member_id");
                AppError::forbidden()
            })?;
            if user.member_id != Some(member_id) {
                warn!(
                    username = %claims.sub,
                    expected = ?user.member_id,
                    requested = member_id,
                    "issue_jwt: member mismatch"
                );
                return Err(AppError::forbidden());
            }
        }
    }

    Ok(())
}
