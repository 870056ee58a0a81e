mod acl;
pub mod auth;
mod config;

use crate::ledger::activity::ActivityOutcome;
use crate::ledger::LedgerError;
use crate::server::auth::AuthCtx;
use crate::storage::{StorageError, Store};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, FromRequest, Path, Query, Request, State},
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use bcrypt::verify;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
pub use config::{AppConfig, ConfigError, Role, UserConfig};
use gymledger_shared::api;
use gymledger_shared::domain::{ActivityType, LedgerSource};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

/// JSON body extractor whose rejections use the API error body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        // Catalog
        .route("/api/v1/quests", get(api_list_quests))
        .route("/api/v1/rewards", get(api_list_rewards))
        .route("/api/v1/rewards/{id}", get(api_get_reward))
        .route("/api/v1/badges", get(api_list_badges))
        // Authenticated member
        .route("/api/v1/me/points", get(api_my_points))
        .route("/api/v1/me/ledger", get(api_my_ledger))
        .route("/api/v1/me/quests", get(api_my_quests))
        .route("/api/v1/me/attendance", get(api_my_attendance))
        .route("/api/v1/me/attendance/check-in", post(api_check_in))
        .route("/api/v1/me/exercises", post(api_log_exercise))
        .route("/api/v1/me/diet", post(api_log_diet))
        .route("/api/v1/me/goals", post(api_create_goal))
        .route("/api/v1/me/goals/{id}/achieve", post(api_achieve_goal))
        .route("/api/v1/me/posts", post(api_create_post))
        .route("/api/v1/me/rewards/{id}/redeem", post(api_redeem))
        .route("/api/v1/me/exchanges", get(api_my_exchanges))
        .route("/api/v1/me/badges", get(api_my_badges))
        // Staff
        .route(
            "/api/v1/admin/members/{id}/points",
            get(api_member_points).post(api_grant_points),
        )
        .route("/api/v1/admin/members/{id}/badges", post(api_grant_badge))
        .route("/api/v1/admin/rewards", post(api_create_reward))
        .route("/api/v1/admin/rewards/{id}/restock", post(api_restock_reward))
        .with_state(state.clone())
        // Outermost layer runs first: bearer, then ACL, then span fields
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            member_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(api::IDEMPOTENCY_KEY_HEADER),
            ]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    // Balances change on every write; never cache API responses
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(mid) = auth.claims.member_id {
            span.record("member_id", mid);
        }
    }
    Ok(next.run(req).await)
}

fn rfc3339(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn parse_instant(field: &str, value: Option<&str>) -> Result<Option<NaiveDateTime>, AppError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_utc())
                .map_err(|_| AppError::bad_request(format!("{field} must be an RFC3339 timestamp")))
        })
        .transpose()
}

/// Reads the optional idempotency key. A present but unusable key is an
/// error rather than silently ignored, so retries never double-count.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(raw) = headers.get(api::IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .map_err(|_| AppError::bad_request("idempotency key must be visible ASCII"))?
        .trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::bad_request(format!(
            "idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_string()))
}

fn activity_resp(outcome: ActivityOutcome) -> api::ActivityResp {
    let quest = api::QuestOutcomeDto::from(outcome.quest);
    api::ActivityResp {
        record_id: outcome.record_id,
        points_earned: quest.points_earned,
        completed_quests: quest.completed_quests,
        total_points: outcome.total_points,
    }
}

fn reward_dto(r: crate::storage::models::Reward) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        name: r.name,
        required_points: r.required_points,
        stock_quantity: r.stock_quantity,
        category: r.category,
    }
}

fn parse_activity(raw: &str) -> Result<ActivityType, AppError> {
    raw.parse::<ActivityType>().map_err(AppError::internal)
}

// Catalog

async fn api_list_quests(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::QuestDto>>, AppError> {
    let rows = state.store.list_quests().await?;
    let items = rows
        .into_iter()
        .map(|q| {
            Ok(api::QuestDto {
                quest_type: parse_activity(&q.quest_type)?,
                id: q.id,
                name: q.name,
                target_value: q.target_value,
                points_reward: q.points_reward,
                description: q.description,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(Json(items))
}

async fn api_list_rewards(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state.store.list_rewards().await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

async fn api_get_reward(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<api::RewardDto>, AppError> {
    let reward = state
        .store
        .get_reward(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("reward {id} not found")))?;
    Ok(Json(reward_dto(reward)))
}

async fn api_list_badges(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::BadgeDto>>, AppError> {
    let rows = state.store.list_badges().await?;
    let items = rows
        .into_iter()
        .map(|b| api::BadgeDto {
            id: b.id,
            name: b.name,
            description: b.description,
        })
        .collect();
    Ok(Json(items))
}

// Authenticated member

async fn api_my_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::BalanceDto>, AppError> {
    let member_id = auth.member_id()?;
    let total_points = state.store.balance(member_id).await?;
    Ok(Json(api::BalanceDto {
        member_id,
        total_points,
    }))
}

#[derive(Deserialize)]
struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn api_my_ledger(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    opts: Result<Query<PageOpts>, QueryRejection>,
) -> Result<Json<Vec<api::LedgerEntryDto>>, AppError> {
    let member_id = auth.member_id()?;
    let Query(opts) = opts?;
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(20);
    let rows = state.store.list_ledger(member_id, page, per_page).await?;
    let items = rows
        .into_iter()
        .map(|e| {
            Ok(api::LedgerEntryDto {
                source: e
                    .source_type
                    .parse::<LedgerSource>()
                    .map_err(AppError::internal)?,
                id: e.id,
                amount: e.amount,
                description: e.description,
                balance_after: e.balance_after,
                time: rfc3339(e.created_at),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct QuestBoardOpts {
    #[serde(rename = "type")]
    quest_type: Option<String>,
    status: Option<api::QuestStatusFilter>,
}

async fn api_my_quests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    opts: Result<Query<QuestBoardOpts>, QueryRejection>,
) -> Result<Json<Vec<api::QuestProgressDto>>, AppError> {
    let member_id = auth.member_id()?;
    let Query(opts) = opts?;
    let type_filter = opts
        .quest_type
        .as_deref()
        .map(str::parse::<ActivityType>)
        .transpose()
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    let rows = state.store.quest_board(member_id).await?;
    let mut items = Vec::with_capacity(rows.len());
    for (quest, progress) in rows {
        let quest_type = parse_activity(&quest.quest_type)?;
        if type_filter.is_some_and(|t| t != quest_type) {
            continue;
        }
        let is_completed = progress.as_ref().is_some_and(|p| p.is_completed);
        match opts.status {
            Some(api::QuestStatusFilter::Available) if is_completed => continue,
            Some(api::QuestStatusFilter::Completed) if !is_completed => continue,
            _ => {}
        }
        items.push(api::QuestProgressDto {
            id: quest.id,
            name: quest.name,
            quest_type,
            target_value: quest.target_value,
            points_reward: quest.points_reward,
            current_progress: progress.as_ref().map_or(0, |p| p.current_progress),
            is_completed,
            completed_at: progress.and_then(|p| p.completed_at).map(rfc3339),
        });
    }
    Ok(Json(items))
}

async fn api_check_in(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<(StatusCode, Json<api::CheckInResp>), AppError> {
    let member_id = auth.member_id()?;
    let today = state.config.today().map_err(AppError::internal)?;
    let check_in = state
        .store
        .check_in(member_id, today, state.config.attendance_bonus)
        .await?;
    let points_earned = check_in.points_earned();
    let quest = api::QuestOutcomeDto::from(check_in.quest);
    Ok((
        StatusCode::CREATED,
        Json(api::CheckInResp {
            attendance_id: check_in.attendance_id,
            bonus_points: check_in.bonus_points,
            points_earned,
            completed_quests: quest.completed_quests,
            total_points: check_in.total_points,
        }),
    ))
}

#[derive(Deserialize)]
struct AttendanceOpts {
    date: Option<String>,
}

async fn api_my_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    opts: Result<Query<AttendanceOpts>, QueryRejection>,
) -> Result<Json<Vec<api::AttendanceDto>>, AppError> {
    let member_id = auth.member_id()?;
    let Query(opts) = opts?;
    let on = opts
        .date
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::bad_request("date must be YYYY-MM-DD"))?;
    let rows = state.store.list_attendance(member_id, on).await?;
    let items = rows
        .into_iter()
        .map(|a| api::AttendanceDto {
            id: a.id,
            attended_on: a.attended_on.format("%Y-%m-%d").to_string(),
            attended_at: rfc3339(a.attended_at),
        })
        .collect();
    Ok(Json(items))
}

async fn api_log_exercise(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<api::ExerciseLogReq>,
) -> Result<(StatusCode, Json<api::ActivityResp>), AppError> {
    let member_id = auth.member_id()?;
    let key = idempotency_key(&headers)?;
    let performed_at = parse_instant("performed_at", body.performed_at.as_deref())?;
    let outcome = state
        .store
        .log_exercise(
            member_id,
            &body.exercise_name,
            body.duration_minutes,
            performed_at,
            key.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(activity_resp(outcome))))
}

async fn api_log_diet(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<api::DietLogReq>,
) -> Result<(StatusCode, Json<api::ActivityResp>), AppError> {
    let member_id = auth.member_id()?;
    let key = idempotency_key(&headers)?;
    let ate_at = parse_instant("ate_at", body.ate_at.as_deref())?;
    let outcome = state
        .store
        .log_diet(
            member_id,
            &body.food_name,
            body.meal_type.as_deref(),
            ate_at,
            key.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(activity_resp(outcome))))
}

#[derive(Debug, serde::Serialize)]
struct GoalCreatedResp {
    id: i32,
    item_name: String,
    target_date: String,
    is_achieved: bool,
}

async fn api_create_goal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    ApiJson(body): ApiJson<api::GoalReq>,
) -> Result<(StatusCode, Json<GoalCreatedResp>), AppError> {
    let member_id = auth.member_id()?;
    let target_date = NaiveDate::parse_from_str(&body.target_date, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request("target_date must be YYYY-MM-DD"))?;
    let goal = state
        .store
        .create_goal(member_id, &body.item_name, target_date)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(GoalCreatedResp {
            id: goal.id,
            item_name: goal.item_name,
            target_date: goal.target_date.format("%Y-%m-%d").to_string(),
            is_achieved: goal.is_achieved,
        }),
    ))
}

async fn api_achieve_goal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(goal_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<api::ActivityResp>, AppError> {
    let member_id = auth.member_id()?;
    let key = idempotency_key(&headers)?;
    let outcome = state
        .store
        .achieve_goal(member_id, goal_id, key.as_deref())
        .await?;
    Ok(Json(activity_resp(outcome)))
}

async fn api_create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<api::PostReq>,
) -> Result<(StatusCode, Json<api::ActivityResp>), AppError> {
    let member_id = auth.member_id()?;
    let key = idempotency_key(&headers)?;
    let outcome = state
        .store
        .create_post(
            member_id,
            body.kind,
            &body.title,
            body.body.as_deref(),
            key.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(activity_resp(outcome))))
}

async fn api_redeem(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(reward_id): Path<i32>,
) -> Result<(StatusCode, Json<api::RedeemResp>), AppError> {
    let member_id = auth.member_id()?;
    let r = state.store.redeem(member_id, reward_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(api::RedeemResp {
            exchange_id: r.exchange_id,
            reward_id: r.reward_id,
            reward_name: r.reward_name,
            used_points: r.used_points,
            total_points: r.balance,
            time: rfc3339(r.exchanged_at),
        }),
    ))
}

async fn api_my_exchanges(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ExchangeHistoryItemDto>>, AppError> {
    let member_id = auth.member_id()?;
    let rows = state.store.list_exchanges(member_id).await?;
    let items = rows
        .into_iter()
        .map(|(x, reward_name)| api::ExchangeHistoryItemDto {
            exchange_id: x.id,
            reward_id: x.reward_id,
            reward_name,
            used_points: x.used_points,
            time: rfc3339(x.exchanged_at),
        })
        .collect();
    Ok(Json(items))
}

async fn api_my_badges(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::MemberBadgeDto>>, AppError> {
    let member_id = auth.member_id()?;
    let rows = state.store.list_member_badges(member_id).await?;
    let items = rows
        .into_iter()
        .map(|(b, earned_at)| api::MemberBadgeDto {
            badge_id: b.id,
            name: b.name,
            earned_at: rfc3339(earned_at),
        })
        .collect();
    Ok(Json(items))
}

// Staff

async fn api_member_points(
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
) -> Result<Json<api::BalanceDto>, AppError> {
    let total_points = state.store.balance(member_id).await?;
    Ok(Json(api::BalanceDto {
        member_id,
        total_points,
    }))
}

async fn api_grant_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(member_id): Path<i32>,
    ApiJson(body): ApiJson<api::GrantPointsReq>,
) -> Result<(StatusCode, Json<api::GrantPointsResp>), AppError> {
    if body.points <= 0 {
        return Err(AppError::bad_request("points must be positive"));
    }
    let description = body
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("granted by {}", auth.claims.sub));
    let posting = state
        .store
        .credit_points(
            member_id,
            body.points,
            LedgerSource::ManualGrant,
            Some(&description),
        )
        .await?;
    tracing::info!(
        member_id,
        points = body.points,
        staff = %auth.claims.sub,
        "points granted"
    );
    Ok((
        StatusCode::CREATED,
        Json(api::GrantPointsResp {
            ledger_entry_id: posting.entry_id,
            total_points: posting.balance,
        }),
    ))
}

async fn api_grant_badge(
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
    ApiJson(body): ApiJson<api::GrantBadgeReq>,
) -> Result<(StatusCode, Json<api::MemberBadgeDto>), AppError> {
    let (badge, earned_at) = state.store.grant_badge(member_id, body.badge_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(api::MemberBadgeDto {
            badge_id: badge.id,
            name: badge.name,
            earned_at: rfc3339(earned_at),
        }),
    ))
}

async fn api_create_reward(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<api::CreateRewardReq>,
) -> Result<(StatusCode, Json<api::RewardDto>), AppError> {
    let reward = state
        .store
        .create_reward(
            &body.name,
            body.required_points,
            body.stock_quantity,
            body.category.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reward_dto(reward))))
}

async fn api_restock_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<i32>,
    ApiJson(body): ApiJson<api::RestockReq>,
) -> Result<Json<api::RewardDto>, AppError> {
    state.store.restock_reward(reward_id, body.quantity).await?;
    let reward = state
        .store
        .get_reward(reward_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("reward {reward_id} not found")))?;
    Ok(Json(reward_dto(reward)))
}

async fn api_auth_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let token =
        auth::issue_jwt_for_user(&state, &user.username, user.role, user.member_id).await?;
    Ok(Json(api::AuthResp { token }))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest { kind: &'static str, msg: String },
    Unauthorized,
    Forbidden,
    NotFound(String),
    Internal { msg: String, retryable: bool },
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest {
            kind: "bad_request",
            msg: msg.into(),
        }
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal {
            msg: e.to_string(),
            retryable: false,
        }
    }
}

fn conflict_kind(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::Validation(_) => "validation",
        LedgerError::InsufficientBalance { .. } => "insufficient_balance",
        LedgerError::OutOfStock(_) => "out_of_stock",
        LedgerError::AlreadyCheckedInToday => "already_checked_in",
        LedgerError::DuplicateActivity(_) => "duplicate_activity",
        LedgerError::AlreadyAwarded { .. } => "already_awarded",
        LedgerError::NotFound(_) => "not_found",
        LedgerError::Database(_) => "internal",
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest {
            kind: "validation",
            msg: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest {
            kind: "validation",
            msg: rejection.body_text(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::Ledger(LedgerError::NotFound(_)) => Self::NotFound(err.to_string()),
            StorageError::Ledger(le @ LedgerError::Validation(_)) => Self::BadRequest {
                kind: conflict_kind(le),
                msg: le.to_string(),
            },
            StorageError::Ledger(le) if le.is_conflict() => Self::BadRequest {
                kind: conflict_kind(le),
                msg: le.to_string(),
            },
            _ => Self::Internal {
                retryable: err.is_retryable(),
                msg: err.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, retryable, detail) = match self {
            AppError::BadRequest { kind, msg } => (StatusCode::BAD_REQUEST, msg, kind, false, None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                false,
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden".into(),
                "forbidden",
                false,
                None,
            ),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", false, None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal { msg, retryable } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                retryable,
                Some(msg),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind, retryable, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind, message = %msg, "request rejected");
        }
        let body = Json(api::ErrorBody {
            error: msg,
            kind: kind.to_string(),
            retryable,
        });
        (status, body).into_response()
    }
}
