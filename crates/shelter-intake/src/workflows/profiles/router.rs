use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::audit::{AuditAction, AuditCursor, AuditFilter, TargetType, MAX_STATS_WINDOW_DAYS};
use super::domain::{
    Actor, ActorId, ProfileDraft, ProfileId, ProfileQuery, ProfileStatus, ProfileUpdate,
    ProfileView, Role,
};
use super::lifecycle::{LifecycleEngine, LifecycleError};
use super::rate_limit::RateLimitedAction;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

const DEFAULT_STATS_WINDOW_DAYS: u32 = 30;

/// Router exposing the lifecycle operations, the audit trail and rate-limit
/// lookups. The verified actor is taken from the identity gateway headers.
pub fn profile_router(engine: Arc<LifecycleEngine>) -> Router {
    Router::new()
        .route(
            "/api/v1/profiles",
            post(submit_handler).get(list_handler),
        )
        .route("/api/v1/profiles/search", get(search_handler))
        .route(
            "/api/v1/profiles/:id",
            get(get_handler).patch(update_handler).delete(remove_handler),
        )
        .route("/api/v1/profiles/:id/status", post(status_handler))
        .route("/api/v1/audit", get(audit_handler))
        .route("/api/v1/audit/stats", get(audit_stats_handler))
        .route("/api/v1/rate-limits/:action", get(rate_limit_handler))
        .with_state(engine)
}

/// `None` when either header is missing, blank or names an unknown role.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id = headers.get(ACTOR_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }
    let role = Role::parse(headers.get(ACTOR_ROLE_HEADER)?.to_str().ok()?)?;
    Some(Actor::new(id, role))
}

fn unauthenticated() -> Response {
    let payload = json!({ "error": "verified actor required" });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

fn error_response(error: LifecycleError) -> Response {
    let status = error.status_code();
    let mut payload = json!({ "error": error.to_string() });
    if let LifecycleError::RateLimited { reset_at, .. } = &error {
        payload["reset_at"] = json!(reset_at);
    }
    (status, Json(payload)).into_response()
}

macro_rules! require_actor {
    ($headers:expr) => {
        match actor_from_headers(&$headers) {
            Some(actor) => actor,
            None => return unauthenticated(),
        }
    };
}

pub(crate) async fn submit_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Json(draft): Json<ProfileDraft>,
) -> Response {
    let actor = require_actor!(headers);
    match engine.submit(draft, &actor) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    status: Option<String>,
    created_by: Option<String>,
    limit: Option<usize>,
}

pub(crate) async fn list_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let actor = require_actor!(headers);
    let status = match params.status.as_deref() {
        Some(raw) => match ProfileStatus::parse(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown status `{raw}`")),
        },
        None => None,
    };
    let query = ProfileQuery {
        status,
        created_by: params.created_by.map(ActorId),
        limit: params.limit,
    };

    match engine.list(&query, &actor) {
        Ok(profiles) => {
            let views: Vec<ProfileView> = profiles.iter().map(ProfileView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

pub(crate) async fn search_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let actor = require_actor!(headers);
    let term = params.q.unwrap_or_default();
    match engine.search(&term, params.limit, &actor) {
        Ok(profiles) => {
            let views: Vec<ProfileView> = profiles.iter().map(ProfileView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = require_actor!(headers);
    match engine.get(&ProfileId(id), &actor) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let actor = require_actor!(headers);
    match engine.update(&ProfileId(id), update, &actor) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn remove_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = require_actor!(headers);
    match engine.remove(&ProfileId(id), &actor) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: String,
}

pub(crate) async fn status_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> Response {
    let actor = require_actor!(headers);
    let Some(target) = ProfileStatus::parse(&change.status) else {
        return bad_request(format!("unknown status `{}`", change.status));
    };

    match engine.set_status(&ProfileId(id), target, &actor) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuditParams {
    action: Option<String>,
    target_type: Option<String>,
    actor: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

pub(crate) async fn audit_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Query(params): Query<AuditParams>,
) -> Response {
    let actor = require_actor!(headers);

    let mut filter = AuditFilter::default();
    if let Some(raw) = params.action.as_deref() {
        match AuditAction::parse(raw) {
            Some(action) => filter.action = Some(action),
            None => return bad_request(format!("unknown audit action `{raw}`")),
        }
    }
    if let Some(raw) = params.target_type.as_deref() {
        match TargetType::parse(raw) {
            Some(kind) => filter.target_type = Some(kind),
            None => return bad_request(format!("unknown target type `{raw}`")),
        }
    }
    filter.actor = params.actor.map(ActorId);

    let cursor = match params.cursor.as_deref() {
        Some(raw) => match AuditCursor::decode(raw) {
            Some(cursor) => Some(cursor),
            None => return bad_request("malformed cursor"),
        },
        None => None,
    };

    match engine.audit_entries(&filter, cursor.as_ref(), params.limit, &actor) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatsParams {
    days: Option<u32>,
}

pub(crate) async fn audit_stats_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Query(params): Query<StatsParams>,
) -> Response {
    let actor = require_actor!(headers);
    let days = params.days.unwrap_or(DEFAULT_STATS_WINDOW_DAYS);
    if !(1..=MAX_STATS_WINDOW_DAYS).contains(&days) {
        return bad_request(format!(
            "days must be between 1 and {MAX_STATS_WINDOW_DAYS}, got {days}"
        ));
    }
    match engine.audit_stats(days, &actor) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn rate_limit_handler(
    State(engine): State<Arc<LifecycleEngine>>,
    headers: HeaderMap,
    Path(action): Path<String>,
) -> Response {
    let actor = require_actor!(headers);
    let Some(action) = RateLimitedAction::parse(&action) else {
        return bad_request(format!("unknown rate-limited action `{action}`"));
    };

    match engine.rate_limit_status(action, &actor) {
        Ok(decision) => {
            let payload = json!({
                "action": action.label(),
                "allowed": decision.allowed,
                "remaining": decision.remaining,
                "reset_at": decision.reset_at,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
