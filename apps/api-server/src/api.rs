//! HTTP surface: redirects, the JSON API and operational endpoints.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{
    extract::{Path, Query, State},
    Json, Router,
};
use domain::authz::{can_moderate, is_global_mod};
use domain::health::HealthTarget;
use domain::service::{NewEditRequest, NewLink};
use domain::sharing::NewShare;
use domain::validate::{self, parse_id};
use domain::{
    CoreError, EditRequestRepository, FallbackRedirect, Link, LinkEditRequest, LinkRepository,
    LookupOutcome, Organization, Resolution, Role, Scope, SharedLink, User, UserLink,
    UserLinkRepository, UserRepository,
};
use http_common::{json_error, json_ok, json_ok_empty, system_time_to_rfc3339, wants_json};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/go/:keyword", get(go_redirect))
        .route("/random", get(random_redirect))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_text))
        .route("/api/v1/resolve/:keyword", get(resolve_keyword))
        .route("/api/v1/me", get(get_me))
        .route("/api/v1/me/fallback", put(choose_fallback))
        .route("/api/v1/links", get(list_links).post(create_link))
        .route("/api/v1/links/mine", get(list_my_links))
        .route(
            "/api/v1/links/:id",
            get(get_link).patch(update_link).delete(delete_link),
        )
        .route("/api/v1/links/:id/deletion-request", post(request_deletion))
        .route("/api/v1/links/:id/edit-requests", post(create_edit_request))
        .route("/api/v1/moderation/queue", get(moderation_queue))
        .route("/api/v1/moderation/:id/approve", post(approve_link))
        .route("/api/v1/moderation/:id/reject", post(reject_link))
        .route(
            "/api/v1/moderation/deletions/:id/approve",
            post(approve_deletion),
        )
        .route(
            "/api/v1/moderation/deletions/:id/reject",
            post(reject_deletion),
        )
        .route(
            "/api/v1/moderation/edit-requests/:id/approve",
            post(approve_edit_request),
        )
        .route(
            "/api/v1/moderation/edit-requests/:id/reject",
            post(reject_edit_request),
        )
        .route(
            "/api/v1/personal",
            get(list_personal).post(create_personal),
        )
        .route(
            "/api/v1/personal/:id",
            get(get_personal)
                .patch(update_personal)
                .delete(delete_personal),
        )
        .route("/api/v1/shares", post(offer_share))
        .route("/api/v1/shares/incoming", get(incoming_shares))
        .route("/api/v1/shares/outgoing", get(outgoing_shares))
        .route("/api/v1/shares/:id", delete(withdraw_share))
        .route("/api/v1/shares/:id/accept", post(accept_share))
        .route("/api/v1/shares/:id/decline", post(decline_share))
        .route("/api/v1/fallbacks", get(list_fallbacks).post(create_fallback))
        .route("/api/v1/fallbacks/:id", delete(delete_fallback))
        .route(
            "/api/v1/admin/organizations",
            get(list_organizations).post(create_organization),
        )
        .route("/api/v1/admin/users/:id/role", put(set_user_role))
        .route("/api/v1/health/:id", post(probe_link))
        .with_state(state)
}

// ============================================================================
// Response bodies
// ============================================================================

fn rfc3339(t: Option<SystemTime>) -> Option<String> {
    t.map(system_time_to_rfc3339)
}

#[derive(Serialize)]
struct ResolveOut {
    keyword: String,
    url: String,
    source: &'static str,
}

impl From<&Resolution> for ResolveOut {
    fn from(r: &Resolution) -> Self {
        Self {
            keyword: r.keyword.clone(),
            url: r.url.clone(),
            source: r.source.as_str(),
        }
    }
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    checked_at: Option<String>,
    error: Option<String>,
}

impl From<&domain::LinkHealth> for HealthOut {
    fn from(h: &domain::LinkHealth) -> Self {
        Self {
            status: h.status.as_str(),
            checked_at: rfc3339(h.checked_at),
            error: h.error.clone(),
        }
    }
}

#[derive(Serialize)]
struct LinkOut {
    id: Uuid,
    keyword: String,
    url: String,
    description: String,
    scope: &'static str,
    organization_id: Option<Uuid>,
    status: &'static str,
    created_by: Option<Uuid>,
    submitted_by: Option<Uuid>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<String>,
    deletion_reason: Option<String>,
    click_count: u64,
    health: HealthOut,
    created_at: String,
    updated_at: String,
}

impl From<Link> for LinkOut {
    fn from(l: Link) -> Self {
        Self {
            id: l.id,
            health: HealthOut::from(&l.health),
            keyword: l.keyword,
            url: l.url,
            description: l.description,
            scope: l.scope.as_str(),
            organization_id: l.organization_id,
            status: l.status.as_str(),
            created_by: l.created_by,
            submitted_by: l.submitted_by,
            reviewed_by: l.reviewed_by,
            reviewed_at: rfc3339(l.reviewed_at),
            deletion_reason: l.deletion_reason,
            click_count: l.click_count,
            created_at: system_time_to_rfc3339(l.created_at),
            updated_at: system_time_to_rfc3339(l.updated_at),
        }
    }
}

#[derive(Serialize)]
struct UserLinkOut {
    id: Uuid,
    keyword: String,
    url: String,
    description: String,
    click_count: u64,
    health: HealthOut,
    created_at: String,
    updated_at: String,
}

impl From<UserLink> for UserLinkOut {
    fn from(l: UserLink) -> Self {
        Self {
            id: l.id,
            health: HealthOut::from(&l.health),
            keyword: l.keyword,
            url: l.url,
            description: l.description,
            click_count: l.click_count,
            created_at: system_time_to_rfc3339(l.created_at),
            updated_at: system_time_to_rfc3339(l.updated_at),
        }
    }
}

#[derive(Serialize)]
struct EditRequestOut {
    id: Uuid,
    link_id: Uuid,
    user_id: Uuid,
    url: String,
    description: String,
    reason: String,
    status: &'static str,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<String>,
    created_at: String,
}

impl From<LinkEditRequest> for EditRequestOut {
    fn from(r: LinkEditRequest) -> Self {
        Self {
            id: r.id,
            link_id: r.link_id,
            user_id: r.user_id,
            url: r.url,
            description: r.description,
            reason: r.reason,
            status: r.status.as_str(),
            reviewed_by: r.reviewed_by,
            reviewed_at: rfc3339(r.reviewed_at),
            created_at: system_time_to_rfc3339(r.created_at),
        }
    }
}

#[derive(Serialize)]
struct ShareOut {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    keyword: String,
    url: String,
    description: String,
    created_at: String,
}

impl From<SharedLink> for ShareOut {
    fn from(s: SharedLink) -> Self {
        Self {
            id: s.id,
            sender_id: s.sender_id,
            recipient_id: s.recipient_id,
            keyword: s.keyword,
            url: s.url,
            description: s.description,
            created_at: system_time_to_rfc3339(s.created_at),
        }
    }
}

#[derive(Serialize)]
struct FallbackOut {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    url: String,
}

impl From<FallbackRedirect> for FallbackOut {
    fn from(f: FallbackRedirect) -> Self {
        Self {
            id: f.id,
            organization_id: f.organization_id,
            name: f.name,
            url: f.url,
        }
    }
}

#[derive(Serialize)]
struct OrganizationOut {
    id: Uuid,
    slug: String,
    name: String,
    fallback_redirect_url: Option<String>,
    created_at: String,
}

impl From<Organization> for OrganizationOut {
    fn from(o: Organization) -> Self {
        Self {
            id: o.id,
            slug: o.slug,
            name: o.name,
            fallback_redirect_url: o.fallback_redirect_url,
            created_at: system_time_to_rfc3339(o.created_at),
        }
    }
}

#[derive(Serialize)]
struct UserOut {
    id: Uuid,
    sub: String,
    username: Option<String>,
    email: String,
    name: String,
    picture: String,
    role: Role,
    organization_id: Option<Uuid>,
    fallback_redirect_id: Option<Uuid>,
}

impl From<User> for UserOut {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            sub: u.sub,
            username: u.username,
            email: u.email,
            name: u.name,
            picture: u.picture,
            role: u.role,
            organization_id: u.organization_id,
            fallback_redirect_id: u.fallback_redirect_id,
        }
    }
}

#[derive(Serialize)]
struct ProbeOut {
    id: Uuid,
    kind: &'static str,
    keyword: String,
    url: String,
    health: HealthOut,
}

impl From<HealthTarget> for ProbeOut {
    fn from(t: HealthTarget) -> Self {
        Self {
            id: t.id,
            kind: t.kind.as_str(),
            health: HealthOut::from(&t.health),
            keyword: t.keyword,
            url: t.url,
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(json_ok(data)).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(json_ok(data))).into_response()
}

fn ok_list<T, U: Serialize>(items: Vec<T>) -> Response
where
    U: From<T>,
{
    ok(items.into_iter().map(U::from).collect::<Vec<U>>())
}

fn id_param(raw: &str) -> ApiResult<Uuid> {
    Ok(parse_id(raw)?)
}

// ============================================================================
// Redirects
// ============================================================================

/// 302 with a `Location` header.
fn found(url: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

fn accepts_json(headers: &HeaderMap) -> bool {
    wants_json(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
}

fn keyword_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json_error("keyword not found"))).into_response()
}

async fn go_redirect(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.redirect_user(&headers).await?;
    let json = accepts_json(&headers);

    match state.resolver.resolve(user.as_ref(), &keyword) {
        Ok(res) => {
            info!(keyword = %res.keyword, source = res.source.as_str(), "resolve ok");
            state.spawn_lookup(res.keyword.clone(), LookupOutcome::Resolved);
            state.spawn_click(res.clone());
            if json {
                Ok(ok(ResolveOut::from(&res)))
            } else {
                Ok(found(&res.url))
            }
        }
        Err(CoreError::NotFound) => {
            let normalized = validate::normalize_keyword(&keyword);
            if !json {
                if let Some(user) = &user {
                    if let Some(target) = state.resolver.fallback_for(user, &keyword)? {
                        info!(keyword = %normalized, "resolve miss, fallback");
                        state.spawn_lookup(normalized, LookupOutcome::Fallback);
                        return Ok(found(&target));
                    }
                }
            }
            warn!(keyword = %normalized, "resolve 404");
            state.spawn_lookup(normalized, LookupOutcome::NotFound);
            if json {
                return Ok(keyword_not_found());
            }
            let suggestions = state.resolver.suggest(user.as_ref(), &keyword)?;
            Ok((
                StatusCode::NOT_FOUND,
                Html(render_not_found(&keyword, &suggestions)),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolution without counting the click.
async fn resolve_keyword(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.redirect_user(&headers).await?;
    match state.resolver.resolve(user.as_ref(), &keyword) {
        Ok(res) => Ok(ok(ResolveOut::from(&res))),
        Err(CoreError::NotFound) => Ok(keyword_not_found()),
        Err(e) => Err(e.into()),
    }
}

async fn random_redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if !state.random_enabled {
        return Err(CoreError::FeatureDisabled("random keywords").into());
    }
    let user = state.current_user(&headers).await?;
    let res = state.resolver.random(Some(&user))?;
    debug!(keyword = %res.keyword, "random pick");
    state.spawn_click(res.clone());
    if accepts_json(&headers) {
        Ok(ok(ResolveOut::from(&res)))
    } else {
        Ok(found(&res.url))
    }
}

fn render_not_found(keyword: &str, suggestions: &[String]) -> String {
    let keyword = html_escape::encode_text(keyword);
    let list = if suggestions.is_empty() {
        String::new()
    } else {
        let items: String = suggestions
            .iter()
            .map(|s| {
                format!(
                    r#"<li><a href="/go/{href}">go/{text}</a></li>"#,
                    href = html_escape::encode_double_quoted_attribute(s),
                    text = html_escape::encode_text(s),
                )
            })
            .collect();
        format!(r#"<p class="hint">Did you mean:</p><ul>{items}</ul>"#)
    };
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>go/{keyword} not found</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f8fafc;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 20px;
        }}
        .card {{
            background: white;
            border-radius: 16px;
            box-shadow: 0 25px 50px -12px rgba(0,0,0,0.25);
            max-width: 500px;
            width: 100%;
            padding: 24px;
        }}
        h1 {{ font-size: 1.25rem; color: #334155; margin-bottom: 12px; }}
        .keyword {{ font-family: monospace; color: #6366f1; }}
        .hint {{ color: #64748b; margin: 12px 0 4px; }}
        li {{ list-style: none; padding: 4px 0; }}
        a {{ color: #6366f1; font-family: monospace; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>No link for <span class="keyword">go/{keyword}</span></h1>
        {list}
    </div>
</body>
</html>"##
    )
}

// ============================================================================
// Operational
// ============================================================================

async fn healthz() -> Json<serde_json::Value> {
    Json(json_ok_empty())
}

async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.ping() {
        Ok(()) => Json(json_ok_empty()).into_response(),
        Err(e) => {
            warn!(err = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json_error("database unavailable")),
            )
                .into_response()
        }
    }
}

async fn metrics_text(State(state): State<AppState>) -> ApiResult<Response> {
    let body = metrics::render(state.store.as_ref())?;
    Ok(([(header::CONTENT_TYPE, metrics::content_type())], body).into_response())
}

// ============================================================================
// Current user
// ============================================================================

async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok(UserOut::from(user)))
}

#[derive(Deserialize)]
struct ChooseFallbackReq {
    fallback_id: Option<Uuid>,
}

async fn choose_fallback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChooseFallbackReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.fallbacks.choose(&user, body.fallback_id)?;
    Ok(Json(json_ok_empty()).into_response())
}

// ============================================================================
// Global and organization links
// ============================================================================

#[derive(Deserialize)]
struct CreateLinkReq {
    keyword: String,
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    organization_id: Option<Uuid>,
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLinkReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let scope = match body.scope.as_deref() {
        None => Scope::Global,
        Some(s) => Scope::parse(s)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown scope '{s}'")))?,
    };
    let link = state.links.create_link(
        &user,
        NewLink {
            keyword: body.keyword,
            url: body.url,
            description: body.description,
            scope,
            organization_id: body.organization_id,
        },
    )?;
    info!(
        link_id = %link.id,
        keyword = %link.keyword,
        status = link.status.as_str(),
        "link created"
    );
    Ok(created(LinkOut::from(link)))
}

async fn list_links(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.optional_user(&headers).await?;
    let links = state.links.list_visible(user.as_ref())?;
    Ok(ok_list::<_, LinkOut>(links))
}

async fn list_my_links(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, LinkOut>(state.links.list_mine(&user)?))
}

async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state.links.get_link(id_param(&id)?)?;
    // unapproved links are visible to their submitter and moderators only
    let visible = link.status == domain::LinkStatus::Approved
        || link.submitted_by == Some(user.id)
        || can_moderate(&user, &link);
    if !visible {
        return Err(CoreError::NotFound.into());
    }
    Ok(ok(LinkOut::from(link)))
}

#[derive(Deserialize)]
struct UpdateLinkReq {
    url: String,
    #[serde(default)]
    description: String,
}

async fn update_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateLinkReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state
        .links
        .update(&user, id_param(&id)?, &body.url, &body.description)?;
    Ok(ok(LinkOut::from(link)))
}

async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.links.delete(&user, id_param(&id)?)?;
    Ok(Json(json_ok_empty()).into_response())
}

#[derive(Deserialize)]
struct ReasonReq {
    #[serde(default)]
    reason: Option<String>,
}

async fn request_deletion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ReasonReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state.links.request_deletion(
        &user,
        id_param(&id)?,
        body.reason.as_deref().unwrap_or(""),
    )?;
    Ok(ok(LinkOut::from(link)))
}

#[derive(Deserialize)]
struct EditRequestReq {
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reason: String,
}

async fn create_edit_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EditRequestReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let req = state.links.create_edit_request(
        &user,
        id_param(&id)?,
        NewEditRequest {
            url: body.url,
            description: body.description,
            reason: body.reason,
        },
    )?;
    Ok(created(EditRequestOut::from(req)))
}

// ============================================================================
// Moderation
// ============================================================================

#[derive(Serialize)]
struct QueueOut {
    links: Vec<LinkOut>,
    deletions: Vec<LinkOut>,
    edit_requests: Vec<EditRequestOut>,
}

async fn moderation_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let queue = QueueOut {
        links: state
            .links
            .pending_links(&user)?
            .into_iter()
            .map(LinkOut::from)
            .collect(),
        deletions: state
            .links
            .pending_deletions(&user)?
            .into_iter()
            .map(LinkOut::from)
            .collect(),
        edit_requests: state
            .links
            .pending_edit_requests(&user)?
            .into_iter()
            .map(EditRequestOut::from)
            .collect(),
    };
    Ok(ok(queue))
}

/// A guarded transition that no longer matches means someone got there first.
fn already_processed(e: CoreError) -> ApiError {
    match e {
        CoreError::NotFound => ApiError::AlreadyProcessed,
        other => other.into(),
    }
}

async fn approve_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.links.get_link(id)?;
    let link = state.links.approve(&user, id).map_err(already_processed)?;
    info!(link_id = %link.id, keyword = %link.keyword, reviewer = %user.id, "link approved");
    Ok(ok(LinkOut::from(link)))
}

async fn reject_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ReasonReq>>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.links.get_link(id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let link = state
        .links
        .reject(&user, id, reason)
        .map_err(already_processed)?;
    info!(link_id = %link.id, keyword = %link.keyword, reviewer = %user.id, "link rejected");
    Ok(ok(LinkOut::from(link)))
}

async fn approve_deletion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.links.get_link(id)?;
    let link = state
        .links
        .approve_deletion(&user, id)
        .map_err(already_processed)?;
    info!(link_id = %link.id, keyword = %link.keyword, "link deleted on request");
    Ok(Json(json_ok_empty()).into_response())
}

async fn reject_deletion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.links.get_link(id)?;
    let link = state
        .links
        .reject_deletion(&user, id)
        .map_err(already_processed)?;
    Ok(ok(LinkOut::from(link)))
}

async fn approve_edit_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.store.get_edit_request(id)?.ok_or(CoreError::NotFound)?;
    let (req, link) = state
        .links
        .approve_edit_request(&user, id)
        .map_err(already_processed)?;
    info!(request_id = %req.id, link_id = %link.id, "edit request approved");
    Ok(ok(LinkOut::from(link)))
}

async fn reject_edit_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    state.store.get_edit_request(id)?.ok_or(CoreError::NotFound)?;
    let req = state
        .links
        .reject_edit_request(&user, id)
        .map_err(already_processed)?;
    Ok(ok(EditRequestOut::from(req)))
}

// ============================================================================
// Personal links
// ============================================================================

#[derive(Deserialize)]
struct CreatePersonalReq {
    keyword: String,
    url: String,
    #[serde(default)]
    description: String,
}

async fn create_personal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePersonalReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state
        .personal
        .create(&user, &body.keyword, &body.url, &body.description)?;
    Ok(created(UserLinkOut::from(link)))
}

async fn list_personal(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, UserLinkOut>(state.personal.list(&user)?))
}

async fn get_personal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok(UserLinkOut::from(
        state.personal.get(&user, id_param(&id)?)?,
    )))
}

async fn update_personal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateLinkReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state
        .personal
        .update(&user, id_param(&id)?, &body.url, &body.description)?;
    Ok(ok(UserLinkOut::from(link)))
}

async fn delete_personal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.personal.delete(&user, id_param(&id)?)?;
    Ok(Json(json_ok_empty()).into_response())
}

// ============================================================================
// Shares
// ============================================================================

#[derive(Deserialize)]
struct OfferShareReq {
    /// User id or email address.
    recipient: String,
    keyword: String,
    url: String,
    #[serde(default)]
    description: String,
}

async fn offer_share(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OfferShareReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let recipient_id = match Uuid::parse_str(body.recipient.trim()) {
        Ok(id) => id,
        Err(_) => {
            state
                .store
                .get_user_by_email(body.recipient.trim())?
                .ok_or(CoreError::NotFound)?
                .id
        }
    };
    let share = state.sharing.offer(
        &user,
        NewShare {
            recipient_id,
            keyword: body.keyword,
            url: body.url,
            description: body.description,
        },
    )?;
    Ok(created(ShareOut::from(share)))
}

async fn incoming_shares(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, ShareOut>(state.sharing.incoming(&user)?))
}

async fn outgoing_shares(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, ShareOut>(state.sharing.outgoing(&user)?))
}

async fn accept_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let link = state.sharing.accept(&user, id_param(&id)?)?;
    Ok(created(UserLinkOut::from(link)))
}

async fn decline_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.sharing.decline(&user, id_param(&id)?)?;
    Ok(Json(json_ok_empty()).into_response())
}

async fn withdraw_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.sharing.withdraw(&user, id_param(&id)?)?;
    Ok(Json(json_ok_empty()).into_response())
}

// ============================================================================
// Fallback redirects
// ============================================================================

#[derive(Deserialize)]
struct FallbackQuery {
    organization_id: Option<Uuid>,
}

async fn list_fallbacks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<FallbackQuery>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, FallbackOut>(
        state.fallbacks.list(&user, q.organization_id)?,
    ))
}

#[derive(Deserialize)]
struct CreateFallbackReq {
    #[serde(default)]
    organization_id: Option<Uuid>,
    name: String,
    url: String,
}

async fn create_fallback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateFallbackReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let org = body
        .organization_id
        .or(user.organization_id)
        .ok_or_else(|| CoreError::InvalidInput("organization is required".into()))?;
    let fallback = state.fallbacks.create(&user, org, &body.name, &body.url)?;
    Ok(created(FallbackOut::from(fallback)))
}

async fn delete_fallback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    state.fallbacks.delete(&user, id_param(&id)?)?;
    Ok(Json(json_ok_empty()).into_response())
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Deserialize)]
struct CreateOrganizationReq {
    slug: String,
    #[serde(default)]
    name: String,
}

async fn create_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrganizationReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let org = state
        .admin
        .create_organization(&user, &body.slug, &body.name)?;
    info!(org_id = %org.id, slug = %org.slug, "organization created");
    Ok(created(OrganizationOut::from(org)))
}

async fn list_organizations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    Ok(ok_list::<_, OrganizationOut>(
        state.admin.list_organizations(&user)?,
    ))
}

#[derive(Deserialize)]
struct SetRoleReq {
    role: String,
}

async fn set_user_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SetRoleReq>,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let role = Role::parse(&body.role)
        .ok_or_else(|| CoreError::InvalidInput(format!("unknown role '{}'", body.role)))?;
    let updated = state.admin.set_role(&user, id_param(&id)?, role)?;
    info!(user_id = %updated.id, role = role.as_str(), by = %user.id, "role changed");
    Ok(ok(UserOut::from(updated)))
}

// ============================================================================
// Health probes
// ============================================================================

async fn probe_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user = state.current_user(&headers).await?;
    let id = id_param(&id)?;
    let allowed = if let Some(link) = state.store.get_link(id)? {
        can_moderate(&user, &link)
    } else if let Some(link) = state.store.get_user_link(id)? {
        link.user_id == user.id || is_global_mod(&user)
    } else {
        return Err(CoreError::NotFound.into());
    };
    if !allowed {
        return Err(CoreError::Forbidden.into());
    }
    let target = state.checker.check_by_id(id).await?;
    info!(
        target_id = %target.id,
        kind = target.kind.as_str(),
        status = target.health.status.as_str(),
        "on-demand probe"
    );
    Ok(ok(ProbeOut::from(target)))
}
