use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    contest,
    database::{self, Contest, Entry, Phase},
    error::AppError,
    identity::{self, Voter},
    results,
    state::AppState,
    utils,
};

#[derive(Serialize)]
pub struct ContestView {
    pub title: String,
    pub status: Phase,
    pub max_entries: Option<i64>,
    pub votes_per_voter: i64,
    pub voting_opened_at: Option<String>,
    pub voting_ends_at: Option<String>,
}

impl From<Contest> for ContestView {
    fn from(c: Contest) -> Self {
        Self {
            title: c.title,
            status: c.status,
            max_entries: c.max_entries,
            votes_per_voter: c.votes_per_voter,
            voting_opened_at: c.voting_opened_at.map(utils::format_kst),
            voting_ends_at: c.voting_ends_at.map(utils::format_kst),
        }
    }
}

/// Public entry view. The creator's voter identifier stays server-side.
#[derive(Serialize)]
pub struct EntryView {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub created_at: String,
}

impl From<Entry> for EntryView {
    fn from(e: Entry) -> Self {
        Self {
            id: e.id,
            title: e.title,
            image_url: e.image_url,
            created_at: utils::format_kst(e.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct IndexView {
    pub contest: ContestView,
    pub entries: Vec<EntryView>,
    pub remaining_votes_today: i64,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub entry: EntryView,
    pub contest: ContestView,
}

#[derive(Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize)]
pub struct VoteResponse {
    pub remaining_votes_today: i64,
}

#[derive(Serialize)]
pub struct ResultsView {
    pub contest: ContestView,
    pub ranking: Vec<results::RankedEntry>,
    pub podium: Vec<results::RankedEntry>,
}

#[derive(Deserialize)]
pub struct AdminLogin {
    pub key: String,
}

#[derive(Serialize)]
pub struct AdminAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct AdminStatus {
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contest: Option<ContestView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<i64>,
}

pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let voter = Voter::from_headers(&headers);
    let now = utils::now();

    let contest = contest::tick(&state.pool, now).await?;
    let entries = database::list_entries(&state.pool).await?;
    let remaining =
        contest::remaining_votes_today(&state.pool, &voter.id, contest.votes_per_voter, now)
            .await?;

    let view = IndexView {
        contest: contest.into(),
        entries: entries.into_iter().map(Into::into).collect(),
        remaining_votes_today: remaining,
    };

    Ok(with_voter_cookie(Json(view).into_response(), &voter))
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubmitRequest>,
) -> Result<Response, AppError> {
    let voter = Voter::from_headers(&headers);
    let now = utils::now();

    let entry = contest::submit_entry(
        &state.pool,
        &voter.id,
        &payload.title,
        &payload.image_url,
        now,
        state.config.voting_period_secs(),
    )
    .await?;
    let contest = database::load_contest(&state.pool).await?;

    info!("entry {} submitted", entry.id);
    let body = SubmitResponse {
        entry: entry.into(),
        contest: contest.into(),
    };
    Ok(with_voter_cookie(
        (StatusCode::CREATED, Json(body)).into_response(),
        &voter,
    ))
}

pub async fn submit_upload_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let voter = Voter::from_headers(&headers);
    let now = utils::now();

    if body.is_empty() {
        return Err(AppError::InvalidImage("an image payload is required"));
    }
    if body.len() > state.config.max_upload_bytes {
        return Err(AppError::InvalidImage("image exceeds the size limit"));
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(AppError::InvalidImage("an image content type is required"));
    }

    // Phase check before touching storage; submit_entry re-checks after the
    // upload, and a losing race removes the stored file again below.
    let current = contest::tick(&state.pool, now).await?;
    if current.status != Phase::Submission {
        return Err(AppError::WrongPhase);
    }

    let url = state
        .images
        .store(&body, &content_type, &utils::sanitize_title(&params.title))
        .await?;

    match contest::submit_entry(
        &state.pool,
        &voter.id,
        &params.title,
        &url,
        now,
        state.config.voting_period_secs(),
    )
    .await
    {
        Ok(entry) => {
            let contest = database::load_contest(&state.pool).await?;
            info!("entry {} submitted via upload", entry.id);
            let body = SubmitResponse {
                entry: entry.into(),
                contest: contest.into(),
            };
            Ok(with_voter_cookie(
                (StatusCode::CREATED, Json(body)).into_response(),
                &voter,
            ))
        }
        Err(err) => {
            if let Err(e) = state.images.delete(&url).await {
                warn!("failed to remove stored image {url}: {e}");
            }
            Err(err)
        }
    }
}

pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let voter = Voter::from_headers(&headers);
    let now = utils::now();

    let remaining = contest::cast_vote(&state.pool, &voter.id, entry_id, now).await?;

    info!("vote recorded for entry {entry_id}");
    Ok(with_voter_cookie(
        Json(VoteResponse {
            remaining_votes_today: remaining,
        })
        .into_response(),
        &voter,
    ))
}

pub async fn results_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResultsView>, AppError> {
    let now = utils::now();

    let contest = contest::tick(&state.pool, now).await?;
    let ranking = results::compute_ranking(&state.pool).await?;
    let podium = results::podium(&ranking).to_vec();

    Ok(Json(ResultsView {
        contest: contest.into(),
        ranking,
        podium,
    }))
}

pub async fn admin_login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdminLogin>,
) -> Result<Response, AppError> {
    if payload.key != state.config.admin_key {
        warn!("admin login rejected");
        return Err(AppError::Unauthorized);
    }

    let token = Uuid::new_v4().to_string();
    state.admin_sessions.write().await.insert(token.clone());
    info!("admin session opened");

    let mut response = Json(AdminAck {
        ok: true,
        warning: None,
    })
    .into_response();
    if let Some(cookie) = identity::admin_cookie(&token) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    Ok(response)
}

pub async fn admin_logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = identity::cookie_value(&headers, identity::ADMIN_COOKIE) {
        state.admin_sessions.write().await.remove(&token);
        info!("admin session closed");
    }

    let mut response = Json(AdminAck {
        ok: true,
        warning: None,
    })
    .into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, identity::clear_admin_cookie());
    response
}

pub async fn admin_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AdminStatus>, AppError> {
    if require_admin(&state, &headers).await.is_err() {
        return Ok(Json(AdminStatus {
            authorized: false,
            contest: None,
            entry_count: None,
            vote_count: None,
        }));
    }

    let contest = database::load_contest(&state.pool).await?;
    Ok(Json(AdminStatus {
        authorized: true,
        contest: Some(contest.into()),
        entry_count: Some(database::entry_count(&state.pool).await?),
        vote_count: Some(database::vote_count(&state.pool).await?),
    }))
}

pub async fn admin_start_voting_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ContestView>, AppError> {
    require_admin(&state, &headers).await?;

    let contest = contest::force_start_voting(
        &state.pool,
        utils::now(),
        state.config.voting_period_secs(),
    )
    .await?;

    info!("voting opened by admin");
    Ok(Json(contest.into()))
}

pub async fn admin_close_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ContestView>, AppError> {
    require_admin(&state, &headers).await?;

    let contest = contest::force_close(&state.pool).await?;

    info!("contest closed by admin");
    Ok(Json(contest.into()))
}

pub async fn admin_delete_entry_handler(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<AdminAck>, AppError> {
    require_admin(&state, &headers).await?;

    let url = database::delete_entry(&state.pool, entry_id)
        .await?
        .ok_or(AppError::EntryNotFound)?;
    let warning = release_image(&state, &url).await;

    info!("entry {entry_id} deleted by admin");
    Ok(Json(AdminAck { ok: true, warning }))
}

pub async fn admin_delete_all_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AdminAck>, AppError> {
    require_admin(&state, &headers).await?;

    let urls = database::delete_all_entries(&state.pool).await?;
    let mut warnings = Vec::new();
    for url in &urls {
        if let Some(w) = release_image(&state, url).await {
            warnings.push(w);
        }
    }

    info!("all entries deleted by admin ({} removed)", urls.len());
    Ok(Json(AdminAck {
        ok: true,
        warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
    }))
}

pub async fn admin_reset_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ContestView>, AppError> {
    require_admin(&state, &headers).await?;

    // Release the stored images first; failures are warned and never block
    // the reset itself.
    let urls = database::all_image_urls(&state.pool).await?;
    for url in &urls {
        if let Err(e) = state.images.delete(url).await {
            warn!("failed to release stored image {url}: {e}");
        }
    }

    database::reset_contest(
        &state.pool,
        &state.config.contest_title,
        state.config.max_entries,
        state.config.votes_per_voter,
    )
    .await?;

    info!("contest reset by admin");
    Ok(Json(database::load_contest(&state.pool).await?.into()))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token =
        identity::cookie_value(headers, identity::ADMIN_COOKIE).ok_or(AppError::Unauthorized)?;

    if state.admin_sessions.read().await.contains(&token) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

async fn release_image(state: &AppState, url: &str) -> Option<String> {
    match state.images.delete(url).await {
        Ok(()) => None,
        Err(e) => {
            warn!("failed to release stored image {url}: {e}");
            Some(format!("stored image could not be removed: {url}"))
        }
    }
}

fn with_voter_cookie(mut response: Response, voter: &Voter) -> Response {
    if let Some(cookie) = voter.issue_cookie() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contest_view_serializes_lowercase_status() {
        let view = ContestView {
            title: "Test".to_string(),
            status: Phase::Voting,
            max_entries: None,
            votes_per_voter: 2,
            voting_opened_at: Some("2025-09-06T09:00:00+09:00".to_string()),
            voting_ends_at: None,
        };

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["status"], "voting");
        assert_eq!(value["max_entries"], serde_json::Value::Null);
    }

    #[test]
    fn test_admin_status_omits_details_when_unauthorized() {
        let status = AdminStatus {
            authorized: false,
            contest: None,
            entry_count: None,
            vote_count: None,
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value, serde_json::json!({ "authorized": false }));
    }
}
