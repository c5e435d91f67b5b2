//! Axum route handlers for the public prompt detail view.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detach::spawn_logged;
use crate::errors::AppError;
use crate::metrics::scoring::{compute_quality_score, ScoreWeights};
use crate::models::prompt::{PromptEngagement, PromptRow, PromptVersionRow};
use crate::repo::Counter;
use crate::state::AppState;

const VISIT_RECORD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub viewer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PromptDetailResponse {
    pub prompt: PromptRow,
    /// Durable counter plus the not-yet-flushed buffer delta.
    pub live_visits: i64,
    /// Score recomputed with the live visit count; approximate until the
    /// next flush and refresh pass.
    pub live_score: f64,
}

/// GET /api/v1/prompts/:id
///
/// Returns the durable record with live engagement numbers. Passing a
/// `viewer_id` counts a visit; the write happens off the request path so a
/// dropped connection cannot lose it.
pub async fn handle_prompt_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<PromptDetailResponse>, AppError> {
    let prompt = state
        .repo
        .fetch_prompt(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {id} not found")))?;

    let visits = state.visits.clone();
    let viewer_id = query.viewer_id;
    spawn_logged("record_visit", VISIT_RECORD_TIMEOUT, async move {
        visits.record_visit(id, viewer_id).await.map(|_| ())
    });

    let pending = state.visits.pending_delta(id).await;
    let live_visits = prompt.visits.saturating_add(pending);
    let engagement = PromptEngagement {
        id,
        downloads: prompt.downloads,
        likes: prompt.likes,
        visits: live_visits,
        updated_at: Some(prompt.updated_at),
    };
    let live_score = compute_quality_score(&engagement, Utc::now(), &ScoreWeights::default());

    Ok(Json(PromptDetailResponse {
        prompt,
        live_visits,
        live_score,
    }))
}

/// GET /api/v1/prompts/:id/versions
///
/// Published version history, newest first (bounded by the worker's
/// retention pruning).
pub async fn handle_prompt_versions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PromptVersionRow>>, AppError> {
    if state.repo.fetch_prompt(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Prompt {id} not found")));
    }
    let versions = state.repo.list_versions(id).await?;
    Ok(Json(versions))
}

/// POST /api/v1/prompts/:id/like
///
/// Likes go straight to the durable counter; only visits are buffered.
pub async fn handle_prompt_like(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.repo.increment_counter(id, Counter::Likes, 1).await? {
        return Err(AppError::NotFound(format!("Prompt {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct PromptDownloadResponse {
    pub id: i64,
    pub topic: String,
    pub body: String,
}

/// POST /api/v1/prompts/:id/download
///
/// Returns the usable prompt body and counts the download off the request
/// path.
pub async fn handle_prompt_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PromptDownloadResponse>, AppError> {
    let prompt = state
        .repo
        .fetch_prompt(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {id} not found")))?;

    let repo = state.repo.clone();
    spawn_logged("record_download", VISIT_RECORD_TIMEOUT, async move {
        repo.increment_counter(id, Counter::Downloads, 1)
            .await
            .map(|_| ())
    });

    Ok(Json(PromptDownloadResponse {
        id: prompt.id,
        topic: prompt.topic,
        body: prompt.body,
    }))
}
