//! Axum route handlers for the workspace (edit-session) API.
//!
//! Handlers validate and delegate to the pipeline functions below, which
//! run detached from the request so a client disconnect can never abandon
//! a half-finished cache write, enqueue, or model call.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::detach::detached;
use crate::errors::AppError;
use crate::llm_client::{parse_json_response, ChatRequest, LlmInvoker, DEFAULT_MODEL_KEY};
use crate::state::AppState;
use crate::workspace::models::{
    KeywordItem, KeywordSource, PersistAction, PersistTask, Polarity, PromptStatus,
    WorkspaceSnapshot,
};
use crate::workspace::prompts::{
    DRAFT_PROMPT, DRAFT_SYSTEM, EXPAND_PROMPT, EXPAND_SYSTEM, INTERPRET_PROMPT, INTERPRET_SYSTEM,
};
use crate::workspace::queue::TaskQueue;
use crate::workspace::store::WorkspaceStore;

/// Independent deadline for cache-write pipelines.
const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(5);
/// Independent deadline for pipelines that include a model call.
const LLM_OP_TIMEOUT: Duration = Duration::from_secs(60);

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InterpretRequest {
    pub user_id: Uuid,
    pub intent: String,
    pub language: Option<String>,
    pub model_key: Option<String>,
    /// Present when the user restarts interpretation of an existing session.
    pub token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ExpandRequest {
    pub user_id: Uuid,
    pub hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeywordInput {
    pub word: String,
    pub polarity: Polarity,
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MergeKeywordsRequest {
    pub user_id: Uuid,
    pub items: Vec<KeywordInput>,
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub user_id: Uuid,
    pub status: PromptStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub token: Uuid,
    pub snapshot: WorkspaceSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub task_id: Uuid,
    pub status: &'static str,
}

/// Shape the interpret/expand models are asked to return.
#[derive(Debug, Deserialize)]
struct SuggestedKeyword {
    word: String,
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InterpretedIntent {
    topic: String,
    #[serde(default)]
    positive_keywords: Vec<SuggestedKeyword>,
    #[serde(default)]
    negative_keywords: Vec<SuggestedKeyword>,
}

#[derive(Debug, Deserialize)]
struct SuggestedKeywords {
    #[serde(default)]
    positive_keywords: Vec<SuggestedKeyword>,
    #[serde(default)]
    negative_keywords: Vec<SuggestedKeyword>,
}

fn to_items(
    suggested: Vec<SuggestedKeyword>,
    polarity: Polarity,
    source: KeywordSource,
) -> Vec<KeywordItem> {
    suggested
        .into_iter()
        .map(|k| KeywordItem {
            word: k.word,
            source,
            polarity,
            weight: k.weight.unwrap_or(1.0).clamp(0.0, 1.0),
        })
        .collect()
}

fn word_list(items: &[KeywordItem]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|k| k.word.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn weighted_list(items: &[KeywordItem]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    let mut sorted: Vec<&KeywordItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    sorted
        .iter()
        .map(|k| format!("- {} (weight {:.1})", k.word, k.weight))
        .collect::<Vec<_>>()
        .join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Pipelines (detachable, independently testable)
// ────────────────────────────────────────────────────────────────────────────

async fn interpret_intent(
    llm: Arc<dyn LlmInvoker>,
    workspace: WorkspaceStore,
    req: InterpretRequest,
) -> Result<WorkspaceResponse, AppError> {
    let language = req.language.unwrap_or_else(|| "en".to_string());
    let model_key = req
        .model_key
        .unwrap_or_else(|| DEFAULT_MODEL_KEY.to_string());

    let prompt = INTERPRET_PROMPT
        .replace("{intent}", &req.intent)
        .replace("{language}", &language);
    let response = llm
        .invoke(req.user_id, &model_key, ChatRequest::json(INTERPRET_SYSTEM, prompt))
        .await
        .map_err(|e| AppError::Llm(format!("Failed to interpret request: {e}")))?;
    let parsed: InterpretedIntent = parse_json_response(&response.text)
        .map_err(|e| AppError::Llm(format!("Interpretation returned invalid JSON: {e}")))?;

    let mut snapshot = WorkspaceSnapshot::new(parsed.topic, language, model_key);
    let mut items = to_items(parsed.positive_keywords, Polarity::Positive, KeywordSource::Model);
    items.extend(to_items(
        parsed.negative_keywords,
        Polarity::Negative,
        KeywordSource::Model,
    ));
    snapshot.merge_keywords(&items);

    let token = workspace
        .create_or_replace(req.user_id, req.token, snapshot)
        .await?;
    let snapshot = workspace.snapshot(req.user_id, token).await?;
    Ok(WorkspaceResponse { token, snapshot })
}

async fn expand_keywords(
    llm: Arc<dyn LlmInvoker>,
    workspace: WorkspaceStore,
    token: Uuid,
    req: ExpandRequest,
) -> Result<WorkspaceResponse, AppError> {
    let snapshot = workspace.snapshot(req.user_id, token).await?;

    let prompt = EXPAND_PROMPT
        .replace("{topic}", &snapshot.topic)
        .replace("{language}", &snapshot.language)
        .replace("{hint}", req.hint.as_deref().unwrap_or(""))
        .replace("{positive}", &word_list(&snapshot.positive_keywords))
        .replace("{negative}", &word_list(&snapshot.negative_keywords));
    let response = llm
        .invoke(
            req.user_id,
            &snapshot.model_key,
            ChatRequest::json(EXPAND_SYSTEM, prompt),
        )
        .await
        .map_err(|e| AppError::Llm(format!("Failed to expand keywords: {e}")))?;
    let parsed: SuggestedKeywords = parse_json_response(&response.text)
        .map_err(|e| AppError::Llm(format!("Expansion returned invalid JSON: {e}")))?;

    let mut items = to_items(parsed.positive_keywords, Polarity::Positive, KeywordSource::Model);
    items.extend(to_items(
        parsed.negative_keywords,
        Polarity::Negative,
        KeywordSource::Model,
    ));

    // Duplicates from the model are dropped by the merge, not an error.
    let snapshot = workspace.merge_keywords(req.user_id, token, &items).await?;
    Ok(WorkspaceResponse { token, snapshot })
}

async fn merge_manual_keywords(
    workspace: WorkspaceStore,
    token: Uuid,
    req: MergeKeywordsRequest,
) -> Result<WorkspaceResponse, AppError> {
    let items: Vec<KeywordItem> = req
        .items
        .into_iter()
        .map(|k| KeywordItem {
            word: k.word,
            source: KeywordSource::User,
            polarity: k.polarity,
            weight: k.weight.unwrap_or(1.0).clamp(0.0, 1.0),
        })
        .collect();
    let snapshot = workspace.merge_keywords(req.user_id, token, &items).await?;
    Ok(WorkspaceResponse { token, snapshot })
}

async fn draft_body(
    llm: Arc<dyn LlmInvoker>,
    workspace: WorkspaceStore,
    token: Uuid,
    req: DraftRequest,
) -> Result<WorkspaceResponse, AppError> {
    let snapshot = workspace.snapshot(req.user_id, token).await?;

    let prompt = DRAFT_PROMPT
        .replace("{topic}", &snapshot.topic)
        .replace("{language}", &snapshot.language)
        .replace("{positive}", &weighted_list(&snapshot.positive_keywords))
        .replace("{negative}", &word_list(&snapshot.negative_keywords));
    let response = llm
        .invoke(
            req.user_id,
            &snapshot.model_key,
            ChatRequest::text(DRAFT_SYSTEM, prompt),
        )
        .await
        .map_err(|e| AppError::Llm(format!("Failed to draft prompt body: {e}")))?;

    let body = response.text.trim().to_string();
    if body.is_empty() {
        return Err(AppError::Llm("Draft generation returned no text".to_string()));
    }

    let snapshot = workspace.update_draft_body(req.user_id, token, body).await?;
    Ok(WorkspaceResponse { token, snapshot })
}

async fn enqueue_save(
    workspace: WorkspaceStore,
    queue: Arc<dyn TaskQueue>,
    token: Uuid,
    req: SaveRequest,
) -> Result<SaveResponse, AppError> {
    let snapshot = workspace.snapshot(req.user_id, token).await?;

    let action = if snapshot.linked_prompt_id == 0 {
        PersistAction::Create
    } else {
        PersistAction::Update
    };
    let task = PersistTask {
        task_id: Uuid::new_v4(),
        user_id: req.user_id,
        workspace_token: token,
        linked_prompt_id: snapshot.linked_prompt_id,
        action,
        status: req.status,
        tags: req.tags,
        publish: req.publish,
    };
    let task_id = queue.enqueue(&task).await?;

    // Keep the session alive until the worker gets to it.
    if let Err(e) = workspace.touch(req.user_id, token).await {
        warn!(%token, error = %e, "could not refresh workspace TTL after enqueue");
    }

    Ok(SaveResponse {
        task_id,
        status: "queued",
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/workspace/interpret
pub async fn handle_interpret(
    State(state): State<AppState>,
    Json(req): Json<InterpretRequest>,
) -> Result<Json<WorkspaceResponse>, AppError> {
    if req.intent.trim().is_empty() {
        return Err(AppError::Validation("intent cannot be empty".to_string()));
    }
    let out = detached(
        LLM_OP_TIMEOUT,
        interpret_intent(state.llm.clone(), state.workspace.clone(), req),
    )
    .await??;
    Ok(Json(out))
}

/// POST /api/v1/workspace/:token/expand
pub async fn handle_expand(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Json(req): Json<ExpandRequest>,
) -> Result<Json<WorkspaceResponse>, AppError> {
    let out = detached(
        LLM_OP_TIMEOUT,
        expand_keywords(state.llm.clone(), state.workspace.clone(), token, req),
    )
    .await??;
    Ok(Json(out))
}

/// POST /api/v1/workspace/:token/keywords
pub async fn handle_merge_keywords(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Json(req): Json<MergeKeywordsRequest>,
) -> Result<Json<WorkspaceResponse>, AppError> {
    if req.items.is_empty() {
        return Err(AppError::Validation("items cannot be empty".to_string()));
    }
    let out = detached(
        CACHE_OP_TIMEOUT,
        merge_manual_keywords(state.workspace.clone(), token, req),
    )
    .await??;
    Ok(Json(out))
}

/// POST /api/v1/workspace/:token/draft
pub async fn handle_draft(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<WorkspaceResponse>, AppError> {
    let out = detached(
        LLM_OP_TIMEOUT,
        draft_body(state.llm.clone(), state.workspace.clone(), token, req),
    )
    .await??;
    Ok(Json(out))
}

/// GET /api/v1/workspace/:token
pub async fn handle_get(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<WorkspaceResponse>, AppError> {
    let snapshot = state.workspace.snapshot(params.user_id, token).await?;
    state.workspace.touch(params.user_id, token).await?;
    Ok(Json(WorkspaceResponse { token, snapshot }))
}

/// POST /api/v1/workspace/:token/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Json(req): Json<SaveRequest>,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    let out = detached(
        CACHE_OP_TIMEOUT,
        enqueue_save(state.workspace.clone(), state.queue.clone(), token, req),
    )
    .await??;
    Ok((StatusCode::ACCEPTED, Json(out)))
}

/// DELETE /api/v1/workspace/:token
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    state.workspace.delete(params.user_id, token).await?;
    Ok(StatusCode::NO_CONTENT)
}
