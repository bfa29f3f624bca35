//! API routes
//!
//! The browser front-end drives the controller through these endpoints.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clipboard;
use crate::conversation::{Conversation, GrammarJob};
use crate::core::{ChatError, CorrectionError, CorrectionState, UiSnapshot};
use crate::jobs::{JobError, Tool, Upload};
use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    api_url: String,
    grammar_api_url: String,
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub id: u8,
    pub name: &'static str,
    pub icon: &'static str,
    pub accepts_text: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolCatalogue {
    pub tools: Vec<ToolInfo>,
    pub default_tool: u8,
    pub accepted_uploads: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
pub struct SelectToolRequest {
    pub id: u8,
}

#[derive(Debug, Serialize)]
pub struct SidebarResponse {
    pub sidebar_open: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitAccepted {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionQuery {
    pub original: String,
    #[serde(default = "default_is_html")]
    pub is_html: bool,
    /// Block until the job completes instead of reporting one status check
    #[serde(default)]
    pub wait: bool,
}

fn default_is_html() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CopyResponse {
    pub copied: bool,
    pub bytes: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_url: state.config.api_url,
        grammar_api_url: state.config.grammar_api_url,
    })
}

async fn tools() -> Json<ToolCatalogue> {
    let tools = Tool::ALL
        .into_iter()
        .map(|tool| ToolInfo {
            id: tool.id(),
            name: tool.name(),
            icon: tool.icon(),
            accepts_text: tool.accepts_text(),
        })
        .collect();

    Json(ToolCatalogue {
        tools,
        default_tool: Tool::default().id(),
        accepted_uploads: &crate::jobs::ACCEPTED_UPLOADS,
    })
}

async fn ui_state(State(state): State<AppState>) -> Json<UiSnapshot> {
    Json(state.controller.snapshot().await)
}

async fn select_tool(
    State(state): State<AppState>,
    Json(request): Json<SelectToolRequest>,
) -> ApiResult<Json<UiSnapshot>> {
    state
        .controller
        .select_tool_by_id(request.id)
        .await
        .map_err(chat_error)?;
    Ok(Json(state.controller.snapshot().await))
}

async fn toggle_sidebar(State(state): State<AppState>) -> Json<SidebarResponse> {
    Json(SidebarResponse {
        sidebar_open: state.controller.toggle_sidebar().await,
    })
}

async fn new_chat(State(state): State<AppState>) -> Json<UiSnapshot> {
    state.controller.new_chat().await;
    Json(state.controller.snapshot().await)
}

async fn list_conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.controller.store().conversations().await)
}

async fn create_conversation(State(state): State<AppState>) -> (StatusCode, Json<Conversation>) {
    let conversation = state.controller.store().create_conversation().await;
    (StatusCode::CREATED, Json(conversation))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    state
        .controller
        .store()
        .conversation(&id)
        .await
        .map(Json)
        .ok_or_else(|| chat_error(ChatError::ConversationNotFound(id)))
}

async fn select_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UiSnapshot>> {
    state
        .controller
        .select_conversation(&id)
        .await
        .map_err(chat_error)?;
    Ok(Json(state.controller.snapshot().await))
}

async fn delete_conversation(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.controller.store().delete_conversation(&id).await;
    StatusCode::NO_CONTENT
}

/// Multipart fields: `query` (text) and an optional `file`
async fn send_message(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitAccepted>)> {
    let mut query = String::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        match field.name() {
            Some("query") => query = field.text().await.map_err(bad_request)?,
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_request)?;
                file = Some(Upload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    // The background task is detached; its outcome lands in the conversation
    let request = state
        .controller
        .handle_user_request(&query, file)
        .await
        .map_err(chat_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAccepted {
            conversation_id: request.conversation_id,
        }),
    ))
}

async fn stop_streaming(State(state): State<AppState>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.controller.stop_streaming().await,
    })
}

async fn correction(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<CorrectionQuery>,
) -> ApiResult<Json<CorrectionState>> {
    let job = GrammarJob {
        job_id,
        original_content: query.original,
        is_html: query.is_html,
    };

    let result = if query.wait {
        state
            .corrections
            .resolve(&job)
            .await
            .map(CorrectionState::Ready)
    } else {
        state.corrections.check(&job).await
    };

    result.map(Json).map_err(correction_error)
}

async fn download(State(state): State<AppState>, Path(job_id): Path<String>) -> Redirect {
    Redirect::temporary(&state.corrections.download_url(&job_id))
}

async fn copy(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CopyResponse>> {
    let text = state.corrections.cached(&job_id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("No corrected content for job {}", job_id),
        )
    })?;

    let bytes = text.len();
    let sink = state.clipboard.clone();
    tokio::task::spawn_blocking(move || clipboard::copy_text(sink.as_ref(), &text))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!(%job_id, error = %e, "Copy to clipboard failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(CopyResponse {
        copied: true,
        bytes,
    }))
}

fn bad_request(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn chat_error(e: ChatError) -> (StatusCode, String) {
    let status = match e {
        ChatError::EmptyRequest | ChatError::UnknownTool(_) => StatusCode::BAD_REQUEST,
        ChatError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, e.to_string())
}

fn correction_error(e: CorrectionError) -> (StatusCode, String) {
    let status = match e {
        CorrectionError::Job(JobError::PollTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(tools))
        .route("/state", get(ui_state))
        .route("/tool", post(select_tool))
        .route("/sidebar/toggle", post(toggle_sidebar))
        .route("/new-chat", post(new_chat))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/conversations/:id/select", post(select_conversation))
        .route("/messages", post(send_message))
        .route("/stop", post(stop_streaming))
        .route("/corrections/:job_id", get(correction))
        .route("/corrections/:job_id/download", get(download))
        .route("/corrections/:job_id/copy", post(copy))
}
