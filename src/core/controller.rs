//! Page controller
//!
//! Composes the conversation store and the job client. A user request:
//! 1. Appends the user message and the `Analyzing...` placeholder
//! 2. Submits the task in the background
//! 3. Grammar jobs: replaces the placeholder with a job reference
//! 4. Other tools: polls the job status, then streams the result over the
//!    placeholder token by token
//!
//! Every failure ends as a readable assistant message; nothing here is fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conversation::{GrammarJob, Role};
use crate::jobs::{
    poll_until, token_stream, JobClient, JobError, JobStatus, PollPolicy, StreamEvent, Tool,
    Upload,
};

use super::store::ConversationStore;

/// Assistant message shown while a task runs
pub const PLACEHOLDER: &str = "Analyzing...";

const STREAM_ERROR: &str = "Error streaming response.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message is empty and no file was attached")]
    EmptyRequest,

    #[error("Unknown tool id: {0}")]
    UnknownTool(u8),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}

/// Transient UI state, never persisted
#[derive(Debug, Clone, Default)]
struct UiState {
    selected_tool: Tool,
    sidebar_open: bool,
    is_streaming: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiSnapshot {
    pub selected_tool: Tool,
    pub selected_tool_id: u8,
    pub sidebar_open: bool,
    pub is_streaming: bool,
    pub current_conversation_id: Option<String>,
}

struct ActiveStream {
    id: u64,
    handle: AbortHandle,
}

/// A request accepted by the controller; the task finishes when the
/// placeholder has been resolved
pub struct UserRequest {
    pub conversation_id: String,
    pub task: JoinHandle<()>,
}

pub struct ChatController {
    store: Arc<ConversationStore>,
    jobs: Arc<JobClient>,
    poll_policy: PollPolicy,
    ui: Mutex<UiState>,
    stream: Mutex<Option<ActiveStream>>,
    next_stream_id: AtomicU64,
}

impl ChatController {
    pub fn new(store: Arc<ConversationStore>, jobs: Arc<JobClient>, poll_policy: PollPolicy) -> Self {
        Self {
            store,
            jobs,
            poll_policy,
            ui: Mutex::new(UiState::default()),
            stream: Mutex::new(None),
            next_stream_id: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub async fn snapshot(&self) -> UiSnapshot {
        let ui = self.ui.lock().await.clone();
        UiSnapshot {
            selected_tool: ui.selected_tool,
            selected_tool_id: ui.selected_tool.id(),
            sidebar_open: ui.sidebar_open,
            is_streaming: ui.is_streaming,
            current_conversation_id: self.store.current_conversation_id().await,
        }
    }

    /// Record the user's message and start the selected tool on it.
    ///
    /// The placeholder is in the store before this returns; the returned
    /// task resolves it.
    pub async fn handle_user_request(
        self: &Arc<Self>,
        message: &str,
        file: Option<Upload>,
    ) -> Result<UserRequest, ChatError> {
        let query = message.trim().to_string();
        if query.is_empty() && file.is_none() {
            return Err(ChatError::EmptyRequest);
        }

        let tool = {
            let mut ui = self.ui.lock().await;
            ui.is_streaming = true;
            ui.selected_tool
        };

        let conversation_id = match self.store.current_conversation_id().await {
            Some(id) => id,
            None => self.store.create_conversation().await.id,
        };

        let user_message = match &file {
            Some(upload) if query.is_empty() => format!("File \"{}\" uploaded.", upload.file_name),
            Some(upload) => format!("{}\n\nFile \"{}\" uploaded.", query, upload.file_name),
            None => query.clone(),
        };

        if self
            .store
            .add_message(&conversation_id, Role::User, user_message)
            .await
            .is_none()
        {
            self.set_streaming(false).await;
            return Err(ChatError::ConversationNotFound(conversation_id));
        }
        self.store
            .add_message(&conversation_id, Role::Assistant, PLACEHOLDER)
            .await;

        info!(%conversation_id, %tool, has_file = file.is_some(), "Handling user request");

        let controller = Arc::clone(self);
        let task_conversation = conversation_id.clone();
        let task = tokio::spawn(async move {
            controller
                .submit_task(&task_conversation, tool, &query, file)
                .await;
        });

        Ok(UserRequest {
            conversation_id,
            task,
        })
    }

    async fn submit_task(&self, conversation_id: &str, tool: Tool, query: &str, file: Option<Upload>) {
        let submitted = match self.jobs.submit(tool, query, file).await {
            Ok(response) => response,
            Err(e) => {
                error!(%tool, error = %e, "Error submitting task");
                self.fail(conversation_id, format!("Error submitting task \"{}\".", tool))
                    .await;
                return;
            }
        };
        debug!(%tool, job_id = %submitted.jobid, "Task submitted");

        if tool.is_grammar() {
            let (original_content, is_html) = submitted.original_content(query);
            let job = GrammarJob {
                job_id: submitted.jobid,
                original_content,
                is_html,
            };
            self.store.overwrite_last_message(conversation_id, job).await;
            self.set_streaming(false).await;
            return;
        }

        let jobs = &self.jobs;
        let job_id = submitted.jobid.as_str();
        let polled = poll_until(
            self.poll_policy,
            job_id,
            move || jobs.job_status(tool, job_id),
            JobStatus::is_completed,
        )
        .await;

        match polled {
            Ok(_) => self.stream_response(conversation_id, tool, job_id).await,
            Err(e) => {
                warn!(%tool, job_id, error = %e, "Polling job status failed");
                self.fail(conversation_id, poll_error_message(tool, &e)).await;
            }
        }
    }

    /// Read the job's token stream into the trailing message.
    ///
    /// Registering the stream aborts any earlier one. The flag and handle are
    /// released on every exit path.
    async fn stream_response(&self, conversation_id: &str, tool: Tool, job_id: &str) {
        let (handle, registration) = AbortHandle::new_pair();
        let stream_id = self.register_stream(handle).await;

        let consumed = Abortable::new(
            self.consume_stream(conversation_id, tool, job_id),
            registration,
        )
        .await;

        match consumed {
            Ok(Ok(())) => debug!(job_id, "Stream finished"),
            Ok(Err(e)) => {
                error!(job_id, error = %e, "Error streaming response");
                self.store
                    .overwrite_last_message(conversation_id, STREAM_ERROR)
                    .await;
            }
            Err(_) => {
                info!(job_id, "Stream aborted");
                self.store.flush().await;
            }
        }

        self.release_stream(stream_id).await;
    }

    async fn consume_stream(&self, conversation_id: &str, tool: Tool, job_id: &str) -> Result<(), JobError> {
        let response = self.jobs.open_stream(tool, job_id).await?;
        let events = token_stream(response);
        futures::pin_mut!(events);

        let mut first = true;
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Token(token) => {
                    if first {
                        self.store
                            .overwrite_last_message(conversation_id, token)
                            .await;
                        first = false;
                    } else {
                        self.store.update_last_message(conversation_id, &token).await;
                    }
                }
                StreamEvent::End => break,
                StreamEvent::Error(message) => return Err(JobError::StreamEvent(message)),
            }
        }

        Ok(())
    }

    async fn register_stream(&self, handle: AbortHandle) -> u64 {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .stream
            .lock()
            .await
            .replace(ActiveStream { id, handle });
        if let Some(previous) = previous {
            info!(stream_id = previous.id, "Cancelling earlier stream");
            previous.handle.abort();
        }
        id
    }

    // A stale stream leaves a newer stream's handle and flag alone.
    async fn release_stream(&self, stream_id: u64) {
        let mut active = self.stream.lock().await;
        if active.as_ref().map(|s| s.id) != Some(stream_id) {
            return;
        }
        *active = None;
        drop(active);
        self.set_streaming(false).await;
    }

    async fn fail(&self, conversation_id: &str, message: String) {
        self.store
            .overwrite_last_message(conversation_id, message)
            .await;
        self.set_streaming(false).await;
    }

    async fn set_streaming(&self, streaming: bool) {
        self.ui.lock().await.is_streaming = streaming;
    }

    /// Abort the in-flight stream, if any. Pending submissions and polls continue.
    pub async fn stop_streaming(&self) -> bool {
        match self.stream.lock().await.as_ref() {
            Some(active) => {
                active.handle.abort();
                true
            }
            None => false,
        }
    }

    pub async fn select_tool(&self, tool: Tool) {
        if self.store.current_conversation_id().await.is_some() {
            self.store.clear_current_conversation().await;
        }
        self.ui.lock().await.selected_tool = tool;
        debug!(%tool, "Tool selected");
    }

    pub async fn select_tool_by_id(&self, id: u8) -> Result<Tool, ChatError> {
        let tool = Tool::from_id(id).ok_or(ChatError::UnknownTool(id))?;
        self.select_tool(tool).await;
        Ok(tool)
    }

    pub async fn select_conversation(&self, conversation_id: &str) -> Result<(), ChatError> {
        if self.store.select_conversation(conversation_id).await {
            Ok(())
        } else {
            Err(ChatError::ConversationNotFound(conversation_id.to_string()))
        }
    }

    pub async fn new_chat(&self) {
        self.store.clear_current_conversation().await;
        self.ui.lock().await.sidebar_open = false;
    }

    pub async fn toggle_sidebar(&self) -> bool {
        let mut ui = self.ui.lock().await;
        ui.sidebar_open = !ui.sidebar_open;
        ui.sidebar_open
    }

    #[cfg(test)]
    async fn has_active_stream(&self) -> bool {
        self.stream.lock().await.is_some()
    }
}

fn poll_error_message(tool: Tool, error: &JobError) -> String {
    match error {
        JobError::Http { .. } => format!("Error checking job status for \"{}\".", tool),
        JobError::PollTimeout { .. } => format!("Timed out waiting for \"{}\" to complete.", tool),
        _ => format!("Error polling job status for \"{}\".", tool),
    }
}
