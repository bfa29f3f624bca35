//! Conversation types shared by the store, the controller and the HTTP layer

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a conversation before its first user message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Title used when the first user message is structured content
pub const STRUCTURED_TITLE: &str = "Grammar Correction";

const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Reference to a grammar job whose corrected output is resolved later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarJob {
    pub job_id: String,

    /// Content as submitted; older records stored it as `originalHtml`
    #[serde(alias = "originalHtml")]
    pub original_content: String,

    #[serde(default = "default_true")]
    pub is_html: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructuredContent {
    Grammar(GrammarJob),
}

/// Message body: plain text or a structured job reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(StructuredContent),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Structured(_) => None,
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<GrammarJob> for MessageContent {
    fn from(job: GrammarJob) -> Self {
        MessageContent::Structured(StructuredContent::Grammar(job))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub timestamp: i64,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            title: DEFAULT_TITLE.to_string(),
            timestamp: now_millis(),
            messages: Vec::new(),
        }
    }

    /// Append a message, deriving the title from the first user message
    pub fn push(&mut self, message: Message) {
        if message.role == Role::User && self.messages.is_empty() {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
    }

    /// Append `delta` to the last message's text. Returns false when there is
    /// no last message or it does not hold text.
    pub fn append_to_last(&mut self, delta: &str) -> bool {
        match self.messages.last_mut() {
            Some(Message {
                content: MessageContent::Text(text),
                ..
            }) => {
                text.push_str(delta);
                true
            }
            _ => false,
        }
    }

    /// Replace the last message's content. Returns false on an empty conversation.
    pub fn overwrite_last(&mut self, content: MessageContent) -> bool {
        match self.messages.last_mut() {
            Some(last) => {
                last.content = content;
                true
            }
            None => false,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

pub fn derive_title(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => {
            if text.chars().count() > TITLE_MAX_CHARS {
                let prefix: String = text.chars().take(TITLE_MAX_CHARS).collect();
                format!("{}...", prefix)
            } else {
                text.clone()
            }
        }
        MessageContent::Structured(_) => STRUCTURED_TITLE.to_string(),
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
