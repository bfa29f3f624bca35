//! Persistent conversation store
//!
//! Owns the conversation list and the current selection. The list is loaded
//! once when the store is built and written back to storage after every
//! mutation. All operations are keyed by conversation id.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::conversation::{
    generate_id, Conversation, Message, MessageContent, Role, StructuredContent,
};

use super::storage::{KvStorage, StorageError};

/// Storage key holding the serialized conversation list
pub const CONVERSATIONS_KEY: &str = "chatgpt-conversations";

#[derive(Default)]
struct StoreState {
    conversations: Vec<Conversation>,
    current: Option<String>,
}

impl StoreState {
    fn find_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conv| conv.id == conversation_id)
    }
}

pub struct ConversationStore {
    storage: Arc<dyn KvStorage>,
    state: Mutex<StoreState>,
}

impl ConversationStore {
    /// Build the store from whatever storage holds.
    ///
    /// Unreadable or corrupt data is logged and replaced by an empty list.
    pub async fn load(storage: Arc<dyn KvStorage>) -> Self {
        let conversations = match storage.get(CONVERSATIONS_KEY).await {
            Ok(Some(raw)) => match decode_conversations(&raw) {
                Ok(conversations) => conversations,
                Err(e) => {
                    error!(error = %e, "Failed to parse stored conversations");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(error = %e, "Failed to read stored conversations");
                Vec::new()
            }
        };

        debug!(count = conversations.len(), "Loaded conversations");

        Self {
            storage,
            state: Mutex::new(StoreState {
                conversations,
                current: None,
            }),
        }
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state
            .lock()
            .await
            .conversations
            .iter()
            .find(|conv| conv.id == conversation_id)
            .cloned()
    }

    pub async fn current_conversation_id(&self) -> Option<String> {
        self.state.lock().await.current.clone()
    }

    pub async fn current_conversation(&self) -> Option<Conversation> {
        let state = self.state.lock().await;
        let current = state.current.as_deref()?;
        state
            .conversations
            .iter()
            .find(|conv| conv.id == current)
            .cloned()
    }

    /// Start a conversation, put it first in the list and select it
    pub async fn create_conversation(&self) -> Conversation {
        let conversation = Conversation::new();

        let mut state = self.state.lock().await;
        state.conversations.insert(0, conversation.clone());
        state.current = Some(conversation.id.clone());
        self.persist(&state).await;

        conversation
    }

    /// Append a message. Returns `None` when the conversation does not exist.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: impl Into<MessageContent>,
    ) -> Option<Message> {
        let message = Message::new(role, content);

        let mut state = self.state.lock().await;
        let conversation = state.find_mut(conversation_id)?;
        conversation.push(message.clone());
        self.persist(&state).await;

        Some(message)
    }

    /// Concatenate `delta` onto the text of the last message.
    ///
    /// No-op when the conversation is unknown, empty, or its last message is
    /// structured content.
    pub async fn update_last_message(&self, conversation_id: &str, delta: &str) {
        let mut state = self.state.lock().await;
        let Some(conversation) = state.find_mut(conversation_id) else {
            return;
        };
        if !conversation.append_to_last(delta) {
            warn!(conversation_id, "Last message cannot take appended text");
            return;
        }
        self.persist(&state).await;
    }

    /// Replace the content of the last message. No-op on an empty conversation.
    pub async fn overwrite_last_message(
        &self,
        conversation_id: &str,
        content: impl Into<MessageContent>,
    ) {
        let mut state = self.state.lock().await;
        let Some(conversation) = state.find_mut(conversation_id) else {
            return;
        };
        if conversation.overwrite_last(content.into()) {
            self.persist(&state).await;
        }
    }

    /// Remove a conversation, clearing the selection if it was current.
    ///
    /// Cached corrections of the grammar jobs it referenced are dropped too,
    /// unless another conversation still points at the same job.
    pub async fn delete_conversation(&self, conversation_id: &str) {
        let mut state = self.state.lock().await;
        if state.current.as_deref() == Some(conversation_id) {
            state.current = None;
        }
        let Some(index) = state
            .conversations
            .iter()
            .position(|conv| conv.id == conversation_id)
        else {
            return;
        };

        let removed = state.conversations.remove(index);
        self.persist(&state).await;
        let shared: HashSet<String> = state
            .conversations
            .iter()
            .flat_map(grammar_job_ids)
            .map(str::to_string)
            .collect();
        drop(state);

        for job_id in grammar_job_ids(&removed) {
            if shared.contains(job_id) {
                debug!(job_id, "Correction still referenced, keeping cache");
                continue;
            }
            if let Err(e) = self.storage.remove(job_id).await {
                warn!(job_id, error = %e, "Failed to drop cached correction");
            }
        }
    }

    /// Select a conversation. Returns false for an unknown id.
    pub async fn select_conversation(&self, conversation_id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.find_mut(conversation_id).is_none() {
            return false;
        }
        state.current = Some(conversation_id.to_string());
        true
    }

    pub async fn clear_current_conversation(&self) {
        self.state.lock().await.current = None;
    }

    /// Write the current list to storage again.
    ///
    /// A stream aborted while a persist was in flight leaves storage one
    /// delta behind; the controller flushes after an abort to catch up.
    pub async fn flush(&self) {
        let state = self.state.lock().await;
        self.persist(&state).await;
    }

    // Called with the state lock held so writes reach storage in mutation order.
    async fn persist(&self, state: &StoreState) {
        let result = match serde_json::to_string(&state.conversations) {
            Ok(raw) => self.storage.set(CONVERSATIONS_KEY, &raw).await,
            Err(e) => Err(StorageError::from(e)),
        };
        if let Err(e) = result {
            error!(error = %e, "Failed to persist conversations");
        }
    }
}

fn grammar_job_ids(conversation: &Conversation) -> impl Iterator<Item = &str> {
    conversation
        .messages
        .iter()
        .filter_map(|message| match &message.content {
            MessageContent::Structured(StructuredContent::Grammar(job)) => Some(job.job_id.as_str()),
            MessageContent::Text(_) => None,
        })
}

/// Parse a stored conversation list, giving fresh ids to duplicates
pub fn decode_conversations(raw: &str) -> Result<Vec<Conversation>, serde_json::Error> {
    let parsed: Vec<Conversation> = serde_json::from_str(raw)?;
    Ok(dedupe_ids(parsed))
}

fn dedupe_ids(conversations: Vec<Conversation>) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    conversations
        .into_iter()
        .map(|mut conv| {
            if !seen.insert(conv.id.clone()) {
                let fresh = generate_id();
                warn!(old_id = %conv.id, new_id = %fresh, "Duplicate conversation id");
                conv.id = fresh;
                seen.insert(conv.id.clone());
            }
            conv
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::GrammarJob;
    use crate::core::storage::MemoryStorage;

    async fn empty_store() -> (ConversationStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConversationStore::load(storage.clone()).await;
        (store, storage)
    }

    #[tokio::test]
    async fn test_create_prepends_and_selects() {
        let (store, _) = empty_store().await;

        let first = store.create_conversation().await;
        let second = store.create_conversation().await;

        let list = store.conversations().await;
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert_eq!(store.current_conversation_id().await, Some(second.id));
    }

    #[tokio::test]
    async fn test_messages_keep_order_and_unique_ids() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;

        for i in 0..20 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .add_message(&conv.id, role, format!("message {}", i))
                .await
                .unwrap();
        }

        let conv = store.conversation(&conv.id).await.unwrap();
        let texts: Vec<_> = conv
            .messages
            .iter()
            .map(|m| m.content.as_text().unwrap().to_string())
            .collect();
        let expected: Vec<_> = (0..20).map(|i| format!("message {}", i)).collect();
        assert_eq!(texts, expected);

        let ids: HashSet<_> = conv.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), 20);
        assert_eq!(conv.title, "message 0");
    }

    #[tokio::test]
    async fn test_add_message_unknown_conversation() {
        let (store, _) = empty_store().await;
        assert!(store.add_message("nope", Role::User, "hi").await.is_none());
    }

    #[tokio::test]
    async fn test_update_last_message_concatenates() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;
        store.add_message(&conv.id, Role::Assistant, "A").await;

        store.update_last_message(&conv.id, "B").await;

        let conv = store.conversation(&conv.id).await.unwrap();
        assert_eq!(conv.messages[0].content.as_text(), Some("AB"));
    }

    #[tokio::test]
    async fn test_update_last_message_skips_structured() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;
        let job = GrammarJob {
            job_id: "j1".into(),
            original_content: "x".into(),
            is_html: false,
        };
        store.add_message(&conv.id, Role::Assistant, job.clone()).await;

        store.update_last_message(&conv.id, "tail").await;

        let conv = store.conversation(&conv.id).await.unwrap();
        assert_eq!(conv.messages[0].content, MessageContent::from(job));
    }

    #[tokio::test]
    async fn test_overwrite_on_empty_conversation_is_noop() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;

        store.overwrite_last_message(&conv.id, "replacement").await;
        store.update_last_message(&conv.id, "delta").await;

        let conv = store.conversation(&conv.id).await.unwrap();
        assert!(conv.messages.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_only_last() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;
        store.add_message(&conv.id, Role::User, "question").await;
        store.add_message(&conv.id, Role::Assistant, "Analyzing...").await;

        store.overwrite_last_message(&conv.id, "answer").await;

        let conv = store.conversation(&conv.id).await.unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].content.as_text(), Some("question"));
        assert_eq!(conv.messages[1].content.as_text(), Some("answer"));
    }

    #[tokio::test]
    async fn test_delete_clears_selection_and_is_idempotent() {
        let (store, _) = empty_store().await;
        let conv = store.create_conversation().await;

        store.delete_conversation(&conv.id).await;
        store.delete_conversation(&conv.id).await;

        assert!(store.conversations().await.is_empty());
        assert_eq!(store.current_conversation_id().await, None);
    }

    #[tokio::test]
    async fn test_delete_drops_cached_corrections() {
        let (store, storage) = empty_store().await;
        let conv = store.create_conversation().await;
        let job = GrammarJob {
            job_id: "g7".into(),
            original_content: "<p>x</p>".into(),
            is_html: true,
        };
        store.add_message(&conv.id, Role::User, "fix this").await;
        store.add_message(&conv.id, Role::Assistant, job).await;
        storage.set("g7", "<p>y</p>").await.unwrap();
        storage.set("unrelated", "keep").await.unwrap();

        store.delete_conversation(&conv.id).await;

        assert_eq!(storage.get("g7").await.unwrap(), None);
        assert_eq!(storage.get("unrelated").await.unwrap(), Some("keep".to_string()));
    }

    #[tokio::test]
    async fn test_delete_keeps_corrections_shared_with_other_conversations() {
        let storage = Arc::new(MemoryStorage::new());
        let seed = ConversationStore::load(storage.clone()).await;
        let conv = seed.create_conversation().await;
        seed.add_message(
            &conv.id,
            Role::Assistant,
            GrammarJob {
                job_id: "g8".into(),
                original_content: "<p>x</p>".into(),
                is_html: true,
            },
        )
        .await;

        // Same conversation stored twice; load rewrites the second id.
        let saved = seed.conversations().await;
        let doubled = serde_json::to_string(&[saved[0].clone(), saved[0].clone()]).unwrap();
        storage.set(CONVERSATIONS_KEY, &doubled).await.unwrap();
        storage.set("g8", "<p>y</p>").await.unwrap();

        let store = ConversationStore::load(storage.clone()).await;
        let list = store.conversations().await;
        assert_eq!(list.len(), 2);
        assert_ne!(list[0].id, list[1].id);

        store.delete_conversation(&list[0].id).await;
        assert_eq!(storage.get("g8").await.unwrap(), Some("<p>y</p>".to_string()));

        store.delete_conversation(&list[1].id).await;
        assert_eq!(storage.get("g8").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flush_rewrites_storage() {
        let (store, storage) = empty_store().await;
        let conv = store.create_conversation().await;
        store.add_message(&conv.id, Role::Assistant, "partial").await;
        storage.set(CONVERSATIONS_KEY, "[]").await.unwrap();

        store.flush().await;

        let raw = storage.get(CONVERSATIONS_KEY).await.unwrap().unwrap();
        assert_eq!(decode_conversations(&raw).unwrap(), store.conversations().await);
    }

    #[tokio::test]
    async fn test_select_and_clear() {
        let (store, _) = empty_store().await;
        let first = store.create_conversation().await;
        let _second = store.create_conversation().await;

        assert!(store.select_conversation(&first.id).await);
        assert_eq!(store.current_conversation().await.unwrap().id, first.id);

        assert!(!store.select_conversation("unknown").await);
        assert_eq!(store.current_conversation_id().await, Some(first.id));

        store.clear_current_conversation().await;
        assert!(store.current_conversation().await.is_none());
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let (store, storage) = empty_store().await;
        let conv = store.create_conversation().await;
        store.add_message(&conv.id, Role::User, "Hello world").await;

        let raw = storage.get(CONVERSATIONS_KEY).await.unwrap().unwrap();
        let saved = decode_conversations(&raw).unwrap();
        assert_eq!(saved, store.conversations().await);
        assert_eq!(saved[0].title, "Hello world");
    }

    #[tokio::test]
    async fn test_reload_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConversationStore::load(storage.clone()).await;
        let conv = store.create_conversation().await;
        store.add_message(&conv.id, Role::User, "persist me").await;
        store
            .add_message(
                &conv.id,
                Role::Assistant,
                GrammarJob {
                    job_id: "j9".into(),
                    original_content: "<p>a</p>".into(),
                    is_html: true,
                },
            )
            .await;

        let reloaded = ConversationStore::load(storage).await;
        assert_eq!(reloaded.conversations().await, store.conversations().await);
        assert_eq!(reloaded.current_conversation_id().await, None);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rewritten_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        let raw = serde_json::json!([
            {"id": "dup", "title": "one", "timestamp": 1, "messages": []},
            {"id": "dup", "title": "two", "timestamp": 2, "messages": []},
            {"id": "other", "title": "three", "timestamp": 3, "messages": []}
        ])
        .to_string();
        storage.set(CONVERSATIONS_KEY, &raw).await.unwrap();

        let store = ConversationStore::load(storage).await;
        let list = store.conversations().await;

        assert_eq!(list.len(), 3);
        assert_eq!(list[0].id, "dup");
        assert_ne!(list[1].id, "dup");
        assert_ne!(list[1].id, "other");
        assert_eq!(list[1].title, "two");
        assert_eq!(list[2].id, "other");
    }

    #[tokio::test]
    async fn test_corrupt_storage_falls_back_to_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(CONVERSATIONS_KEY, "{not json").await.unwrap();

        let store = ConversationStore::load(storage).await;
        assert!(store.conversations().await.is_empty());
    }
}
