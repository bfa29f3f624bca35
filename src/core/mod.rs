//! Conversation state, request orchestration and correction resolution

mod controller;
mod correction;
mod storage;
mod store;

pub use controller::{ChatController, ChatError, UiSnapshot};
pub use correction::{CorrectionError, CorrectionService, CorrectionState};
pub use storage::{KvStorage, SqliteStorage};
pub use store::ConversationStore;

#[cfg(test)]
pub use controller::PLACEHOLDER;
#[cfg(test)]
pub use storage::MemoryStorage;
