use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Outcome, Rejection, StoreResult};
use crate::models::{ConversationRecord, Options, PresetRecord, DEFAULT_CONVERSATION_TITLE};
use crate::processing::ProcessingController;
use crate::storage::{KvBackend, Persisted};

pub const CONVERSATIONS_KEY: &str = "conversations/v1";

/// Preset details recorded alongside a saved conversation.
#[derive(Clone, Debug, Default)]
pub struct PresetSnapshot {
    pub name: Option<String>,
    pub preset: Option<PresetRecord>,
}

impl From<&PresetRecord> for PresetSnapshot {
    fn from(preset: &PresetRecord) -> Self {
        Self {
            name: Some(preset.name.clone()),
            preset: Some(preset.clone()),
        }
    }
}

/// Conversation history keyed by id, plus the pointer to the current conversation.
///
/// Switching, deleting and clearing are refused while the shared
/// [`ProcessingController`] is busy; saving and renaming are not.
pub struct ConversationStore {
    conversations: Persisted<HashMap<String, ConversationRecord>>,
    // Empty means no active conversation
    current_id: String,
    processing: ProcessingController,
}

impl ConversationStore {
    pub async fn load(
        backend: Arc<dyn KvBackend>,
        processing: ProcessingController,
    ) -> StoreResult<Self> {
        let conversations = Persisted::load(backend, CONVERSATIONS_KEY, HashMap::new()).await?;
        log::info!("Loaded {} conversations", conversations.get().len());
        Ok(Self {
            conversations,
            current_id: String::new(),
            processing,
        })
    }

    pub fn current_conversation_id(&self) -> &str {
        &self.current_id
    }

    pub fn current_conversation(&self) -> Option<&ConversationRecord> {
        if self.current_id.is_empty() {
            return None;
        }
        self.conversations.get().get(&self.current_id)
    }

    pub fn conversation_title(&self) -> &str {
        self.current_conversation()
            .map(|conversation| conversation.title.as_str())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
    }

    pub fn conversation(&self, id: &str) -> Option<&ConversationRecord> {
        self.conversations.get().get(id)
    }

    /// All conversations, most recently updated first.
    pub fn conversations(&self) -> Vec<&ConversationRecord> {
        let mut list: Vec<&ConversationRecord> = self.conversations.get().values().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn len(&self) -> usize {
        self.conversations.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.get().is_empty()
    }

    /// Saves the conversation `id` and makes it current.
    ///
    /// An existing record keeps its id, title and creation time; only its data,
    /// messages, update time and (when given) preset snapshot change.
    pub async fn update_conversation(
        &mut self,
        id: &str,
        data: Options,
        messages: Vec<Value>,
        preset: Option<PresetSnapshot>,
    ) -> StoreResult<()> {
        self.current_id = id.to_string();
        let created = self
            .conversations
            .update(|conversations| match conversations.get_mut(id) {
                Some(existing) => {
                    existing.data = data;
                    existing.messages = messages;
                    existing.updated_at = Utc::now();
                    if let Some(snapshot) = preset {
                        existing.preset_name = snapshot.name;
                        existing.preset = snapshot.preset;
                    }
                    false
                }
                None => {
                    let mut record = ConversationRecord::new(id, data, messages);
                    if let Some(snapshot) = preset {
                        record.preset_name = snapshot.name;
                        record.preset = snapshot.preset;
                    }
                    conversations.insert(id.to_string(), record);
                    true
                }
            })
            .await?;

        if created {
            log::info!("Created conversation {}", id);
        } else {
            log::debug!("Updated conversation {}", id);
        }
        Ok(())
    }

    /// Clears the current conversation so the next save starts a fresh one.
    pub fn start_new_conversation(&mut self) -> Outcome {
        if self.processing.is_busy() {
            log::debug!("Refusing to start a new conversation while busy");
            return Outcome::Rejected(Rejection::Busy);
        }
        self.current_id.clear();
        Outcome::Applied
    }

    pub fn set_current_conversation_id(&mut self, id: &str) -> Outcome {
        if self.processing.is_busy() {
            log::debug!("Refusing to switch to conversation {} while busy", id);
            return Outcome::Rejected(Rejection::Busy);
        }
        self.current_id = id.to_string();
        Outcome::Applied
    }

    pub async fn delete_conversation(&mut self, id: &str) -> StoreResult<Outcome> {
        if self.processing.is_busy() {
            log::debug!("Refusing to delete conversation {} while busy", id);
            return Ok(Outcome::Rejected(Rejection::Busy));
        }

        if self.current_id == id {
            self.current_id.clear();
        }
        if !self.conversations.get().contains_key(id) {
            log::warn!("Attempted to delete non-existent conversation: {}", id);
            return Ok(Outcome::Applied);
        }

        self.conversations
            .update(|conversations| conversations.remove(id))
            .await?;
        log::info!("Deleted conversation {}", id);
        Ok(Outcome::Applied)
    }

    pub async fn clear_conversations(&mut self) -> StoreResult<Outcome> {
        if self.processing.is_busy() {
            log::debug!("Refusing to clear conversations while busy");
            return Ok(Outcome::Rejected(Rejection::Busy));
        }

        let count = self.len();
        self.conversations.set(HashMap::new()).await?;
        self.current_id.clear();
        log::warn!("Cleared {} conversations", count);
        Ok(Outcome::Applied)
    }

    pub async fn update_conversation_title(&mut self, id: &str, title: &str) -> StoreResult<Outcome> {
        if !self.conversations.get().contains_key(id) {
            log::warn!("Attempted to rename non-existent conversation: {}", id);
            return Ok(Outcome::Rejected(Rejection::NotFound));
        }

        let title = title.trim().to_string();
        log::info!("Renaming conversation {} to: {}", id, title);
        self.conversations
            .update(|conversations| {
                if let Some(conversation) = conversations.get_mut(id) {
                    conversation.title = title;
                }
            })
            .await?;
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use serde_json::json;

    async fn store_with(processing: ProcessingController) -> (ConversationStore, Arc<MemoryStorage>) {
        let backend = Arc::new(MemoryStorage::new());
        let store = ConversationStore::load(backend.clone(), processing).await.unwrap();
        (store, backend)
    }

    fn data(parent: &str) -> Options {
        let mut data = Options::new();
        data.insert("parentMessageId".to_string(), json!(parent));
        data
    }

    #[tokio::test]
    async fn first_save_creates_record_with_equal_timestamps() {
        let (mut store, _) = store_with(ProcessingController::new()).await;

        store
            .update_conversation("c1", data("m1"), vec![json!({"text": "hi"})], None)
            .await
            .unwrap();

        let record = store.conversation("c1").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.title, "New Chat");
        assert_eq!(store.current_conversation_id(), "c1");
    }

    #[tokio::test]
    async fn resave_keeps_identity_and_creation_time() {
        let (mut store, _) = store_with(ProcessingController::new()).await;
        store.update_conversation("c1", data("m1"), vec![], None).await.unwrap();
        let renamed = store.update_conversation_title("c1", "Rust talk").await.unwrap();
        assert!(renamed.is_applied());
        let created_at = store.conversation("c1").unwrap().created_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .update_conversation("c1", data("m2"), vec![json!(1), json!(2)], None)
            .await
            .unwrap();

        let record = store.conversation("c1").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.title, "Rust talk");
        assert_eq!(record.data["parentMessageId"], "m2");
        assert_eq!(record.messages.len(), 2);
        assert!(record.updated_at > created_at);
    }

    #[tokio::test]
    async fn deleting_active_conversation_clears_current() {
        let (mut store, _) = store_with(ProcessingController::new()).await;
        store.update_conversation("c1", data("m1"), vec![], None).await.unwrap();
        store.update_conversation("c2", data("m1"), vec![], None).await.unwrap();

        let outcome = store.delete_conversation("c2").await.unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(store.current_conversation_id(), "");
        assert!(store.current_conversation().is_none());
        assert_eq!(store.conversation_title(), "New Chat");
        assert!(store.conversation("c1").is_some());
    }

    #[tokio::test]
    async fn deleting_unknown_conversation_writes_nothing() {
        let (mut store, backend) = store_with(ProcessingController::new()).await;
        assert!(store.set_current_conversation_id("ghost").is_applied());

        let outcome = store.delete_conversation("ghost").await.unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(store.current_conversation_id(), "");
        assert_eq!(backend.get(CONVERSATIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_empties_everything() {
        let (mut store, backend) = store_with(ProcessingController::new()).await;
        for i in 0..5 {
            store
                .update_conversation(&format!("c{}", i), Options::new(), vec![], None)
                .await
                .unwrap();
        }

        assert!(store.clear_conversations().await.unwrap().is_applied());
        assert!(store.is_empty());
        assert_eq!(store.current_conversation_id(), "");
        assert_eq!(backend.get(CONVERSATIONS_KEY).await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn guarded_mutators_reject_while_busy() {
        let processing = ProcessingController::new();
        let (mut store, _) = store_with(processing.clone()).await;
        store.update_conversation("c1", Options::new(), vec![], None).await.unwrap();

        let _busy = processing.begin();
        let busy = Outcome::Rejected(Rejection::Busy);
        assert_eq!(store.start_new_conversation(), busy);
        assert_eq!(store.set_current_conversation_id("c9"), busy);
        assert_eq!(store.delete_conversation("c1").await.unwrap(), busy);
        assert_eq!(store.clear_conversations().await.unwrap(), busy);

        assert_eq!(store.current_conversation_id(), "c1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn save_and_rename_still_work_while_busy() {
        let processing = ProcessingController::new();
        let (mut store, _) = store_with(processing.clone()).await;
        let _busy = processing.begin();

        store.update_conversation("c1", Options::new(), vec![], None).await.unwrap();
        let outcome = store.update_conversation_title("c1", "  Hello  ").await.unwrap();

        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(store.conversation_title(), "Hello");
    }

    #[tokio::test]
    async fn renaming_unknown_conversation_is_not_found() {
        let (mut store, backend) = store_with(ProcessingController::new()).await;

        let outcome = store.update_conversation_title("nope", "x").await.unwrap();

        assert_eq!(outcome, Outcome::Rejected(Rejection::NotFound));
        assert_eq!(backend.get(CONVERSATIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pointing_at_unknown_id_yields_no_current_conversation() {
        let (mut store, _) = store_with(ProcessingController::new()).await;

        assert!(store.set_current_conversation_id("ghost").is_applied());
        assert!(store.current_conversation().is_none());
        assert_eq!(store.conversation_title(), "New Chat");
    }

    #[tokio::test]
    async fn snapshot_is_recorded_and_list_is_newest_first() {
        let (mut store, _) = store_with(ProcessingController::new()).await;
        let preset = PresetRecord {
            id: "p1".to_string(),
            name: "Bing".to_string(),
            client: "bing".to_string(),
            options: Options::new(),
            created_at: Utc::now(),
        };

        store.update_conversation("old", Options::new(), vec![], None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .update_conversation("new", Options::new(), vec![], Some(PresetSnapshot::from(&preset)))
            .await
            .unwrap();

        let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        let saved = store.conversation("new").unwrap();
        assert_eq!(saved.preset_name.as_deref(), Some("Bing"));
        assert_eq!(saved.preset.as_ref().map(|p| p.id.as_str()), Some("p1"));
    }

    #[tokio::test]
    async fn conversations_reload_from_backend() {
        let (mut store, backend) = store_with(ProcessingController::new()).await;
        store.update_conversation("c1", data("m1"), vec![json!("a")], None).await.unwrap();

        let reloaded = ConversationStore::load(backend, ProcessingController::new())
            .await
            .unwrap();

        let record = reloaded.conversation("c1").unwrap();
        assert_eq!(record.messages, vec![json!("a")]);
        // The pointer itself is session state
        assert_eq!(reloaded.current_conversation_id(), "");
    }
}
