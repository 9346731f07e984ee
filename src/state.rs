use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chat::ChatStore;
use crate::config::{AppConfig, DatabaseLocation};
use crate::conversations::{ConversationStore, PresetSnapshot};
use crate::credentials::{self, ApiKeyRef, API_KEY_REF_OPTION};
use crate::error::{Outcome, StoreError, StoreResult};
use crate::migrations::run_migrations;
use crate::models::{Options, PresetRecord};
use crate::presets::PresetStore;
use crate::processing::ProcessingController;
use crate::storage::{KvBackend, SqliteStorage};
use crate::ui::AppUiStore;

// Core application state accessible by Tauri commands
#[derive(Clone)] // Allow cloning for background tasks
pub struct AppState {
    pub conversations: Arc<Mutex<ConversationStore>>,
    pub presets: Arc<Mutex<PresetStore>>,
    pub chat: Arc<Mutex<ChatStore>>,
    pub ui: Arc<Mutex<AppUiStore>>,
    // Shared with whoever streams responses; guards conversation switching
    pub processing: ProcessingController,
}

impl AppState {
    /// Migrates the stored layout, then loads every store from `backend`.
    pub async fn load(
        backend: Arc<dyn KvBackend>,
        config: &AppConfig,
        viewport_width: u32,
    ) -> StoreResult<Self> {
        run_migrations(backend.as_ref()).await?;

        let processing = ProcessingController::new();
        let conversations = ConversationStore::load(backend.clone(), processing.clone()).await?;
        let presets = PresetStore::load(backend.clone()).await?;
        let chat = ChatStore::load(backend, &config.default_client).await?;
        let ui = AppUiStore::new(viewport_width, config.ui);

        Ok(Self {
            conversations: Arc::new(Mutex::new(conversations)),
            presets: Arc::new(Mutex::new(presets)),
            chat: Arc::new(Mutex::new(chat)),
            ui: Arc::new(Mutex::new(ui)),
            processing,
        })
    }

    /// Opens the SQLite database named by `config` and loads from it.
    pub async fn open(config: &AppConfig, viewport_width: u32) -> StoreResult<Self> {
        let storage = match &config.database {
            DatabaseLocation::Path(path) => SqliteStorage::open(path).await?,
            DatabaseLocation::Url(url) => SqliteStorage::connect(url).await?,
        };
        Self::load(Arc::new(storage), config, viewport_width).await
    }

    /// Saves conversation `id` together with a snapshot of the active preset.
    pub async fn save_conversation(&self, id: &str, data: Options, messages: Vec<Value>) -> StoreResult<()> {
        let snapshot = {
            let presets = self.presets.lock().await;
            presets.active_preset().map(PresetSnapshot::from)
        };
        let mut conversations = self.conversations.lock().await;
        conversations.update_conversation(id, data, messages, snapshot).await
    }

    /// Makes `id` current and restores the client and preset it was saved with.
    ///
    /// A preset snapshot that no longer exists in the preset store only
    /// restores the client.
    pub async fn resume_conversation(&self, id: &str) -> StoreResult<Outcome> {
        let snapshot = {
            let mut conversations = self.conversations.lock().await;
            let outcome = conversations.set_current_conversation_id(id);
            if !outcome.is_applied() {
                return Ok(outcome);
            }
            conversations.conversation(id).and_then(|c| c.preset.clone())
        };

        if let Some(preset) = snapshot {
            self.chat.lock().await.set_client_to_use(&preset.client).await?;
            let mut presets = self.presets.lock().await;
            let restored = presets.set_active_preset(&preset.id).await?;
            if !restored.is_applied() {
                log::info!(
                    "Preset {} of conversation {} no longer exists; keeping the current preset",
                    preset.id,
                    id
                );
            }
        }
        Ok(Outcome::Applied)
    }

    /// Stores `api_key` in the OS keyring and points the preset at it.
    pub async fn set_preset_api_key(&self, preset_id: &str, api_key: &str) -> StoreResult<PresetRecord> {
        let mut presets = self.presets.lock().await;
        let mut options = presets
            .get_preset(preset_id)
            .ok_or_else(|| StoreError::PresetNotFound(preset_id.to_string()))?
            .options
            .clone();

        credentials::store_in_keyring(preset_id, api_key).map_err(StoreError::Credentials)?;
        options.insert(API_KEY_REF_OPTION.to_string(), ApiKeyRef::Keyring.to_value());
        presets.update_preset_options(preset_id, options).await
    }

    /// Resolves the API key of preset `preset_id` for the networking layer.
    pub async fn preset_api_key(&self, preset_id: &str) -> StoreResult<String> {
        let presets = self.presets.lock().await;
        let preset = presets
            .get_preset(preset_id)
            .ok_or_else(|| StoreError::PresetNotFound(preset_id.to_string()))?;
        credentials::preset_api_key(preset).map_err(StoreError::Credentials)
    }

    /// Deletes a preset along with any API key it kept in the keyring.
    pub async fn delete_preset(&self, preset_id: &str) -> StoreResult<Outcome> {
        let mut presets = self.presets.lock().await;
        let key_ref = presets
            .get_preset(preset_id)
            .and_then(|preset| ApiKeyRef::from_options(&preset.options).ok().flatten());

        let outcome = presets.delete_preset(preset_id).await?;
        if outcome.is_applied() && key_ref == Some(ApiKeyRef::Keyring) {
            if let Err(e) = credentials::forget_keyring_entry(preset_id) {
                log::warn!("Deleted preset {} but kept its keyring entry: {:?}", preset_id, e);
            }
        }
        Ok(outcome)
    }
}
