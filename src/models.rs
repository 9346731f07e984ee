use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Title shown for a conversation that has not been renamed (or for no conversation at all).
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";

/// Opaque, chat-client-specific key-value settings.
pub type Options = Map<String, Value>;

fn default_title() -> String {
    DEFAULT_CONVERSATION_TITLE.to_string()
}

fn new_preset_id() -> String {
    Uuid::new_v4().to_string()
}

// A persisted chat session. Field names and millisecond timestamps follow the
// layout the web front-end writes, so exported data loads unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    // Client-specific state (parent message id, client conversation id, ...)
    #[serde(default)]
    pub data: Options,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_name: Option<String>,
    // Snapshot of the preset as it was when the conversation was last saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<PresetRecord>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>, data: Options, messages: Vec<Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: default_title(),
            data,
            messages,
            created_at: now,
            updated_at: now,
            preset_name: None,
            preset: None,
        }
    }
}

// A named, saved client configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresetRecord {
    #[serde(default = "new_preset_id")] // Older stores keyed presets by name only
    pub id: String,
    pub name: String,
    pub client: String, // e.g. "chatgpt", "bing"
    #[serde(default)]
    pub options: Options,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for [`crate::presets::PresetStore::set_preset`].
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresetInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub client: String,
    #[serde(default)]
    pub options: Options,
}
