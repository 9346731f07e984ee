//! Versioned upgrades of the stored key layout.
//!
//! Version 0 is the layout written by the first web releases: conversations
//! under `conversations`, presets identified by name and the active preset
//! stored as a name. Version 1 moves conversations to `conversations/v1`,
//! gives every preset a stable id and stores the active preset by id.

use anyhow::Context;
use serde_json::{Map, Value};

use crate::chat::{builtin_preset_name, CLIENT_TO_USE_KEY};
use crate::conversations::CONVERSATIONS_KEY;
use crate::models::{ConversationRecord, PresetRecord};
use crate::presets::{ACTIVE_PRESET_KEY, PRESETS_KEY};
use crate::storage::KvBackend;

pub const SCHEMA_VERSION_KEY: &str = "schema/version";
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const LEGACY_CONVERSATIONS_KEY: &str = "conversations";
pub const LEGACY_ACTIVE_PRESET_NAME_KEY: &str = "presetsStore/activePresetName";

/// Brings the stored layout up to [`CURRENT_SCHEMA_VERSION`]. Returns the version found.
pub async fn run_migrations(backend: &dyn KvBackend) -> Result<u32, anyhow::Error> {
    let found = stored_version(backend).await?;
    if found >= CURRENT_SCHEMA_VERSION {
        log::debug!("Storage schema is at version {}", found);
        return Ok(found);
    }

    log::info!("Migrating storage schema from version {} to {}", found, CURRENT_SCHEMA_VERSION);
    if found < 1 {
        migrate_conversations_v1(backend).await?;
        migrate_presets_v1(backend).await?;
        migrate_client_to_use_v1(backend).await?;
    }

    backend
        .set(SCHEMA_VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_string())
        .await
        .context("Failed to record schema version")?;
    log::info!("Storage schema migration completed.");
    Ok(found)
}

async fn stored_version(backend: &dyn KvBackend) -> Result<u32, anyhow::Error> {
    let Some(raw) = backend.get(SCHEMA_VERSION_KEY).await? else {
        return Ok(0);
    };
    match raw.trim().parse() {
        Ok(version) => Ok(version),
        Err(_) => {
            log::warn!("Unreadable schema version '{}', treating as 0", raw);
            Ok(0)
        }
    }
}

async fn migrate_conversations_v1(backend: &dyn KvBackend) -> Result<(), anyhow::Error> {
    let Some(raw) = backend.get(LEGACY_CONVERSATIONS_KEY).await? else {
        return Ok(());
    };

    let legacy: Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(legacy) => legacy,
        Err(e) => {
            log::warn!("Dropping undecodable legacy conversations: {}", e);
            return backend.remove(LEGACY_CONVERSATIONS_KEY).await;
        }
    };

    // Entries already under v1 are kept verbatim, even ones this build cannot decode
    let mut conversations: Map<String, Value> = match backend.get(CONVERSATIONS_KEY).await? {
        Some(current) => match serde_json::from_str(&current) {
            Ok(current) => current,
            Err(e) => {
                log::warn!(
                    "'{}' is not a JSON object ({}); leaving legacy conversations in place",
                    CONVERSATIONS_KEY,
                    e
                );
                return Ok(());
            }
        },
        None => Map::new(),
    };

    let mut moved = 0;
    for (id, mut value) in legacy {
        if conversations.contains_key(&id) {
            continue;
        }
        // Old records relied on the map key for their id
        if let Value::Object(fields) = &mut value {
            fields.entry("id").or_insert_with(|| Value::String(id.clone()));
        }
        match serde_json::from_value::<ConversationRecord>(value) {
            Ok(record) => {
                let encoded = serde_json::to_value(&record).context("Failed to encode migrated conversation")?;
                conversations.insert(id, encoded);
                moved += 1;
            }
            Err(e) => log::warn!("Skipping undecodable legacy conversation {}: {}", id, e),
        }
    }

    let encoded = serde_json::to_string(&conversations).context("Failed to encode migrated conversations")?;
    backend.set(CONVERSATIONS_KEY, &encoded).await?;
    backend.remove(LEGACY_CONVERSATIONS_KEY).await?;
    log::info!("Moved {} conversations to '{}'", moved, CONVERSATIONS_KEY);
    Ok(())
}

async fn migrate_presets_v1(backend: &dyn KvBackend) -> Result<(), anyhow::Error> {
    let presets: Vec<PresetRecord> = match backend.get(PRESETS_KEY).await? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(presets) => presets,
            Err(e) => {
                log::warn!("Leaving undecodable presets untouched: {}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    // Persist the ids generated while decoding so they stay stable
    if !presets.is_empty() {
        let encoded = serde_json::to_string(&presets).context("Failed to encode migrated presets")?;
        backend.set(PRESETS_KEY, &encoded).await?;
    }

    let Some(raw_name) = backend.get(LEGACY_ACTIVE_PRESET_NAME_KEY).await? else {
        return Ok(());
    };
    let name: String = serde_json::from_str(&raw_name).unwrap_or(raw_name);
    let lookup = builtin_preset_name(&name).unwrap_or(name.as_str());

    if backend.get(ACTIVE_PRESET_KEY).await?.is_none() {
        match presets.iter().find(|preset| preset.name == lookup) {
            Some(preset) => {
                let encoded = serde_json::to_string(&Some(&preset.id))?;
                backend.set(ACTIVE_PRESET_KEY, &encoded).await?;
                log::info!("Active preset '{}' is now referenced by id {}", name, preset.id);
            }
            None => log::warn!("Legacy active preset '{}' no longer exists", name),
        }
    }
    backend.remove(LEGACY_ACTIVE_PRESET_NAME_KEY).await
}

// The web build stored the selected client as bare text, not JSON
async fn migrate_client_to_use_v1(backend: &dyn KvBackend) -> Result<(), anyhow::Error> {
    let Some(raw) = backend.get(CLIENT_TO_USE_KEY).await? else {
        return Ok(());
    };
    if serde_json::from_str::<String>(&raw).is_ok() {
        return Ok(());
    }

    let client = raw.trim();
    if client.is_empty() {
        log::warn!("Dropping empty '{}'", CLIENT_TO_USE_KEY);
        return backend.remove(CLIENT_TO_USE_KEY).await;
    }
    let encoded = serde_json::to_string(client)?;
    backend.set(CLIENT_TO_USE_KEY, &encoded).await?;
    log::info!("Re-encoded '{}' as JSON: {}", CLIENT_TO_USE_KEY, encoded);
    Ok(())
}
