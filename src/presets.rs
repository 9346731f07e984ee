use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::chat::builtin_preset_name;
use crate::error::{Outcome, Rejection, StoreError, StoreResult};
use crate::models::{Options, PresetInput, PresetRecord};
use crate::storage::{KvBackend, Persisted};

pub const PRESETS_KEY: &str = "presetsStore/presets";
pub const ACTIVE_PRESET_KEY: &str = "presetsStore/activePreset";

/// Saved client configurations, and which one is active.
///
/// The active preset is kept as an id and resolved on every read, so edits to
/// a preset are always visible through [`PresetStore::active_preset`].
pub struct PresetStore {
    presets: Persisted<Vec<PresetRecord>>,
    active_preset_id: Persisted<Option<String>>,
}

impl PresetStore {
    pub async fn load(backend: Arc<dyn KvBackend>) -> StoreResult<Self> {
        let presets = Persisted::load(backend.clone(), PRESETS_KEY, Vec::new()).await?;
        let active_preset_id = Persisted::load(backend, ACTIVE_PRESET_KEY, None).await?;
        log::info!("Loaded {} presets", presets.get().len());
        Ok(Self {
            presets,
            active_preset_id,
        })
    }

    pub fn presets(&self) -> &[PresetRecord] {
        self.presets.get()
    }

    pub fn get_preset(&self, id: &str) -> Option<&PresetRecord> {
        self.presets.get().iter().find(|preset| preset.id == id)
    }

    /// Looks a preset up by display name. Built-in client ids resolve to
    /// their default preset names, e.g. `chatgpt` finds "OpenAI API".
    pub fn find_preset_by_name(&self, name: &str) -> Option<&PresetRecord> {
        let name = builtin_preset_name(name).unwrap_or(name);
        self.presets.get().iter().find(|preset| preset.name == name)
    }

    pub fn active_preset_id(&self) -> Option<&str> {
        self.active_preset_id.get().as_deref()
    }

    pub fn active_preset(&self) -> Option<&PresetRecord> {
        self.active_preset_id().and_then(|id| self.get_preset(id))
    }

    /// Saves a preset and returns the stored record.
    ///
    /// When `input.id` names an existing preset only its options are replaced;
    /// name, client and creation time are not editable. Otherwise a new preset
    /// is added, with a generated id if none was given and a name made unique
    /// with a " (n)" suffix.
    pub async fn set_preset(&mut self, input: PresetInput, set_active: bool) -> StoreResult<PresetRecord> {
        let existing = input.id.as_deref().and_then(|id| self.position(id));

        let preset = match existing {
            Some(index) => {
                let options = input.options;
                let preset = self
                    .presets
                    .update(|presets| {
                        presets[index].options = options;
                        presets[index].clone()
                    })
                    .await?;
                log::info!("Updated options of preset {} ({})", preset.name, preset.id);
                preset
            }
            None => {
                let preset = PresetRecord {
                    id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    name: self.unique_name(&input.name),
                    client: input.client,
                    options: input.options,
                    created_at: Utc::now(),
                };
                let stored = preset.clone();
                self.presets.update(|presets| presets.push(stored)).await?;
                log::info!("Added preset {} ({})", preset.name, preset.id);
                preset
            }
        };

        if set_active {
            self.active_preset_id.set(Some(preset.id.clone())).await?;
        }
        Ok(preset)
    }

    pub async fn update_preset_options(&mut self, id: &str, options: Options) -> StoreResult<PresetRecord> {
        let Some(index) = self.position(id) else {
            log::warn!("Attempted to update options of non-existent preset: {}", id);
            return Err(StoreError::PresetNotFound(id.to_string()));
        };

        let preset = self
            .presets
            .update(|presets| {
                presets[index].options = options;
                presets[index].clone()
            })
            .await?;
        Ok(preset)
    }

    /// Removes a preset. Deleting the active preset leaves no preset active.
    pub async fn delete_preset(&mut self, id: &str) -> StoreResult<Outcome> {
        let Some(index) = self.position(id) else {
            log::warn!("Attempted to delete non-existent preset: {}", id);
            return Ok(Outcome::Rejected(Rejection::NotFound));
        };

        let removed = self.presets.update(|presets| presets.remove(index)).await?;
        log::info!("Deleted preset {} ({})", removed.name, removed.id);

        if self.active_preset_id() == Some(id) {
            self.active_preset_id.set(None).await?;
        }
        Ok(Outcome::Applied)
    }

    pub async fn set_active_preset(&mut self, id: &str) -> StoreResult<Outcome> {
        if self.position(id).is_none() {
            return Ok(Outcome::Rejected(Rejection::NotFound));
        }
        self.active_preset_id.set(Some(id.to_string())).await?;
        Ok(Outcome::Applied)
    }

    pub async fn clear_active_preset(&mut self) -> StoreResult<()> {
        self.active_preset_id.set(None).await?;
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.presets.get().iter().position(|preset| preset.id == id)
    }

    fn unique_name(&self, name: &str) -> String {
        let taken = |candidate: &str| self.presets.get().iter().any(|preset| preset.name == candidate);
        if !taken(name) {
            return name.to_string();
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{} ({})", name, suffix);
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}
