//! Where a preset's API key comes from.
//!
//! Keys never live in the preset options themselves. A preset carries an
//! `apiKeyRef` option pointing at either an environment variable
//! (`env:OPENAI_API_KEY`) or the OS keyring, where the key is filed under the
//! preset id so renaming a preset keeps its key.

use anyhow::{Context, Result};
use keyring::Entry;
use serde_json::Value;

use crate::models::{Options, PresetRecord};

pub const API_KEY_REF_OPTION: &str = "apiKeyRef";

const KEYRING_SERVICE: &str = "chatdesk";
const KEYRING_REF: &str = "keyring";
const ENV_PREFIX: &str = "env:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiKeyRef {
    Env(String),
    Keyring,
}

impl ApiKeyRef {
    /// Reads the reference out of a preset's options. `None` when the preset has none.
    pub fn from_options(options: &Options) -> Result<Option<Self>> {
        let Some(value) = options.get(API_KEY_REF_OPTION) else {
            return Ok(None);
        };
        let Some(raw) = value.as_str() else {
            anyhow::bail!("{} must be a string, got {}", API_KEY_REF_OPTION, value);
        };
        match raw {
            KEYRING_REF => Ok(Some(Self::Keyring)),
            _ => match raw.strip_prefix(ENV_PREFIX) {
                Some(var) if !var.is_empty() => Ok(Some(Self::Env(var.to_string()))),
                _ => anyhow::bail!("Unsupported {}: '{}'", API_KEY_REF_OPTION, raw),
            },
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Env(var) => Value::String(format!("{}{}", ENV_PREFIX, var)),
            Self::Keyring => Value::String(KEYRING_REF.to_string()),
        }
    }

    /// Looks the key up for `preset_id`.
    pub fn resolve(&self, preset_id: &str) -> Result<String> {
        match self {
            Self::Env(var) => {
                log::debug!("Reading API key for preset {} from ${}", preset_id, var);
                std::env::var(var).with_context(|| format!("Environment variable '{}' is not set", var))
            }
            Self::Keyring => {
                log::debug!("Reading API key for preset {} from the keyring", preset_id);
                keyring_entry(preset_id)?
                    .get_password()
                    .with_context(|| format!("No API key in the keyring for preset {}", preset_id))
            }
        }
    }
}

/// Resolves the API key `preset` points at.
pub fn preset_api_key(preset: &PresetRecord) -> Result<String> {
    match ApiKeyRef::from_options(&preset.options)? {
        Some(key_ref) => key_ref.resolve(&preset.id),
        None => anyhow::bail!("Preset '{}' has no API key configured", preset.name),
    }
}

/// Files `api_key` in the OS keyring under `preset_id`.
pub fn store_in_keyring(preset_id: &str, api_key: &str) -> Result<()> {
    log::info!("Storing API key for preset {} in the keyring", preset_id);
    keyring_entry(preset_id)?
        .set_password(api_key)
        .with_context(|| format!("Failed to store API key for preset {}", preset_id))
}

/// Drops the keyring entry of a deleted preset. A missing entry is fine.
pub fn forget_keyring_entry(preset_id: &str) -> Result<()> {
    match keyring_entry(preset_id)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove API key for preset {}", preset_id)),
    }
}

fn keyring_entry(preset_id: &str) -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, preset_id).context("Failed to open keyring entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn options(key_ref: Value) -> Options {
        Options::from_iter([(API_KEY_REF_OPTION.to_string(), key_ref)])
    }

    #[test]
    fn parses_env_and_keyring_references() {
        assert_eq!(
            ApiKeyRef::from_options(&options(json!("env:OPENAI_API_KEY"))).unwrap(),
            Some(ApiKeyRef::Env("OPENAI_API_KEY".to_string()))
        );
        assert_eq!(
            ApiKeyRef::from_options(&options(json!("keyring"))).unwrap(),
            Some(ApiKeyRef::Keyring)
        );
        assert_eq!(ApiKeyRef::from_options(&Options::new()).unwrap(), None);
        assert_eq!(ApiKeyRef::Env("X".to_string()).to_value(), json!("env:X"));
    }

    #[test]
    fn rejects_unknown_references() {
        assert!(ApiKeyRef::from_options(&options(json!("vault:abc"))).is_err());
        assert!(ApiKeyRef::from_options(&options(json!("env:"))).is_err());
        assert!(ApiKeyRef::from_options(&options(json!(42))).is_err());
    }

    #[test]
    fn preset_key_comes_from_environment() {
        std::env::set_var("CHATDESK_CREDENTIALS_TEST_KEY", "sk-test");
        let preset = PresetRecord {
            id: "p1".to_string(),
            name: "OpenAI API".to_string(),
            client: "chatgpt".to_string(),
            options: options(json!("env:CHATDESK_CREDENTIALS_TEST_KEY")),
            created_at: Utc::now(),
        };

        assert_eq!(preset_api_key(&preset).unwrap(), "sk-test");
    }

    #[test]
    fn preset_without_reference_has_no_key() {
        let preset = PresetRecord {
            id: "p1".to_string(),
            name: "Bing".to_string(),
            client: "bing".to_string(),
            options: Options::new(),
            created_at: Utc::now(),
        };

        assert!(preset_api_key(&preset).is_err());
    }
}
