use std::sync::Arc;

use crate::error::StoreResult;
use crate::storage::{KvBackend, Persisted};

pub const CLIENT_TO_USE_KEY: &str = "chatStore/clientToUse";
pub const DEFAULT_CLIENT: &str = "chatgpt";

/// Name of the preset that ships with each built-in client.
pub fn builtin_preset_name(client: &str) -> Option<&'static str> {
    match client {
        "chatgpt" => Some("OpenAI API"),
        "chatgpt-browser" => Some("ChatGPT"),
        "bing" => Some("Bing"),
        _ => None,
    }
}

/// Which backend chat client new messages go to.
pub struct ChatStore {
    client_to_use: Persisted<String>,
}

impl ChatStore {
    pub async fn load(backend: Arc<dyn KvBackend>, default_client: &str) -> StoreResult<Self> {
        let client_to_use =
            Persisted::load(backend, CLIENT_TO_USE_KEY, default_client.to_string()).await?;
        Ok(Self { client_to_use })
    }

    pub fn client_to_use(&self) -> &str {
        self.client_to_use.get()
    }

    // Any identifier is accepted; the networking layer decides what it supports.
    pub async fn set_client_to_use(&mut self, client: &str) -> StoreResult<()> {
        log::info!("Switching chat client to {}", client);
        self.client_to_use.set(client.to_string()).await?;
        Ok(())
    }
}
