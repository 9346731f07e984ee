use chatdesk_lib::config::{AppConfig, DatabaseLocation};
use chatdesk_lib::models::{Options, PresetInput};
use chatdesk_lib::storage::{KvBackend, MemoryStorage};
use chatdesk_lib::{AppState, Outcome, Rejection};
use serde_json::json;
use std::sync::Arc;

fn sqlite_config(dir: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        database: DatabaseLocation::Path(dir.path().join("chatdesk.sqlite")),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn state_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let config = sqlite_config(&dir);

    let preset_id = {
        let state = AppState::open(&config, 1280).await.unwrap();
        let preset = state
            .presets
            .lock()
            .await
            .set_preset(
                PresetInput {
                    name: "OpenAI API".to_string(),
                    client: "chatgpt".to_string(),
                    options: Options::from_iter([("temperature".to_string(), json!(0.7))]),
                    ..PresetInput::default()
                },
                true,
            )
            .await
            .unwrap();
        state.chat.lock().await.set_client_to_use("bing").await.unwrap();
        state
            .save_conversation("c1", Options::new(), vec![json!({"role": "user", "text": "hello"})])
            .await
            .unwrap();
        let renamed = state
            .conversations
            .lock()
            .await
            .update_conversation_title("c1", "  First chat ")
            .await
            .unwrap();
        assert_eq!(renamed, Outcome::Applied);
        preset.id
    };

    let state = AppState::open(&config, 800).await.unwrap();

    let conversations = state.conversations.lock().await;
    let record = conversations.conversation("c1").unwrap();
    assert_eq!(record.title, "First chat");
    assert_eq!(record.messages.len(), 1);
    assert_eq!(record.preset.as_ref().map(|p| p.id.as_str()), Some(preset_id.as_str()));
    assert_eq!(conversations.current_conversation_id(), "");

    let presets = state.presets.lock().await;
    assert_eq!(presets.active_preset().unwrap().options["temperature"], json!(0.7));
    assert_eq!(state.chat.lock().await.client_to_use(), "bing");
    assert!(state.ui.lock().await.flags().is_mobile_menu);
}

#[tokio::test]
async fn legacy_browser_export_loads_after_migration() {
    let backend = Arc::new(MemoryStorage::new());
    backend
        .set(
            "conversations",
            &json!({
                "legacy-1": {
                    "title": "From the browser",
                    "data": {"conversationId": "x", "parentMessageId": "y"},
                    "messages": [{"id": "y", "role": "bot", "message": "Hi!"}],
                    "createdAt": 1_680_000_000_000_i64,
                    "updatedAt": 1_680_000_100_000_i64,
                }
            })
            .to_string(),
        )
        .await
        .unwrap();
    backend
        .set(
            "presetsStore/presets",
            &json!([{"name": "Bing", "client": "bing", "options": {"toneStyle": "creative"}, "createdAt": 1}])
                .to_string(),
        )
        .await
        .unwrap();
    // Plain strings were written as bare text, not JSON
    backend.set("presetsStore/activePresetName", "bing").await.unwrap();
    backend.set("chatStore/clientToUse", "bing").await.unwrap();

    let state = AppState::load(backend.clone(), &AppConfig::default(), 1280).await.unwrap();

    let conversations = state.conversations.lock().await;
    let record = conversations.conversation("legacy-1").unwrap();
    assert_eq!(record.title, "From the browser");
    assert_eq!(record.updated_at.timestamp_millis(), 1_680_000_100_000);

    let presets = state.presets.lock().await;
    let active = presets.active_preset().unwrap();
    assert_eq!(active.name, "Bing");
    assert_eq!(active.options["toneStyle"], "creative");
    assert_eq!(state.chat.lock().await.client_to_use(), "bing");

    let keys = backend.keys().await.unwrap();
    assert!(!keys.contains(&"conversations".to_string()));
    assert!(!keys.contains(&"presetsStore/activePresetName".to_string()));
    assert!(keys.contains(&"schema/version".to_string()));
}

#[tokio::test]
async fn busy_controller_blocks_switching_but_not_saving() {
    let state = AppState::load(Arc::new(MemoryStorage::new()), &AppConfig::default(), 1280)
        .await
        .unwrap();
    state.save_conversation("c1", Options::new(), vec![]).await.unwrap();

    let busy = state.processing.begin();
    state
        .save_conversation("c1", Options::new(), vec![json!("partial reply")])
        .await
        .unwrap();
    let outcome = state.conversations.lock().await.start_new_conversation();
    assert_eq!(outcome, Outcome::Rejected(Rejection::Busy));
    drop(busy);

    let mut conversations = state.conversations.lock().await;
    assert_eq!(conversations.conversation("c1").unwrap().messages.len(), 1);
    assert_eq!(conversations.start_new_conversation(), Outcome::Applied);
    assert!(conversations.current_conversation().is_none());
}
