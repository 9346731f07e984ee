// Tauri commands exposing the stores to the web view

use crate::error::{Outcome, StoreError};
use crate::models::{ConversationRecord, Options, PresetInput, PresetRecord};
use crate::processing::ProcessingState;
use crate::state::AppState;
use crate::ui::UiFlags;
use serde_json::Value;
use tauri::State;

// --- Conversation Commands ---

#[tauri::command]
pub async fn list_conversations(state: State<'_, AppState>) -> Result<Vec<ConversationRecord>, String> {
    log::debug!("Frontend requested to list conversations");
    let conversations = state.conversations.lock().await;
    Ok(conversations.conversations().into_iter().cloned().collect())
}

#[tauri::command]
pub async fn get_current_conversation(
    state: State<'_, AppState>,
) -> Result<Option<ConversationRecord>, String> {
    let conversations = state.conversations.lock().await;
    Ok(conversations.current_conversation().cloned())
}

#[tauri::command]
pub async fn get_conversation_title(state: State<'_, AppState>) -> Result<String, String> {
    let conversations = state.conversations.lock().await;
    Ok(conversations.conversation_title().to_string())
}

// Saves the conversation along with the active preset
#[tauri::command]
pub async fn update_conversation(
    state: State<'_, AppState>,
    conversation_id: String,
    data: Options,
    messages: Vec<Value>,
) -> Result<(), String> {
    log::info!("Frontend requested to save conversation {}", conversation_id);
    state
        .save_conversation(&conversation_id, data, messages)
        .await
        .map_err(|e| {
            log::error!("Failed to save conversation {}: {:?}", conversation_id, e);
            format!("Failed to save conversation: {}", e)
        })
}

#[tauri::command]
pub async fn start_new_conversation(state: State<'_, AppState>) -> Result<Outcome, String> {
    let mut conversations = state.conversations.lock().await;
    Ok(conversations.start_new_conversation())
}

#[tauri::command]
pub async fn set_current_conversation_id(
    state: State<'_, AppState>,
    conversation_id: String,
) -> Result<Outcome, String> {
    log::info!("Frontend requested to switch to conversation {}", conversation_id);
    state.resume_conversation(&conversation_id).await.map_err(|e| {
        log::error!("Failed to switch to conversation {}: {:?}", conversation_id, e);
        format!("Failed to switch conversation: {}", e)
    })
}

#[tauri::command]
pub async fn delete_conversation(state: State<'_, AppState>, conversation_id: String) -> Result<Outcome, String> {
    log::warn!("[CMD] Frontend requested to delete conversation ID: {}", conversation_id);
    let mut conversations = state.conversations.lock().await;
    conversations.delete_conversation(&conversation_id).await.map_err(|e| {
        log::error!("[CMD] Failed to delete conversation {}: {:?}", conversation_id, e);
        format!("Failed to delete conversation: {}", e)
    })
}

#[tauri::command]
pub async fn clear_conversations(state: State<'_, AppState>) -> Result<Outcome, String> {
    log::warn!("[CMD] Frontend requested to clear all conversations");
    let mut conversations = state.conversations.lock().await;
    conversations.clear_conversations().await.map_err(|e| {
        log::error!("[CMD] Failed to clear conversations: {:?}", e);
        format!("Failed to clear conversations: {}", e)
    })
}

#[tauri::command]
pub async fn update_conversation_title(
    state: State<'_, AppState>,
    conversation_id: String,
    title: String,
) -> Result<Outcome, String> {
    let mut conversations = state.conversations.lock().await;
    conversations
        .update_conversation_title(&conversation_id, &title)
        .await
        .map_err(|e| {
            log::error!("Failed to rename conversation {}: {:?}", conversation_id, e);
            format!("Failed to rename conversation: {}", e)
        })
}

// --- Preset Commands ---

#[tauri::command]
pub async fn list_presets(state: State<'_, AppState>) -> Result<Vec<PresetRecord>, String> {
    let presets = state.presets.lock().await;
    Ok(presets.presets().to_vec())
}

#[tauri::command]
pub async fn get_preset(state: State<'_, AppState>, preset_id: String) -> Result<Option<PresetRecord>, String> {
    let presets = state.presets.lock().await;
    Ok(presets.get_preset(&preset_id).cloned())
}

#[tauri::command]
pub async fn get_active_preset(state: State<'_, AppState>) -> Result<Option<PresetRecord>, String> {
    let presets = state.presets.lock().await;
    Ok(presets.active_preset().cloned())
}

#[tauri::command]
pub async fn set_preset(
    state: State<'_, AppState>,
    preset: PresetInput,
    set_active: bool,
) -> Result<PresetRecord, String> {
    log::info!("Frontend requested to save preset {}", preset.name);
    let mut presets = state.presets.lock().await;
    presets.set_preset(preset, set_active).await.map_err(|e| {
        log::error!("Failed to save preset: {:?}", e);
        format!("Failed to save preset: {}", e)
    })
}

#[tauri::command]
pub async fn update_preset_options(
    state: State<'_, AppState>,
    preset_id: String,
    options: Options,
) -> Result<PresetRecord, String> {
    let mut presets = state.presets.lock().await;
    presets.update_preset_options(&preset_id, options).await.map_err(|e| {
        log::error!("Failed to update preset {}: {:?}", preset_id, e);
        e.to_string()
    })
}

#[tauri::command]
pub async fn delete_preset(state: State<'_, AppState>, preset_id: String) -> Result<Outcome, String> {
    log::warn!("[CMD] Frontend requested to delete preset ID: {}", preset_id);
    state.delete_preset(&preset_id).await.map_err(|e| {
        log::error!("[CMD] Failed to delete preset {}: {:?}", preset_id, e);
        format!("Failed to delete preset: {}", e)
    })
}

#[tauri::command]
pub async fn set_active_preset(state: State<'_, AppState>, preset_id: String) -> Result<Outcome, String> {
    let mut presets = state.presets.lock().await;
    presets.set_active_preset(&preset_id).await.map_err(|e| {
        log::error!("Failed to activate preset {}: {:?}", preset_id, e);
        format!("Failed to activate preset: {}", e)
    })
}

// Key goes to the OS keyring; the preset only records where to find it
#[tauri::command]
pub async fn set_preset_api_key(
    state: State<'_, AppState>,
    preset_id: String,
    api_key: String,
) -> Result<PresetRecord, String> {
    log::info!("Frontend requested to set the API key of preset {}", preset_id);
    state.set_preset_api_key(&preset_id, &api_key).await.map_err(|e| {
        log::error!("Failed to set API key of preset {}: {:?}", preset_id, e);
        e.to_string()
    })
}

#[tauri::command]
pub async fn has_preset_api_key(state: State<'_, AppState>, preset_id: String) -> Result<bool, String> {
    match state.preset_api_key(&preset_id).await {
        Ok(_) => Ok(true),
        Err(StoreError::Credentials(e)) => {
            log::debug!("Preset {} has no usable API key: {:#}", preset_id, e);
            Ok(false)
        }
        Err(e) => Err(e.to_string()),
    }
}

// --- Chat Client Commands ---

#[tauri::command]
pub async fn get_client_to_use(state: State<'_, AppState>) -> Result<String, String> {
    Ok(state.chat.lock().await.client_to_use().to_string())
}

#[tauri::command]
pub async fn set_client_to_use(state: State<'_, AppState>, client: String) -> Result<(), String> {
    let mut chat = state.chat.lock().await;
    chat.set_client_to_use(&client).await.map_err(|e| {
        log::error!("Failed to set chat client {}: {:?}", client, e);
        format!("Failed to set chat client: {}", e)
    })
}

// Set by the chat view around a streaming response
#[tauri::command]
pub async fn set_processing(state: State<'_, AppState>, busy: bool) -> Result<ProcessingState, String> {
    state.processing.set_busy(busy);
    Ok(state.processing.state())
}

// --- UI Commands ---

#[tauri::command]
pub async fn get_ui_flags(state: State<'_, AppState>) -> Result<UiFlags, String> {
    Ok(state.ui.lock().await.flags())
}

#[tauri::command]
pub async fn set_menu_open(state: State<'_, AppState>, open: bool) -> Result<UiFlags, String> {
    let mut ui = state.ui.lock().await;
    ui.set_menu_open(open);
    Ok(ui.flags())
}

#[tauri::command]
pub async fn toggle_menu(state: State<'_, AppState>) -> Result<UiFlags, String> {
    let mut ui = state.ui.lock().await;
    ui.toggle_menu();
    Ok(ui.flags())
}
