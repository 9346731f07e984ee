// Client-side state for the chat app: conversations, presets, the selected
// chat client and menu layout, persisted to a local key-value store.

pub mod chat;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod conversations;
pub mod credentials;
pub mod error;
pub mod migrations;
pub mod models;
pub mod presets;
pub mod processing;
pub mod state;
pub mod storage;
pub mod ui;

pub use error::{Outcome, Rejection, StoreError, StoreResult};
pub use state::AppState;

/// Installs env_logger, defaulting to `info` when `RUST_LOG` is unset.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

#[cfg(feature = "desktop")]
mod desktop {
    use crate::commands::*;
    use crate::config::{AppConfig, BackendKind};
    use crate::state::AppState;
    use crate::storage::TauriStoreStorage;
    use std::sync::Arc;
    use tauri::{Manager, WindowEvent};
    use tauri_plugin_store::StoreExt;
    use tokio::sync::watch;

    const STORE_FILE: &str = "chatdesk.json";
    const FALLBACK_VIEWPORT_WIDTH: u32 = 1280;

    // Latest logical width of the main window, feeding the UI store's listener
    struct ViewportWidth(watch::Sender<u32>);

    fn logical_width(size: tauri::PhysicalSize<u32>, scale_factor: f64) -> u32 {
        size.to_logical::<f64>(scale_factor).width.round() as u32
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        crate::init_logging();

        tauri::Builder::default()
            .plugin(tauri_plugin_store::Builder::default().build())
            .setup(|app| {
                let config = AppConfig::from_env()?;
                let data_dir = app.path().app_local_data_dir()?;
                let config = config.with_data_dir(data_dir);

                let width = match app.get_webview_window("main") {
                    Some(window) => logical_width(window.inner_size()?, window.scale_factor()?),
                    None => FALLBACK_VIEWPORT_WIDTH,
                };

                // We block here because setup is synchronous, but loading the stores is async.
                let app_state = match config.backend {
                    BackendKind::Sqlite => {
                        tauri::async_runtime::block_on(async { AppState::open(&config, width).await })?
                    }
                    BackendKind::StoreFile => {
                        let backend = Arc::new(TauriStoreStorage::new(app.store(STORE_FILE)?));
                        tauri::async_runtime::block_on(async { AppState::load(backend, &config, width).await })?
                    }
                };

                let (tx, rx) = watch::channel(width);
                let ui = app_state.ui.clone();
                // Spawning the listener needs the runtime context
                tauri::async_runtime::block_on(async move { ui.lock().await.mount(rx) });

                app.manage(ViewportWidth(tx));
                app.manage(app_state);
                Ok(())
            })
            .on_window_event(|window, event| {
                if let WindowEvent::Resized(size) = event {
                    let Some(viewport) = window.try_state::<ViewportWidth>() else {
                        return;
                    };
                    let scale_factor = window.scale_factor().unwrap_or(1.0);
                    viewport.0.send_replace(logical_width(*size, scale_factor));
                }
            })
            .invoke_handler(tauri::generate_handler![
                list_conversations,
                get_current_conversation,
                get_conversation_title,
                update_conversation,
                start_new_conversation,
                set_current_conversation_id,
                delete_conversation,
                clear_conversations,
                update_conversation_title,
                list_presets,
                get_preset,
                get_active_preset,
                set_preset,
                update_preset_options,
                delete_preset,
                set_active_preset,
                set_preset_api_key,
                has_preset_api_key,
                get_client_to_use,
                set_client_to_use,
                set_processing,
                get_ui_flags,
                set_menu_open,
                toggle_menu
            ])
            .run(tauri::generate_context!())
            .expect("error while running tauri application");
    }
}

#[cfg(feature = "desktop")]
pub use desktop::run;
