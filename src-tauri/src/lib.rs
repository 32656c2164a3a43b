pub mod config;
pub mod controller;
pub mod cooldown;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod modes;
pub mod network;
pub mod progress;
pub mod rewrite;
pub mod secure_storage;
pub mod utils;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod state;

use error::AppError;
use tracing::{info, warn};

pub fn init_logging() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter("info")
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

pub fn init_rustls_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls CryptoProvider was already installed");
    } else {
        info!("rustls CryptoProvider initialized with ring");
    }
}

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use anyhow::Context;
    use tauri::{Emitter, Manager, RunEvent, WindowEvent};
    use tauri_plugin_clipboard_manager::ClipboardExt;
    use tokio::sync::broadcast;
    use tracing::{error, info, warn};

    use crate::commands;
    use crate::config::{AppSettings, SettingsStore};
    use crate::controller::{ClipboardSink, LifecycleController, Services, SessionEvent};
    use crate::secure_storage::KeyringStore;
    use crate::state::AppState;

    const MAIN_WINDOW_LABEL: &str = "main";
    const EVENT_SESSION_PHASE: &str = "session_phase";
    const EVENT_SESSION_INPUT: &str = "session_input";
    const EVENT_SESSION_OUTPUT: &str = "session_output";
    const EVENT_SESSION_ERROR: &str = "session_error";
    const EVENT_COOLDOWN_TICK: &str = "cooldown_tick";
    const EVENT_SCAN_PROGRESS: &str = "scan_progress";
    const EVENT_COPIED_CHANGED: &str = "copied_changed";

    struct TauriClipboard {
        app_handle: tauri::AppHandle,
    }

    impl ClipboardSink for TauriClipboard {
        fn write_text(&self, text: &str) -> Result<(), String> {
            self.app_handle
                .clipboard()
                .write_text(text.to_string())
                .map_err(|err| err.to_string())
        }
    }

    fn setup_app(app: &mut tauri::App) -> anyhow::Result<()> {
        let config_dir = app
            .path()
            .app_config_dir()
            .context("failed to resolve app config directory")?;
        let settings_store = SettingsStore::new(config_dir, Arc::new(KeyringStore));

        let settings = match settings_store.load() {
            Ok(settings) => settings,
            Err(err) => {
                warn!("failed to load persisted settings during startup: {err}");
                AppSettings::default()
            }
        };
        if !settings.has_api_key() {
            warn!("no Gemini API key configured; paraphrasing will fail until one is saved");
        }

        let services =
            Services::from_settings(&settings).context("failed to build Gemini client")?;
        let clipboard = Arc::new(TauriClipboard {
            app_handle: app.handle().clone(),
        });
        let controller = LifecycleController::with_defaults(
            services,
            clipboard,
            settings.default_mode,
            settings.tone(),
        );

        spawn_event_dispatcher(app.handle().clone(), controller.subscribe());
        app.manage(AppState::new(controller, settings_store));
        Ok(())
    }

    fn handle_run_event(app_handle: &tauri::AppHandle, event: RunEvent) {
        if let RunEvent::WindowEvent {
            label,
            event: WindowEvent::CloseRequested { .. },
            ..
        } = event
        {
            if label != MAIN_WINDOW_LABEL {
                return;
            }
            let Some(state) = app_handle.try_state::<AppState>() else {
                warn!("app state missing while handling close request");
                return;
            };
            let controller = state.controller().clone();
            tauri::async_runtime::spawn(async move {
                controller.shutdown().await;
            });
            info!("main window closing; session tasks cancelled");
        }
    }

    fn spawn_event_dispatcher(
        app_handle: tauri::AppHandle,
        mut events: broadcast::Receiver<SessionEvent>,
    ) {
        tauri::async_runtime::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => forward_session_event(&app_handle, event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("session event dispatcher lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("session event channel closed");
                        break;
                    }
                }
            }
        });
    }

    fn forward_session_event(app_handle: &tauri::AppHandle, event: SessionEvent) {
        let (event_name, result) = match event {
            SessionEvent::PhaseChanged { phase } => {
                (EVENT_SESSION_PHASE, app_handle.emit(EVENT_SESSION_PHASE, phase))
            }
            SessionEvent::InputChanged { input } => {
                (EVENT_SESSION_INPUT, app_handle.emit(EVENT_SESSION_INPUT, input))
            }
            SessionEvent::OutputChanged { output } => (
                EVENT_SESSION_OUTPUT,
                app_handle.emit(EVENT_SESSION_OUTPUT, output),
            ),
            SessionEvent::ErrorChanged { error } => {
                (EVENT_SESSION_ERROR, app_handle.emit(EVENT_SESSION_ERROR, error))
            }
            SessionEvent::CooldownTick { remaining } => (
                EVENT_COOLDOWN_TICK,
                app_handle.emit(EVENT_COOLDOWN_TICK, remaining),
            ),
            SessionEvent::ScanProgress { scan } => {
                (EVENT_SCAN_PROGRESS, app_handle.emit(EVENT_SCAN_PROGRESS, scan))
            }
            SessionEvent::CopiedChanged { copied } => (
                EVENT_COPIED_CHANGED,
                app_handle.emit(EVENT_COPIED_CHANGED, copied),
            ),
        };

        if let Err(err) = result {
            warn!(event_name, "failed to emit event: {err}");
        }
    }

    pub fn run() {
        info!("starting scholarflow desktop runtime");

        let builder = tauri::Builder::default()
            .setup(|app| setup_app(app).map_err(Into::into))
            .plugin(tauri_plugin_clipboard_manager::init())
            .invoke_handler(tauri::generate_handler![
                commands::app_status,
                commands::list_modes,
                commands::list_tones,
                commands::list_detectors,
                commands::get_session,
                commands::set_input,
                commands::set_mode,
                commands::set_tone,
                commands::paraphrase,
                commands::retry_paraphrase,
                commands::copy_output,
                commands::clear_session,
                commands::get_settings,
                commands::save_settings,
                commands::save_api_key,
                commands::get_performance_report
            ]);

        let app = match builder.build(tauri::generate_context!()) {
            Ok(app) => app,
            Err(build_err) => {
                error!("failed to build tauri app: {build_err}");
                return;
            }
        };

        app.run(handle_run_event);
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(init_err) = init_logging() {
        eprintln!("logging bootstrap failed: {init_err}");
    }
    init_rustls_crypto_provider();

    desktop::run();
}

#[cfg(test)]
mod tests {
    use super::init_rustls_crypto_provider;

    #[test]
    fn rustls_provider_install_is_idempotent() {
        init_rustls_crypto_provider();
        init_rustls_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
