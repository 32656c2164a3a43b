use serde::Serialize;
use tauri::State;
use tracing::{info, warn};

use crate::config::AppSettings;
use crate::controller::{Services, SessionSnapshot, SubmitOutcome};
use crate::error::AppError;
use crate::metrics::PerformanceReport;
use crate::modes::{MODES, ModeConfig, RewriteMode, Tone, ToneOption, tone_options};
use crate::progress::{DETECTOR_ROSTER, DetectorEngine};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub ready: bool,
    pub api_key_configured: bool,
}

fn status_snapshot(state: &AppState) -> Result<AppStatus, AppError> {
    let settings = state.settings().load()?;
    Ok(AppStatus {
        service: "scholarflow-core",
        version: env!("CARGO_PKG_VERSION"),
        ready: true,
        api_key_configured: settings.has_api_key(),
    })
}

#[tauri::command]
pub fn app_status(state: State<'_, AppState>) -> Result<AppStatus, String> {
    status_snapshot(&state).map_err(|err| err.to_string())
}

#[tauri::command]
pub fn list_modes() -> Vec<ModeConfig> {
    MODES.to_vec()
}

#[tauri::command]
pub fn list_tones() -> Vec<ToneOption> {
    tone_options()
}

#[tauri::command]
pub fn list_detectors() -> Vec<DetectorEngine> {
    DETECTOR_ROSTER.to_vec()
}

#[tauri::command]
pub async fn get_session(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    Ok(state.controller().snapshot().await)
}

#[tauri::command]
pub async fn set_input(
    state: State<'_, AppState>,
    text: String,
) -> Result<SessionSnapshot, String> {
    let controller = state.controller();
    controller.set_input(text).await;
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn set_mode(
    state: State<'_, AppState>,
    mode: RewriteMode,
) -> Result<SessionSnapshot, String> {
    let controller = state.controller();
    controller.set_mode(mode).await;
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn set_tone(state: State<'_, AppState>, tone: i64) -> Result<bool, String> {
    let tone = Tone::new(tone).map_err(|err| err.to_string())?;
    Ok(state.controller().set_tone(tone).await)
}

#[tauri::command]
pub async fn paraphrase(state: State<'_, AppState>) -> Result<SubmitOutcome, String> {
    Ok(state.controller().submit().await)
}

#[tauri::command]
pub async fn retry_paraphrase(state: State<'_, AppState>) -> Result<SubmitOutcome, String> {
    Ok(state.controller().retry().await)
}

#[tauri::command]
pub async fn copy_output(state: State<'_, AppState>) -> Result<bool, String> {
    state
        .controller()
        .copy_output()
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn clear_session(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = state.controller();
    controller.clear().await;
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn get_performance_report(
    state: State<'_, AppState>,
) -> Result<PerformanceReport, String> {
    Ok(state.controller().performance_report().await)
}

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> Result<AppSettings, String> {
    state.settings().load().map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn save_settings(
    state: State<'_, AppState>,
    settings: AppSettings,
) -> Result<AppSettings, String> {
    save_settings_impl(&state, settings)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn save_api_key(state: State<'_, AppState>, api_key: String) -> Result<(), String> {
    let mut settings = state.settings().load().map_err(|err| err.to_string())?;
    settings.api_key = api_key;
    save_settings_impl(&state, settings)
        .await
        .map(|_| ())
        .map_err(|err| err.to_string())
}

async fn save_settings_impl(
    state: &AppState,
    settings: AppSettings,
) -> Result<AppSettings, AppError> {
    let saved = state.settings().save(settings)?;

    // In-flight calls keep the client they started with.
    match Services::from_settings(&saved) {
        Ok(services) => {
            state.controller().replace_services(services).await;
            info!(
                rewrite_model = %saved.rewrite_model,
                detection_model = %saved.detection_model,
                "paraphrase services rebuilt from saved settings"
            );
        }
        Err(err) => {
            warn!("failed to rebuild Gemini client after saving settings: {err}");
            return Err(AppError::Runtime(err.to_string()));
        }
    }

    Ok(saved)
}
