use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::modes::{MAX_TONE, MIN_TONE, RewriteMode, Tone};
use crate::network::{
    DEFAULT_API_BASE_URL, DEFAULT_DETECTION_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_REWRITE_MODEL, GeminiConfig,
};
use crate::secure_storage::SecretStore;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_rewrite_model")]
    pub rewrite_model: String,
    #[serde(default = "default_detection_model")]
    pub detection_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub default_mode: RewriteMode,
    /// Raw slider value so an out-of-range file entry can be normalized instead of rejected.
    #[serde(default)]
    pub default_tone: i64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            rewrite_model: default_rewrite_model(),
            detection_model: default_detection_model(),
            request_timeout_secs: default_request_timeout_secs(),
            default_mode: RewriteMode::default(),
            default_tone: 0,
        }
    }
}

impl AppSettings {
    pub fn tone(&self) -> Tone {
        Tone::new(self.default_tone).unwrap_or(Tone::NEUTRAL)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl From<&AppSettings> for GeminiConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.api_base_url.clone(),
            rewrite_model: settings.rewrite_model.clone(),
            detection_model: settings.detection_model.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_rewrite_model() -> String {
    DEFAULT_REWRITE_MODEL.to_string()
}

fn default_detection_model() -> String {
    DEFAULT_DETECTION_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn read_api_key_from_environment(lookup: fn(&str) -> Option<String>) -> Option<String> {
    API_KEY_ENV_VARS.iter().find_map(|name| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Settings persisted as JSON, with the API key kept in secure storage when it works.
pub struct SettingsStore {
    path: PathBuf,
    secrets: Arc<dyn SecretStore>,
    env_lookup: fn(&str) -> Option<String>,
}

impl SettingsStore {
    pub fn new(config_dir: impl AsRef<Path>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            path: config_dir.as_ref().join(CONFIG_FILE_NAME),
            secrets,
            env_lookup: process_env,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppSettings, ConfigError> {
        let mut settings = normalize_loaded_settings(self.read_file()?);

        match self.secrets.read_api_key() {
            Ok(Some(api_key)) => settings.api_key = api_key.trim().to_string(),
            Ok(None) => {
                // Older builds wrote the key into the JSON file. Only clear it once the
                // secure copy reads back.
                if settings.has_api_key() && self.store_api_key_securely(&settings.api_key) {
                    let sanitized = AppSettings {
                        api_key: String::new(),
                        ..settings.clone()
                    };
                    match self.write_file(&sanitized) {
                        Ok(()) => info!("migrated plaintext API key into secure storage"),
                        Err(err) => warn!(
                            "failed to rewrite sanitized config after secure migration: {err}"
                        ),
                    }
                }
            }
            Err(err) => {
                warn!("failed to read API key from secure storage; using config fallback: {err}");
            }
        }

        if !settings.has_api_key() {
            if let Some(env_api_key) = read_api_key_from_environment(self.env_lookup) {
                settings.api_key = env_api_key;
            }
        }

        Ok(settings)
    }

    pub fn save(&self, settings: AppSettings) -> Result<AppSettings, ConfigError> {
        let validated = validate_settings(settings)?;

        let persisted = if self.store_api_key_securely(&validated.api_key) {
            AppSettings {
                api_key: String::new(),
                ..validated.clone()
            }
        } else {
            validated.clone()
        };
        self.write_file(&persisted)?;

        info!(
            path = %self.path.display(),
            has_api_key = validated.has_api_key(),
            "settings saved"
        );
        Ok(validated)
    }

    /// Returns `true` only when the key round-trips through secure storage.
    fn store_api_key_securely(&self, api_key: &str) -> bool {
        if let Err(err) = self.secrets.write_api_key(api_key) {
            warn!("failed to write API key into secure storage, fallback to config persistence: {err}");
            return false;
        }
        if api_key.trim().is_empty() {
            return true;
        }

        match self.secrets.read_api_key() {
            Ok(Some(saved)) if saved.trim() == api_key.trim() => true,
            Ok(_) => {
                warn!("secure storage write could not be verified, fallback to config persistence");
                false
            }
            Err(err) => {
                warn!(
                    "failed to verify API key from secure storage, fallback to config persistence: {err}"
                );
                false
            }
        }
    }

    fn read_file(&self) -> Result<AppSettings, ConfigError> {
        if !self.path.exists() {
            return Ok(AppSettings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str::<AppSettings>(&content)?)
    }

    fn write_file(&self, settings: &AppSettings) -> Result<(), ConfigError> {
        let io_error = |source: io::Error| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let serialized = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, serialized).map_err(io_error)
    }
}

fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        default_api_base_url()
    } else {
        trimmed.to_string()
    }
}

fn normalize_model(model: &str, fallback: fn() -> String) -> String {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn normalize_loaded_settings(mut settings: AppSettings) -> AppSettings {
    settings.api_key = settings.api_key.trim().to_string();
    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    settings.rewrite_model = normalize_model(&settings.rewrite_model, default_rewrite_model);
    settings.detection_model = normalize_model(&settings.detection_model, default_detection_model);

    if !(MIN_REQUEST_TIMEOUT_SECS..=MAX_REQUEST_TIMEOUT_SECS).contains(&settings.request_timeout_secs)
    {
        warn!(
            timeout_secs = settings.request_timeout_secs,
            "loaded request timeout is out of range; resetting to default"
        );
        settings.request_timeout_secs = default_request_timeout_secs();
    }

    if Tone::new(settings.default_tone).is_err() {
        warn!(
            tone = settings.default_tone,
            "loaded default tone is out of range; resetting to neutral"
        );
        settings.default_tone = 0;
    }

    settings
}

fn validate_settings(mut settings: AppSettings) -> Result<AppSettings, ConfigError> {
    settings.api_key = settings.api_key.trim().to_string();

    settings.api_base_url = settings.api_base_url.trim().trim_end_matches('/').to_string();
    if !(settings.api_base_url.starts_with("https://") || settings.api_base_url.starts_with("http://"))
    {
        return Err(ConfigError::Invalid(
            "apiBaseUrl must start with http:// or https://".to_string(),
        ));
    }

    settings.rewrite_model = settings.rewrite_model.trim().to_string();
    settings.detection_model = settings.detection_model.trim().to_string();
    if settings.rewrite_model.is_empty() || settings.detection_model.is_empty() {
        return Err(ConfigError::Invalid(
            "rewriteModel and detectionModel cannot be empty".to_string(),
        ));
    }

    if !(MIN_REQUEST_TIMEOUT_SECS..=MAX_REQUEST_TIMEOUT_SECS).contains(&settings.request_timeout_secs)
    {
        return Err(ConfigError::Invalid(format!(
            "requestTimeoutSecs must be between {MIN_REQUEST_TIMEOUT_SECS} and {MAX_REQUEST_TIMEOUT_SECS}"
        )));
    }

    if Tone::new(settings.default_tone).is_err() {
        return Err(ConfigError::Invalid(format!(
            "defaultTone must be between {MIN_TONE} and {MAX_TONE}"
        )));
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemorySecrets {
        value: Mutex<Option<String>>,
        broken: bool,
        unreadable: bool,
    }

    impl MemorySecrets {
        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }

        /// Accepts writes but never returns them, like keyring's mock backend.
        fn unreadable() -> Self {
            Self {
                unreadable: true,
                ..Self::default()
            }
        }

        fn stored(&self) -> Option<String> {
            self.value.lock().expect("secret lock").clone()
        }
    }

    impl SecretStore for MemorySecrets {
        fn read_api_key(&self) -> Result<Option<String>, String> {
            if self.broken {
                return Err("platform credential store unavailable".to_string());
            }
            if self.unreadable {
                return Ok(None);
            }
            Ok(self.stored())
        }

        fn write_api_key(&self, api_key: &str) -> Result<(), String> {
            if self.broken {
                return Err("platform credential store unavailable".to_string());
            }
            let trimmed = api_key.trim();
            *self.value.lock().expect("secret lock") =
                (!trimmed.is_empty()).then(|| trimmed.to_string());
            Ok(())
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn store(dir: &Path, secrets: Arc<MemorySecrets>) -> SettingsStore {
        SettingsStore {
            env_lookup: no_env,
            ..SettingsStore::new(dir, secrets)
        }
    }

    fn file_contents(store: &SettingsStore) -> AppSettings {
        let raw = fs::read_to_string(store.path()).expect("config file should exist");
        serde_json::from_str(&raw).expect("config file should parse")
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::default()));

        let settings = store.load().expect("load should succeed");
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.default_mode, RewriteMode::Academic);
        assert_eq!(settings.request_timeout_secs, 60);
    }

    #[test]
    fn saved_key_goes_to_secure_storage_not_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let secrets = Arc::new(MemorySecrets::default());
        let store = store(dir.path(), Arc::clone(&secrets));

        let saved = store
            .save(AppSettings {
                api_key: "  secret-key ".to_string(),
                default_mode: RewriteMode::Humanize,
                default_tone: -1,
                ..AppSettings::default()
            })
            .expect("save should succeed");
        assert_eq!(saved.api_key, "secret-key");

        assert_eq!(secrets.stored().as_deref(), Some("secret-key"));
        let on_disk = file_contents(&store);
        assert!(on_disk.api_key.is_empty());
        assert_eq!(on_disk.default_mode, RewriteMode::Humanize);

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.api_key, "secret-key");
        assert_eq!(loaded.tone().label(), "Informal");
    }

    #[test]
    fn unavailable_secure_storage_falls_back_to_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::broken()));

        store
            .save(AppSettings {
                api_key: "file-key".to_string(),
                ..AppSettings::default()
            })
            .expect("save should succeed");

        assert_eq!(file_contents(&store).api_key, "file-key");
        assert_eq!(store.load().expect("load").api_key, "file-key");
    }

    #[test]
    fn legacy_plaintext_key_is_migrated_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let secrets = Arc::new(MemorySecrets::default());
        let store = store(dir.path(), Arc::clone(&secrets));
        fs::write(store.path(), r#"{ "apiKey": "legacy-key", "defaultTone": 2 }"#)
            .expect("write legacy config");

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.api_key, "legacy-key");
        assert_eq!(loaded.default_tone, 2);
        assert_eq!(secrets.stored().as_deref(), Some("legacy-key"));
        assert!(file_contents(&store).api_key.is_empty());
    }

    #[test]
    fn unverified_secure_storage_keeps_the_key_in_the_file_across_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::unreadable()));

        store
            .save(AppSettings {
                api_key: "real-key".to_string(),
                ..AppSettings::default()
            })
            .expect("save should succeed");
        assert_eq!(file_contents(&store).api_key, "real-key");

        assert_eq!(store.load().expect("first load").api_key, "real-key");
        assert_eq!(store.load().expect("second load").api_key, "real-key");
        assert_eq!(file_contents(&store).api_key, "real-key");
    }

    #[test]
    fn environment_key_fills_in_when_nothing_is_stored() {
        fn fake_env(name: &str) -> Option<String> {
            match name {
                "GEMINI_API_KEY" => Some("   ".to_string()),
                "API_KEY" => Some("env-key".to_string()),
                _ => None,
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore {
            env_lookup: fake_env,
            ..SettingsStore::new(dir.path(), Arc::new(MemorySecrets::default()))
        };

        assert_eq!(store.load().expect("load").api_key, "env-key");
    }

    #[test]
    fn out_of_range_values_are_normalized_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::default()));
        fs::write(
            store.path(),
            r#"{ "apiBaseUrl": "http://localhost:8080/v1beta/", "rewriteModel": " ",
                 "requestTimeoutSecs": 9000, "defaultTone": 7 }"#,
        )
        .expect("write config");

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.api_base_url, "http://localhost:8080/v1beta");
        assert_eq!(loaded.rewrite_model, DEFAULT_REWRITE_MODEL);
        assert_eq!(loaded.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(loaded.tone(), Tone::NEUTRAL);
    }

    #[test]
    fn invalid_settings_are_rejected_on_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::default()));

        let bad_timeout = AppSettings {
            request_timeout_secs: 1,
            ..AppSettings::default()
        };
        assert!(matches!(store.save(bad_timeout), Err(ConfigError::Invalid(_))));

        let bad_url = AppSettings {
            api_base_url: "ftp://example.com".to_string(),
            ..AppSettings::default()
        };
        assert!(matches!(store.save(bad_url), Err(ConfigError::Invalid(_))));

        let bad_tone = AppSettings {
            default_tone: -3,
            ..AppSettings::default()
        };
        assert!(matches!(store.save(bad_tone), Err(ConfigError::Invalid(_))));
        assert!(!store.path().exists());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path(), Arc::new(MemorySecrets::default()));
        fs::write(store.path(), "{ not json").expect("write config");

        assert!(matches!(store.load(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn gemini_config_mirrors_settings() {
        let settings = AppSettings {
            api_key: "k".to_string(),
            request_timeout_secs: 30,
            ..AppSettings::default()
        };
        let config = GeminiConfig::from(&settings);
        assert_eq!(config.api_key, "k");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.rewrite_model, DEFAULT_REWRITE_MODEL);
    }
}
