const SERVICE_NAME: &str = "com.scholarflow.app";
const API_KEY_ACCOUNT: &str = "gemini_api_key";

/// Where the Gemini API key lives when it is not in the settings file.
pub trait SecretStore: Send + Sync {
    fn read_api_key(&self) -> Result<Option<String>, String>;
    /// An empty key clears the stored credential.
    fn write_api_key(&self, api_key: &str) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry() -> Result<keyring::Entry, String> {
        keyring::Entry::new(SERVICE_NAME, API_KEY_ACCOUNT)
            .map_err(|err| format!("failed to open secure storage entry: {err}"))
    }
}

impl SecretStore for KeyringStore {
    fn read_api_key(&self) -> Result<Option<String>, String> {
        match Self::entry()?.get_password() {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(format!("failed to read API key from secure storage: {err}")),
        }
    }

    fn write_api_key(&self, api_key: &str) -> Result<(), String> {
        let entry = Self::entry()?;
        let trimmed = api_key.trim();

        if trimmed.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(err) => Err(format!("failed to clear API key in secure storage: {err}")),
            };
        }

        entry
            .set_password(trimmed)
            .map_err(|err| format!("failed to save API key in secure storage: {err}"))
    }
}
