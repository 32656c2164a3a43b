use std::sync::Arc;

use crate::config::SettingsStore;
use crate::controller::LifecycleController;

#[derive(Clone)]
pub struct AppState {
    controller: LifecycleController,
    settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(controller: LifecycleController, settings: SettingsStore) -> Self {
        Self {
            controller,
            settings: Arc::new(settings),
        }
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}
