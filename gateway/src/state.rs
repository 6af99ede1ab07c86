use fleetcore::platform::{
    AccountId, CodeBundle, PlatformServices, RegistrySettings, VehicleRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<PlatformServices>,
}

impl AppState {
    pub fn new(platform: Arc<PlatformServices>) -> Self {
        Self { platform }
    }

    /// Fresh registry under `account`, used by tests and local runs.
    pub fn in_memory(account: AccountId) -> Self {
        Self::new(PlatformServices::in_memory(
            RegistrySettings::new(account),
            CodeBundle::minimal(),
        ))
    }

    pub fn registry(&self) -> &VehicleRegistry {
        self.platform.registry()
    }
}
