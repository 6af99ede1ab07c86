use super::contract::{Settlement, VehicleRegistry};
use super::diagnostics::Diagnostics;
use super::dispatch::CallbackDispatcher;
use super::host::{callback_channel, CodeBundle, SimulatedHost};
use super::models::{Balance, RegistrySettings};
use super::persistence::InMemoryPersistence;
use crate::AppConfig;
use anyhow::Context;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;

static GLOBAL_PLATFORM: OnceCell<Arc<PlatformServices>> = OnceCell::new();

/// The registry wired to an in-memory store and a simulated host.
pub struct PlatformServices {
    host: Arc<SimulatedHost>,
    registry: VehicleRegistry,
    diagnostics: Diagnostics,
    dispatcher: Mutex<Option<CallbackDispatcher>>,
}

impl PlatformServices {
    pub fn in_memory(settings: RegistrySettings, code: CodeBundle) -> Arc<Self> {
        let storage = Arc::new(InMemoryPersistence::new());
        let diagnostics = Diagnostics::new();
        let (tx, rx) = callback_channel();
        let host = Arc::new(
            SimulatedHost::new(tx).with_account(settings.account_id.clone(), Balance::ZERO),
        );
        let registry = VehicleRegistry::new(
            settings,
            storage,
            host.clone(),
            code,
            diagnostics.clone(),
        );
        let dispatcher = CallbackDispatcher::new(rx, registry.clone());
        Arc::new(Self {
            host,
            registry,
            diagnostics,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Arc<Self>> {
        let settings = RegistrySettings::from_config(&cfg.registry)
            .context("invalid registry settings")?;
        let code = match &cfg.registry.vehicle_code_path {
            Some(path) => CodeBundle::from_file(path)
                .with_context(|| format!("reading vehicle code from {path}"))?,
            None => CodeBundle::minimal(),
        };
        tracing::info!(
            registry = %settings.account_id,
            code_hash = code.hash(),
            code_len = code.len(),
            "platform services configured"
        );
        Ok(Self::in_memory(settings, code))
    }

    pub fn init_global() -> anyhow::Result<Arc<Self>> {
        GLOBAL_PLATFORM
            .get_or_try_init(|| Self::from_config(crate::config()))
            .cloned()
    }

    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_PLATFORM.get().cloned()
    }

    pub fn registry(&self) -> &VehicleRegistry {
        &self.registry
    }

    pub fn host(&self) -> Arc<SimulatedHost> {
        self.host.clone()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Hands the dispatcher to a background task. Later calls return `None`
    /// and [`PlatformServices::pump`] stops delivering.
    pub fn take_dispatcher(&self) -> Option<CallbackDispatcher> {
        self.dispatcher.lock().take()
    }

    /// Settles every queued chain and delivers the resulting callbacks in
    /// the current thread.
    pub fn pump(&self) -> Vec<Settlement> {
        self.host.settle_all();
        match self.dispatcher.lock().as_mut() {
            Some(dispatcher) => dispatcher.drain(),
            None => Vec::new(),
        }
    }
}
