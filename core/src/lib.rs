//! Core of the vehicle fleet registry: configuration, tracing init, shutdown
//! signals and the `platform` module holding the registry protocol.
use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod build_info;
pub use build_info::{build_info, BuildInfo};
pub mod platform;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub service_name: String,
    pub log_level: Option<String>,
    pub http: HttpConfig,
    pub registry: RegistryConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

/// Registry identity, deposit requirements and text limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    pub account_id: String,
    pub init_deposit_millinear: u64,
    pub vehicle_deposit_millinear: u64,
    pub max_name_len: usize,
    pub max_title_len: usize,
    pub max_data_len: usize,
    pub vehicle_code_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub settle_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "fleet-gateway".into(),
            log_level: Some("info".into()),
            http: HttpConfig {
                bind_addr: "127.0.0.1:8080".into(),
            },
            registry: RegistryConfig::default(),
            host: HostConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            account_id: "fleet.testnet".into(),
            init_deposit_millinear: 1_000,
            vehicle_deposit_millinear: 5_000,
            max_name_len: 64,
            max_title_len: 128,
            max_data_len: 2048,
            vehicle_code_path: None,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: 500,
        }
    }
}

static GLOBAL_CONFIG: Lazy<AppConfig> = Lazy::new(|| load_config().unwrap_or_default());

pub fn config() -> &'static AppConfig {
    &GLOBAL_CONFIG
}

fn load_config() -> Result<AppConfig> {
    let c = config::Config::builder()
        .set_default("service_name", "fleet-gateway")?
        .set_default("log_level", "info")?
        .set_default("http.bind_addr", "127.0.0.1:8080")?
        .set_default("registry.account_id", "fleet.testnet")?
        .set_default("registry.init_deposit_millinear", 1_000)?
        .set_default("registry.vehicle_deposit_millinear", 5_000)?
        .set_default("registry.max_name_len", 64)?
        .set_default("registry.max_title_len", 128)?
        .set_default("registry.max_data_len", 2048)?
        .set_default("host.settle_interval_ms", 500)?
        .add_source(config::Environment::with_prefix("FLEET").separator("__"))
        .build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    Ok(cfg)
}

pub fn init_tracing() {
    static START: Lazy<()> = Lazy::new(|| {
        let cfg = config();
        let level = cfg.log_level.clone().unwrap_or_else(|| "info".into());
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        // a subscriber installed elsewhere (tests, embedding binaries) wins
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    });
    Lazy::force(&START);
}

pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}
