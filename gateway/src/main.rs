mod auth;
mod cli;
mod http;
mod metrics;
mod state;

#[cfg(test)]
mod tests;

use crate::metrics::MetricsLayer;
use crate::state::AppState;
use clap::Parser;
use fleetcore::platform::PlatformServices;
use fleetcore::{config, init_tracing, shutdown_signal};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli::CliArgs {
        print_config,
        command,
    } = cli::CliArgs::parse();

    if print_config {
        println!("{}", serde_json::to_string_pretty(config())?);
        return Ok(());
    }

    if let Some(cmd) = command {
        match cmd {
            cli::CliCommand::GenToken { sub, public_key } => {
                println!("{}", auth::hs256_generate(&sub, &public_key)?);
                return Ok(());
            }
            cli::CliCommand::Version { json } => {
                let payload = http::version_payload();
                if json {
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                } else {
                    println!(
                        "{} v{} (git: {}, tag: {}, built: {})",
                        payload.service,
                        payload.version,
                        payload.git_sha,
                        payload.git_tag,
                        payload.build_ts
                    );
                }
                return Ok(());
            }
        }
    }

    let cfg = config().clone();
    let platform = PlatformServices::init_global()?;
    let state = AppState::new(platform.clone());

    let settle_every = Duration::from_millis(cfg.host.settle_interval_ms.max(1));
    tokio::spawn(platform.host().run(settle_every));
    match platform.take_dispatcher() {
        Some(dispatcher) => {
            tokio::spawn(dispatcher.run());
        }
        None => tracing::warn!("callback dispatcher already taken, callbacks will not be applied"),
    }
    tracing::info!(
        registry = %platform.registry().account_id(),
        settle_ms = settle_every.as_millis() as u64,
        "simulated host and callback dispatcher started"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    let app = http::router()
        .with_state(state)
        .layer(MetricsLayer)
        .layer(cors);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = cfg.http.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
