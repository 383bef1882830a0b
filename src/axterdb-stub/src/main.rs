use actix_web::web;
use anyhow::Result;
use axterdb_core::telemetry;
use axterdb_stub::{StubConfig, StubState};
use std::net::TcpListener;

#[actix_web::main]
async fn main() -> Result<()> {
    let _guard = telemetry::init_activity_log("./logs")?;

    let config = StubConfig::load("stub.json").unwrap_or_else(|_| {
        tracing::warn!("Failed to load stub.json, using defaults");
        StubConfig::default()
    });

    tracing::info!("axterdb-stub starting");
    tracing::info!("  Port: {}", config.port);
    tracing::info!("  Keys: {}", config.keys.len());

    let state = web::Data::new(StubState::from_config(&config));
    let listener = TcpListener::bind(("0.0.0.0", config.port))?;

    tracing::info!("Stub instance listening on {}", listener.local_addr()?);
    axterdb_stub::run(listener, state)?.await?;

    tracing::info!("axterdb-stub stopped");
    Ok(())
}
