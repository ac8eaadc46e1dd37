use std::env;
use std::sync::Arc;

use anyhow::{Context, bail};
use rnetdiag::config::EngineConfig;
use rnetdiag::device::{Credentials, Device, InMemoryCredentials};
use rnetdiag::engine::Engine;

/// Runs the built-in workflows against one device and prints the results as JSON.
///
/// Usage: `cargo run --example health_check -- <host> [vendor] [workflow...]`
/// with `RNETDIAG_USER`, `RNETDIAG_PASSWORD` and optionally
/// `RNETDIAG_ENABLE` and `RNETDIAG_CONFIG` set.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(host) = args.next() else {
        bail!("usage: health_check <host> [vendor] [workflow...]");
    };
    let vendor = args.next().unwrap_or_else(|| "Cisco".to_string());
    let requested = args.collect::<Vec<_>>();

    let username = env::var("RNETDIAG_USER").context("RNETDIAG_USER is not set")?;
    let password = env::var("RNETDIAG_PASSWORD").context("RNETDIAG_PASSWORD is not set")?;
    let mut credentials = Credentials::new(username, password);
    if let Ok(enable) = env::var("RNETDIAG_ENABLE") {
        credentials = credentials.with_enable(enable);
    }

    let config = match env::var("RNETDIAG_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            EngineConfig::from_json_str(&json)?
        }
        Err(_) => EngineConfig::default(),
    };

    let store = InMemoryCredentials::new().with("cli", credentials);
    let engine = Engine::ssh(config, Arc::new(store))?;

    let mut device = Device::new(host.as_str())
        .with_vendor(vendor)
        .with_credential("cli");
    if !engine.connect(&mut device).await {
        bail!("could not connect to {host} (status {:?})", device.status());
    }

    let workflows = if requested.is_empty() {
        engine.available_workflows()
    } else {
        requested
    };
    let results = engine.run_multiple_workflows(&device, &workflows).await;
    engine.disconnect(&mut device).await;

    for result in &results {
        eprintln!(
            "{:<18} {:<9} {}",
            result.workflow_name,
            result.overall_severity(),
            result.summary
        );
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
