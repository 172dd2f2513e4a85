//! Replay a session trace against the in-process backend and print the
//! resulting engine state as JSON.

use session_sync::replay::{load_trace, replay};
use session_sync::{telemetry, SyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::from_env();
    telemetry::init(config.log_json);

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: session-sync-replay <trace.json>");
        std::process::exit(2);
    };

    tracing::info!(path = %path, "Loading trace");
    let trace = load_trace(&path)?;
    let steps = trace.steps.len();

    let report = replay(trace, config).await;
    let failed = report.failed_steps().count();
    tracing::info!(steps, failed, messages = report.messages.len(), "Replay finished");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
