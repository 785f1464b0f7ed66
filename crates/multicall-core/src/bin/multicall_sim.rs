//! Runs the two-call scenario against the in-memory simulator and prints the
//! session context after each step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use multicall_core::logging::{parse_log_level, setup_logging, LoggingConfig};
use multicall_core::sim::{RecordingPublisher, SimCall, SimDevice, SimTaskBoard, SimTransport};
use multicall_core::{CoordinatorDeps, CoordinatorHandle, MultiCallConfig, MultiCallCoordinator, UnholdTarget};

#[derive(Parser, Debug)]
#[command(name = "multicall-sim", version, about = "Simulate two concurrent calls on two softphone devices")]
struct Args {
    /// JSON service configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force the multi-call feature on
    #[arg(long)]
    enable: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "multicall-sim");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let mut config = match &args.config {
        Some(path) => MultiCallConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MultiCallConfig::new(),
    };
    if args.enable {
        config.enabled = true;
    }

    let transport = SimTransport::new("sim-token");
    let primary = SimDevice::standalone();
    let board = SimTaskBoard::new();
    let publisher = RecordingPublisher::new();

    let handle = MultiCallCoordinator::start(
        config,
        CoordinatorDeps {
            transport: Arc::new(transport.clone()),
            primary_device: Arc::new(primary.clone()),
            tasks: Arc::new(board.clone()),
            conference: Arc::new(board.clone()),
            publisher: Arc::new(publisher.clone()),
        },
    )?;

    let first = SimCall::generated();
    board.add_task(voice_task("WT-first", &first));
    primary.ring(&first);
    // the coordinator subscribes to the call while handling the ring
    handle.snapshot().await?;
    first.emit_accept();
    report(&handle, "first call on primary line").await?;

    let second_device = transport
        .last_device()
        .context("secondary device was not provisioned")?;
    let second = SimCall::generated();
    board.add_task(voice_task("WT-second", &second));
    second_device.ring(&second);
    report(&handle, "second call accepted on secondary line").await?;

    board.resume_participants("WT-first");
    handle.unhold(UnholdTarget::TaskSid("WT-first".to_string())).await?;
    report(&handle, "first call resumed").await?;

    second.disconnect();
    board.remove_task("WT-second");
    report(&handle, "second call ended").await?;

    first.disconnect();
    board.remove_task("WT-first");
    report(&handle, "first call ended").await?;

    println!("published actions: {}", serde_json::to_string_pretty(&publisher.actions())?);
    println!("hold commands issued: {}", board.hold_requests().len());

    handle.shutdown().await?;
    Ok(())
}

fn voice_task(task_sid: &str, call: &SimCall) -> multicall_core::Task {
    let call_sid = call.id();
    SimTaskBoard::voice_task(task_sid, call_sid.as_str(), &format!("{call_sid}-customer"))
}

async fn report(handle: &CoordinatorHandle, step: &str) -> Result<()> {
    // let spawned registration and device mirroring report back first
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = handle.snapshot().await?;
    println!("== {step}\n{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
