//! voicebridge daemon.
//!
//! Loads config and the registry file, runs the reconnect and registry
//! reload schedules, and relays voice between groups until interrupted.
//! Sessions run on the in-process loopback platform; with
//! `--stdin-control` the simulation is driven by JSON commands on stdin.

mod cli;
mod control;
mod reload;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;
use voicebridge_common::BridgeError;
use voicebridge_config::{config_to_json, load_config, BridgeConfig};
use voicebridge_core::platform::LoopbackPlatform;
use voicebridge_core::{BridgeHub, MemoryRegistrationStore, ReconnectTask, Scheduler};

use crate::control::Controller;
use crate::reload::RegistryReloadTask;

fn init_logging(args: &cli::Args, config: &BridgeConfig) {
    let fallback = config.logging.level.directive();
    let directive = args.log_level.clone().unwrap_or_else(|| fallback.clone());
    let directive: Directive = directive.parse().unwrap_or_else(|_| {
        eprintln!("invalid log directive {directive:?}, using {fallback:?}");
        fallback
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();
}

fn load_registry(args: &cli::Args) -> Result<MemoryRegistrationStore, BridgeError> {
    match &args.registry {
        Some(path) => {
            let registrations = MemoryRegistrationStore::read_file(path)?;
            let store = MemoryRegistrationStore::from_registrations(registrations)?;
            Ok(store)
        }
        None => {
            tracing::warn!("No registry file given, starting with an empty registry");
            Ok(MemoryRegistrationStore::new())
        }
    }
}

async fn run(args: cli::Args, config: BridgeConfig) -> Result<(), BridgeError> {
    let store = load_registry(&args)?;
    tracing::info!(registrations = store.len().await, "Registry loaded");

    let platform = LoopbackPlatform::new();
    let hub = BridgeHub::new(platform.clone(), Arc::new(store.clone()), &config);

    // Lifecycle events at debug level.
    let mut events = hub.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(event = %json, "Bridge event"),
                    Err(e) => tracing::warn!(error = %e, "Unencodable bridge event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut scheduler = Scheduler::new();
    scheduler.schedule(
        Arc::new(ReconnectTask::new(hub.clone())),
        config.scheduler.voice_check_interval(),
        config.scheduler.run_on_start,
    );
    if let Some(path) = &args.registry {
        scheduler.schedule(
            Arc::new(RegistryReloadTask::new(path.clone(), store.clone(), hub.clone())),
            config.scheduler.registry_reload_interval(),
            false,
        );
    }
    let schedule = scheduler.start();

    let control_stop = CancellationToken::new();
    let control = if args.stdin_control {
        let controller = Controller::new(hub.clone(), platform);
        let stop = control_stop.clone();
        Some(tokio::spawn(async move {
            controller
                .run(BufReader::new(tokio::io::stdin()), stop)
                .await;
        }))
    } else {
        None
    };

    tracing::info!("voicebridge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    control_stop.cancel();
    if let Some(control) = control {
        control.abort();
    }
    schedule.shutdown().await;
    let released = hub.shutdown().await;
    tracing::info!(released, "voicebridge stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("voicebridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_config {
        println!("{}", config_to_json(&config));
        return ExitCode::SUCCESS;
    }

    init_logging(&args, &config);

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "voicebridge failed");
            ExitCode::FAILURE
        }
    }
}
