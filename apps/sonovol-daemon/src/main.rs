//! Sonovol - headless speaker controller.
//!
//! `sonovol watch` runs the callback listener and keeps topology, volume and
//! now-playing state current, printing every event as a JSON line. The other
//! subcommands resolve the topology once, perform one action and exit.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sonovol_core::{
    bootstrap_engine, BroadcastEvent, CommandError, CoreError, CoreResult, Engine,
    LoggingEventEmitter, TopologyEvent,
};
use tokio::signal;
use tokio_stream::StreamExt;

use crate::config::DaemonConfig;

/// Sonovol - local-network speaker control.
#[derive(Parser, Debug)]
#[command(name = "sonovol")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "SONOVOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SONOVOL_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Device to act on, by id or room name (overrides config file).
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// Callback listener port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Advertise IP address (overrides config file).
    #[arg(short = 'a', long)]
    advertise_ip: Option<std::net::IpAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Keep state current through event subscriptions until interrupted.
    Watch,
    /// List visible devices and their groups.
    Devices,
    /// Show what the selected device's group is playing.
    Status,
    /// Raise the selected speaker's volume by one step.
    Up,
    /// Lower the selected speaker's volume by one step.
    Down,
    /// Set the selected speaker's volume.
    Volume { level: u8 },
    /// Set the volume of the selected device's whole group.
    GroupVolume { level: u8 },
    /// Toggle mute on the selected speaker.
    Mute,
    Play,
    Pause,
    Next,
    Prev,
    /// Add a device to another device's group.
    Join { joining: String, into: String },
    /// Take a device out of its group.
    Leave { device: String },
    /// Group two devices, keeping whichever is playing the stronger source.
    GroupAuto { a: String, b: String },
}

impl Command {
    fn needs_selection(&self) -> bool {
        !matches!(
            self,
            Self::Watch
                | Self::Devices
                | Self::Join { .. }
                | Self::Leave { .. }
                | Self::GroupAuto { .. }
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("{} ({})", core.user_message(), core),
                None => eprintln!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    log::info!("Sonovol v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.callback_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(device) = args.device {
        config.device = Some(device);
    }

    let engine = bootstrap_engine(config.to_core_config()).map_err(|e| {
        if matches!(e, CoreError::Network(_)) {
            log::error!(
                "Failed to auto-detect local IP address. Please specify --advertise-ip \
                 or set SONOVOL_ADVERTISE_IP to an address the speakers can reach."
            );
        }
        e
    })?;

    let result = match args.command {
        Command::Watch => watch(&engine, config.device.as_deref()).await,
        command => one_shot(&engine, &command, config.device.as_deref()).await,
    };

    engine.shutdown().await;
    Ok(result?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch mode
// ─────────────────────────────────────────────────────────────────────────────

async fn watch(engine: &Engine, device: Option<&str>) -> CoreResult<()> {
    engine
        .event_bridge()
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    let mut events = engine.events();
    let port = engine.start().await?;
    log::info!("Watching (callback listener on port {})", port);

    let mut pending_selection = device.map(str::to_string);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutdown signal received, cleaning up...");
                return Ok(());
            }
            event = events.next() => {
                let Some(event) = event else { return Ok(()) };
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("Event stream lagged: {}", e);
                        continue;
                    }
                };
                print_event(&event);

                if let BroadcastEvent::Topology(TopologyEvent::Updated { .. }) = &event {
                    if let Some(name) = pending_selection.take() {
                        if let Err(e) = engine.router().select_device(&name).await {
                            log::warn!("Could not select {}: {}", name, e);
                            pending_selection = Some(name);
                        }
                    }
                }
            }
        }
    }
}

fn print_event(event: &BroadcastEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("Could not serialize event: {}", e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// One-shot commands
// ─────────────────────────────────────────────────────────────────────────────

async fn one_shot(engine: &Engine, command: &Command, device: Option<&str>) -> CoreResult<()> {
    if matches!(command, Command::Devices) {
        let discovered = engine.discover().await?;
        log::debug!("Discovery answered from {} device(s)", discovered.len());
    }

    let snapshot = engine.refresh_once().await?;
    let router = engine.router();

    if command.needs_selection() {
        let name = device.ok_or(CommandError::NoDeviceSelected)?;
        router.select_device(name).await?;
    }

    match command {
        Command::Watch => {}
        Command::Devices => {
            for device in snapshot.visible_devices() {
                let role = if device.is_coordinator() {
                    "coordinator".to_string()
                } else {
                    let coordinator = snapshot
                        .device(&device.coordinator_id)
                        .map_or(device.coordinator_id.as_str(), |c| c.name.as_str());
                    format!("member of {coordinator}")
                };
                println!("{:<20} {:<16} {:<28} {}", device.name, device.ip, device.id, role);
            }
        }
        Command::Status => {
            let now_playing = router.refresh_now_playing().await?;
            let state = now_playing
                .transport_state
                .map_or_else(|| "Unknown".to_string(), |s| s.to_string());
            let title = now_playing.track.title.as_deref().unwrap_or("-");
            let artist = now_playing.track.artist.as_deref().unwrap_or("-");
            println!(
                "{} [{}] {} / {}",
                state,
                now_playing.source.label(),
                title,
                artist
            );
        }
        Command::Up => println!("{}", router.volume_up().await?),
        Command::Down => println!("{}", router.volume_down().await?),
        Command::Volume { level } => println!("{}", router.set_volume(*level).await?),
        Command::GroupVolume { level } => println!("{}", router.set_group_volume(*level).await?),
        Command::Mute => {
            let muted = router.toggle_mute().await?;
            println!("{}", if muted { "muted" } else { "unmuted" });
        }
        Command::Play => router.play().await?,
        Command::Pause => router.pause().await?,
        Command::Next => router.next().await?,
        Command::Prev => router.previous().await?,
        Command::Join { joining, into } => router.create_group(joining, into).await?,
        Command::Leave { device } => router.leave_group(device).await?,
        Command::GroupAuto { a, b } => {
            let coordinator = router.create_group_auto(a, b).await?;
            println!("grouped under {}", coordinator.name);
        }
    }

    // Debounced volume writes must reach the device before we exit.
    router.settle().await;
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
