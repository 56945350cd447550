//! Audio Relay Application
//!
//! Receives a raw PCM stream over UDP and plays it on a local output device.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    audio::{list_output_devices, CpalBackend},
    config::RelayConfig,
    network::display_local_ipv4,
    status::StatusLog,
    SessionController, SessionState,
};

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Play a raw PCM stream received over UDP on a local output device")]
struct Args {
    /// Config file (defaults to relay.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    
    /// UDP port to listen on, overriding the config file
    #[arg(long)]
    port: Option<u16>,
    
    /// Output device name, overriding the config file
    #[arg(long)]
    device: Option<String>,
    
    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    
    // Load config, then apply command-line overrides
    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if args.device.is_some() {
        config.output_device = args.device;
    }
    
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    
    if args.list_devices {
        println!("\n=== Available Output Devices ===");
        for device in list_output_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        println!();
        return Ok(());
    }
    
    tracing::info!("Starting LAN Audio Relay");
    
    let status = Arc::new(StatusLog::default());
    let backend = Arc::new(CpalBackend::new(config.output_device.clone()));
    let mut session = SessionController::new(backend, config.listen_port, status.clone());
    
    session.start()?;
    
    let port = session
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(config.listen_port);
    tracing::info!("IP Address: {}:{}", display_local_ipv4(), port);
    tracing::info!("Waiting for audio - press Ctrl+C to stop");
    
    let state = session.state_handle();
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    stats_interval.tick().await;
    
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                tracing::info!("Stop requested");
                break;
            }
            _ = stats_interval.tick() => {
                if state.get() != SessionState::Running {
                    tracing::warn!("Session ended: {}", status.last().unwrap_or_default());
                    break;
                }
                
                let stats = session.stats();
                tracing::info!(
                    "Relay stats: {} datagrams, {:.1} KB, {} empty",
                    stats.datagrams,
                    stats.bytes as f64 / 1024.0,
                    stats.empty_datagrams
                );
            }
        }
    }
    
    // Joins the pump worker; bounded by one receive poll or device write
    tokio::task::block_in_place(|| session.stop());
    
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    
    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }
    
    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "relay",
            "--port",
            "5000",
            "--device",
            "Speakers",
            "--config",
            "/tmp/relay.toml",
        ])
        .unwrap();
        assert_eq!(args.port, Some(5000));
        assert_eq!(args.device.as_deref(), Some("Speakers"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/relay.toml")));
        assert!(!args.list_devices);
        
        let args = Args::try_parse_from(["relay", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert_eq!(args.port, None);
    }
    
    #[test]
    fn test_help_and_bad_input() {
        let err = Args::try_parse_from(["relay", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        
        assert!(Args::try_parse_from(["relay", "--port", "70000"]).is_err());
        assert!(Args::try_parse_from(["relay", "--bogus"]).is_err());
    }
}
