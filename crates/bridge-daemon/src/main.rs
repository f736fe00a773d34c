//! # bridged
//!
//! Session bridge daemon: loads settings, starts the WebSocket and gRPC
//! listeners and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_core::{Bridge, CommandRegistry};
use bridge_server::{BridgeServer, ServerConfig, bridge_config};
use bridge_settings::BridgeSettings;
use clap::Parser;

/// Session bridge daemon.
#[derive(Parser, Debug)]
#[command(name = "bridged", about = "Session bridge for IDE and CLI clients")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// WebSocket/HTTP port (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// gRPC port (overrides settings; 0 for auto-assign).
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Maximum concurrent sessions (overrides settings).
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Settings file (default `~/.bridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Load settings and apply the command-line overrides on top.
    fn resolve_settings(&self) -> Result<BridgeSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(bridge_settings::settings_path);
        let mut settings = bridge_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(rpc_port) = self.rpc_port {
            settings.server.rpc_port = rpc_port;
        }
        if let Some(max) = self.max_sessions {
            settings.sessions.max_sessions = max;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    bridge_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let bridge = Arc::new(Bridge::new(
        &bridge_config(&settings),
        CommandRegistry::with_builtins(),
    ));
    let mut server = BridgeServer::new(ServerConfig::from_settings(&settings), bridge);
    match bridge_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        http = %handle.http_addr,
        rpc = %handle.rpc_addr,
        max_sessions = settings.sessions.max_sessions,
        "session bridge listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server.shutdown(handle).await;
    tracing::info!(
        sessions_closed = report.sessions_closed,
        timed_out = report.timed_out,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("bridged").chain(args.iter().copied()))
    }

    fn missing_settings() -> PathBuf {
        tempfile::tempdir().unwrap().path().join("absent.json")
    }

    #[test]
    fn cli_overrides_default_to_none() {
        let cli = cli(&[]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.rpc_port.is_none());
        assert!(cli.max_sessions.is_none());
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_parses_all_flags() {
        let cli = cli(&[
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--rpc-port",
            "8081",
            "--max-sessions",
            "12",
            "--settings",
            "/tmp/bridge.json",
        ]);
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.rpc_port, Some(8081));
        assert_eq!(cli.max_sessions, Some(12));
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/bridge.json")));
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7000, "rpcPort": 7001}, "sessions": {"maxSessions": 4}}"#,
        )
        .unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let cli = cli(&["--settings", &path_arg, "--port", "7100"]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.server.rpc_port, 7001);
        assert_eq!(settings.sessions.max_sessions, 4);
    }

    #[test]
    fn zero_max_sessions_flag_is_rejected() {
        let path = missing_settings();
        let path_arg = path.to_string_lossy().into_owned();
        let cli = cli(&["--settings", &path_arg, "--max-sessions", "0"]);
        assert!(cli.resolve_settings().is_err());
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let path_arg = path.to_string_lossy().into_owned();
        let err = cli(&["--settings", &path_arg]).resolve_settings().unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }
}
