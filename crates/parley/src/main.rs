//! # parley
//!
//! Broadcast chat binary. `parley serve` runs the server; `parley chat` runs
//! the terminal client.

#![deny(unsafe_code)]

mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_logging::LoggingConfig;
use parley_server::{ChatService, ParleyServer, ServerConfig};
use parley_settings::ParleySettings;

/// Parley broadcast chat.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley broadcast chat server and client")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,

        /// Maximum concurrent connections.
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Join a chat server from the terminal.
    Chat {
        /// Display name. Prompted for when omitted.
        #[arg(long)]
        name: Option<String>,

        /// Server WebSocket URL.
        #[arg(long)]
        url: Option<String>,
    },
}

impl Command {
    /// Logging config for this mode. The chat screen only shows warnings so
    /// log lines don't bury messages.
    fn logging(&self, settings: &ParleySettings) -> LoggingConfig {
        let mut config = LoggingConfig::from(&settings.logging);
        if matches!(self, Self::Chat { .. }) {
            config.level = "warn".into();
        }
        config
    }
}

fn server_config(
    settings: &ParleySettings,
    host: Option<String>,
    port: Option<u16>,
    max_connections: Option<usize>,
) -> ServerConfig {
    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(max) = max_connections {
        config.max_connections = max;
    }
    config
}

async fn serve(config: ServerConfig) -> Result<()> {
    let metrics = parley_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = ParleyServer::new(config, Arc::new(ChatService::new()), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!("Parley listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown().drain(vec![handle], None).await {
        tracing::info!("Shutdown complete");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = match &args.settings {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => parley_settings::load_settings().context("Failed to load settings")?,
    };

    parley_logging::init_subscriber(&args.command.logging(&settings))
        .context("Failed to initialize logging")?;

    match args.command {
        Command::Serve {
            host,
            port,
            max_connections,
        } => serve(server_config(&settings, host, port, max_connections)).await,
        Command::Chat { name, url } => {
            let mut client = settings.client;
            if let Some(url) = url {
                client.server_url = url;
            }
            terminal::run(client, name).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn serve_flags_override_settings() {
        let cli = Cli::parse_from(["parley", "serve", "--port", "9000", "--max-connections", "4"]);
        let Command::Serve {
            host,
            port,
            max_connections,
        } = cli.command
        else {
            panic!("expected serve");
        };
        let config = server_config(&ParleySettings::default(), host, port, max_connections);
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn serve_without_flags_uses_settings() {
        let config = server_config(&ParleySettings::default(), None, None, None);
        assert_eq!(config.port, 18813);
        assert_eq!(config.max_connections, 256);
    }

    #[test]
    fn chat_flags_parse() {
        let cli = Cli::parse_from(["parley", "chat", "--name", "A", "--url", "ws://host:1/ws"]);
        let Command::Chat { name, url } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(name.as_deref(), Some("A"));
        assert_eq!(url.as_deref(), Some("ws://host:1/ws"));
    }

    #[test]
    fn chat_logging_is_quiet() {
        let cli = Cli::parse_from(["parley", "chat"]);
        assert_eq!(cli.command.logging(&ParleySettings::default()).level, "warn");
        let cli = Cli::parse_from(["parley", "serve"]);
        assert_eq!(cli.command.logging(&ParleySettings::default()).level, "info");
    }

    #[test]
    fn global_settings_flag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server": {{"port": 4242}}}}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let cli = Cli::parse_from(["parley", "serve", "--settings", &path]);
        let settings = parley_settings::loader::load_with(cli.settings.as_deref().unwrap(), |_| None).unwrap();
        assert_eq!(server_config(&settings, None, None, None).port, 4242);
    }
}
