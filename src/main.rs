//! Command-line entry point for midi-relay.

use midi_relay::client::Client;
use midi_relay::config::{Action, Config, ServerConfig};
use midi_relay::{Error, Server};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.action {
        Action::Serve { source, server } => run_server(source, server),
        Action::Fetch { addr, output } => {
            let data = Client::connect(addr.as_str(), config.client_timeout)?.fetch()?;
            std::fs::write(&output, &data)?;
            info!(path = %output.display(), bytes = data.len(), "Saved fetched file");
            Ok(())
        }
        Action::Upload { addr, file } => {
            let data = std::fs::read(&file)?;
            Client::connect(addr.as_str(), config.client_timeout)?.upload(&data)?;
            Ok(())
        }
    }
}

fn run_server(
    source: PathBuf,
    server_config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %server_config.listen,
        source = %source.display(),
        upload_path = %server_config.upload_path.display(),
        read_timeout_secs = server_config.read_timeout.as_secs(),
        "Starting midi-relay server"
    );

    let server = match Server::bind(server_config, &source) {
        Ok(server) => server,
        Err(e @ Error::SourceFileMissing { .. }) => {
            error!(path = %source.display(), "MIDI file not found");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let report = server.run()?;
    info!(
        peer = %report.peer,
        completed = report.completed,
        bytes_sent = report.bytes_sent,
        bytes_received = report.bytes_received,
        uploads = report.uploads,
        "Server stopped"
    );
    Ok(())
}
