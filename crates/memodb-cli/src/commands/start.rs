//! Start command - runs the MemoDB server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use memodb_config::MemodbConfig;
use memodb_protocol::ParseLimits;
use memodb_server::{Server, ServerConfig};
use memodb_store::Store;
use tracing::info;

use crate::style::{self, colors::SemanticStyle};

/// Flags that override the loaded configuration.
pub struct StartOptions {
    pub address: Option<String>,
    pub project: PathBuf,
    pub max_connections: Option<usize>,
    pub idle_timeout: Option<u64>,
    pub interactive: bool,
}

pub fn run(options: &StartOptions) -> Result<()> {
    let mut config = MemodbConfig::load_from_dir(&options.project).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            options.project.display()
        )
    })?;
    apply_overrides(&mut config, options)?;
    config.validate().context("Invalid configuration")?;

    let server_config = server_config(&config)?;
    let store = Store::with_limits(server_config.store_limits());

    info!("Starting MemoDB server...");
    let server = Server::with_signal_handling(server_config.clone(), store)
        .context("Failed to create server")?;

    style::print_blank();
    println!("{}", "MemoDB - in-memory hierarchical key-value store".info());
    style::print_blank();
    style::print_field("Listening on", &server.local_addr().to_string());
    style::print_field(
        "Max connections",
        &server_config.max_connections.to_string(),
    );
    style::print_field(
        "Interactive",
        if server_config.interactive { "yes" } else { "no" },
    );
    if let Some(idle) = server_config.idle_timeout {
        style::print_field("Idle timeout", &format!("{}s", idle.as_secs()));
    }
    style::print_blank();
    println!("Server is ready. Press Ctrl+C to stop.");
    style::print_blank();

    let summary = server.run().context("Server error during operation")?;

    style::print_blank();
    style::print_success("Server stopped gracefully.");
    style::print_field(
        "Connections served",
        &summary.connections_accepted.to_string(),
    );
    style::print_field(
        "Connections refused",
        &summary.connections_rejected.to_string(),
    );
    style::print_field(
        "Entries discarded",
        &format!(
            "{} ({} bytes in {} files)",
            summary.store.leaves, summary.store.value_bytes, summary.store.nodes
        ),
    );

    Ok(())
}

fn apply_overrides(config: &mut MemodbConfig, options: &StartOptions) -> Result<()> {
    if let Some(address) = &options.address {
        config.server.bind_address = parse_address(address)?.to_string();
    }
    if let Some(max) = options.max_connections {
        config.server.max_connections = max;
    }
    if let Some(secs) = options.idle_timeout {
        config.server.idle_timeout_secs = secs;
    }
    if options.interactive {
        config.server.interactive = true;
    }
    Ok(())
}

/// Translates the file-level configuration into the server's own.
fn server_config(config: &MemodbConfig) -> Result<ServerConfig> {
    let server = &config.server;
    let limits = &config.limits;

    let idle_timeout =
        (server.idle_timeout_secs > 0).then(|| Duration::from_secs(server.idle_timeout_secs));

    Ok(ServerConfig::new(config.bind_addr()?)
        .with_max_connections(server.max_connections)
        .with_read_buffer_size(server.read_buffer_size)
        .with_write_buffer_size(server.write_buffer_size)
        .with_poll_timeout(Duration::from_millis(server.poll_interval_ms))
        .with_idle_timeout(idle_timeout)
        .with_interactive(server.interactive)
        .with_limits(ParseLimits {
            max_path_len: limits.max_path_len,
            max_key_len: limits.max_key_len,
            max_value_len: limits.max_value_len,
        }))
}

/// Parses an address string into a `SocketAddr`.
///
/// Accepts:
/// - Port only: "12049" -> "127.0.0.1:12049"
/// - Full address: "127.0.0.1:12049"
/// - IPv6: `[::1]:12049`
fn parse_address(address: &str) -> Result<SocketAddr> {
    // Try parsing as a full address first
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // Try parsing as just a port
    if let Ok(port) = address.parse::<u16>() {
        return Ok(SocketAddr::from(([127, 0, 0, 1], port)));
    }

    bail!(
        "Invalid address '{address}'. Use a port (e.g., '12049') or full address (e.g., '127.0.0.1:12049')"
    );
}
