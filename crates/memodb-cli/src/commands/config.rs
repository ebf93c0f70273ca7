//! Configuration management commands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use memodb_config::{MemodbConfig, Paths};

use crate::style;

/// Show current configuration.
pub fn show(project: &Path, format: &str) -> Result<()> {
    let config =
        MemodbConfig::load_from_dir(project).context("Failed to load configuration")?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        "toml" => {
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
        }
        "text" => print_text(project, &config),
        other => bail!("Unknown format '{other}'. Use text, toml or json."),
    }

    Ok(())
}

fn print_text(project: &Path, config: &MemodbConfig) {
    style::print_section("MemoDB Configuration");
    println!("====================");
    style::print_blank();

    println!("Sources:");
    if let Ok(user) = Paths::new().user_config_file() {
        print_source(&user);
    }
    print_source(&Paths::project_config_file(project));
    print_source(&Paths::local_config_file(project));
    style::print_blank();

    let server = &config.server;
    println!("Server:");
    style::print_field("Bind address", &server.bind_address);
    style::print_field("Max connections", &server.max_connections.to_string());
    style::print_field("Read buffer", &format!("{} bytes", server.read_buffer_size));
    style::print_field("Write buffer", &format!("{} bytes", server.write_buffer_size));
    style::print_field("Poll interval", &format!("{} ms", server.poll_interval_ms));
    style::print_field(
        "Idle timeout",
        &if server.idle_timeout_secs == 0 {
            "disabled".to_string()
        } else {
            format!("{} s", server.idle_timeout_secs)
        },
    );
    style::print_field("Interactive", &server.interactive.to_string());
    style::print_blank();

    let limits = &config.limits;
    println!("Limits:");
    style::print_field("Max path length", &limits.max_path_len.to_string());
    style::print_field("Max key length", &limits.max_key_len.to_string());
    style::print_field("Max value length", &limits.max_value_len.to_string());
}

fn print_source(path: &Path) {
    let state = if path.exists() { "found" } else { "absent" };
    style::print_field(state, &path.display().to_string());
}
