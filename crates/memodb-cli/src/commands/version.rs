//! Version command implementation.

use crate::style::colors::SemanticStyle;

/// Version information for the CLI.
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    println!("{} {}", "memodb".header(), VERSION);
    println!();
    println!("An in-memory hierarchical key-value store.");
    println!();
    println!("Build info:");
    println!("  Protocol:     line-oriented TCP (GET/SET/DEL)");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
}
