//! Line-oriented printers shared by the subcommands.

use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

/// Errors go to stderr so `memodb config show --format json` stays parseable.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".error(), msg);
}

/// Prints an indented `name: value` row, as in the startup banner.
pub fn print_field(name: &str, value: &str) {
    println!("  {} {}", format!("{name}:").muted(), value);
}

pub fn print_section(title: &str) {
    println!("{}", title.header());
}

pub fn print_blank() {
    println!();
}
