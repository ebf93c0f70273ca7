//! Terminal styling for the `memodb` binary.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod colors;
pub mod output;

pub use output::*;

static COLORS: AtomicBool = AtomicBool::new(true);

/// Turns colors off when `--no-color` is given or `NO_COLOR` is set.
pub fn init(no_color_flag: bool) {
    let disabled = no_color_flag || std::env::var_os("NO_COLOR").is_some();
    COLORS.store(!disabled, Ordering::Relaxed);
}

pub fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
