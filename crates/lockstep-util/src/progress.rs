//! Status lines and spinners on stderr.
//!
//! Stdout is reserved for command output such as `lockstep tree`, so every
//! progress message goes to stderr with a right-aligned label:
//!
//! ```text
//!       Locked 5 packages
//!     Updating nio4r 2.5.9 -> 2.7.0
//! ```

use std::io::Write;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

const LABEL_WIDTH: usize = 12;

fn emit(style: Style, label: &str, message: &str) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(
        err,
        "{:>width$} {message}",
        style.apply_to(label),
        width = LABEL_WIDTH
    );
}

/// A step that changed something: `Locked`, `Updating`, `Adding`.
pub fn status(label: &str, message: &str) {
    emit(Style::new().green().bold(), label, message);
}

/// A step that left everything as it was.
pub fn status_info(label: &str, message: &str) {
    emit(Style::new().cyan().bold(), label, message);
}

/// Something the user should look at, such as a declaration with no package.
pub fn status_warn(label: &str, message: &str) {
    emit(Style::new().yellow().bold(), label, message);
}

/// Spinner shown while the resolver runs; clear it with
/// [`ProgressBar::finish_and_clear`] before printing results.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    match ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        Ok(style) => bar.set_style(style),
        Err(err) => tracing::trace!("spinner template rejected: {err}"),
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
