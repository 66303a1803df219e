//! Progress indicators for keel CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for a long-running external command
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner that renders nothing, for quiet mode and previews
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}

/// Finish a spinner with a success mark
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    crate::ui::success(msg);
}

/// Finish a spinner with an error mark
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    crate::ui::error(msg);
}

/// Run one external step behind a spinner, reporting the outcome
pub fn step<T, E>(msg: &str, quiet: bool, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let pb = if quiet { hidden() } else { spinner(msg) };
    let result = f();
    match (&result, quiet) {
        (_, true) => pb.finish_and_clear(),
        (Ok(_), false) => finish_success(&pb, msg),
        (Err(_), false) => finish_error(&pb, msg),
    }
    result
}
