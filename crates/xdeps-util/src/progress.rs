use std::io::Write;
use std::time::Duration;

use console::{Style, Term};
use indicatif::{ProgressBar, ProgressStyle};

/// Colour of the right-aligned label of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Bold green: an action is happening (`Resolving`, `Finished`).
    Action,
    /// Bold cyan: informational (`Skipped`, `Wrote`).
    Info,
    /// Bold yellow: something was degraded.
    Warn,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Tone::Action => Style::new().green().bold(),
            Tone::Info => Style::new().cyan().bold(),
            Tone::Warn => Style::new().yellow().bold(),
        }
    }
}

/// Print a Cargo-style status line to stderr: `   Resolving pip:numpy@*`
pub fn status_line(tone: Tone, label: &str, message: &str) {
    let _ = writeln!(
        std::io::stderr(),
        "{:>12} {message}",
        tone.style().apply_to(label),
    );
}

pub fn status(label: &str, message: &str) {
    status_line(Tone::Action, label, message);
}

pub fn status_info(label: &str, message: &str) {
    status_line(Tone::Info, label, message);
}

pub fn status_warn(label: &str, message: &str) {
    status_line(Tone::Warn, label, message);
}

/// Create an animated spinner on stderr for indeterminate progress.
///
/// When stderr is not a terminal the spinner is hidden, so piped output and
/// test harnesses never see control sequences.
pub fn spinner(message: &str) -> ProgressBar {
    if !Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
