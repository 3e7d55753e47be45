use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("\u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("\u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Busy indicator for one dispatched action.
///
/// Hidden when stderr is not a terminal or output is machine-readable; the
/// calls are then no-ops.
pub struct ActionSpinner {
    bar: ProgressBar,
}

impl ActionSpinner {
    pub fn start(message: impl Into<String>, visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(spinner_style());
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn succeed(self, message: impl Into<String>) {
        self.bar.set_style(done_style());
        self.bar.finish_with_message(message.into());
    }

    pub fn fail(self, message: impl Into<String>) {
        self.bar.set_style(failed_style());
        self.bar.finish_with_message(message.into());
    }

    /// Remove the spinner line without leaving a result behind.
    pub fn clear(self) {
        self.bar.finish_and_clear();
    }
}
