//! Progress reporting for scans.
//!
//! The CLI draws `indicatif` bars through [`IndicatifReporter`]; library
//! callers pass [`NoopReporter`] or their own implementation.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const COUNTED_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})";
const OPEN_TEMPLATE: &str = "{spinner:.green} {msg} {pos} files";

/// Receives progress of a long-running stage.
pub trait ProgressReporter: Send + Sync {
    /// Begin a stage with an optional total count.
    fn start(&self, task: &str, total: Option<u64>);

    fn advance(&self, amount: u64);

    fn finish(&self);

    /// Print a line without disturbing the bar.
    fn message(&self, msg: &str);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter drawing a single progress bar on stderr.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Reporter that tracks progress without drawing anything.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(None, target),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=> "))
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str, total: Option<u64>) {
        if let Some(total) = total {
            self.bar.set_length(total);
            self.bar.set_style(style(COUNTED_TEMPLATE));
        } else {
            self.bar.unset_length();
            self.bar.set_style(style(OPEN_TEMPLATE));
        }
        self.bar.set_message(task.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}
