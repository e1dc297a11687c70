//! Optional progress reporting for reconciliation passes
//!
//! Observers are purely informational: a pass behaves identically with or
//! without one attached.

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::reconcile::SyncSummary;

/// Receives notifications while a pass runs
///
/// All methods have empty defaults, so implementors only override what they need.
pub trait SyncObserver {
    /// Called once the locators have run, with the number of paths to process
    fn on_start(&mut self, _total: usize) {}

    /// Called after each observed path has been processed
    fn on_file(&mut self, _processed: usize, _path: &Path) {}

    /// Called when the pass completes successfully
    fn on_finish(&mut self, _summary: &SyncSummary) {}
}

/// Terminal progress bar shown only for large passes
pub struct ProgressBarObserver {
    threshold: usize,
    bar: Option<ProgressBar>,
}

impl ProgressBarObserver {
    /// Show a bar when a pass observes more than `threshold` files
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            bar: None,
        }
    }

    /// Whether a bar is currently displayed
    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }
}

impl SyncObserver for ProgressBarObserver {
    fn on_start(&mut self, total: usize) {
        if total <= self.threshold {
            self.bar = None;
            return;
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_bar()
            .template("Updating cache: [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) ETA {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(pb);
    }

    fn on_file(&mut self, processed: usize, _path: &Path) {
        if let Some(pb) = &self.bar {
            pb.set_position(processed as u64);
        }
    }

    fn on_finish(&mut self, summary: &SyncSummary) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(format!("{} files", summary.observed));
        }
    }
}
