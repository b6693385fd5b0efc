//! Progress display for acquisition runs
//!
//! One indicatif bar ticks once per finished task and shows the last item's
//! outcome. Without a terminal (or when disabled) finished items are logged
//! instead.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::app::acquirer::ItemReport;
use crate::app::worker::WorkerEvent;

/// Longest item summary shown next to the bar
const MAX_MESSAGE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    pub enabled: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub struct ProgressDisplay {
    bar: Option<ProgressBar>,
    finished: u64,
    total: u64,
}

impl ProgressDisplay {
    /// Create the display for `total` tasks
    pub fn new(config: ProgressConfig, total: usize) -> Self {
        let is_terminal = atty::is(atty::Stream::Stderr);
        let bar = (config.enabled && is_terminal).then(|| {
            let bar = ProgressBar::new(total as u64);
            match ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            {
                Ok(style) => bar.set_style(style.progress_chars("##-")),
                Err(e) => debug!("Progress bar template error: {}", e),
            }
            bar
        });
        Self {
            bar,
            finished: 0,
            total: total as u64,
        }
    }

    pub fn is_visual(&self) -> bool {
        self.bar.is_some()
    }

    pub fn handle(&mut self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Started { worker_id, label } => {
                debug!("Worker {} started {}", worker_id, label);
            }
            WorkerEvent::Finished { report, .. } => self.finish_item(report),
            WorkerEvent::Stopped { worker_id, processed } => {
                debug!("Worker {} stopped after {} tasks", worker_id, processed);
            }
        }
    }

    fn finish_item(&mut self, report: &ItemReport) {
        self.finished += 1;
        let summary = report.summary();
        match &self.bar {
            Some(bar) => {
                bar.inc(1);
                bar.set_message(truncate(&summary, MAX_MESSAGE_WIDTH));
            }
            None => info!("[{}/{}] {}", self.finished, self.total, summary),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

/// Shorten `text` to at most `width` characters, marking the cut
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
