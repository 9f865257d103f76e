//! Terminal progress for running flows

use colored::Colorize;
use flowkit::{ExecutionStatus, FlowInfo, FlowListener, StageInfo};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Progress bar over every stage of a flow
///
/// The length grows as stages are queued; finished, failed and skipped
/// stages all advance it.
pub struct ProgressListener {
    pb: ProgressBar,
}

impl ProgressListener {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        match ProgressStyle::default_bar().template(TEMPLATE) {
            Ok(style) => pb.set_style(style.progress_chars("=>-")),
            Err(e) => log::debug!("Progress template rejected: {e}"),
        }
        Self { pb }
    }
}

impl Default for ProgressListener {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowListener for ProgressListener {
    fn on_stage_queued(&self, _stage: &StageInfo) {
        self.pb.inc_length(1);
    }

    fn on_stage_start(&self, stage: &StageInfo) {
        self.pb.set_message(ui::truncate_path(&stage.name, 40));
    }

    fn on_stage_success(&self, _stage: &StageInfo) {
        self.pb.inc(1);
    }

    fn on_stage_error(&self, stage: &StageInfo, detail: &str) {
        self.pb.suspend(|| {
            println!("  {} {} ({})", "✗".red(), stage.name, detail);
        });
        self.pb.inc(1);
    }

    fn on_stage_rollback(&self, stage: &StageInfo, status: ExecutionStatus, _detail: &str) {
        self.pb.suspend(|| {
            println!("  {} {} {}", "↺".yellow(), stage.name, ui::status(status));
        });
    }

    fn on_stage_skipped(&self, _stage: &StageInfo, _reason: &str) {
        self.pb.inc(1);
    }

    fn on_flow_finish(&self, flow: &FlowInfo, _status: ExecutionStatus) {
        if flow.is_root() {
            self.pb.finish_and_clear();
        }
    }
}
