use super::RunSummary;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40.cyan/blue}] {human_pos}/{human_len} rows ({per_sec}) {msg}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner} {human_pos} rows ({per_sec}) {msg}";

/// Rows completed vs. total, on stderr. Hidden when disabled; the log lines are kept.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// `total` is the input row count if it could be computed; `initial` the rows already
    /// present in the output when the run started.
    pub fn new(total: Option<usize>, initial: usize, visible: bool) -> Self {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(style(BAR_TEMPLATE));
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(style(SPINNER_TEMPLATE));
                bar
            }
        };
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_position(initial as u64);
        Self { bar }
    }

    pub fn advance(&self, rows: usize, summary: &RunSummary) {
        self.bar.inc(rows as u64);
        self.bar.set_message(format!(
            "classified {} | skipped {} | failed {}",
            summary.classified, summary.skipped, summary.failed
        ));
    }

    pub fn position(&self) -> usize {
        self.bar.position() as usize
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░-")
}
