// ABOUTME: Per-table progress bar for the row migration loop
// ABOUTME: Wraps indicatif and stays hidden when progress display is disabled

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct TableProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl TableProgress {
    /// Create a progress bar for `table` expecting `total_rows` rows
    pub fn new(table: &str, total_rows: u64, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total_rows)
        } else {
            ProgressBar::hidden()
        };

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) | {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }

        bar.set_message(format!("Repairing {}", table));

        TableProgress {
            bar,
            start_time: Instant::now(),
        }
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Finish the bar and return the elapsed time
    pub fn finish(self, table: &str) -> Duration {
        self.bar
            .finish_with_message(format!("{} repaired", table));
        self.start_time.elapsed()
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_counts_rows() {
        let progress = TableProgress::new("events", 3, false);
        progress.inc();
        progress.inc();
        assert_eq!(progress.position(), 2);
        assert!(progress.finish("events").as_secs_f64() < 5.0);
    }
}
