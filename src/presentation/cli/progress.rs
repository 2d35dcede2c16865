//! Progress reporting for CLI

use crate::domain::entities::{ScanProgress, format_bytes};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter using indicatif
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Creates a progress reporter for scanning
    pub fn for_scan() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Scanning for deleted files...");
        Self { bar }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Updates from scan progress
    pub fn update_from_scan(&self, progress: &ScanProgress) {
        if self.bar.length() != Some(progress.total_bytes) {
            self.bar.set_length(progress.total_bytes);
        }
        self.bar.set_position(progress.scanned_bytes);
        self.bar.set_message(format!(
            "Found {} files | {}/s",
            progress.matches_found,
            format_bytes(progress.speed_bps)
        ));
    }

    /// Prints a line above the bar
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    /// Finishes with a message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
