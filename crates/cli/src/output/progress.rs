//! Byte-level progress bar for transfers

use indicatif::{ProgressBar, ProgressStyle};

use super::Formatter;

/// Progress bar fed by the transfer engine's progress callback
///
/// Hidden in JSON and quiet mode.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    pub fn new(formatter: &Formatter, message: String) -> Self {
        let bar = if formatter.shows_progress() {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message);
        Self { bar }
    }

    /// Callback for `TransferEngine::with_progress`
    pub fn callback(&self) -> impl Fn(u64, u64) + Send + Sync + 'static {
        let bar = self.bar.clone();
        move |written, total| {
            bar.set_length(total);
            bar.set_position(written);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
