use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use prefetch_core::progress::format_bytes;
use prefetch_core::{ContentKey, LoaderObserver};

/// Resolution of the bar; progress values are in `[0.0, 1.0]`.
const BAR_STEPS: u64 = 1000;

/// Renders a loader run as a single indicatif bar.
///
/// The bar tracks the normalized run progress; the message shows the key
/// currently downloading. Failed keys are printed above the bar.
pub struct TerminalProgressObserver {
    bar: ProgressBar,
}

impl TerminalProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_STEPS);
        let style = ProgressStyle::with_template("[{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        Self { bar }
    }
}

#[async_trait]
impl LoaderObserver for TerminalProgressObserver {
    async fn on_calculating_download_size(&self) {
        self.bar.set_message("calculating download size...");
    }

    async fn on_download_size_calculated(&self, total_bytes: u64) {
        if total_bytes == 0 {
            self.bar.set_message("everything is up to date");
        } else {
            self.bar.println(format!("Downloading {}", format_bytes(total_bytes)));
        }
    }

    async fn on_key_started(&self, key: &ContentKey) {
        self.bar.set_message(key.to_string());
    }

    async fn on_progress_changed(&self, progress: f32) {
        self.bar.set_position((progress as f64 * BAR_STEPS as f64).round() as u64);
        if progress >= 1.0 {
            self.bar.finish_with_message("done");
        }
    }

    async fn on_key_completed(&self, key: &ContentKey, succeeded: bool) {
        if !succeeded {
            self.bar.println(format!("Failed: {}", key));
        }
    }
}
