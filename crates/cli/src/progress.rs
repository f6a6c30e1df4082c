//! Progress bar and Ctrl-C handling around a blocking rewrite

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use scrub_journal::ProgressTracker;
use scrub_rewrite::CancelToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Redraws a bar from the tracker's counters until stopped
pub struct ProgressReporter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(tracker: Arc<dyn ProgressTracker>, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} commits ({per_sec}, eta {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );

        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        bar.set_length(tracker.total());
                        bar.set_position(tracker.processed());
                    }
                    _ = &mut stopped => break,
                }
            }
            bar.finish_and_clear();
        });

        Self { stop, handle }
    }

    /// Stop polling and clear the bar
    pub async fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

/// Cancel `token` on the first Ctrl-C
///
/// The rewrite stops at the next commit boundary.
pub fn cancel_on_ctrl_c(token: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupt received, stopping after the current commit...".yellow()
            );
            token.cancel();
        }
    })
}
