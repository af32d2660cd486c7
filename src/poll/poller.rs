use crate::config::UplinkConfig;
use crate::poll::error::{PollError, PollResult};
use crate::poll::source::StatusSource;
use crate::poll::types::TaskStatus;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::session::UploadPhase;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Watches a device task until it reports `done` or `error`.
///
/// Each observed status is pushed to the reporter as a `Finalizing` event,
/// since device-side processing follows the upload. Failed polls are
/// retried with exponential backoff; `max_consecutive_errors` failures in
/// a row end the run.
#[derive(Clone)]
pub struct StatusPoller {
    interval: Duration,
    max_backoff: Duration,
    max_consecutive_errors: u32,
    reporter: Option<ProgressReporter>,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl StatusPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_backoff: Duration::from_secs(30),
            max_consecutive_errors: 5,
            reporter: None,
        }
    }

    pub fn from_config(config: &UplinkConfig) -> Self {
        Self::new(config.poll_interval()).with_max_consecutive_errors(config.poll_max_errors)
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until the task finishes. Returns `Ok` only on `done`.
    pub async fn run(
        &self,
        source: &dyn StatusSource,
        cancel: &CancellationToken,
    ) -> PollResult<()> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.interval,
            max_interval: self.max_backoff.max(self.interval),
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        let mut consecutive_errors = 0u32;

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                fetched = source.fetch_status() => fetched,
            };

            let delay = match fetched {
                Ok(status) => {
                    consecutive_errors = 0;
                    backoff.reset();
                    tracing::debug!(%status, "device task status");
                    self.report(&status);
                    match status {
                        TaskStatus::Done => {
                            tracing::info!("Device task finished");
                            return Ok(());
                        }
                        TaskStatus::Error(msg) => {
                            tracing::error!("Device task failed: {}", msg);
                            return Err(PollError::TaskFailed(msg));
                        }
                        TaskStatus::Init | TaskStatus::Progress(_) => self.interval,
                    }
                }
                Err(PollError::Schema(msg)) => return Err(PollError::Schema(msg)),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.max_consecutive_errors {
                        return Err(PollError::TooManyErrors {
                            attempts: consecutive_errors,
                            last: e.to_string(),
                        });
                    }
                    let delay = backoff.next_backoff().unwrap_or(self.max_backoff);
                    tracing::warn!(
                        attempt = consecutive_errors,
                        max = self.max_consecutive_errors,
                        "Status poll failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn report(&self, status: &TaskStatus) {
        let Some(reporter) = &self.reporter else {
            return;
        };
        let phase = match status {
            TaskStatus::Done => UploadPhase::Succeeded,
            TaskStatus::Error(_) => UploadPhase::Failed,
            TaskStatus::Init | TaskStatus::Progress(_) => UploadPhase::Finalizing,
        };
        reporter.update(ProgressEvent::new(
            phase,
            status.percent(),
            format!("device task {status}"),
        ));
    }
}
