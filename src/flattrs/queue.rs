use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::account::Account;
use crate::db::Database;
use crate::settings::SubmissionSettings;

use super::api::{FlattrApi, OutboundFlattr, SubmitOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueState {
    Idle,
    /// Waiting for the debounce window to close.
    Buffering,
    Sending,
    Backoff,
}

/// Handle to the outbound submission worker.
///
/// Items live in `pending_submissions`; the handle only carries the
/// "new item" signal and the worker's current state.
#[derive(Clone)]
pub struct SubmissionQueue {
    signal: Arc<Notify>,
    state: watch::Receiver<QueueState>,
}

impl SubmissionQueue {
    /// A queue without a worker. Signals go nowhere and items stay pending.
    pub fn detached() -> Self {
        let (_, state) = watch::channel(QueueState::Idle);
        Self {
            signal: Arc::new(Notify::new()),
            state,
        }
    }

    pub fn spawn(
        db: Database,
        api: Arc<dyn FlattrApi>,
        account: Account,
        settings: SubmissionSettings,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let signal = Arc::new(Notify::new());
        let (state_tx, state) = watch::channel(QueueState::Idle);

        let worker = QueueWorker {
            db,
            api,
            account,
            settings,
            signal: signal.clone(),
            state: state_tx,
            shutdown,
            failures: 0,
        };
        let handle = tokio::spawn(worker.run());

        (Self { signal, state }, handle)
    }

    /// Tells the worker that a new item was persisted.
    pub fn notify(&self) {
        self.signal.notify_one();
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<QueueState> {
        self.state.clone()
    }
}

struct QueueWorker {
    db: Database,
    api: Arc<dyn FlattrApi>,
    account: Account,
    settings: SubmissionSettings,
    signal: Arc<Notify>,
    state: watch::Sender<QueueState>,
    shutdown: CancellationToken,
    /// Consecutive retryable failures of the current batch.
    failures: u32,
}

impl QueueWorker {
    async fn run(mut self) {
        let mut state = match self.db.count_pending_submissions().await {
            Ok(0) => QueueState::Idle,
            Ok(pending) => {
                log_info!("Resending {} submissions left from a previous run", pending);
                QueueState::Sending
            }
            Err(err) => {
                log_error!("Failed to inspect pending submissions: {err:#}");
                QueueState::Idle
            }
        };

        loop {
            self.state.send_replace(state);
            log_debug!("submission queue -> {:?}", state);

            state = match state {
                QueueState::Idle => tokio::select! {
                    _ = self.signal.notified() => QueueState::Buffering,
                    _ = self.shutdown.cancelled() => break,
                },
                // A new item restarts the debounce window.
                QueueState::Buffering => tokio::select! {
                    _ = tokio::time::sleep(self.settings.debounce()) => QueueState::Sending,
                    _ = self.signal.notified() => QueueState::Buffering,
                    _ = self.shutdown.cancelled() => break,
                },
                QueueState::Sending => self.send_batch().await,
                QueueState::Backoff => {
                    let delay = self.backoff_delay();
                    log_info!("Retrying submissions in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => QueueState::Sending,
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            };
        }

        log_info!("submission queue shutting down");
    }

    async fn send_batch(&mut self) -> QueueState {
        if !self.account.is_active() {
            log_info!("Account inactive; submissions stay pending");
            return QueueState::Idle;
        }

        let batch = match self.db.pending_submissions(BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(err) => {
                log_error!("Failed to load pending submissions: {err:#}");
                return self.retry_later();
            }
        };
        if batch.is_empty() {
            self.failures = 0;
            return QueueState::Idle;
        }

        let ids: Vec<i64> = batch.iter().map(|item| item.id).collect();
        let outbound: Vec<OutboundFlattr> = batch
            .into_iter()
            .map(|item| OutboundFlattr { url: item.url })
            .collect();

        match self.api.submit(&outbound).await {
            SubmitOutcome::Success => {
                log_info!("Submitted {} flattrs", outbound.len());
                self.failures = 0;
                self.remove(ids).await
            }
            SubmitOutcome::Rejected => {
                log_warn!("Remote rejected {} flattrs; dropping them", outbound.len());
                self.failures = 0;
                self.remove(ids).await
            }
            SubmitOutcome::AuthFailure => {
                self.failures = 0;
                if let Err(err) = self.account.mark_unauthenticated() {
                    log_error!("Failed to store account state: {err:#}");
                }
                QueueState::Idle
            }
            SubmitOutcome::PaymentRequired => {
                self.failures = 0;
                if let Err(err) = self.account.mark_subscription_inactive() {
                    log_error!("Failed to store account state: {err:#}");
                }
                QueueState::Idle
            }
            SubmitOutcome::Retryable => {
                if let Err(err) = self.db.bump_submission_attempts(ids).await {
                    log_error!("Failed to count submission attempt: {err:#}");
                }
                self.retry_later()
            }
        }
    }

    async fn remove(&self, ids: Vec<i64>) -> QueueState {
        match self.db.remove_submissions(ids).await {
            // Drain whatever else is pending before going idle.
            Ok(()) => QueueState::Sending,
            Err(err) => {
                log_error!("Failed to remove sent submissions: {err:#}");
                QueueState::Idle
            }
        }
    }

    fn retry_later(&mut self) -> QueueState {
        self.failures += 1;
        if self.failures >= self.settings.max_attempts {
            log_warn!(
                "Giving up after {} attempts; items stay pending until the next flattr",
                self.failures
            );
            self.failures = 0;
            return QueueState::Idle;
        }
        QueueState::Backoff
    }

    /// Exponential backoff with up to 10% jitter.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.failures.saturating_sub(1).min(16);
        let base = self.settings.base_backoff().saturating_mul(1u32 << exponent);
        let jitter_ms = (base.as_millis() / 10) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }
}
