//! Periodic grounded market feed.
//!
//! A [`FeedPoller`] tracks one subject at a time. Setting a subject fetches
//! once right away and arms a repeating timer. Each subject change bumps a
//! generation number; a fetch result is applied only while its generation is
//! still current, so a slow reply for an old subject can never overwrite the
//! new subject's state.

use crate::{fetch_snapshot, MarketSnapshot, PollFetchError};
use forge_sdk::LanguageModel;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub enum FeedPhase {
    /// No subject is being polled.
    Idle,
    /// The first fetch for the subject is outstanding.
    Loading,
    Ready,
    /// At least one refresh is outstanding. The previous snapshot stays
    /// visible.
    Refreshing,
    /// The first fetch for the subject failed.
    Failed(PollFetchError),
}

/// Observable state of a poller.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub subject: Option<String>,
    pub phase: FeedPhase,
    pub snapshot: Option<MarketSnapshot>,
    /// Incremented on every subject change and on stop.
    pub generation: u64,
    applied_ticket: u64,
    pending_refreshes: u32,
}

impl FeedStatus {
    fn idle(generation: u64) -> Self {
        Self {
            subject: None,
            phase: FeedPhase::Idle,
            snapshot: None,
            generation,
            applied_ticket: 0,
            pending_refreshes: 0,
        }
    }

    fn settled_phase(&self) -> FeedPhase {
        if self.pending_refreshes > 0 {
            FeedPhase::Refreshing
        } else {
            FeedPhase::Ready
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FeedPhase::Loading
    }

    /// The snapshot shown is from before an outstanding refresh.
    pub fn is_stale(&self) -> bool {
        self.phase == FeedPhase::Refreshing
    }

    pub fn error(&self) -> Option<&PollFetchError> {
        match &self.phase {
            FeedPhase::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Refresh,
}

struct PollerShared {
    model: Arc<dyn LanguageModel + Send + Sync>,
    status: watch::Sender<FeedStatus>,
    next_ticket: AtomicU64,
    discarded: AtomicU64,
}

impl PollerShared {
    /// Count a refresh as outstanding, if it belongs to the current
    /// generation and a snapshot is showing. Returns whether it was counted.
    fn mark_refreshing(&self, generation: u64) -> bool {
        let mut counted = false;
        self.status.send_if_modified(|status| {
            if status.generation != generation
                || !matches!(status.phase, FeedPhase::Ready | FeedPhase::Refreshing)
            {
                return false;
            }
            counted = true;
            status.pending_refreshes += 1;
            if status.phase == FeedPhase::Ready {
                status.phase = FeedPhase::Refreshing;
                true
            } else {
                false
            }
        });
        counted
    }

    /// Apply a fetch outcome. Returns `false` when the outcome was discarded.
    ///
    /// `counted` tells whether the fetch was counted by
    /// [`mark_refreshing`](Self::mark_refreshing). The phase stays
    /// `Refreshing` until the last counted refresh settles.
    fn apply(
        &self,
        generation: u64,
        ticket: u64,
        kind: FetchKind,
        counted: bool,
        outcome: Result<MarketSnapshot, PollFetchError>,
    ) -> bool {
        let mut current = true;
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                current = false;
                return false;
            }
            if counted {
                status.pending_refreshes = status.pending_refreshes.saturating_sub(1);
            }
            let settle = |status: &mut FeedStatus| {
                if status.phase == FeedPhase::Refreshing && status.pending_refreshes == 0 {
                    status.phase = FeedPhase::Ready;
                    true
                } else {
                    false
                }
            };
            match outcome {
                Ok(_) if ticket < status.applied_ticket => {
                    current = false;
                    settle(status)
                }
                Ok(snapshot) => {
                    status.applied_ticket = ticket;
                    status.snapshot = Some(snapshot);
                    status.phase = status.settled_phase();
                    true
                }
                Err(error) => match kind {
                    FetchKind::Initial if status.phase == FeedPhase::Loading => {
                        status.phase = FeedPhase::Failed(error);
                        true
                    }
                    FetchKind::Refresh if counted => {
                        warn!(error = %error, "feed refresh failed, keeping previous snapshot");
                        settle(status)
                    }
                    _ => {
                        debug!(error = %error, "feed refresh failed");
                        false
                    }
                },
            }
        });

        if !current {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
        current
    }

    async fn run_fetch(&self, generation: u64, ticket: u64, subject: String, kind: FetchKind) {
        let counted = kind == FetchKind::Refresh && self.mark_refreshing(generation);

        let outcome = fetch_snapshot(self.model.as_ref(), &subject).await;
        if !self.apply(generation, ticket, kind, counted, outcome) {
            debug!(subject, generation, ticket, "discarded superseded fetch result");
        }
    }
}

fn spawn_fetch(
    shared: &Arc<PollerShared>,
    lifetime: &CancellationToken,
    generation: u64,
    subject: String,
    kind: FetchKind,
) {
    let shared = Arc::clone(shared);
    let lifetime = lifetime.clone();
    let ticket = shared.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
    let span = info_span!("feed_fetch", subject = %subject, generation, ?kind);

    tokio::spawn(
        async move {
            tokio::select! {
                () = lifetime.cancelled() => debug!("fetch abandoned on teardown"),
                () = shared.run_fetch(generation, ticket, subject, kind) => {}
            }
        }
        .instrument(span),
    );
}

/// Polls a grounded feed for one subject at a time.
///
/// Must be used inside a Tokio runtime. Dropping the poller stops the timer
/// and abandons outstanding fetches.
pub struct FeedPoller {
    shared: Arc<PollerShared>,
    period: Duration,
    /// Cancels the current subject's timer.
    timer: Option<CancellationToken>,
    /// Cancels the timer and every outstanding fetch. Replaced on stop.
    lifetime: CancellationToken,
}

impl FeedPoller {
    /// A zero `period` falls back to [`DEFAULT_POLL_PERIOD`].
    pub fn new(model: Arc<dyn LanguageModel + Send + Sync>, period: Duration) -> Self {
        let period = if period.is_zero() {
            warn!(
                default_secs = DEFAULT_POLL_PERIOD.as_secs(),
                "poll period must be non-zero, using default"
            );
            DEFAULT_POLL_PERIOD
        } else {
            period
        };
        let (status, _) = watch::channel(FeedStatus::idle(0));
        Self {
            shared: Arc::new(PollerShared {
                model,
                status,
                next_ticket: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
            period,
            timer: None,
            lifetime: CancellationToken::new(),
        }
    }

    pub fn with_default_period(model: Arc<dyn LanguageModel + Send + Sync>) -> Self {
        Self::new(model, DEFAULT_POLL_PERIOD)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn status(&self) -> FeedStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.shared.status.subscribe()
    }

    pub fn subject(&self) -> Option<String> {
        self.shared.status.borrow().subject.clone()
    }

    /// A timer is armed.
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Fetch results dropped as superseded: either their subject was
    /// replaced, or a result from a later fetch of the same subject was
    /// already applied.
    pub fn discarded_results(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// Start polling `subject`, replacing any current subject.
    ///
    /// The subject is trimmed and uppercased. Setting the subject already
    /// being polled does nothing unless its first fetch failed. A blank
    /// subject stops polling.
    pub fn set_subject(&mut self, subject: &str) {
        let subject = subject.trim().to_uppercase();
        if subject.is_empty() {
            self.stop();
            return;
        }
        let status = self.status();
        if self.is_running()
            && status.subject.as_deref() == Some(subject.as_str())
            && status.error().is_none()
        {
            return;
        }

        self.cancel_timer();

        let mut generation = 0;
        self.shared.status.send_modify(|status| {
            generation = status.generation + 1;
            *status = FeedStatus {
                subject: Some(subject.clone()),
                phase: FeedPhase::Loading,
                snapshot: None,
                generation,
                applied_ticket: 0,
                pending_refreshes: 0,
            };
        });
        info!(subject, generation, "polling feed");

        spawn_fetch(
            &self.shared,
            &self.lifetime,
            generation,
            subject.clone(),
            FetchKind::Initial,
        );
        self.arm_timer(generation, subject);
    }

    /// Issue a refresh for the current subject now, outside the timer.
    pub fn refresh_now(&self) {
        let status = self.shared.status.borrow().clone();
        if let (Some(subject), true) = (status.subject, self.is_running()) {
            spawn_fetch(
                &self.shared,
                &self.lifetime,
                status.generation,
                subject,
                FetchKind::Refresh,
            );
        }
    }

    /// Stop polling. The timer is cancelled, outstanding fetches are
    /// abandoned and the status returns to idle.
    pub fn stop(&mut self) {
        self.cancel_timer();
        self.lifetime.cancel();
        self.lifetime = CancellationToken::new();

        self.shared.status.send_modify(|status| {
            let generation = status.generation + 1;
            *status = FeedStatus::idle(generation);
        });
        debug!("feed polling stopped");
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn arm_timer(&mut self, generation: u64, subject: String) {
        let timer = CancellationToken::new();
        let cancelled = timer.clone();
        let lifetime = self.lifetime.clone();
        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let span = info_span!("feed_timer", subject = %subject, generation);

        tokio::spawn(
            async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancelled.cancelled() => break,
                        () = lifetime.cancelled() => break,
                        _ = ticks.tick() => {
                            spawn_fetch(&shared, &lifetime, generation, subject.clone(), FetchKind::Refresh);
                        }
                    }
                }
                debug!("feed timer cancelled");
            }
            .instrument(span),
        );

        self.timer = Some(timer);
    }
}

impl Drop for FeedPoller {
    fn drop(&mut self) {
        self.cancel_timer();
        self.lifetime.cancel();
    }
}
