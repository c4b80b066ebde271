//! Lifecycle of an add/remove-to-Liked batch operation.
//!
//! The controller is owned by a single event loop. Background tasks (the HTTP
//! call, the progress ticker, the completion display timer) never touch state;
//! they post [`BatchEvent`]s tagged with the generation of the operation that
//! spawned them, and the owner feeds those events back through
//! [`BatchController::handle_event`].
//!
//! Cancellation is advisory. `cancel` disengages the UI immediately, but the
//! request already on the wire is allowed to finish; its result is dropped when
//! it arrives because the generation no longer matches a running operation.

use crate::core::api::{ApiError, CollectionsApi};
use crate::core::config::BatchSettings;
use crate::core::models::{BatchKind, CompanyId};
use crate::core::view::CollectionView;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Generation number of a started operation
pub type OperationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running {
        kind: BatchKind,
        count: usize,
        started_at: Instant,
    },
    Cancelled,
    Completed {
        kind: BatchKind,
        count: usize,
    },
}

impl BatchState {
    pub fn is_running(&self) -> bool {
        matches!(self, BatchState::Running { .. })
    }

    pub fn label(&self) -> String {
        match self {
            BatchState::Idle => "Idle".to_string(),
            BatchState::Running { kind, count, .. } => {
                format!("{} ({count} companies) in progress", kind.display_name())
            }
            BatchState::Cancelled => "Cancelled".to_string(),
            BatchState::Completed { kind, count } => {
                format!("{} completed for {count} companies", kind.display_name())
            }
        }
    }
}

/// One sample of the simulated progress of an add operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub elapsed: Duration,
    pub percent: u8,
    pub eta: Duration,
}

/// Progress of `count` items at `per_item` each after `elapsed`.
///
/// The percentage is rounded to the nearest integer and capped at 100; the
/// ETA saturates at zero. Both are monotonic in `elapsed`.
pub fn estimate_progress(count: usize, per_item: Duration, elapsed: Duration) -> Progress {
    let total = per_item.saturating_mul(u32::try_from(count).unwrap_or(u32::MAX));
    if total.is_zero() {
        return Progress {
            elapsed,
            percent: 100,
            eta: Duration::ZERO,
        };
    }

    let ratio = elapsed.as_secs_f64() / total.as_secs_f64();
    let percent = (ratio * 100.0).round().min(100.0) as u8;

    Progress {
        elapsed,
        percent,
        eta: total.saturating_sub(elapsed),
    }
}

/// Rejections raised synchronously at the call boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("no companies selected")]
    EmptySelection,
    #[error("a batch operation ({kind} of {count} companies) is already running")]
    AlreadyRunning { kind: BatchKind, count: usize },
    #[error("no batch operation is running")]
    NotRunning,
}

/// Messages posted by the controller's background tasks
#[derive(Debug)]
pub enum BatchEvent {
    Tick(OperationId),
    Finished(OperationId, Result<(), ApiError>),
    ResetToIdle(OperationId),
}

/// What handling an event amounted to
#[derive(Debug)]
pub enum BatchOutcome {
    Progressed(Progress),
    Completed { kind: BatchKind, count: usize },
    Failed(ApiError),
    /// A result arrived for an operation that was cancelled or superseded
    StaleDiscarded,
    ReturnedToIdle,
    Ignored,
}

pub type BatchEventSender = mpsc::UnboundedSender<BatchEvent>;
pub type BatchEventReceiver = mpsc::UnboundedReceiver<BatchEvent>;

pub fn create_batch_channel() -> (BatchEventSender, BatchEventReceiver) {
    mpsc::unbounded_channel()
}

pub struct BatchController {
    api: Arc<dyn CollectionsApi>,
    settings: BatchSettings,
    events: BatchEventSender,
    state: BatchState,
    generation: OperationId,
    per_item: Duration,
    progress: Option<Progress>,
    ticker: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl BatchController {
    pub fn new(
        api: Arc<dyn CollectionsApi>,
        settings: BatchSettings,
        events: BatchEventSender,
    ) -> Self {
        let per_item = settings.estimated_per_item();
        Self {
            api,
            settings,
            events,
            state: BatchState::Idle,
            generation: 0,
            per_item,
            progress: None,
            ticker: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Latest progress sample; only add operations produce one
    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_operation(&self) -> OperationId {
        self.generation
    }

    /// Start with the configured per-item estimate
    pub fn start(
        &mut self,
        kind: BatchKind,
        ids: &[CompanyId],
    ) -> Result<OperationId, BatchError> {
        let per_item = self.settings.estimated_per_item();
        self.start_with_estimate(kind, ids, per_item)
    }

    pub fn start_with_estimate(
        &mut self,
        kind: BatchKind,
        ids: &[CompanyId],
        per_item: Duration,
    ) -> Result<OperationId, BatchError> {
        if let BatchState::Running { kind, count, .. } = &self.state {
            warn!("Rejected overlapping batch start while {kind} of {count} is running");
            return Err(BatchError::AlreadyRunning {
                kind: *kind,
                count: *count,
            });
        }
        if ids.is_empty() {
            return Err(BatchError::EmptySelection);
        }

        // Cancelled and Completed both count as idle from here on
        self.stop_ticker();
        self.generation += 1;
        let op = self.generation;
        let count = ids.len();
        let started_at = Instant::now();

        self.state = BatchState::Running {
            kind,
            count,
            started_at,
        };
        self.per_item = per_item;
        self.last_error = None;
        self.progress = kind
            .tracks_progress()
            .then(|| estimate_progress(count, per_item, Duration::ZERO));

        info!("Starting batch {kind} of {count} companies (operation {op})");

        if kind.tracks_progress() {
            self.ticker = Some(self.spawn_ticker(op, started_at));
        }
        self.spawn_request(op, kind, ids.to_vec());

        Ok(op)
    }

    pub fn cancel(&mut self) -> Result<(), BatchError> {
        if !self.state.is_running() {
            return Err(BatchError::NotRunning);
        }
        info!(
            "Cancelled batch operation {}; any late result will be discarded",
            self.generation
        );
        self.stop_ticker();
        self.state = BatchState::Cancelled;
        self.progress = None;
        Ok(())
    }

    /// Apply one event from the controller's channel.
    ///
    /// `view` is only touched when a live operation succeeds.
    pub fn handle_event(&mut self, event: BatchEvent, view: &mut CollectionView) -> BatchOutcome {
        match event {
            BatchEvent::Tick(op) => self.on_tick(op),
            BatchEvent::Finished(op, result) => self.on_finished(op, result, view),
            BatchEvent::ResetToIdle(op) => self.on_reset(op),
        }
    }

    /// Progress as of `now`, without waiting for the next tick
    pub fn progress_at(&self, now: Instant) -> Option<Progress> {
        match &self.state {
            BatchState::Running {
                kind,
                count,
                started_at,
            } if kind.tracks_progress() => Some(estimate_progress(
                *count,
                self.per_item,
                now.saturating_duration_since(*started_at),
            )),
            _ => None,
        }
    }

    fn on_tick(&mut self, op: OperationId) -> BatchOutcome {
        if op != self.generation {
            return BatchOutcome::Ignored;
        }
        match self.progress_at(Instant::now()) {
            Some(sample) => {
                // Never let a late sample move the bar backwards
                let sample = match self.progress {
                    Some(prev) if prev.percent > sample.percent => prev,
                    _ => sample,
                };
                self.progress = Some(sample);
                BatchOutcome::Progressed(sample)
            }
            None => BatchOutcome::Ignored,
        }
    }

    fn on_finished(
        &mut self,
        op: OperationId,
        result: Result<(), ApiError>,
        view: &mut CollectionView,
    ) -> BatchOutcome {
        let (kind, count, started_at) = match &self.state {
            BatchState::Running {
                kind,
                count,
                started_at,
            } if op == self.generation => (*kind, *count, *started_at),
            _ => {
                debug!("Discarding stale result of batch operation {op}");
                return BatchOutcome::StaleDiscarded;
            }
        };

        self.stop_ticker();

        match result {
            Ok(()) => {
                info!(
                    "Batch {kind} of {count} companies completed in {:?}",
                    started_at.elapsed()
                );
                self.state = BatchState::Completed { kind, count };
                if let Some(progress) = self.progress.as_mut() {
                    progress.elapsed = started_at.elapsed();
                    progress.percent = 100;
                    progress.eta = Duration::ZERO;
                }
                view.clear_selection();
                view.bump_refresh_epoch();
                self.spawn_reset(op);
                BatchOutcome::Completed { kind, count }
            }
            Err(e) => {
                warn!("Batch {kind} of {count} companies failed: {e}");
                self.state = BatchState::Idle;
                self.progress = None;
                self.last_error = Some(format!("{} failed: {e}", kind.display_name()));
                BatchOutcome::Failed(e)
            }
        }
    }

    fn on_reset(&mut self, op: OperationId) -> BatchOutcome {
        if op == self.generation && matches!(self.state, BatchState::Completed { .. }) {
            self.state = BatchState::Idle;
            self.progress = None;
            BatchOutcome::ReturnedToIdle
        } else {
            BatchOutcome::Ignored
        }
    }

    fn spawn_request(&self, op: OperationId, kind: BatchKind, ids: Vec<CompanyId>) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match kind {
                BatchKind::Add => api.add_to_liked(&ids).await,
                BatchKind::Remove => api.remove_from_liked(&ids).await,
            };
            // The receiver is gone only when the owner shut down
            let _ = events.send(BatchEvent::Finished(op, result));
        });
    }

    fn spawn_ticker(&self, op: OperationId, started_at: Instant) -> JoinHandle<()> {
        let events = self.events.clone();
        let period = self.settings.tick_interval();
        tokio::spawn(async move {
            let mut interval = time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if events.send(BatchEvent::Tick(op)).is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_reset(&self, op: OperationId) {
        let events = self.events.clone();
        let delay = self.settings.completed_display();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(BatchEvent::ResetToIdle(op));
        });
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for BatchController {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{MockCollectionsApi, sample_collection};

    fn settings() -> BatchSettings {
        BatchSettings::default()
    }

    fn controller(api: Arc<MockCollectionsApi>) -> (BatchController, BatchEventReceiver) {
        let (tx, rx) = create_batch_channel();
        (BatchController::new(api, settings(), tx), rx)
    }

    /// Feed events until one is not a tick
    async fn next_non_tick(
        controller: &mut BatchController,
        rx: &mut BatchEventReceiver,
        view: &mut CollectionView,
    ) -> BatchOutcome {
        loop {
            let event = rx.recv().await.expect("channel closed");
            match controller.handle_event(event, view) {
                BatchOutcome::Progressed(_) | BatchOutcome::Ignored => continue,
                outcome => return outcome,
            }
        }
    }

    #[test]
    fn test_estimate_progress_scenario() {
        let per_item = Duration::from_millis(100);

        let half = estimate_progress(3, per_item, Duration::from_millis(150));
        assert_eq!(half.percent, 50);
        assert_eq!(half.eta, Duration::from_millis(150));

        let done = estimate_progress(3, per_item, Duration::from_millis(300));
        assert_eq!(done.percent, 100);
        assert_eq!(done.eta, Duration::ZERO);

        let over = estimate_progress(3, per_item, Duration::from_millis(900));
        assert_eq!(over.percent, 100);
        assert_eq!(over.eta, Duration::ZERO);
    }

    #[test]
    fn test_estimate_progress_is_monotonic() {
        let per_item = Duration::from_millis(100);
        for count in [1usize, 2, 7, 25, 1000] {
            let total_ms = count as u64 * 100;
            let mut last_percent = 0;
            let mut last_eta = Duration::MAX;
            for ms in (0..=total_ms + 200).step_by(7) {
                let p = estimate_progress(count, per_item, Duration::from_millis(ms));
                assert!(p.percent >= last_percent);
                assert!(p.eta <= last_eta);
                last_percent = p.percent;
                last_eta = p.eta;
            }
            let at_total = estimate_progress(count, per_item, Duration::from_millis(total_ms));
            assert_eq!(at_total.percent, 100);
        }
    }

    #[test]
    fn test_zero_estimate_reports_complete() {
        let p = estimate_progress(5, Duration::ZERO, Duration::from_millis(1));
        assert_eq!(p.percent, 100);
        assert_eq!(p.eta, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_empty_selection() {
        let api = Arc::new(MockCollectionsApi::new());
        let (mut controller, _rx) = controller(api);

        assert_eq!(
            controller.start(BatchKind::Add, &[]),
            Err(BatchError::EmptySelection)
        );
        assert_eq!(controller.state(), &BatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_secs(5)));
        let (mut controller, _rx) = controller(api.clone());

        let op = controller.start(BatchKind::Add, &[1, 2, 3]).unwrap();
        let before = controller.state().clone();

        let err = controller.start(BatchKind::Remove, &[9]).unwrap_err();
        assert_eq!(
            err,
            BatchError::AlreadyRunning {
                kind: BatchKind::Add,
                count: 3
            }
        );
        assert_eq!(controller.state(), &before);
        assert_eq!(controller.current_operation(), op);

        // Still rejected a second time
        assert!(controller.start(BatchKind::Add, &[4]).is_err());
        assert_eq!(controller.state(), &before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_late_success() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_millis(500)));
        let (mut controller, mut rx) = controller(api.clone());
        let mut view = CollectionView::new(25);
        view.set_active_collection("companies");
        view.select(1);
        view.select(2);
        let epoch = view.refresh_epoch();

        controller.start(BatchKind::Add, &view.selected_ids()).unwrap();
        controller.cancel().unwrap();
        assert_eq!(controller.state(), &BatchState::Cancelled);
        assert!(!controller.is_running());

        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(outcome, BatchOutcome::StaleDiscarded));
        assert_eq!(controller.state(), &BatchState::Cancelled);
        assert_eq!(view.selected_ids(), vec![1, 2]);
        assert_eq!(view.refresh_epoch(), epoch);
        // The request itself still went out
        assert_eq!(api.liked_calls(), vec![(BatchKind::Add, vec![1, 2])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_is_eligible_for_a_new_start() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_millis(500)));
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);
        view.select(7);

        let first = controller.start(BatchKind::Add, &[7]).unwrap();
        controller.cancel().unwrap();
        let second = controller.start(BatchKind::Add, &[7]).unwrap();
        assert_ne!(first, second);

        // Both requests land at the same instant; only the second one counts
        let mut stale = 0;
        let mut completed = 0;
        for _ in 0..2 {
            match next_non_tick(&mut controller, &mut rx, &mut view).await {
                BatchOutcome::StaleDiscarded => stale += 1,
                BatchOutcome::Completed {
                    kind: BatchKind::Add,
                    count: 1,
                } => completed += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!((stale, completed), (1, 1));
        assert!(view.selection().is_empty());
        assert_eq!(view.refresh_epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_not_running() {
        let api = Arc::new(MockCollectionsApi::new());
        let (mut controller, _rx) = controller(api);
        assert_eq!(controller.cancel(), Err(BatchError::NotRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_scenario_completes_then_returns_to_idle() {
        let api = Arc::new(
            MockCollectionsApi::new()
                .with_collection(sample_collection("liked-1", 150))
                .with_latency(Duration::from_millis(300)),
        );
        let (mut controller, mut rx) = controller(api.clone());
        let mut view = CollectionView::new(25);
        view.set_active_collection("liked-1");
        view.set_page(0, 25);
        view.sync_page(&*api).await.unwrap();

        let shown: Vec<CompanyId> = view.companies().iter().map(|c| c.id).collect();
        for id in &shown {
            view.select(*id);
        }
        let epoch = view.refresh_epoch();

        controller.start(BatchKind::Remove, &shown).unwrap();
        assert!(controller.progress().is_none());

        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(
            outcome,
            BatchOutcome::Completed {
                kind: BatchKind::Remove,
                count: 25
            }
        ));
        assert_eq!(
            controller.state(),
            &BatchState::Completed {
                kind: BatchKind::Remove,
                count: 25
            }
        );
        assert!(view.selection().is_empty());
        assert_eq!(view.refresh_epoch(), epoch + 1);
        let completed_at = Instant::now();

        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(outcome, BatchOutcome::ReturnedToIdle));
        assert_eq!(controller.state(), &BatchState::Idle);
        assert_eq!(completed_at.elapsed(), Duration::from_millis(2000));
        assert_eq!(view.refresh_epoch(), epoch + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_progress_ticks() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_secs(10)));
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);

        let started = Instant::now();
        controller.start(BatchKind::Add, &[1, 2, 3]).unwrap();
        assert_eq!(controller.progress().map(|p| p.percent), Some(0));

        let mut samples = Vec::new();
        while samples.len() < 5 {
            let event = rx.recv().await.unwrap();
            if let BatchOutcome::Progressed(p) = controller.handle_event(event, &mut view) {
                samples.push((started.elapsed(), p));
            }
        }

        let percents: Vec<u8> = samples.iter().map(|(_, p)| p.percent).collect();
        assert_eq!(percents, vec![33, 67, 100, 100, 100]);
        assert_eq!(samples[0].0, Duration::from_millis(100));
        assert_eq!(samples[0].1.eta, Duration::from_millis(200));
        assert_eq!(samples[2].1.eta, Duration::ZERO);

        let mid = controller
            .progress_at(started + Duration::from_millis(150))
            .unwrap();
        assert_eq!(mid.percent, 50);
        assert_eq!(mid.eta, Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_estimate_per_call() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_secs(10)));
        let (mut controller, _rx) = controller(api);

        let started = Instant::now();
        controller
            .start_with_estimate(BatchKind::Add, &[1, 2], Duration::from_millis(500))
            .unwrap();
        let p = controller
            .progress_at(started + Duration::from_millis(500))
            .unwrap();
        assert_eq!(p.percent, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_returns_to_idle_and_keeps_selection() {
        let api = Arc::new(
            MockCollectionsApi::new()
                .with_latency(Duration::from_millis(50))
                .failing_with_status(500),
        );
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);
        view.set_active_collection("companies");
        view.select(5);
        view.select(6);

        controller.start(BatchKind::Add, &view.selected_ids()).unwrap();
        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;

        match outcome {
            BatchOutcome::Failed(ApiError::Server { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected a server failure, got {other:?}"),
        }
        assert_eq!(controller.state(), &BatchState::Idle);
        assert!(controller.progress().is_none());
        assert!(controller.last_error().unwrap().contains("Add to Liked failed"));
        assert_eq!(view.selected_ids(), vec![5, 6]);
        assert_eq!(view.refresh_epoch(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_after_completion() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_millis(250)));
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);

        controller.start(BatchKind::Add, &[1, 2, 3, 4]).unwrap();
        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(outcome, BatchOutcome::Completed { .. }));
        assert_eq!(controller.progress().map(|p| p.percent), Some(100));

        // Only the reset event may follow; no further ticks are produced
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, BatchEvent::ResetToIdle(_)));
        controller.handle_event(event, &mut view);
        assert_eq!(controller.state(), &BatchState::Idle);

        time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    fn drain_ticks(rx: &mut BatchEventReceiver) -> usize {
        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BatchEvent::Tick(_)) {
                ticks += 1;
            }
        }
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_cancel() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_secs(5)));
        let (mut controller, mut rx) = controller(api);

        controller.start(BatchKind::Add, &[1, 2, 3]).unwrap();
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(drain_ticks(&mut rx), 2);

        controller.cancel().unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain_ticks(&mut rx), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_failure() {
        let api = Arc::new(
            MockCollectionsApi::new()
                .with_latency(Duration::from_millis(250))
                .failing_with_status(502),
        );
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);

        controller.start(BatchKind::Add, &[1, 2, 3]).unwrap();
        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(outcome, BatchOutcome::Failed(_)));

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain_ticks(&mut rx), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reset_does_not_end_new_operation() {
        let api = Arc::new(MockCollectionsApi::new().with_latency(Duration::from_millis(10)));
        let (mut controller, mut rx) = controller(api);
        let mut view = CollectionView::new(25);

        let first = controller.start(BatchKind::Remove, &[1]).unwrap();
        let outcome = next_non_tick(&mut controller, &mut rx, &mut view).await;
        assert!(matches!(outcome, BatchOutcome::Completed { .. }));

        // New operation during the completion display delay
        controller.start(BatchKind::Remove, &[2]).unwrap();
        let outcome = controller.handle_event(BatchEvent::ResetToIdle(first), &mut view);
        assert!(matches!(outcome, BatchOutcome::Ignored));
        assert!(controller.is_running());
    }
}
