//! Detection loop controller: fixed-interval polling of a live frame source

use crate::error::{ErrorKind, ErrorState};
use crate::frame::FrameSource;
use crate::models::ModelGateway;
use crate::processing::filter_detections;
use crate::store::DetectionStore;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use vigil_core::DetectionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
}

/// What one polling step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or the run this tick belonged to has ended
    Idle,
    /// Too soon after the last completed inference, or one is still in flight
    Skipped,
    /// Published this many detections
    Applied(usize),
    /// Finished after the loop was stopped; result dropped
    Discarded,
    /// Frame grab or inference failed; the loop keeps running
    Failed,
}

struct RunState {
    state: LoopState,
    run_id: u64,
    ticket: u64,
    source: Option<Arc<dyn FrameSource>>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

struct LoopShared {
    gateway: Arc<ModelGateway>,
    store: Arc<DetectionStore>,
    settings: Arc<RwLock<DetectionSettings>>,
    errors: Arc<ErrorState>,
    interval: Duration,
    run: Mutex<RunState>,
    last_completed: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
}

/// Holds the in-flight flag for the duration of one inference.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls a live source at a fixed interval while running.
///
/// Ticks that land within one interval of the last completed inference are
/// dropped, never queued, so at most one inference is outstanding. Each
/// successful tick replaces the stored detection set wholesale.
pub struct DetectionLoop {
    shared: Arc<LoopShared>,
}

impl DetectionLoop {
    pub fn new(
        gateway: Arc<ModelGateway>,
        store: Arc<DetectionStore>,
        settings: Arc<RwLock<DetectionSettings>>,
        errors: Arc<ErrorState>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                gateway,
                store,
                settings,
                errors,
                interval,
                run: Mutex::new(RunState {
                    state: LoopState::Idle,
                    run_id: 0,
                    ticket: 0,
                    source: None,
                    shutdown: None,
                    handle: None,
                }),
                last_completed: Mutex::new(None),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> LoopState {
        self.shared.run.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// When the last applied inference finished, on tokio's clock.
    pub fn last_completed(&self) -> Option<Instant> {
        *self.shared.last_completed.lock()
    }

    /// Start polling `source` on an internal timer.
    ///
    /// Returns false (and changes nothing) if already running, the model is
    /// not ready, or the source has no frame to offer.
    pub fn start(&self, source: Arc<dyn FrameSource>) -> bool {
        let Some((run_id, shutdown)) = self.begin_run(source) else {
            return false;
        };

        let shared = self.shared.clone();
        let handle = tokio::spawn(shared.run_timer(run_id, shutdown));

        let mut run = self.shared.run.lock();
        if run.run_id == run_id && run.state == LoopState::Running {
            // A previous run's task, if any, exits on its own once its
            // in-flight call returns.
            run.handle = Some(handle);
        } else {
            handle.abort();
        }
        drop(run);

        info!(
            "Detection loop started ({} ms interval)",
            self.shared.interval.as_millis()
        );
        true
    }

    /// Start without the internal timer; the host drives [`tick`](Self::tick).
    pub fn start_driven(&self, source: Arc<dyn FrameSource>) -> bool {
        if self.begin_run(source).is_none() {
            return false;
        }
        info!("Detection loop started (host driven)");
        true
    }

    fn begin_run(&self, source: Arc<dyn FrameSource>) -> Option<(u64, watch::Receiver<bool>)> {
        if !self.shared.gateway.is_ready() {
            debug!("Not starting detection loop: model not ready");
            return None;
        }
        if source.dimensions().map_or(true, |d| d.is_empty()) {
            debug!("Not starting detection loop: no live frame source");
            return None;
        }

        let mut run = self.shared.run.lock();
        if run.state == LoopState::Running {
            debug!("Detection loop already running");
            return None;
        }

        let (tx, rx) = watch::channel(false);
        run.state = LoopState::Running;
        run.run_id += 1;
        run.ticket = self.shared.store.epoch();
        run.source = Some(source);
        run.shutdown = Some(tx);
        *self.shared.last_completed.lock() = None;
        Some((run.run_id, rx))
    }

    /// Stop polling and clear the detection set.
    ///
    /// An inference already in flight is allowed to finish; its result is
    /// discarded. Returns false if the loop was already idle, in which case
    /// nothing is touched.
    pub fn stop(&self) -> bool {
        {
            let mut run = self.shared.run.lock();
            if run.state == LoopState::Idle {
                return false;
            }
            run.state = LoopState::Idle;
            run.source = None;
            // Dropping the sender wakes and ends the timer task
            run.shutdown = None;
        }

        self.shared.store.invalidate();
        *self.shared.last_completed.lock() = None;
        info!("Detection loop stopped");
        true
    }

    /// Run one polling step for the current run.
    pub async fn tick(&self) -> TickOutcome {
        self.shared.tick(None).await
    }
}

impl LoopShared {
    async fn run_timer(self: Arc<Self>, run_id: u64, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            if self.tick(Some(run_id)).await == TickOutcome::Idle {
                break;
            }
        }

        debug!("Detection timer for run {} exited", run_id);
    }

    async fn tick(&self, expected_run: Option<u64>) -> TickOutcome {
        let (ticket, source) = {
            let run = self.run.lock();
            if run.state != LoopState::Running || expected_run.map_or(false, |id| id != run.run_id)
            {
                return TickOutcome::Idle;
            }
            match &run.source {
                Some(source) => (run.ticket, source.clone()),
                None => return TickOutcome::Idle,
            }
        };

        let last = *self.last_completed.lock();
        if let Some(last) = last {
            if Instant::now().saturating_duration_since(last) < self.interval {
                trace!("Skipping tick inside throttle window");
                return TickOutcome::Skipped;
            }
        }

        let Some(_in_flight) = InFlight::try_acquire(&self.in_flight) else {
            trace!("Skipping tick, inference in flight");
            return TickOutcome::Skipped;
        };

        let frame = match source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame capture error: {}", e);
                self.errors.report(ErrorKind::Inference, &e);
                return TickOutcome::Failed;
            }
        };

        let settings = *self.settings.read();
        match self.gateway.infer(&frame, &settings).await {
            Ok(raw) => {
                let detections = filter_detections(raw, &settings);
                let count = detections.len();
                if self.store.publish(ticket, detections) {
                    *self.last_completed.lock() = Some(Instant::now());
                    self.errors.clear_kind(ErrorKind::Inference);
                    trace!("Applied {} detections", count);
                    TickOutcome::Applied(count)
                } else {
                    debug!("Inference finished after stop, result discarded");
                    TickOutcome::Discarded
                }
            }
            Err(e) => {
                warn!("Detection error: {}", e);
                self.errors.report(ErrorKind::Inference, &e);
                TickOutcome::Failed
            }
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.shared.run.lock().handle.take() {
            handle.abort();
        }
    }
}
