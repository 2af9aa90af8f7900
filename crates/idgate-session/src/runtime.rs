// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The orchestrator task and its host-facing handle.
//
// One tokio task owns the `OrchestrationState`. Everything that can change it
// (the analysis worker, the extractor, timers, the host) sends an event over
// a single unbounded channel, and the task applies them strictly one at a
// time through `transition`, then carries out the returned effects.

use std::sync::Arc;
use std::thread;

use idgate_bridge::{ResultSink, TextExtractor};
use idgate_core::config::SessionPolicy;
use idgate_core::error::{IdGateError, Result};
use idgate_core::{ExtractionOutcome, Frame, PixelRect, SessionOutcome};
use idgate_vision::FrameAnalyzer;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::state::{Effect, Event, OrchestrationState, Transition, transition};
use crate::timers::TimerSet;
use crate::worker::{WorkerChannels, spawn_worker};

/// Messages drained by the orchestrator task.
#[derive(Debug)]
pub(crate) enum Command {
    Event(Event),
    Shutdown,
}

/// Collaborators and policy the orchestrator runs with.
pub struct Orchestrator {
    policy: SessionPolicy,
    extractor: Arc<dyn TextExtractor>,
    sink: Arc<dyn ResultSink>,
}

impl Orchestrator {
    pub fn new(
        policy: SessionPolicy,
        extractor: Arc<dyn TextExtractor>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            policy,
            extractor,
            sink,
        }
    }

    /// Start the orchestrator task on the current tokio runtime.
    ///
    /// Frame analysis starts once an analyzer is attached with
    /// [`OrchestratorHandle::start_worker`].
    pub fn spawn(self) -> OrchestratorHandle {
        let initial = OrchestrationState::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (enabled_tx, enabled_rx) = watch::channel(initial.analysis_enabled);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (frames_tx, frames_rx) = watch::channel(None);
        let (roi_tx, roi_rx) = watch::channel(None);

        info!(session = %initial.session, "Orchestrator starting");

        let task = OrchestratorTask {
            state: initial,
            policy: self.policy,
            extractor: self.extractor,
            sink: self.sink.clone(),
            events: events_tx.downgrade(),
            timers: TimerSet::default(),
            state_tx,
            enabled_tx,
            outcome_tx,
        };
        let join = tokio::spawn(task.run(events_rx));

        OrchestratorHandle {
            events: events_tx,
            state: state_rx,
            outcomes: outcome_rx,
            frames: frames_tx,
            roi: roi_tx,
            pending_worker: Some((frames_rx, enabled_rx, roi_rx)),
            sink: self.sink,
            task: Some(join),
            worker: None,
        }
    }
}

struct OrchestratorTask {
    state: OrchestrationState,
    policy: SessionPolicy,
    extractor: Arc<dyn TextExtractor>,
    sink: Arc<dyn ResultSink>,
    // Weak so that dropping every handle closes the channel.
    events: mpsc::WeakUnboundedSender<Command>,
    timers: TimerSet,
    state_tx: watch::Sender<OrchestrationState>,
    enabled_tx: watch::Sender<bool>,
    outcome_tx: watch::Sender<Option<SessionOutcome>>,
}

impl OrchestratorTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            let event = match command {
                Command::Event(event) => event,
                Command::Shutdown => break,
            };
            let Transition { state, effects } = transition(&self.state, event, &self.policy);
            if state.stage != self.state.stage {
                debug!(from = ?self.state.stage, to = ?state.stage, retry_count = state.retry_count, "Stage changed");
            }
            self.state = state;
            for effect in effects {
                self.execute(effect);
            }
            self.state_tx.send_replace(self.state.clone());
        }

        self.timers.cancel_all();
        self.enabled_tx.send_replace(false);
        info!("Orchestrator stopped");
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartExtraction { attempt, document } => {
                let Some(events) = self.events.upgrade() else {
                    return;
                };
                let extractor = Arc::clone(&self.extractor);
                tokio::task::spawn_blocking(move || {
                    let _ = events.send(Command::Event(Event::ExtractionStarted { attempt }));
                    let outcome = match extractor.extract(&document) {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(attempt, error = %err, "Text extractor failed");
                            ExtractionOutcome::failed(err.to_string())
                        }
                    };
                    let _ = events.send(Command::Event(Event::ExtractionCompleted { attempt, outcome }));
                });
            }
            Effect::ArmTimer {
                attempt,
                timer,
                after,
            } => {
                if let Some(events) = self.events.upgrade() {
                    self.timers.arm(attempt, timer, after, events);
                }
            }
            Effect::CancelTimers => self.timers.cancel_all(),
            Effect::Emit(outcome) => {
                self.sink.on_session_outcome(&outcome);
                self.outcome_tx.send_replace(Some(outcome));
            }
            Effect::PublishAnalysisEnabled(enabled) => {
                self.enabled_tx.send_replace(enabled);
            }
        }
    }
}

type WorkerReceivers = (
    watch::Receiver<Option<Arc<Frame>>>,
    watch::Receiver<bool>,
    watch::Receiver<Option<PixelRect>>,
);

/// Host-side control surface of a running orchestrator.
///
/// Dropping the handle without [`shutdown`](Self::shutdown) also stops the
/// orchestrator, once pending timers and extractions have settled.
pub struct OrchestratorHandle {
    events: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<OrchestrationState>,
    outcomes: watch::Receiver<Option<SessionOutcome>>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    roi: watch::Sender<Option<PixelRect>>,
    pending_worker: Option<WorkerReceivers>,
    sink: Arc<dyn ResultSink>,
    task: Option<JoinHandle<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Start the analysis worker thread with `analyzer`. Only one worker can
    /// be attached.
    pub fn start_worker(&mut self, analyzer: FrameAnalyzer) -> Result<()> {
        let (frames, analysis_enabled, roi) = self
            .pending_worker
            .take()
            .ok_or_else(|| IdGateError::Worker("analysis worker already started".into()))?;
        let channels = WorkerChannels {
            frames,
            analysis_enabled,
            roi,
            events: self.events.clone(),
        };
        self.worker = Some(spawn_worker(
            Handle::current(),
            analyzer,
            channels,
            Arc::clone(&self.sink),
        )?);
        Ok(())
    }

    /// Offer a frame for analysis, replacing any frame not yet picked up.
    pub fn submit_frame(&self, frame: Frame) -> Result<()> {
        if self.worker.is_some() && self.frames.is_closed() {
            return Err(IdGateError::SessionClosed);
        }
        self.frames.send_replace(Some(Arc::new(frame)));
        Ok(())
    }

    pub fn enable(&self) -> Result<()> {
        self.post(Event::Enable)
    }

    pub fn disable(&self) -> Result<()> {
        self.post(Event::Disable)
    }

    /// Abandon the current session and start a fresh one.
    pub fn reset_to_initial_state(&self) -> Result<()> {
        self.post(Event::Reset)
    }

    /// Restrict detection to `roi` from the next analysed frame on.
    pub fn update_region_of_interest(&self, roi: Option<PixelRect>) {
        self.roi.send_replace(roi);
    }

    /// Current state snapshot.
    pub fn state(&self) -> OrchestrationState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<OrchestrationState> {
        self.state.clone()
    }

    /// Watch final session outcomes; holds the most recent one.
    pub fn outcomes(&self) -> watch::Receiver<Option<SessionOutcome>> {
        self.outcomes.clone()
    }

    pub(crate) fn post(&self, event: Event) -> Result<()> {
        self.events
            .send(Command::Event(event))
            .map_err(|_| IdGateError::SessionClosed)
    }

    /// Stop the orchestrator and the worker, waiting for both to finish.
    #[instrument(skip_all)]
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.events.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|err| IdGateError::Worker(format!("orchestrator task failed: {err}")))?;
        }

        // Dropping the frame slot's sender ends the worker loop.
        let Self { frames, worker, .. } = self;
        drop(frames);
        if let Some(worker) = worker {
            tokio::task::spawn_blocking(move || worker.join())
                .await
                .map_err(|err| IdGateError::Worker(err.to_string()))?
                .map_err(|_| IdGateError::Worker("analysis worker panicked".into()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Barrier, Mutex, mpsc as std_mpsc};
    use std::time::Duration;

    use idgate_bridge::FixedTextExtractor;
    use idgate_core::ValidationResult;
    use idgate_core::config::GateConfig;
    use idgate_vision::{ContentVerifier, OrbExtractor, ReferenceTemplate};
    use image::imageops::replace;
    use image::{DynamicImage, GrayImage, Luma};

    use crate::state::Stage;

    #[derive(Default)]
    struct RecordingSink {
        results: Mutex<Vec<ValidationResult>>,
        outcomes: Mutex<Vec<SessionOutcome>>,
    }

    impl ResultSink for RecordingSink {
        fn on_validation_result(&self, result: &ValidationResult) {
            self.results.lock().unwrap().push(*result);
        }

        fn on_session_outcome(&self, outcome: &SessionOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn spawn(extractor: impl TextExtractor + 'static, policy: SessionPolicy) -> (OrchestratorHandle, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let handle = Orchestrator::new(policy, Arc::new(extractor), sink.clone()).spawn();
        (handle, sink)
    }

    fn detected() -> Event {
        Event::FrameValidated {
            document: Arc::new(GrayImage::new(8, 8)),
        }
    }

    async fn wait_until(
        handle: &OrchestratorHandle,
        predicate: impl FnMut(&OrchestrationState) -> bool,
    ) -> OrchestrationState {
        let mut rx = handle.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(predicate))
            .await
            .expect("state reached in time")
            .expect("orchestrator alive")
            .clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn successful_extraction_validates() {
        let (handle, sink) = spawn(FixedTextExtractor::accepting(), SessionPolicy::default());
        handle.post(detected()).unwrap();

        let state = wait_until(&handle, |s| s.stage == Stage::Validated).await;
        assert!(!state.analysis_enabled);
        let outcomes = sink.outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], SessionOutcome::Validated { attempts: 1, .. }));
        assert!(handle.outcomes().borrow().is_some());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_reset_the_session() {
        let extractor = FixedTextExtractor::new(ExtractionOutcome::failed("glare"));
        let (handle, sink) = spawn(extractor, SessionPolicy::default());
        let first_session = handle.state().session;

        for retries in 1..=2 {
            handle.post(detected()).unwrap();
            let state = wait_until(&handle, |s| s.stage == Stage::AwaitingRetry && s.retry_count == retries).await;
            assert!(state.analysis_enabled);
        }
        handle.post(detected()).unwrap();
        let state = wait_until(&handle, |s| s.session != first_session).await;
        assert_eq!(state.stage, Stage::Idle);
        assert_eq!(state.retry_count, 0);
        assert!(state.analysis_enabled);

        let outcomes = sink.outcomes.lock().unwrap().clone();
        assert!(matches!(
            &outcomes[..],
            [SessionOutcome::RetriesExhausted { attempts: 3, last_failure, .. }] if last_failure == "glare"
        ));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stub_extractor_counts_as_failure() {
        let (handle, _sink) = spawn(idgate_bridge::StubTextExtractor, SessionPolicy::default());
        handle.post(detected()).unwrap();
        let state = wait_until(&handle, |s| s.stage == Stage::AwaitingRetry).await;
        assert_eq!(state.retry_count, 1);
        handle.shutdown().await.unwrap();
    }

    struct SlowExtractor(Duration);

    impl TextExtractor for SlowExtractor {
        fn extract(&self, _document: &GrayImage) -> Result<ExtractionOutcome> {
            std::thread::sleep(self.0);
            Ok(ExtractionOutcome {
                success: true,
                ..ExtractionOutcome::default()
            })
        }
    }

    #[tokio::test]
    async fn extraction_timeout_moves_to_retry_and_ignores_late_result() {
        let policy = SessionPolicy {
            extraction_timeout_ms: 50,
            identity_timeout_ms: 2_000,
            ..SessionPolicy::default()
        };
        let (handle, sink) = spawn(SlowExtractor(Duration::from_millis(600)), policy);
        handle.post(detected()).unwrap();

        let state = wait_until(&handle, |s| s.stage == Stage::AwaitingRetry).await;
        assert_eq!(state.retry_count, 1);

        // The late success belongs to a timed-out attempt.
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(handle.state().stage, Stage::AwaitingRetry);
        assert!(sink.outcomes.lock().unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn control_surface_round_trip() {
        let (handle, _sink) = spawn(FixedTextExtractor::accepting(), SessionPolicy::default());

        handle.disable().unwrap();
        wait_until(&handle, |s| !s.analysis_enabled).await;
        handle.post(detected()).unwrap();
        handle.enable().unwrap();
        let state = wait_until(&handle, |s| s.analysis_enabled).await;
        // The frame that arrived while disabled was dropped.
        assert_eq!(state.stage, Stage::Idle);

        let before = handle.state().session;
        handle.reset_to_initial_state().unwrap();
        let state = wait_until(&handle, |s| s.session != before).await;
        assert_eq!(state.stage, Stage::Idle);

        handle.update_region_of_interest(Some(PixelRect::new(0, 0, 10, 10)));
        handle.shutdown().await.unwrap();
    }

    fn textured_card(width: u32, height: u32) -> GrayImage {
        let mut seed = 0x2545_f491_u32;
        GrayImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 3 == 0 {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            }
            Luma([((seed >> 24) as u8 / 2).wrapping_add(((x / 8 + y / 8) % 2) as u8 * 120)])
        })
    }

    fn textured_analyzer() -> FrameAnalyzer {
        let config = GateConfig::default();
        let card = textured_card(config.template.width, config.template.height);
        let extractor = OrbExtractor::new(config.features);
        let template =
            ReferenceTemplate::from_dynamic(DynamicImage::ImageLuma8(card), &config.template, &extractor)
                .unwrap();
        FrameAnalyzer::new(&config, ContentVerifier::new(template, extractor, config.matcher))
    }

    #[tokio::test]
    async fn worker_reports_every_analysed_frame() {
        let (mut handle, sink) = spawn(FixedTextExtractor::accepting(), SessionPolicy::default());
        let analyzer = textured_analyzer();
        handle.start_worker(analyzer.clone()).unwrap();
        assert!(matches!(handle.start_worker(analyzer), Err(IdGateError::Worker(_))));

        let blank = Frame::new(
            320,
            240,
            idgate_core::Rotation::Deg0,
            vec![30; 320 * 240],
            Duration::ZERO,
        )
        .unwrap();
        handle.submit_frame(blank).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while sink.results.lock().unwrap().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "worker never reported");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = sink.results.lock().unwrap()[0];
        assert!(!result.is_valid);
        assert_eq!((result.src_width, result.src_height), (320, 240));
        assert_eq!(handle.state().stage, Stage::Idle);

        handle.shutdown().await.unwrap();
    }

    fn blank_frame(width: u32, height: u32) -> Frame {
        let luma = vec![30; (width * height) as usize];
        Frame::new(width, height, idgate_core::Rotation::Deg0, luma, Duration::ZERO).unwrap()
    }

    async fn wait_for_results(sink: &RecordingSink, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        while sink.results.lock().unwrap().len() < count {
            assert!(tokio::time::Instant::now() < deadline, "worker never reported");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn verified_card_drives_session_to_validated_then_stops_analysis() {
        let (mut handle, sink) = spawn(FixedTextExtractor::accepting(), SessionPolicy::default());
        handle.start_worker(textured_analyzer()).unwrap();

        let mut scene = GrayImage::from_pixel(800, 600, Luma([30]));
        replace(&mut scene, &textured_card(640, 404), 80, 98);
        let card_frame = Frame::new(800, 600, idgate_core::Rotation::Deg0, scene.into_raw(), Duration::ZERO).unwrap();
        handle.submit_frame(card_frame.clone()).unwrap();

        let state = wait_until(&handle, |s| s.stage == Stage::Validated).await;
        assert!(!state.analysis_enabled);
        {
            let results = sink.results.lock().unwrap();
            assert_eq!(results.len(), 1);
            assert!(results[0].is_valid);
        }

        for _ in 0..3 {
            handle.submit_frame(card_frame.clone()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.results.lock().unwrap().len(), 1);
        assert_eq!(sink.outcomes.lock().unwrap().len(), 1);

        handle.shutdown().await.unwrap();
    }

    /// Holds the worker inside its first report until the test lets it go.
    struct GatedSink {
        inner: RecordingSink,
        gate: Arc<Barrier>,
        held: AtomicBool,
    }

    impl ResultSink for GatedSink {
        fn on_validation_result(&self, result: &ValidationResult) {
            self.inner.on_validation_result(result);
            if !self.held.swap(true, Ordering::SeqCst) {
                self.gate.wait();
                self.gate.wait();
            }
        }

        fn on_session_outcome(&self, outcome: &SessionOutcome) {
            self.inner.on_session_outcome(outcome);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_worker_analyses_only_the_newest_frame() {
        let gate = Arc::new(Barrier::new(2));
        let sink = Arc::new(GatedSink {
            inner: RecordingSink::default(),
            gate: Arc::clone(&gate),
            held: AtomicBool::new(false),
        });
        let mut handle = Orchestrator::new(
            SessionPolicy::default(),
            Arc::new(FixedTextExtractor::accepting()),
            sink.clone(),
        )
        .spawn();
        handle.start_worker(textured_analyzer()).unwrap();

        handle.submit_frame(blank_frame(320, 240)).unwrap();
        let entered = Arc::clone(&gate);
        tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();

        for width in 321..=325 {
            handle.submit_frame(blank_frame(width, 240)).unwrap();
        }
        let release = Arc::clone(&gate);
        tokio::task::spawn_blocking(move || release.wait()).await.unwrap();

        wait_for_results(&sink.inner, 2).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let widths: Vec<u32> = sink.inner.results.lock().unwrap().iter().map(|r| r.src_width).collect();
        assert_eq!(widths, vec![320, 325]);

        handle.shutdown().await.unwrap();
    }

    /// Blocks inside `extract` until released.
    struct HeldExtractor(Mutex<std_mpsc::Receiver<()>>);

    impl TextExtractor for HeldExtractor {
        fn extract(&self, _document: &GrayImage) -> Result<ExtractionOutcome> {
            let _ = self.0.lock().unwrap().recv();
            Ok(ExtractionOutcome {
                success: true,
                ..ExtractionOutcome::default()
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn identity_timer_bounds_a_running_extraction() {
        let policy = SessionPolicy {
            extraction_timeout_ms: 60_000,
            identity_timeout_ms: 10_000,
            ..SessionPolicy::default()
        };
        let (release, held) = std_mpsc::channel();
        let (handle, sink) = spawn(HeldExtractor(Mutex::new(held)), policy);
        handle.post(detected()).unwrap();
        wait_until(&handle, |s| s.stage == Stage::ExtractionInProgress).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        tokio::time::advance(Duration::from_millis(9_999)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.state().stage, Stage::ExtractionInProgress);

        tokio::time::advance(Duration::from_millis(2)).await;
        let state = wait_until(&handle, |s| s.stage == Stage::AwaitingRetry).await;
        assert_eq!(state.retry_count, 1);

        // The extractor's eventual success belongs to the expired attempt.
        release.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().stage, Stage::AwaitingRetry);
        assert!(sink.outcomes.lock().unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_orchestrator() {
        let (handle, _sink) = spawn(FixedTextExtractor::accepting(), SessionPolicy::default());
        let mut state = handle.subscribe();
        let mut enabled = handle.pending_worker.as_ref().unwrap().1.clone();
        drop(handle);

        let stopped = tokio::time::timeout(Duration::from_secs(1), async {
            while state.changed().await.is_ok() {}
        })
        .await;
        assert!(stopped.is_ok(), "orchestrator kept running");
        // The task publishes analysis off on its way out.
        assert!(!*enabled.borrow_and_update());
    }
}
