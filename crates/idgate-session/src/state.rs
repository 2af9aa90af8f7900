// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Validation session state machine.
//
// The whole session is one `OrchestrationState` value. `transition` is a pure
// function from (state, event, policy) to the next state plus the effects the
// runtime must carry out: start an extraction, arm or cancel timers, publish
// whether frames should be analysed, and emit final outcomes.
//
// Every extraction attempt gets a fresh generation number. Extraction results
// and timer expiries carry the generation they belong to; anything from an
// older generation is stale and ignored, so a late timer or a slow extractor
// can never act on a session that has moved on.

use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use idgate_core::config::SessionPolicy;
use idgate_core::{ExtractionOutcome, SessionId, SessionOutcome};
use tracing::{info, trace, warn};

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for a verified document.
    Idle,
    /// A document was verified; extraction is queued.
    CardDetected,
    /// The text extractor is running.
    ExtractionInProgress,
    /// Extraction succeeded. Terminal until reset.
    Validated,
    /// An attempt failed; the next verified frame starts another.
    AwaitingRetry,
}

impl Stage {
    /// Whether a newly verified frame may start an extraction.
    pub fn accepts_detection(self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingRetry)
    }

    /// Whether an extraction attempt is outstanding.
    pub fn is_processing(self) -> bool {
        matches!(self, Self::CardDetected | Self::ExtractionInProgress)
    }
}

/// The two deadlines guarding an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Armed when the extractor starts running.
    Extraction,
    /// Armed when the document is detected; bounds the whole attempt.
    Identity,
}

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationState {
    pub stage: Stage,
    /// Failed attempts in this session.
    pub retry_count: u32,
    /// Whether frames should be analysed at all.
    pub analysis_enabled: bool,
    /// Generation of the current (or last) extraction attempt.
    pub attempt: u64,
    pub session: SessionId,
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            retry_count: 0,
            analysis_enabled: true,
            attempt: 0,
            session: SessionId::new(),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The analysis worker verified a document in a frame.
    FrameValidated { document: Arc<GrayImage> },
    /// The extractor began working on attempt `attempt`.
    ExtractionStarted { attempt: u64 },
    /// The extractor finished attempt `attempt`.
    ExtractionCompleted { attempt: u64, outcome: ExtractionOutcome },
    TimerExpired { attempt: u64, timer: TimerKind },
    /// Host allows frame analysis.
    Enable,
    /// Host suspends frame analysis.
    Disable,
    /// Host abandons the session and starts a new one.
    Reset,
}

/// Work the runtime performs on behalf of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartExtraction { attempt: u64, document: Arc<GrayImage> },
    ArmTimer { attempt: u64, timer: TimerKind, after: Duration },
    CancelTimers,
    Emit(SessionOutcome),
    PublishAnalysisEnabled(bool),
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: OrchestrationState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &OrchestrationState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

/// Apply `event` to `state`.
pub fn transition(state: &OrchestrationState, event: Event, policy: &SessionPolicy) -> Transition {
    match event {
        Event::FrameValidated { document } => {
            if !state.analysis_enabled || !state.stage.accepts_detection() {
                trace!(stage = ?state.stage, "Validated frame ignored");
                return Transition::unchanged(state);
            }
            let attempt = state.attempt + 1;
            info!(
                session = %state.session,
                attempt,
                retry_count = state.retry_count,
                "Document detected; starting extraction"
            );
            Transition {
                state: OrchestrationState {
                    stage: Stage::CardDetected,
                    attempt,
                    ..state.clone()
                },
                effects: vec![
                    Effect::ArmTimer {
                        attempt,
                        timer: TimerKind::Identity,
                        after: Duration::from_millis(policy.identity_timeout_ms),
                    },
                    Effect::StartExtraction { attempt, document },
                ],
            }
        }

        Event::ExtractionStarted { attempt } => {
            if attempt != state.attempt || state.stage != Stage::CardDetected {
                trace!(attempt, current = state.attempt, "Stale extraction start ignored");
                return Transition::unchanged(state);
            }
            Transition {
                state: OrchestrationState {
                    stage: Stage::ExtractionInProgress,
                    ..state.clone()
                },
                effects: vec![Effect::ArmTimer {
                    attempt,
                    timer: TimerKind::Extraction,
                    after: Duration::from_millis(policy.extraction_timeout_ms),
                }],
            }
        }

        Event::ExtractionCompleted { attempt, outcome } => {
            if attempt != state.attempt || !state.stage.is_processing() {
                trace!(attempt, current = state.attempt, "Stale extraction result ignored");
                return Transition::unchanged(state);
            }
            if outcome.success {
                succeed(state, outcome)
            } else {
                let reason = outcome
                    .error_message
                    .unwrap_or_else(|| "text extraction reported failure".into());
                fail(state, reason, policy)
            }
        }

        Event::TimerExpired { attempt, timer } => {
            let live = match timer {
                TimerKind::Identity => state.stage.is_processing(),
                TimerKind::Extraction => state.stage == Stage::ExtractionInProgress,
            };
            if attempt != state.attempt || !live {
                trace!(attempt, ?timer, "Stale timer ignored");
                return Transition::unchanged(state);
            }
            warn!(session = %state.session, attempt, ?timer, "Extraction attempt timed out");
            let reason = match timer {
                TimerKind::Extraction => "text extraction timed out",
                TimerKind::Identity => "identity processing timed out",
            };
            fail(state, reason.into(), policy)
        }

        Event::Enable => {
            if state.stage == Stage::Validated {
                trace!("Analysis stays disabled after validation until reset");
                return Transition::unchanged(state);
            }
            set_analysis(state, true)
        }

        Event::Disable => set_analysis(state, false),

        Event::Reset => {
            info!(session = %state.session, "Session reset");
            Transition {
                state: OrchestrationState {
                    stage: Stage::Idle,
                    retry_count: 0,
                    analysis_enabled: true,
                    attempt: state.attempt + 1,
                    session: SessionId::new(),
                },
                effects: vec![Effect::CancelTimers, Effect::PublishAnalysisEnabled(true)],
            }
        }
    }
}

fn succeed(state: &OrchestrationState, outcome: ExtractionOutcome) -> Transition {
    info!(
        session = %state.session,
        attempt = state.attempt,
        confidence = outcome.confidence,
        "Document validated"
    );
    Transition {
        state: OrchestrationState {
            stage: Stage::Validated,
            retry_count: 0,
            analysis_enabled: false,
            ..state.clone()
        },
        effects: vec![
            Effect::CancelTimers,
            Effect::PublishAnalysisEnabled(false),
            Effect::Emit(SessionOutcome::Validated {
                session: state.session,
                attempts: state.retry_count + 1,
                outcome,
                validated_at: chrono::Utc::now(),
            }),
        ],
    }
}

/// Count a failed attempt. Below the retry limit the session waits for the
/// next verified frame; at the limit it starts over from scratch.
fn fail(state: &OrchestrationState, reason: String, policy: &SessionPolicy) -> Transition {
    let retry_count = state.retry_count + 1;

    if retry_count < policy.max_retries {
        info!(session = %state.session, retry_count, %reason, "Extraction attempt failed; awaiting retry");
        return Transition {
            state: OrchestrationState {
                stage: Stage::AwaitingRetry,
                retry_count,
                ..state.clone()
            },
            effects: vec![Effect::CancelTimers],
        };
    }

    warn!(session = %state.session, retry_count, %reason, "Retries exhausted; resetting session");
    Transition {
        state: OrchestrationState {
            stage: Stage::Idle,
            retry_count: 0,
            analysis_enabled: true,
            attempt: state.attempt + 1,
            session: SessionId::new(),
        },
        effects: vec![
            Effect::CancelTimers,
            Effect::PublishAnalysisEnabled(true),
            Effect::Emit(SessionOutcome::RetriesExhausted {
                session: state.session,
                attempts: retry_count,
                last_failure: reason,
            }),
        ],
    }
}

fn set_analysis(state: &OrchestrationState, enabled: bool) -> Transition {
    if state.analysis_enabled == enabled {
        return Transition::unchanged(state);
    }
    Transition {
        state: OrchestrationState {
            analysis_enabled: enabled,
            ..state.clone()
        },
        effects: vec![Effect::PublishAnalysisEnabled(enabled)],
    }
}
