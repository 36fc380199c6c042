//! Runs a [`CaptureSession`]'s actions on the tokio runtime

use super::policy::{CaptureAction, CapturePolicyConfig, CaptureSession, CaptureState};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::processing::Crop;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 64;

/// Progress notifications for observers such as a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    Triggered { generation: u64, window_ms: u64 },
    CandidatesUpdated { generation: u64, count: usize, best_score: Option<String> },
    WindowExpired { generation: u64 },
    Finalized { generation: u64, crop_id: String, score: String },
    Analysed { generation: u64, text: String, provider: String },
    DispatchFailed { generation: u64, message: String },
    Reset { generation: u64 },
}

struct Inner {
    session: Mutex<CaptureSession>,
    dispatcher: Dispatcher,
    events: broadcast::Sender<CaptureEvent>,
    timer: Mutex<Option<JoinHandle<()>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    /// Latest generation and its recorded outcome.
    outcomes: watch::Sender<(u64, Option<DispatchOutcome>)>,
}

/// Owns the session and the timer and dispatch tasks around it.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Inner>,
}

impl CaptureController {
    pub fn new(config: CapturePolicyConfig, dispatcher: Dispatcher) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(CaptureSession::new(config)),
                dispatcher,
                events,
                timer: Mutex::new(None),
                dispatch: Mutex::new(None),
                outcomes: watch::channel((0, None)).0,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.events.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.inner.session.lock().generation()
    }

    pub fn state(&self) -> CaptureState {
        self.inner.session.lock().state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn winner(&self) -> Option<Crop> {
        self.inner.session.lock().winner().cloned()
    }

    pub fn outcome(&self) -> Option<DispatchOutcome> {
        self.inner.session.lock().outcome().cloned()
    }

    /// Ranked candidates collected so far.
    pub fn candidates(&self) -> Vec<Crop> {
        self.inner
            .session
            .lock()
            .candidates()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Feeds one frame's crops. `generation` is the value of
    /// [`generation`](Self::generation) when the frame was captured.
    pub fn observe(&self, generation: u64, crops: &[Crop]) {
        let (actions, events) = {
            let mut session = self.inner.session.lock();
            let before_state = session.state();
            let before = candidate_summary(&session);
            let actions = session.observe(generation, crops, Instant::now());

            let mut events = Vec::new();
            if before_state == CaptureState::Idle && session.state() != CaptureState::Idle {
                events.push(CaptureEvent::Triggered {
                    generation: session.generation(),
                    window_ms: session.config().window_ms,
                });
            }
            let after = candidate_summary(&session);
            if after != before {
                events.push(CaptureEvent::CandidatesUpdated {
                    generation: session.generation(),
                    count: after.0,
                    best_score: after.1,
                });
            }
            (actions, events)
        };

        self.inner.publish(events);
        self.inner.apply(actions);
    }

    /// Abandons the current attempt: cancels the timer and any analysis
    /// call in flight, clears candidates, and invalidates in-flight batches.
    pub fn reset(&self) -> u64 {
        let generation = {
            // Held across the aborts so a timer cannot finalize in between.
            let mut session = self.inner.session.lock();
            if let Some(timer) = self.inner.timer.lock().take() {
                timer.abort();
            }
            if let Some(dispatch) = self.inner.dispatch.lock().take() {
                dispatch.abort();
            }
            session.reset()
        };
        self.inner.outcomes.send_replace((generation, None));
        self.inner.publish(vec![CaptureEvent::Reset { generation }]);
        generation
    }

    /// Waits until the current session's dispatch completes and returns its
    /// outcome. Returns immediately with `None` if nothing was dispatched,
    /// or if the session is reset while waiting.
    pub async fn wait_for_outcome(&self) -> Option<DispatchOutcome> {
        let generation = {
            let session = self.inner.session.lock();
            if !session.state().is_terminal() {
                return session.outcome().cloned();
            }
            session.generation()
        };

        let mut rx = self.inner.outcomes.subscribe();
        let settled = rx
            .wait_for(|(g, outcome)| *g != generation || outcome.is_some())
            .await
            .ok()
            .map(|value| (*value).clone());
        match settled {
            Some((g, outcome)) if g == generation => outcome,
            _ => None,
        }
    }
}

fn candidate_summary(session: &CaptureSession) -> (usize, Option<String>) {
    (
        session.candidate_count(),
        session.candidates().first().map(|c| c.score.clone()),
    )
}

impl Inner {
    fn publish(&self, events: Vec<CaptureEvent>) {
        for event in events {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn apply(self: &Arc<Self>, actions: Vec<CaptureAction>) {
        for action in actions {
            match action {
                CaptureAction::ArmTimer {
                    generation,
                    deadline,
                } => self.arm_timer(generation, deadline),
                CaptureAction::Dispatch { generation, crop } => self.spawn_dispatch(generation, crop),
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, generation: u64, deadline: Instant) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.on_timer(generation);
        });
        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let (actions, events) = {
            let mut session = self.session.lock();
            let was_armed = session.state() == CaptureState::Armed;
            let actions = session.on_timer(generation, Instant::now());

            let mut events = Vec::new();
            if was_armed && session.state() == CaptureState::Idle {
                events.push(CaptureEvent::WindowExpired { generation });
            }
            (actions, events)
        };
        self.publish(events);
        self.apply(actions);
    }

    fn spawn_dispatch(self: &Arc<Self>, generation: u64, crop: Crop) {
        // Held until the handle is stored so a reset either sees the task
        // or happens before it is started.
        let session = self.session.lock();
        if session.generation() != generation {
            debug!("Skipping dispatch for reset generation {}", generation);
            return;
        }

        self.publish(vec![CaptureEvent::Finalized {
            generation,
            crop_id: crop.id.clone(),
            score: crop.score.clone(),
        }]);

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = inner.dispatcher.dispatch(&crop).await;
            let recorded = inner
                .session
                .lock()
                .complete_dispatch(generation, outcome.clone());
            if !recorded {
                return;
            }
            inner
                .outcomes
                .send_replace((generation, Some(outcome.clone())));
            let event = match outcome {
                DispatchOutcome::Analysed { text, provider } => {
                    info!("Analysis complete via {}", provider);
                    CaptureEvent::Analysed {
                        generation,
                        text,
                        provider,
                    }
                }
                DispatchOutcome::Failed { message } => CaptureEvent::DispatchFailed {
                    generation,
                    message,
                },
            };
            inner.publish(vec![event]);
        });
        if let Some(previous) = self.dispatch.lock().replace(handle) {
            // finished or superseded
            previous.abort();
        }
        drop(session);
    }
}
