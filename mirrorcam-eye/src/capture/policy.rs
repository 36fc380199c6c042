//! Capture policy: when to stop looking and which crop to commit to
//!
//! [`CaptureSession`] is a pure state machine. It never sleeps or performs
//! I/O; it returns [`CaptureAction`]s for the caller to execute.
//!
//! ```text
//! Idle --trigger--> Armed --window expiry--> Finalized --outcome--> Dispatched
//!   ^                 |
//!   +--empty window---+          (any state) --reset--> Idle
//! ```

use crate::dispatch::DispatchOutcome;
use crate::processing::Crop;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    HighestConfidence,
    FirstSeen,
}

/// Named parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePreset {
    /// First crop above 90% is dispatched straight away.
    Immediate,
    /// 70% starts a 5 second countdown, best crop wins.
    Countdown,
    /// Like countdown with a 6 second window.
    RollingWindow,
}

impl CapturePreset {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "immediate" => Some(CapturePreset::Immediate),
            "countdown" => Some(CapturePreset::Countdown),
            "rolling_window" | "rolling" => Some(CapturePreset::RollingWindow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePreset::Immediate => "immediate",
            CapturePreset::Countdown => "countdown",
            CapturePreset::RollingWindow => "rolling_window",
        }
    }

    pub fn config(&self) -> CapturePolicyConfig {
        let base = CapturePolicyConfig::default();
        match self {
            CapturePreset::Immediate => CapturePolicyConfig {
                trigger_threshold: 0.90,
                display_threshold: 0.90,
                window_ms: 0,
                selection_rule: SelectionRule::FirstSeen,
                ..base
            },
            CapturePreset::Countdown => base,
            CapturePreset::RollingWindow => CapturePolicyConfig {
                window_ms: 6_000,
                ..base
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturePolicyConfig {
    /// A crop at or above this starts a session.
    pub trigger_threshold: f32,
    /// Only crops at or above this are collected.
    pub display_threshold: f32,
    pub window_ms: u64,
    pub selection_rule: SelectionRule,
    /// Side of the grid cell used to merge repeated detections of one object.
    pub dedup_cell: f32,
    pub max_candidates: usize,
}

impl Default for CapturePolicyConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 0.70,
            display_threshold: 0.85,
            window_ms: 5_000,
            selection_rule: SelectionRule::HighestConfidence,
            dedup_cell: 20.0,
            max_candidates: 10,
        }
    }
}

impl CapturePolicyConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Lowest confidence any crop needs to matter to the policy.
    pub fn crop_threshold(&self) -> f32 {
        self.trigger_threshold.min(self.display_threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Accumulating,
    Armed,
    Finalized,
    Dispatched,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Finalized | CaptureState::Dispatched)
    }
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureAction {
    ArmTimer { generation: u64, deadline: Instant },
    Dispatch { generation: u64, crop: Crop },
}

type CellKey = (i64, i64);

#[derive(Debug, Clone)]
struct Candidate {
    crop: Crop,
    seq: u64,
}

/// Spatially deduplicated, confidence-ranked crop collection.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    cell: f32,
    capacity: usize,
    slots: HashMap<CellKey, Candidate>,
    next_seq: u64,
}

impl CandidateSet {
    pub fn new(cell: f32, capacity: usize) -> Self {
        Self {
            cell,
            capacity,
            slots: HashMap::new(),
            next_seq: 0,
        }
    }

    fn key(&self, crop: &Crop) -> CellKey {
        (
            (crop.bbox.x1 / self.cell).round() as i64,
            (crop.bbox.y1 / self.cell).round() as i64,
        )
    }

    /// Returns true if the set changed.
    ///
    /// A crop landing in an occupied cell replaces the occupant only with a
    /// strictly higher confidence; the slot keeps its original position in
    /// insertion order.
    pub fn insert(&mut self, crop: Crop) -> bool {
        let key = self.key(&crop);
        let changed = match self.slots.get_mut(&key) {
            Some(existing) => {
                if crop.confidence > existing.crop.confidence {
                    existing.crop = crop;
                    true
                } else {
                    false
                }
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.slots.insert(key, Candidate { crop, seq });
                true
            }
        };

        while self.slots.len() > self.capacity {
            let evict = self
                .slots
                .iter()
                .max_by(|a, b| rank(a.1, b.1))
                .map(|(key, _)| *key);
            match evict {
                Some(key) => {
                    self.slots.remove(&key);
                }
                None => break,
            }
        }

        changed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Descending confidence; ties by earliest insertion.
    pub fn ranked(&self) -> Vec<&Crop> {
        let mut entries: Vec<&Candidate> = self.slots.values().collect();
        entries.sort_by(|a, b| rank(a, b));
        entries.into_iter().map(|c| &c.crop).collect()
    }

    pub fn best(&self) -> Option<&Crop> {
        self.slots.values().min_by(|a, b| rank(a, b)).map(|c| &c.crop)
    }

    pub fn first_seen(&self) -> Option<&Crop> {
        self.slots.values().min_by_key(|c| c.seq).map(|c| &c.crop)
    }

    pub fn select(&self, rule: SelectionRule) -> Option<&Crop> {
        match rule {
            SelectionRule::HighestConfidence => self.best(),
            SelectionRule::FirstSeen => self.first_seen(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_seq = 0;
    }
}

/// `Less` means `a` ranks ahead of `b`.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.crop
        .confidence
        .partial_cmp(&a.crop.confidence)
        .unwrap_or(Ordering::Equal)
        .then(a.seq.cmp(&b.seq))
}

/// One attempt at capturing a crop, from first trigger to analysis outcome.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    config: CapturePolicyConfig,
    generation: u64,
    state: CaptureState,
    candidates: CandidateSet,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
    winner: Option<Crop>,
    dispatch_claimed: bool,
    outcome: Option<DispatchOutcome>,
}

impl CaptureSession {
    pub fn new(config: CapturePolicyConfig) -> Self {
        Self {
            candidates: CandidateSet::new(config.dedup_cell, config.max_candidates),
            config,
            generation: 0,
            state: CaptureState::Idle,
            started_at: None,
            deadline: None,
            winner: None,
            dispatch_claimed: false,
            outcome: None,
        }
    }

    pub fn config(&self) -> &CapturePolicyConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn candidates(&self) -> Vec<&Crop> {
        self.candidates.ranked()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left in the window, if armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            CaptureState::Armed => self.deadline.map(|d| d.saturating_duration_since(now)),
            _ => None,
        }
    }

    pub fn winner(&self) -> Option<&Crop> {
        self.winner.as_ref()
    }

    pub fn outcome(&self) -> Option<&DispatchOutcome> {
        self.outcome.as_ref()
    }

    /// Feeds one frame's crops, tagged with the generation current when the
    /// frame was captured. Stale batches are ignored.
    pub fn observe(&mut self, generation: u64, crops: &[Crop], now: Instant) -> Vec<CaptureAction> {
        if generation != self.generation {
            debug!(
                "Dropping batch from generation {} (current {})",
                generation, self.generation
            );
            return Vec::new();
        }

        match self.state {
            CaptureState::Idle => {
                let triggered = crops
                    .iter()
                    .any(|c| c.confidence >= self.config.trigger_threshold);
                if !triggered {
                    return Vec::new();
                }

                self.state = CaptureState::Accumulating;
                self.started_at = Some(now);
                self.merge(crops);
                info!(
                    "Capture triggered (generation {}, window {:?})",
                    self.generation,
                    self.config.window()
                );

                if self.config.window_ms == 0 {
                    return self.finalize();
                }

                let deadline = now + self.config.window();
                self.deadline = Some(deadline);
                self.state = CaptureState::Armed;
                vec![CaptureAction::ArmTimer {
                    generation: self.generation,
                    deadline,
                }]
            }
            CaptureState::Armed => {
                self.merge(crops);
                Vec::new()
            }
            CaptureState::Accumulating => {
                debug_assert!(false, "session observed while accumulating");
                Vec::new()
            }
            CaptureState::Finalized | CaptureState::Dispatched => Vec::new(),
        }
    }

    /// Called when the window timer fires.
    pub fn on_timer(&mut self, generation: u64, now: Instant) -> Vec<CaptureAction> {
        if generation != self.generation || self.state != CaptureState::Armed {
            debug!("Ignoring timer for generation {}", generation);
            return Vec::new();
        }
        match self.deadline {
            Some(deadline) if now < deadline => vec![CaptureAction::ArmTimer {
                generation: self.generation,
                deadline,
            }],
            _ => {
                if let Some(started) = self.started_at {
                    debug!(
                        "Window closed after {:?} with {} candidates",
                        now.saturating_duration_since(started),
                        self.candidates.len()
                    );
                }
                self.finalize()
            }
        }
    }

    /// Takes the winner for dispatch. Yields it at most once per session.
    pub fn claim_dispatch(&mut self) -> Option<Crop> {
        if self.state != CaptureState::Finalized {
            return None;
        }
        if self.dispatch_claimed {
            warn!(
                "Dispatch already claimed for generation {}, ignoring",
                self.generation
            );
            return None;
        }
        self.dispatch_claimed = true;
        self.winner.clone()
    }

    /// Records the analysis result. Returns false for stale or unexpected
    /// outcomes, which are discarded.
    pub fn complete_dispatch(&mut self, generation: u64, outcome: DispatchOutcome) -> bool {
        if generation != self.generation {
            debug!("Discarding outcome from generation {}", generation);
            return false;
        }
        if self.state != CaptureState::Finalized || !self.dispatch_claimed {
            warn!("Unexpected dispatch outcome in state {:?}", self.state);
            return false;
        }
        self.state = CaptureState::Dispatched;
        self.outcome = Some(outcome);
        true
    }

    /// Starts a new attempt. Returns the new generation.
    pub fn reset(&mut self) -> u64 {
        self.generation += 1;
        self.clear();
        info!("Capture session reset (generation {})", self.generation);
        self.generation
    }

    fn clear(&mut self) {
        self.state = CaptureState::Idle;
        self.candidates.clear();
        self.started_at = None;
        self.deadline = None;
        self.winner = None;
        self.dispatch_claimed = false;
        self.outcome = None;
    }

    fn merge(&mut self, crops: &[Crop]) {
        for crop in crops {
            if crop.confidence >= self.config.display_threshold {
                self.candidates.insert(crop.clone());
            }
        }
    }

    fn finalize(&mut self) -> Vec<CaptureAction> {
        debug_assert!(matches!(
            self.state,
            CaptureState::Accumulating | CaptureState::Armed
        ));

        let winner = self.candidates.select(self.config.selection_rule).cloned();
        match winner {
            None => {
                info!("Capture window closed with no candidates, back to idle");
                self.clear();
                Vec::new()
            }
            Some(crop) => {
                info!(
                    "Capture finalized: {} at {}% from {} candidates",
                    crop.id,
                    crop.score,
                    self.candidates.len()
                );
                self.winner = Some(crop);
                self.deadline = None;
                self.state = CaptureState::Finalized;
                self.claim_dispatch()
                    .map(|crop| CaptureAction::Dispatch {
                        generation: self.generation,
                        crop,
                    })
                    .into_iter()
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::CropBox;
    use bytes::Bytes;
    use chrono::Utc;

    fn crop(id: &str, confidence: f32, x1: f32, y1: f32) -> Crop {
        Crop {
            id: id.to_string(),
            class_name: "clothing".to_string(),
            confidence,
            score: format!("{:.1}", confidence * 100.0),
            bbox: CropBox {
                x1,
                y1,
                x2: x1 + 10.0,
                y2: y1 + 10.0,
                width: 10.0,
                height: 10.0,
            },
            jpeg: Bytes::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_presets() {
        let immediate = CapturePreset::Immediate.config();
        assert_eq!(immediate.window_ms, 0);
        assert_eq!(immediate.selection_rule, SelectionRule::FirstSeen);
        assert_eq!(CapturePreset::Countdown.config(), CapturePolicyConfig::default());
        assert_eq!(CapturePreset::RollingWindow.config().window_ms, 6_000);
        assert_eq!(CapturePreset::from_str("rolling-window"), Some(CapturePreset::RollingWindow));
        assert_eq!(CapturePreset::from_str("burst"), None);
        assert_eq!(CapturePolicyConfig::default().crop_threshold(), 0.70);
    }

    #[test]
    fn test_candidate_set_dedup_keeps_higher() {
        let mut set = CandidateSet::new(20.0, 10);
        assert!(set.insert(crop("a", 0.86, 100.0, 100.0)));
        assert!(set.insert(crop("b", 0.90, 104.0, 96.0)));
        assert!(!set.insert(crop("c", 0.88, 99.0, 101.0)));
        assert!(!set.insert(crop("d", 0.90, 100.0, 100.0)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.best().unwrap().id, "b");
    }

    #[test]
    fn test_candidate_set_ranking_and_cap() {
        let mut set = CandidateSet::new(20.0, 3);
        set.insert(crop("a", 0.86, 0.0, 0.0));
        set.insert(crop("b", 0.95, 100.0, 0.0));
        set.insert(crop("c", 0.86, 200.0, 0.0));
        set.insert(crop("d", 0.90, 300.0, 0.0));
        let ids: Vec<_> = set.ranked().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
        assert_eq!(set.first_seen().unwrap().id, "a");
    }

    #[test]
    fn test_trigger_arms_timer() {
        let mut session = CaptureSession::new(CapturePolicyConfig::default());
        let now = Instant::now();
        assert!(session.observe(0, &[crop("low", 0.5, 0.0, 0.0)], now).is_empty());
        assert_eq!(session.state(), CaptureState::Idle);

        let actions = session.observe(0, &[crop("a", 0.75, 0.0, 0.0)], now);
        assert_eq!(
            actions,
            vec![CaptureAction::ArmTimer {
                generation: 0,
                deadline: now + Duration::from_secs(5)
            }]
        );
        assert_eq!(session.state(), CaptureState::Armed);
        assert_eq!(session.started_at(), Some(now));
        // 0.75 is below the display threshold
        assert_eq!(session.candidate_count(), 0);
        assert_eq!(session.remaining(now), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_window_expiry_dispatches_best() {
        let mut session = CaptureSession::new(CapturePolicyConfig::default());
        let now = Instant::now();
        session.observe(0, &[crop("a", 0.86, 0.0, 0.0)], now);
        session.observe(0, &[crop("b", 0.97, 200.0, 0.0)], now + Duration::from_secs(1));

        assert!(session.on_timer(0, now + Duration::from_secs(2)).len() == 1);
        assert_eq!(session.state(), CaptureState::Armed);

        let actions = session.on_timer(0, now + Duration::from_secs(5));
        match &actions[..] {
            [CaptureAction::Dispatch { generation: 0, crop }] => assert_eq!(crop.id, "b"),
            other => panic!("unexpected actions {:?}", other),
        }
        assert_eq!(session.state(), CaptureState::Finalized);
        assert!(session.claim_dispatch().is_none());

        let outcome = DispatchOutcome::Analysed {
            text: "blue shirt".to_string(),
            provider: "backend".to_string(),
        };
        assert!(session.complete_dispatch(0, outcome.clone()));
        assert_eq!(session.state(), CaptureState::Dispatched);
        assert_eq!(session.outcome(), Some(&outcome));
        assert!(!session.complete_dispatch(0, outcome));
    }

    #[test]
    fn test_immediate_preset_finalizes_on_trigger() {
        let mut session = CaptureSession::new(CapturePreset::Immediate.config());
        let actions = session.observe(
            0,
            &[crop("first", 0.91, 0.0, 0.0), crop("second", 0.99, 200.0, 0.0)],
            Instant::now(),
        );
        match &actions[..] {
            [CaptureAction::Dispatch { crop, .. }] => assert_eq!(crop.id, "first"),
            other => panic!("unexpected actions {:?}", other),
        }
    }

    #[test]
    fn test_reset_bumps_generation_and_ignores_stale() {
        let mut session = CaptureSession::new(CapturePolicyConfig::default());
        let now = Instant::now();
        session.observe(0, &[crop("a", 0.9, 0.0, 0.0)], now);
        assert_eq!(session.reset(), 1);
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.started_at().is_none());
        assert_eq!(session.candidate_count(), 0);

        assert!(session.on_timer(0, now + Duration::from_secs(10)).is_empty());
        assert!(session.observe(0, &[crop("b", 0.9, 0.0, 0.0)], now).is_empty());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn test_terminal_states_ignore_batches() {
        let mut session = CaptureSession::new(CapturePreset::Immediate.config());
        let now = Instant::now();
        session.observe(0, &[crop("a", 0.95, 0.0, 0.0)], now);
        assert!(session.state().is_terminal());
        assert!(session.observe(0, &[crop("b", 0.99, 50.0, 0.0)], now).is_empty());
        assert_eq!(session.winner().unwrap().id, "a");
    }
}
