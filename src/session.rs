// src/session.rs - Session aggregation state machine
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, Status};

/// Sessions must last strictly longer than this to be reported.
pub const MIN_REPORTABLE_SECONDS: u64 = 5;

/// Monotonic time source for session bookkeeping.
pub trait Clock {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;
}

/// Backed by tokio's `Instant`, so paused test runtimes drive it too.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub duration_seconds: u64,
    pub average_score: u8,
    pub poor_posture_seconds: u64,
}

/// Immutable summary of a finished session, handed to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub posture_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: SessionStats,
}

/// Running sum of every score recorded this session.
#[derive(Debug, Clone, Copy, Default)]
struct ScoreHistory {
    sum: u64,
    count: u64,
}

impl ScoreHistory {
    fn push(&mut self, score: u8) {
        self.sum += u64::from(score);
        self.count += 1;
    }

    fn mean_rounded(&self) -> u8 {
        if self.count == 0 {
            return 0;
        }
        (self.sum as f64 / self.count as f64).round().min(100.0) as u8
    }
}

/// `Idle -> Running -> Idle`. Every operation is a no-op while idle.
#[derive(Debug)]
pub struct SessionAggregator<C: Clock = SystemClock> {
    clock: C,
    posture_type: String,
    min_reportable_seconds: u64,
    state: SessionState,
    started_at: u64,
    stats: SessionStats,
    scores: ScoreHistory,
    latest_status: Option<Status>,
    last_poor_second: Option<u64>,
}

impl<C: Clock> SessionAggregator<C> {
    pub fn new(posture_type: impl Into<String>, clock: C) -> Self {
        Self {
            clock,
            posture_type: posture_type.into(),
            min_reportable_seconds: MIN_REPORTABLE_SECONDS,
            state: SessionState::Idle,
            started_at: 0,
            stats: SessionStats::default(),
            scores: ScoreHistory::default(),
            latest_status: None,
            last_poor_second: None,
        }
    }

    pub fn with_min_reportable_seconds(mut self, seconds: u64) -> Self {
        self.min_reportable_seconds = seconds;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn posture_type(&self) -> &str {
        &self.posture_type
    }

    pub fn latest_status(&self) -> Option<Status> {
        self.latest_status
    }

    /// Starts (or restarts) a session from zero.
    pub fn start(&mut self) {
        self.started_at = self.clock.now_millis();
        self.stats = SessionStats::default();
        self.scores = ScoreHistory::default();
        self.latest_status = None;
        self.last_poor_second = None;
        self.state = SessionState::Running;
        info!(posture_type = %self.posture_type, "Session started");
    }

    /// Adds one analysis to the running average.
    ///
    /// Poor-posture time is only sampled when `sampled_at_fixed_interval` is
    /// set, and at most once per elapsed second.
    pub fn record(&mut self, result: &AnalysisResult, sampled_at_fixed_interval: bool) {
        if !self.is_running() {
            return;
        }
        self.scores.push(result.score);
        self.latest_status = Some(result.status);

        if sampled_at_fixed_interval {
            self.sample_poor_posture();
        }
    }

    /// Makes `result` the most recent status without adding its score to the
    /// average. Used for frames where the detector found nobody.
    pub fn observe(&mut self, result: &AnalysisResult) {
        if !self.is_running() {
            return;
        }
        self.latest_status = Some(result.status);
    }

    /// Called once per second while running.
    pub fn tick(&mut self) {
        if !self.is_running() {
            return;
        }
        self.refresh_stats();
        self.sample_poor_posture();
        debug!(
            duration = self.stats.duration_seconds,
            average = self.stats.average_score,
            poor = self.stats.poor_posture_seconds,
            "Session tick"
        );
    }

    /// Ends the session. Returns a record only for sessions long enough to
    /// be worth keeping; the aggregator is idle afterwards either way.
    pub fn stop(&mut self) -> Option<SessionRecord> {
        if !self.is_running() {
            return None;
        }
        self.refresh_stats();
        self.state = SessionState::Idle;

        if self.stats.duration_seconds <= self.min_reportable_seconds {
            info!(
                duration = self.stats.duration_seconds,
                min = self.min_reportable_seconds,
                "Session too short, discarding"
            );
            return None;
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            posture_type: self.posture_type.clone(),
            timestamp: Utc::now(),
            stats: self.stats,
        };
        info!(
            id = %record.id,
            duration = record.stats.duration_seconds,
            average = record.stats.average_score,
            poor = record.stats.poor_posture_seconds,
            "Session completed"
        );
        Some(record)
    }

    fn elapsed_seconds(&self) -> u64 {
        self.clock.now_millis().saturating_sub(self.started_at) / 1000
    }

    fn refresh_stats(&mut self) {
        self.stats.duration_seconds = self.elapsed_seconds();
        self.stats.average_score = self.scores.mean_rounded();
    }

    fn sample_poor_posture(&mut self) {
        if self.latest_status != Some(Status::Poor) {
            return;
        }
        let second = self.elapsed_seconds();
        if self.last_poor_second != Some(second) {
            self.stats.poor_posture_seconds += 1;
            self.last_poor_second = Some(second);
        }
    }
}
