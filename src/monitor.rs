// src/monitor.rs - Event-driven glue between the landmark stream and a session
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisResult, Correction, PostureAnalyzer, Severity, Status};
use crate::config::MonitorSettings;
use crate::landmarks::LandmarkFrame;
use crate::profiles::PostureProfile;
use crate::session::{Clock, SessionAggregator, SessionRecord, SessionStats};

/// Bounds how often frames are analyzed, whatever the camera frame rate.
#[derive(Debug, Clone)]
pub struct AnalysisThrottle {
    min_interval_ms: u64,
    last_ms: Option<u64>,
}

impl AnalysisThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_ms: min_interval.as_millis() as u64,
            last_ms: None,
        }
    }

    /// Returns true, and arms the throttle, when enough time has passed.
    pub fn should_analyze(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < self.min_interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }
}

/// Per-frame input from the pose detector.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    Pose(LandmarkFrame),
    /// The detector ran but found nobody.
    NoPose,
}

/// Everything one monitoring session owns. Created at start, consumed at stop.
pub struct SessionContext<C: Clock + Clone> {
    clock: C,
    profile: PostureProfile,
    analyzer: PostureAnalyzer,
    aggregator: SessionAggregator<C>,
    throttle: AnalysisThrottle,
    latest: Option<AnalysisResult>,
}

impl<C: Clock + Clone> SessionContext<C> {
    pub fn start(profile: PostureProfile, settings: &MonitorSettings, clock: C) -> Self {
        let mut aggregator = SessionAggregator::new(profile.id.clone(), clock.clone())
            .with_min_reportable_seconds(settings.min_reportable_seconds);
        aggregator.start();

        Self {
            clock,
            profile,
            analyzer: PostureAnalyzer::new(settings.analyzer_config()),
            aggregator,
            throttle: AnalysisThrottle::new(settings.min_analysis_interval()),
            latest: None,
        }
    }

    pub fn profile(&self) -> &PostureProfile {
        &self.profile
    }

    pub fn stats(&self) -> SessionStats {
        self.aggregator.stats()
    }

    /// The most recently completed analysis.
    pub fn latest(&self) -> Option<&AnalysisResult> {
        self.latest.as_ref()
    }

    /// Analyzes the frame unless throttled. Returns the new result, if any.
    pub fn on_frame(&mut self, event: &FrameEvent) -> Option<&AnalysisResult> {
        if !self.throttle.should_analyze(self.clock.now_millis()) {
            return None;
        }

        let result = match event {
            FrameEvent::Pose(frame) => {
                let result = self.analyzer.analyze(Some(frame), &self.profile);
                self.aggregator.record(&result, false);
                result
            }
            // Nobody in view: shown as the latest state, kept out of the average.
            FrameEvent::NoPose => {
                let result = self.analyzer.analyze(None, &self.profile);
                self.aggregator.observe(&result);
                result
            }
        };
        self.latest = Some(result);
        self.latest.as_ref()
    }

    pub fn on_tick(&mut self) {
        self.aggregator.tick();
    }

    pub fn finish(mut self) -> Option<SessionRecord> {
        self.aggregator.stop()
    }
}

/// One line of live feedback: `message (Current: -20°, Ideal: ±5°)`.
pub fn describe_correction(correction: &Correction, profile: &PostureProfile) -> String {
    let hint = correction
        .key
        .metric()
        .and_then(|metric| profile.tolerance_hint(metric));
    let details: Vec<String> = correction
        .value
        .as_ref()
        .map(|value| format!("Current: {value}"))
        .into_iter()
        .chain(hint)
        .collect();

    if details.is_empty() {
        correction.message.clone()
    } else {
        format!("{} ({})", correction.message, details.join(", "))
    }
}

#[derive(Debug, Deserialize)]
struct FrameLine {
    landmarks: Option<LandmarkFrame>,
}

/// Parses one JSON line: `{"landmarks": [...]}` or `{"landmarks": null}`.
pub fn parse_frame_line(line: &str) -> Result<FrameEvent> {
    let parsed: FrameLine = serde_json::from_str(line).context("Invalid landmark frame")?;
    Ok(match parsed.landmarks {
        Some(frame) => FrameEvent::Pose(frame),
        None => FrameEvent::NoPose,
    })
}

/// Forwards JSON Lines frames from `reader` until EOF or until the receiver
/// goes away. Bad lines are skipped. Returns the number of frames sent.
pub async fn read_frame_events<R>(reader: R, tx: mpsc::Sender<FrameEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read landmark stream")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_frame_line(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    debug!("Frame receiver closed, stopping reader");
                    break;
                }
                sent += 1;
            }
            Err(e) => warn!(line = line_no, error = %format!("{e:#}"), "Skipping malformed frame"),
        }
    }
    Ok(sent)
}

/// Drives one session from a frame channel and a fixed-rate timer.
pub struct Monitor<C: Clock + Clone> {
    context: SessionContext<C>,
    tick_interval: Duration,
    last_status: Option<Status>,
}

impl<C: Clock + Clone> Monitor<C> {
    pub fn new(context: SessionContext<C>, tick_interval: Duration) -> Self {
        Self {
            context,
            tick_interval,
            last_status: None,
        }
    }

    /// Runs until the frame stream ends or `shutdown` resolves, then stops
    /// the session. Everything happens on this one task, so each event is
    /// fully applied before the next one is looked at.
    pub async fn run<F>(mut self, mut frames: mpsc::Receiver<FrameEvent>, shutdown: F) -> Option<SessionRecord>
    where
        F: Future<Output = ()>,
    {
        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut ticker = tokio::time::interval_at(start, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            posture_type = %self.context.profile().id,
            profile = %self.context.profile().name,
            icon = %self.context.profile().icon,
            "Monitoring posture"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.context.on_tick(),
                event = frames.recv() => match event {
                    Some(event) => self.handle_frame(&event),
                    None => {
                        info!("Landmark stream ended");
                        break;
                    }
                },
            }
        }

        self.context.finish()
    }

    fn handle_frame(&mut self, event: &FrameEvent) {
        let Some(result) = self.context.on_frame(event).cloned() else {
            return;
        };

        debug!(
            score = result.score,
            corrections = ?result.correction_keys(),
            "Analysis"
        );
        if self.last_status == Some(result.status) {
            return;
        }
        info!(status = %result.status, score = result.score, "Posture changed");
        for correction in &result.corrections {
            let feedback = describe_correction(correction, self.context.profile());
            let severity = correction.key.severity();
            match severity {
                Severity::Warning => warn!(%severity, "{feedback}"),
                Severity::Info | Severity::Success => info!(%severity, "{feedback}"),
            }
        }
        self.last_status = Some(result.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{set, upright_frame};
    use crate::analysis::CorrectionKind;
    use crate::landmarks::{Landmark, PoseLandmark};
    use crate::profiles::{Metric, ProfileRegistry};
    use crate::session::{ManualClock, SystemClock};

    fn settings() -> MonitorSettings {
        MonitorSettings {
            history_path: "unused.json".into(),
            ..MonitorSettings::default()
        }
    }

    fn profile() -> PostureProfile {
        ProfileRegistry::builtin().require("sitting").unwrap().clone()
    }

    fn frame_json(frame: &LandmarkFrame) -> String {
        serde_json::json!({ "landmarks": frame }).to_string()
    }

    #[test]
    fn test_throttle() {
        let mut throttle = AnalysisThrottle::new(Duration::from_millis(300));
        assert!(throttle.should_analyze(0));
        assert!(!throttle.should_analyze(100));
        assert!(!throttle.should_analyze(299));
        assert!(throttle.should_analyze(300));
        assert!(!throttle.should_analyze(500));
        assert!(throttle.should_analyze(650));
    }

    #[test]
    fn test_parse_frame_line() {
        let event = parse_frame_line(&frame_json(&upright_frame())).unwrap();
        assert!(matches!(event, FrameEvent::Pose(ref f) if f.len() == 33));
        assert!(matches!(parse_frame_line(r#"{"landmarks":null}"#).unwrap(), FrameEvent::NoPose));
        assert!(parse_frame_line("{").is_err());
    }

    #[test]
    fn test_context_throttles_and_tracks_latest() {
        let clock = ManualClock::new();
        let mut ctx = SessionContext::start(profile(), &settings(), clock.clone());

        assert_eq!(ctx.on_frame(&FrameEvent::Pose(upright_frame())).unwrap().score, 100);
        clock.advance(Duration::from_millis(100));
        assert!(ctx.on_frame(&FrameEvent::NoPose).is_none());
        assert_eq!(ctx.latest().unwrap().status, Status::Excellent);

        clock.advance(Duration::from_millis(250));
        assert_eq!(ctx.on_frame(&FrameEvent::NoPose).unwrap().status, Status::NoDetection);

        clock.set_millis(1000);
        ctx.on_tick();
        // The empty frame is the latest state but not part of the average.
        assert_eq!(ctx.latest().unwrap().status, Status::NoDetection);
        assert_eq!(ctx.stats().average_score, 100);
        assert!(ctx.finish().is_none());
    }

    #[test]
    fn test_empty_frames_do_not_lower_the_average() {
        let clock = ManualClock::new();
        let mut ctx = SessionContext::start(profile(), &settings(), clock.clone());

        for second in 1..=10u64 {
            let event = if second % 2 == 0 {
                FrameEvent::NoPose
            } else {
                FrameEvent::Pose(upright_frame())
            };
            ctx.on_frame(&event);
            clock.set_millis(second * 1000);
            ctx.on_tick();
        }

        let record = ctx.finish().unwrap();
        assert_eq!(record.stats.duration_seconds, 10);
        assert_eq!(record.stats.average_score, 100);
        assert_eq!(record.stats.poor_posture_seconds, 0);
    }

    #[test]
    fn test_describe_correction() {
        let sitting = profile();
        let tilted = Correction::new(CorrectionKind::UnevenShoulders).with_degrees(-20.0);
        assert_eq!(
            describe_correction(&tilted, &sitting),
            "Uneven shoulders - level them (Current: -20°, Ideal: ±5°)"
        );

        let leaning = Correction::new(CorrectionKind::Leaning).with_degrees(150.2);
        assert_eq!(
            describe_correction(&leaning, &sitting),
            format!(
                "Leaning - straighten your back (Current: 150°, {})",
                sitting.tolerance_hint(Metric::TorsoAngle).unwrap()
            )
        );

        let perfect = Correction::new(CorrectionKind::Perfect);
        assert_eq!(describe_correction(&perfect, &sitting), "Perfect posture!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_feedback_for_poor_posture() {
        let context = SessionContext::start(profile(), &settings(), SystemClock::new());
        let monitor = Monitor::new(context, Duration::from_secs(1));

        let mut slumped = upright_frame();
        set(&mut slumped, PoseLandmark::LeftShoulder, |l| *l = Landmark::new(0.65, 0.55, 1.0));

        let (tx, rx) = mpsc::channel(16);
        let producer = tokio::spawn(async move {
            for i in 0..16 {
                let frame = if i < 8 { upright_frame() } else { slumped.clone() };
                tx.send(FrameEvent::Pose(frame)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        });

        let record = monitor.run(rx, std::future::pending()).await.unwrap();
        producer.await.unwrap();

        assert_eq!(record.stats.duration_seconds, 8);
        assert!(record.stats.average_score < 100);
    }

    #[test]
    fn test_poor_posture_accumulates_on_ticks() {
        let clock = ManualClock::new();
        let mut ctx = SessionContext::start(profile(), &settings(), clock.clone());

        let mut slumped = upright_frame();
        set(&mut slumped, PoseLandmark::LeftShoulder, |l| *l = Landmark::new(0.65, 0.55, 1.0));
        set(&mut slumped, PoseLandmark::LeftEar, |l| *l = Landmark::new(0.8, 0.25, 1.0));
        set(&mut slumped, PoseLandmark::RightEar, |l| *l = Landmark::new(0.7, 0.2, 1.0));

        for second in 1..=8u64 {
            ctx.on_frame(&FrameEvent::Pose(slumped.clone()));
            clock.set_millis(second * 1000);
            ctx.on_tick();
        }
        assert_eq!(ctx.latest().unwrap().status, Status::Poor);

        let record = ctx.finish().unwrap();
        assert_eq!(record.stats.duration_seconds, 8);
        assert_eq!(record.stats.poor_posture_seconds, 8);
    }

    #[tokio::test]
    async fn test_read_frame_events_skips_bad_lines() {
        let input = format!(
            "{}\n\nnot json\n{{\"landmarks\":null}}\n",
            frame_json(&upright_frame())
        );
        let (tx, mut rx) = mpsc::channel(8);

        let sent = read_frame_events(input.as_bytes(), tx).await.unwrap();
        assert_eq!(sent, 2);
        assert!(matches!(rx.recv().await, Some(FrameEvent::Pose(_))));
        assert!(matches!(rx.recv().await, Some(FrameEvent::NoPose)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_runs_a_full_session() {
        let clock = SystemClock::new();
        let context = SessionContext::start(profile(), &settings(), clock);
        let monitor = Monitor::new(context, Duration::from_secs(1));

        let (tx, rx) = mpsc::channel(16);
        let producer = tokio::spawn(async move {
            for _ in 0..=20 {
                tx.send(FrameEvent::Pose(upright_frame())).await.unwrap();
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        });

        let record = monitor.run(rx, std::future::pending()).await.unwrap();
        producer.await.unwrap();

        assert_eq!(record.posture_type, "sitting");
        assert_eq!(record.stats.duration_seconds, 10);
        assert_eq!(record.stats.average_score, 100);
        assert_eq!(record.stats.poor_posture_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_shutdown() {
        let context = SessionContext::start(profile(), &settings(), SystemClock::new());
        let monitor = Monitor::new(context, Duration::from_secs(1));
        let (_tx, rx) = mpsc::channel::<FrameEvent>(1);

        let record = monitor
            .run(rx, tokio::time::sleep(Duration::from_secs(3)))
            .await;
        assert!(record.is_none());
    }
}
