// src/lib.rs
//! Posture scoring engine.
//!
//! Turns per-frame pose landmarks into a posture score with corrective
//! feedback, and aggregates scores over a monitoring session.

pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod landmarks;
pub mod monitor;
pub mod profiles;
pub mod session;

pub use analysis::{AnalysisResult, AnalyzerConfig, Correction, CorrectionKind, PostureAnalyzer, Status};
pub use error::{HistoryError, ProfileError};
pub use landmarks::{Landmark, LandmarkFrame, PoseLandmark};
pub use profiles::{PostureProfile, ProfileRegistry};
pub use session::{SessionAggregator, SessionRecord, SessionStats};
