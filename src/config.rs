// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerConfig;
use crate::session::MIN_REPORTABLE_SECONDS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorSettings {
    pub posture_type: String,
    /// Custom posture profile table; the built-in one is used when unset.
    pub profiles_path: Option<PathBuf>,
    pub min_analysis_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub min_reportable_seconds: u64,
    pub visibility_threshold: f64,
    pub history_path: PathBuf,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            posture_type: "sitting".to_string(),
            profiles_path: None,
            min_analysis_interval_ms: 300,
            tick_interval_ms: 1000,
            min_reportable_seconds: MIN_REPORTABLE_SECONDS,
            visibility_threshold: 0.8,
            history_path: default_history_path(),
        }
    }
}

impl MonitorSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tickIntervalMs must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            anyhow::bail!(
                "visibilityThreshold must be within [0, 1], got {}",
                self.visibility_threshold
            );
        }
        Ok(())
    }

    pub fn min_analysis_interval(&self) -> Duration {
        Duration::from_millis(self.min_analysis_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            visibility_threshold: self.visibility_threshold,
            ..AnalyzerConfig::default()
        }
    }
}

fn default_history_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "PostureMonitor")
        .map(|dirs| dirs.data_dir().join("sessions.json"))
        .unwrap_or_else(|| PathBuf::from("./output/sessions.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.posture_type, "sitting");
        assert_eq!(settings.min_analysis_interval(), Duration::from_millis(300));
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.min_reportable_seconds, 5);
        assert_eq!(settings.analyzer_config().visibility_threshold, 0.8);
        assert!(settings.history_path.ends_with("sessions.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "postureType": "working", "minAnalysisIntervalMs": 500 }}"#).unwrap();

        let settings = MonitorSettings::load(file.path()).unwrap();
        assert_eq!(settings.posture_type, "working");
        assert_eq!(settings.min_analysis_interval_ms, 500);
        assert_eq!(settings.tick_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_visibility_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "visibilityThreshold": 1.5 }}"#).unwrap();

        let err = MonitorSettings::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("visibilityThreshold"));
    }
}
