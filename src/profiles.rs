// src/profiles.rs
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ProfileError;

/// The fixed set of posture metrics every profile has to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    NeckAngle,
    TorsoAngle,
    ShoulderTilt,
    HeadTilt,
}

impl Metric {
    pub fn key(self) -> &'static str {
        match self {
            Self::NeckAngle => "neckAngle",
            Self::TorsoAngle => "torsoAngle",
            Self::ShoulderTilt => "shoulderTilt",
            Self::HeadTilt => "headTilt",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Inclusive `[low, high]` range shown to the user as the ideal band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdealRange(pub f64, pub f64);

/// Lower bound only (`neckAngle`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MinThreshold {
    pub min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_range: Option<IdealRange>,
}

/// Closed interval (`torsoAngle`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RangeThreshold {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_range: Option<IdealRange>,
}

impl RangeThreshold {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Maximum absolute deviation (`shoulderTilt`, `headTilt`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaxThreshold {
    pub max: f64,
}

/// All four metric thresholds. Every field is required, so a partial
/// profile can never be loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Thresholds {
    pub neck_angle: MinThreshold,
    pub torso_angle: RangeThreshold,
    pub shoulder_tilt: MaxThreshold,
    pub head_tilt: MaxThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureProfile {
    /// Registry key; filled from the map key when loading from JSON.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub tips: Vec<String>,
    pub thresholds: Thresholds,
}

impl PostureProfile {
    pub fn ideal_range(&self, metric: Metric) -> Option<IdealRange> {
        match metric {
            Metric::NeckAngle => self.thresholds.neck_angle.ideal_range,
            Metric::TorsoAngle => self.thresholds.torso_angle.ideal_range,
            Metric::ShoulderTilt | Metric::HeadTilt => None,
        }
    }

    /// Short hint displayed next to a measured value, e.g. `Ideal: 170-180°`.
    pub fn tolerance_hint(&self, metric: Metric) -> Option<String> {
        match metric {
            Metric::ShoulderTilt => Some(format!("Ideal: ±{}°", self.thresholds.shoulder_tilt.max)),
            Metric::HeadTilt => Some(format!("Ideal: ±{}°", self.thresholds.head_tilt.max)),
            _ => self
                .ideal_range(metric)
                .map(|IdealRange(low, high)| format!("Ideal: {low}-{high}°")),
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        let t = &self.thresholds;

        self.check_finite(Metric::NeckAngle, &[t.neck_angle.min])?;
        self.check_ideal(Metric::NeckAngle, t.neck_angle.ideal_range)?;

        self.check_finite(Metric::TorsoAngle, &[t.torso_angle.min, t.torso_angle.max])?;
        if t.torso_angle.min > t.torso_angle.max {
            return Err(self.invalid(
                Metric::TorsoAngle,
                format!("min {} is greater than max {}", t.torso_angle.min, t.torso_angle.max),
            ));
        }
        self.check_ideal(Metric::TorsoAngle, t.torso_angle.ideal_range)?;

        for (metric, threshold) in [
            (Metric::ShoulderTilt, t.shoulder_tilt),
            (Metric::HeadTilt, t.head_tilt),
        ] {
            self.check_finite(metric, &[threshold.max])?;
            if threshold.max < 0.0 {
                return Err(self.invalid(metric, format!("max {} is negative", threshold.max)));
            }
        }

        Ok(())
    }

    fn check_finite(&self, metric: Metric, values: &[f64]) -> Result<(), ProfileError> {
        match values.iter().find(|v| !v.is_finite()) {
            Some(v) => Err(self.invalid(metric, format!("{v} is not a finite number"))),
            None => Ok(()),
        }
    }

    fn check_ideal(&self, metric: Metric, range: Option<IdealRange>) -> Result<(), ProfileError> {
        match range {
            Some(IdealRange(low, high)) if !(low.is_finite() && high.is_finite()) || low > high => {
                Err(self.invalid(metric, format!("ideal range [{low}, {high}] is not ordered")))
            }
            _ => Ok(()),
        }
    }

    fn invalid(&self, metric: Metric, reason: String) -> ProfileError {
        ProfileError::InvalidThreshold {
            profile: self.id.clone(),
            metric: metric.key(),
            reason,
        }
    }
}

/// Static table of posture profiles keyed by posture type.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, PostureProfile>,
}

static BUILTIN: Lazy<ProfileRegistry> = Lazy::new(|| ProfileRegistry {
    profiles: builtin_profiles()
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect(),
});

impl ProfileRegistry {
    /// The `sitting`, `standing` and `working` profiles.
    pub fn builtin() -> &'static ProfileRegistry {
        &BUILTIN
    }

    /// Builds a registry, rejecting it as a whole if any profile is invalid.
    pub fn new(profiles: impl IntoIterator<Item = PostureProfile>) -> Result<Self, ProfileError> {
        let mut map = BTreeMap::new();
        for profile in profiles {
            profile.validate()?;
            map.insert(profile.id.clone(), profile);
        }
        if map.is_empty() {
            return Err(ProfileError::Empty);
        }
        Ok(Self { profiles: map })
    }

    /// Parses a JSON object of `{ "<posture type>": { name, thresholds, .. } }`.
    pub fn from_json_str(json: &str) -> Result<Self, ProfileError> {
        let raw: BTreeMap<String, PostureProfile> = serde_json::from_str(json)?;
        let registry = Self::new(raw.into_iter().map(|(id, mut profile)| {
            profile.id = id;
            profile
        }))?;
        debug!(profiles = ?registry.ids().collect::<Vec<_>>(), "Parsed posture profiles");
        Ok(registry)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&content)?;
        info!(path = %path.display(), count = registry.len(), "Loaded posture profiles");
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&PostureProfile> {
        self.profiles.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&PostureProfile, ProfileError> {
        self.get(id)
            .ok_or_else(|| ProfileError::UnknownPostureType(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostureProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn tilt(max: f64) -> MaxThreshold {
    MaxThreshold { max }
}

fn builtin_profiles() -> Vec<PostureProfile> {
    vec![
        PostureProfile {
            id: "sitting".into(),
            name: "General Sitting".into(),
            description: "For maintaining a straight back while sitting.".into(),
            icon: "🪑".into(),
            tips: vec![
                "Sit with your back straight and shoulders relaxed.".into(),
                "Keep your feet flat on the floor.".into(),
                "Ensure your knees are at or slightly below hip level.".into(),
                "Imagine a string pulling the top of your head toward the ceiling.".into(),
            ],
            thresholds: Thresholds {
                neck_angle: MinThreshold { min: 165.0, ideal_range: Some(IdealRange(170.0, 180.0)) },
                torso_angle: RangeThreshold {
                    min: 85.0,
                    max: 105.0,
                    ideal_range: Some(IdealRange(90.0, 100.0)),
                },
                shoulder_tilt: tilt(5.0),
                head_tilt: tilt(5.0),
            },
        },
        PostureProfile {
            id: "standing".into(),
            name: "Standing".into(),
            description: "For standing tall with an aligned spine.".into(),
            icon: "🧍".into(),
            tips: vec![
                "Stand with your weight evenly distributed on both feet.".into(),
                "Keep your knees slightly bent, not locked.".into(),
                "Align your head, shoulders, hips, and ankles in a straight line.".into(),
                "Engage your core muscles to support your spine.".into(),
            ],
            thresholds: Thresholds {
                neck_angle: MinThreshold { min: 170.0, ideal_range: Some(IdealRange(175.0, 180.0)) },
                torso_angle: RangeThreshold {
                    min: 88.0,
                    max: 92.0,
                    ideal_range: Some(IdealRange(89.0, 91.0)),
                },
                shoulder_tilt: tilt(5.0),
                head_tilt: tilt(5.0),
            },
        },
        PostureProfile {
            id: "working".into(),
            name: "Desk Work".into(),
            description: "Ergonomic posture for computer work.".into(),
            icon: "💻".into(),
            tips: vec![
                "Position your monitor an arm's length away, with the top at eye level.".into(),
                "Your elbows should be bent at a 90-degree angle.".into(),
                "Use a chair with good lumbar support.".into(),
                "Take a short break to stand and stretch every 30 minutes.".into(),
            ],
            thresholds: Thresholds {
                neck_angle: MinThreshold { min: 160.0, ideal_range: Some(IdealRange(165.0, 175.0)) },
                torso_angle: RangeThreshold {
                    min: 80.0,
                    max: 105.0,
                    ideal_range: Some(IdealRange(90.0, 100.0)),
                },
                shoulder_tilt: tilt(5.0),
                head_tilt: tilt(5.0),
            },
        },
    ]
}
