use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inferred activity of the animal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActivityLabel {
    Resting,
    RunningOnWheel,
    Eating,
    DrinkingWater,
    Exploring,
    /// No classification has been produced yet, or the remote could not name one.
    Unknown,
    /// The classifier could not be reached.
    Unavailable,
}

impl ActivityLabel {
    /// Labels that describe something the animal is doing.
    pub const ACTIVITIES: [ActivityLabel; 5] = [
        ActivityLabel::Resting,
        ActivityLabel::RunningOnWheel,
        ActivityLabel::Eating,
        ActivityLabel::DrinkingWater,
        ActivityLabel::Exploring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLabel::Resting => "Resting",
            ActivityLabel::RunningOnWheel => "RunningOnWheel",
            ActivityLabel::Eating => "Eating",
            ActivityLabel::DrinkingWater => "DrinkingWater",
            ActivityLabel::Exploring => "Exploring",
            ActivityLabel::Unknown => "Unknown",
            ActivityLabel::Unavailable => "Unavailable",
        }
    }

    pub fn is_activity(self) -> bool {
        Self::ACTIVITIES.contains(&self)
    }

    /// Map a label name from an inference service onto a known label.
    ///
    /// Accepts the canonical names plus the short names trained models emit
    /// (`running`, `eating`, `drinking`, `sleeping`, `exploring`). Matching ignores
    /// case, `_`, `-` and spaces.
    pub fn from_service_name(name: &str) -> Option<ActivityLabel> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let label = match key.as_str() {
            "resting" | "sleeping" | "rest" | "sleep" => ActivityLabel::Resting,
            "runningonwheel" | "running" | "wheel" | "run" => ActivityLabel::RunningOnWheel,
            "eating" | "eat" | "food" => ActivityLabel::Eating,
            "drinkingwater" | "drinking" | "drink" | "water" => ActivityLabel::DrinkingWater,
            "exploring" | "explore" => ActivityLabel::Exploring,
            "unknown" => ActivityLabel::Unknown,
            "unavailable" => ActivityLabel::Unavailable,
            _ => return None,
        };
        Some(label)
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one classifier call. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityResult {
    pub label: ActivityLabel,
    /// Confidence of `label`, in `[0, 1]`.
    pub confidence: f32,
    /// Per-label scores, each in `[0, 1]`.
    pub scores: BTreeMap<ActivityLabel, f32>,
}

impl ActivityResult {
    /// Build a result, clamping confidence and scores into `[0, 1]`.
    pub fn new(
        label: ActivityLabel,
        confidence: f32,
        scores: BTreeMap<ActivityLabel, f32>,
    ) -> Self {
        let scores = scores
            .into_iter()
            .map(|(label, score)| (label, clamp_unit(score)))
            .collect();
        Self {
            label,
            confidence: clamp_unit(confidence),
            scores,
        }
    }

    /// Placeholder before any classification has completed.
    pub fn unknown() -> Self {
        Self::new(ActivityLabel::Unknown, 0.0, BTreeMap::new())
    }

    /// Degraded result reported when classification failed.
    pub fn unavailable() -> Self {
        Self::new(ActivityLabel::Unavailable, 0.0, BTreeMap::new())
    }

    pub fn is_unavailable(&self) -> bool {
        self.label == ActivityLabel::Unavailable
    }

    /// Score recorded for `label`, 0.0 when absent.
    pub fn score(&self, label: ActivityLabel) -> f32 {
        self.scores.get(&label).copied().unwrap_or(0.0)
    }
}

impl Default for ActivityResult {
    fn default() -> Self {
        Self::unknown()
    }
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
