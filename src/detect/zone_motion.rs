use std::collections::BTreeMap;

use super::result::{clamp_unit, ActivityLabel, ActivityResult};
use super::zones::{ZoneKind, ZoneSet};
use crate::motion::MotionMask;

/// Confidence reported when no rule fires and the previous label is held.
pub const HOLD_CONFIDENCE: f32 = 0.25;

const WHEEL_SHARE: f32 = 0.5;
const FOOD_SHARE: f32 = 0.3;
const WATER_SHARE: f32 = 0.3;

/// Per-stream state carried between classifier calls.
///
/// Owned by whoever processes one camera's stream and threaded through
/// [`ZoneMotionClassifier::classify`] by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassifierState {
    pub no_movement_frames: u32,
    pub previous: ActivityLabel,
}

impl ClassifierState {
    /// State at the start of a stream. The previous label is seeded so the
    /// hold rule never has to report an undefined activity.
    pub fn initial() -> Self {
        Self {
            no_movement_frames: 0,
            previous: ActivityLabel::Exploring,
        }
    }
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Motion measured on one mask, before any decision is taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionSummary {
    pub total: u64,
    pub wheel: u64,
    pub food: u64,
    pub water: u64,
}

impl MotionSummary {
    pub fn measure(mask: &MotionMask, zones: &ZoneSet) -> Self {
        Self {
            total: mask.count_nonzero(),
            wheel: zones.motion_in(mask, ZoneKind::Wheel),
            food: zones.motion_in(mask, ZoneKind::Food),
            water: zones.motion_in(mask, ZoneKind::Water),
        }
    }
}

/// Heuristic activity classifier over a motion mask and cage zones.
///
/// Rules are checked in a fixed priority order and the first that fires wins:
/// resting, wheel, food, water, general movement, then hold the previous label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneMotionClassifier {
    /// Foreground pixel count separating "still" from "moving".
    pub movement_threshold: u32,
    /// Consecutive still frames before the animal counts as resting.
    pub resting_threshold: u32,
}

impl Default for ZoneMotionClassifier {
    fn default() -> Self {
        Self {
            movement_threshold: 1000,
            resting_threshold: 5,
        }
    }
}

impl ZoneMotionClassifier {
    pub fn new(movement_threshold: u32, resting_threshold: u32) -> Self {
        Self {
            movement_threshold,
            resting_threshold,
        }
    }

    pub fn classify(
        &self,
        mask: &MotionMask,
        zones: &ZoneSet,
        state: ClassifierState,
    ) -> (ActivityResult, ClassifierState) {
        self.decide(MotionSummary::measure(mask, zones), state)
    }

    /// Decision step on already-measured motion.
    pub fn decide(
        &self,
        motion: MotionSummary,
        state: ClassifierState,
    ) -> (ActivityResult, ClassifierState) {
        let movement = self.movement_threshold.max(1) as f32;

        let no_movement_frames = if motion.total < self.movement_threshold as u64 {
            state.no_movement_frames.saturating_add(1)
        } else {
            0
        };

        // Every rule is evaluated so the score map covers all of them; priority
        // alone picks the winner.
        let rules = [
            (
                ActivityLabel::Resting,
                no_movement_frames >= self.resting_threshold,
                margin_confidence(
                    no_movement_frames as f32,
                    self.resting_threshold.max(1) as f32,
                ),
            ),
            rule(ActivityLabel::RunningOnWheel, motion.wheel, WHEEL_SHARE * movement),
            rule(ActivityLabel::Eating, motion.food, FOOD_SHARE * movement),
            rule(ActivityLabel::DrinkingWater, motion.water, WATER_SHARE * movement),
            rule(ActivityLabel::Exploring, motion.total, movement),
        ];

        let mut scores: BTreeMap<ActivityLabel, f32> = rules
            .iter()
            .map(|&(label, fired, confidence)| (label, if fired { confidence } else { 0.0 }))
            .collect();

        let (label, confidence) = match rules.iter().find(|(_, fired, _)| *fired) {
            Some(&(label, _, confidence)) => (label, confidence),
            None => {
                scores.insert(state.previous, HOLD_CONFIDENCE);
                (state.previous, HOLD_CONFIDENCE)
            }
        };

        let next = ClassifierState {
            no_movement_frames,
            previous: label,
        };
        (ActivityResult::new(label, confidence, scores), next)
    }
}

fn rule(label: ActivityLabel, value: u64, threshold: f32) -> (ActivityLabel, bool, f32) {
    let value = value as f32;
    (label, value > threshold, margin_confidence(value, threshold))
}

/// 0.5 at the threshold, rising linearly to 1.0 at twice the threshold.
fn margin_confidence(value: f32, threshold: f32) -> f32 {
    if threshold <= 0.0 {
        return 1.0;
    }
    clamp_unit(0.5 + 0.5 * (value - threshold) / threshold)
}
