//! Sliding-window activity statistics.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::detect::{ActivityLabel, ActivityResult};

/// Default number of results retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Averaged score per activity over the retained window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActivityPattern(BTreeMap<ActivityLabel, f32>);

impl ActivityPattern {
    pub fn get(&self, label: ActivityLabel) -> f32 {
        self.0.get(&label).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActivityLabel, f32)> + '_ {
        self.0.iter().map(|(&label, &score)| (label, score))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Activity with the highest average, if any average is non-zero.
    pub fn dominant(&self) -> Option<ActivityLabel> {
        self.iter()
            .filter(|(_, score)| *score > 0.0)
            .fold(None, |best: Option<(ActivityLabel, f32)>, (label, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((label, score)),
            })
            .map(|(label, _)| label)
    }
}

/// Fixed-capacity FIFO of classification results.
///
/// Recording past capacity evicts the oldest entry. No background work: the
/// window only changes when `record` is called.
#[derive(Clone, Debug)]
pub struct ActivityHistory {
    entries: VecDeque<ActivityResult>,
    capacity: usize,
}

impl ActivityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change capacity, dropping the oldest entries if the window shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn record(&mut self, result: ActivityResult) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    /// Oldest retained result.
    pub fn oldest(&self) -> Option<&ActivityResult> {
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&ActivityResult> {
        self.entries.back()
    }

    /// Mean score of every activity across the window; 0.0 for all when empty.
    pub fn snapshot(&self) -> ActivityPattern {
        let count = self.entries.len();
        let pattern = ActivityLabel::ACTIVITIES
            .iter()
            .map(|&label| {
                let average = if count == 0 {
                    0.0
                } else {
                    self.entries.iter().map(|r| r.score(label)).sum::<f32>() / count as f32
                };
                (label, average)
            })
            .collect();
        ActivityPattern(pattern)
    }
}

impl Default for ActivityHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(label: ActivityLabel, score: f32) -> ActivityResult {
        let mut scores = BTreeMap::new();
        scores.insert(label, score);
        ActivityResult::new(label, score, scores)
    }

    #[test]
    fn empty_history_reports_zero_for_every_activity() {
        let history = ActivityHistory::default();
        let pattern = history.snapshot();
        assert_eq!(pattern.len(), ActivityLabel::ACTIVITIES.len());
        assert!(pattern.iter().all(|(_, score)| score == 0.0));
        assert_eq!(pattern.dominant(), None);
    }

    #[test]
    fn averages_over_retained_results() {
        let mut history = ActivityHistory::default();
        history.record(result(ActivityLabel::Eating, 0.9));
        history.record(result(ActivityLabel::Eating, 0.5));
        history.record(result(ActivityLabel::Exploring, 0.6));
        history.record(result(ActivityLabel::Resting, 0.0));

        let pattern = history.snapshot();
        assert_eq!(pattern.len(), 5);
        assert!((pattern.get(ActivityLabel::Eating) - 0.35).abs() < 1e-6);
        assert!((pattern.get(ActivityLabel::Exploring) - 0.15).abs() < 1e-6);
        assert_eq!(pattern.get(ActivityLabel::DrinkingWater), 0.0);
        assert_eq!(pattern.dominant(), Some(ActivityLabel::Eating));
    }

    #[test]
    fn thirty_first_record_evicts_oldest() {
        let mut history = ActivityHistory::default();
        history.record(result(ActivityLabel::RunningOnWheel, 1.0));
        for _ in 0..29 {
            history.record(result(ActivityLabel::Resting, 1.0));
        }
        assert_eq!(history.len(), 30);
        assert_eq!(history.oldest().unwrap().label, ActivityLabel::RunningOnWheel);

        history.record(result(ActivityLabel::Eating, 1.0));
        assert_eq!(history.len(), 30);
        assert_eq!(history.oldest().unwrap().label, ActivityLabel::Resting);
        assert_eq!(history.latest().unwrap().label, ActivityLabel::Eating);

        let pattern = history.snapshot();
        assert_eq!(pattern.get(ActivityLabel::RunningOnWheel), 0.0);
        assert!((pattern.get(ActivityLabel::Resting) - 29.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn averages_never_exceed_max_score() {
        let mut history = ActivityHistory::new(30);
        for n in 1..=30 {
            history.record(result(ActivityLabel::Exploring, 1.0));
            let pattern = history.snapshot();
            assert_eq!(pattern.len(), 5);
            assert!(pattern.get(ActivityLabel::Exploring) <= 1.0);
            assert_eq!(history.len(), n);
        }
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut history = ActivityHistory::new(5);
        for label in ActivityLabel::ACTIVITIES {
            history.record(result(label, 1.0));
        }
        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.oldest().unwrap().label, ActivityLabel::DrinkingWater);
    }
}
