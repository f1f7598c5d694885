use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::backend::{ActivityClassifier, ClassifyError};
use crate::detect::result::{ActivityLabel, ActivityResult};
use crate::frame::Frame;

/// Scripted outcome for [`StubClassifier`].
#[derive(Clone, Debug)]
pub enum StubOutcome {
    Succeed(ActivityResult),
    Fail,
}

impl StubOutcome {
    pub fn label(label: ActivityLabel, confidence: f32) -> Self {
        let mut scores = std::collections::BTreeMap::new();
        scores.insert(label, confidence);
        StubOutcome::Succeed(ActivityResult::new(label, confidence, scores))
    }
}

/// Stand-in for a remote service. Plays back a script, then repeats `fallback`.
///
/// Used by tests to script remote behaviour.
pub struct StubClassifier {
    script: VecDeque<StubOutcome>,
    fallback: StubOutcome,
    calls: Arc<AtomicU64>,
}

impl StubClassifier {
    pub fn new(script: Vec<StubOutcome>, fallback: StubOutcome) -> Self {
        Self {
            script: script.into(),
            fallback,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Always answers with `label`.
    pub fn always(label: ActivityLabel, confidence: f32) -> Self {
        Self::new(Vec::new(), StubOutcome::label(label, confidence))
    }

    /// Always fails as if the service were unreachable.
    pub fn unreachable() -> Self {
        Self::new(Vec::new(), StubOutcome::Fail)
    }

    /// Shared call counter, readable after the stub has been moved away.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl ActivityClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _frame: &Frame) -> Result<ActivityResult, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match outcome {
            StubOutcome::Succeed(result) => Ok(result),
            StubOutcome::Fail => Err(ClassifyError::Transport("stub: connection refused".into())),
        }
    }
}
