use serde::{Deserialize, Serialize};

use crate::frame::Frame;

use super::backend::ActivityClassifier;
use super::backends::LocalClassifier;
use super::breaker::{BreakerStatus, CircuitBreaker, Transition};
use super::result::ActivityResult;
use super::zone_motion::ZoneMotionClassifier;
use super::zones::ZoneSet;

/// Default number of open-circuit calls between remote probes.
pub const DEFAULT_PROBE_EVERY: u32 = 10;

/// What the gateway does with frames while the breaker is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenCircuitPolicy {
    /// Keep calling the remote on every frame and report `Unavailable` while it fails.
    #[default]
    ReportUnavailable,
    /// Classify locally and only probe the remote every `probe_every` frames.
    LocalFallback,
}

/// Path that produced the most recent result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Remote,
    Local,
    Degraded,
}

/// Delegation boundary between the pipeline and its classifiers.
///
/// Prefers the remote delegate when one is configured and tracks its failures
/// with a [`CircuitBreaker`]. The local classifier is always available through
/// [`ClassifierGateway::classify_local`].
pub struct ClassifierGateway {
    remote: Option<Box<dyn ActivityClassifier>>,
    local: LocalClassifier,
    breaker: CircuitBreaker,
    policy: OpenCircuitPolicy,
    probe_every: u32,
    calls_while_open: u32,
    last_route: Option<Route>,
}

impl ClassifierGateway {
    /// Gateway that never leaves the device.
    pub fn local_only(local: LocalClassifier) -> Self {
        Self {
            remote: None,
            local,
            breaker: CircuitBreaker::default(),
            policy: OpenCircuitPolicy::default(),
            probe_every: DEFAULT_PROBE_EVERY,
            calls_while_open: 0,
            last_route: None,
        }
    }

    pub fn with_remote<C: ActivityClassifier + 'static>(mut self, remote: C) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }

    pub fn with_policy(mut self, policy: OpenCircuitPolicy, probe_every: u32) -> Self {
        self.policy = policy;
        self.probe_every = probe_every.max(1);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker = CircuitBreaker::new(threshold);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn policy(&self) -> OpenCircuitPolicy {
        self.policy
    }

    pub fn breaker(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn last_route(&self) -> Option<Route> {
        self.last_route
    }

    /// Apply new thresholds and zones without losing stream or breaker state.
    pub fn reconfigure(&mut self, rules: ZoneMotionClassifier, zones: ZoneSet, failure_threshold: u32) {
        self.local.reconfigure(rules, zones);
        if self.breaker.threshold() != failure_threshold {
            let transition = self.breaker.set_threshold(failure_threshold);
            self.log_transition(transition);
        }
    }

    /// Run the local classifier directly, whatever the breaker says.
    ///
    /// For callers that bypass [`ClassifierGateway::classify`]; a frame passed
    /// to both is learned twice.
    pub fn classify_local(&mut self, frame: &Frame) -> ActivityResult {
        self.last_route = Some(Route::Local);
        self.local.classify_frame(frame)
    }

    /// Classify one frame according to the configured policy.
    ///
    /// Every frame goes through the local classifier first, so its background
    /// and stream state are current whenever a fallback is needed. A remote
    /// success is adopted verbatim and resets the breaker. A remote failure
    /// counts against the breaker and yields `Unavailable`, unless the policy
    /// is `LocalFallback` and the breaker is open.
    pub fn classify(&mut self, frame: &Frame) -> ActivityResult {
        let local = self.local.classify_frame(frame);
        if self.remote.is_none() {
            self.last_route = Some(Route::Local);
            return local;
        }

        if self.breaker.is_open() && self.policy == OpenCircuitPolicy::LocalFallback {
            self.calls_while_open = self.calls_while_open.wrapping_add(1);
            if self.calls_while_open % self.probe_every != 0 {
                self.last_route = Some(Route::Local);
                return local;
            }
            log::debug!("probing remote classifier while circuit is open");
        }

        let outcome = match self.remote.as_mut() {
            Some(remote) => remote.classify(frame),
            None => {
                self.last_route = Some(Route::Local);
                return local;
            }
        };

        match outcome {
            Ok(result) => {
                let transition = self.breaker.record_success();
                self.log_transition(transition);
                self.last_route = Some(Route::Remote);
                result
            }
            Err(err) => {
                log::warn!(
                    "remote classification of frame {} failed: {}",
                    frame.sequence,
                    err
                );
                let transition = self.breaker.record_failure();
                self.log_transition(transition);
                if self.breaker.is_open() && self.policy == OpenCircuitPolicy::LocalFallback {
                    self.last_route = Some(Route::Local);
                    return local;
                }
                self.last_route = Some(Route::Degraded);
                ActivityResult::unavailable()
            }
        }
    }

    /// The on-device classifier.
    pub fn local(&self) -> &LocalClassifier {
        &self.local
    }

    fn log_transition(&mut self, transition: Transition) {
        match transition {
            Transition::Opened => {
                self.calls_while_open = 0;
                log::warn!(
                    "classifier circuit opened after {} consecutive failures (policy {:?})",
                    self.breaker.consecutive_failures(),
                    self.policy
                );
            }
            Transition::Closed => {
                self.calls_while_open = 0;
                log::info!("classifier circuit closed; remote classifier reachable again");
            }
            Transition::Unchanged => {}
        }
    }
}
