//! Activity inference.
//!
//! - `ZoneMotionClassifier`: priority-ordered rules over a motion mask and cage zones.
//! - `ActivityClassifier`: seam implemented by the local and remote backends.
//! - `ClassifierGateway`: remote delegation guarded by a `CircuitBreaker`.

mod backend;
pub mod backends;
mod breaker;
mod gateway;
mod result;
mod zone_motion;
mod zones;

pub use backend::{ActivityClassifier, ClassifyError};
pub use backends::{LocalClassifier, RemoteClassifier, RemoteConfig, StubClassifier, StubOutcome};
pub use breaker::{BreakerStatus, CircuitBreaker, Transition, DEFAULT_FAILURE_THRESHOLD};
pub use gateway::{ClassifierGateway, OpenCircuitPolicy, Route, DEFAULT_PROBE_EVERY};
pub use result::{ActivityLabel, ActivityResult};
pub use zone_motion::{ClassifierState, MotionSummary, ZoneMotionClassifier, HOLD_CONFIDENCE};
pub use zones::{Zone, ZoneKind, ZoneSet};
