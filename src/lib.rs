//! Cage Monitor
//!
//! Watches a small-animal enclosure with one or more cameras and a set of
//! environmental sensors, and keeps a live estimate of what the animal is doing.
//!
//! # Architecture
//!
//! Capture never waits on inference:
//!
//! 1. **Capture**: one thread per camera pulls frames from its `FrameSource`.
//! 2. **Broker**: the primary camera's frames are sampled (every Nth frame) and
//!    handed to a bounded, drop-on-full queue.
//! 3. **Dispatch**: a single worker classifies each queued frame through the
//!    `ClassifierGateway`, which prefers a remote model and guards it with a
//!    circuit breaker, or falls back to on-device motion analysis.
//! 4. **History**: successful results feed a fixed window of averaged scores.
//! 5. **Sensors**: a poller reads temperature, humidity and air quality on a
//!    fixed period, retrying transient failures.
//!
//! Results are published through single-writer snapshot slots and read via
//! `StatusBoard`.
//!
//! # Module Structure
//!
//! - `frame`: captured frames and luminance planes
//! - `ingest`: frame sources (synthetic, image directories)
//! - `motion`: background subtraction and mask morphology
//! - `detect`: zone rules, classifier backends, breaker and gateway
//! - `broker`, `history`, `slot`, `shutdown`: pipeline plumbing
//! - `sensors`: environmental readings and the retrying poller
//! - `config`, `pipeline`, `status`: wiring and reporting

pub mod broker;
pub mod config;
pub mod detect;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod motion;
pub mod pipeline;
pub mod sensors;
pub mod shutdown;
pub mod slot;
pub mod status;

pub use broker::{BrokerStats, FrameBroker, SubmitOutcome};
pub use config::{ClassifierSettings, ConfigHandle, MonitorConfig, PipelineConfig};
pub use detect::{
    ActivityClassifier, ActivityLabel, ActivityResult, BreakerStatus, ClassifierGateway,
    ClassifyError, LocalClassifier, OpenCircuitPolicy, RemoteClassifier, RemoteConfig, Zone,
    ZoneKind, ZoneMotionClassifier, ZoneSet,
};
pub use frame::{CameraId, Frame, LumaPlane, PixelFormat};
pub use history::{ActivityHistory, ActivityPattern};
pub use ingest::{CameraSettings, CameraSource, FrameSource};
pub use motion::{BackgroundModel, BackgroundSettings, MotionMask, Rect};
pub use pipeline::{build_gateway, Monitor, MonitorBuilder, StatusBoard};
pub use sensors::{AirQuality, EnvironmentSensor, SensorPoller, SensorReading, SensorSettings};
pub use shutdown::ShutdownSignal;
pub use status::StatusReport;
