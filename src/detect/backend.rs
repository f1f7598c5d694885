use crate::frame::Frame;

use super::result::ActivityResult;

/// Why a classifier call produced no result.
///
/// Every variant counts as a failure for the circuit breaker.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("service returned HTTP {0}")]
    Status(u16),

    /// The body could not be parsed or lacked required fields.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The frame could not be encoded for submission.
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Something that turns a frame into an activity result.
///
/// Implementations may keep per-stream state, so `classify` takes `&mut self`
/// and a classifier instance must only ever see frames from one camera.
pub trait ActivityClassifier: Send {
    /// Backend identifier for logs and status.
    fn name(&self) -> &'static str;

    fn classify(&mut self, frame: &Frame) -> Result<ActivityResult, ClassifyError>;
}

impl<C: ActivityClassifier + ?Sized> ActivityClassifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn classify(&mut self, frame: &Frame) -> Result<ActivityResult, ClassifyError> {
        (**self).classify(frame)
    }
}
