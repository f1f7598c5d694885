//! Foreground extraction.
//!
//! `BackgroundModel` turns successive luminance planes into a denoised binary
//! `MotionMask`. The zone classifier only ever sees the mask.

mod background;
mod mask;

pub use background::{frame_difference, BackgroundModel, BackgroundSettings, LightingMode};
pub use mask::{MotionMask, Rect, FOREGROUND};
