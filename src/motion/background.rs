use serde::{Deserialize, Serialize};

use super::mask::{MotionMask, FOREGROUND};
use crate::frame::LumaPlane;

/// Lighting regime of the most recent frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingMode {
    Normal,
    LowLight,
}

/// Tuning for [`BackgroundModel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    /// Effective history length in frames; the learning rate is `1 / history`.
    pub history: u32,
    /// Mean luminance (0..255) below which a frame is treated as low-light.
    pub low_light_luminance: f32,
    /// Squared-distance threshold (in variances) for foreground, normal light.
    pub var_threshold: f32,
    /// Squared-distance threshold for foreground in low light.
    pub var_threshold_low_light: f32,
    /// Subtraction results with fewer changed pixels fall back to frame differencing.
    pub min_changed_pixels: u64,
    pub diff_cutoff: u8,
    pub diff_cutoff_low_light: u8,
    /// Square kernel size for the open/close pass.
    pub kernel: u32,
    pub kernel_low_light: u32,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            history: 500,
            low_light_luminance: 50.0,
            var_threshold: 16.0,
            var_threshold_low_light: 32.0,
            min_changed_pixels: 100,
            diff_cutoff: 30,
            diff_cutoff_low_light: 25,
            kernel: 5,
            kernel_low_light: 3,
        }
    }
}

impl BackgroundSettings {
    pub fn lighting_for(&self, plane: &LumaPlane) -> LightingMode {
        if plane.mean() < self.low_light_luminance {
            LightingMode::LowLight
        } else {
            LightingMode::Normal
        }
    }

    fn var_threshold_for(&self, mode: LightingMode) -> f32 {
        match mode {
            LightingMode::Normal => self.var_threshold,
            LightingMode::LowLight => self.var_threshold_low_light,
        }
    }

    fn diff_cutoff_for(&self, mode: LightingMode) -> u8 {
        match mode {
            LightingMode::Normal => self.diff_cutoff,
            LightingMode::LowLight => self.diff_cutoff_low_light,
        }
    }

    fn kernel_for(&self, mode: LightingMode) -> u32 {
        match mode {
            LightingMode::Normal => self.kernel,
            LightingMode::LowLight => self.kernel_low_light,
        }
    }
}

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

/// Adaptive per-camera background estimator.
///
/// Keeps a running mean and variance per pixel. Owned by the single worker that
/// processes one camera's stream; never shared across cameras.
pub struct BackgroundModel {
    settings: BackgroundSettings,
    mean: Vec<f32>,
    variance: Vec<f32>,
    width: u32,
    height: u32,
    frames_seen: u64,
    previous: Option<LumaPlane>,
    lighting: LightingMode,
}

impl BackgroundModel {
    pub fn new(settings: BackgroundSettings) -> Self {
        Self {
            settings,
            mean: Vec::new(),
            variance: Vec::new(),
            width: 0,
            height: 0,
            frames_seen: 0,
            previous: None,
            lighting: LightingMode::Normal,
        }
    }

    pub fn settings(&self) -> &BackgroundSettings {
        &self.settings
    }

    /// Lighting mode chosen for the most recent frame.
    pub fn lighting(&self) -> LightingMode {
        self.lighting
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Forget everything learned so far.
    pub fn reset(&mut self) {
        self.mean.clear();
        self.variance.clear();
        self.width = 0;
        self.height = 0;
        self.frames_seen = 0;
        self.previous = None;
    }

    /// Feed one frame and return its denoised motion mask.
    ///
    /// The first frame (and the first after a resolution change) only seeds the
    /// model and yields an empty mask.
    pub fn update(&mut self, plane: &LumaPlane) -> MotionMask {
        if plane.width != self.width || plane.height != self.height {
            if self.frames_seen > 0 {
                log::info!(
                    "background model reset: {}x{} -> {}x{}",
                    self.width,
                    self.height,
                    plane.width,
                    plane.height
                );
            }
            self.reset();
        }

        let mode = self.settings.lighting_for(plane);
        self.lighting = mode;

        if self.frames_seen == 0 {
            self.seed(plane);
            return MotionMask::empty(plane.width, plane.height);
        }

        let mut mask = self.subtract(plane, mode);
        if mask.count_nonzero() < self.settings.min_changed_pixels {
            if let Some(previous) = self.previous.as_ref().filter(|p| p.same_shape(plane)) {
                mask = frame_difference(previous, plane, self.settings.diff_cutoff_for(mode));
            }
        }

        self.previous = Some(plane.clone());
        self.frames_seen += 1;

        let kernel = self.settings.kernel_for(mode);
        mask.open(kernel).close(kernel)
    }

    fn seed(&mut self, plane: &LumaPlane) {
        self.width = plane.width;
        self.height = plane.height;
        self.mean = plane.data.iter().map(|&p| p as f32).collect();
        self.variance = vec![VAR_INIT; plane.data.len()];
        self.previous = Some(plane.clone());
        self.frames_seen = 1;
    }

    // Classify each pixel against the current model, then fold it into the model.
    fn subtract(&mut self, plane: &LumaPlane, mode: LightingMode) -> MotionMask {
        // Faster learning while the model is young, settling at 1 / history.
        let history = self.settings.history.max(1) as f32;
        let alpha = (1.0 / (self.frames_seen as f32 + 1.0)).max(1.0 / history);
        let threshold = self.settings.var_threshold_for(mode);

        let mut raw = vec![0u8; plane.data.len()];
        for (i, &pixel) in plane.data.iter().enumerate() {
            let diff = pixel as f32 - self.mean[i];
            let dist2 = diff * diff;
            if dist2 > threshold * self.variance[i] {
                raw[i] = FOREGROUND;
            }
            self.mean[i] += alpha * diff;
            self.variance[i] = (self.variance[i] + alpha * (dist2 - self.variance[i]))
                .clamp(VAR_MIN, VAR_MAX);
        }

        MotionMask::from_raw(plane.width, plane.height, raw)
            .unwrap_or_else(|| MotionMask::empty(plane.width, plane.height))
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new(BackgroundSettings::default())
    }
}

/// Absolute per-pixel difference between two planes, thresholded at `cutoff`.
pub fn frame_difference(previous: &LumaPlane, current: &LumaPlane, cutoff: u8) -> MotionMask {
    let raw = previous
        .data
        .iter()
        .zip(&current.data)
        .map(|(&a, &b)| if a.abs_diff(b) > cutoff { FOREGROUND } else { 0 })
        .collect();
    MotionMask::from_raw(current.width, current.height, raw)
        .unwrap_or_else(|| MotionMask::empty(current.width, current.height))
}
