use crate::detect::backend::{ActivityClassifier, ClassifyError};
use crate::detect::result::ActivityResult;
use crate::detect::zone_motion::{ClassifierState, ZoneMotionClassifier};
use crate::detect::zones::ZoneSet;
use crate::frame::Frame;
use crate::motion::{BackgroundModel, BackgroundSettings, LightingMode};

/// On-device classifier: background subtraction followed by zone rules.
///
/// Holds the background model and classifier state of exactly one camera stream.
pub struct LocalClassifier {
    background: BackgroundModel,
    rules: ZoneMotionClassifier,
    zones: ZoneSet,
    state: ClassifierState,
}

impl LocalClassifier {
    pub fn new(rules: ZoneMotionClassifier, zones: ZoneSet, background: BackgroundSettings) -> Self {
        Self {
            background: BackgroundModel::new(background),
            rules,
            zones,
            state: ClassifierState::initial(),
        }
    }

    /// Swap thresholds and zones. Learned background and stream state are kept.
    pub fn reconfigure(&mut self, rules: ZoneMotionClassifier, zones: ZoneSet) {
        self.rules = rules;
        self.zones = zones;
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    pub fn background_settings(&self) -> &BackgroundSettings {
        self.background.settings()
    }

    pub fn lighting(&self) -> LightingMode {
        self.background.lighting()
    }

    /// Classify without the trait's error channel; the local path cannot fail.
    pub fn classify_frame(&mut self, frame: &Frame) -> ActivityResult {
        let mask = self.background.update(&frame.luma());
        let (result, next) = self.rules.classify(&mask, &self.zones, self.state);
        self.state = next;
        result
    }
}

impl Default for LocalClassifier {
    fn default() -> Self {
        Self::new(
            ZoneMotionClassifier::default(),
            ZoneSet::default(),
            BackgroundSettings::default(),
        )
    }
}

impl ActivityClassifier for LocalClassifier {
    fn name(&self) -> &'static str {
        "local"
    }

    fn classify(&mut self, frame: &Frame) -> Result<ActivityResult, ClassifyError> {
        Ok(self.classify_frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::ActivityLabel;
    use crate::detect::zones::{Zone, ZoneKind};
    use crate::frame::{CameraId, PixelFormat};
    use crate::motion::Rect;

    const W: u32 = 160;
    const H: u32 = 120;

    fn gray_frame(seq: u64, block: Option<Rect>) -> Frame {
        let mut pixels = vec![90u8; (W * H) as usize];
        if let Some(r) = block {
            for y in r.y1..r.y2 {
                for x in r.x1..r.x2 {
                    pixels[(y * W + x) as usize] = 240;
                }
            }
        }
        Frame::new(CameraId::new("cam0"), seq, W, H, PixelFormat::Luma8, pixels).unwrap()
    }

    fn classifier() -> LocalClassifier {
        let zones = ZoneSet::new(vec![
            Zone::new(ZoneKind::Wheel, Rect::new(0, 0, 60, 60)),
            Zone::new(ZoneKind::Food, Rect::new(100, 60, 160, 120)),
        ]);
        LocalClassifier::new(
            ZoneMotionClassifier::new(400, 3),
            zones,
            BackgroundSettings::default(),
        )
    }

    #[test]
    fn static_feed_settles_to_resting() {
        let mut local = classifier();
        let mut last = ActivityLabel::Unknown;
        for seq in 1..=4 {
            last = local.classify(&gray_frame(seq, None)).unwrap().label;
        }
        assert_eq!(last, ActivityLabel::Resting);
    }

    #[test]
    fn motion_on_wheel_is_running() {
        let mut local = classifier();
        for seq in 1..=5 {
            local.classify_frame(&gray_frame(seq, None));
        }
        let result = local.classify_frame(&gray_frame(6, Some(Rect::new(10, 10, 50, 50))));
        assert_eq!(result.label, ActivityLabel::RunningOnWheel);
        assert_eq!(local.state().no_movement_frames, 0);
    }

    #[test]
    fn reconfigure_keeps_stream_state() {
        let mut local = classifier();
        local.classify_frame(&gray_frame(1, None));
        local.classify_frame(&gray_frame(2, None));
        let before = local.state();
        local.reconfigure(ZoneMotionClassifier::new(400, 10), ZoneSet::default());
        assert_eq!(local.state(), before);
    }
}
