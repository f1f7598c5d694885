//! Synthetic cage scene for `stub://` cameras.
//!
//! A bright square (the animal) on a flat grey floor, moved through the
//! default cage zones by a repeating script. Positions are laid out for a
//! 640x480 view and scaled to the configured resolution.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::{CameraId, Frame, PixelFormat};

use super::{CameraSettings, FrameSource, SourceStats};

const FLOOR: u8 = 90;
const ANIMAL: u8 = 220;
const ANIMAL_SIZE: f32 = 48.0;
const REFERENCE_WIDTH: f32 = 640.0;
const REFERENCE_HEIGHT: f32 = 480.0;

/// What the animal is doing during one stretch of the script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneKind {
    /// Not moving, outside every zone.
    Still,
    Wheel,
    Food,
    Water,
    /// Moving along the floor outside every zone.
    Roam,
}

impl SceneKind {
    fn parse(raw: &str) -> Option<SceneKind> {
        match raw {
            "still" | "resting" => Some(SceneKind::Still),
            "wheel" => Some(SceneKind::Wheel),
            "food" | "eating" => Some(SceneKind::Food),
            "water" | "drinking" => Some(SceneKind::Water),
            "roam" | "exploring" => Some(SceneKind::Roam),
            _ => None,
        }
    }

    /// Top-left corners at 640x480, visited one per frame in order.
    fn path(self) -> &'static [(f32, f32)] {
        match self {
            SceneKind::Still => &[(300.0, 200.0)],
            SceneKind::Wheel => &[(90.0, 120.0), (150.0, 120.0), (150.0, 180.0), (90.0, 180.0)],
            SceneKind::Food => &[(405.0, 325.0), (465.0, 325.0), (465.0, 385.0), (405.0, 385.0)],
            SceneKind::Water => &[(556.0, 70.0), (556.0, 130.0)],
            SceneKind::Roam => &[(40.0, 400.0), (110.0, 400.0), (180.0, 400.0), (250.0, 400.0)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scene {
    pub kind: SceneKind,
    pub frames: u32,
}

impl Scene {
    pub const fn new(kind: SceneKind, frames: u32) -> Self {
        Self { kind, frames }
    }
}

/// Script used when the URL does not pin a scene.
pub const DEFAULT_SCRIPT: [Scene; 5] = [
    Scene::new(SceneKind::Still, 60),
    Scene::new(SceneKind::Wheel, 90),
    Scene::new(SceneKind::Roam, 45),
    Scene::new(SceneKind::Food, 60),
    Scene::new(SceneKind::Water, 45),
];

pub struct SyntheticSource {
    camera: CameraId,
    url: String,
    width: u32,
    height: u32,
    script: Vec<Scene>,
    frame_limit: Option<u64>,
    interval: Option<Duration>,
    next_due: Option<Instant>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(camera: CameraId, width: u32, height: u32, script: Vec<Scene>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic camera {} needs non-zero dimensions", camera));
        }
        let script: Vec<Scene> = script.into_iter().filter(|s| s.frames > 0).collect();
        if script.is_empty() {
            return Err(anyhow!("synthetic camera {} has an empty script", camera));
        }
        Ok(Self {
            url: format!("stub://{}", camera),
            camera,
            width,
            height,
            script,
            frame_limit: None,
            interval: None,
            next_due: None,
            frame_count: 0,
        })
    }

    /// Build from camera settings, honouring `frames`, `scene` and `realtime`
    /// query parameters on the URL.
    pub fn from_settings(settings: &CameraSettings) -> Result<Self> {
        let parsed = url::Url::parse(&settings.url)
            .map_err(|e| anyhow!("invalid camera url {}: {}", settings.url, e))?;
        let mut script = DEFAULT_SCRIPT.to_vec();
        let mut frame_limit = None;
        let mut realtime = true;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "frames" => {
                    frame_limit = Some(value.parse::<u64>().map_err(|_| {
                        anyhow!("camera {}: frames must be an integer, got {:?}", settings.id, value)
                    })?);
                }
                "scene" => {
                    let kind = SceneKind::parse(&value)
                        .ok_or_else(|| anyhow!("camera {}: unknown scene {:?}", settings.id, value))?;
                    script = vec![Scene::new(kind, u32::MAX)];
                }
                "realtime" => realtime = !matches!(value.as_ref(), "0" | "false" | "no"),
                other => log::warn!("camera {}: ignoring url parameter {:?}", settings.id, other),
            }
        }

        let mut source = Self::new(settings.camera_id(), settings.width, settings.height, script)?;
        source.url = settings.url.clone();
        source.frame_limit = frame_limit;
        if realtime && settings.fps > 0 {
            source.interval = Some(Duration::from_secs(1) / settings.fps);
        }
        Ok(source)
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Scene active for the zero-based frame `index`.
    pub fn scene_at(&self, index: u64) -> SceneKind {
        let cycle: u64 = self.script.iter().map(|s| s.frames as u64).sum();
        let mut offset = index % cycle.max(1);
        for scene in &self.script {
            if offset < scene.frames as u64 {
                return scene.kind;
            }
            offset -= scene.frames as u64;
        }
        self.script[0].kind
    }

    /// Top-left corner and side of the animal in frame `index`.
    pub fn animal_at(&self, index: u64) -> (u32, u32, u32) {
        let sx = self.width as f32 / REFERENCE_WIDTH;
        let sy = self.height as f32 / REFERENCE_HEIGHT;
        let size = (ANIMAL_SIZE * sx.min(sy)).max(2.0) as u32;
        let path = self.scene_at(index).path();
        let (x, y) = path[(index % path.len() as u64) as usize];
        let x = ((x * sx) as u32).min(self.width.saturating_sub(size));
        let y = ((y * sy) as u32).min(self.height.saturating_sub(size));
        (x, y, size)
    }

    fn pace(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (ax, ay, size) = self.animal_at(index);
        let mut pixels = vec![FLOOR; self.width as usize * self.height as usize * 3];
        for y in ay..(ay + size).min(self.height) {
            let row = (y * self.width) as usize * 3;
            let start = row + ax as usize * 3;
            let end = row + (ax + size).min(self.width) as usize * 3;
            pixels[start..end].fill(ANIMAL);
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn camera(&self) -> &CameraId {
        &self.camera
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.pace();

        let index = self.frame_count;
        let pixels = self.render(index);
        self.frame_count += 1;
        Frame::new(
            self.camera.clone(),
            self.frame_count,
            self.width,
            self.height,
            PixelFormat::Rgb8,
            pixels,
        )
        .map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            errors: 0,
            url: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::LocalClassifier;
    use crate::detect::{ActivityLabel, ZoneKind, ZoneSet};
    use crate::motion::Rect;

    fn scene_source(kind: SceneKind) -> SyntheticSource {
        SyntheticSource::new(CameraId::new("cam0"), 640, 480, vec![Scene::new(kind, 1000)]).unwrap()
    }

    fn zone_rect(kind: ZoneKind) -> Rect {
        ZoneSet::default()
            .iter()
            .find(|z| z.kind == kind)
            .map(|z| z.rect)
            .unwrap()
    }

    fn inside(rect: Rect, (x, y, size): (u32, u32, u32)) -> bool {
        x >= rect.x1 && y >= rect.y1 && x + size <= rect.x2 && y + size <= rect.y2
    }

    #[test]
    fn animal_stays_inside_its_zone() {
        for (kind, zone) in [
            (SceneKind::Wheel, ZoneKind::Wheel),
            (SceneKind::Food, ZoneKind::Food),
            (SceneKind::Water, ZoneKind::Water),
        ] {
            let source = scene_source(kind);
            for index in 0..8 {
                assert!(inside(zone_rect(zone), source.animal_at(index)), "{:?} {}", kind, index);
            }
        }
    }

    #[test]
    fn frames_have_configured_shape_and_sequence() -> Result<()> {
        let mut source = SyntheticSource::new(CameraId::new("cam0"), 64, 48, DEFAULT_SCRIPT.to_vec())?
            .with_frame_limit(3);
        let first = source.next_frame()?.unwrap();
        assert_eq!((first.width, first.height), (64, 48));
        assert_eq!(first.sequence, 1);
        assert_eq!(first.format(), PixelFormat::Rgb8);
        assert_eq!(source.next_frame()?.unwrap().sequence, 2);
        assert_eq!(source.next_frame()?.unwrap().sequence, 3);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn script_cycles() {
        let source = SyntheticSource::new(
            CameraId::new("cam0"),
            64,
            48,
            vec![Scene::new(SceneKind::Still, 2), Scene::new(SceneKind::Wheel, 3)],
        )
        .unwrap();
        let kinds: Vec<_> = (0..6).map(|i| source.scene_at(i)).collect();
        assert_eq!(
            kinds,
            vec![
                SceneKind::Still,
                SceneKind::Still,
                SceneKind::Wheel,
                SceneKind::Wheel,
                SceneKind::Wheel,
                SceneKind::Still
            ]
        );
    }

    #[test]
    fn scene_query_pins_script() -> Result<()> {
        let settings = CameraSettings {
            url: "stub://cage?scene=food&realtime=0".to_string(),
            ..CameraSettings::default()
        };
        let source = SyntheticSource::from_settings(&settings)?;
        assert_eq!(source.scene_at(0), SceneKind::Food);
        assert_eq!(source.scene_at(10_000), SceneKind::Food);

        let bad = CameraSettings {
            url: "stub://cage?scene=dancing".to_string(),
            ..CameraSettings::default()
        };
        assert!(SyntheticSource::from_settings(&bad).is_err());
        Ok(())
    }

    #[test]
    fn still_animal_reads_as_resting() -> Result<()> {
        let mut source = scene_source(SceneKind::Still).with_frame_limit(10);
        let mut classifier = LocalClassifier::default();
        let mut last = None;
        while let Some(frame) = source.next_frame()? {
            last = Some(classifier.classify_frame(&frame).label);
        }
        assert_eq!(last, Some(ActivityLabel::Resting));
        Ok(())
    }

    #[test]
    fn wheel_scene_reads_as_running() -> Result<()> {
        let mut source = scene_source(SceneKind::Wheel).with_frame_limit(40);
        let mut classifier = LocalClassifier::default();
        let mut labels = Vec::new();
        while let Some(frame) = source.next_frame()? {
            labels.push(classifier.classify_frame(&frame).label);
        }
        assert!(labels[1..].iter().all(|&l| l == ActivityLabel::RunningOnWheel), "{:?}", labels);
        Ok(())
    }
}
