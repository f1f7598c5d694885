use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::broker::{DEFAULT_FRAME_STRIDE, DEFAULT_QUEUE_CAPACITY};
use crate::detect::backends::remote::validate_endpoint;
use crate::detect::{
    OpenCircuitPolicy, RemoteConfig, ZoneMotionClassifier, ZoneSet, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_PROBE_EVERY,
};
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::ingest::CameraSettings;
use crate::motion::BackgroundSettings;
use crate::sensors::SensorSettings;

const DEFAULT_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    cameras: Option<Vec<CameraSettings>>,
    primary_camera: Option<String>,
    classifier: Option<ClassifierSettings>,
    pipeline: Option<PipelineConfig>,
    background: Option<BackgroundSettings>,
    sensors: Option<SensorSettings>,
}

/// Everything the monitor daemon needs at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub cameras: Vec<CameraSettings>,
    /// Camera whose frames are classified.
    pub primary_camera: String,
    pub classifier: ClassifierSettings,
    pub pipeline: PipelineConfig,
    pub background: BackgroundSettings,
    pub sensors: SensorSettings,
}

/// Remote delegation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Inference endpoint. `None` keeps classification on-device.
    pub remote_url: Option<String>,
    pub timeout_ms: u64,
    pub open_policy: OpenCircuitPolicy,
    /// Open-circuit calls between probes under `local_fallback`.
    pub probe_every: u32,
    pub jpeg_quality: u8,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            open_policy: OpenCircuitPolicy::default(),
            probe_every: DEFAULT_PROBE_EVERY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ClassifierSettings {
    pub fn remote_config(&self) -> Option<RemoteConfig> {
        self.remote_url.as_ref().map(|url| RemoteConfig {
            url: url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            jpeg_quality: self.jpeg_quality,
        })
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote_url {
            validate_endpoint(url)?;
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("classifier.timeout_ms must be greater than zero"));
        }
        if self.probe_every == 0 {
            return Err(anyhow!("classifier.probe_every must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("classifier.jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }
}

/// Settings the running pipeline re-reads for every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub zones: ZoneSet,
    /// Foreground pixels separating "still" from "moving".
    pub movement_threshold: u32,
    /// Consecutive still frames before resting.
    pub resting_threshold: u32,
    /// Keep one captured frame in this many.
    pub frame_stride: u32,
    pub queue_capacity: usize,
    /// Consecutive remote failures that open the breaker.
    pub failure_threshold: u32,
    pub history_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zones: ZoneSet::default(),
            movement_threshold: 1000,
            resting_threshold: 5,
            frame_stride: DEFAULT_FRAME_STRIDE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl PipelineConfig {
    pub fn rules(&self) -> ZoneMotionClassifier {
        ZoneMotionClassifier::new(self.movement_threshold, self.resting_threshold)
    }

    /// Check every field against a `width` x `height` frame.
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        self.zones.validate(width, height)?;
        for (name, value) in [
            ("movement_threshold", self.movement_threshold as u64),
            ("resting_threshold", self.resting_threshold as u64),
            ("frame_stride", self.frame_stride as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("failure_threshold", self.failure_threshold as u64),
            ("history_capacity", self.history_capacity as u64),
        ] {
            if value == 0 {
                return Err(anyhow!("pipeline.{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

impl MonitorConfig {
    /// Load from the file named by `CAGE_MONITOR_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAGE_MONITOR_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from `path` (or defaults), then apply environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults only, as if no file and no environment were present.
    pub fn defaults() -> Self {
        Self {
            cameras: vec![CameraSettings::default()],
            primary_camera: CameraSettings::default().id,
            classifier: ClassifierSettings::default(),
            pipeline: PipelineConfig::default(),
            background: BackgroundSettings::default(),
            sensors: SensorSettings::default(),
        }
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let cameras = file
            .cameras
            .filter(|cameras| !cameras.is_empty())
            .unwrap_or_else(|| vec![CameraSettings::default()]);
        let primary_camera = file
            .primary_camera
            .or_else(|| cameras.first().map(|camera| camera.id.clone()))
            .ok_or_else(|| anyhow!("no camera configured"))?;
        Ok(Self {
            cameras,
            primary_camera,
            classifier: file.classifier.unwrap_or_default(),
            pipeline: file.pipeline.unwrap_or_default(),
            background: file.background.unwrap_or_default(),
            sensors: file.sensors.unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAGE_MONITOR_REMOTE_URL") {
            let url = url.trim();
            self.classifier.remote_url = if url.is_empty() {
                None
            } else {
                Some(url.to_string())
            };
        }
        if let Ok(cameras) = std::env::var("CAGE_MONITOR_CAMERAS") {
            let urls = split_csv(&cameras);
            if !urls.is_empty() {
                let template = self.cameras.first().cloned().unwrap_or_default();
                self.cameras = urls
                    .into_iter()
                    .enumerate()
                    .map(|(index, url)| CameraSettings {
                        id: format!("cam{}", index),
                        url,
                        ..template.clone()
                    })
                    .collect();
                if !self.cameras.iter().any(|c| c.id == self.primary_camera) {
                    self.primary_camera = "cam0".to_string();
                }
            }
        }
        if let Ok(primary) = std::env::var("CAGE_MONITOR_PRIMARY_CAMERA") {
            if !primary.trim().is_empty() {
                self.primary_camera = primary.trim().to_string();
            }
        }
        if let Ok(stride) = std::env::var("CAGE_MONITOR_FRAME_STRIDE") {
            self.pipeline.frame_stride = stride
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAGE_MONITOR_FRAME_STRIDE must be a positive integer"))?;
        }
        if let Ok(interval) = std::env::var("CAGE_MONITOR_SENSOR_INTERVAL_MS") {
            self.sensors.interval_ms = interval.trim().parse().map_err(|_| {
                anyhow!("CAGE_MONITOR_SENSOR_INTERVAL_MS must be an integer number of milliseconds")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (index, camera) in self.cameras.iter().enumerate() {
            if camera.id.trim().is_empty() {
                return Err(anyhow!("camera #{} has an empty id", index));
            }
            if self.cameras[..index].iter().any(|other| other.id == camera.id) {
                return Err(anyhow!("camera id {} is configured twice", camera.id));
            }
            if camera.width == 0 || camera.height == 0 || camera.fps == 0 {
                return Err(anyhow!(
                    "camera {}: width, height and fps must be greater than zero",
                    camera.id
                ));
            }
        }
        let primary = self.primary()?;
        self.pipeline.validate(primary.width, primary.height)?;
        self.classifier.validate()?;

        if self.background.history == 0 {
            return Err(anyhow!("background.history must be greater than zero"));
        }
        if self.sensors.interval_ms == 0 {
            return Err(anyhow!("sensors.interval_ms must be greater than zero"));
        }
        if self.sensors.retry_attempts == 0 {
            return Err(anyhow!("sensors.retry_attempts must be greater than zero"));
        }
        Ok(())
    }

    /// Settings of the camera that feeds the classifier.
    pub fn primary(&self) -> Result<&CameraSettings> {
        self.cameras
            .iter()
            .find(|camera| camera.id == self.primary_camera)
            .ok_or_else(|| {
                anyhow!(
                    "primary camera {} is not among the configured cameras",
                    self.primary_camera
                )
            })
    }
}

/// Shared, hot-swappable pipeline configuration.
///
/// Readers take the current `Arc` once per unit of work; `replace` swaps the
/// whole value, so no reader ever observes a partial update.
pub struct ConfigHandle {
    current: RwLock<Arc<PipelineConfig>>,
    generation: AtomicU64,
    frame_width: u32,
    frame_height: u32,
}

impl ConfigHandle {
    /// `frame_width` x `frame_height` is the primary camera's frame, used to
    /// validate zones on every replace.
    pub fn new(config: PipelineConfig, frame_width: u32, frame_height: u32) -> Result<Self> {
        config.validate(frame_width, frame_height)?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            generation: AtomicU64::new(0),
            frame_width,
            frame_height,
        })
    }

    pub fn current(&self) -> Arc<PipelineConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bumped on every successful replace.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Validate and install `config`. An invalid config leaves the current one in place.
    pub fn replace(&self, config: PipelineConfig) -> Result<()> {
        config.validate(self.frame_width, self.frame_height)?;
        let next = Arc::new(config);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, next)
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        log::info!("pipeline configuration replaced");
        drop(previous);
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    parse_config(&raw, is_toml)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
}

fn parse_config(raw: &str, is_toml: bool) -> Result<MonitorConfigFile> {
    if is_toml {
        Ok(toml::from_str(raw)?)
    } else {
        Ok(serde_json::from_str(raw)?)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Zone, ZoneKind};
    use crate::motion::Rect;

    #[test]
    fn defaults_validate() {
        MonitorConfig::defaults().validate().unwrap();
    }

    #[test]
    fn toml_sections_fill_from_defaults() -> Result<()> {
        let raw = r#"
            primary_camera = "top"

            [[cameras]]
            id = "top"
            url = "stub://top"

            [[cameras]]
            id = "side"
            url = "file:///var/frames/side"
            width = 320
            height = 240

            [classifier]
            remote_url = "http://10.0.0.5:8081/process_frame"
            open_policy = "local_fallback"

            [pipeline]
            movement_threshold = 800
            zones = [
                { kind = "wheel", x1 = 0, y1 = 0, x2 = 100, y2 = 100 },
                { kind = "water", x1 = 500, y1 = 10, x2 = 600, y2 = 200 },
            ]

            [sensors]
            interval_ms = 5000
        "#;
        let cfg = MonitorConfig::from_file(parse_config(raw, true)?)?;
        cfg.validate()?;
        assert_eq!(cfg.cameras.len(), 2);
        assert_eq!(cfg.cameras[0].width, 640);
        assert_eq!(cfg.cameras[1].fps, 30);
        assert_eq!(cfg.primary()?.id, "top");
        assert_eq!(cfg.classifier.open_policy, OpenCircuitPolicy::LocalFallback);
        assert_eq!(cfg.classifier.timeout_ms, 2000);
        assert_eq!(cfg.pipeline.movement_threshold, 800);
        assert_eq!(cfg.pipeline.resting_threshold, 5);
        assert_eq!(cfg.pipeline.zones.len(), 2);
        assert_eq!(cfg.sensors.interval_ms, 5000);
        assert_eq!(cfg.sensors.retry_attempts, 3);
        Ok(())
    }

    #[test]
    fn zone_outside_frame_is_rejected() {
        let mut cfg = MonitorConfig::defaults();
        cfg.pipeline.zones = ZoneSet::new(vec![Zone::new(ZoneKind::Food, Rect::new(600, 400, 700, 470))]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let mut pipeline = PipelineConfig::default();
        pipeline.queue_capacity = 0;
        assert!(pipeline.validate(640, 480).is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.resting_threshold = 0;
        assert!(pipeline.validate(640, 480).is_err());
    }

    #[test]
    fn unknown_primary_camera_is_rejected() {
        let mut cfg = MonitorConfig::defaults();
        cfg.primary_camera = "missing".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_http_remote_is_rejected() {
        let mut cfg = MonitorConfig::defaults();
        cfg.classifier.remote_url = Some("ftp://10.0.0.5/model".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn remote_config_carries_timeout() {
        let settings = ClassifierSettings {
            remote_url: Some("http://127.0.0.1:8081/process_frame".to_string()),
            timeout_ms: 750,
            ..ClassifierSettings::default()
        };
        let remote = settings.remote_config().unwrap();
        assert_eq!(remote.timeout, Duration::from_millis(750));
        assert!(ClassifierSettings::default().remote_config().is_none());
    }

    #[test]
    fn replace_swaps_whole_config() -> Result<()> {
        let handle = ConfigHandle::new(PipelineConfig::default(), 640, 480)?;
        let before = handle.current();

        let next = PipelineConfig {
            movement_threshold: 2000,
            queue_capacity: 4,
            ..PipelineConfig::default()
        };
        handle.replace(next.clone())?;

        assert_eq!(*handle.current(), next);
        assert_eq!(before.movement_threshold, 1000);
        assert_eq!(handle.generation(), 1);
        Ok(())
    }

    #[test]
    fn invalid_replace_keeps_current() -> Result<()> {
        let handle = ConfigHandle::new(PipelineConfig::default(), 640, 480)?;
        let bad = PipelineConfig {
            frame_stride: 0,
            ..PipelineConfig::default()
        };
        assert!(handle.replace(bad).is_err());
        assert_eq!(*handle.current(), PipelineConfig::default());
        assert_eq!(handle.generation(), 0);
        Ok(())
    }
}
