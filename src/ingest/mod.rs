//! Frame ingestion sources.
//!
//! Every camera is opened from its configured URL:
//! - `stub://<name>[?frames=N&scene=wheel&realtime=0]` synthetic cage scene
//! - `file:///dir` or a bare path: a directory of still images, replayed in name order
//!
//! Sources run on the camera's capture thread and hand frames to the broker;
//! they never block on classification.

pub mod image_dir;
pub mod synthetic;

pub use image_dir::ImageDirSource;
pub use synthetic::{Scene, SceneKind, SyntheticSource};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::frame::{CameraId, Frame};

/// One camera as configured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub id: String,
    pub url: String,
    /// Frame width for synthetic sources.
    pub width: u32,
    /// Frame height for synthetic sources.
    pub height: u32,
    /// Nominal capture rate.
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            id: "cage".to_string(),
            url: "stub://cage".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CameraSettings {
    pub fn camera_id(&self) -> CameraId {
        CameraId::new(&self.id)
    }
}

/// A stream of frames from one camera.
pub trait FrameSource: Send {
    fn camera(&self) -> &CameraId;

    /// Next frame. `Ok(None)` is end of stream; `Err` is a transient failure
    /// and the caller may try again.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn camera(&self) -> &CameraId {
        (**self).camera()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub errors: u64,
    pub url: String,
}

/// Source chosen from a camera URL.
pub struct CameraSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    ImageDir(ImageDirSource),
}

impl CameraSource {
    pub fn open(settings: &CameraSettings) -> Result<Self> {
        let url = settings.url.trim();
        if url.is_empty() {
            return Err(anyhow!("camera {} has no url", settings.id));
        }
        let backend = if url.starts_with("stub://") {
            SourceBackend::Synthetic(SyntheticSource::from_settings(settings)?)
        } else {
            SourceBackend::ImageDir(ImageDirSource::open(
                settings.camera_id(),
                local_dir(url)?,
            )?)
        };
        log::info!("camera {}: opened {}", settings.id, url);
        Ok(Self { backend })
    }
}

impl FrameSource for CameraSource {
    fn camera(&self) -> &CameraId {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.camera(),
            SourceBackend::ImageDir(source) => source.camera(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            SourceBackend::ImageDir(source) => source.next_frame(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            SourceBackend::ImageDir(source) => source.stats(),
        }
    }
}

fn local_dir(raw: &str) -> Result<PathBuf> {
    if !raw.contains("://") {
        return Ok(PathBuf::from(raw));
    }
    let parsed = url::Url::parse(raw).map_err(|e| anyhow!("invalid camera url {}: {}", raw, e))?;
    if parsed.scheme() != "file" {
        return Err(anyhow!(
            "unsupported camera url scheme {:?} (expected stub:// or file://)",
            parsed.scheme()
        ));
    }
    parsed
        .to_file_path()
        .map_err(|_| anyhow!("camera url {} is not a local path", raw))
}
