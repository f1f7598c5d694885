//! Replay of still images from a local directory.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::frame::{CameraId, Frame, PixelFormat};

use super::{FrameSource, SourceStats};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Frames read from `*.jpg`/`*.jpeg`/`*.png` files, in file-name order.
///
/// A file that fails to decode is reported once as an error and skipped on the
/// next call.
pub struct ImageDirSource {
    camera: CameraId,
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    frames_captured: u64,
    errors: u64,
}

impl ImageDirSource {
    pub fn open(camera: CameraId, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let files = list_images(&dir)?;
        if files.is_empty() {
            log::warn!("camera {}: no images in {}", camera, dir.display());
        }
        Ok(Self {
            camera,
            dir,
            files,
            position: 0,
            frames_captured: 0,
            errors: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of the file the next call will read.
    pub fn peek_path(&self) -> Option<&Path> {
        self.files.get(self.position).map(PathBuf::as_path)
    }

    fn decode(&self, path: &Path) -> Result<Frame> {
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        let captured_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let frame = Frame::new(
            self.camera.clone(),
            self.position as u64,
            width,
            height,
            PixelFormat::Rgb8,
            image.into_raw(),
        )?;
        Ok(frame.with_captured_at(captured_at))
    }
}

impl FrameSource for ImageDirSource {
    fn camera(&self) -> &CameraId {
        &self.camera
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position).cloned() else {
            return Ok(None);
        };
        self.position += 1;
        match self.decode(&path) {
            Ok(frame) => {
                self.frames_captured += 1;
                Ok(Some(frame))
            }
            Err(err) => {
                self.errors += 1;
                Err(err)
            }
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            errors: self.errors,
            url: format!("file://{}", self.dir.display()),
        }
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read image directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| anyhow!("list {}: {}", dir.display(), e))?
            .path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
