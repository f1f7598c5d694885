use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::motion::{MotionMask, Rect};

/// Cage feature a zone covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Wheel,
    Food,
    Water,
}

/// A rectangular region of the frame tagged with the feature it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    #[serde(flatten)]
    pub rect: Rect,
}

impl Zone {
    pub const fn new(kind: ZoneKind, rect: Rect) -> Self {
        Self { kind, rect }
    }
}

/// Zones of one camera. Zones may overlap; each is counted independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Reject empty rectangles and rectangles that leave the frame.
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        for zone in &self.zones {
            let r = zone.rect;
            if r.is_empty() {
                return Err(anyhow!(
                    "{:?} zone ({}, {}, {}, {}) must satisfy x1 < x2 and y1 < y2",
                    zone.kind,
                    r.x1,
                    r.y1,
                    r.x2,
                    r.y2
                ));
            }
            if !r.fits_within(width, height) {
                return Err(anyhow!(
                    "{:?} zone ({}, {}, {}, {}) lies outside the {}x{} frame",
                    zone.kind,
                    r.x1,
                    r.y1,
                    r.x2,
                    r.y2,
                    width,
                    height
                ));
            }
        }
        Ok(())
    }

    /// Foreground pixels inside every zone of `kind`, summed.
    pub fn motion_in(&self, mask: &MotionMask, kind: ZoneKind) -> u64 {
        self.zones
            .iter()
            .filter(|zone| zone.kind == kind)
            .map(|zone| mask.count_in(zone.rect))
            .sum()
    }
}

impl Default for ZoneSet {
    /// Layout of a 640x480 view of the cage.
    fn default() -> Self {
        Self::new(vec![
            Zone::new(ZoneKind::Wheel, Rect::new(40, 60, 260, 300)),
            Zone::new(ZoneKind::Food, Rect::new(400, 320, 520, 440)),
            Zone::new(ZoneKind::Water, Rect::new(540, 60, 620, 220)),
        ])
    }
}
