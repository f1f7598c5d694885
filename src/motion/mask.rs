use serde::{Deserialize, Serialize};

/// Value stored for a foreground pixel.
pub const FOREGROUND: u8 = 255;

/// Axis-aligned rectangle in pixel coordinates. `x2`/`y2` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    pub fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.x2 - self.x1) as u64 * (self.y2 - self.y1) as u64
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 <= width && self.y2 <= height
    }

    /// Intersect with the `width` x `height` image bounds.
    pub fn clipped(&self, width: u32, height: u32) -> Rect {
        Rect {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        }
    }
}

/// Binary per-pixel change mask. Pixels are 0 or [`FOREGROUND`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionMask {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl MotionMask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Build from raw row-major bytes; any non-zero value is foreground.
    pub fn from_raw(width: u32, height: u32, raw: Vec<u8>) -> Option<Self> {
        if raw.len() != width as usize * height as usize {
            return None;
        }
        let data = raw
            .into_iter()
            .map(|p| if p != 0 { FOREGROUND } else { 0 })
            .collect();
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[self.index(x, y)] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        let idx = self.index(x, y);
        self.data[idx] = if on { FOREGROUND } else { 0 };
    }

    /// Mark every pixel inside `rect` (clipped to the mask) as foreground.
    pub fn fill_rect(&mut self, rect: Rect) {
        let r = rect.clipped(self.width, self.height);
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                self.set(x, y, true);
            }
        }
    }

    pub fn count_nonzero(&self) -> u64 {
        self.data.iter().filter(|&&p| p != 0).count() as u64
    }

    /// Foreground pixels inside `rect`; parts outside the mask count as zero.
    pub fn count_in(&self, rect: Rect) -> u64 {
        let r = rect.clipped(self.width, self.height);
        if r.is_empty() {
            return 0;
        }
        let w = self.width as usize;
        (r.y1 as usize..r.y2 as usize)
            .map(|y| {
                self.data[y * w + r.x1 as usize..y * w + r.x2 as usize]
                    .iter()
                    .filter(|&&p| p != 0)
                    .count() as u64
            })
            .sum()
    }

    /// Morphological opening: erosion then dilation. Removes speckle.
    pub fn open(&self, kernel: u32) -> MotionMask {
        self.erode(kernel).dilate(kernel)
    }

    /// Morphological closing: dilation then erosion. Fills small holes.
    pub fn close(&self, kernel: u32) -> MotionMask {
        self.dilate(kernel).erode(kernel)
    }

    /// Erode with a `kernel` x `kernel` square. Out-of-bounds neighbours are ignored.
    pub fn erode(&self, kernel: u32) -> MotionMask {
        self.morph(kernel, true)
    }

    /// Dilate with a `kernel` x `kernel` square.
    pub fn dilate(&self, kernel: u32) -> MotionMask {
        self.morph(kernel, false)
    }

    // Separable square structuring element: a horizontal pass then a vertical pass.
    fn morph(&self, kernel: u32, erode: bool) -> MotionMask {
        let radius = (kernel.max(1) / 2) as i64;
        if radius == 0 || self.data.is_empty() {
            return self.clone();
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let pick = |acc: bool, on: bool| if erode { acc && on } else { acc || on };

        let mut horizontal = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = erode;
                for dx in -radius..=radius {
                    let nx = x + dx;
                    if nx < 0 || nx >= w {
                        continue;
                    }
                    acc = pick(acc, self.data[(y * w + nx) as usize] != 0);
                }
                horizontal[(y * w + x) as usize] = if acc { FOREGROUND } else { 0 };
            }
        }

        let mut out = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = erode;
                for dy in -radius..=radius {
                    let ny = y + dy;
                    if ny < 0 || ny >= h {
                        continue;
                    }
                    acc = pick(acc, horizontal[(ny * w + x) as usize] != 0);
                }
                out[(y * w + x) as usize] = if acc { FOREGROUND } else { 0 };
            }
        }

        MotionMask {
            width: self.width,
            height: self.height,
            data: out,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_inside_rect_with_clipping() {
        let mut mask = MotionMask::empty(10, 10);
        mask.fill_rect(Rect::new(2, 2, 6, 6));
        assert_eq!(mask.count_nonzero(), 16);
        assert_eq!(mask.count_in(Rect::new(0, 0, 4, 4)), 4);
        assert_eq!(mask.count_in(Rect::new(4, 4, 50, 50)), 4);
        assert_eq!(mask.count_in(Rect::new(8, 8, 8, 9)), 0);
    }

    #[test]
    fn overlapping_rects_count_independently() {
        let mut mask = MotionMask::empty(10, 10);
        mask.fill_rect(Rect::new(0, 0, 10, 10));
        let a = mask.count_in(Rect::new(0, 0, 6, 10));
        let b = mask.count_in(Rect::new(4, 0, 10, 10));
        assert_eq!(a + b, 120);
    }

    #[test]
    fn opening_removes_isolated_pixels() {
        let mut mask = MotionMask::empty(20, 20);
        mask.set(3, 3, true);
        mask.set(15, 4, true);
        mask.fill_rect(Rect::new(8, 8, 16, 16));
        let opened = mask.open(3);
        assert!(!opened.get(3, 3));
        assert!(!opened.get(15, 4));
        assert_eq!(opened.count_in(Rect::new(8, 8, 16, 16)), 64);
    }

    #[test]
    fn closing_fills_single_pixel_hole() {
        let mut mask = MotionMask::empty(20, 20);
        mask.fill_rect(Rect::new(5, 5, 15, 15));
        mask.set(10, 10, false);
        let closed = mask.close(3);
        assert!(closed.get(10, 10));
    }

    #[test]
    fn from_raw_normalises_values() {
        let mask = MotionMask::from_raw(2, 2, vec![0, 1, 7, 0]).unwrap();
        assert_eq!(mask.as_raw(), &[0, FOREGROUND, FOREGROUND, 0]);
        assert!(MotionMask::from_raw(2, 2, vec![0; 3]).is_none());
    }
}
