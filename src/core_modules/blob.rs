// THEORY:
// A `Blob` is a single, connected foreground region found in one frame. It is
// a snapshot: it knows its frame, where it is, how big it is and how bright it
// is, but nothing about earlier frames. Persistence over time is the job of
// the `tracker` module.
//
// The geometry types here (`Point`, `Rect`, `RegionMask`) are shared by the
// segmenter, tracker, overlap resolver, annotator and SNR scorer. All
// coordinates are whole pixels; there is no sub-pixel localization.

use serde::{Deserialize, Serialize};

/// A pixel coordinate in the frame. Serialized as an `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "(u32, u32)", from = "(u32, u32)")]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl From<Point> for (u32, u32) {
    fn from(point: Point) -> Self {
        (point.x, point.y)
    }
}

impl From<(u32, u32)> for Point {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }
}

/// An axis-aligned bounding rectangle. `width`/`height` count pixels, so a
/// single pixel has a 1x1 rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centre of the rectangle in integer pixels (`x + w/2`, `y + h/2`).
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }

    /// Open-interval intersection test: rectangles that only touch along an
    /// edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        let (x1, y1, w1, h1) = (self.x as u64, self.y as u64, self.width as u64, self.height as u64);
        let (x2, y2, w2, h2) = (other.x as u64, other.y as u64, other.width as u64, other.height as u64);
        x1 < x2 + w2 && x1 + w1 > x2 && y1 < y2 + h2 && y1 + h1 > y2
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pixel membership of a region, stored relative to its bounding rect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    /// The rect the membership grid covers.
    pub rect: Rect,
    /// Row-major membership flags, `rect.width * rect.height` long.
    pub members: Vec<bool>,
}

impl RegionMask {
    /// A mask where every pixel of `rect` is a member.
    pub fn filled(rect: Rect) -> Self {
        Self {
            rect,
            members: vec![true; rect.area()],
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        if x < self.rect.x || y < self.rect.y {
            return false;
        }
        let (dx, dy) = (x - self.rect.x, y - self.rect.y);
        if dx >= self.rect.width || dy >= self.rect.height {
            return false;
        }
        self.members[(dy * self.rect.width + dx) as usize]
    }

    /// Number of member pixels.
    pub fn count(&self) -> usize {
        self.members.iter().filter(|&&member| member).count()
    }

    /// Absolute frame coordinates of every member pixel, row-major.
    pub fn positions(&self) -> impl Iterator<Item = Point> + '_ {
        let rect = self.rect;
        self.members
            .iter()
            .enumerate()
            .filter(|(_, member)| **member)
            .map(move |(i, _)| {
                let i = i as u32;
                Point {
                    x: rect.x + i % rect.width,
                    y: rect.y + i / rect.width,
                }
            })
    }
}

/// A single connected foreground region detected in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// The frame this blob was found in.
    pub frame_index: usize,
    /// Centre of the bounding rect.
    pub centroid: Point,
    /// Inclusive bounding rectangle of the region.
    pub rect: Rect,
    /// Pixel count of the region.
    pub area: usize,
    /// Mean 8-bit frame intensity over the region's pixels.
    pub mean_intensity: f64,
    /// Which pixels inside `rect` belong to the region.
    pub mask: RegionMask,
}

impl Blob {
    /// A solid rectangular blob; convenient for synthetic detections.
    pub fn from_rect(frame_index: usize, rect: Rect, mean_intensity: f64) -> Self {
        Self {
            frame_index,
            centroid: rect.center(),
            rect,
            area: rect.area(),
            mean_intensity,
            mask: RegionMask::filled(rect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = Rect::new(0, 0, 5, 5);
        assert!(!a.overlaps(&Rect::new(5, 0, 5, 5)));
        assert!(!a.overlaps(&Rect::new(0, 5, 5, 5)));
        assert!(a.overlaps(&Rect::new(4, 4, 5, 5)));
        assert!(Rect::new(4, 4, 5, 5).overlaps(&a));
        assert!(a.overlaps(&Rect::new(1, 1, 1, 1)));
    }

    #[test]
    fn center_uses_integer_division() {
        assert_eq!(Rect::new(10, 20, 5, 4).center(), Point::new(12, 22));
        assert_eq!(Rect::new(3, 3, 1, 1).center(), Point::new(3, 3));
    }

    #[test]
    fn mask_positions_are_absolute() {
        let mask = RegionMask {
            rect: Rect::new(2, 3, 2, 2),
            members: vec![true, false, false, true],
        };
        let positions: Vec<Point> = mask.positions().collect();
        assert_eq!(positions, vec![Point::new(2, 3), Point::new(3, 4)]);
        assert!(mask.contains(3, 4));
        assert!(!mask.contains(3, 3));
        assert!(!mask.contains(9, 9));
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn point_serializes_as_pair() {
        let json = serde_json::to_value(Point::new(7, 12)).unwrap();
        assert_eq!(json, serde_json::json!([7, 12]));
        let back: Point = serde_json::from_value(json).unwrap();
        assert_eq!(back, Point::new(7, 12));
    }
}
