// THEORY:
// The `tracker` module adds memory to the system. It takes the stateless list
// of `Blob`s from each frame and associates them with the flicker tracks built
// from earlier frames, solving the data association problem for transient,
// mostly stationary events.
//
// Key architectural principles:
// 1.  **Track Persistence**: A `Track` is one flicker's existence over time,
//     distinct from a `Blob`, which is a snapshot in a single frame.
// 2.  **Gap-Tolerant Proximity Matching**: a track is a candidate for a blob
//     when it was last extended at most `gap_limit` frames ago and its last
//     centroid is strictly closer than `proximity_limit` pixels.
// 3.  **Many-Match Policy**: a blob extends *every* candidate track, not just
//     the closest. Track state is re-read for every blob, so a track extended
//     by one blob can be extended again by a later blob of the same frame.
//     Downstream results depend on this exact behavior.
// 4.  **Lifecycle**: unmatched blobs give birth to new tracks. Tracks are never
//     deleted; a track that stops matching simply stops growing and is still
//     part of the final set.
// 5.  **Strict Ordering**: frames must be fed in index order. The tracker
//     rejects a frame older than one it has already seen.

use crate::core_modules::blob::{Blob, Point, Rect, RegionMask};
use crate::error::{FlickerError, Result};
use std::collections::BTreeMap;

/// Maximum frame distance between a track's last match and a new blob.
pub const GAP_LIMIT: usize = 5;
/// Centroid distance (pixels) below which a blob may extend a track.
pub const PROXIMITY_LIMIT: f64 = 10.0;

/// The accumulating record of one flicker across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Unique within one detection run; numbering starts at 1.
    pub id: u64,
    /// Frame of the first matched blob.
    pub start_frame: usize,
    /// Frame of the most recently matched blob.
    pub end_frame: usize,
    /// Centroid of the most recently matched blob.
    pub last_centroid: Point,
    /// Area of the blob that created the track.
    pub area: usize,
    /// Mean intensity of every matched blob, in match order.
    pub intensities: Vec<f64>,
    /// Number of blobs matched into this track.
    pub match_count: usize,
    /// Region of the most recently matched blob.
    pub last_mask: RegionMask,
    /// Bounding rect of the most recently matched blob.
    pub last_rect: Rect,
}

impl Track {
    /// Starts a new track from its defining blob.
    pub fn new(id: u64, blob: &Blob) -> Self {
        Self {
            id,
            start_frame: blob.frame_index,
            end_frame: blob.frame_index,
            last_centroid: blob.centroid,
            area: blob.area,
            intensities: vec![blob.mean_intensity],
            match_count: 1,
            last_mask: blob.mask.clone(),
            last_rect: blob.rect,
        }
    }

    /// Extends the track with a newly matched blob.
    fn update(&mut self, blob: &Blob) {
        self.end_frame = self.end_frame.max(blob.frame_index);
        self.last_centroid = blob.centroid;
        self.last_rect = blob.rect;
        self.last_mask = blob.mask.clone();
        self.intensities.push(blob.mean_intensity);
        self.match_count += 1;
    }

    /// `end_frame - start_frame`, the quantity compared when resolving overlaps.
    pub fn span(&self) -> usize {
        self.end_frame - self.start_frame
    }

    /// Number of frames covered, inclusive of both ends.
    pub fn duration(&self) -> usize {
        self.span() + 1
    }

    fn accepts(&self, blob: &Blob, gap_limit: usize, proximity_limit: f64) -> bool {
        blob.frame_index.saturating_sub(self.end_frame) <= gap_limit
            && self.last_centroid.distance(&blob.centroid) < proximity_limit
    }
}

/// Builds tracks from per-frame blobs, one threshold attempt at a time.
#[derive(Debug)]
pub struct Tracker {
    /// Open tracks keyed by id; iteration is in id (creation) order.
    tracks: BTreeMap<u64, Track>,
    /// Id handed to the next new track.
    next_id: u64,
    gap_limit: usize,
    proximity_limit: f64,
    /// Index of the latest frame fed in, used to enforce ordering.
    last_frame: Option<usize>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self::with_limits(GAP_LIMIT, PROXIMITY_LIMIT)
    }

    pub fn with_limits(gap_limit: usize, proximity_limit: f64) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            gap_limit,
            proximity_limit,
            last_frame: None,
        }
    }

    /// Associates the blobs of `frame_index` with the open tracks.
    pub fn update(&mut self, frame_index: usize, blobs: &[Blob]) -> Result<()> {
        if let Some(last) = self.last_frame {
            if frame_index < last {
                return Err(FlickerError::OutOfOrderFrame {
                    frame: frame_index,
                    last,
                });
            }
        }
        self.last_frame = Some(frame_index);

        for blob in blobs {
            let blob = Blob {
                frame_index,
                ..blob.clone()
            };
            let mut matched = false;
            for track in self.tracks.values_mut() {
                if track.accepts(&blob, self.gap_limit, self.proximity_limit) {
                    track.update(&blob);
                    matched = true;
                }
            }

            if !matched {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.insert(id, Track::new(id, &blob));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Consumes the tracker, returning the complete track set in id order.
    pub fn finish(self) -> Vec<Track> {
        self.tracks.into_values().collect()
    }
}
