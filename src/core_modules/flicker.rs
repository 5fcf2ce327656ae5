// THEORY:
// The `flicker` module is the validation layer. It turns the raw, deduplicated
// track set into the narrative the rest of the system reports on: a list of
// validated `Flicker`s, each a track that lived for a plausible number of
// frames and whose intensity actually rose or fell.
//
// A track is validated iff
//   min_duration <= end_frame - start_frame + 1 <= max_duration
// and its intensity sequence `I` satisfies
//   len(I) > 1 && (I[0] < max(I) || I[last] < max(I)).
// Flat sequences and single-sample tracks are rejected.

use crate::core_modules::blob::{Point, Rect, RegionMask};
use crate::core_modules::tracker::Track;
use serde::{Deserialize, Serialize};

/// Inclusive bounds on a track's duration in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min: usize,
    pub max: usize,
}

impl DurationBounds {
    pub fn contains(&self, duration: usize) -> bool {
        self.min <= duration && duration <= self.max
    }
}

/// A track that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Flicker {
    pub track: Track,
    /// `end_frame - start_frame + 1`.
    pub duration: usize,
    /// Mean of the track's per-frame intensities.
    pub average_intensity: f64,
}

/// The per-flicker record handed to the serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerSummary {
    pub flicker_id: u64,
    pub duration: usize,
    pub location: Point,
    pub area: usize,
    pub average_intensity: f64,
}

impl Flicker {
    pub fn id(&self) -> u64 {
        self.track.id
    }

    pub fn start_frame(&self) -> usize {
        self.track.start_frame
    }

    pub fn end_frame(&self) -> usize {
        self.track.end_frame
    }

    pub fn rect(&self) -> Rect {
        self.track.last_rect
    }

    pub fn mask(&self) -> &RegionMask {
        &self.track.last_mask
    }

    pub fn summary(&self) -> FlickerSummary {
        FlickerSummary {
            flicker_id: self.track.id,
            duration: self.duration,
            location: self.track.last_centroid,
            area: self.track.area,
            average_intensity: self.average_intensity,
        }
    }
}

/// True when the first or last sample is below the peak of a multi-sample sequence.
pub fn has_flicker_shape(intensities: &[f64]) -> bool {
    let (Some(first), Some(last)) = (intensities.first(), intensities.last()) else {
        return false;
    };
    if intensities.len() < 2 {
        return false;
    }
    let peak = intensities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    *first < peak || *last < peak
}

/// Keeps the tracks that satisfy the duration bounds and the shape heuristic.
pub fn validate(tracks: Vec<Track>, bounds: &DurationBounds) -> Vec<Flicker> {
    tracks
        .into_iter()
        .filter(|track| bounds.contains(track.duration()) && has_flicker_shape(&track.intensities))
        .map(|track| {
            let average_intensity =
                track.intensities.iter().sum::<f64>() / track.intensities.len() as f64;
            Flicker {
                duration: track.duration(),
                average_intensity,
                track,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::Blob;
    use approx::assert_relative_eq;

    fn track_with(start: usize, end: usize, intensities: &[f64]) -> Track {
        let mut track = Track::new(7, &Blob::from_rect(start, Rect::new(0, 0, 4, 4), intensities[0]));
        track.end_frame = end;
        track.intensities = intensities.to_vec();
        track.match_count = intensities.len();
        track
    }

    const WIDE: DurationBounds = DurationBounds { min: 1, max: 400 };

    #[test]
    fn shape_predicate() {
        assert!(!has_flicker_shape(&[10.0, 10.0, 10.0]));
        assert!(has_flicker_shape(&[5.0, 20.0, 8.0]));
        assert!(has_flicker_shape(&[5.0, 10.0]));
        assert!(has_flicker_shape(&[10.0, 5.0]));
        assert!(!has_flicker_shape(&[3.0]));
        assert!(!has_flicker_shape(&[]));
    }

    #[test]
    fn flat_track_rejected_peaked_track_accepted() {
        let flat = track_with(0, 2, &[10.0, 10.0, 10.0]);
        let peaked = track_with(0, 2, &[5.0, 20.0, 8.0]);
        let flickers = validate(vec![flat, peaked], &WIDE);
        assert_eq!(flickers.len(), 1);
        assert_eq!(flickers[0].duration, 3);
        assert_relative_eq!(flickers[0].average_intensity, 11.0);
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        let bounds = DurationBounds { min: 3, max: 5 };
        let lengths = [(0, 1), (0, 2), (0, 4), (0, 5)];
        let kept: Vec<usize> = validate(
            lengths
                .iter()
                .map(|&(s, e)| track_with(s, e, &[1.0, 2.0]))
                .collect(),
            &bounds,
        )
        .iter()
        .map(|f| f.duration)
        .collect();
        assert_eq!(kept, vec![3, 5]);
    }

    #[test]
    fn summary_reports_latest_location_and_defining_area() {
        let mut track = track_with(2, 6, &[1.0, 4.0, 2.0]);
        track.last_centroid = Point::new(30, 40);
        let flicker = validate(vec![track], &WIDE).remove(0);
        let summary = flicker.summary();
        assert_eq!(summary.flicker_id, 7);
        assert_eq!(summary.duration, 5);
        assert_eq!(summary.location, Point::new(30, 40));
        assert_eq!(summary.area, 16);
        assert_relative_eq!(summary.average_intensity, 7.0 / 3.0);
    }
}
