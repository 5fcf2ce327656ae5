// THEORY:
// The `BlobDetector` is the engine of the per-frame foreground segmentation
// layer. It turns one 8-bit frame plus the background reference into a binary
// foreground mask and a list of `Blob`s.
//
// Algorithm steps:
// 1.  **Difference Image**: absolute difference between the frame and the
//     8-bit background, pixel by pixel.
// 2.  **Thresholding**: a pixel is foreground iff its difference is strictly
//     greater than the cutoff. The mask is written as 0/255 so it can be saved
//     directly as an 8-bit image.
// 3.  **Region Growing**: every unvisited foreground pixel seeds a
//     depth-first flood fill over its 4- or 8-neighbours, collecting one
//     maximal connected region. A flat `visited` buffer guarantees each pixel
//     is claimed by exactly one region.
// 4.  **Data Aggregation & Filtering**: each region's bounding rect, pixel
//     count and mean intensity are computed, regions outside the inclusive
//     `[min_size, max_size]` area range are dropped, and the rest become
//     `Blob`s.
// 5.  **Stateless Utility**: the detector has no memory of previous frames.

use crate::core_modules::blob::{Blob, Rect, RegionMask};
use crate::error::{FlickerError, Result};
use serde::{Deserialize, Serialize};

/// Pixel adjacency used when growing regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only.
    Four,
    /// Edge and corner neighbours.
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(i64, i64)] {
        match self {
            Connectivity::Four => &[(0, 1), (0, -1), (1, 0), (-1, 0)],
            Connectivity::Eight => &[
                (0, 1),
                (0, -1),
                (1, 0),
                (-1, 0),
                (1, 1),
                (1, -1),
                (-1, 1),
                (-1, -1),
            ],
        }
    }
}

/// Value written into the binary mask for foreground pixels.
pub const FOREGROUND: u8 = 255;

pub mod blob_detector {
    use super::*;

    /// Caller-supplied knobs for one segmentation pass.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SegmentParams {
        /// Foreground iff `|frame - background| > cutoff`.
        pub cutoff: u8,
        /// Smallest accepted region area in pixels, inclusive.
        pub min_size: usize,
        /// Largest accepted region area in pixels, inclusive.
        pub max_size: usize,
        pub connectivity: Connectivity,
    }

    /// The result of segmenting one frame.
    #[derive(Debug, Clone)]
    pub struct FrameSegmentation {
        /// 0/255 foreground mask, same layout as the frame.
        pub binary_mask: Vec<u8>,
        /// Size-filtered regions, in scan order.
        pub blobs: Vec<Blob>,
    }

    /// Every buffer handed to the segmenter must cover exactly one frame.
    fn check_frame_len(buffer: &[u8], width: u32, height: u32) -> Result<()> {
        if buffer.len() != width as usize * height as usize {
            return Err(FlickerError::RaggedBuffer {
                len: buffer.len(),
                width,
                height,
            });
        }
        Ok(())
    }

    /// Thresholds the absolute difference between `frame` and `background`.
    pub fn foreground_mask(
        frame: &[u8],
        background: &[u8],
        width: u32,
        height: u32,
        cutoff: u8,
    ) -> Result<Vec<u8>> {
        check_frame_len(frame, width, height)?;
        check_frame_len(background, width, height)?;
        Ok(frame
            .iter()
            .zip(background)
            .map(|(&pixel, &reference)| {
                if pixel.abs_diff(reference) > cutoff {
                    FOREGROUND
                } else {
                    0
                }
            })
            .collect())
    }

    /// Full per-frame segmentation: mask, then regions.
    pub fn segment_frame(
        frame_index: usize,
        frame: &[u8],
        background: &[u8],
        width: u32,
        height: u32,
        params: &SegmentParams,
    ) -> Result<FrameSegmentation> {
        let binary_mask = foreground_mask(frame, background, width, height, params.cutoff)?;
        let blobs = find_blobs(frame_index, frame, &binary_mask, width, height, params)?;
        Ok(FrameSegmentation { binary_mask, blobs })
    }

    /// Extracts every connected foreground region of `binary_mask` whose area
    /// lies within the size bounds.
    pub fn find_blobs(
        frame_index: usize,
        frame: &[u8],
        binary_mask: &[u8],
        width: u32,
        height: u32,
        params: &SegmentParams,
    ) -> Result<Vec<Blob>> {
        check_frame_len(frame, width, height)?;
        check_frame_len(binary_mask, width, height)?;
        let mut visited = vec![false; binary_mask.len()];
        let mut blobs = Vec::new();

        for seed in 0..binary_mask.len() {
            if visited[seed] || binary_mask[seed] == 0 {
                continue;
            }
            let region = grow_region(seed, binary_mask, &mut visited, width, height, params.connectivity);
            if region.len() < params.min_size || region.len() > params.max_size {
                continue;
            }
            blobs.push(build_blob(frame_index, frame, &region, width));
        }

        Ok(blobs)
    }

    /// Collects the flat indices of all foreground pixels connected to `seed`.
    fn grow_region(
        seed: usize,
        binary_mask: &[u8],
        visited: &mut [bool],
        width: u32,
        height: u32,
        connectivity: Connectivity,
    ) -> Vec<usize> {
        let (width, height) = (width as i64, height as i64);
        let mut region = Vec::new();
        let mut stack = vec![seed];
        visited[seed] = true;

        while let Some(current) = stack.pop() {
            region.push(current);
            let x = current as i64 % width;
            let y = current as i64 / width;

            for (dx, dy) in connectivity.offsets() {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || nx >= width || ny < 0 || ny >= height {
                    continue;
                }
                let neighbour = (ny * width + nx) as usize;
                if !visited[neighbour] && binary_mask[neighbour] != 0 {
                    visited[neighbour] = true;
                    stack.push(neighbour);
                }
            }
        }

        region
    }

    fn build_blob(frame_index: usize, frame: &[u8], region: &[usize], width: u32) -> Blob {
        let width = width as usize;
        let mut min_x = usize::MAX;
        let mut min_y = usize::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut total_intensity = 0u64;

        for &index in region {
            let (x, y) = (index % width, index / width);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            total_intensity += frame[index] as u64;
        }

        let rect = Rect::new(
            min_x as u32,
            min_y as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        );
        let mut members = vec![false; rect.area()];
        for &index in region {
            let (x, y) = (index % width, index / width);
            members[(y - min_y) * rect.width as usize + (x - min_x)] = true;
        }

        Blob {
            frame_index,
            centroid: rect.center(),
            rect,
            area: region.len(),
            mean_intensity: total_intensity as f64 / region.len() as f64,
            mask: RegionMask { rect, members },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::*;
    use super::*;
    use crate::core_modules::blob::Point;
    use approx::assert_relative_eq;

    const W: u32 = 32;
    const H: u32 = 24;

    fn params(cutoff: u8, min_size: usize, max_size: usize) -> SegmentParams {
        SegmentParams {
            cutoff,
            min_size,
            max_size,
            connectivity: Connectivity::Eight,
        }
    }

    fn paint(frame: &mut [u8], x0: u32, y0: u32, w: u32, h: u32, value: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame[(y * W + x) as usize] = value;
            }
        }
    }

    #[test]
    fn threshold_is_strict() {
        let mask = foreground_mask(&[10, 60, 61, 0], &[10, 10, 10, 60], 2, 2, 50).unwrap();
        assert_eq!(mask, vec![0, 0, FOREGROUND, FOREGROUND]);
    }

    #[test]
    fn recovers_injected_square() {
        let background = vec![20u8; (W * H) as usize];
        let mut frame = background.clone();
        paint(&mut frame, 8, 6, 6, 6, 200);

        let result = segment_frame(4, &frame, &background, W, H, &params(50, 20, 1000)).unwrap();
        assert_eq!(result.blobs.len(), 1);
        let blob = &result.blobs[0];
        assert_eq!(blob.frame_index, 4);
        assert_eq!(blob.area, 36);
        assert_eq!(blob.rect, Rect::new(8, 6, 6, 6));
        assert_eq!(blob.centroid, Point::new(11, 9));
        assert_relative_eq!(blob.mean_intensity, 200.0);
        assert_eq!(blob.mask.count(), 36);
        assert_eq!(result.binary_mask.iter().filter(|&&v| v == FOREGROUND).count(), 36);
    }

    #[test]
    fn size_bounds_are_inclusive() {
        let background = vec![0u8; (W * H) as usize];
        let mut frame = background.clone();
        paint(&mut frame, 0, 0, 2, 2, 100); // area 4
        paint(&mut frame, 10, 10, 3, 3, 100); // area 9
        paint(&mut frame, 20, 15, 4, 4, 100); // area 16

        let mask = foreground_mask(&frame, &background, W, H, 0).unwrap();
        let blobs = find_blobs(0, &frame, &mask, W, H, &params(0, 4, 9)).unwrap();
        let areas: Vec<usize> = blobs.iter().map(|b| b.area).collect();
        assert_eq!(areas, vec![4, 9]);
    }

    #[test]
    fn connectivity_controls_diagonal_joins() {
        let background = vec![0u8; (W * H) as usize];
        let mut frame = background.clone();
        paint(&mut frame, 5, 5, 1, 1, 90);
        paint(&mut frame, 6, 6, 1, 1, 90);
        let mask = foreground_mask(&frame, &background, W, H, 0).unwrap();

        let eight = find_blobs(0, &frame, &mask, W, H, &params(0, 1, 100)).unwrap();
        assert_eq!(eight.len(), 1);
        assert_eq!(eight[0].area, 2);
        assert_eq!(eight[0].rect, Rect::new(5, 5, 2, 2));
        assert!(!eight[0].mask.contains(6, 5));

        let four_params = SegmentParams {
            connectivity: Connectivity::Four,
            ..params(0, 1, 100)
        };
        assert_eq!(find_blobs(0, &frame, &mask, W, H, &four_params).unwrap().len(), 2);
    }

    #[test]
    fn mean_intensity_is_restricted_to_region() {
        let background = vec![0u8; (W * H) as usize];
        let mut frame = background.clone();
        // An L-shaped region: its bounding box also covers a dark pixel.
        paint(&mut frame, 0, 0, 2, 1, 100);
        paint(&mut frame, 0, 1, 1, 1, 40);

        let mask = foreground_mask(&frame, &background, W, H, 0).unwrap();
        let blobs = find_blobs(0, &frame, &mask, W, H, &params(0, 1, 10)).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 3);
        assert_relative_eq!(blobs[0].mean_intensity, 80.0);
        assert!(!blobs[0].mask.contains(1, 1));
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let short_background = [0u8; 8];
        let result = segment_frame(0, &[255; 16], &short_background, 4, 4, &params(50, 1, 100));
        assert!(matches!(result, Err(FlickerError::RaggedBuffer { len: 8, .. })));
        assert!(foreground_mask(&[1; 6], &[1; 6], 4, 4, 0).is_err());
        assert!(find_blobs(0, &[1; 16], &[FOREGROUND; 12], 4, 4, &params(0, 1, 100)).is_err());
    }
}
