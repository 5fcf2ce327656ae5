// THEORY:
// The `frame_stack` module holds the most fundamental data of the system: a
// video as an ordered stack of equally sized grayscale frames, plus the two
// whole-stack transforms every analysis starts with.
//
// Key architectural principles:
// 1.  **Arena Storage**: A `FrameStack` is one contiguous row-major buffer of
//     `frames * width * height` samples. A frame is just a slice into it, so
//     per-frame passes never allocate and pixel membership is an index.
// 2.  **Owned Derivations**: The raw stack is never mutated. Normalization
//     produces a separately owned 8-bit stack; the background is a separately
//     owned mean image. The raw stack stays available for SNR scoring.
// 3.  **Global, Not Per-Frame**: `normalize_to_8bit` uses one min/max over the
//     whole stack so intensities stay comparable across frames.

use crate::error::{FlickerError, Result};

/// An ordered sequence of equally sized 2D intensity grids, indexed by frame time.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

/// A stack as loaded from disk, at whatever bit depth the source used.
pub type RawStack = FrameStack<f64>;

impl<T: Copy> FrameStack<T> {
    /// Wraps a contiguous buffer. The buffer may hold zero frames.
    pub fn new(width: u32, height: u32, data: Vec<T>) -> Result<Self> {
        let frame_len = width as usize * height as usize;
        if frame_len == 0 || data.len() % frame_len != 0 {
            return Err(FlickerError::RaggedBuffer {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a stack from individual frames, checking every frame's length.
    pub fn from_frames(width: u32, height: u32, frames: Vec<Vec<T>>) -> Result<Self> {
        let frame_len = width as usize * height as usize;
        let mut data = Vec::with_capacity(frame_len * frames.len());
        for frame in frames {
            if frame.len() != frame_len {
                return Err(FlickerError::RaggedBuffer {
                    len: frame.len(),
                    width,
                    height,
                });
            }
            data.extend(frame);
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of samples in a single frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of frames in the stack.
    pub fn len(&self) -> usize {
        self.data.len() / self.frame_len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame(&self, index: usize) -> &[T] {
        let frame_len = self.frame_len();
        &self.data[index * frame_len..(index + 1) * frame_len]
    }

    pub fn frames(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.frame_len())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Sample at pixel (x, y) of frame `index`.
    pub fn sample(&self, index: usize, x: u32, y: u32) -> T {
        self.frame(index)[y as usize * self.width as usize + x as usize]
    }
}

/// The per-pixel temporal mean of a stack, used as the reference for segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    /// The width of the image in pixels.
    pub width: u32,
    /// The height of the image in pixels.
    pub height: u32,
    /// Row-major mean values, one per pixel.
    pub mean: Vec<f64>,
}

impl Background {
    /// The background quantized into the 8-bit frame domain. Values are
    /// truncated, matching how a mean image is cast to an 8-bit grid.
    pub fn to_luma8(&self) -> Vec<u8> {
        self.mean
            .iter()
            .map(|&value| value.clamp(0.0, 255.0) as u8)
            .collect()
    }
}

/// Linearly maps `values` so that `min` lands on 0 and `max` on 255.
/// A degenerate range (`min == max`) maps everything to 0.
pub(crate) fn rescale_to_8bit(values: &[f64], min: f64, max: f64) -> Vec<u8> {
    let range = max - min;
    if range == 0.0 || !range.is_finite() {
        return vec![0; values.len()];
    }
    values
        .iter()
        .map(|&value| ((value - min) / range * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Global (min, max) of a non-empty slice.
pub(crate) fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

/// Rescales the whole stack to 8 bits using a single global min/max.
pub fn normalize_to_8bit(stack: &FrameStack<f64>) -> Result<FrameStack<u8>> {
    let (min, max) = min_max(stack.as_slice()).ok_or(FlickerError::EmptyStack)?;
    if min == max {
        tracing::debug!("constant frame stack (value {min}); normalizing to all zeros");
    }
    FrameStack::new(
        stack.width(),
        stack.height(),
        rescale_to_8bit(stack.as_slice(), min, max),
    )
}

/// Computes the elementwise temporal mean across all frames.
pub fn estimate_background<T>(stack: &FrameStack<T>) -> Result<Background>
where
    T: Copy + Into<f64>,
{
    if stack.is_empty() {
        return Err(FlickerError::EmptyStack);
    }
    let mut sums = vec![0.0f64; stack.frame_len()];
    for frame in stack.frames() {
        for (sum, &sample) in sums.iter_mut().zip(frame) {
            *sum += sample.into();
        }
    }
    let count = stack.len() as f64;
    Ok(Background {
        width: stack.width(),
        height: stack.height(),
        mean: sums.into_iter().map(|sum| sum / count).collect(),
    })
}
