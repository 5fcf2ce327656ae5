// THEORY:
// Upstream preparation of raw recordings, before flicker analysis.
//
// 1.  **Reference Subtraction**: removes a fixed camera-noise image from every
//     frame. Subtraction saturates at zero and the result is clamped into the
//     8-bit range, so the output is a ready-to-analyze 8-bit stack.
// 2.  **Frame Summation**: builds a synthetic low-frame-rate ("pseudo")
//     recording by summing consecutive groups of frames. Each summed frame is
//     normalized to 8 bits on its own range. A trailing group shorter than
//     `frames_per_sum` is dropped.
//
// Both are plain stack-to-stack transforms; file handling lives with the
// callers.

use crate::core_modules::frame_stack::{FrameStack, min_max, rescale_to_8bit};
use crate::error::{FlickerError, Result};

/// Default group size for frame summation.
pub const DEFAULT_FRAMES_PER_SUM: usize = 20;

/// Subtracts the first frame of `reference` from every frame of `stack`.
pub fn subtract_reference(stack: &FrameStack<f64>, reference: &FrameStack<f64>) -> Result<FrameStack<u8>> {
    if reference.is_empty() {
        return Err(FlickerError::EmptyStack);
    }
    if (reference.width(), reference.height()) != (stack.width(), stack.height()) {
        return Err(FlickerError::DimensionMismatch {
            width: reference.width(),
            height: reference.height(),
            expected_width: stack.width(),
            expected_height: stack.height(),
        });
    }

    let noise = reference.frame(0);
    let mut data = Vec::with_capacity(stack.as_slice().len());
    for frame in stack.frames() {
        data.extend(
            frame
                .iter()
                .zip(noise)
                .map(|(&value, &offset)| (value - offset).clamp(0.0, 255.0) as u8),
        );
    }
    FrameStack::new(stack.width(), stack.height(), data)
}

/// Sums consecutive groups of `frames_per_sum` frames into one 8-bit frame each.
pub fn sum_frames(stack: &FrameStack<f64>, frames_per_sum: usize) -> Result<FrameStack<u8>> {
    if frames_per_sum == 0 {
        return Err(FlickerError::InvalidParameter(
            "frames_per_sum must be at least 1".to_string(),
        ));
    }
    let groups = stack.len() / frames_per_sum;
    if groups == 0 {
        return Err(FlickerError::EmptyStack);
    }

    let mut data = Vec::with_capacity(groups * stack.frame_len());
    for group in 0..groups {
        let mut summed = vec![0.0f64; stack.frame_len()];
        for index in group * frames_per_sum..(group + 1) * frames_per_sum {
            for (sum, &value) in summed.iter_mut().zip(stack.frame(index)) {
                *sum += value;
            }
        }
        let (min, max) = min_max(&summed).ok_or(FlickerError::EmptyStack)?;
        data.extend(rescale_to_8bit(&summed, min, max));
    }
    tracing::debug!("summed {} frames into {groups} pseudo frames", groups * frames_per_sum);

    FrameStack::new(stack.width(), stack.height(), data)
}
