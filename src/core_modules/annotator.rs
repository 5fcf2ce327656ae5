// Draws validated flickers onto an RGB copy of the normalized stack. Every
// flicker's last bounding rect is outlined in red, 2 px wide, on each frame of
// its lifetime. Drawing is clipped at the frame edges by imageproc.

use crate::core_modules::flicker::Flicker;
use crate::core_modules::frame_stack::FrameStack;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;

/// Outline colour for validated flickers.
pub const HIGHLIGHT: Rgb<u8> = Rgb([255, 0, 0]);

/// Replicates one gray frame into an RGB image.
pub fn gray_to_rgb(frame: &[u8], width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let value = frame[(y * width + x) as usize];
        Rgb([value, value, value])
    })
}

/// Outlines the corners (x, y) and (x + w, y + h) with a 2 px stroke.
fn draw_box(image: &mut RgbImage, flicker: &Flicker) {
    let rect = flicker.rect();
    let (x, y) = (rect.x as i32, rect.y as i32);
    draw_hollow_rect_mut(
        image,
        DrawRect::at(x, y).of_size(rect.width + 1, rect.height + 1),
        HIGHLIGHT,
    );
    if rect.width >= 2 && rect.height >= 2 {
        draw_hollow_rect_mut(
            image,
            DrawRect::at(x + 1, y + 1).of_size(rect.width - 1, rect.height - 1),
            HIGHLIGHT,
        );
    }
}

/// Returns one RGB frame per input frame with every flicker's box drawn over
/// its active frame range.
pub fn annotate_frames(frames: &FrameStack<u8>, flickers: &[Flicker]) -> Vec<RgbImage> {
    let (width, height) = (frames.width(), frames.height());
    let mut annotated: Vec<RgbImage> = frames
        .frames()
        .map(|frame| gray_to_rgb(frame, width, height))
        .collect();

    for flicker in flickers {
        let last = flicker.end_frame().min(annotated.len().saturating_sub(1));
        for image in annotated
            .iter_mut()
            .take(last + 1)
            .skip(flicker.start_frame())
        {
            draw_box(image, flicker);
        }
    }

    annotated
}
