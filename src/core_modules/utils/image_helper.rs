// Multi-page TIFF input and output for frame stacks.
//
// Inputs are grayscale stacks at any integer or float depth the `tiff` crate
// decodes; every page must share the first page's dimensions. Outputs are
// always 8-bit: gray for binary masks and preprocessed stacks, RGB for
// annotated frames.

pub mod image_helper {
    use crate::core_modules::frame_stack::{FrameStack, RawStack};
    use crate::error::{FlickerError, Result};
    use image::RgbImage;
    use std::fs::File;
    use std::io::{BufReader, BufWriter, Write};
    use std::path::Path;
    use tiff::ColorType;
    use tiff::decoder::{Decoder, DecodingResult, Limits};
    use tiff::encoder::{TiffEncoder, colortype};

    fn samples_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
        #[allow(unreachable_patterns)]
        let samples = match result {
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
            _ => {
                return Err(FlickerError::UnsupportedFormat(
                    "unknown TIFF sample type".to_string(),
                ));
            }
        };
        Ok(samples)
    }

    /// Loads every page of a grayscale TIFF into one stack.
    pub fn load_stack(path: &Path) -> Result<RawStack> {
        let reader = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions()?;
        let mut data = Vec::new();

        loop {
            let page_dims = decoder.dimensions()?;
            if page_dims != (width, height) {
                return Err(FlickerError::DimensionMismatch {
                    width: page_dims.0,
                    height: page_dims.1,
                    expected_width: width,
                    expected_height: height,
                });
            }
            match decoder.colortype()? {
                ColorType::Gray(_) => {}
                other => {
                    return Err(FlickerError::UnsupportedFormat(format!(
                        "{}: expected grayscale pages, found {other:?}",
                        path.display()
                    )));
                }
            }
            data.extend(samples_to_f64(decoder.read_image()?)?);

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }

        FrameStack::new(width, height, data)
    }

    /// Loads a reference image. Any failure is reported against the reference path.
    pub fn load_reference(path: &Path) -> Result<RawStack> {
        load_stack(path).map_err(|source| FlickerError::Reference {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Writes an 8-bit gray stack, one page per frame.
    pub fn save_gray_stack(path: &Path, stack: &FrameStack<u8>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(&mut writer)?;
        for frame in stack.frames() {
            encoder.write_image::<colortype::Gray8>(stack.width(), stack.height(), frame)?;
        }
        drop(encoder);
        writer.flush()?;
        Ok(())
    }

    /// Writes RGB frames, one page per frame.
    pub fn save_rgb_stack(path: &Path, frames: &[RgbImage]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(&mut writer)?;
        for frame in frames {
            encoder.write_image::<colortype::RGB8>(frame.width(), frame.height(), frame.as_raw())?;
        }
        drop(encoder);
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use crate::core_modules::frame_stack::FrameStack;
    use crate::error::FlickerError;
    use image::{Rgb, RgbImage};
    use std::fs::File;
    use tiff::encoder::{TiffEncoder, colortype};

    #[test]
    fn sixteen_bit_stack_loads_as_f64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.tif");
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        for page in 0..3u16 {
            let data: Vec<u16> = (0..6).map(|i| page * 1000 + i).collect();
            encoder.write_image::<colortype::Gray16>(3, 2, &data).unwrap();
        }
        drop(encoder);

        let stack = load_stack(&path).unwrap();
        assert_eq!((stack.width(), stack.height(), stack.len()), (3, 2, 3));
        assert_eq!(stack.sample(2, 2, 1), 2005.0);
    }

    #[test]
    fn gray_stack_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        let stack = FrameStack::new(2, 2, vec![0u8, 255, 255, 0, 7, 7, 7, 7]).unwrap();
        save_gray_stack(&path, &stack).unwrap();

        let loaded = load_stack(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.frame(0), &[0.0, 255.0, 255.0, 0.0]);
    }

    #[test]
    fn rgb_pages_are_rejected_as_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotated.tif");
        let frame = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        save_rgb_stack(&path, &[frame.clone(), frame]).unwrap();
        assert!(matches!(load_stack(&path), Err(FlickerError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_reference_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tif");
        match load_reference(&path) {
            Err(FlickerError::Reference { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn full_disk_is_reported() {
        let full = std::path::Path::new("/dev/full");
        let stack = FrameStack::new(2, 2, vec![1u8; 4]).unwrap();
        assert!(save_gray_stack(full, &stack).is_err());
        let frame = RgbImage::from_pixel(2, 2, Rgb([0, 0, 255]));
        assert!(save_rgb_stack(full, &[frame]).is_err());
    }
}
