// ============================================================================
// IMAGE I/O: decoding for hosts, row flipping and PNG encoding for export
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};

use crate::error::{EngineError, Result};

/// Decode any format the `image` crate was built with into RGBA8.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(EngineError::InvalidImage(format!(
            "{} decodes to an empty image",
            path.display()
        )));
    }
    Ok(img)
}

/// Reverse the row order of a tightly packed RGBA8 buffer in place.
pub fn flip_rows(pixels: &mut [u8], width: u32, height: u32) {
    let row = width as usize * 4;
    let h = height as usize;
    debug_assert_eq!(pixels.len(), row * h);
    for y in 0..h / 2 {
        let (top, bottom) = pixels.split_at_mut((h - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

/// Encode an RGBA8 image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(image.as_raw().len() / 2);
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out)
}

/// Encode and write a PNG file.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_rows_reverses_order() {
        // 1x3 image, one byte pattern per row
        let mut px = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
        flip_rows(&mut px, 1, 3);
        assert_eq!(px, vec![3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
        flip_rows(&mut px, 1, 3);
        assert_eq!(px[0], 1);
    }

    #[test]
    fn png_bytes_decode_back() {
        let img = RgbaImage::from_fn(7, 5, |x, y| image::Rgba([x as u8 * 30, y as u8 * 40, 9, 200]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, img);
    }
}
