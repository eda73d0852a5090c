//! Frame codec
//!
//! Compresses decoded RGB images into JPEG byte buffers. Stateless, so any
//! number of capture tasks can call it at once.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::{Error, Result};

/// Default JPEG quality used by capture loops and the test pattern
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encode an RGB image as JPEG at the given quality (clamped to 1..=100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Encode("empty image".into()));
    }

    let quality = quality.clamp(1, 100);
    let mut buffer = Vec::with_capacity((image.width() * image.height() / 8) as usize);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|err| Error::Encode(err.to_string()))?;

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_encode_produces_jpeg_markers() {
        let jpeg = encode_jpeg(&checkerboard(64, 48), DEFAULT_JPEG_QUALITY).unwrap();

        // SOI ... EOI
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_quality_affects_size() {
        let image = checkerboard(128, 128);
        let low = encode_jpeg(&image, 10).unwrap();
        let high = encode_jpeg(&image, 95).unwrap();

        assert!(low.len() < high.len());
    }

    #[test]
    fn test_quality_is_clamped() {
        let image = checkerboard(16, 16);

        assert!(encode_jpeg(&image, 0).is_ok());
        assert!(encode_jpeg(&image, 255).is_ok());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let result = encode_jpeg(&RgbImage::new(0, 0), DEFAULT_JPEG_QUALITY);

        assert!(matches!(result, Err(Error::Encode(_))));
    }

    #[test]
    fn test_concurrent_encoding() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    encode_jpeg(&checkerboard(32 + i * 8, 32), DEFAULT_JPEG_QUALITY).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let jpeg = handle.join().unwrap();
            assert!(!jpeg.is_empty());
        }
    }
}
