use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use super::FrameCodec;
use crate::core::{DecodeError, EncodeError};

/// JPEG at the encoder's default quality. Grayscale stays single channel,
/// everything else goes out as 8-bit RGB.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

impl FrameCodec for JpegCodec {
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new(&mut out);
        match image {
            DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray)?,
            other => encoder.encode_image(&other.to_rgb8())?,
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        Ok(image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn rgb_survives_encode_decode() {
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        let codec = JpegCodec;

        let bytes = codec.encode(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let back = codec.decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (64, 48));
    }

    #[test]
    fn grayscale_stays_single_channel() {
        let img = GrayImage::from_pixel(32, 32, Luma([200]));
        let codec = JpegCodec;

        let bytes = codec.encode(&DynamicImage::ImageLuma8(img)).unwrap();
        let back = codec.decode(&bytes).unwrap();
        assert!(matches!(back, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(JpegCodec.decode(b"definitely not a jpeg").is_err());
        assert!(JpegCodec.decode(&[]).is_err());
    }
}
