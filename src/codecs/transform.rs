use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    None,
    FlipVertical,
    FlipHorizontal,
    /// Flip both axes; an upside-down mounted camera.
    Rotate180,
}

/// Client-side, pre-encode frame transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTransform {
    pub grayscale: bool,
    pub orientation: Orientation,
}

impl FrameTransform {
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        let image = if self.grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image
        };

        match self.orientation {
            Orientation::None => image,
            Orientation::FlipVertical => image.flipv(),
            Orientation::FlipHorizontal => image.fliph(),
            Orientation::Rotate180 => image.rotate180(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn marked() -> DynamicImage {
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn rotate180_moves_corner() {
        let t = FrameTransform {
            grayscale: false,
            orientation: Orientation::Rotate180,
        };
        let out = t.apply(marked());
        assert_eq!(out.get_pixel(3, 2).0[0], 255);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn flips_move_corner_along_one_axis() {
        let v = FrameTransform {
            grayscale: false,
            orientation: Orientation::FlipVertical,
        };
        assert_eq!(v.apply(marked()).get_pixel(0, 2).0[0], 255);

        let h = FrameTransform {
            grayscale: false,
            orientation: Orientation::FlipHorizontal,
        };
        assert_eq!(h.apply(marked()).get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn grayscale_keeps_dimensions() {
        let t = FrameTransform {
            grayscale: true,
            orientation: Orientation::None,
        };
        let out = t.apply(marked());
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!(out.dimensions(), (4, 3));
    }
}
