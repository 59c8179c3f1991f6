use chrono::{DateTime, Local};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::core::timestamp::OVERLAY_FORMAT;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const SCALE: u32 = 2;
const ORIGIN: (u32, u32) = (10, 10);
const PADDING: u32 = 4;

const INK: Rgb<u8> = Rgb([0, 255, 0]);
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

// 5x7, Bit 4 = linke Spalte
fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        _ => [0x00; 7],
    }
}

/// Burns `text` into the top-left corner. Only digits and `-:/ ` are drawn;
/// anything else renders as a blank cell.
pub fn draw_stamp(image: &mut RgbImage, text: &str) {
    let advance = (GLYPH_W + 1) * SCALE;
    let cells = text.chars().count() as u32;
    let (x0, y0) = ORIGIN;

    draw_filled_rect_mut(
        image,
        Rect::at((x0 - PADDING) as i32, (y0 - PADDING) as i32)
            .of_size(cells * advance + 2 * PADDING, GLYPH_H * SCALE + 2 * PADDING),
        BACKGROUND,
    );

    for (i, c) in text.chars().enumerate() {
        let cx = x0 + i as u32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                draw_filled_rect_mut(
                    image,
                    Rect::at(
                        (cx + col * SCALE) as i32,
                        (y0 + row as u32 * SCALE) as i32,
                    )
                    .of_size(SCALE, SCALE),
                    INK,
                );
            }
        }
    }
}

/// Converts to RGB and stamps the receive time.
pub fn annotate(image: DynamicImage, received_at: &DateTime<Local>) -> RgbImage {
    let mut rgb = image.into_rgb8();
    draw_stamp(&mut rgb, &received_at.format(OVERLAY_FORMAT).to_string());
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_draws_ink_inside_the_box() {
        let mut img = RgbImage::from_pixel(320, 60, Rgb([50, 50, 50]));
        draw_stamp(&mut img, "2024-05-01 20:00:00");

        let ink = img.pixels().filter(|p| **p == INK).count();
        assert!(ink > 100, "only {ink} ink pixels");
        // Hintergrund außerhalb unverändert
        assert_eq!(*img.get_pixel(319, 59), Rgb([50, 50, 50]));
    }

    #[test]
    fn stamp_clips_on_tiny_frames() {
        let mut img = RgbImage::new(8, 8);
        draw_stamp(&mut img, "12:34");
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn annotate_keeps_dimensions_and_converts_gray() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(200, 40));
        let out = annotate(gray, &Local::now());
        assert_eq!(out.dimensions(), (200, 40));
        assert!(out.pixels().any(|p| *p == INK));
    }
}
