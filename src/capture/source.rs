use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};

use crate::core::CaptureError;

/// The camera seam. `capture` blocks until the next frame is available.
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn capture(&mut self) -> Result<DynamicImage, CaptureError>;
}

/// Moving colour-bar test pattern; stands in for a camera on the bench.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Unavailable(format!(
                "synthetic source needs a non-empty frame, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            tick: 0,
        })
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let shift = self.tick;
        self.tick = self.tick.wrapping_add(4);

        let (w, h) = (self.width, self.height);
        let img = RgbImage::from_fn(w, h, |x, y| {
            let bar = ((x + shift) % w) * 8 / w;
            let shade = (y * 255 / h) as u8;
            match bar {
                0 => Rgb([255, 255, 255]),
                1 => Rgb([255, 255, 0]),
                2 => Rgb([0, 255, 255]),
                3 => Rgb([0, 255, 0]),
                4 => Rgb([255, 0, 255]),
                5 => Rgb([255, 0, 0]),
                6 => Rgb([0, 0, 255]),
                _ => Rgb([shade, shade, shade]),
            }
        });

        Ok(DynamicImage::ImageRgb8(img))
    }
}

/// Replays the still images of a directory in file-name order, looping.
pub struct ImageDirSource {
    name: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            CaptureError::Unavailable(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no jpg/png images in {}",
                dir.display()
            )));
        }

        Ok(Self {
            name: format!("image_dir:{}", dir.display()),
            files,
            next: 0,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        Ok(image::open(path)?)
    }
}
