use image::DynamicImage;

use crate::core::{DecodeError, EncodeError};

pub mod jpeg;
pub mod transform;

pub use jpeg::JpegCodec;
pub use transform::{FrameTransform, Orientation};

/// Stateless still-image codec used for every frame on the wire and on disk.
pub trait FrameCodec: Send + Sync {
    fn content_type(&self) -> &'static str;
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, EncodeError>;
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError>;
}
