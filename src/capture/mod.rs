pub mod scheduler;
pub mod source;

pub use scheduler::CaptureScheduler;
pub use source::{FrameSource, ImageDirSource, SyntheticSource};
