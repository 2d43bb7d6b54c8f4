pub mod audio;
pub mod decode;
pub mod effects;
pub mod encoder;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod raster;

pub use error::{RenderError, Result};
