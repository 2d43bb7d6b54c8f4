pub mod error;
pub mod logging;
pub mod playback;

pub use error::{PreviewError, Result};
pub use logging::init_tracing;
