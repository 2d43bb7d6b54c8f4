use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("nothing to render in the export range")]
    NoFrames,

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("failed to decode media {media_id}: {message}")]
    Decode {
        media_id: uuid::Uuid,
        message: String,
    },

    #[error("media not ready: {0}")]
    MediaNotReady(uuid::Uuid),

    #[error("frame buffer is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("timeline error: {0}")]
    Core(#[from] cutline_core::CoreError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
