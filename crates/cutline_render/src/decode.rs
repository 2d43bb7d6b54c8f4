//! Media decoding collaborators.
//!
//! Readiness is explicit: the exporter and preview loop await these traits
//! under their own timeouts. The ffmpeg-backed implementations shell out per
//! request and treat `MediaItem::url` as a local path or any input ffmpeg
//! understands.

use crate::error::{RenderError, Result};
use crate::ffmpeg::FfmpegBinary;
use crate::raster::Frame;
use async_trait::async_trait;
use cutline_core::types::{MediaItem, MediaKind, TimeUs};

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Picture of `media` at `source_time`.
    async fn decoded_frame(&self, media: &MediaItem, source_time: TimeUs) -> Result<Frame>;
}

/// Interleaved PCM in the requested layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> TimeUs {
        if self.sample_rate == 0 {
            return TimeUs::ZERO;
        }
        TimeUs::from_seconds(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Sample for `channel` at `frame`; mono sources feed every channel and
    /// anything past the end is silence.
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        if frame >= self.frames() {
            return 0.0;
        }
        let ch = channel.min(self.channels - 1) as usize;
        self.samples[frame * self.channels as usize + ch]
    }
}

#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn decode_audio(&self, media: &MediaItem, sample_rate: u32, channels: u16) -> Result<DecodedAudio>;
}

fn ensure_ready(media: &MediaItem) -> Result<()> {
    if media.is_ready() && !media.url.is_empty() {
        Ok(())
    } else {
        Err(RenderError::MediaNotReady(media.id))
    }
}

/// Grabs single frames with ffmpeg, scaled to the media's own resolution.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSource {
    ffmpeg: FfmpegBinary,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg: FfmpegBinary) -> Self {
        Self { ffmpeg }
    }

    fn frame_args(media: &MediaItem, source_time: TimeUs, width: u32, height: u32) -> Vec<String> {
        let mut args: Vec<String> = vec!["-v".into(), "error".into()];
        if media.kind != MediaKind::Image {
            args.push("-ss".into());
            args.push(format!("{:.3}", source_time.as_seconds()));
        }
        args.extend([
            "-i".into(),
            media.url.clone(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={width}:{height}"),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-".into(),
        ]);
        args
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn decoded_frame(&self, media: &MediaItem, source_time: TimeUs) -> Result<Frame> {
        ensure_ready(media)?;
        if !media.has_picture() {
            return Err(RenderError::Decode {
                media_id: media.id,
                message: "media has no picture".into(),
            });
        }
        let Some(resolution) = media.resolution else {
            return Err(RenderError::Decode {
                media_id: media.id,
                message: "media resolution unknown".into(),
            });
        };
        let args = Self::frame_args(media, source_time, resolution.width, resolution.height);
        let bytes = self.ffmpeg.output(&args).await?;
        Frame::new(resolution.width, resolution.height, bytes)
    }
}

/// Decodes whole tracks to interleaved f32 PCM with ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudioSource {
    ffmpeg: FfmpegBinary,
}

impl FfmpegAudioSource {
    pub fn new(ffmpeg: FfmpegBinary) -> Self {
        Self { ffmpeg }
    }
}

#[async_trait]
impl AudioSource for FfmpegAudioSource {
    async fn decode_audio(&self, media: &MediaItem, sample_rate: u32, channels: u16) -> Result<DecodedAudio> {
        ensure_ready(media)?;
        if !media.has_audio() {
            return Err(RenderError::Decode {
                media_id: media.id,
                message: "media has no audio".into(),
            });
        }
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-i".into(),
            media.url.clone(),
            "-vn".into(),
            "-f".into(),
            "f32le".into(),
            "-ac".into(),
            channels.to_string(),
            "-ar".into(),
            sample_rate.to_string(),
            "-".into(),
        ];
        let bytes = self.ffmpeg.output(&args).await?;
        Ok(DecodedAudio {
            sample_rate,
            channels,
            samples: parse_f32le(&bytes),
        })
    }
}

fn parse_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
