use crate::audio::AudioBuffer;
use crate::error::{RenderError, Result};
use crate::ffmpeg::{path_arg, progress_args, EncodeProgress, FfmpegBinary};
use crate::raster::Canvas;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: VideoCodec,
    pub crf: u8,
    pub pixel_format: String,
    pub output_path: PathBuf,
}

/// Destination of rendered frames and the mixed soundtrack.
#[async_trait]
pub trait Encoder: Send {
    async fn begin(&mut self, params: &EncodeParams) -> Result<()>;

    /// Frames arrive in order starting at 0.
    async fn push_frame(&mut self, index: u64, canvas: &Canvas) -> Result<()>;

    /// Mux everything pushed so far with `audio` and return the output file.
    async fn finish(&mut self, audio: &AudioBuffer, progress: watch::Sender<EncodeProgress>) -> Result<PathBuf>;

    /// Produce a resized copy of a finished export without re-rendering.
    async fn rescale(
        &mut self,
        source: &Path,
        params: &EncodeParams,
        progress: watch::Sender<EncodeProgress>,
    ) -> Result<PathBuf>;

    /// Drop spooled data and any partly written output. Safe to call in any
    /// state; a completed output is kept.
    async fn abort(&mut self);
}

struct Spool {
    params: EncodeParams,
    frames: BufWriter<File>,
    frames_written: u64,
}

/// Spools raw RGBA frames and a WAV file into a work directory, then hands
/// both to ffmpeg.
pub struct FfmpegEncoder {
    ffmpeg: FfmpegBinary,
    work_dir: PathBuf,
    spool: Option<Spool>,
    /// Output of the job in flight, removed on abort.
    pending_output: Option<PathBuf>,
}

impl FfmpegEncoder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary(FfmpegBinary::default(), work_dir)
    }

    pub fn with_binary(ffmpeg: FfmpegBinary, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg,
            work_dir: work_dir.into(),
            spool: None,
            pending_output: None,
        }
    }

    fn frames_path(&self) -> PathBuf {
        self.work_dir.join("frames.rgba")
    }

    fn audio_path(&self) -> PathBuf {
        self.work_dir.join("audio.wav")
    }

    async fn remove_spool_files(&self) {
        for path in [self.frames_path(), self.audio_path()] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove spool file");
                }
            }
        }
    }
}

/// ffmpeg arguments muxing spooled frames (and audio, when present).
pub fn build_encode_args(params: &EncodeParams, frames: &Path, audio: Option<&Path>) -> Vec<String> {
    let mut args = progress_args();
    args.extend([
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", params.width, params.height),
        "-r".into(),
        format!("{}", params.fps),
        "-i".into(),
        path_arg(frames),
    ]);
    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(path_arg(audio));
    }
    args.extend([
        "-c:v".into(),
        params.codec.ffmpeg_name().into(),
        "-crf".into(),
        params.crf.to_string(),
        "-pix_fmt".into(),
        params.pixel_format.clone(),
    ]);
    if audio.is_some() {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-ar".into(),
            params.sample_rate.to_string(),
            "-shortest".into(),
        ]);
    } else {
        args.push("-an".into());
    }
    args.push(path_arg(&params.output_path));
    args
}

/// ffmpeg arguments resizing an existing export.
pub fn build_rescale_args(source: &Path, params: &EncodeParams) -> Vec<String> {
    let mut args = progress_args();
    args.extend([
        "-y".into(),
        "-i".into(),
        path_arg(source),
        "-vf".into(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease:flags=lanczos,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = params.width,
            h = params.height
        ),
        "-c:v".into(),
        params.codec.ffmpeg_name().into(),
        "-crf".into(),
        params.crf.to_string(),
        "-pix_fmt".into(),
        params.pixel_format.clone(),
        "-c:a".into(),
        "copy".into(),
        path_arg(&params.output_path),
    ]);
    args
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn begin(&mut self, params: &EncodeParams) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let file = File::create(self.frames_path()).await?;
        self.spool = Some(Spool {
            params: params.clone(),
            frames: BufWriter::new(file),
            frames_written: 0,
        });
        Ok(())
    }

    async fn push_frame(&mut self, index: u64, canvas: &Canvas) -> Result<()> {
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| RenderError::Encoder("push_frame before begin".into()))?;
        if index != spool.frames_written {
            return Err(RenderError::Encoder(format!(
                "frame {index} out of order, expected {}",
                spool.frames_written
            )));
        }
        if canvas.width != spool.params.width || canvas.height != spool.params.height {
            return Err(RenderError::Encoder(format!(
                "canvas is {}x{}, encoder expects {}x{}",
                canvas.width, canvas.height, spool.params.width, spool.params.height
            )));
        }
        spool.frames.write_all(canvas.as_bytes()).await?;
        spool.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self, audio: &AudioBuffer, progress: watch::Sender<EncodeProgress>) -> Result<PathBuf> {
        let mut spool = self
            .spool
            .take()
            .ok_or_else(|| RenderError::Encoder("finish before begin".into()))?;
        if spool.frames_written == 0 {
            self.remove_spool_files().await;
            return Err(RenderError::NoFrames);
        }
        spool.frames.flush().await?;
        drop(spool.frames);

        let audio_path = if audio.frames() > 0 {
            let path = self.audio_path();
            audio.write_wav(&path)?;
            Some(path)
        } else {
            None
        };

        let params = spool.params;
        let args = build_encode_args(&params, &self.frames_path(), audio_path.as_deref());
        let total = Duration::try_from_secs_f64(spool.frames_written as f64 / params.fps).unwrap_or_default();
        tracing::info!(
            output = %params.output_path.display(),
            frames = spool.frames_written,
            "encoding export"
        );
        self.pending_output = Some(params.output_path.clone());
        let result = self.ffmpeg.run_with_progress(&args, &progress, total).await;
        self.remove_spool_files().await;
        result?;
        self.pending_output = None;
        Ok(params.output_path)
    }

    async fn rescale(
        &mut self,
        source: &Path,
        params: &EncodeParams,
        progress: watch::Sender<EncodeProgress>,
    ) -> Result<PathBuf> {
        let args = build_rescale_args(source, params);
        self.pending_output = Some(params.output_path.clone());
        // Duration is unknown here; progress reports frames and speed only.
        self.ffmpeg.run_with_progress(&args, &progress, Duration::ZERO).await?;
        self.pending_output = None;
        Ok(params.output_path.clone())
    }

    async fn abort(&mut self) {
        if let Some(spool) = self.spool.take() {
            drop(spool.frames);
            tracing::debug!(frames = spool.frames_written, "encoder aborted");
        }
        self.remove_spool_files().await;
        // The ffmpeg child was killed when its future was dropped.
        if let Some(output) = self.pending_output.take() {
            if let Err(e) = tokio::fs::remove_file(&output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %output.display(), error = %e, "failed to remove partial output");
                }
            }
        }
    }
}
