//! Offline export of a timeline snapshot.
//!
//! `Idle -> Init -> Audio -> Video -> Encoding -> Complete`. Progress is
//! published on a watch channel and never goes backwards within a phase.
//! Cancellation is cooperative: the token is checked before every frame and
//! after every await.

use crate::audio::{mix_voices, AudioBuffer};
use crate::decode::{AudioSource, DecodedAudio, FrameSource};
use crate::encoder::{EncodeParams, Encoder, VideoCodec};
use crate::error::{RenderError, Result};
use crate::ffmpeg::EncodeProgress;
use crate::raster::{Canvas, Frame};
use cutline_core::resolve::{audio_voices_in_range, resolve_at};
use cutline_core::types::TimeUs;
use cutline_core::TimelineState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportPhase {
    #[default]
    Idle,
    Init,
    Audio,
    Video,
    Encoding,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Fraction of the current phase, 0.0 to 1.0.
    pub progress: f64,
    pub frame: u64,
    pub total_frames: u64,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Part of the timeline to export; `None` in settings means all of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub start: TimeUs,
    pub end: TimeUs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: VideoCodec,
    pub crf: u8,
    pub pixel_format: String,
    pub range: Option<ExportRange>,
    /// Longest wait for one decoded frame before falling back.
    pub frame_timeout: Duration,
    pub output_path: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        preset_1080p()
    }
}

fn preset(width: u32, height: u32, fps: f64) -> ExportSettings {
    ExportSettings {
        width,
        height,
        fps,
        sample_rate: 48000,
        channels: 2,
        codec: VideoCodec::H264,
        crf: 23,
        pixel_format: "yuv420p".to_string(),
        range: None,
        frame_timeout: Duration::from_secs(2),
        output_path: PathBuf::from("export.mp4"),
    }
}

/// 1920x1080 30fps preset.
pub fn preset_1080p() -> ExportSettings {
    preset(1920, 1080, 30.0)
}

/// 1080x1920 30fps (vertical/shorts) preset.
pub fn preset_shorts() -> ExportSettings {
    preset(1080, 1920, 30.0)
}

/// 1280x720 30fps preset.
pub fn preset_720p() -> ExportSettings {
    preset(1280, 720, 30.0)
}

/// 3840x2160 30fps (4K) preset.
pub fn preset_4k() -> ExportSettings {
    preset(3840, 2160, 30.0)
}

/// 1920x1080 60fps preset.
pub fn preset_1080p_60() -> ExportSettings {
    preset(1920, 1080, 60.0)
}

impl ExportSettings {
    fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            width: self.width,
            height: self.height,
            fps: self.fps,
            sample_rate: self.sample_rate,
            channels: self.channels,
            codec: self.codec,
            crf: self.crf,
            pixel_format: self.pixel_format.clone(),
            output_path: self.output_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed {
        path: PathBuf,
        frames: u64,
        /// Produced by rescaling the previous export.
        rescaled: bool,
    },
    Cancelled,
}

/// What the last full-timeline export produced.
#[derive(Debug, Clone, PartialEq)]
struct LastExport {
    fingerprint: u64,
    params: EncodeParams,
    frames: u64,
    path: PathBuf,
}

impl LastExport {
    /// Only the picture size may grow; every other encode setting must match.
    fn can_rescale_to(&self, fingerprint: u64, next: &EncodeParams) -> bool {
        let prev = &self.params;
        self.fingerprint == fingerprint
            && prev.fps == next.fps
            && prev.codec == next.codec
            && prev.crf == next.crf
            && prev.pixel_format == next.pixel_format
            && prev.sample_rate == next.sample_rate
            && prev.channels == next.channels
            && prev.width <= next.width
            && prev.height <= next.height
            && (prev.width, prev.height) != (next.width, next.height)
            && self.path.exists()
    }
}

/// Frames needed to cover `span` at `fps`, rounding up. A product within a
/// millionth of a frame of a whole number counts as that number.
pub fn frame_count(span: TimeUs, fps: f64) -> u64 {
    if span <= TimeUs::ZERO || !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    let exact = span.as_seconds() * fps;
    let nearest = exact.round();
    if (exact - nearest).abs() < 1e-6 {
        nearest as u64
    } else {
        exact.ceil() as u64
    }
}

pub struct Exporter {
    frames: Arc<dyn FrameSource>,
    audio: Arc<dyn AudioSource>,
    encoder: Box<dyn Encoder>,
    progress: watch::Sender<ExportProgress>,
    last: Option<LastExport>,
}

fn publish(progress: &watch::Sender<ExportProgress>, phase: ExportPhase, fraction: f64, frame: u64, total_frames: u64) {
    progress.send_modify(|p| {
        let fraction = fraction.clamp(0.0, 1.0);
        if p.phase == phase {
            p.progress = p.progress.max(fraction);
            p.frame = p.frame.max(frame);
        } else {
            p.phase = phase;
            p.progress = fraction;
            p.frame = frame;
        }
        p.total_frames = total_frames;
    });
}

macro_rules! bail_if_cancelled {
    ($cancel:expr) => {
        if $cancel.is_cancelled() {
            return Ok(ExportOutcome::Cancelled);
        }
    };
}

impl Exporter {
    pub fn new(frames: Arc<dyn FrameSource>, audio: Arc<dyn AudioSource>, encoder: Box<dyn Encoder>) -> Self {
        let (progress, _) = watch::channel(ExportProgress::default());
        Self {
            frames,
            audio,
            encoder,
            progress,
            last: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    pub fn phase(&self) -> ExportPhase {
        self.progress.borrow().phase
    }

    /// Export `state` with `settings`. Cancellation is reported as
    /// [`ExportOutcome::Cancelled`]; any error leaves the exporter idle.
    pub async fn export(
        &mut self,
        state: &TimelineState,
        settings: &ExportSettings,
        cancel: &CancelToken,
    ) -> Result<ExportOutcome> {
        tracing::info!(
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            output = %settings.output_path.display(),
            "export started"
        );

        match self.run(state, settings, cancel).await {
            Ok(ExportOutcome::Cancelled) => {
                self.encoder.abort().await;
                publish(&self.progress, ExportPhase::Idle, 0.0, 0, 0);
                tracing::info!("export cancelled");
                Ok(ExportOutcome::Cancelled)
            }
            Ok(outcome) => {
                publish(&self.progress, ExportPhase::Complete, 1.0, 0, 0);
                tracing::info!(?outcome, "export finished");
                Ok(outcome)
            }
            Err(e) => {
                self.encoder.abort().await;
                publish(&self.progress, ExportPhase::Idle, 0.0, 0, 0);
                tracing::error!(error = %e, "export failed");
                Err(e)
            }
        }
    }

    async fn run(&mut self, state: &TimelineState, settings: &ExportSettings, cancel: &CancelToken) -> Result<ExportOutcome> {
        publish(&self.progress, ExportPhase::Init, 0.0, 0, 0);
        bail_if_cancelled!(cancel);

        let full = settings.range.is_none();
        let range = settings.range.unwrap_or(ExportRange {
            start: TimeUs::ZERO,
            end: state.duration(),
        });
        if range.end <= range.start || settings.fps <= 0.0 {
            return Err(RenderError::NoFrames);
        }
        let fingerprint = state.fingerprint()?;
        let params = settings.encode_params();

        if full {
            if let Some(last) = self
                .last
                .clone()
                .filter(|l| l.can_rescale_to(fingerprint, &params))
            {
                return self.rescale(last, params, fingerprint, cancel).await;
            }
        }

        self.encoder.begin(&params).await?;
        bail_if_cancelled!(cancel);
        publish(&self.progress, ExportPhase::Init, 1.0, 0, 0);

        let Some(audio) = self.render_audio(state, settings, range, cancel).await else {
            return Ok(ExportOutcome::Cancelled);
        };

        let total_frames = frame_count(range.end - range.start, settings.fps);
        if total_frames == 0 {
            return Err(RenderError::NoFrames);
        }
        let mut last_frames: HashMap<Uuid, Arc<Frame>> = HashMap::new();
        publish(&self.progress, ExportPhase::Video, 0.0, 0, total_frames);

        for index in 0..total_frames {
            bail_if_cancelled!(cancel);
            let t = range.start + TimeUs::from_seconds(index as f64 / settings.fps);
            let resolved = resolve_at(t, state);

            let mut sources: HashMap<Uuid, Arc<Frame>> = HashMap::new();
            for layer in &resolved.layers {
                let Some(media) = state.media(layer.media_id) else {
                    continue;
                };
                let fetched =
                    tokio::time::timeout(settings.frame_timeout, self.frames.decoded_frame(media, layer.source_time))
                        .await;
                bail_if_cancelled!(cancel);
                let frame = match fetched {
                    Ok(Ok(frame)) => {
                        let frame = Arc::new(frame);
                        last_frames.insert(layer.clip_id, frame.clone());
                        Some(frame)
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(clip = %layer.clip_id, error = %e, "frame decode failed, using last frame");
                        last_frames.get(&layer.clip_id).cloned()
                    }
                    Err(_) => {
                        tracing::debug!(clip = %layer.clip_id, index, "frame not ready in time, using last frame");
                        last_frames.get(&layer.clip_id).cloned()
                    }
                };
                if let Some(frame) = frame {
                    sources.insert(layer.clip_id, frame);
                }
            }

            let mut canvas = Canvas::new(settings.width, settings.height);
            canvas.composite(&resolved, &sources);
            self.encoder.push_frame(index, &canvas).await?;
            bail_if_cancelled!(cancel);
            publish(
                &self.progress,
                ExportPhase::Video,
                (index + 1) as f64 / total_frames as f64,
                index + 1,
                total_frames,
            );
        }

        publish(&self.progress, ExportPhase::Encoding, 0.0, total_frames, total_frames);
        let Some(path) = self.encode(&audio, total_frames, cancel).await? else {
            return Ok(ExportOutcome::Cancelled);
        };

        if full {
            self.last = Some(LastExport {
                fingerprint,
                params,
                frames: total_frames,
                path: path.clone(),
            });
        }
        Ok(ExportOutcome::Completed {
            path,
            frames: total_frames,
            rescaled: false,
        })
    }

    /// Decode each referenced media once and mix. `None` when cancelled.
    async fn render_audio(
        &self,
        state: &TimelineState,
        settings: &ExportSettings,
        range: ExportRange,
        cancel: &CancelToken,
    ) -> Option<AudioBuffer> {
        let voices = audio_voices_in_range(state, range.start, range.end);
        let mut media_ids: Vec<Uuid> = Vec::new();
        for voice in voices.iter().filter(|v| v.gain > 0.0) {
            if !media_ids.contains(&voice.media_id) {
                media_ids.push(voice.media_id);
            }
        }

        publish(&self.progress, ExportPhase::Audio, 0.0, 0, 0);
        let mut decoded: HashMap<Uuid, DecodedAudio> = HashMap::new();
        for (i, media_id) in media_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                return None;
            }
            let Some(media) = state.media(*media_id) else {
                continue;
            };
            match self.audio.decode_audio(media, settings.sample_rate, settings.channels).await {
                Ok(pcm) => {
                    decoded.insert(*media_id, pcm);
                }
                Err(e) => {
                    tracing::warn!(media = %media_id, name = %media.name, error = %e, "skipping audio that failed to decode");
                }
            }
            if cancel.is_cancelled() {
                return None;
            }
            publish(
                &self.progress,
                ExportPhase::Audio,
                (i + 1) as f64 / media_ids.len() as f64,
                0,
                0,
            );
        }

        let mix = mix_voices(
            &voices,
            &decoded,
            range.start,
            range.end,
            settings.sample_rate,
            settings.channels,
        );
        publish(&self.progress, ExportPhase::Audio, 1.0, 0, 0);
        Some(mix)
    }

    /// Run the encoder's finish step, relaying its progress. `Ok(None)` when
    /// cancelled mid-encode.
    async fn encode(&mut self, audio: &AudioBuffer, total_frames: u64, cancel: &CancelToken) -> Result<Option<PathBuf>> {
        let (tx, rx) = watch::channel(EncodeProgress::default());
        let finish = self.encoder.finish(audio, tx);
        relay(finish, rx, &self.progress, total_frames, cancel).await
    }

    async fn rescale(
        &mut self,
        last: LastExport,
        params: EncodeParams,
        fingerprint: u64,
        cancel: &CancelToken,
    ) -> Result<ExportOutcome> {
        tracing::info!(
            from = %last.path.display(),
            width = params.width,
            height = params.height,
            "timeline unchanged, rescaling previous export"
        );
        publish(&self.progress, ExportPhase::Encoding, 0.0, 0, last.frames);
        let (tx, rx) = watch::channel(EncodeProgress::default());
        let rescale = self.encoder.rescale(&last.path, &params, tx);
        let Some(path) = relay(rescale, rx, &self.progress, last.frames, cancel).await? else {
            return Ok(ExportOutcome::Cancelled);
        };
        self.last = Some(LastExport {
            fingerprint,
            params,
            frames: last.frames,
            path: path.clone(),
        });
        Ok(ExportOutcome::Completed {
            path,
            frames: last.frames,
            rescaled: true,
        })
    }
}

/// Drive an encoder future while forwarding its progress and polling the
/// cancel token. Dropping the future on cancel stops the encoder process.
async fn relay<F>(
    job: F,
    mut rx: watch::Receiver<EncodeProgress>,
    progress: &watch::Sender<ExportProgress>,
    total_frames: u64,
    cancel: &CancelToken,
) -> Result<Option<PathBuf>>
where
    F: std::future::Future<Output = Result<PathBuf>>,
{
    tokio::pin!(job);
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            result = &mut job => {
                let path = result?;
                return Ok((!cancel.is_cancelled()).then_some(path));
            }
            Ok(()) = rx.changed() => {
                let update = rx.borrow_and_update().clone();
                publish(progress, ExportPhase::Encoding, update.percent / 100.0, update.frame, total_frames);
            }
            _ = poll.tick() => {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
            }
        }
    }
}
