//! Live playback: a wall-clock driven playhead and the loop that turns it
//! into composited frames.

use crate::error::{PreviewError, Result};
use cutline_core::resolve::resolve_at;
use cutline_core::types::TimeUs;
use cutline_core::TimelineState;
use cutline_render::decode::FrameSource;
use cutline_render::raster::{Canvas, Frame};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Why the playhead is held still while playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuspendReason {
    FrameNotReady,
    Backgrounded,
    Exporting,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    playhead: TimeUs,
    duration: TimeUs,
    playing: bool,
    suspended: Vec<SuspendReason>,
    last_tick: Option<Instant>,
}

impl PlaybackClock {
    pub fn new(duration: TimeUs) -> Self {
        Self {
            duration: duration.max(TimeUs::ZERO),
            ..Default::default()
        }
    }

    pub fn playhead(&self) -> TimeUs {
        self.playhead
    }

    pub fn duration(&self) -> TimeUs {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_suspended(&self) -> bool {
        !self.suspended.is_empty()
    }

    pub fn suspended_by(&self, reason: SuspendReason) -> bool {
        self.suspended.contains(&reason)
    }

    /// Start playing from the playhead, or from zero when parked at the end.
    pub fn play(&mut self, now: Instant) {
        if self.playhead >= self.duration {
            self.playhead = TimeUs::ZERO;
        }
        self.playing = true;
        self.last_tick = Some(now);
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.last_tick = None;
    }

    pub fn seek(&mut self, t: TimeUs) {
        self.playhead = t.max(TimeUs::ZERO).min(self.duration);
    }

    /// The timeline changed length; the playhead stays inside it.
    pub fn set_duration(&mut self, duration: TimeUs) {
        self.duration = duration.max(TimeUs::ZERO);
        if self.playhead > self.duration {
            self.playhead = self.duration;
        }
    }

    pub fn suspend(&mut self, reason: SuspendReason) {
        if !self.suspended.contains(&reason) {
            tracing::debug!(?reason, "playback suspended");
            self.suspended.push(reason);
        }
    }

    pub fn resume(&mut self, reason: SuspendReason) {
        if let Some(pos) = self.suspended.iter().position(|r| *r == reason) {
            tracing::debug!(?reason, "playback resumed");
            self.suspended.remove(pos);
        }
    }

    /// Advance by the wall time since the previous tick. Time spent paused
    /// or suspended is not counted. Playback stops at the timeline end.
    pub fn tick(&mut self, now: Instant) -> TimeUs {
        let previous = self.last_tick.replace(now);
        if !self.playing || self.is_suspended() {
            return self.playhead;
        }
        if let Some(previous) = previous {
            let elapsed = now.saturating_duration_since(previous);
            self.playhead += TimeUs(elapsed.as_micros() as i64);
        }
        if self.playhead >= self.duration {
            self.playhead = self.duration;
            self.playing = false;
            self.last_tick = None;
        }
        self.playhead
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Longest wait for the frames of one tick.
    pub frame_wait: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            fps: 30.0,
            frame_wait: Duration::from_millis(40),
        }
    }
}

/// A composited preview picture.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub time: TimeUs,
    pub canvas: Arc<Canvas>,
    /// False when some layer fell back to an older picture.
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub enum PreviewCommand {
    Play,
    Pause,
    Seek(TimeUs),
    /// Swap in a fresh timeline snapshot.
    Load(Box<TimelineState>),
    Suspend(SuspendReason),
    Resume(SuspendReason),
    Shutdown,
}

/// Shortest scheduler period, whatever the configured rate.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Command side of a [`PreviewLoop`]. Every call fails with
/// [`PreviewError::Stopped`] once the loop has returned.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    commands: mpsc::Sender<PreviewCommand>,
}

impl PreviewHandle {
    /// A handle and the receiver to pass to [`PreviewLoop::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PreviewCommand>) {
        let (commands, rx) = mpsc::channel(capacity.max(1));
        (Self { commands }, rx)
    }

    pub async fn send(&self, command: PreviewCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| PreviewError::Stopped)
    }

    pub async fn play(&self) -> Result<()> {
        self.send(PreviewCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PreviewCommand::Pause).await
    }

    pub async fn seek(&self, t: TimeUs) -> Result<()> {
        self.send(PreviewCommand::Seek(t)).await
    }

    pub async fn load(&self, state: TimelineState) -> Result<()> {
        self.send(PreviewCommand::Load(Box::new(state))).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PreviewCommand::Shutdown).await
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

pub struct PreviewLoop {
    frames: Arc<dyn FrameSource>,
    config: PreviewConfig,
    state: TimelineState,
    clock: PlaybackClock,
    last_frames: HashMap<Uuid, Arc<Frame>>,
    output: watch::Sender<Option<PreviewFrame>>,
    rendered_at: Option<TimeUs>,
}

impl PreviewLoop {
    pub fn new(frames: Arc<dyn FrameSource>, config: PreviewConfig, state: TimelineState) -> Self {
        let (output, _) = watch::channel(None);
        let clock = PlaybackClock::new(state.duration());
        Self {
            frames,
            config,
            state,
            clock,
            last_frames: HashMap::new(),
            output,
            rendered_at: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.output.subscribe()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn load(&mut self, state: TimelineState) {
        self.clock.set_duration(state.duration());
        self.state = state;
        self.rendered_at = None;
    }

    /// Composite the timeline at `t` and publish it. Layers whose picture is
    /// not ready within the configured wait reuse their last picture and hold
    /// the clock with [`SuspendReason::FrameNotReady`] until they catch up.
    pub async fn render_at(&mut self, t: TimeUs) -> PreviewFrame {
        let resolved = resolve_at(t, &self.state);
        let mut sources: HashMap<Uuid, Arc<Frame>> = HashMap::new();
        let mut complete = true;

        for layer in &resolved.layers {
            let Some(media) = self.state.media(layer.media_id) else {
                continue;
            };
            let fetched =
                tokio::time::timeout(self.config.frame_wait, self.frames.decoded_frame(media, layer.source_time)).await;
            match fetched {
                Ok(Ok(frame)) => {
                    let frame = Arc::new(frame);
                    self.last_frames.insert(layer.clip_id, frame.clone());
                    sources.insert(layer.clip_id, frame);
                }
                Ok(Err(e)) if !media.is_ready() => {
                    tracing::debug!(clip = %layer.clip_id, error = %e, "media not ready for preview");
                    complete = false;
                }
                Ok(Err(e)) => {
                    // Broken media renders as a gap; waiting will not help.
                    tracing::warn!(clip = %layer.clip_id, error = %e, "preview frame failed");
                }
                Err(_) => {
                    tracing::debug!(clip = %layer.clip_id, time = %t, "preview frame not ready");
                    complete = false;
                }
            }
            if !sources.contains_key(&layer.clip_id) {
                if let Some(last) = self.last_frames.get(&layer.clip_id) {
                    sources.insert(layer.clip_id, last.clone());
                }
            }
        }

        if complete {
            self.clock.resume(SuspendReason::FrameNotReady);
        } else {
            self.clock.suspend(SuspendReason::FrameNotReady);
        }

        let mut canvas = Canvas::new(self.config.width, self.config.height);
        canvas.composite(&resolved, &sources);
        let frame = PreviewFrame {
            time: t,
            canvas: Arc::new(canvas),
            complete,
        };
        self.output.send_replace(Some(frame.clone()));
        self.rendered_at = Some(t);
        frame
    }

    /// One scheduler step: advance the clock and render if anything moved.
    pub async fn step(&mut self, now: Instant) -> Option<PreviewFrame> {
        let t = self.clock.tick(now);
        let stale = self.rendered_at != Some(t) || self.clock.suspended_by(SuspendReason::FrameNotReady);
        if !stale {
            return None;
        }
        Some(self.render_at(t).await)
    }

    fn handle(&mut self, command: PreviewCommand) -> bool {
        match command {
            PreviewCommand::Play => self.clock.play(Instant::now()),
            PreviewCommand::Pause => self.clock.pause(),
            PreviewCommand::Seek(t) => self.clock.seek(t),
            PreviewCommand::Load(state) => self.load(*state),
            PreviewCommand::Suspend(reason) => self.clock.suspend(reason),
            PreviewCommand::Resume(reason) => self.clock.resume(reason),
            PreviewCommand::Shutdown => return false,
        }
        true
    }

    /// Drive the loop at the configured rate until a shutdown command
    /// arrives or every sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PreviewCommand>) -> Result<()> {
        let fps = self.config.fps;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PreviewError::InvalidConfig(format!("fps must be positive and finite, got {fps}")));
        }
        let period = Duration::try_from_secs_f64(1.0 / fps)
            .unwrap_or(MIN_TICK)
            .max(MIN_TICK);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(fps = self.config.fps, width = self.config.width, height = self.config.height, "preview started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle(command) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                now = interval.tick() => {
                    self.step(now).await;
                }
            }
        }
        tracing::info!("preview stopped");
        Ok(())
    }
}
