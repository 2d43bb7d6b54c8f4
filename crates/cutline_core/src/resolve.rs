//! What is on screen and in the speakers at a given timeline time.
//!
//! Resolution is a pure function of a [`TimelineState`] and a time value. It
//! produces layer weights, wipe masks and source times; turning those into
//! pixels is the renderer's job.

use crate::state::TimelineState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Colour shown where layer weights do not add up to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Matte {
    Black,
    White,
}

impl Matte {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Matte::Black => [0, 0, 0],
            Matte::White => [255, 255, 255],
        }
    }
}

/// Hard-edged wipe region. Covers the fraction `fraction` of the frame
/// measured from `edge`, or the complement when `inverted`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WipeMask {
    pub edge: WipeDirection,
    pub fraction: f64,
    pub inverted: bool,
}

impl WipeMask {
    /// Coverage (0 or 1) at normalized frame coordinates, `x` and `y` in
    /// `[0, 1)` with the origin at the top left.
    pub fn coverage(&self, x: f64, y: f64) -> f64 {
        let inside = match self.edge {
            WipeDirection::Left => x < self.fraction,
            WipeDirection::Right => x >= 1.0 - self.fraction,
            WipeDirection::Up => y < self.fraction,
            WipeDirection::Down => y >= 1.0 - self.fraction,
        };
        if inside != self.inverted {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLayer {
    pub clip_id: Uuid,
    pub media_id: Uuid,
    pub track_id: Uuid,
    /// Source media time to show.
    pub source_time: TimeUs,
    /// Blend weight before effect opacity and masking.
    pub weight: f64,
    pub mask: Option<WipeMask>,
    pub effects: ClipEffects,
}

/// A transition in progress on the authoritative track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveTransition {
    pub kind: TransitionKind,
    pub progress: f64,
    pub outgoing: Option<Uuid>,
    pub incoming: Uuid,
}

/// One clip's contribution to the mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioVoice {
    pub clip_id: Uuid,
    pub media_id: Uuid,
    pub start: TimeUs,
    pub duration: TimeUs,
    pub offset: TimeUs,
    pub speed: f64,
    /// `track.volume * clip.volume`, zero on muted or locked tracks.
    pub gain: f64,
}

impl AudioVoice {
    pub fn end(&self) -> TimeUs {
        self.start + self.duration
    }

    pub fn source_time_at(&self, t: TimeUs) -> TimeUs {
        self.offset + (t - self.start).scale(self.speed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub time: TimeUs,
    /// Bottom to top.
    pub layers: Vec<VideoLayer>,
    pub matte: Matte,
    pub transition: Option<ActiveTransition>,
    pub audio: Vec<AudioVoice>,
}

impl ResolvedFrame {
    pub fn layer(&self, clip_id: Uuid) -> Option<&VideoLayer> {
        self.layers.iter().find(|l| l.clip_id == clip_id)
    }

    /// Weight of a clip's layer, zero when it is not shown.
    pub fn weight_of(&self, clip_id: Uuid) -> f64 {
        self.layer(clip_id).map(|l| l.weight).unwrap_or(0.0)
    }
}

/// Resolve the frame at timeline time `t`.
pub fn resolve_at(t: TimeUs, state: &TimelineState) -> ResolvedFrame {
    let mut frame = ResolvedFrame {
        time: t,
        layers: Vec::new(),
        matte: Matte::Black,
        transition: None,
        audio: active_audio_voices(state, t),
    };

    let Some(clip) = authoritative_clip(state, t) else {
        return frame;
    };

    let Some(transition) = clip.transition.filter(|tr| tr.duration > TimeUs::ZERO) else {
        frame.layers.push(layer_for(state, clip, t, 1.0, None));
        return frame;
    };

    let window = transition.duration.min(clip.duration);
    let elapsed = t - clip.start;
    if elapsed >= window {
        frame.layers.push(layer_for(state, clip, t, 1.0, None));
        return frame;
    }

    let p = elapsed.0 as f64 / window.0 as f64;
    let outgoing = state.previous_clip(clip.id);
    frame.transition = Some(ActiveTransition {
        kind: transition.kind,
        progress: p,
        outgoing: outgoing.map(|c| c.id),
        incoming: clip.id,
    });

    let Some(outgoing) = outgoing else {
        // Nothing to blend from: fade in over black.
        frame.layers.push(layer_for(state, clip, t, p, None));
        return frame;
    };

    match transition.kind {
        TransitionKind::CrossDissolve => {
            frame.layers.push(layer_for(state, outgoing, t, 1.0 - p, None));
            frame.layers.push(layer_for(state, clip, t, p, None));
        }
        TransitionKind::FadeToBlack | TransitionKind::FadeToWhite => {
            if transition.kind == TransitionKind::FadeToWhite {
                frame.matte = Matte::White;
            }
            if p < 0.5 {
                frame.layers.push(layer_for(state, outgoing, t, 1.0 - 2.0 * p, None));
            } else {
                frame.layers.push(layer_for(state, clip, t, 2.0 * p - 1.0, None));
            }
        }
        TransitionKind::Wipe(edge) => {
            let reveal = WipeMask {
                edge,
                fraction: p,
                inverted: false,
            };
            let rest = WipeMask {
                inverted: true,
                ..reveal
            };
            frame.layers.push(layer_for(state, outgoing, t, 1.0, Some(rest)));
            frame.layers.push(layer_for(state, clip, t, 1.0, Some(reveal)));
        }
    }
    frame
}

/// The clip on the topmost video track that is active at `t`.
fn authoritative_clip(state: &TimelineState, t: TimeUs) -> Option<&TimelineClip> {
    state
        .tracks
        .iter()
        .rev()
        .filter(|track| track.kind == TrackKind::Video)
        .find_map(|track| {
            state
                .clips
                .iter()
                .find(|c| c.track_id == track.id && c.is_active_at(t))
        })
}

fn layer_for(state: &TimelineState, clip: &TimelineClip, t: TimeUs, weight: f64, mask: Option<WipeMask>) -> VideoLayer {
    VideoLayer {
        clip_id: clip.id,
        media_id: clip.media_id,
        track_id: clip.track_id,
        source_time: clamped_source_time(state, clip, t),
        weight,
        mask,
        effects: clip.effects_or_default(),
    }
}

/// Source time at `t`, continuing past the clip's end for outgoing
/// transition layers but never beyond the media itself.
fn clamped_source_time(state: &TimelineState, clip: &TimelineClip, t: TimeUs) -> TimeUs {
    let source = clip.source_time_at(t).max(TimeUs::ZERO);
    match state.media(clip.media_id).and_then(|m| m.source_limit()) {
        Some(limit) => source.min(limit),
        None => source,
    }
}

/// Whether a clip feeds the mix: audio media anywhere, or video media on a
/// video track that has not had its sound detached.
pub fn is_audio_capable(state: &TimelineState, clip: &TimelineClip) -> bool {
    let (Some(media), Some(track)) = (state.media(clip.media_id), state.track(clip.track_id)) else {
        return false;
    };
    match (media.kind, track.kind) {
        (MediaKind::Audio, _) => true,
        (MediaKind::Video, TrackKind::Video) => !clip.is_audio_detached,
        (MediaKind::Video, TrackKind::Audio) => true,
        (MediaKind::Image, _) => false,
    }
}

fn voice_for(state: &TimelineState, clip: &TimelineClip) -> AudioVoice {
    let gain = match state.track(clip.track_id) {
        Some(track) if !track.is_muted && !track.is_locked => track.volume * clip.volume,
        _ => 0.0,
    };
    AudioVoice {
        clip_id: clip.id,
        media_id: clip.media_id,
        start: clip.start,
        duration: clip.duration,
        offset: clip.offset,
        speed: clip.speed,
        gain,
    }
}

fn active_audio_voices(state: &TimelineState, t: TimeUs) -> Vec<AudioVoice> {
    state
        .clips
        .iter()
        .filter(|c| c.is_active_at(t) && is_audio_capable(state, c))
        .map(|c| voice_for(state, c))
        .collect()
}

/// Every voice that sounds somewhere in `[start, end)`, ordered by start.
pub fn audio_voices_in_range(state: &TimelineState, start: TimeUs, end: TimeUs) -> Vec<AudioVoice> {
    let mut voices: Vec<AudioVoice> = state
        .clips
        .iter()
        .filter(|c| c.overlaps(start, end) && is_audio_capable(state, c))
        .map(|c| voice_for(state, c))
        .collect();
    voices.sort_by_key(|v| (v.start, v.clip_id));
    voices
}
