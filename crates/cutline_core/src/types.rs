use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use uuid::Uuid;

/// Clips shorter than this are degenerate and never produced by an edit.
pub const MIN_CLIP_DURATION: TimeUs = TimeUs(100_000);

/// Duration given to still images when they are placed on the timeline.
pub const DEFAULT_IMAGE_DURATION: TimeUs = TimeUs(5_000_000);

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Multiply by a real factor (playback speed, progress), rounding to the
    /// nearest microsecond.
    pub fn scale(self, factor: f64) -> Self {
        Self((self.0 as f64 * factor).round() as i64)
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for TimeUs {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for TimeUs {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for TimeUs {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<i64> for TimeUs {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i64> for TimeUs {
    type Output = Self;
    fn div(self, rhs: i64) -> Self {
        Self(self.0 / rhs)
    }
}

impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_ms = total_us / 1_000;
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaStatus {
    Generating,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// A source asset owned by the media library. Clips only point at it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub duration: TimeUs,
    pub kind: MediaKind,
    pub aspect_ratio: String,
    pub resolution: Option<Resolution>,
    pub status: MediaStatus,
    pub error: Option<String>,
}

impl MediaItem {
    /// A placeholder for an import or generation request that has just started.
    pub fn generating(name: impl Into<String>, kind: MediaKind, aspect_ratio: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: String::new(),
            duration: TimeUs::ZERO,
            kind,
            aspect_ratio: aspect_ratio.into(),
            resolution: None,
            status: MediaStatus::Generating,
            error: None,
        }
    }

    /// An asset that is already available, e.g. an imported file.
    pub fn ready(
        name: impl Into<String>,
        kind: MediaKind,
        url: impl Into<String>,
        duration: TimeUs,
        resolution: Option<Resolution>,
    ) -> Self {
        let aspect_ratio = resolution
            .map(|r| aspect_ratio_label(r.width, r.height))
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            duration,
            kind,
            aspect_ratio,
            resolution,
            status: MediaStatus::Ready,
            error: None,
        }
    }

    /// Called by the generation/import collaborator once the asset exists.
    pub fn mark_ready(&mut self, url: impl Into<String>, duration: TimeUs) {
        self.url = url.into();
        self.duration = duration;
        self.status = MediaStatus::Ready;
        self.error = None;
    }

    /// Called by the generation/import collaborator when the request failed.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = MediaStatus::Error;
        self.error = Some(message.into());
    }

    pub fn is_ready(&self) -> bool {
        self.status == MediaStatus::Ready
    }

    pub fn has_audio(&self) -> bool {
        matches!(self.kind, MediaKind::Video | MediaKind::Audio)
    }

    pub fn has_picture(&self) -> bool {
        matches!(self.kind, MediaKind::Video | MediaKind::Image)
    }

    /// Source length that bounds trims, if the asset has one.
    /// Images can be stretched indefinitely.
    pub fn source_limit(&self) -> Option<TimeUs> {
        match self.kind {
            MediaKind::Image => None,
            _ if self.duration > TimeUs::ZERO => Some(self.duration),
            _ => None,
        }
    }
}

fn aspect_ratio_label(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 { a } else { gcd(b, a % b) }
    }
    let g = gcd(width, height).max(1);
    format!("{}:{}", width / g, height / g)
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub kind: TrackKind,
    pub volume: f64,
    pub is_muted: bool,
    pub is_locked: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            volume: 1.0,
            is_muted: false,
            is_locked: false,
        }
    }

    pub fn accepts(&self, media: MediaKind) -> bool {
        match self.kind {
            TrackKind::Video => matches!(media, MediaKind::Video | MediaKind::Image),
            TrackKind::Audio => media == MediaKind::Audio || media == MediaKind::Video,
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WipeDirection {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransitionKind {
    CrossDissolve,
    FadeToBlack,
    FadeToWhite,
    Wipe(WipeDirection),
}

/// Blend from the previous clip on the same track into the clip carrying it,
/// anchored at that clip's start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration: TimeUs,
}

// ---------------------------------------------------------------------------
// ClipEffects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipEffects {
    /// Linear multiplier, 1.0 is neutral.
    pub brightness: f64,
    /// 1.0 is neutral, 0.0 collapses to mid grey.
    pub contrast: f64,
    /// 1.0 is neutral, 0.0 is greyscale.
    pub saturation: f64,
    /// Degrees.
    pub hue_rotate: f64,
    /// Radius in pixels at a 1080 pixel tall frame.
    pub blur: f64,
    pub opacity: f64,
}

impl Default for ClipEffects {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            hue_rotate: 0.0,
            blur: 0.0,
            opacity: 1.0,
        }
    }
}

impl ClipEffects {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// TimelineClip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineClip {
    pub id: Uuid,
    pub media_id: Uuid,
    pub track_id: Uuid,
    pub start: TimeUs,
    pub duration: TimeUs,
    pub offset: TimeUs,
    pub volume: f64,
    pub speed: f64,
    pub transition: Option<Transition>,
    pub effects: Option<ClipEffects>,
    pub is_audio_detached: bool,
}

impl TimelineClip {
    pub fn new(media_id: Uuid, track_id: Uuid, start: TimeUs, duration: TimeUs) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_id,
            track_id,
            start,
            duration,
            offset: TimeUs::ZERO,
            volume: 1.0,
            speed: 1.0,
            transition: None,
            effects: None,
            is_audio_detached: false,
        }
    }

    pub fn end(&self) -> TimeUs {
        self.start + self.duration
    }

    /// `start <= t < end`
    pub fn is_active_at(&self, t: TimeUs) -> bool {
        self.start <= t && t < self.end()
    }

    pub fn overlaps(&self, start: TimeUs, end: TimeUs) -> bool {
        self.start < end && start < self.end()
    }

    /// Source media time shown at timeline time `t`.
    pub fn source_time_at(&self, t: TimeUs) -> TimeUs {
        self.offset + (t - self.start).scale(self.speed)
    }

    /// Source media consumed by the clip.
    pub fn source_span(&self) -> TimeUs {
        self.duration.scale(self.speed)
    }

    pub fn effects_or_default(&self) -> ClipEffects {
        self.effects.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
