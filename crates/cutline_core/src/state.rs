use crate::error::{CoreError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// The whole editable timeline: media library, ordered tracks and placed clips.
///
/// Owned by a single writer (see [`crate::editor::Editor`]); readers such as
/// playback and export work from a clone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimelineState {
    pub media: Vec<MediaItem>,
    pub tracks: Vec<Track>,
    pub clips: Vec<TimelineClip>,
}

impl TimelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The initial track set: one video lane over one audio lane.
    pub fn with_default_tracks() -> Self {
        let mut state = Self::new();
        state.add_track(TrackKind::Video);
        state.add_track(TrackKind::Audio);
        state
    }

    pub fn media(&self, id: Uuid) -> Option<&MediaItem> {
        self.media.iter().find(|m| m.id == id)
    }

    pub fn media_mut(&mut self, id: Uuid) -> Option<&mut MediaItem> {
        self.media.iter_mut().find(|m| m.id == id)
    }

    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: Uuid) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn track_index(&self, id: Uuid) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn clip(&self, id: Uuid) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn clip_mut(&mut self, id: Uuid) -> Option<&mut TimelineClip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    /// Clips on one track ordered by start.
    pub fn track_clips(&self, track_id: Uuid) -> Vec<&TimelineClip> {
        let mut clips: Vec<&TimelineClip> =
            self.clips.iter().filter(|c| c.track_id == track_id).collect();
        clips.sort_by_key(|c| (c.start, c.id));
        clips
    }

    /// The clip that starts right before `clip_id` on the same track.
    pub fn previous_clip(&self, clip_id: Uuid) -> Option<&TimelineClip> {
        let clip = self.clip(clip_id)?;
        self.track_clips(clip.track_id)
            .into_iter()
            .filter(|c| c.id != clip_id && c.start < clip.start)
            .last()
    }

    /// End of the last clip on any track.
    pub fn duration(&self) -> TimeUs {
        self.clips
            .iter()
            .map(|c| c.end())
            .max()
            .unwrap_or(TimeUs::ZERO)
    }

    pub fn is_track_locked(&self, track_id: Uuid) -> bool {
        self.track(track_id).map(|t| t.is_locked).unwrap_or(false)
    }

    /// True when `[start, end)` on `track_id` is free of every clip not in `ignore`.
    pub fn is_range_free(&self, track_id: Uuid, start: TimeUs, end: TimeUs, ignore: &[Uuid]) -> bool {
        !self
            .clips
            .iter()
            .any(|c| c.track_id == track_id && !ignore.contains(&c.id) && c.overlaps(start, end))
    }

    /// Stable hash of the timeline content, used to detect "unchanged since".
    pub fn fingerprint(&self) -> Result<u64> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(hasher.finish())
    }

    // -----------------------------------------------------------------------
    // Media library
    // -----------------------------------------------------------------------

    pub fn add_media(&mut self, media: MediaItem) -> Uuid {
        let id = media.id;
        self.media.push(media);
        id
    }

    /// Remove a media item. Clips that reference it are removed too when
    /// `cascade` is set; otherwise a referenced item is left in place.
    pub fn remove_media(&mut self, media_id: Uuid, cascade: bool) -> Result<MediaItem> {
        let pos = self
            .media
            .iter()
            .position(|m| m.id == media_id)
            .ok_or(CoreError::MediaNotFound(media_id))?;

        let referenced = self.clips.iter().any(|c| c.media_id == media_id);
        if referenced && !cascade {
            return Err(CoreError::MediaInUse(media_id));
        }
        self.clips.retain(|c| c.media_id != media_id);
        Ok(self.media.remove(pos))
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Place a media item on a track. The clip covers the whole source
    /// (images get [`DEFAULT_IMAGE_DURATION`]).
    pub fn add_clip(&mut self, media_id: Uuid, track_id: Uuid, start: TimeUs) -> Result<Uuid> {
        let media = self.placeable_media(media_id, track_id)?;

        if start < TimeUs::ZERO {
            return Err(CoreError::InvalidOperation("clip start must not be negative".into()));
        }

        let duration = match media.kind {
            MediaKind::Image => DEFAULT_IMAGE_DURATION,
            _ => media.duration,
        };
        if duration < MIN_CLIP_DURATION {
            return Err(CoreError::InvalidOperation(format!(
                "media is shorter than the minimum clip duration ({})",
                MIN_CLIP_DURATION
            )));
        }
        if !self.is_range_free(track_id, start, start + duration, &[]) {
            return Err(CoreError::OverlapDetected);
        }

        let clip = TimelineClip::new(media_id, track_id, start, duration);
        let id = clip.id;
        self.clips.push(clip);
        Ok(id)
    }

    /// Insert a fully specified clip. Used when restoring or scripting edits.
    pub fn insert_clip(&mut self, clip: TimelineClip) -> Result<Uuid> {
        if self.clip(clip.id).is_some() {
            return Err(CoreError::DuplicateClip(clip.id));
        }
        self.placeable_media(clip.media_id, clip.track_id)?;
        if clip.start < TimeUs::ZERO || clip.duration < MIN_CLIP_DURATION {
            return Err(CoreError::InvalidOperation(
                "clip must start at or after zero and be at least the minimum duration".into(),
            ));
        }
        if !self.is_range_free(clip.track_id, clip.start, clip.end(), &[clip.id]) {
            return Err(CoreError::OverlapDetected);
        }
        let id = clip.id;
        self.clips.push(clip);
        Ok(id)
    }

    /// The media item, if both ids resolve and the track takes its kind.
    fn placeable_media(&self, media_id: Uuid, track_id: Uuid) -> Result<&MediaItem> {
        let media = self.media(media_id).ok_or(CoreError::MediaNotFound(media_id))?;
        let track = self.track(track_id).ok_or(CoreError::TrackNotFound(track_id))?;
        if !track.accepts(media.kind) {
            return Err(CoreError::InvalidOperation(format!(
                "{:?} media cannot be placed on a {:?} track",
                media.kind, track.kind
            )));
        }
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_media(seconds: f64) -> MediaItem {
        MediaItem::ready("clip.mp4", MediaKind::Video, "clip.mp4", TimeUs::from_seconds(seconds), None)
    }

    #[test]
    fn default_tracks() {
        let state = TimelineState::with_default_tracks();
        assert_eq!(state.tracks.len(), 2);
        assert_eq!(state.tracks[0].kind, TrackKind::Video);
        assert_eq!(state.tracks[0].name, "Video 1");
        assert_eq!(state.tracks[1].kind, TrackKind::Audio);
        assert_eq!(state.tracks[1].name, "Audio 1");
        assert!(state.clips.is_empty());
    }

    #[test]
    fn add_clip_uses_media_duration() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(4.0));
        let track_id = state.tracks[0].id;

        let clip_id = state.add_clip(media_id, track_id, TimeUs(1_000_000)).unwrap();
        let clip = state.clip(clip_id).unwrap();
        assert_eq!(clip.duration, TimeUs(4_000_000));
        assert_eq!(clip.end(), TimeUs(5_000_000));
        assert_eq!(state.duration(), TimeUs(5_000_000));
    }

    #[test]
    fn add_clip_image_gets_default_duration() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(MediaItem::ready("a.png", MediaKind::Image, "a.png", TimeUs::ZERO, None));
        let track_id = state.tracks[0].id;
        let clip_id = state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();
        assert_eq!(state.clip(clip_id).unwrap().duration, DEFAULT_IMAGE_DURATION);
    }

    #[test]
    fn add_clip_overlap_fails() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(5.0));
        let track_id = state.tracks[0].id;
        state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();

        let result = state.add_clip(media_id, track_id, TimeUs(2_000_000));
        assert!(matches!(result.unwrap_err(), CoreError::OverlapDetected));

        // adjacent is fine
        assert!(state.add_clip(media_id, track_id, TimeUs(5_000_000)).is_ok());
    }

    #[test]
    fn add_clip_rejects_wrong_track_kind() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(MediaItem::ready("a.wav", MediaKind::Audio, "a.wav", TimeUs(3_000_000), None));
        let video_track = state.tracks[0].id;
        let result = state.add_clip(media_id, video_track, TimeUs::ZERO);
        assert!(matches!(result.unwrap_err(), CoreError::InvalidOperation(_)));
    }

    #[test]
    fn insert_clip_checks_kind_and_id() {
        let mut state = TimelineState::with_default_tracks();
        let song = state.add_media(MediaItem::ready("a.wav", MediaKind::Audio, "a.wav", TimeUs(3_000_000), None));
        let (video_track, audio_track) = (state.tracks[0].id, state.tracks[1].id);

        let on_video = TimelineClip::new(song, video_track, TimeUs::ZERO, TimeUs(1_000_000));
        assert!(matches!(
            state.insert_clip(on_video).unwrap_err(),
            CoreError::InvalidOperation(_)
        ));
        assert!(state.clips.is_empty());

        let clip = TimelineClip::new(song, audio_track, TimeUs::ZERO, TimeUs(1_000_000));
        let mut again = clip.clone();
        again.start = TimeUs(2_000_000);
        state.insert_clip(clip).unwrap();
        assert!(matches!(
            state.insert_clip(again).unwrap_err(),
            CoreError::DuplicateClip(_)
        ));
        assert_eq!(state.clips.len(), 1);
    }

    #[test]
    fn add_clip_unknown_references() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(5.0));
        let missing = Uuid::new_v4();
        assert!(matches!(
            state.add_clip(media_id, missing, TimeUs::ZERO).unwrap_err(),
            CoreError::TrackNotFound(_)
        ));
        let track_id = state.tracks[0].id;
        assert!(matches!(
            state.add_clip(missing, track_id, TimeUs::ZERO).unwrap_err(),
            CoreError::MediaNotFound(_)
        ));
    }

    #[test]
    fn remove_referenced_media_requires_cascade() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(5.0));
        let track_id = state.tracks[0].id;
        state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();

        assert!(matches!(
            state.remove_media(media_id, false).unwrap_err(),
            CoreError::MediaInUse(_)
        ));
        assert_eq!(state.media.len(), 1);

        state.remove_media(media_id, true).unwrap();
        assert!(state.media.is_empty());
        assert!(state.clips.is_empty());
    }

    #[test]
    fn previous_clip_by_start() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(2.0));
        let track_id = state.tracks[0].id;
        let c = state.add_clip(media_id, track_id, TimeUs(6_000_000)).unwrap();
        let a = state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();
        let b = state.add_clip(media_id, track_id, TimeUs(3_000_000)).unwrap();

        assert_eq!(state.previous_clip(c).map(|p| p.id), Some(b));
        assert_eq!(state.previous_clip(b).map(|p| p.id), Some(a));
        assert!(state.previous_clip(a).is_none());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut state = TimelineState::with_default_tracks();
        let before = state.fingerprint().unwrap();
        assert_eq!(before, state.clone().fingerprint().unwrap());

        let media_id = state.add_media(video_media(2.0));
        let track_id = state.tracks[0].id;
        state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();
        assert_ne!(before, state.fingerprint().unwrap());
    }

    #[test]
    fn serde_roundtrip_state() {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(video_media(2.0));
        let track_id = state.tracks[0].id;
        state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let back: TimelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
