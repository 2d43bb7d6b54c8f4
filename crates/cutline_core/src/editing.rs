//! Timeline edit operations.
//!
//! Every operation mutates [`TimelineState`] in place and reports through its
//! return value whether anything changed. A request that fails validation
//! (split point outside the clip, a trim that would leave a degenerate clip,
//! a clip on a locked track, ...) is a silent no-op rather than an error.
//!
//! Clips on one track never overlap: moves and trims are clamped against the
//! nearest unselected neighbor instead of being resolved afterwards.

use crate::state::TimelineState;
use crate::types::*;
use std::collections::HashSet;
use uuid::Uuid;

/// Allowed range `[min, max]` for a move or trim delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaBounds {
    pub min: TimeUs,
    pub max: TimeUs,
}

impl DeltaBounds {
    pub const UNBOUNDED: Self = Self {
        min: TimeUs(i64::MIN),
        max: TimeUs(i64::MAX),
    };

    pub fn clamp(&self, delta: TimeUs) -> TimeUs {
        delta.max(self.min).min(self.max)
    }

    pub fn contains(&self, delta: TimeUs) -> bool {
        self.min <= delta && delta <= self.max
    }

    fn raise_min(&mut self, min: TimeUs) {
        self.min = self.min.max(min);
    }

    fn lower_max(&mut self, max: TimeUs) {
        self.max = self.max.min(max);
    }
}

/// The timing triple captured before an interactive edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSpan {
    pub start: TimeUs,
    pub duration: TimeUs,
    pub offset: TimeUs,
}

impl ClipSpan {
    pub fn of(clip: &TimelineClip) -> Self {
        Self {
            start: clip.start,
            duration: clip.duration,
            offset: clip.offset,
        }
    }

    pub fn end(&self) -> TimeUs {
        self.start + self.duration
    }

    pub fn moved(self, delta: TimeUs) -> Self {
        Self {
            start: self.start + delta,
            ..self
        }
    }

    /// Left edge moves by `delta`; the right edge stays put.
    pub fn trimmed_start(self, delta: TimeUs, speed: f64) -> Self {
        Self {
            start: self.start + delta,
            duration: self.duration - delta,
            offset: self.offset + delta.scale(speed),
        }
    }

    pub fn trimmed_end(self, delta: TimeUs) -> Self {
        Self {
            duration: self.duration + delta,
            ..self
        }
    }

    pub fn apply_to(self, clip: &mut TimelineClip) {
        clip.start = self.start;
        clip.duration = self.duration;
        clip.offset = self.offset;
    }
}

impl TimelineState {
    /// A clip that exists and does not sit on a locked track.
    pub fn is_clip_editable(&self, clip_id: Uuid) -> bool {
        self.clip(clip_id)
            .map(|c| !self.is_track_locked(c.track_id))
            .unwrap_or(false)
    }

    /// Editable ids from a selection, first occurrence kept.
    fn editable_ids(&self, clip_ids: &[Uuid]) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        clip_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id) && self.is_clip_editable(*id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    /// Range of deltas that moves every selected clip together without any of
    /// them going below zero or crossing an unselected neighbor.
    pub fn move_bounds(&self, clip_ids: &[Uuid]) -> DeltaBounds {
        let mut bounds = DeltaBounds::UNBOUNDED;
        for clip in clip_ids.iter().filter_map(|id| self.clip(*id)) {
            bounds.raise_min(-clip.start);
            bounds.lower_max(TimeUs::MAX - clip.end());
            for other in self
                .clips
                .iter()
                .filter(|o| o.track_id == clip.track_id && !clip_ids.contains(&o.id))
            {
                if other.end() <= clip.start {
                    bounds.raise_min(other.end() - clip.start);
                } else if other.start >= clip.end() {
                    bounds.lower_max(other.start - clip.end());
                }
            }
        }
        bounds
    }

    /// Range of deltas for the left edge of a clip.
    pub fn trim_start_bounds(&self, clip_id: Uuid) -> Option<DeltaBounds> {
        let clip = self.clip(clip_id)?;
        let mut bounds = DeltaBounds::UNBOUNDED;
        bounds.lower_max(clip.duration - MIN_CLIP_DURATION);
        bounds.raise_min(-clip.start);
        // offset + delta * speed >= 0
        bounds.raise_min(TimeUs(-((clip.offset.0 as f64 / clip.speed).floor() as i64)));
        if let Some(prev) = self.nearest_before(clip) {
            bounds.raise_min(prev - clip.start);
        }
        Some(bounds)
    }

    /// Range of deltas for the right edge of a clip.
    pub fn trim_end_bounds(&self, clip_id: Uuid) -> Option<DeltaBounds> {
        let clip = self.clip(clip_id)?;
        let mut bounds = DeltaBounds::UNBOUNDED;
        bounds.raise_min(MIN_CLIP_DURATION - clip.duration);
        bounds.lower_max(TimeUs::MAX - clip.end());
        if let Some(next) = self.nearest_after(clip) {
            bounds.lower_max(next - clip.end());
        }
        if let Some(limit) = self.media(clip.media_id).and_then(|m| m.source_limit()) {
            let available = (limit - clip.offset).0 as f64 / clip.speed;
            bounds.lower_max(TimeUs(available.floor() as i64) - clip.duration);
        }
        Some(bounds)
    }

    fn nearest_before(&self, clip: &TimelineClip) -> Option<TimeUs> {
        self.clips
            .iter()
            .filter(|o| o.track_id == clip.track_id && o.id != clip.id && o.end() <= clip.start)
            .map(|o| o.end())
            .max()
    }

    fn nearest_after(&self, clip: &TimelineClip) -> Option<TimeUs> {
        self.clips
            .iter()
            .filter(|o| o.track_id == clip.track_id && o.id != clip.id && o.start >= clip.end())
            .map(|o| o.start)
            .min()
    }

    // -----------------------------------------------------------------------
    // Clip operations
    // -----------------------------------------------------------------------

    /// Split a clip at timeline time `at`. The left piece keeps the id; the
    /// id of the new right piece is returned.
    pub fn split_clip(&mut self, clip_id: Uuid, at: TimeUs) -> Option<Uuid> {
        if !self.is_clip_editable(clip_id) {
            return None;
        }
        let idx = self.clips.iter().position(|c| c.id == clip_id)?;
        let clip = &self.clips[idx];

        if at <= clip.start || at >= clip.end() {
            return None;
        }
        let left_duration = at - clip.start;
        let right_duration = clip.end() - at;
        if left_duration < MIN_CLIP_DURATION || right_duration < MIN_CLIP_DURATION {
            return None;
        }

        let right = TimelineClip {
            id: Uuid::new_v4(),
            start: at,
            duration: right_duration,
            offset: clip.offset + left_duration.scale(clip.speed),
            transition: None,
            ..clip.clone()
        };
        let right_id = right.id;

        self.clips[idx].duration = left_duration;
        self.clips.insert(idx + 1, right);
        Some(right_id)
    }

    /// Shift the selected clips together. Returns the delta actually applied,
    /// which is zero when nothing moved.
    pub fn move_clips(&mut self, clip_ids: &[Uuid], delta: TimeUs) -> TimeUs {
        let ids = self.editable_ids(clip_ids);
        if ids.is_empty() {
            return TimeUs::ZERO;
        }
        let applied = self.move_bounds(&ids).clamp(delta);
        if applied == TimeUs::ZERO {
            return TimeUs::ZERO;
        }
        for clip in self.clips.iter_mut().filter(|c| ids.contains(&c.id)) {
            clip.start += applied;
        }
        applied
    }

    /// Move the left edge, keeping the right edge fixed.
    pub fn trim_start(&mut self, clip_id: Uuid, delta: TimeUs) -> bool {
        if !self.is_clip_editable(clip_id) {
            return false;
        }
        let Some(bounds) = self.trim_start_bounds(clip_id) else {
            return false;
        };
        let applied = bounds.clamp(delta);
        if applied == TimeUs::ZERO || bounds.min > bounds.max {
            return false;
        }
        let Some(clip) = self.clip_mut(clip_id) else {
            return false;
        };
        ClipSpan::of(clip).trimmed_start(applied, clip.speed).apply_to(clip);
        if let Some(t) = clip.transition.as_mut() {
            t.duration = t.duration.min(clip.duration);
        }
        true
    }

    /// Move the right edge.
    pub fn trim_end(&mut self, clip_id: Uuid, delta: TimeUs) -> bool {
        if !self.is_clip_editable(clip_id) {
            return false;
        }
        let Some(bounds) = self.trim_end_bounds(clip_id) else {
            return false;
        };
        let applied = bounds.clamp(delta);
        if applied == TimeUs::ZERO || bounds.min > bounds.max {
            return false;
        }
        let Some(clip) = self.clip_mut(clip_id) else {
            return false;
        };
        ClipSpan::of(clip).trimmed_end(applied).apply_to(clip);
        if let Some(t) = clip.transition.as_mut() {
            t.duration = t.duration.min(clip.duration);
        }
        true
    }

    /// Insert a copy of each clip right after it, pushing later clips on that
    /// track forward by the copy's duration. Copies carry no transition.
    pub fn duplicate_clips(&mut self, clip_ids: &[Uuid]) -> Vec<Uuid> {
        let mut created = Vec::new();
        for id in self.editable_ids(clip_ids) {
            let Some(original) = self.clip(id).cloned() else {
                continue;
            };
            let insert_at = original.end();

            for clip in self
                .clips
                .iter_mut()
                .filter(|c| c.track_id == original.track_id && c.start >= insert_at)
            {
                clip.start += original.duration;
            }

            let copy = TimelineClip {
                id: Uuid::new_v4(),
                start: insert_at,
                transition: None,
                ..original
            };
            created.push(copy.id);
            self.clips.push(copy);
        }
        created
    }

    /// Remove clips, leaving gaps.
    pub fn delete_clips(&mut self, clip_ids: &[Uuid]) -> usize {
        let ids = self.editable_ids(clip_ids);
        let before = self.clips.len();
        self.clips.retain(|c| !ids.contains(&c.id));
        before - self.clips.len()
    }

    /// Remove clips and close each gap by pulling later clips on the same
    /// track left by the removed clip's duration.
    pub fn ripple_delete(&mut self, clip_ids: &[Uuid]) -> usize {
        let mut doomed: Vec<TimelineClip> = self
            .editable_ids(clip_ids)
            .into_iter()
            .filter_map(|id| self.clip(id).cloned())
            .collect();
        // Latest first so every shift is measured against current positions.
        doomed.sort_by_key(|c| std::cmp::Reverse(c.start));

        for removed in &doomed {
            self.clips.retain(|c| c.id != removed.id);
            let gap_end = removed.end();
            for clip in self
                .clips
                .iter_mut()
                .filter(|c| c.track_id == removed.track_id && c.start >= gap_end)
            {
                clip.start -= removed.duration;
            }
        }
        doomed.len()
    }

    /// Split a video clip's sound onto an audio track. The source clip is
    /// marked detached; the new audio clip's id is returned.
    pub fn detach_audio(&mut self, clip_id: Uuid) -> Option<Uuid> {
        if !self.is_clip_editable(clip_id) {
            return None;
        }
        let source = self.clip(clip_id)?.clone();
        if source.is_audio_detached {
            return None;
        }
        if self.track(source.track_id)?.kind != TrackKind::Video {
            return None;
        }
        if self.media(source.media_id)?.kind != MediaKind::Video {
            return None;
        }

        let target = self
            .tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Audio && !t.is_locked)
            .map(|t| t.id)
            .find(|track_id| self.is_range_free(*track_id, source.start, source.end(), &[]));
        let track_id = match target {
            Some(id) => id,
            None => self.add_track(TrackKind::Audio),
        };

        let audio = TimelineClip {
            id: Uuid::new_v4(),
            track_id,
            transition: None,
            effects: None,
            is_audio_detached: false,
            ..source
        };
        let audio_id = audio.id;
        self.clips.push(audio);
        if let Some(clip) = self.clip_mut(clip_id) {
            clip.is_audio_detached = true;
        }
        Some(audio_id)
    }

    pub fn set_clip_volume(&mut self, clip_id: Uuid, volume: f64) -> bool {
        if !self.is_clip_editable(clip_id) || !volume.is_finite() {
            return false;
        }
        let volume = volume.clamp(0.0, 1.0);
        match self.clip_mut(clip_id) {
            Some(clip) if clip.volume != volume => {
                clip.volume = volume;
                true
            }
            _ => false,
        }
    }

    /// Change playback speed keeping the same source range, so the clip's
    /// timeline duration becomes `source_span / speed`.
    pub fn set_clip_speed(&mut self, clip_id: Uuid, speed: f64) -> bool {
        if !self.is_clip_editable(clip_id) || !speed.is_finite() || speed <= 0.0 {
            return false;
        }
        let Some(clip) = self.clip(clip_id) else {
            return false;
        };
        if clip.speed == speed {
            return false;
        }
        let duration = clip.source_span().scale(1.0 / speed);
        if duration < MIN_CLIP_DURATION {
            return false;
        }
        if !self.is_range_free(clip.track_id, clip.start, clip.start + duration, &[clip_id]) {
            return false;
        }
        let Some(clip) = self.clip_mut(clip_id) else {
            return false;
        };
        clip.speed = speed;
        clip.duration = duration;
        if let Some(t) = clip.transition.as_mut() {
            t.duration = t.duration.min(duration);
        }
        true
    }

    /// Attach or clear the incoming transition. The transition cannot be
    /// longer than the clip.
    pub fn set_transition(&mut self, clip_id: Uuid, transition: Option<Transition>) -> bool {
        if !self.is_clip_editable(clip_id) {
            return false;
        }
        let Some(clip) = self.clip_mut(clip_id) else {
            return false;
        };
        if let Some(t) = &transition {
            if t.duration <= TimeUs::ZERO || t.duration > clip.duration {
                return false;
            }
        }
        if clip.transition == transition {
            return false;
        }
        clip.transition = transition;
        true
    }

    /// Neutral effects are stored as `None`.
    pub fn set_effects(&mut self, clip_id: Uuid, effects: Option<ClipEffects>) -> bool {
        if !self.is_clip_editable(clip_id) {
            return false;
        }
        let effects = effects.filter(|e| !e.is_neutral());
        match self.clip_mut(clip_id) {
            Some(clip) if clip.effects != effects => {
                clip.effects = effects;
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Track operations
    // -----------------------------------------------------------------------

    /// Append a track named after its kind and position ("Video 2").
    pub fn add_track(&mut self, kind: TrackKind) -> Uuid {
        let n = self.tracks.iter().filter(|t| t.kind == kind).count() + 1;
        let label = match kind {
            TrackKind::Video => "Video",
            TrackKind::Audio => "Audio",
        };
        let track = Track::new(format!("{label} {n}"), kind);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Move a track to a new position in the stacking order.
    pub fn reorder_track(&mut self, track_id: Uuid, new_index: usize) -> bool {
        let Some(idx) = self.track_index(track_id) else {
            return false;
        };
        if new_index >= self.tracks.len() || new_index == idx {
            return false;
        }
        let track = self.tracks.remove(idx);
        self.tracks.insert(new_index, track);
        true
    }

    /// Remove a track together with its clips.
    pub fn remove_track(&mut self, track_id: Uuid) -> bool {
        let Some(idx) = self.track_index(track_id) else {
            return false;
        };
        self.tracks.remove(idx);
        self.clips.retain(|c| c.track_id != track_id);
        true
    }

    pub fn set_track_volume(&mut self, track_id: Uuid, volume: f64) -> bool {
        if !volume.is_finite() {
            return false;
        }
        let volume = volume.clamp(0.0, 1.0);
        match self.track_mut(track_id) {
            Some(track) if track.volume != volume => {
                track.volume = volume;
                true
            }
            _ => false,
        }
    }

    pub fn set_track_muted(&mut self, track_id: Uuid, muted: bool) -> bool {
        match self.track_mut(track_id) {
            Some(track) if track.is_muted != muted => {
                track.is_muted = muted;
                true
            }
            _ => false,
        }
    }

    pub fn set_track_locked(&mut self, track_id: Uuid, locked: bool) -> bool {
        match self.track_mut(track_id) {
            Some(track) if track.is_locked != locked => {
                track.is_locked = locked;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> TimeUs {
        TimeUs::from_seconds(s)
    }

    /// One video track holding clips with the given (start, duration) pairs,
    /// all cut from a 60 second source.
    fn make_track(spans: &[(f64, f64)]) -> (TimelineState, Uuid, Vec<Uuid>) {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(MediaItem::ready(
            "source.mp4",
            MediaKind::Video,
            "source.mp4",
            secs(60.0),
            None,
        ));
        let track_id = state.tracks[0].id;
        let ids = spans
            .iter()
            .map(|&(start, duration)| {
                let clip = TimelineClip::new(media_id, track_id, secs(start), secs(duration));
                state.insert_clip(clip).unwrap()
            })
            .collect();
        (state, track_id, ids)
    }

    fn starts(state: &TimelineState, track_id: Uuid) -> Vec<TimeUs> {
        state.track_clips(track_id).iter().map(|c| c.start).collect()
    }

    // -----------------------------------------------------------------------
    // split
    // -----------------------------------------------------------------------

    #[test]
    fn split_produces_two_pieces() {
        let (mut state, track_id, ids) = make_track(&[(2.0, 6.0)]);
        state.clip_mut(ids[0]).unwrap().offset = secs(1.0);

        let right_id = state.split_clip(ids[0], secs(5.0)).unwrap();
        let left = state.clip(ids[0]).unwrap();
        let right = state.clip(right_id).unwrap();

        assert_eq!(left.start, secs(2.0));
        assert_eq!(left.duration, secs(3.0));
        assert_eq!(left.offset, secs(1.0));
        assert_eq!(right.start, secs(5.0));
        assert_eq!(right.duration, secs(3.0));
        assert_eq!(right.offset, secs(4.0));
        assert_eq!(state.track_clips(track_id).len(), 2);
    }

    #[test]
    fn split_then_rejoin_restores_original() {
        let (mut state, _, ids) = make_track(&[(1.25, 7.5)]);
        state.clip_mut(ids[0]).unwrap().offset = secs(0.75);
        let original = ClipSpan::of(state.clip(ids[0]).unwrap());

        for at in [1.35, 3.0, 4.123456, 8.65] {
            let mut copy = state.clone();
            let right_id = copy.split_clip(ids[0], secs(at)).unwrap();
            let left = copy.clip(ids[0]).unwrap();
            let right = copy.clip(right_id).unwrap();

            let rejoined = ClipSpan {
                start: left.start,
                duration: left.duration + right.duration,
                offset: left.offset,
            };
            assert_eq!(rejoined, original, "split at {at}");
            assert_eq!(right.offset, left.offset + left.duration);
        }
    }

    #[test]
    fn split_outside_or_at_edges_is_noop() {
        let (mut state, _, ids) = make_track(&[(2.0, 4.0)]);
        let before = state.clone();
        assert!(state.split_clip(ids[0], secs(2.0)).is_none());
        assert!(state.split_clip(ids[0], secs(6.0)).is_none());
        assert!(state.split_clip(ids[0], secs(9.0)).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn split_leaving_tiny_piece_is_noop() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0)]);
        assert!(state.split_clip(ids[0], secs(0.05)).is_none());
        assert!(state.split_clip(ids[0], secs(3.95)).is_none());
        assert!(state.split_clip(ids[0], secs(0.1)).is_some());
    }

    #[test]
    fn split_right_piece_drops_transition() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0)]);
        state.clip_mut(ids[0]).unwrap().transition = Some(Transition {
            kind: TransitionKind::CrossDissolve,
            duration: secs(1.0),
        });
        let right_id = state.split_clip(ids[0], secs(2.0)).unwrap();
        assert!(state.clip(ids[0]).unwrap().transition.is_some());
        assert!(state.clip(right_id).unwrap().transition.is_none());
    }

    #[test]
    fn split_scales_offset_by_speed() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0)]);
        state.clip_mut(ids[0]).unwrap().speed = 2.0;
        let right_id = state.split_clip(ids[0], secs(1.0)).unwrap();
        assert_eq!(state.clip(right_id).unwrap().offset, secs(2.0));
    }

    // -----------------------------------------------------------------------
    // move
    // -----------------------------------------------------------------------

    #[test]
    fn move_clamps_at_zero() {
        let (mut state, _, ids) = make_track(&[(2.0, 1.0)]);
        let applied = state.move_clips(&ids, secs(-5.0));
        assert_eq!(applied, secs(-2.0));
        assert_eq!(state.clip(ids[0]).unwrap().start, TimeUs::ZERO);
    }

    #[test]
    fn huge_deltas_saturate_at_the_end_of_time() {
        let (mut state, _, ids) = make_track(&[(2.0, 1.0)]);
        let applied = state.move_clips(&ids, TimeUs::MAX);
        assert_eq!(applied, TimeUs::MAX - secs(3.0));
        assert_eq!(state.clip(ids[0]).unwrap().end(), TimeUs::MAX);
    }

    #[test]
    fn move_clamps_against_neighbor() {
        let (mut state, _, ids) = make_track(&[(0.0, 2.0), (5.0, 2.0)]);
        let applied = state.move_clips(&[ids[0]], secs(10.0));
        assert_eq!(applied, secs(3.0));
        assert_eq!(state.clip(ids[0]).unwrap().end(), secs(5.0));

        let applied = state.move_clips(&[ids[1]], secs(-1.0));
        assert_eq!(applied, TimeUs::ZERO);
    }

    #[test]
    fn move_selection_moves_together() {
        let (mut state, track_id, ids) = make_track(&[(1.0, 1.0), (2.0, 1.0), (6.0, 1.0)]);
        let applied = state.move_clips(&ids[..2], secs(10.0));
        // limited by the third clip at 6.0
        assert_eq!(applied, secs(3.0));
        assert_eq!(starts(&state, track_id), vec![secs(4.0), secs(5.0), secs(6.0)]);
    }

    #[test]
    fn move_across_tracks_uses_tightest_bound() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 1.0), (3.0, 1.0)]);
        let second_track = state.add_track(TrackKind::Video);
        let media_id = state.media[0].id;
        let other = state
            .insert_clip(TimelineClip::new(media_id, second_track, secs(0.0), secs(1.0)))
            .unwrap();
        state
            .insert_clip(TimelineClip::new(media_id, second_track, secs(1.5), secs(1.0)))
            .unwrap();

        let applied = state.move_clips(&[ids[0], other], secs(5.0));
        assert_eq!(applied, secs(0.5));
        assert_eq!(state.clip(ids[0]).unwrap().start, secs(0.5));
        assert_eq!(starts(&state, track_id)[1], secs(3.0));
    }

    #[test]
    fn move_on_locked_track_is_noop() {
        let (mut state, track_id, ids) = make_track(&[(1.0, 1.0)]);
        state.set_track_locked(track_id, true);
        assert_eq!(state.move_clips(&ids, secs(1.0)), TimeUs::ZERO);
        assert_eq!(state.clip(ids[0]).unwrap().start, secs(1.0));
    }

    // -----------------------------------------------------------------------
    // trim
    // -----------------------------------------------------------------------

    #[test]
    fn trim_start_keeps_end_fixed() {
        let (mut state, _, ids) = make_track(&[(2.0, 4.0)]);
        assert!(state.trim_start(ids[0], secs(1.0)));
        let clip = state.clip(ids[0]).unwrap();
        assert_eq!(clip.start, secs(3.0));
        assert_eq!(clip.offset, secs(1.0));
        assert_eq!(clip.duration, secs(3.0));
        assert_eq!(clip.end(), secs(6.0));
    }

    #[test]
    fn trim_start_cannot_extend_before_source_start() {
        let (mut state, _, ids) = make_track(&[(2.0, 4.0)]);
        state.clip_mut(ids[0]).unwrap().offset = secs(0.5);
        assert!(state.trim_start(ids[0], secs(-3.0)));
        let clip = state.clip(ids[0]).unwrap();
        assert_eq!(clip.offset, TimeUs::ZERO);
        assert_eq!(clip.start, secs(1.5));
        assert_eq!(clip.duration, secs(4.5));
    }

    #[test]
    fn trim_start_respects_minimum_duration() {
        let (mut state, _, ids) = make_track(&[(0.0, 1.0)]);
        assert!(state.trim_start(ids[0], secs(5.0)));
        assert_eq!(state.clip(ids[0]).unwrap().duration, MIN_CLIP_DURATION);
        assert!(!state.trim_start(ids[0], secs(1.0)));
    }

    #[test]
    fn trim_end_stops_at_neighbor_and_source() {
        let (mut state, _, ids) = make_track(&[(0.0, 2.0), (3.0, 2.0)]);
        assert!(state.trim_end(ids[0], secs(5.0)));
        assert_eq!(state.clip(ids[0]).unwrap().end(), secs(3.0));

        // second clip is limited by the 60 s source
        assert!(state.trim_end(ids[1], secs(100.0)));
        assert_eq!(state.clip(ids[1]).unwrap().duration, secs(60.0));
    }

    #[test]
    fn trim_end_shrink_respects_minimum() {
        let (mut state, _, ids) = make_track(&[(0.0, 2.0)]);
        assert!(state.trim_end(ids[0], secs(-5.0)));
        assert_eq!(state.clip(ids[0]).unwrap().duration, MIN_CLIP_DURATION);
        assert!(!state.trim_end(ids[0], secs(-1.0)));
    }

    // -----------------------------------------------------------------------
    // duplicate
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_ripples_later_clips() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 2.0), (2.0, 3.0), (6.0, 1.0)]);
        state.clip_mut(ids[0]).unwrap().transition = Some(Transition {
            kind: TransitionKind::FadeToBlack,
            duration: secs(0.5),
        });

        let created = state.duplicate_clips(&[ids[0]]);
        assert_eq!(created.len(), 1);
        let copy = state.clip(created[0]).unwrap();
        assert_eq!(copy.start, secs(2.0));
        assert_eq!(copy.duration, secs(2.0));
        assert!(copy.transition.is_none());
        assert_eq!(
            starts(&state, track_id),
            vec![secs(0.0), secs(2.0), secs(4.0), secs(8.0)]
        );
    }

    // -----------------------------------------------------------------------
    // delete / ripple delete
    // -----------------------------------------------------------------------

    #[test]
    fn ripple_delete_first_of_three() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 3.0), (3.0, 4.0), (7.0, 5.0)]);
        assert_eq!(state.ripple_delete(&[ids[0]]), 1);
        assert_eq!(starts(&state, track_id), vec![secs(0.0), secs(4.0)]);
    }

    #[test]
    fn ripple_delete_conserves_span() {
        let (mut state, track_id, ids) = make_track(&[(1.0, 2.0), (4.0, 1.5), (6.0, 3.0), (10.0, 1.0)]);
        let span_before = state.duration() - state.track_clips(track_id)[0].start;
        let later_before: Vec<TimeUs> = starts(&state, track_id)[2..].to_vec();

        state.ripple_delete(&[ids[1]]);

        let later_after: Vec<TimeUs> = starts(&state, track_id)[1..].to_vec();
        for (before, after) in later_before.iter().zip(&later_after) {
            assert_eq!(*before - *after, secs(1.5));
        }
        let span_after = state.duration() - state.track_clips(track_id)[0].start;
        assert_eq!(span_before - span_after, secs(1.5));
    }

    #[test]
    fn ripple_delete_multiple_on_one_track() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 3.0), (3.0, 4.0), (7.0, 5.0)]);
        assert_eq!(state.ripple_delete(&[ids[0], ids[1]]), 2);
        assert_eq!(starts(&state, track_id), vec![secs(0.0)]);
    }

    #[test]
    fn repeated_ids_in_selection_count_once() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 3.0), (3.0, 1.0), (10.0, 2.0)]);
        assert_eq!(state.ripple_delete(&[ids[0], ids[1], ids[0]]), 2);
        assert_eq!(starts(&state, track_id), vec![secs(6.0)]);

        let (mut state, track_id, ids) = make_track(&[(0.0, 2.0), (2.0, 1.0), (5.0, 1.0)]);
        let created = state.duplicate_clips(&[ids[0], ids[1], ids[0]]);
        assert_eq!(created.len(), 2);
        assert_eq!(state.track_clips(track_id).len(), 5);

        let (mut state, track_id, ids) = make_track(&[(0.0, 2.0), (2.0, 1.0), (5.0, 1.0)]);
        assert_eq!(state.delete_clips(&[ids[2], ids[0], ids[2]]), 2);
        assert_eq!(starts(&state, track_id), vec![secs(2.0)]);
    }

    #[test]
    fn delete_leaves_gap() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 3.0), (3.0, 4.0), (7.0, 5.0)]);
        assert_eq!(state.delete_clips(&[ids[1]]), 1);
        assert_eq!(starts(&state, track_id), vec![secs(0.0), secs(7.0)]);
        assert_eq!(state.delete_clips(&[Uuid::new_v4()]), 0);
    }

    // -----------------------------------------------------------------------
    // detach audio
    // -----------------------------------------------------------------------

    #[test]
    fn detach_audio_uses_free_audio_track() {
        let (mut state, _, ids) = make_track(&[(1.0, 3.0)]);
        let audio_track = state.tracks[1].id;

        let audio_id = state.detach_audio(ids[0]).unwrap();
        assert!(state.clip(ids[0]).unwrap().is_audio_detached);
        let audio = state.clip(audio_id).unwrap();
        assert_eq!(audio.track_id, audio_track);
        assert_eq!(audio.start, secs(1.0));
        assert_eq!(audio.duration, secs(3.0));
        assert!(!audio.is_audio_detached);

        // second detach is a no-op
        assert!(state.detach_audio(ids[0]).is_none());
    }

    #[test]
    fn detach_audio_adds_track_on_collision() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0)]);
        let audio_track = state.tracks[1].id;
        let sound = state.add_media(MediaItem::ready("music.wav", MediaKind::Audio, "music.wav", secs(10.0), None));
        state.add_clip(sound, audio_track, secs(2.0)).unwrap();

        let audio_id = state.detach_audio(ids[0]).unwrap();
        let audio = state.clip(audio_id).unwrap();
        assert_ne!(audio.track_id, audio_track);
        let track = state.track(audio.track_id).unwrap();
        assert_eq!(track.kind, TrackKind::Audio);
        assert_eq!(track.name, "Audio 2");
    }

    #[test]
    fn detach_audio_ignores_images() {
        let mut state = TimelineState::with_default_tracks();
        let image = state.add_media(MediaItem::ready("a.png", MediaKind::Image, "a.png", TimeUs::ZERO, None));
        let track_id = state.tracks[0].id;
        let clip_id = state.add_clip(image, track_id, TimeUs::ZERO).unwrap();
        assert!(state.detach_audio(clip_id).is_none());
    }

    // -----------------------------------------------------------------------
    // properties
    // -----------------------------------------------------------------------

    #[test]
    fn set_speed_rescales_duration() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0)]);
        assert!(state.set_clip_speed(ids[0], 2.0));
        let clip = state.clip(ids[0]).unwrap();
        assert_eq!(clip.duration, secs(2.0));
        assert_eq!(clip.source_span(), secs(4.0));
    }

    #[test]
    fn set_speed_blocked_by_neighbor() {
        let (mut state, _, ids) = make_track(&[(0.0, 4.0), (4.0, 1.0)]);
        assert!(!state.set_clip_speed(ids[0], 0.5));
        assert!(!state.set_clip_speed(ids[0], 0.0));
        assert_eq!(state.clip(ids[0]).unwrap().speed, 1.0);
    }

    #[test]
    fn transition_longer_than_clip_is_rejected() {
        let (mut state, _, ids) = make_track(&[(0.0, 2.0)]);
        let long = Transition {
            kind: TransitionKind::CrossDissolve,
            duration: secs(3.0),
        };
        assert!(!state.set_transition(ids[0], Some(long)));
        let short = Transition {
            duration: secs(1.0),
            ..long
        };
        assert!(state.set_transition(ids[0], Some(short)));
        assert!(!state.set_transition(ids[0], Some(short)));
    }

    #[test]
    fn neutral_effects_are_cleared() {
        let (mut state, _, ids) = make_track(&[(0.0, 2.0)]);
        let warm = ClipEffects {
            hue_rotate: 15.0,
            ..Default::default()
        };
        assert!(state.set_effects(ids[0], Some(warm)));
        assert!(state.set_effects(ids[0], Some(ClipEffects::default())));
        assert!(state.clip(ids[0]).unwrap().effects.is_none());
    }

    #[test]
    fn volumes_are_clamped() {
        let (mut state, track_id, ids) = make_track(&[(0.0, 2.0)]);
        assert!(state.set_clip_volume(ids[0], 3.0));
        assert_eq!(state.clip(ids[0]).unwrap().volume, 1.0);
        assert!(state.set_track_volume(track_id, -1.0));
        assert_eq!(state.track(track_id).unwrap().volume, 0.0);
    }

    // -----------------------------------------------------------------------
    // tracks
    // -----------------------------------------------------------------------

    #[test]
    fn add_and_reorder_tracks() {
        let mut state = TimelineState::with_default_tracks();
        let v2 = state.add_track(TrackKind::Video);
        assert_eq!(state.track(v2).unwrap().name, "Video 2");
        assert_eq!(state.track_index(v2), Some(2));

        assert!(state.reorder_track(v2, 0));
        assert_eq!(state.track_index(v2), Some(0));
        assert!(!state.reorder_track(v2, 0));
        assert!(!state.reorder_track(v2, 10));
    }

    #[test]
    fn remove_track_cascades_clips() {
        let (mut state, track_id, _) = make_track(&[(0.0, 1.0), (2.0, 1.0)]);
        assert!(state.remove_track(track_id));
        assert!(state.clips.is_empty());
        assert!(!state.remove_track(track_id));
    }
}
