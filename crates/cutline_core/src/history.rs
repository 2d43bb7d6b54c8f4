use crate::state::TimelineState;
use crate::types::*;

/// The editable part of the timeline as it was before an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub label: String,
    pub tracks: Vec<Track>,
    pub clips: Vec<TimelineClip>,
}

impl HistorySnapshot {
    pub fn capture(state: &TimelineState, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tracks: state.tracks.clone(),
            clips: state.clips.clone(),
        }
    }

    fn restore_into(self, state: &mut TimelineState) {
        state.tracks = self.tracks;
        state.clips = self.clips;
    }

    /// Whether the state still matches this snapshot.
    pub fn matches(&self, state: &TimelineState) -> bool {
        self.tracks == state.tracks && self.clips == state.clips
    }
}

/// Undo/redo over full snapshots of tracks and clips.
///
/// A snapshot is pushed right before each mutating operation. Media items
/// are owned by the library and are not part of the history.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<HistorySnapshot>,
    redo_stack: Vec<HistorySnapshot>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    /// Capture the current state ahead of a mutation. Clears the redo stack.
    pub fn push_snapshot(&mut self, state: &TimelineState, label: impl Into<String>) {
        self.push(HistorySnapshot::capture(state, label));
    }

    /// Push an already captured snapshot. Clears the redo stack.
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        self.redo_stack.clear();
        self.undo_stack.push(snapshot);
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    /// Restore the most recent snapshot. Returns false when there is nothing
    /// to undo.
    pub fn undo(&mut self, state: &mut TimelineState) -> bool {
        let Some(snapshot) = self.undo_stack.pop() else {
            return false;
        };
        self.redo_stack
            .push(HistorySnapshot::capture(state, snapshot.label.clone()));
        snapshot.restore_into(state);
        true
    }

    /// Re-apply the most recently undone state. Returns false when there is
    /// nothing to redo.
    pub fn redo(&mut self, state: &mut TimelineState) -> bool {
        let Some(snapshot) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack
            .push(HistorySnapshot::capture(state, snapshot.label.clone()));
        snapshot.restore_into(state);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|s| s.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|s| s.label.as_str())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_test_state() -> (TimelineState, Uuid) {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(MediaItem::ready(
            "clip.mp4",
            MediaKind::Video,
            "clip.mp4",
            TimeUs(30_000_000),
            None,
        ));
        let track_id = state.tracks[0].id;
        let clip_id = state.add_clip(media_id, track_id, TimeUs::ZERO).unwrap();
        state.clip_mut(clip_id).unwrap().duration = TimeUs(5_000_000);
        (state, clip_id)
    }

    #[test]
    fn undo_redo_single_edit() {
        let (mut state, clip_id) = make_test_state();
        let mut history = History::new(100);

        history.push_snapshot(&state, "Split clip");
        state.split_clip(clip_id, TimeUs(2_000_000)).unwrap();
        assert_eq!(state.clips.len(), 2);

        assert!(history.undo(&mut state));
        assert_eq!(state.clips.len(), 1);
        assert_eq!(state.clips[0].duration, TimeUs(5_000_000));

        assert!(history.redo(&mut state));
        assert_eq!(state.clips.len(), 2);
    }

    #[test]
    fn undo_redo_round_trip_over_sequence() {
        let (mut state, clip_id) = make_test_state();
        let mut history = History::new(100);

        history.push_snapshot(&state, "Split clip");
        let right = state.split_clip(clip_id, TimeUs(2_000_000)).unwrap();
        history.push_snapshot(&state, "Move clip");
        state.move_clips(&[right], TimeUs(1_000_000));
        history.push_snapshot(&state, "Trim end");
        state.trim_end(clip_id, TimeUs(-500_000));
        history.push_snapshot(&state, "Add track");
        state.add_track(TrackKind::Video);

        let edited = state.clone();
        for _ in 0..4 {
            assert!(history.undo(&mut state));
        }
        assert_eq!(state.clips.len(), 1);
        assert_eq!(state.tracks.len(), 2);
        for _ in 0..4 {
            assert!(history.redo(&mut state));
        }
        assert_eq!(state, edited);
    }

    #[test]
    fn new_snapshot_clears_redo() {
        let (mut state, clip_id) = make_test_state();
        let mut history = History::new(100);

        history.push_snapshot(&state, "Delete clip");
        state.delete_clips(&[clip_id]);
        history.undo(&mut state);
        assert!(history.can_redo());

        history.push_snapshot(&state, "Add track");
        state.add_track(TrackKind::Audio);
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_and_redo_keep_each_other() {
        let (mut state, clip_id) = make_test_state();
        let mut history = History::new(100);
        history.push_snapshot(&state, "Delete clip");
        state.delete_clips(&[clip_id]);

        // undo/redo themselves never clear the opposite stack
        history.undo(&mut state);
        history.redo(&mut state);
        history.undo(&mut state);
        assert!(history.can_redo());
        assert!(!history.can_undo());
    }

    #[test]
    fn empty_stacks_are_noops() {
        let (mut state, _) = make_test_state();
        let before = state.clone();
        let mut history = History::new(100);
        assert!(!history.undo(&mut state));
        assert!(!history.redo(&mut state));
        assert_eq!(state, before);
    }

    #[test]
    fn max_size_limits_undo_stack() {
        let (mut state, _) = make_test_state();
        let mut history = History::new(3);

        for _ in 0..5 {
            history.push_snapshot(&state, "Add track");
            state.add_track(TrackKind::Video);
        }
        assert_eq!(state.tracks.len(), 7);

        assert!(history.undo(&mut state));
        assert!(history.undo(&mut state));
        assert!(history.undo(&mut state));
        assert!(!history.undo(&mut state));
        assert_eq!(state.tracks.len(), 4);
    }

    #[test]
    fn labels_follow_stacks() {
        let (mut state, clip_id) = make_test_state();
        let mut history = History::new(100);
        assert_eq!(history.undo_label(), None);

        history.push_snapshot(&state, "Ripple delete");
        state.ripple_delete(&[clip_id]);
        assert_eq!(history.undo_label(), Some("Ripple delete"));

        history.undo(&mut state);
        assert_eq!(history.redo_label(), Some("Ripple delete"));
        assert_eq!(history.undo_label(), None);
    }

    #[test]
    fn media_is_not_rolled_back() {
        let (mut state, _) = make_test_state();
        let mut history = History::new(100);
        history.push_snapshot(&state, "Add track");
        state.add_track(TrackKind::Audio);
        state.add_media(MediaItem::generating("pending", MediaKind::Image, "1:1"));

        history.undo(&mut state);
        assert_eq!(state.media.len(), 2);
    }
}
