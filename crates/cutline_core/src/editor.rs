use crate::drag::{DragEngine, DragMode, DragOutcome, DragUpdate, DragView};
use crate::error::Result;
use crate::history::{History, HistorySnapshot};
use crate::snapping::SnapSettings;
use crate::state::TimelineState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub snap: SnapSettings,
    /// Undo steps kept before the oldest is dropped.
    pub history_depth: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap: SnapSettings::default(),
            history_depth: 100,
        }
    }
}

/// Single writer for the live timeline.
///
/// Every mutating call snapshots the state first and keeps the snapshot as an
/// undo step only when the call actually changed something. Preview and
/// export work from [`Editor::snapshot`] so later edits never reach them.
#[derive(Debug, Clone)]
pub struct Editor {
    state: TimelineState,
    history: History,
    drag: DragEngine,
    drag_snapshot: Option<HistorySnapshot>,
    config: EditorConfig,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_state(TimelineState::with_default_tracks(), config)
    }

    pub fn with_state(state: TimelineState, config: EditorConfig) -> Self {
        Self {
            state,
            history: History::new(config.history_depth),
            drag: DragEngine::new(config.snap.clone()),
            drag_snapshot: None,
            config,
        }
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    /// Detached copy for readers.
    pub fn snapshot(&self) -> TimelineState {
        self.state.clone()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_snap_settings(&mut self, snap: SnapSettings) {
        self.drag.snap = snap.clone();
        self.config.snap = snap;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn record<R>(&mut self, label: &str, op: impl FnOnce(&mut TimelineState) -> R) -> R {
        let before = HistorySnapshot::capture(&self.state, label);
        let result = op(&mut self.state);
        if !before.matches(&self.state) {
            self.history.push(before);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Media library
    // -----------------------------------------------------------------------

    pub fn add_media(&mut self, media: MediaItem) -> Uuid {
        self.state.add_media(media)
    }

    /// Lets the import/generation collaborator update status.
    pub fn media_mut(&mut self, media_id: Uuid) -> Option<&mut MediaItem> {
        self.state.media_mut(media_id)
    }

    /// Remove a media item. A cascade that takes clips with it clears the
    /// history, since no undo step may bring back clips without their media.
    pub fn remove_media(&mut self, media_id: Uuid, cascade: bool) -> Result<MediaItem> {
        let clips_before = self.state.clips.len();
        let removed = self.state.remove_media(media_id, cascade)?;
        if self.state.clips.len() != clips_before {
            self.history.clear();
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    pub fn add_clip(&mut self, media_id: Uuid, track_id: Uuid, start: TimeUs) -> Result<Uuid> {
        self.record("Add clip", |s| s.add_clip(media_id, track_id, start))
    }

    pub fn insert_clip(&mut self, clip: TimelineClip) -> Result<Uuid> {
        self.record("Add clip", |s| s.insert_clip(clip))
    }

    pub fn split_clip(&mut self, clip_id: Uuid, at: TimeUs) -> Option<Uuid> {
        self.record("Split clip", |s| s.split_clip(clip_id, at))
    }

    pub fn move_clips(&mut self, clip_ids: &[Uuid], delta: TimeUs) -> TimeUs {
        self.record("Move clips", |s| s.move_clips(clip_ids, delta))
    }

    pub fn trim_start(&mut self, clip_id: Uuid, delta: TimeUs) -> bool {
        self.record("Trim start", |s| s.trim_start(clip_id, delta))
    }

    pub fn trim_end(&mut self, clip_id: Uuid, delta: TimeUs) -> bool {
        self.record("Trim end", |s| s.trim_end(clip_id, delta))
    }

    pub fn duplicate_clips(&mut self, clip_ids: &[Uuid]) -> Vec<Uuid> {
        self.record("Duplicate clips", |s| s.duplicate_clips(clip_ids))
    }

    pub fn delete_clips(&mut self, clip_ids: &[Uuid]) -> usize {
        self.record("Delete clips", |s| s.delete_clips(clip_ids))
    }

    pub fn ripple_delete(&mut self, clip_ids: &[Uuid]) -> usize {
        self.record("Ripple delete", |s| s.ripple_delete(clip_ids))
    }

    pub fn detach_audio(&mut self, clip_id: Uuid) -> Option<Uuid> {
        self.record("Detach audio", |s| s.detach_audio(clip_id))
    }

    pub fn set_clip_volume(&mut self, clip_id: Uuid, volume: f64) -> bool {
        self.record("Clip volume", |s| s.set_clip_volume(clip_id, volume))
    }

    pub fn set_clip_speed(&mut self, clip_id: Uuid, speed: f64) -> bool {
        self.record("Clip speed", |s| s.set_clip_speed(clip_id, speed))
    }

    pub fn set_transition(&mut self, clip_id: Uuid, transition: Option<Transition>) -> bool {
        self.record("Transition", |s| s.set_transition(clip_id, transition))
    }

    pub fn set_effects(&mut self, clip_id: Uuid, effects: Option<ClipEffects>) -> bool {
        self.record("Effects", |s| s.set_effects(clip_id, effects))
    }

    pub fn add_track(&mut self, kind: TrackKind) -> Uuid {
        self.record("Add track", |s| s.add_track(kind))
    }

    pub fn reorder_track(&mut self, track_id: Uuid, new_index: usize) -> bool {
        self.record("Reorder track", |s| s.reorder_track(track_id, new_index))
    }

    pub fn remove_track(&mut self, track_id: Uuid) -> bool {
        self.record("Remove track", |s| s.remove_track(track_id))
    }

    pub fn set_track_volume(&mut self, track_id: Uuid, volume: f64) -> bool {
        self.record("Track volume", |s| s.set_track_volume(track_id, volume))
    }

    pub fn set_track_muted(&mut self, track_id: Uuid, muted: bool) -> bool {
        self.record("Mute track", |s| s.set_track_muted(track_id, muted))
    }

    pub fn set_track_locked(&mut self, track_id: Uuid, locked: bool) -> bool {
        self.record("Lock track", |s| s.set_track_locked(track_id, locked))
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// A running drag is cancelled first.
    pub fn undo(&mut self) -> bool {
        self.cancel_drag();
        self.history.undo(&mut self.state)
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_drag();
        self.history.redo(&mut self.state)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // -----------------------------------------------------------------------
    // Drag
    // -----------------------------------------------------------------------

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    pub fn begin_drag(&mut self, mode: DragMode, clip_ids: &[Uuid], pointer_x: f64, view: DragView) -> bool {
        if !self.drag.begin(&self.state, mode, clip_ids, pointer_x, view) {
            return false;
        }
        let label = match mode {
            DragMode::Move => "Move clips",
            DragMode::TrimStart => "Trim start",
            DragMode::TrimEnd => "Trim end",
        };
        self.drag_snapshot = Some(HistorySnapshot::capture(&self.state, label));
        true
    }

    pub fn update_drag(&mut self, pointer_x: f64, view: DragView) -> Option<DragUpdate> {
        self.drag.update(&mut self.state, pointer_x, view)
    }

    /// Commit the drag as one undo step, or none if nothing moved.
    pub fn end_drag(&mut self) -> Option<DragOutcome> {
        let outcome = self.drag.end(&self.state)?;
        if let Some(snapshot) = self.drag_snapshot.take() {
            if outcome.changed {
                self.history.push(snapshot);
            }
        }
        Some(outcome)
    }

    pub fn cancel_drag(&mut self) -> bool {
        self.drag_snapshot = None;
        self.drag.cancel(&mut self.state)
    }
}
