//! Pointer-driven clip manipulation.
//!
//! `Idle -> Dragging(mode) -> Idle`. Every pointer move recomputes clip
//! positions from the spans captured at `begin`, so repeated updates never
//! accumulate rounding drift.

use crate::editing::{ClipSpan, DeltaBounds};
use crate::snapping::{best_snap_delta, collect_snap_points, px_to_time, SnapHit, SnapLock, SnapSettings};
use crate::state::TimelineState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragMode {
    Move,
    TrimStart,
    TrimEnd,
}

/// Viewport facts needed to interpret pointer positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragView {
    pub pixels_per_second: f64,
    pub playhead: TimeUs,
}

#[derive(Debug, Clone)]
struct Captured {
    id: Uuid,
    span: ClipSpan,
    speed: f64,
}

#[derive(Debug, Clone)]
pub struct DragSession {
    mode: DragMode,
    origin_x: f64,
    captured: Vec<Captured>,
    bounds: DeltaBounds,
    edges: Vec<TimeUs>,
    snap_points: Vec<TimeUs>,
    lock: SnapLock,
    delta: TimeUs,
    snapped: Option<SnapHit>,
}

impl DragSession {
    pub fn mode(&self) -> DragMode {
        self.mode
    }

    pub fn clip_ids(&self) -> Vec<Uuid> {
        self.captured.iter().map(|c| c.id).collect()
    }

    pub fn bounds(&self) -> DeltaBounds {
        self.bounds
    }

    pub fn delta(&self) -> TimeUs {
        self.delta
    }

    /// Timeline position the dragged edge is currently snapped to.
    pub fn snapped_to(&self) -> Option<TimeUs> {
        self.snapped.map(|hit| hit.point)
    }
}

#[derive(Debug, Clone, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// Result of one pointer move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragUpdate {
    pub delta: TimeUs,
    pub snapped_to: Option<TimeUs>,
}

/// Result of releasing the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct DragOutcome {
    pub mode: DragMode,
    pub clip_ids: Vec<Uuid>,
    pub delta: TimeUs,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DragEngine {
    state: DragState,
    pub snap: SnapSettings,
}

impl DragEngine {
    pub fn new(snap: SnapSettings) -> Self {
        Self {
            state: DragState::Idle,
            snap,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.state {
            DragState::Dragging(session) => Some(session),
            DragState::Idle => None,
        }
    }

    /// Start dragging the selected clips. The first editable id is the lead
    /// clip whose edges are snapped. Returns false (and stays idle) when no
    /// selected clip can be edited or a drag is already running.
    pub fn begin(
        &mut self,
        timeline: &TimelineState,
        mode: DragMode,
        clip_ids: &[Uuid],
        pointer_x: f64,
        view: DragView,
    ) -> bool {
        if self.is_dragging() {
            return false;
        }
        let mut captured: Vec<Captured> = Vec::new();
        for id in clip_ids {
            if captured.iter().any(|c| c.id == *id) || !timeline.is_clip_editable(*id) {
                continue;
            }
            if let Some(clip) = timeline.clip(*id) {
                captured.push(Captured {
                    id: clip.id,
                    span: ClipSpan::of(clip),
                    speed: clip.speed,
                });
            }
        }
        let Some(lead) = captured.first() else {
            return false;
        };

        let ids: Vec<Uuid> = captured.iter().map(|c| c.id).collect();
        let bounds = match mode {
            DragMode::Move => timeline.move_bounds(&ids),
            DragMode::TrimStart => tightest(ids.iter().filter_map(|id| timeline.trim_start_bounds(*id))),
            DragMode::TrimEnd => tightest(ids.iter().filter_map(|id| timeline.trim_end_bounds(*id))),
        };
        let edges = match mode {
            DragMode::Move => vec![lead.span.start, lead.span.end()],
            DragMode::TrimStart => vec![lead.span.start],
            DragMode::TrimEnd => vec![lead.span.end()],
        };

        self.state = DragState::Dragging(DragSession {
            mode,
            origin_x: pointer_x,
            captured,
            bounds,
            edges,
            snap_points: collect_snap_points(timeline, &ids, Some(view.playhead)),
            lock: SnapLock::default(),
            delta: TimeUs::ZERO,
            snapped: None,
        });
        true
    }

    /// Apply a pointer move. Returns `None` when idle.
    pub fn update(&mut self, timeline: &mut TimelineState, pointer_x: f64, view: DragView) -> Option<DragUpdate> {
        let DragState::Dragging(session) = &mut self.state else {
            return None;
        };

        let raw = px_to_time(pointer_x - session.origin_x, view.pixels_per_second);
        let free = session.bounds.clamp(raw);
        let mut delta = free;
        let mut snapped = None;

        if self.snap.enabled {
            let threshold = px_to_time(self.snap.threshold_px, view.pixels_per_second);
            let break_threshold = px_to_time(self.snap.break_threshold_px, view.pixels_per_second);

            let held = if self.snap.lock {
                session.lock.hold(free, threshold, break_threshold)
            } else {
                None
            };

            if let Some(pinned) = held {
                delta = pinned;
                snapped = session.snapped.filter(|hit| hit.delta == pinned);
            } else if let Some(hit) = best_snap_delta(
                &session.edges,
                free,
                &session.snap_points,
                self.snap.grid_interval,
                threshold,
                session.lock.ignored(),
            ) {
                if session.bounds.contains(hit.delta) {
                    delta = hit.delta;
                    snapped = Some(hit);
                    if self.snap.lock {
                        session.lock.engage(hit.delta);
                    }
                }
            }
        }

        session.delta = delta;
        session.snapped = snapped;
        for captured in &session.captured {
            let span = match session.mode {
                DragMode::Move => captured.span.moved(delta),
                DragMode::TrimStart => captured.span.trimmed_start(delta, captured.speed),
                DragMode::TrimEnd => captured.span.trimmed_end(delta),
            };
            if let Some(clip) = timeline.clip_mut(captured.id) {
                span.apply_to(clip);
            }
        }

        Some(DragUpdate {
            delta,
            snapped_to: session.snapped_to(),
        })
    }

    /// Release the pointer and return to idle.
    pub fn end(&mut self, timeline: &TimelineState) -> Option<DragOutcome> {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return None;
        };
        let changed = session.captured.iter().any(|c| {
            timeline
                .clip(c.id)
                .map(|clip| ClipSpan::of(clip) != c.span)
                .unwrap_or(false)
        });
        Some(DragOutcome {
            mode: session.mode,
            clip_ids: session.clip_ids(),
            delta: session.delta,
            changed,
        })
    }

    /// Abort the drag and put every clip back where it started.
    pub fn cancel(&mut self, timeline: &mut TimelineState) -> bool {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return false;
        };
        for captured in &session.captured {
            if let Some(clip) = timeline.clip_mut(captured.id) {
                captured.span.apply_to(clip);
            }
        }
        true
    }
}

fn tightest(bounds: impl Iterator<Item = DeltaBounds>) -> DeltaBounds {
    bounds.fold(DeltaBounds::UNBOUNDED, |acc, b| DeltaBounds {
        min: acc.min.max(b.min),
        max: acc.max.min(b.max),
    })
}
