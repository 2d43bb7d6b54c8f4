use crate::state::TimelineState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapping behaviour for interactive drags. Distances are in screen pixels
/// and converted to time with the current zoom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapSettings {
    pub enabled: bool,
    /// Grid tick spacing; `None` disables grid snapping.
    pub grid_interval: Option<TimeUs>,
    /// Attraction radius.
    pub threshold_px: f64,
    /// Keep the clip pinned to a snap point until the pointer breaks away.
    pub lock: bool,
    /// Distance the pointer must travel from a locked point to release it.
    pub break_threshold_px: f64,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grid_interval: Some(TimeUs(1_000_000)),
            threshold_px: 10.0,
            lock: false,
            break_threshold_px: 30.0,
        }
    }
}

/// Convert a pixel distance to time at `pixels_per_second` zoom.
pub fn px_to_time(px: f64, pixels_per_second: f64) -> TimeUs {
    if pixels_per_second <= 0.0 {
        return TimeUs::ZERO;
    }
    TimeUs::from_seconds(px / pixels_per_second)
}

/// Find the nearest snap point within the threshold.
/// Returns the snapped position if within threshold, otherwise the original position.
pub fn find_snap_point(position_us: TimeUs, snap_points: &[TimeUs], threshold_us: TimeUs) -> TimeUs {
    nearest_within(position_us, snap_points.iter().copied(), threshold_us).unwrap_or(position_us)
}

/// Closest grid tick to `position`.
pub fn nearest_grid_point(position: TimeUs, interval: TimeUs) -> Option<TimeUs> {
    if interval <= TimeUs::ZERO {
        return None;
    }
    let ticks = (position.0 as f64 / interval.0 as f64).round() as i64;
    ticks.checked_mul(interval.0).map(TimeUs)
}

fn nearest_within(
    position: TimeUs,
    points: impl Iterator<Item = TimeUs>,
    threshold: TimeUs,
) -> Option<TimeUs> {
    let mut best: Option<(TimeUs, TimeUs)> = None;
    for point in points {
        let dist = position.saturating_sub(point).abs();
        if dist > threshold {
            continue;
        }
        match best {
            Some((_, best_dist)) if best_dist <= dist => {}
            _ => best = Some((point, dist)),
        }
    }
    best.map(|(point, _)| point)
}

/// Collect the fixed snap points of a timeline: zero, the playhead, and the
/// start and end of every clip not being dragged.
pub fn collect_snap_points(
    state: &TimelineState,
    exclude_clip_ids: &[Uuid],
    playhead: Option<TimeUs>,
) -> Vec<TimeUs> {
    let mut points = vec![TimeUs::ZERO];
    points.extend(playhead);

    for clip in &state.clips {
        if exclude_clip_ids.contains(&clip.id) {
            continue;
        }
        points.push(clip.start);
        points.push(clip.end());
    }

    points.sort();
    points.dedup();
    points
}

/// A snap found for a drag: the delta to apply and the point it lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapHit {
    pub delta: TimeUs,
    pub point: TimeUs,
}

/// Best snapping delta for a set of dragged edges.
///
/// Each edge is tested at `edge + raw_delta` against the fixed points and the
/// nearest grid tick; the closest candidate within `threshold` wins and the
/// delta that lands the edge on it is returned. `ignore` suppresses one
/// candidate delta (a point the user just broke away from).
pub fn best_snap_delta(
    edges: &[TimeUs],
    raw_delta: TimeUs,
    points: &[TimeUs],
    grid_interval: Option<TimeUs>,
    threshold: TimeUs,
    ignore: Option<TimeUs>,
) -> Option<SnapHit> {
    let mut best: Option<(SnapHit, TimeUs)> = None;
    for &edge in edges {
        let position = edge.saturating_add(raw_delta);
        let grid = grid_interval.and_then(|i| nearest_grid_point(position, i));
        for point in points.iter().copied().chain(grid) {
            let dist = position.saturating_sub(point).abs();
            let delta = point.saturating_sub(edge);
            if dist > threshold || Some(delta) == ignore {
                continue;
            }
            match best {
                Some((_, best_dist)) if best_dist <= dist => {}
                _ => best = Some((SnapHit { delta, point }, dist)),
            }
        }
    }
    best.map(|(hit, _)| hit)
}

/// Snap lock with break-through.
///
/// Once a drag snaps, the delta stays pinned to the snapped value until the
/// free (unsnapped) delta moves more than the break distance away. The point
/// that was broken away from is then ignored until the pointer leaves its
/// normal attraction radius, so free dragging resumes immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapLock {
    locked: Option<TimeUs>,
    released: Option<TimeUs>,
}

impl SnapLock {
    pub fn locked(&self) -> Option<TimeUs> {
        self.locked
    }

    /// Candidate delta to ignore when searching for a new snap.
    pub fn ignored(&self) -> Option<TimeUs> {
        self.released
    }

    /// Returns the pinned delta while the lock holds. Releases it (and
    /// returns `None`) once `free_delta` breaks through.
    pub fn hold(&mut self, free_delta: TimeUs, threshold: TimeUs, break_threshold: TimeUs) -> Option<TimeUs> {
        if let Some(released) = self.released {
            if free_delta.saturating_sub(released).abs() > threshold {
                self.released = None;
            }
        }
        let locked = self.locked?;
        if free_delta.saturating_sub(locked).abs() <= break_threshold {
            return Some(locked);
        }
        self.locked = None;
        self.released = Some(locked);
        None
    }

    pub fn engage(&mut self, delta: TimeUs) {
        self.locked = Some(delta);
        self.released = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state_with_clips() -> (TimelineState, Uuid) {
        let mut state = TimelineState::with_default_tracks();
        let media_id = state.add_media(MediaItem::ready(
            "clip.mp4",
            MediaKind::Video,
            "clip.mp4",
            TimeUs(3_000_000),
            None,
        ));
        let track_id = state.tracks[0].id;
        let first = state.add_clip(media_id, track_id, TimeUs(1_000_000)).unwrap();
        state.add_clip(media_id, track_id, TimeUs(5_000_000)).unwrap();
        (state, first)
    }

    #[test]
    fn snap_to_nearest_point() {
        let points = vec![TimeUs(0), TimeUs(1_000_000), TimeUs(5_000_000)];
        let threshold = TimeUs(200_000);

        let result = find_snap_point(TimeUs(1_100_000), &points, threshold);
        assert_eq!(result, TimeUs(1_000_000));
    }

    #[test]
    fn no_snap_beyond_threshold() {
        let points = vec![TimeUs(0), TimeUs(1_000_000), TimeUs(5_000_000)];
        let threshold = TimeUs(200_000);

        let result = find_snap_point(TimeUs(3_000_000), &points, threshold);
        assert_eq!(result, TimeUs(3_000_000));
    }

    #[test]
    fn exact_match_snaps_to_itself() {
        let points = vec![TimeUs(0), TimeUs(3_000_000), TimeUs(6_000_000)];
        let threshold = TimeUs(100_000);

        let result = find_snap_point(TimeUs(3_000_000), &points, threshold);
        assert_eq!(result, TimeUs(3_000_000));
        // and again: no drift
        assert_eq!(find_snap_point(result, &points, threshold), result);
    }

    #[test]
    fn snap_to_closest_of_two() {
        let points = vec![TimeUs(1_000_000), TimeUs(2_000_000)];
        let threshold = TimeUs(600_000);

        let result = find_snap_point(TimeUs(1_400_000), &points, threshold);
        assert_eq!(result, TimeUs(1_000_000));

        let result = find_snap_point(TimeUs(1_700_000), &points, threshold);
        assert_eq!(result, TimeUs(2_000_000));
    }

    #[test]
    fn grid_points_round_to_nearest_tick() {
        let interval = TimeUs(500_000);
        assert_eq!(nearest_grid_point(TimeUs(1_240_000), interval), Some(TimeUs(1_000_000)));
        assert_eq!(nearest_grid_point(TimeUs(1_260_000), interval), Some(TimeUs(1_500_000)));
        assert_eq!(nearest_grid_point(TimeUs(1_000_000), TimeUs::ZERO), None);
    }

    #[test]
    fn px_conversion_uses_zoom() {
        assert_eq!(px_to_time(10.0, 100.0), TimeUs(100_000));
        assert_eq!(px_to_time(10.0, 0.0), TimeUs::ZERO);
    }

    #[test]
    fn collect_snap_points_from_timeline() {
        let (state, _) = make_state_with_clips();
        let points = collect_snap_points(&state, &[], Some(TimeUs(10_000_000)));

        assert_eq!(
            points,
            vec![
                TimeUs(0),
                TimeUs(1_000_000),
                TimeUs(4_000_000),
                TimeUs(5_000_000),
                TimeUs(8_000_000),
                TimeUs(10_000_000),
            ]
        );
    }

    #[test]
    fn collect_excludes_dragged_clips() {
        let (state, first) = make_state_with_clips();
        let points = collect_snap_points(&state, &[first], None);

        assert!(!points.contains(&TimeUs(1_000_000)));
        assert!(!points.contains(&TimeUs(4_000_000)));
        assert!(points.contains(&TimeUs(5_000_000)));
        assert!(points.contains(&TimeUs(8_000_000)));
        assert!(points.contains(&TimeUs(0)));
    }

    #[test]
    fn best_delta_checks_every_edge() {
        // clip spans [1s, 4s); end edge is closer to 5s than start edge to anything
        let edges = [TimeUs(1_000_000), TimeUs(4_000_000)];
        let points = [TimeUs(0), TimeUs(5_000_000)];
        let hit = best_snap_delta(&edges, TimeUs(900_000), &points, None, TimeUs(200_000), None).unwrap();
        assert_eq!(hit.delta, TimeUs(1_000_000));
        assert_eq!(hit.point, TimeUs(5_000_000));
    }

    #[test]
    fn best_delta_is_idempotent_on_snap_point() {
        let edges = [TimeUs(2_000_000)];
        let points = [TimeUs(3_000_000)];
        let hit = best_snap_delta(&edges, TimeUs(1_000_000), &points, None, TimeUs(100_000), None);
        assert_eq!(hit.map(|h| h.delta), Some(TimeUs(1_000_000)));
    }

    #[test]
    fn best_delta_uses_grid() {
        let edges = [TimeUs(0)];
        let delta = best_snap_delta(
            &edges,
            TimeUs(2_080_000),
            &[],
            Some(TimeUs(500_000)),
            TimeUs(100_000),
            None,
        );
        assert_eq!(delta.map(|h| h.delta), Some(TimeUs(2_000_000)));
    }

    #[test]
    fn best_delta_skips_ignored_candidate() {
        let edges = [TimeUs(0)];
        let points = [TimeUs(1_000_000), TimeUs(1_150_000)];
        let delta = best_snap_delta(
            &edges,
            TimeUs(1_050_000),
            &points,
            None,
            TimeUs(200_000),
            Some(TimeUs(1_000_000)),
        );
        assert_eq!(delta.map(|h| h.point), Some(TimeUs(1_150_000)));
    }

    #[test]
    fn snap_lock_breaks_through() {
        let threshold = TimeUs(100_000);
        let break_threshold = TimeUs(300_000);
        let mut lock = SnapLock::default();
        lock.engage(TimeUs(1_000_000));

        // within break distance: pinned
        assert_eq!(lock.hold(TimeUs(1_250_000), threshold, break_threshold), Some(TimeUs(1_000_000)));
        // beyond: released, point ignored
        assert_eq!(lock.hold(TimeUs(1_350_000), threshold, break_threshold), None);
        assert_eq!(lock.locked(), None);
        assert_eq!(lock.ignored(), Some(TimeUs(1_000_000)));
        // coming back inside the attraction radius keeps ignoring until it is left
        assert_eq!(lock.hold(TimeUs(1_050_000), threshold, break_threshold), None);
        assert_eq!(lock.ignored(), Some(TimeUs(1_000_000)));
        assert_eq!(lock.hold(TimeUs(1_500_000), threshold, break_threshold), None);
        assert_eq!(lock.ignored(), None);
    }
}
