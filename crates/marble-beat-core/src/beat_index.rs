//! Beat-marker index and placement snapping.
//!
//! - Marker snap: a cursor near a beat marker places the instrument so the
//!   marble touches it exactly at that beat, along an angle-snapped direction
//! - Grid snap: fallback when no marker is in range

use std::sync::Arc;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::physics::MARBLE_RADIUS;
use crate::trajectory::{BeatMarker, Trajectory};

/// Cursor closer than this to a marker uses the marker's reversed velocity.
const ON_MARKER_DISTANCE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Maximum cursor distance for snapping to a beat marker.
    pub beat_snap_distance: f32,
    /// Placement direction step in degrees.
    pub angle_step: f32,
    /// Radius of the instrument being placed.
    pub instrument_radius: f32,
    /// Marble radius used for the touching offset.
    pub marble_radius: f32,
    /// Grid interval for the fallback snap; 0 disables it.
    pub grid_interval: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            beat_snap_distance: 0.8,
            angle_step: 15.0,
            instrument_radius: 0.5,
            marble_radius: MARBLE_RADIUS,
            grid_interval: 0.5,
        }
    }
}

/// Where a placement ended up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub position: Vec2,
    /// Marker the placement snapped to, if any.
    pub marker: Option<BeatMarker>,
}

/// All beat markers of every active prediction.
///
/// Rebuilt wholesale; readers hold an `Arc` snapshot and never observe a
/// half-built set.
#[derive(Debug, Default)]
pub struct BeatMarkerIndex {
    markers: RwLock<Arc<[BeatMarker]>>,
}

impl BeatMarkerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with the markers of `trajectories`, in order.
    pub fn rebuild<'a, I>(&self, trajectories: I) -> usize
    where
        I: IntoIterator<Item = &'a Trajectory>,
    {
        let markers: Arc<[BeatMarker]> = trajectories
            .into_iter()
            .flat_map(|trajectory| trajectory.beat_markers().iter().copied())
            .collect();
        let count = markers.len();
        *self.markers.write() = markers;
        tracing::debug!(count, "[beat_index] rebuilt");
        count
    }

    pub fn clear(&self) {
        *self.markers.write() = Arc::from(Vec::new());
    }

    /// Consistent view of the current markers.
    pub fn snapshot(&self) -> Arc<[BeatMarker]> {
        self.markers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.markers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.read().is_empty()
    }

    /// Closest marker within `max_distance`; the earliest indexed wins ties.
    pub fn nearest(&self, position: Vec2, max_distance: f32) -> Option<BeatMarker> {
        let markers = self.snapshot();
        let mut best: Option<(f32, BeatMarker)> = None;
        for marker in markers.iter() {
            let distance = marker.position.distance(position);
            if distance > max_distance {
                continue;
            }
            if best.is_none_or(|(current, _)| distance < current) {
                best = Some((distance, *marker));
            }
        }
        best.map(|(_, marker)| marker)
    }

    /// Snaps an instrument placement at `cursor`.
    ///
    /// Near a marker the instrument centre is pushed out from the marker along
    /// the angle-snapped cursor direction by `instrument_radius + marble_radius`.
    /// Otherwise the cursor is grid snapped.
    pub fn snap_placement(&self, cursor: Vec2, config: &SnapConfig) -> SnapResult {
        let Some(marker) = self.nearest(cursor, config.beat_snap_distance) else {
            return SnapResult {
                position: apply_grid_snap(cursor, config.grid_interval),
                marker: None,
            };
        };

        let offset = cursor - marker.position;
        let direction = if offset.length() < ON_MARKER_DISTANCE {
            let reversed = (-marker.velocity).normalize_or_zero();
            if reversed == Vec2::ZERO {
                Vec2::NEG_Y
            } else {
                reversed
            }
        } else {
            let angle = offset.y.atan2(offset.x);
            Vec2::from_angle(snap_angle(angle, config.angle_step))
        };

        SnapResult {
            position: marker.position
                + direction * (config.instrument_radius + config.marble_radius),
            marker: Some(marker),
        }
    }
}

/// Rounds `angle` (radians) to the nearest multiple of `step_degrees`.
pub fn snap_angle(angle: f32, step_degrees: f32) -> f32 {
    if step_degrees <= 0.0 {
        return angle;
    }
    let step = step_degrees.to_radians();
    (angle / step).round() * step
}

/// Rounds both components to the nearest multiple of `interval`.
pub fn apply_grid_snap(position: Vec2, interval: f32) -> Vec2 {
    if interval <= 0.0 {
        return position;
    }
    (position / interval).round() * interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EmitterId;
    use crate::portal::PortalArena;
    use crate::scene::StaticScene;
    use crate::trajectory::{BeatGrid, Launch, TrajectoryComputer, TrajectorySettings};
    use crate::physics::PhysicsProfile;

    fn marker(position: Vec2, velocity: Vec2, beat_number: u32) -> BeatMarker {
        BeatMarker {
            position,
            velocity,
            time: f64::from(beat_number) * 0.5,
            beat_number,
            source_id: EmitterId(0),
        }
    }

    fn index_with(markers: Vec<BeatMarker>) -> BeatMarkerIndex {
        let index = BeatMarkerIndex::new();
        *index.markers.write() = Arc::from(markers);
        index
    }

    #[test]
    fn test_snap_angle_rounds_to_step() {
        let snapped = snap_angle(20f32.to_radians(), 15.0);
        assert!((snapped - 15f32.to_radians()).abs() < 1e-6);
        let snapped = snap_angle(23f32.to_radians(), 15.0);
        assert!((snapped - 30f32.to_radians()).abs() < 1e-6);
        assert!((snap_angle(0.3, 0.0) - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_grid_snap() {
        let snapped = apply_grid_snap(Vec2::new(0.74, -0.26), 0.5);
        assert!((snapped - Vec2::new(0.5, -0.5)).length() < 1e-6);
        assert_eq!(apply_grid_snap(Vec2::new(0.3, 0.3), 0.0), Vec2::new(0.3, 0.3));
    }

    #[test]
    fn test_rebuild_collects_all_trajectories() {
        let computer = TrajectoryComputer::new(
            PhysicsProfile::default(),
            TrajectorySettings {
                gravity: 0.0,
                max_duration: 2.0,
                ..TrajectorySettings::default()
            },
        );
        let grid = Some(BeatGrid::new(120.0, 1.0));
        let a = computer.compute(
            &StaticScene::new(),
            &PortalArena::new(),
            &Launch::new(Vec2::ZERO, Vec2::X),
            grid,
            EmitterId(0),
        );
        let b = computer.compute(
            &StaticScene::new(),
            &PortalArena::new(),
            &Launch::new(Vec2::new(0.0, 5.0), Vec2::X),
            grid,
            EmitterId(1),
        );

        let index = BeatMarkerIndex::new();
        let held = index.snapshot();
        assert_eq!(index.rebuild([&a, &b]), 8);
        assert!(held.is_empty());
        assert_eq!(index.len(), 8);

        let snapshot = index.snapshot();
        assert_eq!(snapshot[0].source_id, EmitterId(0));
        assert_eq!(snapshot[4].source_id, EmitterId(1));

        index.clear();
        assert!(index.is_empty());
        assert_eq!(snapshot.len(), 8);
    }

    #[test]
    fn test_nearest_respects_max_distance() {
        let index = index_with(vec![
            marker(Vec2::new(0.0, 0.0), Vec2::X, 1),
            marker(Vec2::new(2.0, 0.0), Vec2::X, 2),
        ]);
        let found = index.nearest(Vec2::new(1.8, 0.1), 0.8).expect("marker");
        assert_eq!(found.beat_number, 2);
        assert!(index.nearest(Vec2::new(1.0, 3.0), 0.8).is_none());
    }

    #[test]
    fn test_nearest_tie_prefers_first() {
        let index = index_with(vec![
            marker(Vec2::new(-1.0, 0.0), Vec2::X, 1),
            marker(Vec2::new(1.0, 0.0), Vec2::X, 2),
        ]);
        let found = index.nearest(Vec2::ZERO, 2.0).expect("marker");
        assert_eq!(found.beat_number, 1);
    }

    #[test]
    fn test_snap_placement_pushes_along_snapped_angle() {
        let index = index_with(vec![marker(Vec2::new(1.0, 1.0), Vec2::X, 3)]);
        let config = SnapConfig::default();
        // Cursor just below the marker at about -85 degrees snaps to -90.
        let cursor = Vec2::new(1.03, 0.6);
        let result = index.snap_placement(cursor, &config);

        let reach = config.instrument_radius + config.marble_radius;
        assert_eq!(result.marker.map(|m| m.beat_number), Some(3));
        assert!((result.position - Vec2::new(1.0, 1.0 - reach)).length() < 1e-5);
    }

    #[test]
    fn test_snap_on_marker_uses_reversed_velocity() {
        let index = index_with(vec![marker(Vec2::ZERO, Vec2::new(0.0, -4.0), 1)]);
        let config = SnapConfig::default();
        let result = index.snap_placement(Vec2::new(0.001, 0.0), &config);
        let reach = config.instrument_radius + config.marble_radius;
        assert!((result.position - Vec2::new(0.0, reach)).length() < 1e-5);
    }

    #[test]
    fn test_snap_without_marker_falls_back_to_grid() {
        let index = BeatMarkerIndex::new();
        let result = index.snap_placement(Vec2::new(1.2, 0.9), &SnapConfig::default());
        assert!(result.marker.is_none());
        assert!((result.position - Vec2::new(1.0, 1.0)).length() < 1e-6);
    }
}
