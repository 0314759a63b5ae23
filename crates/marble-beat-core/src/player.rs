//! Fixed-tick replay of a precomputed trajectory.
//!
//! The player never runs physics. Each tick it advances its clock, walks the
//! frame cursor forward and, for every collision frame it passed, looks up the
//! instrument that was hit and asks the [`InstrumentSink`] to play it.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::{ColliderId, CollisionQuery, InstrumentId};
use crate::trajectory::Trajectory;

/// Receiver of instrument triggers (audio lives outside the core).
pub trait InstrumentSink {
    fn trigger_sound(&mut self, instrument: InstrumentId, volume: f32, contact_point: Vec2);
}

impl<F: FnMut(InstrumentId, f32, Vec2)> InstrumentSink for F {
    fn trigger_sound(&mut self, instrument: InstrumentId, volume: f32, contact_point: Vec2) {
        self(instrument, volume, contact_point);
    }
}

/// Sink that drops every trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl InstrumentSink for NullSink {
    fn trigger_sound(&mut self, _instrument: InstrumentId, _volume: f32, _contact_point: Vec2) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Replay tick in seconds.
    pub tick_dt: f64,
    /// Collisions slower than this stay silent.
    pub min_audible_speed: f32,
    /// Minimum seconds between two triggers of one instrument.
    pub hit_cooldown: f64,
    /// Radius searched around a collision frame for the instrument hit.
    pub contact_probe_radius: f32,
    pub min_volume: f32,
    pub max_volume: f32,
    /// Impact speed mapped to `max_volume`.
    pub full_volume_speed: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            tick_dt: 1.0 / 50.0,
            min_audible_speed: 0.5,
            hit_cooldown: 0.1,
            contact_probe_radius: 0.1,
            min_volume: 0.3,
            max_volume: 1.0,
            full_volume_speed: 10.0,
        }
    }
}

impl PlayerSettings {
    /// Maps impact speed to a volume in `[min_volume, max_volume]`.
    pub fn volume_for_speed(&self, speed: f32) -> f32 {
        let t = if self.full_volume_speed > 0.0 {
            (speed / self.full_volume_speed).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.min_volume + (self.max_volume - self.min_volume) * t
    }
}

/// A trigger emitted during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentHit {
    pub instrument: InstrumentId,
    pub collider: ColliderId,
    pub frame_index: usize,
    pub volume: f32,
    pub contact_point: Vec2,
    /// Player time when the hit was played.
    pub elapsed: f64,
}

/// Result of one [`TrajectoryPlayer::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTick {
    pub position: Vec2,
    pub hits: Vec<InstrumentHit>,
    pub finished: bool,
}

/// Slack applied to the instrument cooldown comparison.
const COOLDOWN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct TrajectoryPlayer {
    trajectory: Arc<Trajectory>,
    settings: PlayerSettings,
    ticks: u64,
    cursor: usize,
    /// Highest frame index whose collision was already resolved.
    watermark: Option<usize>,
    last_hit: BTreeMap<InstrumentId, f64>,
}

impl TrajectoryPlayer {
    pub fn new(trajectory: Arc<Trajectory>, settings: PlayerSettings) -> Self {
        Self {
            trajectory,
            settings,
            ticks: 0,
            cursor: 0,
            watermark: None,
            last_hit: BTreeMap::new(),
        }
    }

    pub fn trajectory(&self) -> &Arc<Trajectory> {
        &self.trajectory
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    /// Replay time, always `ticks * tick_dt`.
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed(&self) -> f64 {
        self.ticks as f64 * self.settings.tick_dt
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once the cursor rests on the last frame.
    pub fn is_finished(&self) -> bool {
        self.cursor + 1 >= self.trajectory.frames().len()
    }

    /// Interpolated position at the current replay time.
    ///
    /// A portal jump is never interpolated: the marble holds at the entry
    /// until the replay reaches the exit frame.
    #[allow(clippy::cast_possible_truncation)]
    pub fn position(&self) -> Vec2 {
        let frames = self.trajectory.frames();
        let Some(current) = frames.get(self.cursor) else {
            return Vec2::ZERO;
        };
        let Some(next) = frames.get(self.cursor + 1) else {
            return current.position;
        };
        if next.teleported {
            return current.position;
        }

        let span = next.time - current.time;
        let t = if span > 0.0 {
            ((self.elapsed() - current.time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        current.position.lerp(next.position, t as f32)
    }

    /// Advances one fixed tick and resolves every collision frame passed.
    pub fn tick<Q, S>(&mut self, query: &Q, sink: &mut S) -> PlayerTick
    where
        Q: CollisionQuery + ?Sized,
        S: InstrumentSink + ?Sized,
    {
        self.ticks += 1;
        let elapsed = self.elapsed();

        let previous = self.cursor;
        let frames = self.trajectory.frames();
        while self.cursor + 1 < frames.len() && frames[self.cursor + 1].time <= elapsed {
            self.cursor += 1;
        }

        let mut hits = Vec::new();
        for index in previous + 1..=self.cursor {
            if let Some(hit) = self.resolve_collision(index, query, sink) {
                hits.push(hit);
            }
        }

        PlayerTick {
            position: self.position(),
            hits,
            finished: self.is_finished(),
        }
    }

    fn resolve_collision<Q, S>(
        &mut self,
        index: usize,
        query: &Q,
        sink: &mut S,
    ) -> Option<InstrumentHit>
    where
        Q: CollisionQuery + ?Sized,
        S: InstrumentSink + ?Sized,
    {
        if self.watermark.is_some_and(|mark| index <= mark) {
            return None;
        }
        let frame = *self.trajectory.frames().get(index)?;
        if !frame.has_collision {
            return None;
        }
        self.watermark = Some(index);

        if frame.pre_collision_speed < self.settings.min_audible_speed {
            return None;
        }

        // Nearest instrument wins; equal distances fall back to collider id.
        let overlap = query
            .overlap_circle(frame.position, self.settings.contact_probe_radius)
            .into_iter()
            .filter(|overlap| overlap.instrument.is_some())
            .min_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.collider.cmp(&b.collider))
            })?;
        let instrument = overlap.instrument?;

        let elapsed = self.elapsed();
        let cooling = self
            .last_hit
            .get(&instrument)
            .is_some_and(|&last| elapsed - last + COOLDOWN_EPSILON < self.settings.hit_cooldown);
        if cooling {
            tracing::trace!(instrument = instrument.0, "[player] hit suppressed by cooldown");
            return None;
        }

        let volume = self.settings.volume_for_speed(frame.pre_collision_speed);
        sink.trigger_sound(instrument, volume, overlap.closest_point);
        self.last_hit.insert(instrument, elapsed);

        Some(InstrumentHit {
            instrument,
            collider: overlap.collider,
            frame_index: index,
            volume,
            contact_point: overlap.closest_point,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EmitterId;
    use crate::portal::PortalArena;
    use crate::scene::{Shape, StaticScene};
    use crate::test_utils::{RecordingSink, instrument_floor};
    use crate::trajectory::{Launch, TrajectoryComputer};

    fn drop_on(scene: &StaticScene, height: f32) -> Arc<Trajectory> {
        let computer = TrajectoryComputer::default();
        Arc::new(computer.compute(
            scene,
            &PortalArena::new(),
            &Launch::new(Vec2::new(0.0, height), Vec2::ZERO),
            None,
            EmitterId(0),
        ))
    }

    #[test]
    fn test_volume_mapping() {
        let settings = PlayerSettings::default();
        assert!((settings.volume_for_speed(0.0) - 0.3).abs() < 1e-6);
        assert!((settings.volume_for_speed(5.0) - 0.65).abs() < 1e-6);
        assert!((settings.volume_for_speed(50.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_replay_triggers_instrument_on_first_bounce() {
        let (scene, instrument) = instrument_floor();
        let trajectory = drop_on(&scene, 2.0);
        let first_hit = trajectory
            .frames()
            .iter()
            .position(|f| f.has_collision)
            .expect("bounce");

        let mut player = TrajectoryPlayer::new(Arc::clone(&trajectory), PlayerSettings::default());
        let mut sink = RecordingSink::default();
        let mut hits = Vec::new();
        while !player.is_finished() && hits.is_empty() {
            hits = player.tick(&scene, &mut sink).hits;
        }

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].instrument, instrument);
        assert_eq!(hits[0].frame_index, first_hit);
        assert_eq!(sink.triggers.len(), 1);
        assert!(sink.triggers[0].1 > 0.3);
    }

    #[test]
    fn test_cursor_is_monotonic_and_hits_once() {
        let (scene, _) = instrument_floor();
        let trajectory = drop_on(&scene, 2.0);
        let mut player = TrajectoryPlayer::new(trajectory, PlayerSettings::default());
        let mut sink = RecordingSink::default();

        let mut last_cursor = 0;
        let mut frame_indices = Vec::new();
        while !player.is_finished() {
            for hit in player.tick(&scene, &mut sink).hits {
                frame_indices.push(hit.frame_index);
            }
            assert!(player.cursor() >= last_cursor);
            last_cursor = player.cursor();
        }

        let mut deduped = frame_indices.clone();
        deduped.dedup();
        assert_eq!(frame_indices, deduped);
        assert!(!frame_indices.is_empty());
    }

    #[test]
    fn test_coarse_tick_resolves_every_skipped_collision() {
        let (scene, _) = instrument_floor();
        let trajectory = drop_on(&scene, 2.0);
        let settings = PlayerSettings {
            tick_dt: 100.0,
            hit_cooldown: 0.0,
            ..PlayerSettings::default()
        };
        let audible = trajectory
            .frames()
            .iter()
            .filter(|f| f.has_collision && f.pre_collision_speed >= settings.min_audible_speed)
            .count();

        let mut player = TrajectoryPlayer::new(trajectory, settings);
        let mut sink = RecordingSink::default();
        let tick = player.tick(&scene, &mut sink);

        assert!(tick.finished);
        assert_eq!(tick.hits.len(), audible);
    }

    #[test]
    fn test_instrument_cooldown_suppresses_rapid_hits() {
        let (scene, _) = instrument_floor();
        let trajectory = drop_on(&scene, 2.0);
        let settings = PlayerSettings {
            tick_dt: 100.0,
            hit_cooldown: 0.1,
            ..PlayerSettings::default()
        };
        let mut player = TrajectoryPlayer::new(trajectory, settings);
        let mut sink = RecordingSink::default();

        // Every collision is resolved at the same player time, so only one plays.
        let tick = player.tick(&scene, &mut sink);
        assert_eq!(tick.hits.len(), 1);
    }

    #[test]
    fn test_obstacle_hit_is_silent() {
        let mut scene = StaticScene::new();
        scene.add_obstacle(Shape::Line {
            start: Vec2::new(-5.0, 0.0),
            end: Vec2::new(5.0, 0.0),
        });
        let trajectory = drop_on(&scene, 2.0);
        let mut player = TrajectoryPlayer::new(trajectory, PlayerSettings::default());
        let mut sink = RecordingSink::default();
        while !player.is_finished() {
            player.tick(&scene, &mut sink);
        }
        assert!(sink.triggers.is_empty());
    }

    #[test]
    fn test_position_interpolates_and_holds_last_frame() {
        let trajectory = drop_on(&StaticScene::new(), 0.0);
        let frames = trajectory.frames().to_vec();
        let settings = PlayerSettings {
            tick_dt: 0.01,
            ..PlayerSettings::default()
        };
        let mut player = TrajectoryPlayer::new(trajectory, settings);
        let tick = player.tick(&StaticScene::new(), &mut NullSink);

        let expected = frames[0].position.lerp(frames[1].position, 0.5);
        assert!((tick.position - expected).length() < 1e-5);

        let last = frames.last().expect("frames").position;
        while !player.is_finished() {
            player.tick(&StaticScene::new(), &mut NullSink);
        }
        player.tick(&StaticScene::new(), &mut NullSink);
        assert_eq!(player.position(), last);
    }

    #[test]
    fn test_portal_jump_is_not_interpolated() {
        use crate::physics::PhysicsProfile;
        use crate::portal::{Portal, PortalType};
        use crate::trajectory::TrajectorySettings;

        let exit_at = Vec2::new(-20.0, 20.0);
        let mut portals = PortalArena::new();
        let entry = portals.insert(Portal::new(Vec2::new(1.0, 0.0), 0.0, PortalType::Entry));
        let exit = portals.insert(Portal::new(exit_at, 0.0, PortalType::Exit));
        portals.link(entry, exit).expect("link");

        let computer = TrajectoryComputer::new(
            PhysicsProfile::default(),
            TrajectorySettings {
                gravity: 0.0,
                max_duration: 2.0,
                ..TrajectorySettings::default()
            },
        );
        let scene = StaticScene::new();
        let trajectory = Arc::new(computer.compute(
            &scene,
            &portals,
            &Launch::new(Vec2::ZERO, Vec2::X),
            None,
            EmitterId(0),
        ));
        assert!(trajectory.frames().iter().any(|frame| frame.teleported));

        // 60 Hz ticks fall between the 50 Hz frames around the jump.
        let settings = PlayerSettings {
            tick_dt: 1.0 / 60.0,
            ..PlayerSettings::default()
        };
        let mut player = TrajectoryPlayer::new(trajectory, settings);
        let mut reached_exit = false;
        while !player.is_finished() {
            let position = player.tick(&scene, &mut NullSink).position;
            let near_entry = position.length() < 3.0;
            let near_exit = position.distance(exit_at) < 3.0;
            assert!(near_entry || near_exit, "marble drawn at {position}");
            reached_exit |= near_exit;
        }
        assert!(reached_exit);
    }

    #[test]
    fn test_closure_sink() {
        let (scene, instrument) = instrument_floor();
        let trajectory = drop_on(&scene, 1.0);
        let mut player = TrajectoryPlayer::new(trajectory, PlayerSettings::default());
        let mut seen = Vec::new();
        let mut sink = |id: InstrumentId, _volume: f32, _point: Vec2| seen.push(id);
        while !player.is_finished() {
            player.tick(&scene, &mut sink);
        }
        assert_eq!(seen.first(), Some(&instrument));
    }
}
