//! Live marble entities replaying their precomputed trajectories.

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::CollisionQuery;
use crate::emitter::EmitterId;
use crate::player::{InstrumentHit, InstrumentSink, PlayerSettings, TrajectoryPlayer};
use crate::trajectory::Trajectory;

/// Unique identifier for a marble.
pub type MarbleId = u32;

/// RGBA color representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const PURPLE: Color = Color::rgb(128, 0, 128);
    pub const ORANGE: Color = Color::rgb(255, 165, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const PINK: Color = Color::rgb(255, 192, 203);

    /// Default emitter/marble colors.
    pub const PALETTE: [Color; 8] = [
        Self::RED,
        Self::BLUE,
        Self::GREEN,
        Self::YELLOW,
        Self::PURPLE,
        Self::ORANGE,
        Self::CYAN,
        Self::PINK,
    ];

    /// Palette entry for `index`, wrapping around.
    pub fn from_palette(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarbleSettings {
    /// Seconds before a marble despawns regardless of position.
    pub lifetime: f64,
    /// Distance below the view bottom at which a marble despawns.
    pub offscreen_margin: f32,
}

impl Default for MarbleSettings {
    fn default() -> Self {
        Self {
            lifetime: 10.0,
            offscreen_margin: 2.0,
        }
    }
}

/// Why a marble left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DespawnReason {
    Expired,
    OffScreen,
}

/// What one marble did during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MarbleTick {
    pub id: MarbleId,
    pub position: Vec2,
    pub hits: Vec<InstrumentHit>,
    pub despawn: Option<DespawnReason>,
}

/// A marble whose motion is the replay of one trajectory.
#[derive(Debug, Clone)]
pub struct Marble {
    pub id: MarbleId,
    pub source: Option<EmitterId>,
    pub color: Color,
    player: TrajectoryPlayer,
    despawn: Option<DespawnReason>,
}

impl Marble {
    pub fn new(
        id: MarbleId,
        trajectory: Arc<Trajectory>,
        settings: PlayerSettings,
        color: Color,
        source: Option<EmitterId>,
    ) -> Self {
        Self {
            id,
            source,
            color,
            player: TrajectoryPlayer::new(trajectory, settings),
            despawn: None,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.player.position()
    }

    /// Seconds since spawn.
    pub fn age(&self) -> f64 {
        self.player.elapsed()
    }

    pub fn player(&self) -> &TrajectoryPlayer {
        &self.player
    }

    pub fn is_alive(&self) -> bool {
        self.despawn.is_none()
    }

    pub fn despawn_reason(&self) -> Option<DespawnReason> {
        self.despawn
    }

    /// Replays one tick, then checks lifetime and the off-screen bound.
    pub fn tick<Q, S>(
        &mut self,
        query: &Q,
        sink: &mut S,
        view_bottom: f32,
        settings: &MarbleSettings,
    ) -> MarbleTick
    where
        Q: CollisionQuery + ?Sized,
        S: InstrumentSink + ?Sized,
    {
        if !self.is_alive() {
            return MarbleTick {
                id: self.id,
                position: self.position(),
                hits: Vec::new(),
                despawn: self.despawn,
            };
        }

        let tick = self.player.tick(query, sink);
        if self.player.elapsed() >= settings.lifetime {
            self.despawn = Some(DespawnReason::Expired);
        } else if tick.position.y < view_bottom - settings.offscreen_margin {
            self.despawn = Some(DespawnReason::OffScreen);
        }

        MarbleTick {
            id: self.id,
            position: tick.position,
            hits: tick.hits,
            despawn: self.despawn,
        }
    }
}

/// Owns the live marbles of a session.
#[derive(Debug, Clone, Default)]
pub struct MarbleManager {
    marbles: Vec<Marble>,
    next_id: MarbleId,
}

impl MarbleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a marble replaying `trajectory`.
    pub fn spawn(
        &mut self,
        trajectory: Arc<Trajectory>,
        settings: PlayerSettings,
        color: Color,
        source: Option<EmitterId>,
    ) -> MarbleId {
        let id = self.next_id;
        self.next_id += 1;
        self.marbles
            .push(Marble::new(id, trajectory, settings, color, source));
        tracing::debug!(marble = id, ?source, "[marble] spawned");
        id
    }

    /// Gets a marble by ID.
    pub fn get(&self, marble_id: MarbleId) -> Option<&Marble> {
        self.marbles.iter().find(|m| m.id == marble_id)
    }

    /// Returns all marbles in spawn order.
    pub fn marbles(&self) -> &[Marble] {
        &self.marbles
    }

    pub fn len(&self) -> usize {
        self.marbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marbles.is_empty()
    }

    /// Ticks every live marble in spawn order.
    pub fn tick_all<Q, S>(
        &mut self,
        query: &Q,
        sink: &mut S,
        view_bottom: f32,
        settings: &MarbleSettings,
    ) -> Vec<MarbleTick>
    where
        Q: CollisionQuery + ?Sized,
        S: InstrumentSink + ?Sized,
    {
        self.marbles
            .iter_mut()
            .filter(|marble| marble.is_alive())
            .map(|marble| marble.tick(query, sink, view_bottom, settings))
            .collect()
    }

    /// Drops despawned marbles, returning their IDs and reasons.
    pub fn remove_dead(&mut self) -> Vec<(MarbleId, DespawnReason)> {
        let mut removed = Vec::new();
        self.marbles.retain(|marble| match marble.despawn {
            Some(reason) => {
                removed.push((marble.id, reason));
                false
            }
            None => true,
        });
        for (id, reason) in &removed {
            tracing::debug!(marble = id, ?reason, "[marble] despawned");
        }
        removed
    }

    /// Removes every marble.
    pub fn clear(&mut self) {
        self.marbles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::NullSink;
    use crate::portal::PortalArena;
    use crate::scene::StaticScene;
    use crate::test_utils::flat_ground;
    use crate::trajectory::{Launch, TrajectoryComputer};

    fn falling(height: f32) -> Arc<Trajectory> {
        Arc::new(TrajectoryComputer::default().compute(
            &StaticScene::new(),
            &PortalArena::new(),
            &Launch::new(Vec2::new(0.0, height), Vec2::ZERO),
            None,
            EmitterId(0),
        ))
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(Color::from_palette(0), Color::RED);
        assert_eq!(Color::from_palette(9), Color::BLUE);
    }

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut manager = MarbleManager::new();
        let a = manager.spawn(falling(0.0), PlayerSettings::default(), Color::RED, None);
        let b = manager.spawn(falling(0.0), PlayerSettings::default(), Color::BLUE, None);
        assert_eq!((a, b), (0, 1));
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get(b).map(|m| m.color), Some(Color::BLUE));
    }

    #[test]
    fn test_marble_despawns_off_screen() {
        let mut manager = MarbleManager::new();
        let id = manager.spawn(falling(0.0), PlayerSettings::default(), Color::RED, None);
        let settings = MarbleSettings::default();

        let mut removed = Vec::new();
        for _ in 0..200 {
            manager.tick_all(&StaticScene::new(), &mut NullSink, -1.0, &settings);
            removed.extend(manager.remove_dead());
            if !removed.is_empty() {
                break;
            }
        }

        assert_eq!(removed, vec![(id, DespawnReason::OffScreen)]);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_marble_expires_after_lifetime() {
        let scene = flat_ground();
        let trajectory = Arc::new(TrajectoryComputer::default().compute(
            &scene,
            &PortalArena::new(),
            &Launch::new(Vec2::new(0.0, 1.0), Vec2::ZERO),
            None,
            EmitterId(0),
        ));
        let settings = MarbleSettings {
            lifetime: 1.0,
            ..MarbleSettings::default()
        };
        let mut marble = Marble::new(0, trajectory, PlayerSettings::default(), Color::RED, None);

        let mut ticks = 0;
        while marble.is_alive() {
            marble.tick(&scene, &mut NullSink, -10.0, &settings);
            ticks += 1;
        }
        assert_eq!(marble.despawn_reason(), Some(DespawnReason::Expired));
        assert_eq!(ticks, 50);
    }
}
