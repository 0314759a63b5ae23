//! Fixed-timestep marble integration against static colliders.
//!
//! One [`PhysicsStepper::step`] advances a single circular marble by `dt`:
//! semi-implicit Euler for gravity, a swept circle along the velocity for
//! tunneling-free contact, then reflection with restitution and tangential
//! friction. The same profile drives both the editor preview and the live
//! replay so the two can never disagree.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::collision::{ColliderId, CollisionQuery, SweepHit};

/// Fixed timestep for marble simulation (50Hz).
pub const PHYSICS_DT: f32 = 1.0 / 50.0;

/// Default vertical gravity in world units/s².
pub const DEFAULT_GRAVITY: f32 = -9.8;

/// Marble collision radius in world units.
pub const MARBLE_RADIUS: f32 = 0.05;

/// Fraction of speed kept along the normal after a bounce.
pub const DEFAULT_BOUNCINESS: f32 = 0.95;

/// Fraction of tangential speed removed on contact.
pub const DEFAULT_FRICTION: f32 = 0.05;

/// Material constants for the simulated marble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsProfile {
    pub radius: f32,
    pub bounciness: f32,
    pub friction: f32,
}

impl Default for PhysicsProfile {
    fn default() -> Self {
        Self {
            radius: MARBLE_RADIUS,
            bounciness: DEFAULT_BOUNCINESS,
            friction: DEFAULT_FRICTION,
        }
    }
}

/// Outcome of one physics step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationResult {
    pub position: Vec2,
    pub velocity: Vec2,
    pub has_collision: bool,
    pub hit: Option<SweepHit>,
}

impl SimulationResult {
    /// Contact point of the collision, if any.
    pub fn hit_point(&self) -> Option<Vec2> {
        self.hit.map(|hit| hit.point)
    }

    /// Surface normal of the collision, if any.
    pub fn hit_normal(&self) -> Option<Vec2> {
        self.hit.map(|hit| hit.normal)
    }
}

/// Reflects `velocity` about the unit `normal`.
pub fn reflect(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

/// Stateless single-marble integrator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicsStepper {
    profile: PhysicsProfile,
}

impl PhysicsStepper {
    pub fn new(profile: PhysicsProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PhysicsProfile {
        &self.profile
    }

    /// Advances one marble by `dt` seconds.
    ///
    /// Trigger colliders and `ignore` never block the sweep. The step is a pure
    /// function of its inputs and the query snapshot.
    pub fn step<Q: CollisionQuery + ?Sized>(
        &self,
        query: &Q,
        position: Vec2,
        velocity: Vec2,
        dt: f32,
        gravity: f32,
        ignore: Option<ColliderId>,
    ) -> SimulationResult {
        let mut velocity = velocity;
        velocity.y += gravity * dt;

        let movement = velocity * dt;
        let distance = movement.length();

        let hit = if distance > f32::EPSILON {
            query.sweep_circle(
                position,
                self.profile.radius,
                movement / distance,
                distance,
                ignore,
            )
        } else {
            None
        };

        match hit {
            Some(hit) => {
                let position = hit.point + hit.normal * self.profile.radius;
                let mut velocity = reflect(velocity, hit.normal) * self.profile.bounciness;

                let tangent = hit.normal.perp();
                velocity -= tangent * velocity.dot(tangent) * self.profile.friction;

                SimulationResult {
                    position,
                    velocity,
                    has_collision: true,
                    hit: Some(hit),
                }
            }
            None => SimulationResult {
                position: position + movement,
                velocity,
                has_collision: false,
                hit: None,
            },
        }
    }
}

/// Feeds the exact bit pattern of `value` into `hasher`.
pub(crate) fn hash_f32(value: f32, hasher: &mut impl Hasher) {
    value.to_bits().hash(hasher);
}
