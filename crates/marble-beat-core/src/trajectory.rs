//! Deterministic trajectory precomputation.
//!
//! [`TrajectoryComputer::compute`] runs the physics step from a launch state
//! until the time or iteration budget runs out (or the marble falls off the
//! world), producing:
//!
//! - the full frame sequence replayed by [`crate::player::TrajectoryPlayer`],
//! - a decimated polyline for drawing the preview,
//! - beat markers: where the marble is at every beat-grid boundary.
//!
//! The output depends only on the launch, the settings, the portal arena and
//! the collision snapshot. There are no clocks, random numbers or unordered
//! containers in this path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::beat_clock::MIN_BPM;
use crate::collision::{ColliderId, CollisionQuery};
use crate::emitter::EmitterId;
use crate::physics::{DEFAULT_GRAVITY, PhysicsProfile, PhysicsStepper, hash_f32};
use crate::portal::{PortalArena, PortalCrossing};

/// Slack when comparing elapsed time against beat boundaries.
const BEAT_EPSILON: f64 = 1e-9;

/// Smallest timestep accepted by the computer.
const MIN_DT: f64 = 1e-4;

/// One simulated instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub time: f64,
    pub position: Vec2,
    pub velocity: Vec2,
    pub has_collision: bool,
    /// Speed before the step that produced this frame.
    pub pre_collision_speed: f32,
    /// Set on the frame a portal exit places the marble at.
    #[serde(default)]
    pub teleported: bool,
}

/// Marble state at a beat-grid boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Exactly `beat_number * interval`.
    pub time: f64,
    /// Starts at 1 and never skips.
    pub beat_number: u32,
    pub source_id: EmitterId,
}

/// Beat grid used to place markers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub bpm: f64,
    /// Fraction of a beat between markers, in (0, 1].
    pub beat_division: f64,
}

impl BeatGrid {
    pub fn new(bpm: f64, beat_division: f64) -> Self {
        Self { bpm, beat_division }
    }

    /// Seconds between markers. BPM is floored at [`MIN_BPM`].
    pub fn interval(&self) -> f64 {
        60.0 / self.bpm.max(MIN_BPM) * self.beat_division
    }

    fn usable_interval(&self) -> Option<f64> {
        let interval = self.interval();
        (interval.is_finite() && interval > 0.0).then_some(interval)
    }
}

/// Initial marble state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launch {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Collider the marble starts inside of (usually its emitter).
    pub ignore: Option<ColliderId>,
}

impl Launch {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self {
            position,
            velocity,
            ignore: None,
        }
    }

    #[must_use]
    pub fn ignoring(mut self, collider: ColliderId) -> Self {
        self.ignore = Some(collider);
        self
    }
}

/// Budgets and world constants for one computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectorySettings {
    pub gravity: f32,
    pub dt: f64,
    pub max_duration: f64,
    pub max_iterations: usize,
    /// Every Nth step lands in the render path.
    pub path_sample_every: usize,
    pub portal_cooldown: f64,
    /// Simulation stops once the marble falls below this height.
    pub fall_floor: f32,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            dt: 0.02,
            max_duration: 10.0,
            max_iterations: 5_000,
            path_sample_every: 5,
            portal_cooldown: 0.15,
            fall_floor: -500.0,
        }
    }
}

impl TrajectorySettings {
    fn effective_dt(&self) -> f64 {
        if self.dt.is_finite() {
            self.dt.max(MIN_DT)
        } else {
            MIN_DT
        }
    }

    /// Number of iterations allowed: `min(max_iterations, ceil(max_duration / dt))`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn iteration_budget(&self) -> usize {
        let by_time = (self.max_duration / self.effective_dt() - BEAT_EPSILON).ceil();
        if by_time.is_nan() || by_time <= 0.0 {
            return 0;
        }
        self.max_iterations.min(by_time as usize)
    }
}

/// Why a computation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Time or iteration budget exhausted.
    Budget,
    /// Marble dropped below the fall floor.
    FellOffWorld,
}

/// Immutable result of a computation, shared through `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    source_id: EmitterId,
    frames: Vec<Frame>,
    path: Vec<Vec2>,
    beat_markers: Vec<BeatMarker>,
    termination: Termination,
}

impl Trajectory {
    pub fn source_id(&self) -> EmitterId {
        self.source_id
    }

    /// Never empty: the launch state is frame 0.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn path(&self) -> &[Vec2] {
        &self.path
    }

    pub fn beat_markers(&self) -> &[BeatMarker] {
        &self.beat_markers
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Time of the last frame.
    pub fn duration(&self) -> f64 {
        self.frames.last().map_or(0.0, |frame| frame.time)
    }

    pub fn collision_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.has_collision).count()
    }

    /// Hash over the exact bit patterns of every frame and marker.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.source_id.hash(&mut hasher);
        for frame in &self.frames {
            frame.time.to_bits().hash(&mut hasher);
            hash_f32(frame.position.x, &mut hasher);
            hash_f32(frame.position.y, &mut hasher);
            hash_f32(frame.velocity.x, &mut hasher);
            hash_f32(frame.velocity.y, &mut hasher);
            frame.has_collision.hash(&mut hasher);
            frame.teleported.hash(&mut hasher);
            hash_f32(frame.pre_collision_speed, &mut hasher);
        }
        for marker in &self.beat_markers {
            marker.beat_number.hash(&mut hasher);
            marker.time.to_bits().hash(&mut hasher);
            hash_f32(marker.position.x, &mut hasher);
            hash_f32(marker.position.y, &mut hasher);
        }
        hasher.finish()
    }
}

/// Drives [`PhysicsStepper`] to build a [`Trajectory`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrajectoryComputer {
    stepper: PhysicsStepper,
    settings: TrajectorySettings,
}

impl TrajectoryComputer {
    pub fn new(profile: PhysicsProfile, settings: TrajectorySettings) -> Self {
        Self {
            stepper: PhysicsStepper::new(profile),
            settings,
        }
    }

    pub fn settings(&self) -> &TrajectorySettings {
        &self.settings
    }

    pub fn profile(&self) -> &PhysicsProfile {
        self.stepper.profile()
    }

    /// Computes the full trajectory for `launch`.
    ///
    /// Linked entry portals are snapshotted once at the start, in handle
    /// order. Without a `beat` grid no markers are produced.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn compute<Q: CollisionQuery + ?Sized>(
        &self,
        query: &Q,
        portals: &PortalArena,
        launch: &Launch,
        beat: Option<BeatGrid>,
        source_id: EmitterId,
    ) -> Trajectory {
        let settings = &self.settings;
        let dt = settings.effective_dt();
        let step_dt = dt as f32;
        let radius = self.stepper.profile().radius;
        let sample_every = settings.path_sample_every.max(1);
        let budget = settings.iteration_budget();
        let crossings = portals.active_crossings();
        let interval = beat.and_then(|grid| grid.usable_interval());

        let mut position = launch.position;
        let mut velocity = launch.velocity;
        let mut steps: u64 = 0;
        let mut cooldown = 0.0_f64;
        let mut next_beat: u32 = 1;
        let mut termination = Termination::Budget;

        let mut frames = Vec::with_capacity(budget + 1);
        frames.push(Frame {
            time: 0.0,
            position,
            velocity,
            has_collision: false,
            pre_collision_speed: velocity.length(),
            teleported: false,
        });
        let mut path = vec![position];
        let mut beat_markers = Vec::new();

        for iteration in 0..budget {
            let pre_speed = velocity.length();
            let start_time = steps as f64 * dt;

            let crossing = if cooldown <= 0.0 {
                find_crossing(&crossings, position, radius)
            } else {
                cooldown -= dt;
                None
            };

            if let Some(crossing) = crossing {
                frames.push(Frame {
                    time: start_time + dt * 0.5,
                    position,
                    velocity,
                    has_collision: false,
                    pre_collision_speed: pre_speed,
                    teleported: false,
                });
                path.push(position);

                position = crossing.exit.position;
                velocity = crossing.exit.exit_velocity(velocity, &crossing.entry);
                cooldown = settings.portal_cooldown;
                steps += 1;

                frames.push(Frame {
                    time: steps as f64 * dt,
                    position,
                    velocity,
                    has_collision: false,
                    pre_collision_speed: pre_speed,
                    teleported: true,
                });
                path.push(position);
                tracing::trace!(
                    entry = %crossing.entry_handle,
                    exit = %crossing.exit_handle,
                    time = start_time,
                    "[trajectory] portal crossing"
                );
            } else {
                let result = self.stepper.step(
                    query,
                    position,
                    velocity,
                    step_dt,
                    settings.gravity,
                    launch.ignore,
                );
                position = result.position;
                velocity = result.velocity;
                steps += 1;

                frames.push(Frame {
                    time: steps as f64 * dt,
                    position,
                    velocity,
                    has_collision: result.has_collision,
                    pre_collision_speed: pre_speed,
                    teleported: false,
                });
                if result.has_collision || (iteration + 1) % sample_every == 0 {
                    path.push(position);
                }
            }

            if let Some(interval) = interval {
                let elapsed = steps as f64 * dt;
                loop {
                    let boundary = f64::from(next_beat) * interval;
                    if elapsed + BEAT_EPSILON < boundary {
                        break;
                    }
                    beat_markers.push(BeatMarker {
                        position,
                        velocity,
                        time: boundary,
                        beat_number: next_beat,
                        source_id,
                    });
                    next_beat += 1;
                }
            }

            if position.y < settings.fall_floor {
                termination = Termination::FellOffWorld;
                break;
            }
        }

        if path.last() != Some(&position) {
            path.push(position);
        }

        tracing::debug!(
            source = source_id.0,
            frames = frames.len(),
            markers = beat_markers.len(),
            ?termination,
            "[trajectory] computed"
        );

        Trajectory {
            source_id,
            frames,
            path,
            beat_markers,
            termination,
        }
    }
}

/// First linked entry whose trigger circle contains the marble.
fn find_crossing(
    crossings: &[PortalCrossing],
    position: Vec2,
    radius: f32,
) -> Option<&PortalCrossing> {
    crossings.iter().find(|crossing| {
        position.distance(crossing.entry.position) < crossing.entry.radius + radius
    })
}
