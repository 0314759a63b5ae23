//! Marble-Beat Core Library
//!
//! Deterministic 2D marble physics for a beat-synchronised music sandbox.
//!
//! Every marble path is precomputed once by a [`TrajectoryComputer`] and then
//! replayed tick by tick, so a preview and the marble actually launched from
//! the same state always agree. Predictions carry beat markers, positions the
//! marble reaches exactly on the beat grid, which drive placement snapping.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod beat_clock;
pub mod beat_index;
pub mod collision;
pub mod config;
pub mod emitter;
pub mod marble;
pub mod physics;
pub mod player;
pub mod portal;
pub mod scene;
pub mod session;
pub mod trajectory;

#[cfg(test)]
mod test_utils;

pub use animation::{AnimationFrame, AnimationKind, AnimationSystem, AnimationTarget, EasingType};
pub use beat_clock::{AudioClock, BeatClock, SystemAudioClock};
pub use beat_index::{BeatMarkerIndex, SnapConfig, SnapResult};
pub use collision::{ColliderId, CollisionQuery, InstrumentId, Overlap, SweepHit};
pub use config::{BeatSettings, ConfigError, SandboxConfig};
pub use emitter::{EmitterId, EmitterPhase, PeriodicEmitter};
pub use marble::{Color, DespawnReason, Marble, MarbleId, MarbleManager, MarbleSettings};
pub use physics::{PHYSICS_DT, PhysicsProfile, PhysicsStepper, SimulationResult};
pub use player::{InstrumentHit, InstrumentSink, NullSink, PlayerSettings, TrajectoryPlayer};
pub use portal::{Portal, PortalArena, PortalError, PortalHandle, PortalType};
pub use scene::{SceneBuild, SceneConfig, SceneError, Shape, StaticScene};
pub use session::{Session, SessionTick};
pub use trajectory::{
    BeatGrid, BeatMarker, Frame, Launch, Termination, Trajectory, TrajectoryComputer,
    TrajectorySettings,
};
