//! Beat-period marble emitters.
//!
//! An emitter launches a marble every `beat_period` beats of the shared
//! [`BeatClock`]. Starting an emitter waits for the next multiple of its
//! period so every emitter in a session lands on the same grid.

use std::fmt;
use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::beat_clock::BeatClock;
use crate::collision::ColliderId;
use crate::marble::Color;
use crate::trajectory::{Launch, Trajectory};

pub const DEFAULT_BEAT_PERIOD: u32 = 4;
pub const MIN_BEAT_PERIOD: u32 = 1;
pub const MAX_BEAT_PERIOD: u32 = 16;

/// A start this close to the next sync point spawns right away.
pub const IMMEDIATE_START_WINDOW: f64 = 0.05;

/// Unique identifier for an emitter; also the source id of its beat markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmitterId(pub u32);

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmitterPhase {
    Idle,
    WaitingForSync { start_at: f64 },
    Active { next_spawn_at: f64 },
}

#[derive(Debug, Clone)]
pub struct PeriodicEmitter {
    id: EmitterId,
    pub label: Option<String>,
    pub position: Vec2,
    /// Offset from `position` where marbles appear.
    pub spawn_offset: Vec2,
    pub initial_velocity: Vec2,
    pub color: Color,
    /// The emitter's own collider, ignored by the marbles it launches.
    pub collider: Option<ColliderId>,
    beat_period: u32,
    phase: EmitterPhase,
    prediction: Option<Arc<Trajectory>>,
}

impl PeriodicEmitter {
    pub fn new(id: EmitterId, position: Vec2, initial_velocity: Vec2, beat_period: u32) -> Self {
        Self {
            id,
            label: None,
            position,
            spawn_offset: Vec2::ZERO,
            initial_velocity,
            color: Color::WHITE,
            collider: None,
            beat_period: beat_period.clamp(MIN_BEAT_PERIOD, MAX_BEAT_PERIOD),
            phase: EmitterPhase::Idle,
            prediction: None,
        }
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn beat_period(&self) -> u32 {
        self.beat_period
    }

    /// Sets the period in beats, clamped to 1..=16.
    pub fn set_beat_period(&mut self, beat_period: u32) {
        self.beat_period = beat_period.clamp(MIN_BEAT_PERIOD, MAX_BEAT_PERIOD);
    }

    pub fn increase_period(&mut self) {
        self.set_beat_period(self.beat_period.saturating_add(1));
    }

    pub fn decrease_period(&mut self) {
        self.set_beat_period(self.beat_period.saturating_sub(1));
    }

    pub fn phase(&self) -> EmitterPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != EmitterPhase::Idle
    }

    /// Launch state for the next marble.
    pub fn launch(&self) -> Launch {
        Launch {
            position: self.position + self.spawn_offset,
            velocity: self.initial_velocity,
            ignore: self.collider,
        }
    }

    pub fn prediction(&self) -> Option<&Arc<Trajectory>> {
        self.prediction.as_ref()
    }

    /// Replaces the active prediction; the previous one is dropped.
    pub fn set_prediction(&mut self, trajectory: Arc<Trajectory>) {
        self.prediction = Some(trajectory);
    }

    pub fn clear_prediction(&mut self) {
        self.prediction = None;
    }

    fn period_seconds(&self, clock: &BeatClock) -> f64 {
        f64::from(self.beat_period) * clock.seconds_per_beat()
    }

    /// Arms the emitter on the shared clock, starting the clock if needed.
    pub fn start(&mut self, clock: &mut BeatClock, now: f64) {
        if self.is_active() {
            return;
        }
        clock.start(now);

        let sync_at = clock.next_sync_time(self.beat_period, now);
        self.phase = if sync_at - now < IMMEDIATE_START_WINDOW {
            EmitterPhase::Active { next_spawn_at: now }
        } else {
            EmitterPhase::WaitingForSync { start_at: sync_at }
        };
        tracing::info!(emitter = %self.id, now, sync_at, "[emitter] started");
    }

    pub fn stop(&mut self) {
        if self.is_active() {
            tracing::info!(emitter = %self.id, "[emitter] stopped");
        }
        self.phase = EmitterPhase::Idle;
    }

    pub fn toggle(&mut self, clock: &mut BeatClock, now: f64) {
        if self.is_active() {
            self.stop();
        } else {
            self.start(clock, now);
        }
    }

    /// Advances the schedule to `now`; returns true when a marble is due.
    ///
    /// At most one spawn is reported per call. Periods missed during a stall
    /// are skipped whole, so the schedule stays on its original grid.
    pub fn update(&mut self, clock: &BeatClock, now: f64) -> bool {
        let due_at = match self.phase {
            EmitterPhase::Idle => return false,
            EmitterPhase::WaitingForSync { start_at } => start_at,
            EmitterPhase::Active { next_spawn_at } => next_spawn_at,
        };
        if now < due_at {
            return false;
        }
        self.phase = EmitterPhase::Active {
            next_spawn_at: next_on_grid(due_at, self.period_seconds(clock), now),
        };
        true
    }
}

/// First point of the grid `anchor + k * period` strictly after `now`.
fn next_on_grid(anchor: f64, period: f64, now: f64) -> f64 {
    if period <= 0.0 {
        return now;
    }
    let missed = ((now - anchor) / period).floor().max(0.0);
    let next = anchor + period * (missed + 1.0);
    if next <= now { next + period } else { next }
}
