//! Sandbox session: one scene, one beat clock, and everything that runs on them.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec2;

use crate::animation::{AnimationFrame, AnimationKind, AnimationSystem, AnimationTarget};
use crate::beat_clock::{BeatClock, MIN_BPM};
use crate::beat_index::{BeatMarkerIndex, SnapResult};
use crate::collision::InstrumentId;
use crate::config::SandboxConfig;
use crate::emitter::{EmitterId, PeriodicEmitter};
use crate::marble::{Color, DespawnReason, MarbleId, MarbleManager};
use crate::player::{InstrumentHit, InstrumentSink};
use crate::portal::{PortalArena, PortalError, PortalHandle};
use crate::scene::{InstrumentInfo, SceneBuild, StaticScene};
use crate::trajectory::{Launch, Trajectory, TrajectoryComputer};

/// Source id recorded on trajectories launched without an emitter.
pub const MANUAL_SOURCE: EmitterId = EmitterId(u32::MAX);

/// Everything that happened during one [`Session::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTick {
    /// Session time after the tick.
    pub time: f64,
    /// New integer beat, if the clock crossed one.
    pub beat: Option<u64>,
    pub spawned: Vec<MarbleId>,
    pub hits: Vec<(MarbleId, InstrumentHit)>,
    pub despawned: Vec<(MarbleId, DespawnReason)>,
    pub animations: Vec<AnimationFrame>,
}

/// Explicit owner of a running sandbox.
#[derive(Debug)]
pub struct Session {
    config: SandboxConfig,
    computer: TrajectoryComputer,
    scene: Arc<StaticScene>,
    portals: PortalArena,
    instruments: BTreeMap<InstrumentId, InstrumentInfo>,
    clock: BeatClock,
    emitters: Vec<PeriodicEmitter>,
    next_emitter_id: u32,
    marbles: MarbleManager,
    markers: BeatMarkerIndex,
    animations: AnimationSystem,
    view_bottom: f32,
    ticks: u64,
}

impl Session {
    /// Creates a session over an empty scene.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            computer: TrajectoryComputer::new(config.physics, config.trajectory),
            scene: Arc::new(StaticScene::new()),
            portals: PortalArena::new(),
            instruments: BTreeMap::new(),
            clock: BeatClock::new(config.beat.bpm),
            emitters: Vec::new(),
            next_emitter_id: 0,
            marbles: MarbleManager::new(),
            markers: BeatMarkerIndex::new(),
            animations: AnimationSystem::new(),
            view_bottom: -10.0,
            ticks: 0,
            config,
        }
    }

    /// Creates a session from an applied scene, with one emitter per placement.
    pub fn from_build(config: SandboxConfig, build: SceneBuild) -> Self {
        let mut session = Self::new(config);
        session.scene = Arc::new(build.scene);
        session.portals = build.portals;
        session.instruments = build
            .instruments
            .into_iter()
            .map(|info| (info.id, info))
            .collect();
        session.view_bottom = build.view_bottom;

        for placement in build.emitters {
            let id = session.allocate_emitter_id();
            let mut emitter = PeriodicEmitter::new(
                id,
                placement.position,
                placement.properties.initial_velocity,
                placement.properties.beat_period,
            );
            emitter.label = placement.label;
            emitter.spawn_offset = placement.properties.spawn_offset;
            emitter.collider = Some(placement.collider);
            emitter.color = Color::from_palette(id.0 as usize);
            session.emitters.push(emitter);
        }

        session.recompute_predictions();
        session
    }

    fn allocate_emitter_id(&mut self) -> EmitterId {
        let id = EmitterId(self.next_emitter_id);
        self.next_emitter_id += 1;
        id
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn scene(&self) -> &Arc<StaticScene> {
        &self.scene
    }

    pub fn portals(&self) -> &PortalArena {
        &self.portals
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&InstrumentInfo> {
        self.instruments.get(&id)
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut BeatClock {
        &mut self.clock
    }

    pub fn emitters(&self) -> &[PeriodicEmitter] {
        &self.emitters
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&PeriodicEmitter> {
        self.emitters.iter().find(|e| e.id() == id)
    }

    fn emitter_mut(&mut self, id: EmitterId) -> Option<&mut PeriodicEmitter> {
        self.emitters.iter_mut().find(|e| e.id() == id)
    }

    pub fn marbles(&self) -> &MarbleManager {
        &self.marbles
    }

    pub fn markers(&self) -> &BeatMarkerIndex {
        &self.markers
    }

    pub fn animations(&self) -> &AnimationSystem {
        &self.animations
    }

    pub fn view_bottom(&self) -> f32 {
        self.view_bottom
    }

    /// Session time, advanced by one player tick per [`Self::tick`].
    #[allow(clippy::cast_precision_loss)]
    pub fn time(&self) -> f64 {
        self.ticks as f64 * self.config.player.tick_dt
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Replaces the collision snapshot and portals; live marbles keep their paths.
    pub fn replace_scene(&mut self, scene: StaticScene, portals: PortalArena) {
        self.scene = Arc::new(scene);
        self.portals = portals;
        self.recompute_predictions();
    }

    /// Adds an emitter and computes its prediction.
    pub fn add_emitter(
        &mut self,
        position: Vec2,
        initial_velocity: Vec2,
        beat_period: u32,
    ) -> EmitterId {
        let id = self.allocate_emitter_id();
        let mut emitter = PeriodicEmitter::new(id, position, initial_velocity, beat_period);
        emitter.color = Color::from_palette(id.0 as usize);
        self.emitters.push(emitter);
        tracing::info!(emitter = %id, ?position, "[session] emitter added");
        self.recompute_predictions();
        id
    }

    pub fn remove_emitter(&mut self, id: EmitterId) -> bool {
        let before = self.emitters.len();
        self.emitters.retain(|e| e.id() != id);
        let removed = self.emitters.len() != before;
        if removed {
            self.recompute_predictions();
        }
        removed
    }

    /// Applies `edit` to an emitter, then recomputes predictions.
    pub fn edit_emitter(&mut self, id: EmitterId, edit: impl FnOnce(&mut PeriodicEmitter)) -> bool {
        let Some(emitter) = self.emitter_mut(id) else {
            return false;
        };
        edit(emitter);
        self.recompute_predictions();
        true
    }

    pub fn link_portals(&mut self, a: PortalHandle, b: PortalHandle) -> Result<(), PortalError> {
        self.portals.link(a, b)?;
        self.recompute_predictions();
        Ok(())
    }

    pub fn unlink_portal(&mut self, handle: PortalHandle) -> Result<(), PortalError> {
        self.portals.unlink(handle)?;
        self.recompute_predictions();
        Ok(())
    }

    /// Changes the tempo of the clock and the marker grid.
    pub fn set_bpm(&mut self, bpm: f64) {
        let bpm = if bpm.is_finite() { bpm.max(MIN_BPM) } else { MIN_BPM };
        self.config.beat.bpm = bpm;
        self.clock.set_bpm(bpm);
        self.recompute_predictions();
    }

    /// Sets the marker spacing in beats, clamped to (0, 1].
    pub fn set_beat_division(&mut self, division: f64) {
        if !(division.is_finite() && division > 0.0) {
            tracing::warn!(division, "[session] ignoring invalid beat division");
            return;
        }
        self.config.beat.beat_division = division.min(1.0);
        self.recompute_predictions();
    }

    /// Recomputes every emitter's prediction and rebuilds the marker index.
    pub fn recompute_predictions(&mut self) -> usize {
        let grid = self.config.beat.grid();
        for emitter in &mut self.emitters {
            let trajectory = self.computer.compute(
                self.scene.as_ref(),
                &self.portals,
                &emitter.launch(),
                Some(grid),
                emitter.id(),
            );
            emitter.set_prediction(Arc::new(trajectory));
        }

        let count = self.markers.rebuild(
            self.emitters
                .iter()
                .filter_map(|emitter| emitter.prediction().map(AsRef::as_ref)),
        );
        tracing::debug!(
            emitters = self.emitters.len(),
            markers = count,
            "[session] predictions recomputed"
        );
        count
    }

    /// Preview of an arbitrary launch, with beat markers.
    pub fn predict(&self, launch: &Launch) -> Trajectory {
        self.computer.compute(
            self.scene.as_ref(),
            &self.portals,
            launch,
            Some(self.config.beat.grid()),
            MANUAL_SOURCE,
        )
    }

    /// Snaps an instrument placement against the current markers.
    pub fn snap_placement(&self, cursor: Vec2) -> SnapResult {
        self.markers.snap_placement(cursor, &self.config.snap)
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    pub fn start_emitter(&mut self, id: EmitterId, now: f64) -> bool {
        let Some(index) = self.emitters.iter().position(|e| e.id() == id) else {
            return false;
        };
        self.emitters[index].start(&mut self.clock, now);
        true
    }

    pub fn stop_emitter(&mut self, id: EmitterId) -> bool {
        let Some(emitter) = self.emitter_mut(id) else {
            return false;
        };
        emitter.stop();
        true
    }

    pub fn start_all(&mut self, now: f64) {
        for emitter in &mut self.emitters {
            emitter.start(&mut self.clock, now);
        }
    }

    /// Spawns a marble from an emitter, computing its trajectory now.
    pub fn spawn_marble(&mut self, id: EmitterId) -> Option<MarbleId> {
        let emitter = self.emitter(id)?;
        let launch = emitter.launch();
        let color = emitter.color;

        let trajectory = self
            .computer
            .compute(self.scene.as_ref(), &self.portals, &launch, None, id);
        let marble = self.marbles.spawn(
            Arc::new(trajectory),
            self.config.player,
            color,
            Some(id),
        );
        self.animations
            .trigger(AnimationTarget::Emitter(id), AnimationKind::SpawnFlash, self.time());
        Some(marble)
    }

    /// Launches a marble that does not belong to an emitter.
    pub fn launch_marble(&mut self, launch: &Launch, color: Color) -> MarbleId {
        let trajectory = self
            .computer
            .compute(self.scene.as_ref(), &self.portals, launch, None, MANUAL_SOURCE);
        self.marbles
            .spawn(Arc::new(trajectory), self.config.player, color, None)
    }

    fn hit_animation(&self, instrument: InstrumentId) -> AnimationKind {
        match self.instruments.get(&instrument) {
            Some(info) if info.properties.is_bumper() => AnimationKind::BumperPress,
            _ => AnimationKind::HitPulse,
        }
    }

    /// Advances the session by one fixed tick.
    ///
    /// Order: clock update, emitter spawns, marble replay, animations, despawn.
    pub fn tick<S: InstrumentSink + ?Sized>(
        &mut self,
        now: f64,
        view_bottom: f32,
        sink: &mut S,
    ) -> SessionTick {
        self.ticks += 1;
        let time = self.time();
        let beat = self.clock.update(now);

        let due: Vec<EmitterId> = self
            .emitters
            .iter_mut()
            .filter_map(|emitter| emitter.update(&self.clock, now).then_some(emitter.id()))
            .collect();
        let spawned: Vec<MarbleId> = due
            .into_iter()
            .filter_map(|id| self.spawn_marble(id))
            .collect();

        let mut hits = Vec::new();
        for marble_tick in
            self.marbles
                .tick_all(self.scene.as_ref(), sink, view_bottom, &self.config.marble)
        {
            for hit in marble_tick.hits {
                hits.push((marble_tick.id, hit));
            }
        }
        for (_, hit) in &hits {
            let kind = self.hit_animation(hit.instrument);
            self.animations
                .trigger(AnimationTarget::Instrument(hit.instrument), kind, time);
        }

        let animations = self.animations.advance(time);
        let despawned = self.marbles.remove_dead();

        SessionTick {
            time,
            beat,
            spawned,
            hits,
            despawned,
            animations,
        }
    }

    /// Stops all emitters, removes all marbles and resets the clock.
    pub fn reset(&mut self, now: f64) {
        for emitter in &mut self.emitters {
            emitter.stop();
        }
        self.marbles.clear();
        self.animations.clear();
        self.clock.stop();
        self.clock.reset(now);
        self.ticks = 0;
        tracing::info!("[session] reset");
    }
}
