//! Static scene snapshot and its JSON configuration.
//!
//! A [`SceneConfig`] describes obstacles, instruments, triggers, emitters and
//! portal pairs. [`SceneConfig::apply`] validates it and produces a
//! [`SceneBuild`]: an immutable [`StaticScene`] that answers collision queries
//! plus the portal arena and the emitter placements.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collision::{
    CollisionQuery, ColliderId, Contact, InstrumentId, Overlap, SweepHit, closest_point_on_segment,
    sweep_disc, sweep_segment,
};
use crate::portal::{Portal, PortalArena, PortalError, PortalHandle, PortalType};

/// Errors raised while turning a [`SceneConfig`] into a [`SceneBuild`].
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("object {index}: invalid shape: {reason}")]
    InvalidShape { index: usize, reason: String },
    #[error("object {index}: role `{role}` requires `{property}` properties")]
    MissingProperties {
        index: usize,
        role: &'static str,
        property: &'static str,
    },
    #[error("portal pair {index}: {source}")]
    Portal {
        index: usize,
        #[source]
        source: PortalError,
    },
    #[error("portal pair {index}: radius must be positive, got {radius}")]
    InvalidPortalRadius { index: usize, radius: f32 },
}

// ============================================================================
// Shapes
// ============================================================================

/// Collider geometry. Rect rotation is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Line {
        start: Vec2,
        end: Vec2,
    },
    Circle {
        center: Vec2,
        radius: f32,
    },
    Rect {
        center: Vec2,
        size: Vec2,
        #[serde(default)]
        rotation: f32,
    },
}

impl Shape {
    /// Checks that the shape has a usable extent.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Line { start, end } => {
                if !(start.is_finite() && end.is_finite()) {
                    return Err("line endpoints must be finite".to_string());
                }
                if start.distance_squared(end) < f32::EPSILON {
                    return Err("line has zero length".to_string());
                }
            }
            Self::Circle { center, radius } => {
                if !center.is_finite() || !(radius.is_finite() && radius > 0.0) {
                    return Err(format!("circle radius must be positive, got {radius}"));
                }
            }
            Self::Rect {
                center,
                size,
                rotation,
            } => {
                if !(center.is_finite() && rotation.is_finite()) {
                    return Err("rect transform must be finite".to_string());
                }
                if !(size.x > 0.0 && size.y > 0.0) {
                    return Err(format!("rect size must be positive, got {size}"));
                }
            }
        }
        Ok(())
    }

    /// Geometric centre of the shape.
    pub fn center(&self) -> Vec2 {
        match *self {
            Self::Line { start, end } => (start + end) * 0.5,
            Self::Circle { center, .. } | Self::Rect { center, .. } => center,
        }
    }

    /// Corners of a rotated rectangle, counter-clockwise.
    fn rect_corners(center: Vec2, size: Vec2, rotation: f32) -> [Vec2; 4] {
        let half = size * 0.5;
        let rot = Vec2::from_angle(rotation.to_radians());
        [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
        ]
        .map(|corner| center + rot.rotate(corner))
    }

    fn rect_contains(center: Vec2, size: Vec2, rotation: f32, point: Vec2) -> bool {
        let local = Vec2::from_angle(-rotation.to_radians()).rotate(point - center);
        local.x.abs() <= size.x * 0.5 && local.y.abs() <= size.y * 0.5
    }

    /// First contact of a circle swept from `origin` along unit `direction`.
    pub(crate) fn sweep(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        radius: f32,
    ) -> Option<Contact> {
        match *self {
            Self::Line { start, end } => {
                sweep_segment(origin, direction, max_distance, radius, start, end)
            }
            Self::Circle {
                center,
                radius: target,
            } => sweep_disc(origin, direction, max_distance, radius, center, target),
            Self::Rect {
                center,
                size,
                rotation,
            } => {
                let corners = Self::rect_corners(center, size, rotation);
                (0..4).fold(None, |best, i| {
                    Contact::earliest(
                        best,
                        sweep_segment(
                            origin,
                            direction,
                            max_distance,
                            radius,
                            corners[i],
                            corners[(i + 1) % 4],
                        ),
                    )
                })
            }
        }
    }

    /// Closest surface point to `point` and the distance to it (0 inside).
    pub fn closest_point(&self, point: Vec2) -> (Vec2, f32) {
        match *self {
            Self::Line { start, end } => {
                let closest = closest_point_on_segment(point, start, end);
                (closest, closest.distance(point))
            }
            Self::Circle { center, radius } => {
                let offset = point - center;
                let len = offset.length();
                if len <= radius {
                    (point, 0.0)
                } else {
                    (center + offset / len * radius, len - radius)
                }
            }
            Self::Rect {
                center,
                size,
                rotation,
            } => {
                if Self::rect_contains(center, size, rotation, point) {
                    return (point, 0.0);
                }
                let corners = Self::rect_corners(center, size, rotation);
                let mut best = (corners[0], f32::INFINITY);
                for i in 0..4 {
                    let closest = closest_point_on_segment(point, corners[i], corners[(i + 1) % 4]);
                    let distance = closest.distance(point);
                    if distance < best.1 {
                        best = (closest, distance);
                    }
                }
                best
            }
        }
    }
}

// ============================================================================
// Static scene
// ============================================================================

/// How a collider participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderKind {
    /// Blocks the marble.
    Solid,
    /// Sensor volume; never blocks, never plays.
    Trigger,
    /// Blocks the marble and plays a sound when hit.
    Instrument(InstrumentId),
}

/// A collider registered in a [`StaticScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCollider {
    pub id: ColliderId,
    pub shape: Shape,
    pub kind: ColliderKind,
}

impl SceneCollider {
    pub fn is_trigger(&self) -> bool {
        self.kind == ColliderKind::Trigger
    }

    pub fn instrument(&self) -> Option<InstrumentId> {
        match self.kind {
            ColliderKind::Instrument(id) => Some(id),
            _ => None,
        }
    }
}

/// Immutable snapshot of static colliders answering [`CollisionQuery`].
///
/// Colliders are stored in id order; queries scan them linearly so results
/// never depend on hashing or insertion races.
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    colliders: Vec<SceneCollider>,
    next_instrument: u32,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, shape: Shape, kind: ColliderKind) -> ColliderId {
        let id = ColliderId(u32::try_from(self.colliders.len()).unwrap_or(u32::MAX));
        self.colliders.push(SceneCollider { id, shape, kind });
        id
    }

    /// Adds a solid, silent collider.
    pub fn add_obstacle(&mut self, shape: Shape) -> ColliderId {
        self.push(shape, ColliderKind::Solid)
    }

    /// Adds a sensor volume that never blocks the marble.
    pub fn add_trigger(&mut self, shape: Shape) -> ColliderId {
        self.push(shape, ColliderKind::Trigger)
    }

    /// Adds a solid collider with a fresh instrument attached.
    pub fn add_instrument(&mut self, shape: Shape) -> (ColliderId, InstrumentId) {
        let instrument = InstrumentId(self.next_instrument);
        self.next_instrument += 1;
        (
            self.push(shape, ColliderKind::Instrument(instrument)),
            instrument,
        )
    }

    pub fn collider(&self, id: ColliderId) -> Option<&SceneCollider> {
        self.colliders.get(id.0 as usize)
    }

    pub fn colliders(&self) -> &[SceneCollider] {
        &self.colliders
    }

    pub fn instrument_of(&self, id: ColliderId) -> Option<InstrumentId> {
        self.collider(id).and_then(SceneCollider::instrument)
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}

impl CollisionQuery for StaticScene {
    fn sweep_circle(
        &self,
        center: Vec2,
        radius: f32,
        direction: Vec2,
        max_distance: f32,
        ignore: Option<ColliderId>,
    ) -> Option<SweepHit> {
        let mut best: Option<(ColliderId, Contact)> = None;

        for collider in &self.colliders {
            if collider.is_trigger() || Some(collider.id) == ignore {
                continue;
            }
            let Some(contact) = collider.shape.sweep(center, direction, max_distance, radius)
            else {
                continue;
            };
            if best.is_none_or(|(_, current)| contact.distance < current.distance) {
                best = Some((collider.id, contact));
            }
        }

        best.map(|(collider, contact)| SweepHit {
            collider,
            point: contact.point,
            normal: contact.normal,
            fraction: if max_distance > 0.0 {
                contact.distance / max_distance
            } else {
                0.0
            },
        })
    }

    fn overlap_circle(&self, center: Vec2, radius: f32) -> Vec<Overlap> {
        self.colliders
            .iter()
            .filter(|collider| !collider.is_trigger())
            .filter_map(|collider| {
                let (closest_point, distance) = collider.shape.closest_point(center);
                (distance <= radius).then_some(Overlap {
                    collider: collider.id,
                    instrument: collider.instrument(),
                    closest_point,
                    distance,
                })
            })
            .collect()
    }
}

// ============================================================================
// JSON scene configuration
// ============================================================================

/// Object role in the scene.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectRole {
    Obstacle,
    Trigger,
    Instrument,
    Emitter,
}

/// Instrument properties. Sound mapping happens outside the core; `kind` and
/// `note` are carried through to the sink's host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstrumentProperties {
    pub kind: String,
    #[serde(default)]
    pub note: u8,
}

impl InstrumentProperties {
    /// Bumpers squash instead of pulsing when hit.
    pub fn is_bumper(&self) -> bool {
        self.kind.eq_ignore_ascii_case("bumper")
    }
}

/// Emitter properties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EmitterProperties {
    #[serde(default)]
    pub initial_velocity: Vec2,
    #[serde(default = "default_beat_period")]
    pub beat_period: u32,
    /// Offset from the emitter centre where marbles appear.
    #[serde(default)]
    pub spawn_offset: Vec2,
}

fn default_beat_period() -> u32 {
    crate::emitter::DEFAULT_BEAT_PERIOD
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ObjectProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitter: Option<EmitterProperties>,
}

/// A scene object with role, shape, and properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: ObjectRole,
    pub shape: Shape,
    #[serde(default)]
    pub properties: ObjectProperties,
}

/// One portal endpoint. Rotation is in degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PortalPlacement {
    pub position: Vec2,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_portal_radius")]
    pub radius: f32,
    #[serde(default = "default_velocity_multiplier")]
    pub velocity_multiplier: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_direction: Option<Vec2>,
}

fn default_portal_radius() -> f32 {
    crate::portal::DEFAULT_PORTAL_RADIUS
}

fn default_velocity_multiplier() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// An entry/exit portal pair, linked unless `linked` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalPairConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub entry: PortalPlacement,
    pub exit: PortalPlacement,
    #[serde(default = "default_true")]
    pub linked: bool,
}

/// Scene metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneMeta {
    pub name: String,
    /// View bottom in world units; marbles below it (minus a margin) despawn.
    #[serde(default = "default_view_bottom")]
    pub view_bottom: f32,
}

fn default_view_bottom() -> f32 {
    -10.0
}

/// Complete scene description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfig {
    pub meta: SceneMeta,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub portals: Vec<PortalPairConfig>,
}

/// An instrument collider with the properties its host needs to play it.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInfo {
    pub id: InstrumentId,
    pub collider: ColliderId,
    pub label: Option<String>,
    pub properties: InstrumentProperties,
}

/// Where an emitter sits and what it launches.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterPlacement {
    pub label: Option<String>,
    pub position: Vec2,
    pub collider: ColliderId,
    pub properties: EmitterProperties,
}

/// Everything produced by applying a [`SceneConfig`].
#[derive(Debug, Clone)]
pub struct SceneBuild {
    pub scene: StaticScene,
    pub portals: PortalArena,
    pub instruments: Vec<InstrumentInfo>,
    pub emitters: Vec<EmitterPlacement>,
    /// Object id to collider mapping for labelled objects.
    pub object_colliders: BTreeMap<String, ColliderId>,
    /// Portal pair id to (entry, exit) handles.
    pub portal_pairs: BTreeMap<String, (PortalHandle, PortalHandle)>,
    pub view_bottom: f32,
}

impl SceneConfig {
    /// Loads a scene configuration from JSON string.
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the scene configuration to JSON string.
    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the scene and builds the collision snapshot and portal arena.
    pub fn apply(&self) -> Result<SceneBuild, SceneError> {
        let mut scene = StaticScene::new();
        let mut instruments = Vec::new();
        let mut emitters = Vec::new();
        let mut object_colliders = BTreeMap::new();

        for (index, obj) in self.objects.iter().enumerate() {
            obj.shape
                .validate()
                .map_err(|reason| SceneError::InvalidShape { index, reason })?;

            let collider = match obj.role {
                ObjectRole::Obstacle => scene.add_obstacle(obj.shape),
                ObjectRole::Trigger => scene.add_trigger(obj.shape),
                ObjectRole::Instrument => {
                    let properties = obj.properties.instrument.clone().ok_or(
                        SceneError::MissingProperties {
                            index,
                            role: "instrument",
                            property: "instrument",
                        },
                    )?;
                    let (collider, id) = scene.add_instrument(obj.shape);
                    instruments.push(InstrumentInfo {
                        id,
                        collider,
                        label: obj.id.clone(),
                        properties,
                    });
                    collider
                }
                ObjectRole::Emitter => {
                    let properties =
                        obj.properties
                            .emitter
                            .ok_or(SceneError::MissingProperties {
                                index,
                                role: "emitter",
                                property: "emitter",
                            })?;
                    // Emitters are solid; their own marbles ignore them.
                    let collider = scene.add_obstacle(obj.shape);
                    emitters.push(EmitterPlacement {
                        label: obj.id.clone(),
                        position: obj.shape.center(),
                        collider,
                        properties,
                    });
                    collider
                }
            };

            if let Some(id) = &obj.id {
                object_colliders.insert(id.clone(), collider);
            }
        }

        let mut portals = PortalArena::new();
        let mut portal_pairs = BTreeMap::new();
        for (index, pair) in self.portals.iter().enumerate() {
            for placement in [&pair.entry, &pair.exit] {
                if !(placement.radius.is_finite() && placement.radius > 0.0) {
                    return Err(SceneError::InvalidPortalRadius {
                        index,
                        radius: placement.radius,
                    });
                }
            }

            let entry = portals.insert(placement_to_portal(&pair.entry, PortalType::Entry));
            let exit = portals.insert(placement_to_portal(&pair.exit, PortalType::Exit));
            if pair.linked {
                portals
                    .link(entry, exit)
                    .map_err(|source| SceneError::Portal { index, source })?;
            }
            if let Some(id) = &pair.id {
                portal_pairs.insert(id.clone(), (entry, exit));
            }
        }

        tracing::info!(
            name = %self.meta.name,
            colliders = scene.len(),
            instruments = instruments.len(),
            emitters = emitters.len(),
            portals = portals.len(),
            "[scene] applied"
        );

        Ok(SceneBuild {
            scene,
            portals,
            instruments,
            emitters,
            object_colliders,
            portal_pairs,
            view_bottom: self.meta.view_bottom,
        })
    }
}

fn placement_to_portal(placement: &PortalPlacement, portal_type: PortalType) -> Portal {
    let mut portal = Portal::new(
        placement.position,
        placement.rotation.to_radians(),
        portal_type,
    )
    .with_radius(placement.radius)
    .with_velocity_multiplier(placement.velocity_multiplier);
    if let Some(direction) = placement.exit_direction {
        portal = portal.with_exit_direction(direction);
    }
    portal
}
