//! Portal endpoints stored in an arena.
//!
//! Entry and exit portals refer to each other by [`PortalHandle`]. The pair
//! relation is symmetric and only [`PortalArena::link`] and
//! [`PortalArena::unlink`] change it, so an entry can never point at an exit
//! that points elsewhere.

use std::f32::consts::PI;
use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default trigger radius around a portal centre.
pub const DEFAULT_PORTAL_RADIUS: f32 = 0.5;

/// Index of a portal inside a [`PortalArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortalHandle(pub u32);

impl fmt::Display for PortalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portal#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalType {
    Entry,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error("unknown portal handle {0}")]
    UnknownHandle(PortalHandle),
    #[error("cannot link {0} to itself")]
    SameEndpoint(PortalHandle),
    #[error("a link needs one entry and one exit, got {a:?} and {b:?}")]
    TypeMismatch { a: PortalType, b: PortalType },
}

/// A single portal endpoint. Rotation is in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    pub position: Vec2,
    pub rotation: f32,
    pub radius: f32,
    /// Applied to the outgoing speed when this portal is the exit.
    pub velocity_multiplier: f32,
    /// Fixed launch direction when this portal is the exit.
    pub exit_direction: Option<Vec2>,
    portal_type: PortalType,
    linked: Option<PortalHandle>,
}

impl Portal {
    pub fn new(position: Vec2, rotation: f32, portal_type: PortalType) -> Self {
        Self {
            position,
            rotation,
            radius: DEFAULT_PORTAL_RADIUS,
            velocity_multiplier: 1.0,
            exit_direction: None,
            portal_type,
            linked: None,
        }
    }

    #[must_use]
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    #[must_use]
    pub fn with_velocity_multiplier(mut self, multiplier: f32) -> Self {
        self.velocity_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_exit_direction(mut self, direction: Vec2) -> Self {
        self.exit_direction = Some(direction);
        self
    }

    pub fn portal_type(&self) -> PortalType {
        self.portal_type
    }

    pub fn linked(&self) -> Option<PortalHandle> {
        self.linked
    }

    /// Velocity of a marble leaving through this portal after entering `entering`.
    ///
    /// With a fixed exit direction the incoming speed is kept and the direction
    /// replaced; otherwise the velocity is rotated by the relative orientation
    /// of the two portals plus a half turn. The multiplier applies to both.
    pub fn exit_velocity(&self, incoming: Vec2, entering: &Portal) -> Vec2 {
        let outgoing = match self.exit_direction {
            Some(direction) => direction.normalize_or_zero() * incoming.length(),
            None => Vec2::from_angle(self.rotation - entering.rotation + PI).rotate(incoming),
        };
        outgoing * self.velocity_multiplier
    }
}

/// A linked entry with a copy of both endpoints, as seen by a computation.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalCrossing {
    pub entry_handle: PortalHandle,
    pub entry: Portal,
    pub exit_handle: PortalHandle,
    pub exit: Portal,
}

/// Arena of portals. Removed slots are kept so handles stay stable.
#[derive(Debug, Clone, Default)]
pub struct PortalArena {
    slots: Vec<Option<Portal>>,
}

impl PortalArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `portal` unlinked and returns its handle.
    pub fn insert(&mut self, mut portal: Portal) -> PortalHandle {
        portal.linked = None;
        let handle = PortalHandle(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(Some(portal));
        handle
    }

    pub fn get(&self, handle: PortalHandle) -> Option<&Portal> {
        self.slots.get(handle.0 as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, handle: PortalHandle) -> Option<&mut Portal> {
        self.slots.get_mut(handle.0 as usize).and_then(Option::as_mut)
    }

    /// Moves or rotates a portal without touching its link.
    pub fn set_transform(
        &mut self,
        handle: PortalHandle,
        position: Vec2,
        rotation: f32,
    ) -> Result<(), PortalError> {
        let portal = self
            .get_mut(handle)
            .ok_or(PortalError::UnknownHandle(handle))?;
        portal.position = position;
        portal.rotation = rotation;
        Ok(())
    }

    /// Removes a portal, unlinking its partner first.
    pub fn remove(&mut self, handle: PortalHandle) -> Option<Portal> {
        self.unlink(handle).ok()?;
        self.slots.get_mut(handle.0 as usize).and_then(Option::take)
    }

    /// Links an entry and an exit, breaking any previous links on either side.
    pub fn link(&mut self, a: PortalHandle, b: PortalHandle) -> Result<(), PortalError> {
        if a == b {
            return Err(PortalError::SameEndpoint(a));
        }
        let type_a = self
            .get(a)
            .ok_or(PortalError::UnknownHandle(a))?
            .portal_type;
        let type_b = self
            .get(b)
            .ok_or(PortalError::UnknownHandle(b))?
            .portal_type;
        if type_a == type_b {
            return Err(PortalError::TypeMismatch {
                a: type_a,
                b: type_b,
            });
        }

        self.unlink(a)?;
        self.unlink(b)?;
        if let Some(portal) = self.get_mut(a) {
            portal.linked = Some(b);
        }
        if let Some(portal) = self.get_mut(b) {
            portal.linked = Some(a);
        }
        tracing::debug!(%a, %b, "[portal] linked");
        Ok(())
    }

    /// Clears the link on `handle` and on its partner.
    pub fn unlink(&mut self, handle: PortalHandle) -> Result<(), PortalError> {
        let partner = self
            .get_mut(handle)
            .ok_or(PortalError::UnknownHandle(handle))?
            .linked
            .take();
        if let Some(partner) = partner {
            if let Some(portal) = self.get_mut(partner) {
                portal.linked = None;
            }
            tracing::debug!(a = %handle, b = %partner, "[portal] unlinked");
        }
        Ok(())
    }

    /// Every entry with a live partner, in handle order.
    pub fn active_crossings(&self) -> Vec<PortalCrossing> {
        self.iter()
            .filter(|(_, portal)| portal.portal_type == PortalType::Entry)
            .filter_map(|(entry_handle, entry)| {
                let exit_handle = entry.linked?;
                let exit = self.get(exit_handle)?;
                Some(PortalCrossing {
                    entry_handle,
                    entry: entry.clone(),
                    exit_handle,
                    exit: exit.clone(),
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalHandle, &Portal)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let handle = PortalHandle(u32::try_from(index).ok()?);
            slot.as_ref().map(|portal| (handle, portal))
        })
    }

    /// Number of live portals.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
