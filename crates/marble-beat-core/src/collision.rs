//! Collision query capability consumed by the stepper and the player.
//!
//! The engine never owns a broad phase. It asks a [`CollisionQuery`] for the
//! first blocking surface along a swept circle and for the colliders around a
//! contact point. [`crate::scene::StaticScene`] is the in-crate implementation;
//! hosts with their own physics world implement the trait themselves.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Slack used when deciding whether a circle already touches a surface.
pub const CONTACT_EPSILON: f32 = 1e-5;

/// Identifier of a collider inside one scene snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColliderId(pub u32);

/// Identifier of an instrument attached to a collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

/// First blocking surface found by a circle sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    pub collider: ColliderId,
    /// Contact point on the collider surface.
    pub point: Vec2,
    /// Unit surface normal pointing back toward the swept circle.
    pub normal: Vec2,
    /// Travelled distance divided by the requested distance (0..=1).
    pub fraction: f32,
}

/// A non-trigger collider found near a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub collider: ColliderId,
    pub instrument: Option<InstrumentId>,
    /// Point on the collider surface closest to the query centre.
    pub closest_point: Vec2,
    /// Distance from the query centre to the surface (0 when inside).
    pub distance: f32,
}

/// Scene capability used by the physics step and instrument resolution.
///
/// Implementations must be deterministic: identical inputs against an
/// unchanged snapshot return identical results, and ties are broken by
/// collider id rather than by container iteration order.
pub trait CollisionQuery {
    /// Sweeps a circle from `center` along the unit `direction` for
    /// `max_distance`, ignoring trigger volumes and `ignore`.
    fn sweep_circle(
        &self,
        center: Vec2,
        radius: f32,
        direction: Vec2,
        max_distance: f32,
        ignore: Option<ColliderId>,
    ) -> Option<SweepHit>;

    /// Returns every non-trigger collider whose surface lies within `radius`
    /// of `center`, ordered by collider id.
    fn overlap_circle(&self, center: Vec2, radius: f32) -> Vec<Overlap>;
}

impl<T: CollisionQuery + ?Sized> CollisionQuery for &T {
    fn sweep_circle(
        &self,
        center: Vec2,
        radius: f32,
        direction: Vec2,
        max_distance: f32,
        ignore: Option<ColliderId>,
    ) -> Option<SweepHit> {
        (**self).sweep_circle(center, radius, direction, max_distance, ignore)
    }

    fn overlap_circle(&self, center: Vec2, radius: f32) -> Vec<Overlap> {
        (**self).overlap_circle(center, radius)
    }
}

impl<T: CollisionQuery + ?Sized> CollisionQuery for std::sync::Arc<T> {
    fn sweep_circle(
        &self,
        center: Vec2,
        radius: f32,
        direction: Vec2,
        max_distance: f32,
        ignore: Option<ColliderId>,
    ) -> Option<SweepHit> {
        (**self).sweep_circle(center, radius, direction, max_distance, ignore)
    }

    fn overlap_circle(&self, center: Vec2, radius: f32) -> Vec<Overlap> {
        (**self).overlap_circle(center, radius)
    }
}

// ============================================================================
// Swept-circle primitives
// ============================================================================

/// Contact produced by a primitive sweep: travel distance, surface point, normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Contact {
    pub distance: f32,
    pub point: Vec2,
    pub normal: Vec2,
}

impl Contact {
    /// Keeps the earlier of two contacts; the existing one wins ties.
    pub(crate) fn earliest(current: Option<Self>, candidate: Option<Self>) -> Option<Self> {
        match (current, candidate) {
            (Some(a), Some(b)) => Some(if b.distance < a.distance { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

/// Closest point on segment `a..b` to `point`.
pub(crate) fn closest_point_on_segment(point: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let edge = b - a;
    let len_sq = edge.length_squared();
    if len_sq < f32::EPSILON {
        return a;
    }
    let t = ((point - a).dot(edge) / len_sq).clamp(0.0, 1.0);
    a + edge * t
}

/// Sweeps a circle of `radius` against a disc of `target_radius` at `center`.
///
/// The returned contact point lies on the disc surface.
pub(crate) fn sweep_disc(
    origin: Vec2,
    direction: Vec2,
    max_distance: f32,
    radius: f32,
    center: Vec2,
    target_radius: f32,
) -> Option<Contact> {
    let reach = radius + target_radius;
    let m = origin - center;
    let b = m.dot(direction);
    let c = m.length_squared() - reach * reach;

    let distance = if c <= CONTACT_EPSILON * reach {
        // Touching or overlapping: only a hit while moving inward.
        if b >= 0.0 {
            return None;
        }
        0.0
    } else {
        if b > 0.0 {
            return None;
        }
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        (-b - disc.sqrt()).max(0.0)
    };

    if distance > max_distance {
        return None;
    }

    let at = origin + direction * distance;
    let mut normal = (at - center).normalize_or_zero();
    if normal == Vec2::ZERO {
        normal = -direction;
    }
    Some(Contact {
        distance,
        point: center + normal * target_radius,
        normal,
    })
}

/// Sweeps a circle against the segment `a..b` (a capsule of `radius`).
pub(crate) fn sweep_segment(
    origin: Vec2,
    direction: Vec2,
    max_distance: f32,
    radius: f32,
    a: Vec2,
    b: Vec2,
) -> Option<Contact> {
    let closest = closest_point_on_segment(origin, a, b);
    let offset = origin - closest;
    let gap = offset.length();

    if gap < radius - CONTACT_EPSILON {
        // Already overlapping the segment: resolve immediately if moving deeper.
        let edge = b - a;
        let normal = if gap > f32::EPSILON {
            offset / gap
        } else {
            let side = edge.perp().normalize_or_zero();
            if side.dot(direction) > 0.0 { -side } else { side }
        };
        return (direction.dot(normal) < 0.0).then_some(Contact {
            distance: 0.0,
            point: closest,
            normal,
        });
    }

    let mut best = None;
    let edge = b - a;
    let len_sq = edge.length_squared();

    if len_sq > f32::EPSILON {
        let face = edge.perp() / len_sq.sqrt();
        for normal in [face, -face] {
            let approach = direction.dot(normal);
            if approach >= 0.0 {
                continue;
            }
            let height = (origin - a).dot(normal) - radius;
            if height < -CONTACT_EPSILON {
                continue;
            }
            let distance = height.max(0.0) / -approach;
            if distance > max_distance {
                continue;
            }
            let at = origin + direction * distance;
            let s = (at - a).dot(edge) / len_sq;
            if (0.0..=1.0).contains(&s) {
                best = Contact::earliest(
                    best,
                    Some(Contact {
                        distance,
                        point: a + edge * s,
                        normal,
                    }),
                );
            }
        }
    }

    for end in [a, b] {
        best = Contact::earliest(
            best,
            sweep_disc(origin, direction, max_distance, radius, end, 0.0),
        );
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(-5.0, 3.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(15.0, 3.0), a, b), b);
        assert_eq!(
            closest_point_on_segment(Vec2::new(4.0, 3.0), a, b),
            Vec2::new(4.0, 0.0)
        );
    }

    #[test]
    fn test_sweep_segment_hits_face() {
        let contact = sweep_segment(
            Vec2::new(0.0, 1.0),
            Vec2::NEG_Y,
            2.0,
            0.1,
            Vec2::new(-5.0, 0.0),
            Vec2::new(5.0, 0.0),
        )
        .expect("should hit the ground");

        assert!((contact.distance - 0.9).abs() < 1e-5);
        assert!((contact.point - Vec2::ZERO).length() < 1e-5);
        assert!((contact.normal - Vec2::Y).length() < 1e-5);
    }

    #[test]
    fn test_sweep_segment_misses_when_short() {
        let contact = sweep_segment(
            Vec2::new(0.0, 1.0),
            Vec2::NEG_Y,
            0.5,
            0.1,
            Vec2::new(-5.0, 0.0),
            Vec2::new(5.0, 0.0),
        );
        assert!(contact.is_none());
    }

    #[test]
    fn test_sweep_segment_ignores_when_leaving_contact() {
        // Resting exactly one radius above the ground, moving up.
        let contact = sweep_segment(
            Vec2::new(0.0, 0.1),
            Vec2::Y,
            1.0,
            0.1,
            Vec2::new(-5.0, 0.0),
            Vec2::new(5.0, 0.0),
        );
        assert!(contact.is_none());
    }

    #[test]
    fn test_sweep_segment_hits_endpoint_cap() {
        let contact = sweep_segment(
            Vec2::new(-1.0, 0.0),
            Vec2::X,
            2.0,
            0.1,
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0) + Vec2::new(0.0, -5.0),
        )
        .expect("should hit the top cap");
        assert!((contact.distance - 0.9).abs() < 1e-4);
        assert!((contact.normal - Vec2::NEG_X).length() < 1e-4);
    }

    #[test]
    fn test_sweep_disc_reports_surface_point() {
        let contact = sweep_disc(
            Vec2::new(-3.0, 0.0),
            Vec2::X,
            5.0,
            0.5,
            Vec2::ZERO,
            1.0,
        )
        .expect("should hit the disc");
        assert!((contact.distance - 1.5).abs() < 1e-5);
        assert!((contact.point - Vec2::new(-1.0, 0.0)).length() < 1e-5);
        assert!((contact.normal - Vec2::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_earliest_prefers_existing_on_tie() {
        let a = Contact {
            distance: 1.0,
            point: Vec2::ZERO,
            normal: Vec2::Y,
        };
        let b = Contact {
            distance: 1.0,
            point: Vec2::ONE,
            normal: Vec2::X,
        };
        assert_eq!(Contact::earliest(Some(a), Some(b)), Some(a));
    }
}
