//! Tick-driven visual feedback for instruments and emitters.
//!
//! Each target has at most one running animation. Triggering a target that is
//! still animating is ignored, so rapid hits never stack pulses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collision::InstrumentId;
use crate::emitter::EmitterId;

/// Easing type for animations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EasingType {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl EasingType {
    /// Applies the easing function to a normalized time value (0.0 to 1.0).
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

/// Entity an animation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AnimationTarget {
    Instrument(InstrumentId),
    Emitter(EmitterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    /// Instrument hit: scale 1.2 back to 1 with a color flash.
    HitPulse,
    /// Bumper hit: squash to 0.8 and back.
    BumperPress,
    /// Emitter spawn: short flash.
    SpawnFlash,
}

impl AnimationKind {
    /// Duration in seconds.
    pub fn duration(self) -> f64 {
        match self {
            Self::HitPulse => 0.1,
            Self::BumperPress => 0.15,
            Self::SpawnFlash => 0.05,
        }
    }

    fn easing(self) -> EasingType {
        match self {
            Self::HitPulse => EasingType::EaseOut,
            Self::BumperPress => EasingType::EaseInOut,
            Self::SpawnFlash => EasingType::Linear,
        }
    }

    /// Scale and flash intensity at normalized progress `t`.
    fn sample(self, t: f32) -> (f32, f32) {
        let eased = self.easing().apply(t);
        match self {
            Self::HitPulse => (1.0 + 0.2 * (1.0 - eased), 1.0 - eased),
            Self::BumperPress => {
                let squash = 1.0 - (2.0 * eased - 1.0).abs();
                (1.0 - 0.2 * squash, 0.0)
            }
            Self::SpawnFlash => (1.0, 1.0 - eased),
        }
    }
}

/// Represents an active animation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveAnimation {
    kind: AnimationKind,
    start_time: f64,
    duration: f64,
}

impl ActiveAnimation {
    #[allow(clippy::cast_possible_truncation)]
    fn progress(&self, now: f64) -> f32 {
        if self.duration > 0.0 {
            ((now - self.start_time) / self.duration).clamp(0.0, 1.0) as f32
        } else {
            1.0
        }
    }

    /// Returns true if the animation has completed.
    fn is_finished(&self, now: f64) -> bool {
        now - self.start_time >= self.duration
    }
}

/// Render state of one animated target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFrame {
    pub target: AnimationTarget,
    pub kind: AnimationKind,
    pub scale: f32,
    /// Color flash intensity in 0..=1.
    pub flash: f32,
    /// Last frame of this animation; the target is at rest afterwards.
    pub finished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnimationSystem {
    active: BTreeMap<AnimationTarget, ActiveAnimation>,
}

impl AnimationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `kind` on `target` unless it is already animating.
    pub fn trigger(&mut self, target: AnimationTarget, kind: AnimationKind, now: f64) -> bool {
        if self.active.contains_key(&target) {
            return false;
        }
        self.active.insert(
            target,
            ActiveAnimation {
                kind,
                start_time: now,
                duration: kind.duration(),
            },
        );
        true
    }

    pub fn is_animating(&self, target: AnimationTarget) -> bool {
        self.active.contains_key(&target)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Samples every running animation at `now` and retires finished ones.
    pub fn advance(&mut self, now: f64) -> Vec<AnimationFrame> {
        let frames: Vec<AnimationFrame> = self
            .active
            .iter()
            .map(|(&target, animation)| {
                let finished = animation.is_finished(now);
                let (scale, flash) = if finished {
                    (1.0, 0.0)
                } else {
                    animation.kind.sample(animation.progress(now))
                };
                AnimationFrame {
                    target,
                    kind: animation.kind,
                    scale,
                    flash,
                    finished,
                }
            })
            .collect();

        self.active.retain(|_, animation| !animation.is_finished(now));
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KICK: AnimationTarget = AnimationTarget::Instrument(InstrumentId(0));

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            EasingType::Linear,
            EasingType::EaseIn,
            EasingType::EaseOut,
            EasingType::EaseInOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
        }
        assert!((EasingType::EaseInOut.apply(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_hit_pulse_shrinks_back() {
        let mut system = AnimationSystem::new();
        assert!(system.trigger(KICK, AnimationKind::HitPulse, 1.0));

        let start = system.advance(1.0);
        assert!((start[0].scale - 1.2).abs() < 1e-6);
        assert!((start[0].flash - 1.0).abs() < 1e-6);

        let mid = system.advance(1.05);
        assert!(mid[0].scale > 1.0 && mid[0].scale < 1.2);
        assert!(!mid[0].finished);

        let end = system.advance(1.1);
        assert!(end[0].finished);
        assert!((end[0].scale - 1.0).abs() < 1e-6);
        assert!(system.is_empty());
        assert!(system.advance(1.2).is_empty());
    }

    #[test]
    fn test_retrigger_while_animating_is_ignored() {
        let mut system = AnimationSystem::new();
        assert!(system.trigger(KICK, AnimationKind::HitPulse, 0.0));
        assert!(!system.trigger(KICK, AnimationKind::BumperPress, 0.05));

        let frames = system.advance(0.05);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, AnimationKind::HitPulse);

        system.advance(0.2);
        assert!(system.trigger(KICK, AnimationKind::BumperPress, 0.2));
    }

    #[test]
    fn test_bumper_press_squashes_at_midpoint() {
        let mut system = AnimationSystem::new();
        system.trigger(KICK, AnimationKind::BumperPress, 0.0);
        let frames = system.advance(0.075);
        assert!((frames[0].scale - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_targets_are_independent() {
        let mut system = AnimationSystem::new();
        let spawner = AnimationTarget::Emitter(EmitterId(2));
        system.trigger(KICK, AnimationKind::HitPulse, 0.0);
        system.trigger(spawner, AnimationKind::SpawnFlash, 0.0);
        assert_eq!(system.len(), 2);

        let frames = system.advance(0.06);
        assert_eq!(frames.len(), 2);
        assert!(system.is_animating(KICK));
        assert!(!system.is_animating(spawner));
    }
}
