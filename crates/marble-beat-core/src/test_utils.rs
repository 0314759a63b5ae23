//! Shared fixtures for unit tests.

use glam::Vec2;

use crate::collision::InstrumentId;
use crate::player::InstrumentSink;
use crate::scene::{Shape, StaticScene};

fn floor() -> Shape {
    Shape::Line {
        start: Vec2::new(-10.0, 0.0),
        end: Vec2::new(10.0, 0.0),
    }
}

/// A solid line along y = 0 from x = -10 to 10.
pub fn flat_ground() -> StaticScene {
    let mut scene = StaticScene::new();
    scene.add_obstacle(floor());
    scene
}

/// The same floor, registered as an instrument.
pub fn instrument_floor() -> (StaticScene, InstrumentId) {
    let mut scene = StaticScene::new();
    let (_, instrument) = scene.add_instrument(floor());
    (scene, instrument)
}

/// Sink that records every trigger.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub triggers: Vec<(InstrumentId, f32, Vec2)>,
}

impl InstrumentSink for RecordingSink {
    fn trigger_sound(&mut self, instrument: InstrumentId, volume: f32, contact_point: Vec2) {
        self.triggers.push((instrument, volume, contact_point));
    }
}
