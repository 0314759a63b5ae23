//! Property tests for trajectory and replay invariants.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec2;
use marble_beat_core::beat_index::{apply_grid_snap, snap_angle};
use marble_beat_core::{
    BeatGrid, EmitterId, InstrumentId, Launch, PlayerSettings, Portal, PortalArena, PortalType,
    Shape, StaticScene, TrajectoryComputer, TrajectoryPlayer,
};
use proptest::prelude::*;

fn bowl() -> (StaticScene, InstrumentId) {
    let mut scene = StaticScene::new();
    let (_, floor) = scene.add_instrument(Shape::Line {
        start: Vec2::new(-6.0, 0.0),
        end: Vec2::new(6.0, 0.0),
    });
    scene.add_obstacle(Shape::Line {
        start: Vec2::new(-6.0, 0.0),
        end: Vec2::new(-8.0, 4.0),
    });
    scene.add_obstacle(Shape::Circle {
        center: Vec2::new(2.0, 1.5),
        radius: 0.4,
    });
    (scene, floor)
}

fn any_launch() -> impl Strategy<Value = Launch> {
    (-4.0f32..4.0, 0.5f32..8.0, -6.0f32..6.0, -6.0f32..6.0)
        .prop_map(|(x, y, vx, vy)| Launch::new(Vec2::new(x, y), Vec2::new(vx, vy)))
}

proptest! {
    #[test]
    fn frame_times_strictly_increase(launch in any_launch(), with_portal in any::<bool>()) {
        let (scene, _) = bowl();
        let mut portals = PortalArena::new();
        if with_portal {
            let entry = portals.insert(Portal::new(Vec2::new(4.0, 1.0), 0.0, PortalType::Entry));
            let exit = portals.insert(Portal::new(Vec2::new(-3.0, 6.0), 1.0, PortalType::Exit));
            portals.link(entry, exit).expect("link");
        }

        let trajectory =
            TrajectoryComputer::default().compute(&scene, &portals, &launch, None, EmitterId(0));
        prop_assert_eq!(trajectory.frames()[0].position, launch.position);
        for pair in trajectory.frames().windows(2) {
            prop_assert!(pair[1].time > pair[0].time);
        }
    }

    #[test]
    fn beat_markers_are_gapless_and_on_grid(
        launch in any_launch(),
        bpm in 30.0f64..300.0,
        division in prop::sample::select(vec![1.0, 0.5, 0.25]),
    ) {
        let (scene, _) = bowl();
        let grid = BeatGrid::new(bpm, division);
        let interval = grid.interval();
        let trajectory = TrajectoryComputer::default().compute(
            &scene,
            &PortalArena::new(),
            &launch,
            Some(grid),
            EmitterId(4),
        );

        let duration = trajectory.duration();
        let markers = trajectory.beat_markers();
        for (i, marker) in markers.iter().enumerate() {
            let n = u32::try_from(i + 1).expect("marker count fits u32");
            prop_assert_eq!(marker.beat_number, n);
            prop_assert!((marker.time - f64::from(n) * interval).abs() < 1e-9);
            prop_assert!(marker.time <= duration + 1e-9);
            prop_assert_eq!(marker.source_id, EmitterId(4));
        }
        let next = u32::try_from(markers.len() + 1).expect("marker count fits u32");
        prop_assert!(f64::from(next) * interval > duration - 1e-9);
    }

    #[test]
    fn instrument_triggers_respect_cooldown(
        launch in any_launch(),
        cooldown in 0.0f64..0.5,
        tick_dt in prop::sample::select(vec![0.01, 0.02, 0.05]),
    ) {
        let (scene, _) = bowl();
        let trajectory = Arc::new(TrajectoryComputer::default().compute(
            &scene,
            &PortalArena::new(),
            &launch,
            None,
            EmitterId(0),
        ));
        let settings = PlayerSettings {
            tick_dt,
            hit_cooldown: cooldown,
            ..PlayerSettings::default()
        };
        let mut player = TrajectoryPlayer::new(trajectory, settings);
        let mut sink = |_: InstrumentId, _: f32, _: Vec2| {};

        let mut last: BTreeMap<InstrumentId, f64> = BTreeMap::new();
        let mut frames_seen = Vec::new();
        while !player.is_finished() {
            for hit in player.tick(&scene, &mut sink).hits {
                if let Some(previous) = last.insert(hit.instrument, hit.elapsed) {
                    prop_assert!(hit.elapsed - previous >= cooldown - 1e-6);
                }
                prop_assert!(hit.volume >= settings.min_volume - 1e-6 && hit.volume <= settings.max_volume + 1e-6);
                frames_seen.push(hit.frame_index);
            }
        }

        // Each collision frame is resolved at most once, in order.
        for pair in frames_seen.windows(2) {
            prop_assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn snapped_angle_is_a_step_multiple(angle in -7.0f32..7.0, step in 1.0f32..90.0) {
        let snapped = snap_angle(angle, step);
        let steps = snapped / step.to_radians();
        prop_assert!((steps - steps.round()).abs() < 1e-3);
        prop_assert!((snapped - angle).abs() <= step.to_radians() * 0.5 + 1e-5);
    }

    #[test]
    fn grid_snap_moves_at_most_half_a_cell(x in -20.0f32..20.0, y in -20.0f32..20.0) {
        let position = Vec2::new(x, y);
        let snapped = apply_grid_snap(position, 0.5);
        prop_assert!((snapped.x - position.x).abs() <= 0.25 + 1e-5);
        prop_assert!((snapped.y - position.y).abs() <= 0.25 + 1e-5);
    }
}
