//! Marble-Beat Sandbox
//!
//! Headless runner: loads a scene, prints the beat-marker predictions, then
//! plays the emitters against the beat clock and logs every instrument hit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use marble_beat_core::{
    AudioClock, SandboxConfig, SceneConfig, Session, SessionTick, SystemAudioClock,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::sink::LoggingSink;

mod sink;

/// Scene used when none is given on the command line.
const DEMO_SCENE: &str = include_str!("../scenes/demo.json");

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a marble-beat scene headless", long_about = None)]
struct Args {
    /// Scene JSON; the bundled demo scene when omitted.
    scene: Option<PathBuf>,
    /// Sandbox configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds of session time to run.
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,
    /// Override the configured tempo.
    #[arg(long)]
    bpm: Option<f64>,
    /// Pace ticks against the wall clock instead of running as fast as possible.
    #[arg(long)]
    realtime: bool,
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SandboxConfig> {
    let Some(path) = path else {
        return Ok(SandboxConfig::default());
    };
    SandboxConfig::from_json(&read(path)?)
        .with_context(|| format!("invalid sandbox config {}", path.display()))
}

fn load_scene(path: Option<&Path>) -> anyhow::Result<SceneConfig> {
    let json = match path {
        Some(path) => read(path)?,
        None => DEMO_SCENE.to_string(),
    };
    Ok(SceneConfig::from_json(&json)?)
}

fn log_predictions(session: &Session) {
    for emitter in session.emitters() {
        let Some(prediction) = emitter.prediction() else {
            continue;
        };
        tracing::info!(
            emitter = %emitter.id(),
            label = emitter.label.as_deref().unwrap_or("-"),
            period = emitter.beat_period(),
            duration = prediction.duration(),
            collisions = prediction.collision_count(),
            markers = prediction.beat_markers().len(),
            termination = ?prediction.termination(),
            "[sandbox] prediction"
        );
        for marker in prediction.beat_markers() {
            tracing::debug!(
                beat = marker.beat_number,
                time = marker.time,
                x = marker.position.x,
                y = marker.position.y,
                "[sandbox] beat marker"
            );
        }
    }

    if let Some(marker) = session.markers().snapshot().first() {
        let snapped = session.snap_placement(marker.position + glam::Vec2::new(0.3, -0.3));
        tracing::info!(
            beat = marker.beat_number,
            x = snapped.position.x,
            y = snapped.position.y,
            "[sandbox] instrument snap near first marker"
        );
    }
}

fn log_tick(tick: &SessionTick) {
    if let Some(beat) = tick.beat {
        tracing::info!(beat, time = tick.time, "[sandbox] beat");
    }
    for marble in &tick.spawned {
        tracing::info!(marble, time = tick.time, "[sandbox] spawn");
    }
    for (marble, reason) in &tick.despawned {
        tracing::info!(marble, ?reason, "[sandbox] despawn");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let scene = load_scene(args.scene.as_deref())?;
    let build = scene
        .apply()
        .with_context(|| format!("scene `{}` could not be built", scene.meta.name))?;

    let labels = build
        .instruments
        .iter()
        .map(|info| {
            let label = info
                .label
                .clone()
                .unwrap_or_else(|| info.properties.kind.clone());
            (info.id, label)
        })
        .collect();
    let mut sink = LoggingSink::new(labels);

    let mut session = Session::from_build(config, build);
    if let Some(bpm) = args.bpm {
        session.set_bpm(bpm);
    }
    tracing::info!(
        scene = %scene.meta.name,
        bpm = session.clock().bpm(),
        emitters = session.emitters().len(),
        markers = session.markers().len(),
        "[sandbox] session ready"
    );
    log_predictions(&session);

    let tick_dt = session.config().player.tick_dt;
    let wall = SystemAudioClock::default();
    let start = if args.realtime { wall.now() } else { 0.0 };
    session.start_all(start);

    let mut spawned = 0;
    let mut despawned = 0;
    let mut now = start;
    while now - start < args.seconds {
        now = if args.realtime {
            std::thread::sleep(Duration::from_secs_f64(tick_dt));
            wall.now()
        } else {
            now + tick_dt
        };
        let view_bottom = session.view_bottom();
        let tick = session.tick(now, view_bottom, &mut sink);
        spawned += tick.spawned.len();
        despawned += tick.despawned.len();
        log_tick(&tick);
    }

    let report = serde_json::json!({
        "scene": scene.meta.name,
        "seconds": args.seconds,
        "beats": session.clock().current_beat(),
        "spawned": spawned,
        "despawned": despawned,
        "alive": session.marbles().len(),
        "hits": sink.total(),
        "per_instrument": sink.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
