use std::collections::BTreeMap;

use glam::Vec2;
use marble_beat_core::InstrumentId;
use marble_beat_core::player::InstrumentSink;

/// Stands in for the audio backend: logs every trigger and keeps counts.
#[derive(Debug, Default)]
pub struct LoggingSink {
    labels: BTreeMap<InstrumentId, String>,
    counts: BTreeMap<InstrumentId, usize>,
}

impl LoggingSink {
    pub fn new(labels: BTreeMap<InstrumentId, String>) -> Self {
        Self {
            labels,
            counts: BTreeMap::new(),
        }
    }

    fn label(&self, instrument: InstrumentId) -> String {
        self.labels
            .get(&instrument)
            .cloned()
            .unwrap_or_else(|| format!("instrument#{}", instrument.0))
    }

    /// Trigger count per instrument label.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        self.counts
            .iter()
            .map(|(&instrument, &count)| (self.label(instrument), count))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl InstrumentSink for LoggingSink {
    fn trigger_sound(&mut self, instrument: InstrumentId, volume: f32, contact_point: Vec2) {
        *self.counts.entry(instrument).or_default() += 1;
        tracing::debug!(
            instrument = %self.label(instrument),
            volume,
            x = contact_point.x,
            y = contact_point.y,
            "[sandbox] sound"
        );
    }
}
