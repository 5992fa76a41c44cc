// src/logging.rs
//
// Diagnostics and telemetry for greenwave.
// - init_tracing: installs the global tracing subscriber (RUST_LOG, default info)
// - DecisionSink: trait receiving one record per applied decision
// - NoopSink:     discards all records
// - JsonlSink:    writes one JSON object per line

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::controller::Decision;
use crate::metrics::TrafficMetrics;
use crate::phase::Commit;
use crate::reward::RewardComponents;
use crate::types::{SignalId, SimTime, VehicleId};

/// Install a fmt subscriber filtered by `RUST_LOG` (defaults to `info`).
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// One line of decision telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub time: SimTime,
    pub signal: SignalId,
    pub action: usize,
    pub phase_changed: bool,
    pub held: Vec<VehicleId>,
    pub released: Vec<VehicleId>,
    pub exemptions_dropped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardComponents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrafficMetrics>,
}

impl DecisionRecord {
    pub fn from_decision(signal: &SignalId, decision: &Decision) -> Self {
        Self {
            time: decision.time,
            signal: signal.clone(),
            action: decision.action,
            phase_changed: matches!(decision.commit, Commit::Changed { .. }),
            held: decision.holds.held().cloned().collect(),
            released: decision.holds.released().cloned().collect(),
            exemptions_dropped: decision.exemptions_dropped,
            observation: None,
            reward: None,
            metrics: None,
        }
    }

    pub fn with_observation(mut self, observation: Vec<f32>) -> Self {
        self.observation = Some(observation);
        self
    }

    pub fn with_reward(mut self, reward: RewardComponents) -> Self {
        self.reward = Some(reward);
        self
    }

    pub fn with_metrics(mut self, metrics: TrafficMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Abstract sink for per-decision telemetry.
pub trait DecisionSink {
    fn record(&mut self, record: &DecisionRecord);

    fn flush(&mut self) {}
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DecisionSink for NoopSink {
    fn record(&mut self, _record: &DecisionRecord) {}
}

/// JSONL file sink.
///
/// Write failures are logged and never returned to the caller.
pub struct JsonlSink {
    writer: BufWriter<File>,
    written: u64,
}

impl JsonlSink {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Records successfully written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DecisionSink for JsonlSink {
    fn record(&mut self, record: &DecisionRecord) {
        let res = serde_json::to_writer(&mut self.writer, record)
            .map_err(io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        match res {
            Ok(()) => self.written += 1,
            Err(err) => tracing::warn!(error = %err, time = record.time, "telemetry write failed"),
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            tracing::warn!(error = %err, "telemetry flush failed");
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
