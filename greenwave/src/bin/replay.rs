// src/bin/replay.rs
//
// Replay a recorded scenario through one SignalController per signal.
//
// Constraints:
// - Controller config precedence: scenario "config" block, otherwise
//   defaults with GREENWAVE_* environment overrides.
// - One backend and one waiting ledger shared by every controller.
// - Deterministic runs via --seed for the random policy.
// - Optional JSONL telemetry, one line per applied decision.
// - Incidents are recorded on every frame; departed vehicles leave the ledger
//   once the frame is processed.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use greenwave::logging::{init_tracing, DecisionRecord, DecisionSink, JsonlSink, NoopSink};
use greenwave::{
    Commit, ControllerConfig, RewardMode, Scenario, ScriptedBackend, SignalController, WaitingLedger,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    /// Cycle through the actions in catalog order.
    RoundRobin,
    /// Uniformly random action at every decision.
    Random,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Shaped,
    QueueOnly,
    Pressure,
    AverageSpeed,
}

impl From<ModeArg> for RewardMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Shaped => RewardMode::Shaped,
            ModeArg::QueueOnly => RewardMode::QueueOnly,
            ModeArg::Pressure => RewardMode::Pressure,
            ModeArg::AverageSpeed => RewardMode::AverageSpeed,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "greenwave-replay",
    about = "Replay a recorded traffic scenario through the signal controllers",
    version
)]
struct Args {
    /// Scenario JSON (network + per-step frames).
    scenario: PathBuf,

    /// Action selection policy.
    #[arg(long, value_enum, default_value_t = PolicyArg::RoundRobin)]
    policy: PolicyArg,

    /// Seed for the random policy.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Reward computed after every decision.
    #[arg(long, value_enum, default_value_t = ModeArg::Shaped)]
    mode: ModeArg,

    /// Write per-decision telemetry as JSONL.
    #[arg(long)]
    telemetry: Option<PathBuf>,
}

struct Policy {
    kind: PolicyArg,
    rng: ChaCha8Rng,
}

impl Policy {
    fn choose(&mut self, committed: Option<usize>, actions: usize) -> usize {
        match self.kind {
            PolicyArg::RoundRobin => committed.map_or(0, |a| (a + 1) % actions),
            PolicyArg::Random => self.rng.gen_range(0..actions),
        }
    }
}

#[derive(Debug, Default)]
struct SignalSummary {
    decisions: u64,
    phase_changes: u64,
    holds: u64,
    releases: u64,
    total_reward: f64,
    emergency_brakes: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let raw = fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&raw)
        .with_context(|| format!("parsing scenario {}", args.scenario.display()))?;
    if scenario.frames.is_empty() {
        bail!("scenario {} has no frames", args.scenario.display());
    }

    let config = match scenario.config.clone() {
        Some(cfg) => cfg,
        None => ControllerConfig::from_env(),
    };
    let mode = RewardMode::from(args.mode);

    let backend = Arc::new(ScriptedBackend::new(scenario.network.clone()));
    backend.load_frame(&scenario.frames[0]);
    let ledger = WaitingLedger::new();

    let mut controllers = Vec::new();
    for signal in scenario.network.signals.iter().map(|s| s.id.clone()) {
        let ctl = SignalController::builder(signal.clone())
            .config(config.clone())
            .backend(Arc::clone(&backend))
            .ledger(ledger.clone())
            .build()
            .with_context(|| format!("building controller for signal {signal}"))?;
        controllers.push(ctl);
    }

    let mut sink: Box<dyn DecisionSink> = match &args.telemetry {
        Some(path) => Box::new(
            JsonlSink::create(path)
                .with_context(|| format!("creating telemetry file {}", path.display()))?,
        ),
        None => Box::new(NoopSink),
    };

    let mut policy = Policy {
        kind: args.policy,
        rng: ChaCha8Rng::seed_from_u64(args.seed),
    };
    let mut summary: BTreeMap<String, SignalSummary> = BTreeMap::new();

    println!(
        "greenwave-replay | signals={} | frames={} | policy={:?} | mode={:?} | seed={}",
        controllers.len(),
        scenario.frames.len(),
        args.policy,
        mode,
        args.seed
    );

    let mut prev_time = None;
    for frame in &scenario.frames {
        if let Some(prev) = prev_time {
            if frame.time != prev + 1 {
                tracing::warn!(prev, next = frame.time, "non-consecutive frame times; decisions may be skipped");
            }
        }
        prev_time = Some(frame.time);
        backend.load_frame(frame);

        for ctl in controllers.iter_mut() {
            ctl.record_incidents()?;
            if ctl.time_to_act() {
                let action = policy.choose(ctl.phase().committed_action(), ctl.action_count());
                let decision = ctl.apply_action(action)?;
                let reward = ctl.compute_reward_components(mode)?;
                let observation = ctl.compute_observation()?;
                let metrics = ctl.traffic_metrics()?;

                let entry = summary.entry(ctl.signal().to_string()).or_default();
                entry.decisions += 1;
                entry.phase_changes += u64::from(matches!(decision.commit, Commit::Changed { .. }));
                entry.holds += decision.holds.held().count() as u64;
                entry.releases += decision.holds.released().count() as u64;
                entry.total_reward += reward.reward;

                let record = DecisionRecord::from_decision(ctl.signal(), &decision)
                    .with_observation(observation.to_vector())
                    .with_reward(reward)
                    .with_metrics(metrics);
                sink.record(&record);
            }
            ctl.tick();
        }

        let pruned = ledger.prune_departed(&backend)?;
        if pruned > 0 {
            tracing::debug!(time = frame.time, pruned, tracked = ledger.vehicle_count(), "pruned departed vehicles");
        }
    }
    sink.flush();

    for ctl in &controllers {
        summary.entry(ctl.signal().to_string()).or_default().emergency_brakes =
            ctl.total_emergency_brakes();
    }

    for (signal, s) in &summary {
        println!(
            "{signal}: decisions={} phase_changes={} holds={} releases={} total_reward={:.3} emergency_brakes={}",
            s.decisions, s.phase_changes, s.holds, s.releases, s.total_reward, s.emergency_brakes
        );
    }
    println!("commands issued: {}", backend.commands().len());
    Ok(())
}
