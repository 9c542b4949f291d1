//! Experiment driver for the embodied Ising network.
//!
//! Examples:
//!   critter acrobot
//!   critter mountain-car --config experiment.json --save trained.img
//!   critter dream --load trained.img
//!
//! The driver owns everything the core refuses to invent: it builds the
//! target statistics, picks seeds, and decides how long to learn.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::process;

use serde::{Deserialize, Serialize};

use critter::agent::Agent;
use critter::envs::{
    AcrobotBody, AcrobotEnv, AcrobotParams, Embodiment, MountainCarBody, MountainCarEnv,
    MountainCarParams,
};
use critter::learner::{HomeostaticLearner, LearnConfig, RoundReport, TargetStats};
use critter::prng::Prng;
use critter::spin::{NetConfig, Region, SpinNet};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ExperimentConfig {
    netsize: usize,
    sensors: usize,
    motors: usize,
    beta: f32,
    max_weights: f32,
    seed: u64,
    iterations: usize,
    /// Sweeps per simulate phase; `null` uses `max(100, 20 * netsize)`.
    horizon: Option<usize>,
    /// Upper bound of the synthetic target correlation magnitudes.
    target_scale: f32,
    /// Link mass for the acrobot task.
    link_mass: f32,
    /// Dream-mode sweep count.
    dream_sweeps: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            netsize: 32,
            sensors: 6,
            motors: 4,
            beta: 1.0,
            max_weights: 2.0,
            seed: 2026,
            iterations: 100,
            horizon: None,
            target_scale: 0.5,
            link_mass: 1.75,
            dream_sweeps: 2_000,
        }
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<String>,
    save: Option<String>,
    load: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return;
    }

    let opts = parse_options(&args[2..]);
    let cfg = load_config(&opts);

    match args[1].as_str() {
        "acrobot" => run_acrobot(&cfg, &opts),
        "mountain-car" => run_mountain_car(&cfg, &opts),
        "dream" => run_dream(&cfg, &opts),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            process::exit(2);
        }
    }
}

fn print_help() {
    println!("critter: embodied Ising network, homeostatic critical learning");
    println!();
    println!("Usage: critter <command> [options]");
    println!();
    println!("Commands:");
    println!("  acrobot        learn on the two-link pendulum task");
    println!("  mountain-car   learn on the walled-in hill-car task");
    println!("  dream          run detached (environment-free) dynamics");
    println!();
    println!("Options:");
    println!("  --config <file.json>   experiment parameters (JSON)");
    println!("  --save <file.img>      write the trained network image");
    println!("  --load <file.img>      start from a saved network image");
}

fn parse_options(rest: &[String]) -> CliOptions {
    let mut opts = CliOptions::default();
    let mut k = 0;
    while k < rest.len() {
        let take_value = |k: usize| -> String {
            rest.get(k + 1).cloned().unwrap_or_else(|| {
                eprintln!("Missing value for {}", rest[k]);
                process::exit(2);
            })
        };
        match rest[k].as_str() {
            "--config" => opts.config = Some(take_value(k)),
            "--save" => opts.save = Some(take_value(k)),
            "--load" => opts.load = Some(take_value(k)),
            other => {
                eprintln!("Unknown option: {other}");
                process::exit(2);
            }
        }
        k += 2;
    }
    opts
}

fn load_config(opts: &CliOptions) -> ExperimentConfig {
    let Some(path) = &opts.config else {
        return ExperimentConfig::default();
    };
    let mut text = String::new();
    match File::open(path).map(BufReader::new) {
        Ok(mut r) => {
            if let Err(e) = r.read_to_string(&mut text) {
                eprintln!("Failed to read {path}: {e}");
                process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Failed to open {path}: {e}");
            process::exit(2);
        }
    }
    match serde_json::from_str(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Bad experiment config {path}: {e}");
            process::exit(2);
        }
    }
}

fn build_net(cfg: &ExperimentConfig, opts: &CliOptions) -> SpinNet {
    if let Some(path) = &opts.load {
        let mut r = match File::open(path).map(BufReader::new) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Failed to open {path}: {e}");
                process::exit(2);
            }
        };
        match SpinNet::load_image_from(&mut r) {
            Ok(net) => return net,
            Err(e) => {
                eprintln!("Failed to load network image {path}: {e}");
                process::exit(2);
            }
        }
    }

    match SpinNet::new(NetConfig {
        netsize: cfg.netsize,
        sensors: cfg.sensors,
        motors: cfg.motors,
        beta: cfg.beta,
        max_weights: cfg.max_weights,
        seed: Some(cfg.seed),
    }) {
        Ok(net) => net,
        Err(e) => {
            eprintln!("Bad network config: {e}");
            process::exit(2);
        }
    }
}

/// Synthetic target profile: zero target means, and per-unit correlation
/// rows drawn uniformly then sorted descending. A stand-in so the demos
/// are self-contained; real experiments supply measured profiles.
fn demo_target(cfg: &ExperimentConfig) -> TargetStats {
    let n = cfg.netsize;
    let mut rng = Prng::new(cfg.seed.wrapping_add(1));
    let mut rows = Vec::with_capacity(n * (n - 1));
    for _ in 0..n {
        let mut row: Vec<f32> = (0..n.saturating_sub(1))
            .map(|_| rng.gen_range_f32(0.0, cfg.target_scale))
            .collect();
        row.sort_unstable_by(|a, b| b.total_cmp(a));
        rows.extend_from_slice(&row);
    }
    match TargetStats::new(n, vec![0.0; n], rows) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Bad target statistics: {e}");
            process::exit(2);
        }
    }
}

fn run_learning<B: Embodiment>(cfg: &ExperimentConfig, opts: &CliOptions, mut agent: Agent<B>) {
    let mut learner = HomeostaticLearner::new(
        demo_target(cfg),
        LearnConfig {
            horizon: cfg.horizon,
            ..Default::default()
        },
    );

    let reports = match learner.learn(&mut agent, cfg.iterations) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Learning failed: {e}");
            process::exit(2);
        }
    };
    for r in &reports {
        print_report(r);
    }

    if let Some(path) = &opts.save {
        save_image(&agent.net, path);
    }
}

fn print_report(r: &RoundReport) {
    println!(
        "round={:4} fit={:.4} max|J|={:.3} trace=[{:+.3}, {:+.3}]",
        r.round, r.fitness, r.max_abs_coupling, r.trace_lo, r.trace_hi
    );
}

fn save_image(net: &SpinNet, path: &str) {
    let mut w = match File::create(path).map(BufWriter::new) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to create {path}: {e}");
            process::exit(2);
        }
    };
    if let Err(e) = net.save_image_to(&mut w).and_then(|()| w.flush()) {
        eprintln!("Failed to save network image {path}: {e}");
        process::exit(2);
    }
    println!("saved network image to {path}");
}

fn run_acrobot(cfg: &ExperimentConfig, opts: &CliOptions) {
    let net = build_net(cfg, opts);
    let mut env = AcrobotEnv::new(AcrobotParams::default(), cfg.seed.wrapping_mul(31).max(1));
    env.set_mass(cfg.link_mass);
    let agent = Agent::new(net, AcrobotBody::new(env));

    println!(
        "acrobot: netsize={} sensors={} motors={} beta={} mass={} iterations={}",
        cfg.netsize, cfg.sensors, cfg.motors, cfg.beta, cfg.link_mass, cfg.iterations
    );
    run_learning(cfg, opts, agent);
}

fn run_mountain_car(cfg: &ExperimentConfig, opts: &CliOptions) {
    let net = build_net(cfg, opts);
    let env = MountainCarEnv::new(
        MountainCarParams::bounded(),
        cfg.seed.wrapping_mul(37).max(1),
    );
    let agent = Agent::new(net, MountainCarBody::new(env));

    println!(
        "mountain-car: netsize={} sensors={} motors={} beta={} iterations={}",
        cfg.netsize, cfg.sensors, cfg.motors, cfg.beta, cfg.iterations
    );
    run_learning(cfg, opts, agent);
}

fn run_dream(cfg: &ExperimentConfig, opts: &CliOptions) {
    let mut net = build_net(cfg, opts);
    if opts.load.is_none() {
        // A fresh net has nothing to dream about; give it random structure.
        net.random_fields(None);
        net.random_wiring(None);
    }
    let env = MountainCarEnv::new(
        MountainCarParams::bounded(),
        cfg.seed.wrapping_mul(41).max(1),
    );
    let mut agent = Agent::new(net, MountainCarBody::new(env));

    println!("dream: netsize={} sweeps={}", cfg.netsize, cfg.dream_sweeps);
    let every = (cfg.dream_sweeps / 20).max(1);
    for t in 0..cfg.dream_sweeps {
        agent.dream_sweep();
        if t % every == 0 {
            let s = agent.net.state(Region::All);
            let magnetization = s.iter().sum::<f32>() / s.len() as f32;
            println!(
                "t={t:6} magnetization={magnetization:+.3} motors={:b}",
                agent.net.state_index(Region::Motors)
            );
        }
    }
}
