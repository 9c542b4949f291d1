//! Homeostatic critical learning.
//!
//! One learning round has two phases. **Simulate**: run the embodied
//! sweep for a fixed horizon and accumulate first- and second-order
//! statistics of the spin trajectory. **Update**: rank-align the observed
//! pairwise correlations against a caller-supplied target profile, take
//! the difference as a gradient, and apply it to the fields and couplings
//! under weight decay and clipping.
//!
//! The target statistics are a mandatory external input. The core never
//! invents them; constructing a learner without a well-shaped target is
//! a caller error, reported as such.

use crate::agent::Agent;
use crate::envs::Embodiment;
use crate::error::ModelError;
use crate::spin::Region;

/// Hyperparameters of the update phase.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LearnConfig {
    /// Gradient step size.
    pub rate: f32,
    /// L2 weight decay applied alongside every gradient step.
    pub decay: f32,
    /// Sweeps per simulate phase. `None` uses `max(100, 20 * netsize)`.
    pub horizon: Option<usize>,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            rate: 0.01,
            decay: 0.004,
            horizon: None,
        }
    }
}

/// Target statistics the learning process steers toward.
///
/// `means` holds one target activation per unit. `rows` holds, for every
/// unit, `netsize - 1` correlation magnitudes ordered from strongest to
/// weakest; rank alignment hands them out to that unit's partners in
/// order of observed correlation. Only rows of non-sensor units are ever
/// consulted, but the shape is uniform for all units.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TargetStats {
    netsize: usize,
    means: Vec<f32>,
    rows: Vec<f32>,
}

impl TargetStats {
    pub fn new(netsize: usize, means: Vec<f32>, rows: Vec<f32>) -> Result<Self, ModelError> {
        let expected_rows = netsize;
        let expected_cols = netsize.saturating_sub(1);
        if means.len() != netsize || rows.len() != expected_rows * expected_cols {
            return Err(ModelError::TargetShape {
                expected_means: netsize,
                expected_rows,
                expected_cols,
                got_means: means.len(),
                got_values: rows.len(),
            });
        }
        Ok(Self {
            netsize,
            means,
            rows,
        })
    }

    pub fn netsize(&self) -> usize {
        self.netsize
    }

    pub fn means(&self) -> &[f32] {
        &self.means
    }

    fn row(&self, unit: usize) -> &[f32] {
        let w = self.netsize - 1;
        &self.rows[unit * w..(unit + 1) * w]
    }
}

/// Statistics accumulated over one simulate phase.
///
/// Pair matrices are dense row-major with only `i < j` populated,
/// mirroring the coupling storage convention.
#[derive(Debug, Clone)]
pub struct TrajectoryStats {
    netsize: usize,
    /// Mean activation per unit.
    pub m: Vec<f32>,
    /// Recorded body observable, one sample per sweep.
    pub trace: Vec<f32>,
    c: Vec<f32>,
    connected: Vec<f32>,
    aligned: Vec<f32>,
}

impl TrajectoryStats {
    fn new(netsize: usize) -> Self {
        Self {
            netsize,
            m: vec![0.0; netsize],
            trace: Vec::new(),
            c: vec![0.0; netsize * netsize],
            connected: vec![0.0; netsize * netsize],
            aligned: vec![0.0; netsize * netsize],
        }
    }

    fn reset(&mut self, horizon: usize) {
        self.m.fill(0.0);
        self.c.fill(0.0);
        self.connected.fill(0.0);
        self.aligned.fill(0.0);
        self.trace.clear();
        self.trace.reserve(horizon);
    }

    /// Mean pairwise product `s_i * s_j` over the trajectory (`i < j`).
    pub fn correlation(&self, i: usize, j: usize) -> f32 {
        self.c[i * self.netsize + j]
    }

    /// Connected correlation `c[i,j] - m[i] * m[j]` (`i < j`).
    pub fn connected(&self, i: usize, j: usize) -> f32 {
        self.connected[i * self.netsize + j]
    }

    /// Target-aligned correlation produced by rank matching (`i < j`).
    pub fn aligned(&self, i: usize, j: usize) -> f32 {
        self.aligned[i * self.netsize + j]
    }

    fn trace_extrema(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &x in &self.trace {
            lo = lo.min(x);
            hi = hi.max(x);
        }
        (lo, hi)
    }
}

/// Per-round diagnostics, the loggable residue of a learning round.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundReport {
    pub round: usize,
    /// Maximum absolute discrepancy between target and observed
    /// statistics (see `learn` for which block each round looks at).
    pub fitness: f32,
    pub max_abs_coupling: f32,
    pub trace_lo: f32,
    pub trace_hi: f32,
}

pub struct HomeostaticLearner {
    cfg: LearnConfig,
    target: TargetStats,
    stats: TrajectoryStats,

    // Scratch reused across rounds; no allocation inside the hot loop.
    ranked: Vec<(f32, usize)>,
    c1_full: Vec<f32>,
    dh: Vec<f32>,
    dj: Vec<f32>,
}

impl HomeostaticLearner {
    pub fn new(target: TargetStats, cfg: LearnConfig) -> Self {
        let n = target.netsize();
        Self {
            cfg,
            stats: TrajectoryStats::new(n),
            ranked: Vec::with_capacity(n.saturating_sub(1)),
            c1_full: vec![0.0; n * n],
            dh: vec![0.0; n],
            dj: vec![0.0; n * n],
            target,
        }
    }

    pub fn config(&self) -> &LearnConfig {
        &self.cfg
    }

    pub fn target(&self) -> &TargetStats {
        &self.target
    }

    pub fn stats(&self) -> &TrajectoryStats {
        &self.stats
    }

    fn default_horizon(&self) -> usize {
        self.cfg
            .horizon
            .unwrap_or_else(|| 100.max(20 * self.target.netsize()))
    }

    /// Simulate phase: run `horizon` embodied sweeps and derive the
    /// gradients `(dh, dJ)` toward the target statistics.
    ///
    /// The returned `dJ` is dense with only the upper triangle populated.
    /// Components that must never move are already zeroed: `dh` over the
    /// sensor region; `dJ` over the sensor-sensor, motor-motor, and
    /// sensor-motor blocks.
    pub fn gradient<B: Embodiment>(
        &mut self,
        agent: &mut Agent<B>,
        horizon: Option<usize>,
    ) -> Result<(&[f32], &[f32]), ModelError> {
        let n = self.target.netsize();
        if agent.net.netsize() != n {
            return Err(ModelError::SizeMismatch {
                expected: n,
                got: agent.net.netsize(),
            });
        }
        let sensors = agent.net.sensors();
        let motors = agent.net.motors();
        let t = horizon.unwrap_or_else(|| self.default_horizon()).max(1);

        self.stats.reset(t);
        for _ in 0..t {
            agent.sweep();
            self.stats.trace.push(agent.body.trace());

            let s = agent.net.state(Region::All);
            for i in 0..n {
                self.stats.m[i] += s[i];
                let si = s[i];
                for j in (i + 1)..n {
                    self.stats.c[i * n + j] += si * s[j];
                }
            }
        }

        let inv_t = 1.0 / t as f32;
        for m in &mut self.stats.m {
            *m *= inv_t;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let at = i * n + j;
                self.stats.c[at] *= inv_t;
                self.stats.connected[at] = self.stats.c[at] - self.stats.m[i] * self.stats.m[j];
            }
        }

        self.align_targets(sensors);

        for i in 0..n {
            self.dh[i] = if i < sensors {
                0.0
            } else {
                self.target.means[i] - self.stats.m[i]
            };
        }

        let motor_lo = n - motors;
        self.dj.fill(0.0);
        for i in 0..n {
            for j in (i + 1)..n {
                let frozen = (i < sensors && j < sensors)
                    || (i >= motor_lo && j >= motor_lo)
                    || (i < sensors && j >= motor_lo);
                if !frozen {
                    let at = i * n + j;
                    self.dj[at] = self.stats.aligned[at] - self.stats.c[at];
                }
            }
        }

        Ok((&self.dh, &self.dj))
    }

    /// Rank matching: each non-sensor unit's most correlated partners
    /// receive the largest values of its target row, preserving relative
    /// contrast while substituting target magnitudes.
    fn align_targets(&mut self, sensors: usize) {
        let n = self.target.netsize();

        self.c1_full.fill(0.0);
        for i in sensors..n {
            self.ranked.clear();
            for j in 0..n {
                if j == i {
                    continue;
                }
                let v = if i < j {
                    self.stats.c[i * n + j]
                } else {
                    self.stats.c[j * n + i]
                };
                self.ranked.push((v, j));
            }
            self.ranked.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

            let row = self.target.row(i);
            for (k, &(_, j)) in self.ranked.iter().enumerate() {
                self.c1_full[i * n + j] = row[k];
            }
        }

        // Symmetrize into the upper triangle. Pairs with both endpoints
        // past the sensor region received a contribution from each
        // endpoint's row, so halve them to avoid double counting.
        for i in 0..n {
            for j in (i + 1)..n {
                let mut v = self.c1_full[i * n + j] + self.c1_full[j * n + i];
                if i >= sensors {
                    v *= 0.5;
                }
                self.stats.aligned[i * n + j] = v;
            }
        }
    }

    /// Maximum absolute discrepancy over every pair and every mean.
    fn fitness_global(&self) -> f32 {
        let n = self.target.netsize();
        let mut fit = 0.0f32;
        for i in 0..n {
            fit = fit.max((self.target.means[i] - self.stats.m[i]).abs());
            for j in (i + 1)..n {
                let at = i * n + j;
                fit = fit.max((self.stats.aligned[at] - self.stats.c[at]).abs());
            }
        }
        fit
    }

    /// Maximum absolute correlation discrepancy over the non-sensor block.
    fn fitness_block(&self, sensors: usize) -> f32 {
        let n = self.target.netsize();
        let mut fit = 0.0f32;
        for i in sensors..n {
            for j in (i + 1)..n {
                let at = i * n + j;
                fit = fit.max((self.stats.aligned[at] - self.stats.c[at]).abs());
            }
        }
        fit
    }

    /// Update phase: exactly `iterations` constrained gradient rounds.
    ///
    /// Each round applies `h += rate*dh - decay*h`, `J += rate*dJ -
    /// decay*J`, clips both into `[-max_weights, max_weights]`, and
    /// re-simulates. There is no early exit; the iteration budget is the
    /// only termination mechanism. Returns one report per simulate phase
    /// (`iterations + 1` in total, the first from before any update).
    pub fn learn<B: Embodiment>(
        &mut self,
        agent: &mut Agent<B>,
        iterations: usize,
    ) -> Result<Vec<RoundReport>, ModelError> {
        let sensors = agent.net.sensors();
        let mut reports = Vec::with_capacity(iterations + 1);

        self.gradient(agent, None)?;
        let report = self.report(0, self.fitness_global(), agent);
        tracing::debug!(
            round = report.round,
            fitness = f64::from(report.fitness),
            max_abs_coupling = f64::from(report.max_abs_coupling),
            "homeostatic learning round"
        );
        reports.push(report);

        for round in 1..=iterations {
            agent
                .net
                .apply_gradient(&self.dh, &self.dj, self.cfg.rate, self.cfg.decay);
            agent.net.clip_weights();

            self.gradient(agent, None)?;
            let report = self.report(round, self.fitness_block(sensors), agent);
            tracing::debug!(
                round = report.round,
                fitness = f64::from(report.fitness),
                max_abs_coupling = f64::from(report.max_abs_coupling),
                "homeostatic learning round"
            );
            reports.push(report);
        }

        Ok(reports)
    }

    fn report<B: Embodiment>(&self, round: usize, fitness: f32, agent: &Agent<B>) -> RoundReport {
        let (trace_lo, trace_hi) = self.stats.trace_extrema();
        RoundReport {
            round,
            fitness,
            max_abs_coupling: agent.net.max_abs_coupling(),
            trace_lo,
            trace_hi,
        }
    }
}

/// Run fully independent experiment replicas on a rayon pool.
///
/// Each replica owns its own agent and learner; nothing mutable is
/// shared. `build` is called with the replica index and should derive
/// per-replica seeds from it.
#[cfg(feature = "parallel")]
pub fn learn_replicas<B, F>(
    build: F,
    replicas: usize,
    iterations: usize,
) -> Result<Vec<(Agent<B>, Vec<RoundReport>)>, ModelError>
where
    B: Embodiment + Send,
    F: Fn(usize) -> (Agent<B>, HomeostaticLearner) + Sync,
{
    use rayon::prelude::*;

    (0..replicas)
        .into_par_iter()
        .map(|k| {
            let (mut agent, mut learner) = build(k);
            let reports = learner.learn(&mut agent, iterations)?;
            Ok((agent, reports))
        })
        .collect()
}
