//! The spin substrate: binary units, bias fields, pairwise couplings.
//!
//! Spins live in {-1, +1}. The unit range is partitioned into three fixed,
//! contiguous regions: sensors first, motors last, hidden in between.
//! Couplings are stored once in the upper triangle of a dense matrix and
//! read symmetrized (`J[i,k] + J[k,i]`), so either orientation of a pair
//! contributes the same local field.
//!
//! Sampling is single-unit Glauber dynamics: a flip of unit `i` with
//! energy change `eDiff` is accepted with probability
//! `1 / (1 + exp(beta * eDiff))`, which satisfies detailed balance for the
//! Hamiltonian `E(s) = -sum h_i s_i - sum_{i<j} J_ij s_i s_j`.

use std::io::{self, Read, Write};

use crate::coding;
use crate::error::ModelError;
use crate::prng::Prng;
use crate::storage;

pub type UnitId = usize;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetConfig {
    /// Total unit count.
    pub netsize: usize,
    /// Width of the sensor region (first units).
    pub sensors: usize,
    /// Width of the motor region (last units).
    pub motors: usize,
    /// Inverse temperature of the Glauber dynamics. Higher means greedier.
    pub beta: f32,
    /// Shared clipping bound for all fields and couplings.
    pub max_weights: f32,
    /// If set, makes sampling reproducible for evaluation.
    pub seed: Option<u64>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            netsize: 64,
            sensors: 6,
            motors: 6,
            beta: 1.0,
            max_weights: 2.0,
            seed: None,
        }
    }
}

/// Views over the fixed unit partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    All,
    Sensors,
    Hidden,
    Motors,
    NonSensors,
}

#[derive(Debug, Clone)]
pub struct SpinNet {
    netsize: usize,
    sensors: usize,
    motors: usize,
    beta: f32,
    max_weights: f32,

    s: Vec<f32>,
    h: Vec<f32>,
    // Dense row-major netsize x netsize; only i < j entries are populated.
    j: Vec<f32>,

    rng: Prng,
}

impl SpinNet {
    pub fn new(cfg: NetConfig) -> Result<Self, ModelError> {
        if cfg.netsize == 0 {
            return Err(ModelError::EmptyNet);
        }
        if cfg.sensors + cfg.motors > cfg.netsize {
            return Err(ModelError::InvalidPartition {
                netsize: cfg.netsize,
                sensors: cfg.sensors,
                motors: cfg.motors,
            });
        }

        let mut net = Self {
            netsize: cfg.netsize,
            sensors: cfg.sensors,
            motors: cfg.motors,
            beta: cfg.beta,
            max_weights: cfg.max_weights,
            s: vec![0.0; cfg.netsize],
            h: vec![0.0; cfg.netsize],
            j: vec![0.0; cfg.netsize * cfg.netsize],
            rng: Prng::new(cfg.seed.unwrap_or(1)),
        };
        net.randomize_state();
        Ok(net)
    }

    pub fn netsize(&self) -> usize {
        self.netsize
    }

    pub fn sensors(&self) -> usize {
        self.sensors
    }

    pub fn motors(&self) -> usize {
        self.motors
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn set_beta(&mut self, beta: f32) {
        self.beta = beta;
    }

    pub fn max_weights(&self) -> f32 {
        self.max_weights
    }

    pub fn fields(&self) -> &[f32] {
        &self.h
    }

    /// Symmetrized coupling magnitude between two units.
    pub fn coupling(&self, i: UnitId, k: UnitId) -> f32 {
        self.j[i * self.netsize + k] + self.j[k * self.netsize + i]
    }

    pub fn max_abs_coupling(&self) -> f32 {
        self.j.iter().fold(0.0f32, |acc, &w| acc.max(w.abs()))
    }

    pub fn state(&self, region: Region) -> &[f32] {
        let n = self.netsize;
        match region {
            Region::All => &self.s,
            Region::Sensors => &self.s[..self.sensors],
            Region::Hidden => &self.s[self.sensors..n - self.motors],
            Region::Motors => &self.s[n - self.motors..],
            Region::NonSensors => &self.s[self.sensors..],
        }
    }

    /// Integer index of a region's sign pattern, MSB first.
    pub fn state_index(&self, region: Region) -> u64 {
        coding::pattern_index(self.state(region))
    }

    pub(crate) fn sensor_spins_mut(&mut self) -> &mut [f32] {
        let w = self.sensors;
        &mut self.s[..w]
    }

    pub(crate) fn rng_mut(&mut self) -> &mut Prng {
        &mut self.rng
    }

    /// Draw every spin fresh from a fair coin.
    pub fn randomize_state(&mut self) {
        for s in &mut self.s {
            *s = self.rng.spin();
        }
    }

    /// Uniform random bias on the non-sensor units; sensor fields stay
    /// pinned at zero.
    pub fn random_fields(&mut self, max_weights: Option<f32>) {
        let max = max_weights.unwrap_or(self.max_weights);
        for i in self.sensors..self.netsize {
            self.h[i] = self.rng.gen_range_f32(-max, max);
        }
    }

    /// Uniform random couplings on every pair with at least one non-sensor
    /// endpoint. Sensor-sensor pairs never couple.
    pub fn random_wiring(&mut self, max_weights: Option<f32>) {
        let max = max_weights.unwrap_or(self.max_weights);
        let n = self.netsize;
        for i in 0..n {
            for j in (i + 1)..n {
                if i >= self.sensors || j >= self.sensors {
                    self.j[i * n + j] = self.rng.gen_range_f32(-max, max);
                }
            }
        }
    }

    /// Energy change a flip of `unit` would cause, without mutating state.
    pub fn delta_e(&self, unit: UnitId) -> f32 {
        let n = self.netsize;
        let mut field = self.h[unit];
        for k in 0..unit {
            field += self.j[k * n + unit] * self.s[k];
        }
        for k in (unit + 1)..n {
            field += self.j[unit * n + k] * self.s[k];
        }
        2.0 * self.s[unit] * field
    }

    /// One Glauber update of `unit` (or of a uniformly random unit).
    ///
    /// Logistic acceptance: the flip lands with probability
    /// `1 / (1 + exp(beta * eDiff))`.
    pub fn glauber_step(&mut self, unit: Option<UnitId>) {
        let i = match unit {
            Some(i) => i,
            None => self.rng.gen_range_usize(0, self.netsize),
        };
        let e_diff = self.delta_e(i);
        let u = self.rng.next_f32_01();
        if self.beta * e_diff < (1.0 / u - 1.0).ln() {
            self.s[i] = -self.s[i];
        }
    }

    /// Constrained parameter step: gradient ascent plus weight decay.
    ///
    /// `dj` is a dense netsize x netsize buffer of which only the upper
    /// triangle is read, matching the coupling storage convention.
    pub fn apply_gradient(&mut self, dh: &[f32], dj: &[f32], rate: f32, decay: f32) {
        let n = self.netsize;
        debug_assert_eq!(dh.len(), n);
        debug_assert_eq!(dj.len(), n * n);

        for i in 0..n {
            self.h[i] += rate * dh[i] - decay * self.h[i];
            for j in (i + 1)..n {
                let at = i * n + j;
                self.j[at] += rate * dj[at] - decay * self.j[at];
            }
        }
    }

    /// Saturate every field and coupling into `[-max_weights, max_weights]`.
    /// Idempotent.
    pub fn clip_weights(&mut self) {
        let vmax = self.max_weights;
        for h in &mut self.h {
            *h = h.clamp(-vmax, vmax);
        }
        let n = self.netsize;
        for i in 0..n {
            for j in (i + 1)..n {
                let w = &mut self.j[i * n + j];
                *w = w.clamp(-vmax, vmax);
            }
        }
    }

    // ---- image persistence ------------------------------------------------

    /// Serialize a versioned, chunked network image.
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        let mut cfg = Vec::new();
        storage::write_u32_le(&mut cfg, self.netsize as u32)?;
        storage::write_u32_le(&mut cfg, self.sensors as u32)?;
        storage::write_u32_le(&mut cfg, self.motors as u32)?;
        storage::write_f32_le(&mut cfg, self.beta)?;
        storage::write_f32_le(&mut cfg, self.max_weights)?;
        storage::write_chunk(w, *b"CFG0", &cfg)?;

        let mut prng = Vec::new();
        storage::write_u64_le(&mut prng, self.rng.state())?;
        storage::write_chunk(w, *b"PRNG", &prng)?;

        let spins: Vec<u8> = self.s.iter().map(|&s| u8::from(s > 0.0)).collect();
        storage::write_chunk(w, *b"SPIN", &spins)?;

        let mut fields = Vec::new();
        storage::write_f32_slice(&mut fields, &self.h)?;
        storage::write_chunk(w, *b"FLDS", &fields)?;

        // Couplings dominate the image size; store the upper triangle only
        // and compress it.
        let n = self.netsize;
        let mut upper = Vec::with_capacity(n * (n - 1) / 2 * 4);
        for i in 0..n {
            for j in (i + 1)..n {
                upper.extend_from_slice(&self.j[i * n + j].to_le_bytes());
            }
        }
        storage::write_chunk_lz4(w, *b"CPLG", &upper)?;

        Ok(())
    }

    /// Load a versioned, chunked network image.
    ///
    /// Unknown chunks are skipped for forward compatibility.
    pub fn load_image_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad network image magic",
            ));
        }
        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_V1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported network image version",
            ));
        }

        let mut dims: Option<(usize, usize, usize)> = None;
        let mut beta: f32 = 1.0;
        let mut max_weights: f32 = 2.0;
        let mut rng_state: Option<u64> = None;
        let mut spins: Option<Vec<u8>> = None;
        let mut fields: Option<Vec<f32>> = None;
        let mut upper: Option<Vec<u8>> = None;

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            let mut take = r.take(u64::from(len));
            match &tag {
                b"CFG0" => {
                    let netsize = storage::read_u32_le(&mut take)? as usize;
                    let sensors = storage::read_u32_le(&mut take)? as usize;
                    let motors = storage::read_u32_le(&mut take)? as usize;
                    beta = storage::read_f32_le(&mut take)?;
                    max_weights = storage::read_f32_le(&mut take)?;
                    dims = Some((netsize, sensors, motors));
                }
                b"PRNG" => {
                    rng_state = Some(storage::read_u64_le(&mut take)?);
                }
                b"SPIN" => {
                    let mut buf = vec![0u8; len as usize];
                    take.read_exact(&mut buf)?;
                    spins = Some(buf);
                }
                b"FLDS" => {
                    fields = Some(storage::read_f32_vec(&mut take, len as usize / 4)?);
                }
                b"CPLG" => {
                    upper = Some(storage::read_chunk_lz4(&mut take, len)?);
                }
                _ => {
                    // Unknown chunk: skip.
                }
            }

            // Drain any remaining payload bytes for unknown or
            // partially-read chunks.
            io::copy(&mut take, &mut io::sink())?;
        }

        let (netsize, sensors, motors) =
            dims.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing CFG0"))?;
        if netsize == 0 || sensors + motors > netsize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "CFG0 partition invalid",
            ));
        }

        let spins =
            spins.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing SPIN"))?;
        let fields =
            fields.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing FLDS"))?;
        let upper =
            upper.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing CPLG"))?;
        let rng_state =
            rng_state.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing PRNG"))?;

        if spins.len() != netsize || fields.len() != netsize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unit chunk length mismatch",
            ));
        }
        let pairs = netsize * (netsize - 1) / 2;
        if upper.len() != pairs * 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "CPLG length mismatch",
            ));
        }

        let mut j = vec![0.0f32; netsize * netsize];
        let mut at = 0usize;
        for i in 0..netsize {
            for col in (i + 1)..netsize {
                let bytes: [u8; 4] = upper[at..at + 4].try_into().unwrap();
                j[i * netsize + col] = f32::from_le_bytes(bytes);
                at += 4;
            }
        }

        Ok(Self {
            netsize,
            sensors,
            motors,
            beta,
            max_weights,
            s: spins.iter().map(|&b| if b > 0 { 1.0 } else { -1.0 }).collect(),
            h: fields,
            j,
            rng: Prng::from_state(rng_state),
        })
    }

    #[cfg(test)]
    pub(crate) fn set_field(&mut self, unit: UnitId, value: f32) {
        self.h[unit] = value;
    }

    #[cfg(test)]
    pub(crate) fn set_coupling(&mut self, i: UnitId, j: UnitId, value: f32) {
        self.j[i * self.netsize + j] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_net(seed: u64) -> SpinNet {
        SpinNet::new(NetConfig {
            netsize: 10,
            sensors: 2,
            motors: 1,
            seed: Some(seed),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_overlapping_partition() {
        let err = SpinNet::new(NetConfig {
            netsize: 4,
            sensors: 3,
            motors: 2,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidPartition {
                netsize: 4,
                sensors: 3,
                motors: 2,
            }
        );

        assert_eq!(
            SpinNet::new(NetConfig {
                netsize: 0,
                sensors: 0,
                motors: 0,
                ..Default::default()
            })
            .unwrap_err(),
            ModelError::EmptyNet
        );
    }

    #[test]
    fn spins_stay_in_domain_under_sampling() {
        let mut net = small_net(11);
        net.random_fields(None);
        net.random_wiring(None);
        for _ in 0..2_000 {
            net.glauber_step(None);
        }
        for &s in net.state(Region::All) {
            assert!(s == 1.0 || s == -1.0);
        }
    }

    #[test]
    fn coupling_reads_are_symmetrized() {
        let mut net = small_net(5);
        net.set_coupling(2, 7, 0.25);
        net.set_coupling(7, 2, 0.5);
        assert_eq!(net.coupling(2, 7), 0.75);
        assert_eq!(net.coupling(7, 2), 0.75);
    }

    #[test]
    fn delta_e_matches_hand_computation() {
        let mut net = SpinNet::new(NetConfig {
            netsize: 3,
            sensors: 0,
            motors: 0,
            seed: Some(9),
            ..Default::default()
        })
        .unwrap();
        net.set_field(0, 0.5);
        net.set_coupling(0, 1, 1.0);
        net.set_coupling(0, 2, -2.0);

        let s = net.state(Region::All).to_vec();
        let expected = 2.0 * s[0] * (0.5 + 1.0 * s[1] - 2.0 * s[2]);
        assert!((net.delta_e(0) - expected).abs() < 1e-6);
    }

    #[test]
    fn zero_energy_flip_accepts_half_the_time() {
        // With h = J = 0 every flip has eDiff = 0, so the acceptance
        // probability must be exactly 1/2 in expectation.
        let mut net = small_net(123);
        let trials = 40_000;
        let mut flips = 0u32;
        for _ in 0..trials {
            let before = net.state(Region::All)[4];
            net.glauber_step(Some(4));
            if net.state(Region::All)[4] != before {
                flips += 1;
            }
        }
        let rate = f64::from(flips) / f64::from(trials);
        assert!((rate - 0.5).abs() < 0.02, "flip rate {rate}");
    }

    #[test]
    fn clipping_is_idempotent_and_bounded() {
        let mut net = small_net(77);
        net.random_fields(Some(50.0));
        net.random_wiring(Some(50.0));

        net.clip_weights();
        let h_once = net.fields().to_vec();
        let j_once = net.j.clone();

        net.clip_weights();
        assert_eq!(net.fields(), h_once.as_slice());
        assert_eq!(net.j, j_once);

        let vmax = net.max_weights();
        assert!(net.fields().iter().all(|h| h.abs() <= vmax));
        assert!(net.j.iter().all(|w| w.abs() <= vmax));
    }

    #[test]
    fn random_wiring_skips_sensor_sensor_pairs() {
        let mut net = SpinNet::new(NetConfig {
            netsize: 8,
            sensors: 3,
            motors: 2,
            seed: Some(21),
            ..Default::default()
        })
        .unwrap();
        net.random_wiring(None);

        for i in 0..3 {
            for j in (i + 1)..3 {
                assert_eq!(net.coupling(i, j), 0.0);
            }
        }
    }

    #[test]
    fn same_seed_reproduces_trajectory() {
        let mut a = small_net(2026);
        let mut b = small_net(2026);
        a.random_wiring(None);
        b.random_wiring(None);
        for _ in 0..500 {
            a.glauber_step(None);
            b.glauber_step(None);
        }
        assert_eq!(a.state(Region::All), b.state(Region::All));
    }

    #[test]
    fn image_roundtrip_preserves_everything() {
        let mut net = small_net(404);
        net.random_fields(None);
        net.random_wiring(None);

        let mut buf = Vec::new();
        net.save_image_to(&mut buf).unwrap();

        let back = SpinNet::load_image_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back.netsize(), net.netsize());
        assert_eq!(back.sensors(), net.sensors());
        assert_eq!(back.motors(), net.motors());
        assert_eq!(back.state(Region::All), net.state(Region::All));
        assert_eq!(back.fields(), net.fields());
        assert_eq!(back.j, net.j);

        // Loaded generator continues the same stream.
        let mut a = net;
        let mut b = back;
        for _ in 0..100 {
            a.glauber_step(None);
            b.glauber_step(None);
        }
        assert_eq!(a.state(Region::All), b.state(Region::All));
    }
}
