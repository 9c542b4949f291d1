//! Embodied Ising network with homeostatic critical learning.
//!
//! A `SpinNet` is a small spin-glass whose sensor units are written by a
//! physical control environment and whose motor units drive that
//! environment's actions. The `HomeostaticLearner` nudges fields and
//! couplings so the network's simulated correlation statistics match a
//! caller-supplied target profile while it stays embedded in the
//! sensorimotor loop.
//!
//! ## Modules
//!
//! - [`spin`]: spins, fields, couplings, Glauber sampling, weight clipping
//! - [`agent`]: network + body aggregate and the per-step sweep
//! - [`learner`]: trajectory statistics, rank alignment, learning loop
//! - [`coding`]: sensor binning and motor quantization
//! - [`envs`]: the `Embodiment` capability and the two concrete bodies

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/coding.rs"]
pub mod coding;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/spin.rs"]
pub mod spin;

#[path = "core/schedule.rs"]
pub mod schedule;

#[path = "core/agent.rs"]
pub mod agent;

#[path = "core/learner.rs"]
pub mod learner;

pub mod envs;

/// Prelude module for convenient imports.
///
/// ```
/// use critter::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::envs::{Action, Embodiment};
    pub use crate::error::ModelError;
    pub use crate::learner::{HomeostaticLearner, LearnConfig, RoundReport, TargetStats};
    pub use crate::spin::{NetConfig, Region, SpinNet, UnitId};
}
