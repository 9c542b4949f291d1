//! Per-step unit visitation order.
//!
//! One time step visits every unit once, in a fresh random permutation.
//! The visit to unit 0 is the distinguished environment-coupling event:
//! the motor pattern is decoded into an action, the body advances, and
//! the sensor region is re-encoded. That ordering contract is structural
//! here rather than incidental to iteration order: later visits in the
//! same step see the re-encoded sensors.

use crate::prng::Prng;
use crate::spin::UnitId;

/// What a single unit visit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEvent {
    /// Unit 0: advance the environment, then re-encode the sensors.
    Couple,
    /// Sensor unit other than 0: passively overwritten by the encoder,
    /// never independently sampled.
    Hold(UnitId),
    /// Hidden or motor unit: one Glauber update.
    Sample(UnitId),
}

/// Reusable visitation plan. The permutation buffer is allocated once and
/// reshuffled every step.
#[derive(Debug, Clone)]
pub struct Sweep {
    order: Vec<UnitId>,
    sensors: usize,
}

impl Sweep {
    pub fn new(netsize: usize, sensors: usize) -> Self {
        Self {
            order: (0..netsize).collect(),
            sensors,
        }
    }

    /// Draw a fresh permutation for the next step.
    pub fn shuffle(&mut self, rng: &mut Prng) {
        rng.shuffle(&mut self.order);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The unit visited at position `k` of the current permutation.
    pub fn visit(&self, k: usize) -> UnitEvent {
        let unit = self.order[k];
        if unit == 0 {
            UnitEvent::Couple
        } else if unit < self.sensors {
            UnitEvent::Hold(unit)
        } else {
            UnitEvent::Sample(unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_unit_visited_once_per_step() {
        let mut rng = Prng::new(8);
        let mut sweep = Sweep::new(12, 3);
        for _ in 0..20 {
            sweep.shuffle(&mut rng);
            let mut seen = [false; 12];
            for k in 0..sweep.len() {
                let unit = match sweep.visit(k) {
                    UnitEvent::Couple => 0,
                    UnitEvent::Hold(u) | UnitEvent::Sample(u) => u,
                };
                assert!(!seen[unit], "unit {unit} visited twice");
                seen[unit] = true;
            }
            assert!(seen.iter().all(|&v| v));
        }
    }

    #[test]
    fn events_respect_the_partition() {
        let mut rng = Prng::new(9);
        let mut sweep = Sweep::new(6, 2);
        sweep.shuffle(&mut rng);
        for k in 0..sweep.len() {
            match sweep.visit(k) {
                UnitEvent::Couple => {}
                UnitEvent::Hold(u) => assert!(u > 0 && u < 2),
                UnitEvent::Sample(u) => assert!(u >= 2),
            }
        }
    }

    #[test]
    fn successive_steps_use_fresh_permutations() {
        let mut rng = Prng::new(10);
        let mut sweep = Sweep::new(32, 4);

        sweep.shuffle(&mut rng);
        let first: Vec<UnitId> = sweep.order.clone();
        let mut changed = false;
        for _ in 0..5 {
            sweep.shuffle(&mut rng);
            if sweep.order != first {
                changed = true;
                break;
            }
        }
        assert!(changed, "permutation never changed across steps");
    }
}
