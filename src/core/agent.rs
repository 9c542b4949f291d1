//! The embodied aggregate: one network, one body, one sweep plan.
//!
//! All simulation state is owned here and mutated in place by a single
//! thread; there is no ambient/global state. Replicated experiments must
//! each own their own `Agent`.

use crate::coding;
use crate::envs::Embodiment;
use crate::schedule::{Sweep, UnitEvent};
use crate::spin::{Region, SpinNet};

pub struct Agent<B> {
    pub net: SpinNet,
    pub body: B,
    sweep: Sweep,
}

impl<B: Embodiment> Agent<B> {
    /// Couple a network to a body.
    ///
    /// Performs one initial coupling so the sensor region reflects the
    /// body's starting state before any sweep runs.
    pub fn new(net: SpinNet, body: B) -> Self {
        let sweep = Sweep::new(net.netsize(), net.sensors());
        let mut agent = Self { net, body, sweep };
        agent.couple();
        agent
    }

    /// Decode motors, advance the body one step, re-encode sensors.
    fn couple(&mut self) {
        let action = coding::quantize_action(coding::motor_mean(self.net.state(Region::Motors)));
        self.body.act(action);
        self.body.write_sensors(self.net.sensor_spins_mut());
    }

    /// One embodied time step: every unit visited once in fresh random
    /// order. The unit-0 visit couples to the environment; its re-encoded
    /// sensors are visible to all units visited later in the same step.
    pub fn sweep(&mut self) {
        self.sweep.shuffle(self.net.rng_mut());
        for k in 0..self.sweep.len() {
            match self.sweep.visit(k) {
                UnitEvent::Couple => self.couple(),
                UnitEvent::Hold(_) => {}
                UnitEvent::Sample(unit) => self.net.glauber_step(Some(unit)),
            }
        }
    }

    /// One detached time step: every unit (sensors included) is Glauber
    /// sampled and the environment is never touched.
    pub fn dream_sweep(&mut self) {
        self.sweep.shuffle(self.net.rng_mut());
        for k in 0..self.sweep.len() {
            let unit = match self.sweep.visit(k) {
                UnitEvent::Couple => 0,
                UnitEvent::Hold(u) | UnitEvent::Sample(u) => u,
            };
            self.net.glauber_step(Some(unit));
        }
    }

    /// Reset the body to a fresh initial condition, leaving the network
    /// untouched.
    pub fn randomize_position(&mut self) {
        self.body.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{Action, Embodiment};
    use crate::spin::NetConfig;

    /// Scripted body: counts steps, exposes a fixed sensor pattern.
    struct Probe {
        acted: usize,
        resets: usize,
        last_action: Option<Action>,
        pattern: Vec<f32>,
    }

    impl Probe {
        fn new(pattern: Vec<f32>) -> Self {
            Self {
                acted: 0,
                resets: 0,
                last_action: None,
                pattern,
            }
        }
    }

    impl Embodiment for Probe {
        fn reset(&mut self) {
            self.resets += 1;
        }

        fn act(&mut self, action: Action) {
            self.acted += 1;
            self.last_action = Some(action);
        }

        fn write_sensors(&self, sensors: &mut [f32]) {
            sensors.copy_from_slice(&self.pattern);
        }

        fn trace(&self) -> f32 {
            self.acted as f32
        }
    }

    fn probe_agent(seed: u64) -> Agent<Probe> {
        let net = SpinNet::new(NetConfig {
            netsize: 10,
            sensors: 2,
            motors: 1,
            seed: Some(seed),
            ..Default::default()
        })
        .unwrap();
        Agent::new(net, Probe::new(vec![1.0, -1.0]))
    }

    #[test]
    fn construction_couples_once() {
        let agent = probe_agent(1);
        assert_eq!(agent.body.acted, 1);
        assert_eq!(agent.net.state(Region::Sensors), &[1.0, -1.0]);
    }

    #[test]
    fn one_sweep_steps_the_body_exactly_once() {
        let mut agent = probe_agent(2);
        agent.sweep();
        assert_eq!(agent.body.acted, 2);

        for _ in 0..10 {
            agent.sweep();
        }
        assert_eq!(agent.body.acted, 12);
    }

    #[test]
    fn sweep_keeps_spins_in_domain_and_sensors_encoded() {
        let mut agent = probe_agent(3);
        agent.net.random_wiring(None);
        for _ in 0..50 {
            agent.sweep();
        }
        assert_eq!(agent.net.netsize(), 10);
        for &s in agent.net.state(Region::All) {
            assert!(s == 1.0 || s == -1.0);
        }
        // Sensor units hold the encoder's pattern, not sampled noise.
        assert_eq!(agent.net.state(Region::Sensors), &[1.0, -1.0]);
    }

    #[test]
    fn motor_pattern_drives_the_action() {
        let net = SpinNet::new(NetConfig {
            netsize: 10,
            sensors: 2,
            motors: 3,
            seed: Some(4),
            ..Default::default()
        })
        .unwrap();
        let expected =
            coding::quantize_action(coding::motor_mean(net.state(Region::Motors)));

        let agent = Agent::new(net, Probe::new(vec![1.0, -1.0]));
        assert_eq!(agent.body.last_action, Some(expected));
    }

    #[test]
    fn dream_sweep_never_touches_the_body() {
        let mut agent = probe_agent(5);
        let acted_before = agent.body.acted;
        for _ in 0..20 {
            agent.dream_sweep();
        }
        assert_eq!(agent.body.acted, acted_before);
        for &s in agent.net.state(Region::All) {
            assert!(s == 1.0 || s == -1.0);
        }
    }

    #[test]
    fn randomize_position_resets_the_body() {
        let mut agent = probe_agent(6);
        agent.randomize_position();
        assert_eq!(agent.body.resets, 1);
    }
}
