//! Car-on-a-hill environment and its embodiment adapter.
//!
//! Classic-control dynamics: the car sits in a sinusoidal valley
//! (`height = sin(3x)`) and the engine is weaker than gravity, so reaching
//! the right rim requires rocking. The embodied preset walls the arena in
//! and moves the goal past the right wall, so episodes never terminate and
//! the body just keeps living in the valley.

use crate::coding;
use crate::envs::{Action, Embodiment, StepOutcome};
use crate::prng::Prng;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountainCarParams {
    pub min_position: f32,
    pub max_position: f32,
    pub goal_position: f32,
    pub max_speed: f32,
    pub force: f32,
    pub gravity: f32,
}

impl Default for MountainCarParams {
    fn default() -> Self {
        Self {
            min_position: -1.2,
            max_position: 0.6,
            goal_position: 0.5,
            max_speed: 0.07,
            force: 0.001,
            gravity: 0.0025,
        }
    }
}

impl MountainCarParams {
    /// Walled-in variant for open-ended embodiment runs: symmetric-ish
    /// bounds around the valley floor and a goal past the right wall, so
    /// `done` never fires.
    pub fn bounded() -> Self {
        Self {
            min_position: -1.5 * core::f32::consts::PI / 3.0,
            max_position: 0.5 * core::f32::consts::PI / 3.0,
            goal_position: 1.5 * core::f32::consts::PI / 3.0,
            max_speed: 0.045,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MountainCarEnv {
    pub params: MountainCarParams,
    position: f32,
    velocity: f32,
    rng: Prng,
}

impl MountainCarEnv {
    pub fn new(params: MountainCarParams, seed: u64) -> Self {
        let mut env = Self {
            params,
            position: 0.0,
            velocity: 0.0,
            rng: Prng::new(seed),
        };
        env.reset();
        env
    }

    /// Park the car somewhere near the valley floor, at rest.
    pub fn reset(&mut self) {
        self.position = self.rng.gen_range_f32(-0.6, -0.4);
        self.velocity = 0.0;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Overwrite the raw physical state (used by the wall-bounce rule).
    pub fn set_state(&mut self, position: f32, velocity: f32) {
        self.position = position;
        self.velocity = velocity;
    }

    pub fn step(&mut self, action: Action) -> StepOutcome {
        let p = &self.params;

        self.velocity += action.signum() * p.force + (3.0 * self.position).cos() * (-p.gravity);
        self.velocity = self.velocity.clamp(-p.max_speed, p.max_speed);
        self.position += self.velocity;
        self.position = self.position.clamp(p.min_position, p.max_position);
        if self.position == p.min_position && self.velocity < 0.0 {
            self.velocity = 0.0;
        }

        StepOutcome {
            reward: -1.0,
            done: self.position >= p.goal_position,
        }
    }
}

/// Embodiment adapter: one hill car, velocity-coded sensors.
///
/// The full sensor width encodes the single velocity measurement; the
/// binning range is the environment's speed bound, read once here.
#[derive(Debug, Clone)]
pub struct MountainCarBody {
    env: MountainCarEnv,
    speed_range: f32,

    prev_velocity: f32,
    position: f32,
    speed: f32,
    height: f32,
    vspeed: f32,
}

impl MountainCarBody {
    pub fn new(env: MountainCarEnv) -> Self {
        let speed_range = env.params.max_speed;
        let mut body = Self {
            env,
            speed_range,
            prev_velocity: 0.0,
            position: 0.0,
            speed: 0.0,
            height: 0.0,
            vspeed: 0.0,
        };
        body.refresh_derived();
        body
    }

    pub fn env(&self) -> &MountainCarEnv {
        &self.env
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Height of the car on the hill profile.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Vertical velocity along the hill profile.
    pub fn vertical_speed(&self) -> f32 {
        self.vspeed
    }

    fn refresh_derived(&mut self) {
        self.position = self.env.position();
        self.speed = self.env.velocity();
        self.height = (3.0 * self.position).sin();
        self.vspeed = self.speed * 3.0 * (3.0 * self.position).cos();
    }
}

impl Embodiment for MountainCarBody {
    fn reset(&mut self) {
        self.env.reset();
        self.prev_velocity = 0.0;
        self.refresh_derived();
    }

    fn act(&mut self, action: Action) {
        self.prev_velocity = self.env.velocity();
        // Episode termination is ignored; the sweep horizon bounds the run.
        let _ = self.env.step(action);

        // Wall bounce, judged by the pre-step velocity: moving outward
        // kills the velocity, moving inward keeps it, position pins at
        // the wall either way.
        let p = self.env.params;
        if self.env.position() >= p.max_position {
            let v = if self.prev_velocity > 0.0 {
                0.0
            } else {
                self.prev_velocity
            };
            self.env.set_state(p.max_position, v);
        }
        if self.env.position() <= p.min_position {
            let v = if self.prev_velocity < 0.0 {
                0.0
            } else {
                self.prev_velocity
            };
            self.env.set_state(p.min_position, v);
        }

        self.refresh_derived();
    }

    fn write_sensors(&self, sensors: &mut [f32]) {
        let bits = sensors.len() as u32;
        let index = coding::sensor_index(self.speed, self.speed_range, bits);
        coding::write_bits(index, sensors);
    }

    fn trace(&self) -> f32 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_parks_near_the_valley_floor() {
        let mut env = MountainCarEnv::new(MountainCarParams::default(), 1);
        for _ in 0..50 {
            env.reset();
            assert!(env.position() >= -0.6 && env.position() <= -0.4);
            assert_eq!(env.velocity(), 0.0);
        }
    }

    #[test]
    fn position_and_speed_stay_bounded() {
        let mut env = MountainCarEnv::new(MountainCarParams::bounded(), 2);
        let p = env.params;
        let mut rng = Prng::new(3);
        for _ in 0..5_000 {
            let action = match rng.gen_range_usize(0, 3) {
                0 => Action::Back,
                1 => Action::Stay,
                _ => Action::Forward,
            };
            env.step(action);
            assert!(env.position() >= p.min_position && env.position() <= p.max_position);
            assert!(env.velocity().abs() <= p.max_speed);
        }
    }

    #[test]
    fn bounded_preset_never_finishes_an_episode() {
        let mut env = MountainCarEnv::new(MountainCarParams::bounded(), 4);
        for _ in 0..2_000 {
            let out = env.step(Action::Forward);
            assert!(!out.done);
        }
    }

    #[test]
    fn default_goal_is_reachable_by_fiat() {
        let mut env = MountainCarEnv::new(MountainCarParams::default(), 5);
        env.set_state(0.49, 0.04);
        let out = env.step(Action::Forward);
        assert!(out.done);
    }

    #[test]
    fn outward_wall_hit_zeroes_velocity() {
        let params = MountainCarParams::bounded();
        let mut body = MountainCarBody::new(MountainCarEnv::new(params, 6));
        body.env.set_state(params.max_position - 1e-4, params.max_speed);
        body.act(Action::Forward);

        assert_eq!(body.position(), params.max_position);
        assert_eq!(body.speed(), 0.0);
    }

    #[test]
    fn inward_wall_graze_preserves_prestep_velocity() {
        let params = MountainCarParams::bounded();
        let mut body = MountainCarBody::new(MountainCarEnv::new(params, 7));
        // Sitting on the wall, drifting in, but the engine pushes the car
        // back onto the wall this step. Pre-step velocity survives.
        body.env.set_state(params.max_position, -0.0005);
        body.act(Action::Forward);

        assert_eq!(body.position(), params.max_position);
        assert_eq!(body.speed(), -0.0005);
    }

    #[test]
    fn sensors_encode_the_binned_velocity() {
        let params = MountainCarParams::bounded();
        let mut body = MountainCarBody::new(MountainCarEnv::new(params, 8));
        body.env.set_state(-0.5, 0.02);
        body.refresh_derived();

        let mut sensors = [0.0f32; 4];
        body.write_sensors(&mut sensors);

        let expected = coding::sensor_index(0.02, params.max_speed, 4);
        assert_eq!(coding::pattern_index(&sensors), expected as u64);
    }

    #[test]
    fn height_follows_the_hill_profile() {
        let params = MountainCarParams::bounded();
        let mut body = MountainCarBody::new(MountainCarEnv::new(params, 9));
        body.env.set_state(0.1, 0.0);
        body.refresh_derived();
        assert!((body.height() - (0.3f32).sin()).abs() < 1e-6);
        assert_eq!(body.trace(), 0.1);
    }
}
