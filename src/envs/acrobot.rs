//! Two-link pendulum (acrobot) environment and its embodiment adapter.
//!
//! State layout: `[theta1, theta2, dtheta1, dtheta2]`. `theta1` is the
//! angle of the first link from the downward vertical; `theta2` is
//! relative to the first link. Torque is applied at the joint between the
//! links. Equations of motion are the book variant, integrated with RK4
//! over one `dt` per step; angles wrap to `[-pi, pi)` and joint velocities
//! saturate at their bounds.

use crate::coding;
use crate::envs::{Action, Embodiment, StepOutcome};
use crate::prng::Prng;

use core::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcrobotParams {
    pub link_length_1: f32,
    pub link_length_2: f32,
    pub link_mass_1: f32,
    pub link_mass_2: f32,
    /// Center-of-mass position along each link.
    pub link_com_1: f32,
    pub link_com_2: f32,
    /// Moment of inertia, shared by both links.
    pub link_moi: f32,
    pub max_vel_1: f32,
    pub max_vel_2: f32,
    pub dt: f32,
    pub gravity: f32,
}

impl Default for AcrobotParams {
    fn default() -> Self {
        Self {
            link_length_1: 1.0,
            link_length_2: 1.0,
            link_mass_1: 1.0,
            link_mass_2: 1.0,
            link_com_1: 0.5,
            link_com_2: 0.5,
            link_moi: 1.0,
            max_vel_1: 4.0 * PI,
            max_vel_2: 9.0 * PI,
            dt: 0.2,
            gravity: 9.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcrobotEnv {
    pub params: AcrobotParams,
    state: [f32; 4],
    rng: Prng,
}

impl AcrobotEnv {
    pub fn new(params: AcrobotParams, seed: u64) -> Self {
        let mut env = Self {
            params,
            state: [0.0; 4],
            rng: Prng::new(seed),
        };
        env.reset();
        env
    }

    /// Start hanging nearly straight down, nearly at rest.
    pub fn reset(&mut self) {
        for x in &mut self.state {
            *x = self.rng.gen_range_f32(-0.1, 0.1);
        }
    }

    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    pub fn set_state(&mut self, state: [f32; 4]) {
        self.state = state;
    }

    /// Set both link masses at once.
    pub fn set_mass(&mut self, mass: f32) {
        self.params.link_mass_1 = mass;
        self.params.link_mass_2 = mass;
    }

    /// Height of the tip above the pivot, in link lengths.
    pub fn tip_height(&self) -> f32 {
        let [t1, t2, _, _] = self.state;
        -t1.cos() - (t2 + t1).cos()
    }

    /// Horizontal displacement of the tip from the pivot.
    pub fn tip_abscissa(&self) -> f32 {
        let [t1, t2, _, _] = self.state;
        t1.sin() + (t2 + t1).sin()
    }

    pub fn step(&mut self, action: Action) -> StepOutcome {
        let torque = action.signum();
        let p = self.params;

        let mut s = rk4(|y| self.dsdt(y, torque), self.state, p.dt);
        s[0] = wrap(s[0], -PI, PI);
        s[1] = wrap(s[1], -PI, PI);
        s[2] = s[2].clamp(-p.max_vel_1, p.max_vel_1);
        s[3] = s[3].clamp(-p.max_vel_2, p.max_vel_2);
        self.state = s;

        StepOutcome {
            reward: -1.0,
            done: self.tip_height() > 1.0,
        }
    }

    fn dsdt(&self, s: [f32; 4], torque: f32) -> [f32; 4] {
        let p = self.params;
        let m1 = p.link_mass_1;
        let m2 = p.link_mass_2;
        let l1 = p.link_length_1;
        let lc1 = p.link_com_1;
        let lc2 = p.link_com_2;
        let i1 = p.link_moi;
        let i2 = p.link_moi;
        let g = p.gravity;
        let [theta1, theta2, dtheta1, dtheta2] = s;

        let d1 = m1 * lc1 * lc1
            + m2 * (l1 * l1 + lc2 * lc2 + 2.0 * l1 * lc2 * theta2.cos())
            + i1
            + i2;
        let d2 = m2 * (lc2 * lc2 + l1 * lc2 * theta2.cos()) + i2;
        let phi2 = m2 * lc2 * g * (theta1 + theta2 - PI / 2.0).cos();
        let phi1 = -m2 * l1 * lc2 * dtheta2 * dtheta2 * theta2.sin()
            - 2.0 * m2 * l1 * lc2 * dtheta2 * dtheta1 * theta2.sin()
            + (m1 * lc1 + m2 * l1) * g * (theta1 - PI / 2.0).cos()
            + phi2;

        let ddtheta2 = (torque + d2 / d1 * phi1
            - m2 * l1 * lc2 * dtheta1 * dtheta1 * theta2.sin()
            - phi2)
            / (m2 * lc2 * lc2 + i2 - d2 * d2 / d1);
        let ddtheta1 = -(d2 * ddtheta2 + phi1) / d1;

        [dtheta1, dtheta2, ddtheta1, ddtheta2]
    }
}

fn wrap(x: f32, low: f32, high: f32) -> f32 {
    low + (x - low).rem_euclid(high - low)
}

/// One fourth-order Runge-Kutta step of size `dt`.
fn rk4(f: impl Fn([f32; 4]) -> [f32; 4], y: [f32; 4], dt: f32) -> [f32; 4] {
    let k1 = f(y);
    let k2 = f(add_scaled(y, k1, dt / 2.0));
    let k3 = f(add_scaled(y, k2, dt / 2.0));
    let k4 = f(add_scaled(y, k3, dt));

    let mut out = y;
    for i in 0..4 {
        out[i] += dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    out
}

fn add_scaled(y: [f32; 4], k: [f32; 4], scale: f32) -> [f32; 4] {
    let mut out = y;
    for i in 0..4 {
        out[i] += k[i] * scale;
    }
    out
}

/// Embodiment adapter: two-link pendulum with split position sensors.
///
/// The lower half of the sensor region encodes the tip height, the upper
/// half the tip abscissa, both binned against the tip's reach (two link
/// lengths), read once here. Keeps a first difference of the first
/// joint's velocity as diagnostic bookkeeping.
#[derive(Debug, Clone)]
pub struct AcrobotBody {
    env: AcrobotEnv,
    height_range: f32,

    theta1_dot: f32,
    theta1_ddot: f32,
}

impl AcrobotBody {
    pub fn new(env: AcrobotEnv) -> Self {
        let height_range = env.params.link_length_1 + env.params.link_length_2;
        Self {
            env,
            height_range,
            theta1_dot: 0.0,
            theta1_ddot: 0.0,
        }
    }

    pub fn env(&self) -> &AcrobotEnv {
        &self.env
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.env.set_mass(mass);
    }

    pub fn angular_velocity(&self) -> f32 {
        self.theta1_dot
    }

    /// Per-step first difference of the first joint's angular velocity.
    pub fn angular_accel(&self) -> f32 {
        self.theta1_ddot
    }
}

impl Embodiment for AcrobotBody {
    fn reset(&mut self) {
        self.env.reset();
        self.theta1_dot = 0.0;
        self.theta1_ddot = 0.0;
    }

    fn act(&mut self, action: Action) {
        let prev = self.theta1_dot;
        // Episode termination is ignored; the sweep horizon bounds the run.
        let _ = self.env.step(action);
        self.theta1_dot = self.env.state()[2];
        self.theta1_ddot = self.theta1_dot - prev;
    }

    fn write_sensors(&self, sensors: &mut [f32]) {
        let split = sensors.len() / 2;
        let y_bits = split as u32;
        let x_bits = (sensors.len() - split) as u32;

        let y_index = coding::sensor_index(self.env.tip_height(), self.height_range, y_bits);
        let x_index = coding::sensor_index(self.env.tip_abscissa(), self.height_range, x_bits);

        coding::write_bits(y_index, &mut sensors[..split]);
        coding::write_bits(x_index, &mut sensors[split..]);
    }

    fn trace(&self) -> f32 {
        self.env.tip_height()
    }
}
