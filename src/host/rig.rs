//! Pendulum rigs. Each rig owns its physical state, advances it by one frame
//! step and writes the resulting world transforms back into the scene.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scene::{Matrix3, Scene, SceneObject, Transform};

/// Integration sub-steps per frame.
const SUBSTEPS: u32 = 8;

pub trait Rig: Send {
    /// Restores the initial conditions (playback jumped to the start frame).
    fn reset(&mut self);

    fn step(&mut self, dt: f64);

    /// Writes the current state into the scene's objects.
    fn apply(&self, scene: &mut Scene);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub length_m: f64,
    pub gravity: f64,
    /// Linear damping coefficient (1/s).
    pub damping: f64,
    /// Spring coupling between the two pendulums (1/s²).
    pub coupling: f64,
    pub initial_angles_deg: [f64; 2],
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            length_m: 1.0,
            gravity: 9.81,
            damping: 0.05,
            coupling: 1.5,
            initial_angles_deg: [30.0, 0.0],
        }
    }
}

fn rk4<const N: usize>(state: [f64; N], dt: f64, f: impl Fn(&[f64; N]) -> [f64; N]) -> [f64; N] {
    let offset = |base: &[f64; N], k: &[f64; N], h: f64| {
        let mut out = *base;
        for i in 0..N {
            out[i] += k[i] * h;
        }
        out
    };
    let k1 = f(&state);
    let k2 = f(&offset(&state, &k1, dt / 2.0));
    let k3 = f(&offset(&state, &k2, dt / 2.0));
    let k4 = f(&offset(&state, &k3, dt));
    let mut next = state;
    for i in 0..N {
        next[i] += dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    next
}

fn place(scene: &mut Scene, name: &str, pivot: [f64; 3], theta: f64) {
    let transform = Transform::new(Matrix3::rotation_x(theta), pivot);
    match scene.object_mut(name) {
        Some(object) => object.matrix_world = transform,
        None => scene.insert_object(SceneObject::new(name, transform)),
    }
}

/// One pendulum swinging about the world X axis.
#[derive(Debug, Clone)]
pub struct SimplePendulum {
    object: String,
    config: RigConfig,
    // [theta, omega]
    state: [f64; 2],
}

impl SimplePendulum {
    pub fn new(object: impl Into<String>, config: RigConfig) -> Self {
        let mut rig = Self {
            object: object.into(),
            config,
            state: [0.0; 2],
        };
        rig.reset();
        rig
    }

    pub fn angle(&self) -> f64 {
        self.state[0]
    }
}

impl Rig for SimplePendulum {
    fn reset(&mut self) {
        self.state = [self.config.initial_angles_deg[0].to_radians(), 0.0];
        debug!("Rig '{}' reset to {:.4} rad", self.object, self.state[0]);
    }

    fn step(&mut self, dt: f64) {
        let g_over_l = self.config.gravity / self.config.length_m;
        let damping = self.config.damping;
        let h = dt / f64::from(SUBSTEPS);
        for _ in 0..SUBSTEPS {
            self.state = rk4(self.state, h, |s| [s[1], -g_over_l * s[0].sin() - damping * s[1]]);
        }
    }

    fn apply(&self, scene: &mut Scene) {
        place(scene, &self.object, [0.0, 0.0, self.config.length_m], self.angle());
    }
}

/// Two identical pendulums side by side, joined by a spring.
#[derive(Debug, Clone)]
pub struct CoupledPendulums {
    objects: [String; 2],
    config: RigConfig,
    // [theta1, theta2, omega1, omega2]
    state: [f64; 4],
}

impl CoupledPendulums {
    pub fn new(first: impl Into<String>, second: impl Into<String>, config: RigConfig) -> Self {
        let mut rig = Self {
            objects: [first.into(), second.into()],
            config,
            state: [0.0; 4],
        };
        rig.reset();
        rig
    }

    pub fn angles(&self) -> [f64; 2] {
        [self.state[0], self.state[1]]
    }

    /// Total energy per unit mass and length², conserved without damping.
    #[cfg(test)]
    fn energy(&self) -> f64 {
        let g_over_l = self.config.gravity / self.config.length_m;
        let [t1, t2, w1, w2] = self.state;
        0.5 * (w1 * w1 + w2 * w2)
            + g_over_l * (2.0 - t1.cos() - t2.cos())
            + 0.5 * self.config.coupling * (t1 - t2).powi(2)
    }
}

impl Rig for CoupledPendulums {
    fn reset(&mut self) {
        let [a, b] = self.config.initial_angles_deg;
        self.state = [a.to_radians(), b.to_radians(), 0.0, 0.0];
        debug!(
            "Rig '{}'/'{}' reset to ({:.4}, {:.4}) rad",
            self.objects[0], self.objects[1], self.state[0], self.state[1]
        );
    }

    fn step(&mut self, dt: f64) {
        let g_over_l = self.config.gravity / self.config.length_m;
        let k = self.config.coupling;
        let damping = self.config.damping;
        let h = dt / f64::from(SUBSTEPS);
        for _ in 0..SUBSTEPS {
            self.state = rk4(self.state, h, |s| {
                let spring = k * (s[0] - s[1]);
                [
                    s[2],
                    s[3],
                    -g_over_l * s[0].sin() - spring - damping * s[2],
                    -g_over_l * s[1].sin() + spring - damping * s[3],
                ]
            });
        }
    }

    fn apply(&self, scene: &mut Scene) {
        let length = self.config.length_m;
        let [first, second] = self.angles();
        place(scene, &self.objects[0], [-0.5, 0.0, length], first);
        place(scene, &self.objects[1], [0.5, 0.0, length], second);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undamped() -> RigConfig {
        RigConfig {
            damping: 0.0,
            ..RigConfig::default()
        }
    }

    #[test]
    fn simple_pendulum_swings_through_zero() {
        let mut rig = SimplePendulum::new("Pendule", undamped());
        let start = rig.angle();
        assert!(start > 0.0);

        let mut crossed = false;
        for _ in 0..48 {
            rig.step(1.0 / 24.0);
            if rig.angle() < 0.0 {
                crossed = true;
            }
        }
        assert!(crossed);
        assert!(rig.angle().abs() <= start + 1e-4);
    }

    #[test]
    fn reset_restores_initial_angle() {
        let mut rig = SimplePendulum::new("Pendule", RigConfig::default());
        let start = rig.angle();
        rig.step(0.5);
        assert_ne!(rig.angle(), start);
        rig.reset();
        assert_eq!(rig.angle(), start);
    }

    #[test]
    fn coupling_transfers_motion_to_the_resting_pendulum() {
        let mut rig = CoupledPendulums::new("Pendule1", "Pendule2", undamped());
        assert_eq!(rig.angles()[1], 0.0);
        let initial_energy = rig.energy();

        for _ in 0..240 {
            rig.step(1.0 / 24.0);
        }
        assert!(rig.angles()[1].abs() > 1e-3);
        assert!((rig.energy() - initial_energy).abs() / initial_energy < 1e-3);
    }

    #[test]
    fn apply_creates_and_rotates_objects() {
        let rig = SimplePendulum::new("Pendule", RigConfig::default());
        let mut scene = Scene::new(24, 1, 10);
        rig.apply(&mut scene);

        let object = scene.object("Pendule").expect("object placed");
        let x = object.matrix_world.euler_xyz()[0];
        assert!((x - 30f64.to_radians()).abs() < 1e-9);
    }
}
