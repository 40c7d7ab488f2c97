// Kinematic transforms for the three-wheel holonomic base
//
// Wheel layout, looking from the top with body FORWARD at 12 o'clock:
// RIGHT at 2 o'clock, BACK at 6 o'clock, LEFT at 10 o'clock. Each wheel
// axis is tangent to a circle of radius L around the centre; wheel radius
// is R. Body frame is (forward, strafe, theta) with strafe 90° anti-
// clockwise from forward and theta positive anti-clockwise.

use serde::{Deserialize, Serialize};

const SIN30: f64 = 0.5;
const COS30: f64 = 0.866_025_403_784_438_6;
const COS180: f64 = -1.0;
const TAN30: f64 = 0.577_350_269_189_625_7;

/// A body-frame triple: used for velocities (m/s, m/s, rad/s),
/// displacements (m, m, rad), braking spaces and friction coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyVector {
    pub forward: f64,
    pub strafe: f64,
    pub theta: f64,
}

impl BodyVector {
    pub const ZERO: Self = Self {
        forward: 0.0,
        strafe: 0.0,
        theta: 0.0,
    };

    pub fn new(forward: f64, strafe: f64, theta: f64) -> Self {
        Self {
            forward,
            strafe,
            theta,
        }
    }

    /// True if every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.strafe == 0.0 && self.theta == 0.0
    }
}

/// Wheel triple in (right, back, left) order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSpeeds {
    pub right: f64,
    pub back: f64,
    pub left: f64,
}

/// World-frame pose. `phi` is kept in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub phi: f64,
}

impl Pose {
    /// Integrate a body-frame displacement into the pose.
    ///
    /// Uses the midpoint heading `phi + dtheta/2` so that first-order
    /// curvature error cancels over a tick.
    pub fn integrate(&mut self, displacement: BodyVector) {
        let alpha = self.phi + displacement.theta / 2.0;
        self.x += displacement.forward * alpha.cos() - displacement.strafe * alpha.sin();
        self.y += displacement.forward * alpha.sin() + displacement.strafe * alpha.cos();
        self.phi = wrap_angle(self.phi + displacement.theta);
    }
}

/// Wrap an angle into `[0, 2π)`.
///
/// Per-tick angular displacements are small, so repeated correction is
/// cheaper than a modulo here.
pub fn wrap_angle(mut angle: f64) -> f64 {
    while angle >= std::f64::consts::TAU {
        angle -= std::f64::consts::TAU;
    }
    while angle < 0.0 {
        angle += std::f64::consts::TAU;
    }
    angle
}

/// Signed shortest arc from `from` to `to`, in `(-π, π]`.
pub fn shortest_arc(from: f64, to: f64) -> f64 {
    let mut arc = to - from;
    while arc > std::f64::consts::PI {
        arc -= std::f64::consts::TAU;
    }
    while arc <= -std::f64::consts::PI {
        arc += std::f64::consts::TAU;
    }
    arc
}

/// Body ↔ wheel transforms, parameterised by wheel radius R and chassis
/// radius L. The per-wheel coefficients are cached and refreshed whenever a
/// radius changes.
#[derive(Debug, Clone)]
pub struct Kinematics {
    r: f64,
    l: f64,

    cos30_r: f64,
    sin30_r: f64,
    cos180_r: f64,
    l_r: f64,
    tan30_r: f64,
    r_3: f64,
    r_3l: f64,
}

impl Kinematics {
    pub fn new(wheel_radius: f64, chassis_radius: f64) -> Self {
        let mut kinematics = Self {
            r: wheel_radius,
            l: chassis_radius,
            cos30_r: 0.0,
            sin30_r: 0.0,
            cos180_r: 0.0,
            l_r: 0.0,
            tan30_r: 0.0,
            r_3: 0.0,
            r_3l: 0.0,
        };
        kinematics.refresh();
        kinematics
    }

    pub fn set_wheel_radius(&mut self, wheel_radius: f64) {
        self.r = wheel_radius;
        self.refresh();
    }

    pub fn set_chassis_radius(&mut self, chassis_radius: f64) {
        self.l = chassis_radius;
        self.refresh();
    }

    pub fn wheel_radius(&self) -> f64 {
        self.r
    }

    pub fn chassis_radius(&self) -> f64 {
        self.l
    }

    fn refresh(&mut self) {
        self.cos30_r = COS30 / self.r;
        self.sin30_r = SIN30 / self.r;
        self.cos180_r = COS180 / self.r;
        self.l_r = self.l / self.r;
        self.tan30_r = TAN30 * self.r;
        self.r_3 = self.r / 3.0;
        self.r_3l = self.r / (3.0 * self.l);
    }

    /// Body velocity → wheel angular speeds (rad/s).
    pub fn inverse(&self, speed: BodyVector) -> WheelSpeeds {
        let s = self.sin30_r * speed.strafe;
        let f = self.cos30_r * speed.forward;
        let t = self.l_r * speed.theta;

        WheelSpeeds {
            right: s + f + t,
            back: self.cos180_r * speed.strafe + t,
            left: s - f + t,
        }
    }

    /// Normalised body velocity → normalised wheel-speed fractions.
    ///
    /// Same mixing as [`Kinematics::inverse`] but without the geometric
    /// scaling; inputs are treated as fractions of the wheel maximum.
    pub fn normalised_inverse(&self, speed: BodyVector) -> WheelSpeeds {
        let s = SIN30 * speed.strafe;
        let f = COS30 * speed.forward;
        let t = speed.theta;

        WheelSpeeds {
            right: s + f + t,
            back: COS180 * speed.strafe + t,
            left: s - f + t,
        }
    }

    /// Wheel angular displacements (rad) → body displacement.
    pub fn forward(&self, rotation: WheelSpeeds) -> BodyVector {
        BodyVector {
            forward: self.tan30_r * (rotation.right - rotation.left),
            strafe: self.r_3 * (rotation.right - 2.0 * rotation.back + rotation.left),
            theta: self.r_3l * (rotation.right + rotation.back + rotation.left),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

    const R: f64 = 0.05;
    const L: f64 = 0.15;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn forward_motion_spins_right_and_left_opposed() {
        let kinematics = Kinematics::new(R, L);
        let wheels = kinematics.inverse(BodyVector::new(0.5, 0.0, 0.0));

        assert!((wheels.right - 8.660).abs() < 1e-3);
        assert!(close(wheels.back, 0.0));
        assert!((wheels.left + 8.660).abs() < 1e-3);
    }

    #[test]
    fn pure_rotation_spins_all_wheels_equally() {
        let kinematics = Kinematics::new(R, L);
        let wheels = kinematics.inverse(BodyVector::new(0.0, 0.0, 1.0));

        assert!(close(wheels.right, 3.0));
        assert!(close(wheels.back, 3.0));
        assert!(close(wheels.left, 3.0));
    }

    #[test]
    fn inverse_then_forward_is_identity() {
        let kinematics = Kinematics::new(R, L);
        let cases = [
            BodyVector::new(0.5, 0.0, 0.0),
            BodyVector::new(0.0, 0.3, 0.0),
            BodyVector::new(0.0, 0.0, 1.2),
            BodyVector::new(0.2, -0.1, 0.7),
            BodyVector::new(-0.4, 0.25, -2.0),
        ];

        for speed in cases {
            let wheels = kinematics.inverse(speed);
            // Over a time step dt the wheel rotations are speeds * dt; the
            // transform is linear so dt cancels.
            let body = kinematics.forward(wheels);
            assert!(close(body.forward, speed.forward), "forward for {speed:?}");
            assert!(close(body.strafe, speed.strafe), "strafe for {speed:?}");
            assert!(close(body.theta, speed.theta), "theta for {speed:?}");
        }
    }

    #[test]
    fn normalised_inverse_stays_in_unit_range() {
        let kinematics = Kinematics::new(R, L);
        let cases = [
            BodyVector::new(1.0, 0.0, 0.0),
            BodyVector::new(0.0, 1.0, 0.0),
            BodyVector::new(0.0, 0.0, 1.0),
            BodyVector::new(0.5, 0.3, 0.2),
            BodyVector::new(-0.4, -0.4, 0.2),
            BodyVector::new(0.25, -0.5, -0.25),
        ];

        for speed in cases {
            let wheels = kinematics.normalised_inverse(speed);
            for value in [wheels.right, wheels.back, wheels.left] {
                assert!(value.abs() <= 1.0 + 1e-12, "wheel {value} for {speed:?}");
            }
        }
    }

    #[test]
    fn radius_setters_refresh_coefficients() {
        let mut kinematics = Kinematics::new(1.0, 1.0);
        kinematics.set_wheel_radius(R);
        kinematics.set_chassis_radius(L);

        let wheels = kinematics.inverse(BodyVector::new(0.0, 0.0, 1.0));
        assert!(close(wheels.back, 3.0));
    }

    #[test]
    fn odometry_accumulates_forward_motion() {
        let mut pose = Pose::default();
        pose.integrate(BodyVector::new(0.25, 0.0, 0.0));
        pose.integrate(BodyVector::new(0.25, 0.0, 0.0));

        assert!(close(pose.x, 0.5));
        assert!(close(pose.y, 0.0));
        assert!(close(pose.phi, 0.0));
    }

    #[test]
    fn odometry_uses_midpoint_heading() {
        let mut pose = Pose::default();
        pose.integrate(BodyVector::new(1.0, 0.0, FRAC_PI_2));

        assert!(close(pose.x, FRAC_PI_4.cos()));
        assert!(close(pose.y, FRAC_PI_4.sin()));
        assert!(close(pose.phi, FRAC_PI_2));
    }

    #[test]
    fn odometry_keeps_phi_wrapped() {
        let mut pose = Pose::default();
        for _ in 0..100 {
            pose.integrate(BodyVector::new(0.0, 0.0, 0.5));
            assert!(pose.phi >= 0.0 && pose.phi < TAU, "phi = {}", pose.phi);
        }

        pose.integrate(BodyVector::new(0.0, 0.0, -1.0));
        assert!(pose.phi >= 0.0 && pose.phi < TAU);
    }

    #[test]
    fn shortest_arc_crosses_the_wrap() {
        assert!((shortest_arc(0.1, 6.2) - (6.1 - TAU)).abs() < 1e-12);
        assert!((shortest_arc(6.2, 0.1) - (TAU - 6.1)).abs() < 1e-12);
        assert!(close(shortest_arc(0.0, PI), PI));
        assert!(close(shortest_arc(1.0, 2.0), 1.0));
        assert!(close(shortest_arc(2.0, 1.0), -1.0));
    }
}
