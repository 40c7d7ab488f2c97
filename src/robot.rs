// Top-level base coordinator
//
// One `handle` call is one control tick: collect wheel rotations, update
// odometry, ask the movement schedule for a target velocity, and push the
// resulting wheel speeds back down. Any wheel that rejects its command
// fails the tick and latches the emergency stop.

use tracing::{debug, warn};

use crate::command::{CommandFrame, CONFIG_BIT, MOVEMENT_BIT};
use crate::hal::SharedClock;
use crate::motor::kinematics::{BodyVector, Kinematics, Pose, WheelSpeeds};
use crate::motor::wheel::Wheel;
use crate::movement::{FiniteMovement, IndefiniteMovement, Movements};
use crate::params::StoredParams;

const RIGHT: usize = 0;
const BACK: usize = 1;
const LEFT: usize = 2;

pub struct Robot {
    /// Wheels in (right, back, left) order: 2, 6 and 10 o'clock seen from
    /// above with body forward at 12.
    wheels: [Wheel; 3],
    kinematics: Kinematics,
    movements: Movements,

    pose: Pose,
    /// Body displacement measured on the last tick.
    displacement: BodyVector,
    last_time_ms: u64,

    clock: SharedClock,
    emergency_stopped: bool,
}

impl Robot {
    pub fn new(
        right: Wheel,
        back: Wheel,
        left: Wheel,
        params: &StoredParams,
        clock: SharedClock,
    ) -> Self {
        let mut robot = Self {
            wheels: [right, back, left],
            kinematics: Kinematics::new(params.wheel_radius, params.robot_radius),
            movements: Movements::new(),
            pose: Pose::default(),
            displacement: BodyVector::ZERO,
            last_time_ms: 0,
            clock,
            emergency_stopped: false,
        };
        for wheel in &mut robot.wheels {
            wheel.set_max_speed(params.max_wheel_speed);
            wheel.set_pid(params.kp, params.ki, params.kd);
        }
        robot.movements.set_friction(BodyVector::new(
            params.friction_forward,
            params.friction_strafe,
            params.friction_angular,
        ));
        robot
    }

    /// Run one control tick.
    pub fn handle(&mut self) {
        let now_ms = self.clock.millis();

        let rotation = WheelSpeeds {
            right: self.wheels[RIGHT].handle(),
            back: self.wheels[BACK].handle(),
            left: self.wheels[LEFT].handle(),
        };

        self.displacement = self.kinematics.forward(rotation);
        self.pose.integrate(self.displacement);

        let delta_ms = now_ms.saturating_sub(self.last_time_ms);
        let current_speed = if delta_ms == 0 {
            BodyVector::ZERO
        } else {
            let dt = delta_ms as f64 * 0.001;
            BodyVector {
                forward: self.displacement.forward / dt,
                strafe: self.displacement.strafe / dt,
                theta: self.displacement.theta / dt,
            }
        };

        let (target, normalised) = self.movements.handle(&self.pose, &current_speed, now_ms);
        self.last_time_ms = now_ms;

        let ok = if normalised {
            let wheels = self.kinematics.normalised_inverse(target);
            self.wheels[RIGHT].set_normalised_speed(wheels.right)
                && self.wheels[BACK].set_normalised_speed(wheels.back)
                && self.wheels[LEFT].set_normalised_speed(wheels.left)
        } else {
            let wheels = self.kinematics.inverse(target);
            self.wheels[RIGHT].set_speed(wheels.right)
                && self.wheels[BACK].set_speed(wheels.back)
                && self.wheels[LEFT].set_speed(wheels.left)
        };

        if !ok {
            self.emergency_stop();
        }
    }

    /// Zero the pose. Allowed only while the last measured displacement is
    /// exactly zero on every axis.
    pub fn home(&mut self) -> bool {
        if !self.displacement.is_zero() {
            return false;
        }
        self.pose = Pose::default();
        true
    }

    /// Latch every wheel still. Recovery requires a restart.
    pub fn emergency_stop(&mut self) {
        if !self.emergency_stopped {
            warn!("emergency stop engaged");
        }
        self.emergency_stopped = true;
        for wheel in &mut self.wheels {
            wheel.set_max_speed(0.0);
        }
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stopped
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Body displacement measured on the last tick.
    pub fn displacement(&self) -> BodyVector {
        self.displacement
    }

    pub fn movements(&self) -> &Movements {
        &self.movements
    }

    /// Install the Still fallback (used by the command watchdog).
    pub fn stop(&mut self) {
        self.movements.stop();
    }

    pub fn set_wheel_radius(&mut self, radius: f64) -> bool {
        if radius <= 0.0 {
            return false;
        }
        self.kinematics.set_wheel_radius(radius);
        true
    }

    pub fn set_chassis_radius(&mut self, radius: f64) -> bool {
        if radius <= 0.0 {
            return false;
        }
        self.kinematics.set_chassis_radius(radius);
        true
    }

    pub fn set_pid_constants(&mut self, kp: f64, ki: f64, kd: f64) -> bool {
        for wheel in &mut self.wheels {
            wheel.set_pid(kp, ki, kd);
        }
        true
    }

    /// Configure the wheel speed ceiling. Rejected once the emergency stop
    /// has latched; raising the ceiling again would defeat it.
    pub fn set_max_wheel_speed(&mut self, speed: f64) -> bool {
        if self.emergency_stopped || speed < 0.0 {
            return false;
        }
        for wheel in &mut self.wheels {
            wheel.set_max_speed(speed);
        }
        true
    }

    pub fn set_friction(&mut self, friction: BodyVector) -> bool {
        if friction.forward < 0.0 || friction.strafe < 0.0 || friction.theta < 0.0 {
            return false;
        }
        self.movements.set_friction(friction);
        true
    }

    /// Dispatch a wire command. Returns the command's success flag; unknown
    /// selectors and argument-count mismatches fail without side effects.
    pub fn handle_message(&mut self, command: u8, args: &[f64]) -> bool {
        let selector = command >> 3;
        let announced = CommandFrame::announced_args(command);
        if args.len() < announced {
            return false;
        }
        let args = &args[..announced];

        if selector & MOVEMENT_BIT != 0 {
            return self.handle_movement(selector & 0b1111, args);
        }
        if selector & CONFIG_BIT != 0 {
            let sub = selector & 0b111;
            return if args.is_empty() {
                self.handle_tester(sub)
            } else {
                self.handle_setter(sub, args)
            };
        }
        self.handle_function(selector & 0b111, args)
    }

    fn handle_movement(&mut self, kind: u8, args: &[f64]) -> bool {
        debug!(kind, args = args.len(), "movement command");
        match (kind, args) {
            (0, []) => {
                self.movements.stop();
                true
            }
            (1, &[forward, strafe, theta]) => {
                self.movements
                    .set_indefinite(IndefiniteMovement::speed(forward, strafe, theta));
                true
            }
            (2, &[planar, direction, angular]) => {
                self.movements
                    .set_indefinite(IndefiniteMovement::norm_speed(planar, direction, angular));
                true
            }
            (3, &[x, y, phi, duration]) => self
                .movements
                .enqueue(FiniteMovement::space_time(x, y, phi, duration)),
            (4, &[x, y, phi, planar, angular]) => self
                .movements
                .enqueue(FiniteMovement::space_speed(x, y, phi, planar, angular)),
            (5, &[x, y, phi, planar, angular]) => {
                if !(0.0..=1.0).contains(&planar) || !(0.0..=1.0).contains(&angular) {
                    return false;
                }
                self.movements
                    .enqueue(FiniteMovement::space_norm_speed(x, y, phi, planar, angular))
            }
            (6, &[forward, strafe, theta, duration]) => self
                .movements
                .enqueue(FiniteMovement::speed_time(forward, strafe, theta, duration)),
            (7, &[planar, direction, angular, duration]) => self.movements.enqueue(
                FiniteMovement::norm_speed_time(planar, direction, angular, duration),
            ),
            _ => false,
        }
    }

    fn handle_tester(&self, sub: u8) -> bool {
        match sub {
            0 => self.displacement.is_zero(),
            1 => self.movements.has_space(),
            _ => false,
        }
    }

    fn handle_setter(&mut self, sub: u8, args: &[f64]) -> bool {
        match (sub, args) {
            (0, &[radius]) => self.set_wheel_radius(radius),
            (1, &[radius]) => self.set_chassis_radius(radius),
            (2, &[kp, ki, kd]) => self.set_pid_constants(kp, ki, kd),
            (3, &[speed]) => self.set_max_wheel_speed(speed),
            (4, &[forward, strafe, angular]) => {
                self.set_friction(BodyVector::new(forward, strafe, angular))
            }
            _ => false,
        }
    }

    fn handle_function(&mut self, sub: u8, args: &[f64]) -> bool {
        if !args.is_empty() {
            return false;
        }
        match sub {
            0 => self.home(),
            1 => {
                self.emergency_stop();
                true
            }
            2 => {
                self.movements.clear();
                true
            }
            _ => false,
        }
    }
}
