// Closed-loop wheel controller
//
// Each wheel owns one motor driver and one encoder and runs a PID loop that
// drives the measured angular velocity toward the requested one. The error
// is computed in PWM units so the gains are dimensionless with respect to
// the wheel geometry.

use tracing::warn;

use crate::hal::{Encoder, SharedClock};
use crate::motor::driver::MotorDriver;

/// Default proportional gain.
pub const DEFAULT_KP: f64 = 1.4;
/// Default integral gain.
pub const DEFAULT_KI: f64 = 0.5;
/// Default derivative gain.
pub const DEFAULT_KD: f64 = 0.8;

/// Encoder steps per encoder shaft revolution.
pub const STEPS_PER_ENCODER_REVOLUTION: u32 = 64;

/// Encoder revolutions per wheel revolution (the motor gear ratio).
pub const MOTOR_GEAR_RATIO: u32 = 30;

/// Wheel radians per encoder step.
pub const STEPS_TO_RADIANS: f64 =
    std::f64::consts::TAU / (STEPS_PER_ENCODER_REVOLUTION * MOTOR_GEAR_RATIO) as f64;

const MICROS: f64 = 1e-6;

/// One driven wheel: motor driver + encoder + PID state.
///
/// A freshly constructed wheel has `max_speed = 0` and refuses any non-zero
/// speed request until [`Wheel::set_max_speed`] configures it. Setting the
/// maximum speed back to zero is the emergency-stop primitive.
pub struct Wheel {
    driver: MotorDriver,
    encoder: Box<dyn Encoder>,
    clock: SharedClock,

    /// Maximum angular speed in rad/s; 0 means the wheel is latched still.
    max_speed: f64,

    kp: f64,
    ki: f64,
    kd: f64,

    last_update_us: u64,
    last_encoder: i64,

    /// Requested speed as a PWM value in `[-MAX_PWM, MAX_PWM]`.
    target_pwm: i16,

    /// Measured angular speed in rad/s.
    actual_speed: f64,

    last_error: f64,
    cumulative_error: f64,
}

impl Wheel {
    pub fn new(driver: MotorDriver, mut encoder: Box<dyn Encoder>, clock: SharedClock) -> Self {
        let last_encoder = encoder.read();
        let last_update_us = clock.micros();
        Self {
            driver,
            encoder,
            clock,
            max_speed: 0.0,
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
            last_update_us,
            last_encoder,
            target_pwm: MotorDriver::STILL,
            actual_speed: 0.0,
            last_error: 0.0,
            cumulative_error: 0.0,
        }
    }

    /// Replace the PID gains.
    pub fn set_pid(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Restore the default PID gains.
    pub fn set_default_pid(&mut self) {
        self.set_pid(DEFAULT_KP, DEFAULT_KI, DEFAULT_KD);
    }

    /// Configure the maximum angular speed in rad/s.
    ///
    /// A value of zero (or below) stops the wheel immediately, zeroes the
    /// target and latches the controller: any later non-zero request fails
    /// until a positive maximum is configured again.
    pub fn set_max_speed(&mut self, max_speed: f64) {
        if max_speed <= 0.0 {
            if max_speed < 0.0 {
                warn!("negative max wheel speed treated as stop");
            }
            self.max_speed = 0.0;
            self.target_pwm = MotorDriver::STILL;
            self.driver.set_speed(MotorDriver::STILL);
        } else {
            self.max_speed = max_speed;
        }
    }

    /// Request an angular speed in rad/s.
    ///
    /// Returns `false` if the wheel is latched (`max_speed == 0`) and the
    /// request is non-zero, or if the request exceeds the maximum speed.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if self.max_speed == 0.0 {
            return self.set_normalised_speed(if speed == 0.0 { 0.0 } else { speed.signum() });
        }
        self.set_normalised_speed(speed / self.max_speed)
    }

    /// Request a speed as a fraction of the maximum, in `[-1, 1]`.
    pub fn set_normalised_speed(&mut self, normalised: f64) -> bool {
        if normalised != 0.0 && self.max_speed == 0.0 {
            return false;
        }
        if normalised > 1.0 || normalised < -1.0 {
            return false;
        }
        self.target_pwm = normalised_to_pwm(normalised);
        true
    }

    /// Run one control iteration.
    ///
    /// Reads the encoder, updates the measured speed, runs the PID and
    /// writes the resulting PWM to the driver. Returns the radians the wheel
    /// rotated since the previous call.
    pub fn handle(&mut self) -> f64 {
        let now_us = self.clock.micros();
        let encoder_value = self.encoder.read();
        let delta_steps = encoder_value - self.last_encoder;
        self.last_encoder = encoder_value;

        let delta_us = now_us.saturating_sub(self.last_update_us);
        if delta_us == 0 {
            // Called twice within the same microsecond; nothing to control.
            return delta_steps as f64 * STEPS_TO_RADIANS;
        }
        let dt = delta_us as f64 * MICROS;

        self.actual_speed = STEPS_TO_RADIANS * delta_steps as f64 / dt;

        let output = self.update_pid(dt);
        if self.max_speed == 0.0 {
            self.driver.set_speed(MotorDriver::STILL);
        } else {
            self.driver.set_speed(output);
        }
        self.last_update_us = now_us;

        delta_steps as f64 * STEPS_TO_RADIANS
    }

    /// Measured angular speed in rad/s, from the last `handle` call.
    pub fn speed(&self) -> f64 {
        self.actual_speed
    }

    /// Current target as a PWM value.
    pub fn target_pwm(&self) -> i16 {
        self.target_pwm
    }

    /// PWM currently applied to the motor driver.
    pub fn applied_pwm(&self) -> i16 {
        self.driver.speed()
    }

    /// Configured maximum angular speed in rad/s.
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn update_pid(&mut self, dt: f64) -> i16 {
        let error = f64::from(self.target_pwm) - f64::from(self.angular_to_pwm(self.actual_speed));
        self.cumulative_error += error * dt;
        let derivative = (error - self.last_error) / dt;
        let output = self.kp * error + self.ki * self.cumulative_error + self.kd * derivative;
        self.last_error = error;
        clamp_pwm(output)
    }

    /// Theoretical PWM value for an angular speed, at the configured maximum.
    fn angular_to_pwm(&self, angular: f64) -> i16 {
        if self.max_speed == 0.0 {
            return if angular == 0.0 {
                0
            } else if angular > 0.0 {
                MotorDriver::MAX_PWM
            } else {
                -MotorDriver::MAX_PWM
            };
        }
        (angular * f64::from(MotorDriver::MAX_PWM) / self.max_speed).round() as i16
    }
}

fn normalised_to_pwm(normalised: f64) -> i16 {
    clamp_pwm(normalised * f64::from(MotorDriver::MAX_PWM))
}

fn clamp_pwm(value: f64) -> i16 {
    (value.round() as i16).clamp(-MotorDriver::MAX_PWM, MotorDriver::MAX_PWM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{ManualEncoder, SimClock, SimMotor};
    use std::sync::Arc;

    fn wheel() -> (Wheel, SimMotor, ManualEncoder, Arc<SimClock>) {
        let motor = SimMotor::default();
        let encoder = ManualEncoder::default();
        let clock = Arc::new(SimClock::default());
        let wheel = Wheel::new(
            MotorDriver::new(Box::new(motor.clone())),
            Box::new(encoder.clone()),
            clock.clone(),
        );
        (wheel, motor, encoder, clock)
    }

    #[test]
    fn fresh_wheel_rejects_any_motion() {
        let (mut wheel, _, _, _) = wheel();
        assert!(!wheel.set_speed(1.0));
        assert!(!wheel.set_normalised_speed(0.1));
        assert!(wheel.set_speed(0.0));
        assert!(wheel.set_normalised_speed(0.0));
    }

    #[test]
    fn normalised_speed_range_check() {
        let (mut wheel, _, _, _) = wheel();
        wheel.set_max_speed(10.0);
        assert!(wheel.set_normalised_speed(1.0));
        assert!(wheel.set_normalised_speed(-1.0));
        assert!(!wheel.set_normalised_speed(1.01));
        assert!(!wheel.set_normalised_speed(-1.01));
    }

    #[test]
    fn set_speed_converts_to_pwm_target() {
        let (mut wheel, _, _, _) = wheel();
        wheel.set_max_speed(10.0);
        assert!(wheel.set_speed(5.0));
        assert_eq!(wheel.target_pwm(), 128); // round(0.5 * 255)
        assert!(wheel.set_speed(-10.0));
        assert_eq!(wheel.target_pwm(), -255);
        assert!(!wheel.set_speed(10.5));
    }

    #[test]
    fn handle_reports_rotation_in_radians() {
        let (mut wheel, _, encoder, clock) = wheel();
        wheel.set_max_speed(10.0);

        clock.advance_micros(100_000);
        encoder.add_steps(1920); // one full wheel revolution
        let radians = wheel.handle();
        assert!((radians - std::f64::consts::TAU).abs() < 1e-9);
        assert!((wheel.speed() - std::f64::consts::TAU / 0.1).abs() < 1e-6);
    }

    #[test]
    fn pid_output_follows_error() {
        let (mut wheel, motor, _, clock) = wheel();
        wheel.set_max_speed(10.0);
        wheel.set_pid(1.0, 0.0, 0.0);
        assert!(wheel.set_speed(5.0)); // target 128 PWM

        clock.advance_micros(10_000);
        wheel.handle(); // measured 0 -> error 128 -> proportional output 128
        assert_eq!(motor.applied(), 128);
        assert_eq!(wheel.applied_pwm(), 128);
    }

    #[test]
    fn pid_output_is_clamped() {
        let (mut wheel, motor, _, clock) = wheel();
        wheel.set_max_speed(10.0);
        assert!(wheel.set_speed(10.0)); // full-scale target with default gains

        clock.advance_micros(10_000);
        wheel.handle();
        assert_eq!(motor.applied(), 255);
    }

    #[test]
    fn latched_wheel_always_writes_still() {
        let (mut wheel, motor, encoder, clock) = wheel();
        wheel.set_max_speed(10.0);
        assert!(wheel.set_speed(5.0));

        clock.advance_micros(10_000);
        wheel.handle();
        assert_ne!(motor.applied(), 0);

        wheel.set_max_speed(0.0);
        assert_eq!(motor.applied(), 0);
        assert!(!wheel.set_speed(1.0));

        // The wheel may still be coasting; handle keeps commanding STILL and
        // keeps reporting the measured rotation.
        clock.advance_micros(10_000);
        encoder.add_steps(10);
        let radians = wheel.handle();
        assert!(radians > 0.0);
        assert_eq!(motor.applied(), 0);
    }

    #[test]
    fn zero_delta_time_performs_no_update() {
        let (mut wheel, motor, encoder, _) = wheel();
        wheel.set_max_speed(10.0);
        assert!(wheel.set_speed(5.0));

        encoder.add_steps(3);
        let radians = wheel.handle();
        assert!((radians - 3.0 * STEPS_TO_RADIANS).abs() < 1e-12);
        assert_eq!(motor.applied(), 0); // no PID write happened
    }
}
