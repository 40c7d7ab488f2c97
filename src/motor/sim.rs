// Simulated hardware for hosts without a power stage
//
// Implements the `hal` contracts against in-memory state. `ModelEncoder`
// closes the loop with a perfect-response motor model, which is enough to
// exercise the full control path end to end; `ManualEncoder` gives tests
// direct control over the step counter.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::hal::{Clock, Encoder, SharedClock};
use crate::motor::driver::{Direction, MotorDriver, PowerStage};
use crate::motor::wheel::STEPS_TO_RADIANS;

/// Manually advanced clock. Microseconds are the source of truth.
#[derive(Default)]
pub struct SimClock {
    micros: AtomicU64,
}

impl SimClock {
    pub fn advance_micros(&self, delta: u64) {
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: u64) {
        self.advance_micros(delta * 1000);
    }
}

impl Clock for SimClock {
    fn micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }

    fn millis(&self) -> u64 {
        self.micros() / 1000
    }
}

struct MotorState {
    direction: Direction,
    magnitude: i16,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            direction: Direction::Released,
            magnitude: 0,
        }
    }
}

/// Power stage recording the commanded direction and magnitude.
#[derive(Clone, Default)]
pub struct SimMotor {
    state: Arc<Mutex<MotorState>>,
}

impl SimMotor {
    /// Signed applied PWM, reconstructed from direction and magnitude.
    pub fn applied(&self) -> i16 {
        let state = self.state.lock().unwrap();
        match state.direction {
            Direction::Forwards => state.magnitude,
            Direction::Backwards => -state.magnitude,
            Direction::Released | Direction::Braked => 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.state.lock().unwrap().direction
    }
}

impl PowerStage for SimMotor {
    fn set_direction(&mut self, direction: Direction) {
        self.state.lock().unwrap().direction = direction;
    }

    fn set_magnitude(&mut self, magnitude: i16) {
        self.state.lock().unwrap().magnitude = magnitude;
    }
}

/// Encoder whose step counter is advanced explicitly.
#[derive(Clone, Default)]
pub struct ManualEncoder {
    steps: Arc<AtomicI64>,
}

impl ManualEncoder {
    pub fn add_steps(&self, steps: i64) {
        self.steps.fetch_add(steps, Ordering::SeqCst);
    }

    pub fn set_steps(&self, steps: i64) {
        self.steps.store(steps, Ordering::SeqCst);
    }
}

impl Encoder for ManualEncoder {
    fn read(&mut self) -> i64 {
        self.steps.load(Ordering::SeqCst)
    }
}

/// Perfect-response wheel model.
///
/// On every read the encoder integrates the currently applied PWM as an
/// angular speed of `pwm / MAX_PWM * max_speed`, i.e. the motor tracks its
/// command instantly. Fractional steps are carried over between reads.
pub struct ModelEncoder {
    motor: SimMotor,
    clock: SharedClock,
    max_speed: f64,
    last_read_us: u64,
    steps: i64,
    carry: f64,
}

impl ModelEncoder {
    pub fn new(motor: SimMotor, clock: SharedClock, max_speed: f64) -> Self {
        let last_read_us = clock.micros();
        Self {
            motor,
            clock,
            max_speed,
            last_read_us,
            steps: 0,
            carry: 0.0,
        }
    }
}

impl Encoder for ModelEncoder {
    fn read(&mut self) -> i64 {
        let now_us = self.clock.micros();
        let dt = now_us.saturating_sub(self.last_read_us) as f64 * 1e-6;
        self.last_read_us = now_us;

        let angular =
            f64::from(self.motor.applied()) / f64::from(MotorDriver::MAX_PWM) * self.max_speed;
        let exact = angular * dt / STEPS_TO_RADIANS + self.carry;
        let whole = exact.trunc();
        self.carry = exact - whole;
        self.steps += whole as i64;
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_encoder_tracks_applied_pwm() {
        let clock = Arc::new(SimClock::default());
        let motor = SimMotor::default();
        let mut encoder = ModelEncoder::new(motor.clone(), clock.clone(), 10.0);

        {
            let mut stage = motor.clone();
            stage.set_direction(Direction::Forwards);
            stage.set_magnitude(255);
        }

        let _ = encoder.read();
        clock.advance_micros(1_000_000);
        let steps = encoder.read();
        let radians = steps as f64 * STEPS_TO_RADIANS;
        assert!((radians - 10.0).abs() < 0.01);
    }

    #[test]
    fn model_encoder_integrates_backwards() {
        let clock = Arc::new(SimClock::default());
        let motor = SimMotor::default();
        let mut encoder = ModelEncoder::new(motor.clone(), clock.clone(), 10.0);

        {
            let mut stage = motor.clone();
            stage.set_direction(Direction::Backwards);
            stage.set_magnitude(255);
        }

        clock.advance_micros(500_000);
        let steps = encoder.read();
        let radians = steps as f64 * STEPS_TO_RADIANS;
        assert!((radians + 5.0).abs() < 0.01);
    }

    #[test]
    fn model_encoder_stands_still_when_released() {
        let clock = Arc::new(SimClock::default());
        let motor = SimMotor::default();
        let mut encoder = ModelEncoder::new(motor, clock.clone(), 10.0);

        clock.advance_micros(500_000);
        assert_eq!(encoder.read(), 0);
    }
}
