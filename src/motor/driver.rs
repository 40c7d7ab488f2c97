// Motor power stages for the omnibase wheels
//
// A power stage is the pin-level half of a motor driver: it knows how to
// encode a rotation direction and a PWM magnitude onto its output pins.
// `MotorDriver` wraps a stage and provides the signed-speed API the wheel
// controller works with.

use tracing::debug;

use crate::hal::{DigitalPin, PwmPin};

/// Rotation command for the power stage.
///
/// `Released` lets the motor spin freely, `Braked` shorts the windings to
/// hold position. `set_speed` only ever produces the first three; `Braked`
/// is reserved for explicit brake commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Released,
    Forwards,
    Backwards,
    Braked,
}

/// Pin-level realisation of one motor driver channel.
pub trait PowerStage: Send {
    /// Encode the rotation direction on the output pins.
    fn set_direction(&mut self, direction: Direction);

    /// Apply the PWM magnitude. `magnitude` is in `[0, MAX_PWM]`.
    fn set_magnitude(&mut self, magnitude: i16);
}

/// Signed-speed front end over a [`PowerStage`].
pub struct MotorDriver {
    stage: Box<dyn PowerStage>,
    speed: i16,
}

impl MotorDriver {
    /// Highest PWM magnitude; feasible speeds are `[-MAX_PWM, MAX_PWM]`.
    pub const MAX_PWM: i16 = 255;

    /// PWM value for a stopped motor.
    pub const STILL: i16 = 0;

    pub fn new(stage: Box<dyn PowerStage>) -> Self {
        let mut driver = Self { stage, speed: 0 };
        driver.set_speed(Self::STILL);
        driver
    }

    /// Set the signed motor speed.
    ///
    /// The argument is clamped to `[-MAX_PWM, MAX_PWM]`; the sign selects
    /// the direction (zero releases the motor) and the magnitude is written
    /// to the stage.
    pub fn set_speed(&mut self, speed: i16) {
        let speed = speed.clamp(-Self::MAX_PWM, Self::MAX_PWM);
        self.speed = speed;

        let direction = match speed {
            0 => Direction::Released,
            s if s > 0 => Direction::Forwards,
            _ => Direction::Backwards,
        };

        self.stage.set_direction(direction);
        self.stage.set_magnitude(speed.abs());
    }

    /// Engine-brake at the cached magnitude.
    pub fn brake(&mut self) {
        debug!("braking motor at magnitude {}", self.speed.abs());
        self.stage.set_direction(Direction::Braked);
        self.stage.set_magnitude(self.speed.abs());
    }

    /// Last speed written, in `[-MAX_PWM, MAX_PWM]`.
    pub fn speed(&self) -> i16 {
        self.speed
    }
}

/// H-bridge driven by two PWM inputs (one per half-bridge).
///
/// Forwards puts the magnitude on pin A, backwards on pin B, released holds
/// both low and braked drives both with the magnitude.
pub struct DualPwmStage<A: PwmPin, B: PwmPin> {
    a: A,
    b: B,
    a_active: bool,
    b_active: bool,
}

impl<A: PwmPin, B: PwmPin> DualPwmStage<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            a_active: false,
            b_active: false,
        }
    }
}

impl<A: PwmPin, B: PwmPin> PowerStage for DualPwmStage<A, B> {
    fn set_direction(&mut self, direction: Direction) {
        let (a_active, b_active) = match direction {
            Direction::Released => (false, false),
            Direction::Forwards => (true, false),
            Direction::Backwards => (false, true),
            Direction::Braked => (true, true),
        };
        self.a_active = a_active;
        self.b_active = b_active;
    }

    fn set_magnitude(&mut self, magnitude: i16) {
        let duty = magnitude.clamp(0, MotorDriver::MAX_PWM) as u8;
        self.a.write(if self.a_active { duty } else { 0 });
        self.b.write(if self.b_active { duty } else { 0 });
    }
}

/// Driver with one PWM input and two digital direction inputs.
///
/// The PWM pin always carries the magnitude; (A, B) encode the direction as
/// (0,0) released, (1,0) forwards, (0,1) backwards, (1,1) braked.
pub struct PwmDirStage<P: PwmPin, A: DigitalPin, B: DigitalPin> {
    pwm: P,
    a: A,
    b: B,
}

impl<P: PwmPin, A: DigitalPin, B: DigitalPin> PwmDirStage<P, A, B> {
    pub fn new(pwm: P, a: A, b: B) -> Self {
        Self { pwm, a, b }
    }
}

impl<P: PwmPin, A: DigitalPin, B: DigitalPin> PowerStage for PwmDirStage<P, A, B> {
    fn set_direction(&mut self, direction: Direction) {
        let (a_high, b_high) = match direction {
            Direction::Released => (false, false),
            Direction::Forwards => (true, false),
            Direction::Backwards => (false, true),
            Direction::Braked => (true, true),
        };
        self.a.write(a_high);
        self.b.write(b_high);
    }

    fn set_magnitude(&mut self, magnitude: i16) {
        self.pwm.write(magnitude.clamp(0, MotorDriver::MAX_PWM) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordedPin(Arc<Mutex<u8>>);

    impl PwmPin for RecordedPin {
        fn write(&mut self, duty: u8) {
            *self.0.lock().unwrap() = duty;
        }
    }

    #[derive(Clone, Default)]
    struct RecordedDigital(Arc<Mutex<bool>>);

    impl DigitalPin for RecordedDigital {
        fn write(&mut self, high: bool) {
            *self.0.lock().unwrap() = high;
        }
    }

    fn duty(pin: &RecordedPin) -> u8 {
        *pin.0.lock().unwrap()
    }

    #[test]
    fn dual_pwm_routes_magnitude_by_direction() {
        let (a, b) = (RecordedPin::default(), RecordedPin::default());
        let mut driver = MotorDriver::new(Box::new(DualPwmStage::new(a.clone(), b.clone())));

        driver.set_speed(100);
        assert_eq!((duty(&a), duty(&b)), (100, 0));

        driver.set_speed(-80);
        assert_eq!((duty(&a), duty(&b)), (0, 80));

        driver.set_speed(0);
        assert_eq!((duty(&a), duty(&b)), (0, 0));
    }

    #[test]
    fn dual_pwm_brake_drives_both_halves() {
        let (a, b) = (RecordedPin::default(), RecordedPin::default());
        let mut driver = MotorDriver::new(Box::new(DualPwmStage::new(a.clone(), b.clone())));

        driver.set_speed(60);
        driver.brake();
        assert_eq!((duty(&a), duty(&b)), (60, 60));
    }

    #[test]
    fn pwm_dir_encodes_direction_on_digital_pins() {
        let pwm = RecordedPin::default();
        let (a, b) = (RecordedDigital::default(), RecordedDigital::default());
        let mut driver = MotorDriver::new(Box::new(PwmDirStage::new(
            pwm.clone(),
            a.clone(),
            b.clone(),
        )));

        driver.set_speed(42);
        assert_eq!(duty(&pwm), 42);
        assert!(*a.0.lock().unwrap());
        assert!(!*b.0.lock().unwrap());

        driver.set_speed(-42);
        assert_eq!(duty(&pwm), 42);
        assert!(!*a.0.lock().unwrap());
        assert!(*b.0.lock().unwrap());
    }

    #[test]
    fn set_speed_clamps_and_caches() {
        let (a, b) = (RecordedPin::default(), RecordedPin::default());
        let mut driver = MotorDriver::new(Box::new(DualPwmStage::new(a.clone(), b)));

        driver.set_speed(1000);
        assert_eq!(driver.speed(), MotorDriver::MAX_PWM);
        assert_eq!(duty(&a), 255);

        driver.set_speed(-1000);
        assert_eq!(driver.speed(), -MotorDriver::MAX_PWM);
    }
}
