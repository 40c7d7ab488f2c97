// Hardware contracts for the base: output pins, encoders and the clock.
//
// The control core never touches a real peripheral directly; everything
// below is implemented by a platform adapter (or by `motor::sim` on hosts
// without hardware). Pins are expected to already be configured as outputs
// by the adapter that constructs them.

use std::sync::Arc;
use std::time::Instant;

/// A pulse-width-modulated output pin. Duty cycle 0..=255.
pub trait PwmPin: Send {
    fn write(&mut self, duty: u8);
}

/// A two-state digital output pin.
pub trait DigitalPin: Send {
    fn write(&mut self, high: bool);
}

/// An incremental encoder exposing a monotonic step counter.
///
/// The counter may be populated by a hardware interrupt; reads are assumed
/// atomic with respect to the control loop. Wraparound of any underlying
/// narrow counter must be absorbed by the implementor so that one tick never
/// observes a false large delta.
pub trait Encoder: Send {
    fn read(&mut self) -> i64;
}

/// Monotonic time source, shared by the wheels (µs) and the scheduler (ms).
pub trait Clock: Send + Sync {
    fn micros(&self) -> u64;
    fn millis(&self) -> u64;
}

/// Shared handle to the clock.
pub type SharedClock = Arc<dyn Clock>;

/// Host clock backed by `std::time::Instant`.
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
