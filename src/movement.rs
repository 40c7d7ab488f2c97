// Movement primitives and the schedule that executes them
//
// A movement is either finite (runs until its completion test passes, then
// is dequeued) or indefinite (runs until replaced). The schedule holds a
// bounded FIFO of finite movements plus a single indefinite fallback; each
// tick it emits one target body velocity, tagged absolute or normalised.

use tracing::warn;

use crate::motor::kinematics::{shortest_arc, BodyVector, Pose};

/// Capacity of the finite-movement schedule.
pub const MAX_MOVEMENTS: usize = 10;

/// Completion tolerance on forward/strafe displacement, metres.
pub const LINEAR_TOLERANCE: f64 = 0.01;

/// Completion tolerance on angular displacement, radians (about 1°).
pub const ANGULAR_TOLERANCE: f64 = 0.017_453_3;

const MILLIS: f64 = 0.001;
const TO_MILLIS: f64 = 1000.0;

/// Signed rebalancing of a pair of normalised magnitudes.
///
/// Returns `sign(m) * m² / (|m| + |other|)`, which is never larger in
/// magnitude than `m` itself; applying it to both members of a pair makes
/// the rebalanced magnitudes sum to at most 1, keeping the combined wheel
/// demand inside the normalised range.
pub fn rebalance(magnitude: f64, other: f64) -> f64 {
    let total = magnitude.abs() + other.abs();
    if total == 0.0 {
        0.0
    } else {
        magnitude * magnitude.abs() / total
    }
}

/// World-frame offset from `pose` to `target`, rotated into the body frame.
/// Theta is the signed shortest arc.
fn displacement_to(target: &Pose, pose: &Pose) -> BodyVector {
    let dx = target.x - pose.x;
    let dy = target.y - pose.y;
    let (sin, cos) = pose.phi.sin_cos();
    BodyVector {
        forward: dx * cos + dy * sin,
        strafe: -dx * sin + dy * cos,
        theta: shortest_arc(pose.phi, target.phi),
    }
}

/// Start-of-movement timestamp; ms 0 is reserved as "not started yet", so a
/// clock that happens to read 0 is recorded as 1.
fn start_timestamp(now_ms: u64) -> u64 {
    now_ms.max(1)
}

#[derive(Debug, Clone, Copy, Default)]
struct AxisFinished {
    forward: bool,
    strafe: bool,
    theta: bool,
}

impl AxisFinished {
    fn all(&self) -> bool {
        self.forward && self.strafe && self.theta
    }
}

/// Per-axis completion test: done when the remaining displacement is inside
/// the larger of the braking space and the fixed tolerance.
fn check_axes(displacement: &BodyVector, braking_space: &BodyVector) -> AxisFinished {
    let within = |d: f64, braking: f64, tolerance: f64| d.abs() <= braking.max(tolerance);
    AxisFinished {
        forward: within(displacement.forward, braking_space.forward, LINEAR_TOLERANCE),
        strafe: within(displacement.strafe, braking_space.strafe, LINEAR_TOLERANCE),
        theta: within(displacement.theta, braking_space.theta, ANGULAR_TOLERANCE),
    }
}

/// A movement that runs until replaced.
#[derive(Debug, Clone)]
pub enum IndefiniteMovement {
    /// Zero velocity; the default fallback.
    Still,
    /// Constant absolute body velocity.
    Speed(BodyVector),
    /// Constant normalised velocity, stored already rebalanced and
    /// decomposed into body components.
    NormSpeed(BodyVector),
}

impl IndefiniteMovement {
    /// Constant body velocity (m/s, m/s, rad/s).
    pub fn speed(forward: f64, strafe: f64, theta: f64) -> Self {
        Self::Speed(BodyVector::new(forward, strafe, theta))
    }

    /// Constant normalised velocity from a planar magnitude, a planar
    /// direction (radians from body forward) and an angular magnitude.
    pub fn norm_speed(planar: f64, direction: f64, angular: f64) -> Self {
        Self::NormSpeed(decompose_norm(planar, direction, angular))
    }

    /// True for the [`IndefiniteMovement::Still`] variant.
    pub fn is_still(&self) -> bool {
        matches!(self, Self::Still)
    }

    fn target_speed(&self) -> (BodyVector, bool) {
        match self {
            Self::Still => (BodyVector::ZERO, false),
            Self::Speed(speed) => (*speed, false),
            Self::NormSpeed(speed) => (*speed, true),
        }
    }
}

/// Rebalance a (planar, angular) pair and decompose the planar part along
/// `direction`.
fn decompose_norm(planar: f64, direction: f64, angular: f64) -> BodyVector {
    let planar_balanced = rebalance(planar, angular);
    let angular_balanced = rebalance(angular, planar);
    BodyVector {
        forward: planar_balanced * direction.cos(),
        strafe: planar_balanced * direction.sin(),
        theta: angular_balanced,
    }
}

/// A movement with a completion condition.
#[derive(Debug, Clone)]
pub enum FiniteMovement {
    /// Reach a world pose within a fixed duration; speeds are chosen so
    /// every component arrives as the time runs out.
    SpaceTime {
        target: Pose,
        duration: f64,
        start_ms: u64,
        displacement: BodyVector,
        finished: AxisFinishedState,
    },
    /// Reach a world pose at fixed speed magnitudes.
    SpaceSpeed {
        target: Pose,
        planar_speed: f64,
        angular_speed: f64,
        displacement: BodyVector,
        finished: AxisFinishedState,
    },
    /// Reach a world pose at fixed normalised magnitudes.
    SpaceNormSpeed {
        target: Pose,
        planar: f64,
        angular: f64,
        displacement: BodyVector,
        finished: AxisFinishedState,
    },
    /// Hold an absolute body velocity for a duration.
    SpeedTime {
        speed: BodyVector,
        duration: f64,
        start_ms: u64,
    },
    /// Hold a normalised body velocity for a duration.
    NormSpeedTime {
        speed: BodyVector,
        duration: f64,
        start_ms: u64,
    },
}

/// Wrapper so the enum stays constructible from outside while the flags
/// remain an implementation detail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisFinishedState(AxisFinished);

impl FiniteMovement {
    /// Target pose within `duration` seconds.
    pub fn space_time(x: f64, y: f64, phi: f64, duration: f64) -> Self {
        Self::SpaceTime {
            target: Pose { x, y, phi },
            duration,
            start_ms: 0,
            displacement: BodyVector::ZERO,
            finished: AxisFinishedState::default(),
        }
    }

    /// Target pose at the given planar (m/s) and angular (rad/s) magnitudes.
    pub fn space_speed(x: f64, y: f64, phi: f64, planar_speed: f64, angular_speed: f64) -> Self {
        Self::SpaceSpeed {
            target: Pose { x, y, phi },
            planar_speed,
            angular_speed,
            displacement: BodyVector::ZERO,
            finished: AxisFinishedState::default(),
        }
    }

    /// Target pose at the given normalised magnitudes (rebalanced here).
    pub fn space_norm_speed(x: f64, y: f64, phi: f64, planar: f64, angular: f64) -> Self {
        Self::SpaceNormSpeed {
            target: Pose { x, y, phi },
            planar: rebalance(planar, angular),
            angular: rebalance(angular, planar),
            displacement: BodyVector::ZERO,
            finished: AxisFinishedState::default(),
        }
    }

    /// Absolute body velocity for `duration` seconds.
    pub fn speed_time(forward: f64, strafe: f64, theta: f64, duration: f64) -> Self {
        Self::SpeedTime {
            speed: BodyVector::new(forward, strafe, theta),
            duration,
            start_ms: 0,
        }
    }

    /// Normalised velocity (planar magnitude, planar direction, angular
    /// magnitude) for `duration` seconds.
    pub fn norm_speed_time(planar: f64, direction: f64, angular: f64, duration: f64) -> Self {
        Self::NormSpeedTime {
            speed: decompose_norm(planar, direction, angular),
            duration,
            start_ms: 0,
        }
    }

    /// Update the completion state for this tick. Records the start time on
    /// the first call. Returns true once the movement is done.
    fn is_finished(&mut self, pose: &Pose, braking_space: &BodyVector, now_ms: u64) -> bool {
        match self {
            Self::SpaceTime {
                target,
                duration,
                start_ms,
                displacement,
                finished,
            } => {
                if *start_ms == 0 {
                    *start_ms = start_timestamp(now_ms);
                }
                *displacement = displacement_to(target, pose);
                finished.0 = check_axes(displacement, braking_space);

                let elapsed = now_ms.saturating_sub(*start_ms) as f64;
                elapsed >= *duration * TO_MILLIS || finished.0.all()
            }
            Self::SpaceSpeed {
                target,
                displacement,
                finished,
                ..
            }
            | Self::SpaceNormSpeed {
                target,
                displacement,
                finished,
                ..
            } => {
                *displacement = displacement_to(target, pose);
                finished.0 = check_axes(displacement, braking_space);
                finished.0.all()
            }
            Self::SpeedTime {
                duration, start_ms, ..
            }
            | Self::NormSpeedTime {
                duration, start_ms, ..
            } => {
                if *start_ms == 0 {
                    *start_ms = start_timestamp(now_ms);
                }
                now_ms.saturating_sub(*start_ms) as f64 >= *duration * TO_MILLIS
            }
        }
    }

    /// Target velocity for this tick; the flag marks normalised output.
    /// Relies on `is_finished` having refreshed the displacement first.
    fn speed(&self, now_ms: u64) -> (BodyVector, bool) {
        match self {
            Self::SpaceTime {
                duration,
                start_ms,
                displacement,
                finished,
                ..
            } => {
                let end_ms = *start_ms as f64 + *duration * TO_MILLIS;
                let dt = (end_ms - now_ms as f64) * MILLIS;
                if dt <= 0.0 {
                    return (BodyVector::ZERO, false);
                }
                let axis = |done: bool, d: f64| if done { 0.0 } else { d / dt };
                (
                    BodyVector {
                        forward: axis(finished.0.forward, displacement.forward),
                        strafe: axis(finished.0.strafe, displacement.strafe),
                        theta: axis(finished.0.theta, displacement.theta),
                    },
                    false,
                )
            }
            Self::SpaceSpeed {
                planar_speed,
                angular_speed,
                displacement,
                finished,
                ..
            } => (
                toward_target(displacement, &finished.0, *planar_speed, *angular_speed),
                false,
            ),
            Self::SpaceNormSpeed {
                planar,
                angular,
                displacement,
                finished,
                ..
            } => (
                toward_target(displacement, &finished.0, *planar, *angular),
                true,
            ),
            Self::SpeedTime { speed, .. } => (*speed, false),
            Self::NormSpeedTime { speed, .. } => (*speed, true),
        }
    }
}

/// Velocity vector pointing along the planar displacement with magnitude
/// `planar_magnitude`, plus `angular_magnitude` with the sign of the
/// remaining rotation. Finished axes emit zero.
fn toward_target(
    displacement: &BodyVector,
    finished: &AxisFinished,
    planar_magnitude: f64,
    angular_magnitude: f64,
) -> BodyVector {
    let planar = displacement.forward.hypot(displacement.strafe);
    let factor = if planar == 0.0 {
        0.0
    } else {
        planar_magnitude / planar
    };
    let angular_sign = if displacement.theta >= 0.0 { 1.0 } else { -1.0 };
    BodyVector {
        forward: if finished.forward {
            0.0
        } else {
            displacement.forward * factor
        },
        strafe: if finished.strafe {
            0.0
        } else {
            displacement.strafe * factor
        },
        theta: if finished.theta {
            0.0
        } else {
            angular_sign * angular_magnitude
        },
    }
}

/// Bounded schedule of finite movements plus the indefinite fallback.
pub struct Movements {
    schedule: Vec<FiniteMovement>,
    fallback: IndefiniteMovement,
    friction: BodyVector,
}

impl Default for Movements {
    fn default() -> Self {
        Self::new()
    }
}

impl Movements {
    pub fn new() -> Self {
        Self {
            schedule: Vec::with_capacity(MAX_MOVEMENTS),
            fallback: IndefiniteMovement::Still,
            friction: BodyVector::ZERO,
        }
    }

    /// Install [`IndefiniteMovement::Still`] as the fallback. Idempotent.
    pub fn stop(&mut self) {
        self.fallback = IndefiniteMovement::Still;
    }

    /// Replace the indefinite fallback.
    pub fn set_indefinite(&mut self, movement: IndefiniteMovement) {
        self.fallback = movement;
    }

    /// Append a finite movement.
    ///
    /// Installs Still as the fallback first, so that when the schedule
    /// drains the base comes to rest. Returns `false` (dropping the
    /// movement) when the schedule is full.
    pub fn enqueue(&mut self, movement: FiniteMovement) -> bool {
        self.stop();
        if self.schedule.len() >= MAX_MOVEMENTS {
            warn!("movement schedule full, discarding new movement");
            return false;
        }
        self.schedule.push(movement);
        true
    }

    /// Drop every scheduled finite movement.
    pub fn clear(&mut self) {
        self.schedule.clear();
    }

    /// True while the schedule can accept another finite movement.
    pub fn has_space(&self) -> bool {
        self.schedule.len() < MAX_MOVEMENTS
    }

    /// Number of scheduled finite movements.
    pub fn scheduled(&self) -> usize {
        self.schedule.len()
    }

    /// True when no finite movement is queued and the fallback is Still.
    pub fn is_idle(&self) -> bool {
        self.schedule.is_empty() && self.fallback.is_still()
    }

    /// Per-axis friction coefficients for the braking-space model.
    pub fn set_friction(&mut self, friction: BodyVector) {
        self.friction = friction;
    }

    /// Emit the target velocity for this tick.
    ///
    /// Advances past any completed head movements first; the returned flag
    /// marks the vector as normalised.
    pub fn handle(
        &mut self,
        pose: &Pose,
        current_speed: &BodyVector,
        now_ms: u64,
    ) -> (BodyVector, bool) {
        if self.schedule.is_empty() {
            return self.fallback.target_speed();
        }

        // Braking space grows with the square of the current speed.
        let braking_space = BodyVector {
            forward: self.friction.forward * current_speed.forward * current_speed.forward,
            strafe: self.friction.strafe * current_speed.strafe * current_speed.strafe,
            theta: self.friction.theta * current_speed.theta * current_speed.theta,
        };

        while let Some(head) = self.schedule.first_mut() {
            if head.is_finished(pose, &braking_space, now_ms) {
                self.schedule.remove(0);
            } else {
                break;
            }
        }

        match self.schedule.first() {
            Some(head) => head.speed(now_ms),
            None => self.fallback.target_speed(),
        }
    }
}
