// Wheel-level control for the omnibase
//
// Provides:
// - Motor power-stage abstraction (dual-PWM and PWM+direction H-bridges)
// - Per-wheel PID against an incremental encoder
// - Body <-> wheel kinematics and pose odometry
// - Simulated hardware for hosts and tests

pub mod driver;
pub mod kinematics;
pub mod sim;
pub mod wheel;

pub use driver::{Direction, DualPwmStage, MotorDriver, PowerStage, PwmDirStage};
pub use kinematics::{BodyVector, Kinematics, Pose, WheelSpeeds};
pub use wheel::Wheel;
