// Motion-control runtime for a three-wheel holonomic (kiwi-drive) base
//
// The core is a synchronous control loop: wheel PID -> forward kinematics
// -> odometry -> movement schedule -> inverse kinematics, coordinated by
// `robot::Robot`. The async `runtime` wraps it with Zenoh transport, a
// fixed tick rate and a command watchdog.

pub mod command;
pub mod config;
pub mod hal;
pub mod messages;
pub mod motor;
pub mod movement;
pub mod params;
pub mod robot;
pub mod runtime;
