// Fixed-rate control loop with command transport and watchdog
//
// Commands arrive as binary frames over Zenoh and are dispatched to the
// robot; the robot ticks at LOOP_HZ regardless of traffic. A watchdog
// stills any indefinite course when commands stop arriving, so a crashed
// teleop cannot leave the base drifting; queued finite movements are
// self-terminating and are left to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use crate::command::CommandFrame;
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, PARAMS_OFFSET, PARAMS_PATH, TOPIC_CMD_BASE, TOPIC_HEALTH, TOPIC_RT_POSE,
};
use crate::hal::{MonotonicClock, SharedClock};
use crate::messages::{PoseUpdate, RuntimeHealth};
use crate::motor::driver::MotorDriver;
use crate::motor::sim::{ModelEncoder, SimMotor};
use crate::motor::wheel::Wheel;
use crate::params::StoredParams;
use crate::robot::Robot;

pub struct Runtime {
    robot: Robot,
    cmd_received_at: Instant,
    cmd_seen: bool,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(robot: Robot) -> Self {
        Self {
            robot,
            cmd_received_at: Instant::now(),
            cmd_seen: false,
            health: RuntimeHealth::CmdStale, // stale until the first command
        }
    }

    /// Dispatch one decoded command frame.
    fn on_frame(&mut self, frame: CommandFrame) {
        if self.robot.handle_message(frame.command, &frame.args) {
            self.cmd_received_at = Instant::now();
            self.cmd_seen = true;
        } else {
            warn!(command = frame.command, "command rejected");
        }
    }

    /// Still an indefinite course once commands stop arriving.
    fn watchdog(&mut self) {
        let stale = !self.cmd_seen || self.cmd_received_at.elapsed() > CMD_TIMEOUT;
        if stale
            && self.robot.movements().scheduled() == 0
            && !self.robot.movements().is_idle()
        {
            warn!("commands stale, stilling indefinite course");
            self.robot.stop();
        }
    }

    fn update_health(&mut self) {
        self.health = if self.robot.is_emergency_stopped() {
            RuntimeHealth::EmergencyStop
        } else if !self.cmd_seen || self.cmd_received_at.elapsed() > CMD_TIMEOUT {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }
}

/// Build a robot wired to the simulated hardware bank. The host has no
/// power stage, so the perfect-response model closes the loop instead.
pub fn simulated_robot(params: &StoredParams) -> Robot {
    let clock: SharedClock = Arc::new(MonotonicClock::new());
    let wheel = || {
        let motor = SimMotor::default();
        let encoder = ModelEncoder::new(motor.clone(), clock.clone(), params.max_wheel_speed);
        Wheel::new(
            MotorDriver::new(Box::new(motor)),
            Box::new(encoder),
            clock.clone(),
        )
    };
    let (right, back, left) = (wheel(), wheel(), wheel());
    Robot::new(right, back, left, params, clock)
}

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_pose = session.declare_publisher(TOPIC_RT_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let params = match StoredParams::load(std::path::Path::new(PARAMS_PATH), PARAMS_OFFSET) {
        Ok(params) => {
            info!("Loaded drive parameters from {}", PARAMS_PATH);
            params
        }
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", PARAMS_PATH, e);
            StoredParams::default()
        }
    };

    let mut runtime = Runtime::new(simulated_robot(&params));

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!("Publishing to: {}, {}", TOPIC_RT_POSE, TOPIC_HEALTH);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // 1. Drain all pending command frames (non-blocking).
                while let Ok(Some(sample)) = subscriber.try_recv() {
                    let payload = sample.payload().to_bytes();
                    match CommandFrame::decode(&payload) {
                        Some(frame) => runtime.on_frame(frame),
                        None => warn!("failed to decode command frame"),
                    }
                }

                // 2. Still a stale indefinite course.
                runtime.watchdog();

                // 3. Run one control tick.
                runtime.robot.handle();

                // 4. Publish pose and health.
                runtime.update_health();
                let pose_json = serde_json::to_string(&PoseUpdate::from(runtime.robot.pose()))?;
                pub_pose.put(pose_json).await?;
                let health_json = serde_json::to_string(&runtime.health)?;
                pub_health.put(health_json).await?;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Graceful shutdown: latch the base still.
    info!("Stopping base...");
    runtime.robot.emergency_stop();
    info!("Runtime shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_stills_stale_indefinite_course() {
        let mut runtime = Runtime::new(simulated_robot(&StoredParams::default()));

        let frame = CommandFrame::constant_speed(0.1, 0.0, 0.0);
        runtime.on_frame(frame);
        assert!(!runtime.robot.movements().is_idle());

        // Fresh command: watchdog leaves the course alone.
        runtime.watchdog();
        assert!(!runtime.robot.movements().is_idle());

        // Age the command past the timeout.
        runtime.cmd_received_at = Instant::now() - CMD_TIMEOUT - Duration::from_millis(1);
        runtime.watchdog();
        assert!(runtime.robot.movements().is_idle());
    }

    #[test]
    fn watchdog_leaves_scheduled_movements_running() {
        let mut runtime = Runtime::new(simulated_robot(&StoredParams::default()));

        runtime.on_frame(CommandFrame::target_pose_time(0.5, 0.0, 0.0, 60.0));
        assert_eq!(runtime.robot.movements().scheduled(), 1);

        runtime.cmd_received_at = Instant::now() - CMD_TIMEOUT - Duration::from_millis(1);
        runtime.watchdog();
        assert_eq!(runtime.robot.movements().scheduled(), 1);
    }

    #[test]
    fn health_reflects_command_age_and_latch() {
        let mut runtime = Runtime::new(simulated_robot(&StoredParams::default()));

        runtime.update_health();
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);

        runtime.on_frame(CommandFrame::stop());
        runtime.update_health();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        runtime.on_frame(CommandFrame::emergency_stop());
        runtime.update_health();
        assert_eq!(runtime.health(), RuntimeHealth::EmergencyStop);
    }

    #[test]
    fn rejected_frames_do_not_refresh_the_watchdog() {
        let mut runtime = Runtime::new(simulated_robot(&StoredParams::default()));

        let bogus = CommandFrame {
            command: 0b1100_0000, // unknown movement kind
            args: vec![],
        };
        runtime.on_frame(bogus);
        assert!(!runtime.cmd_seen);
    }
}
