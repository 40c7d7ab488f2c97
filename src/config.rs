// Loop rate, timeouts, topics and parameter storage location

use std::time::Duration;

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Command watchdog: an indefinite course is stilled when no command has
// arrived for this long (queued finite movements are left to finish)
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "omnibase/cmd/base"; // command frames in
pub const TOPIC_RT_POSE: &str = "omnibase/rt/pose"; // pose estimate out
pub const TOPIC_HEALTH: &str = "omnibase/state/health"; // health status out

// Stable storage holding the drive parameter record
pub const PARAMS_PATH: &str = "omnibase-params.bin";
pub const PARAMS_OFFSET: u64 = 0;
