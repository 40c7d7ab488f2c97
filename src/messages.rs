// Message types published by the runtime

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::Pose;

/// World-frame pose estimate, runtime -> observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PoseUpdate {
    pub x: f64,
    pub y: f64,
    pub phi: f64,
}

impl From<Pose> for PoseUpdate {
    fn from(pose: Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            phi: pose.phi,
        }
    }
}

/// Health status published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    EmergencyStop,
}
