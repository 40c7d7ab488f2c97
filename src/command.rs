// Wire format for base commands
//
// A frame is one command byte followed by the command's f64 arguments in
// little-endian order. The byte packs, from the most significant bit down:
// a 5-bit selector and a 3-bit argument count. Selector values with the top
// bit set are movement commands (low 4 bits pick the movement kind);
// selectors 0b01xxx are testers (no arguments) or setters (with
// arguments); the rest are functions.

/// Highest number of f64 arguments a frame can carry.
pub const MAX_ARGS: usize = 7;

/// Selector bit marking a movement command.
pub const MOVEMENT_BIT: u8 = 0b10000;

/// Selector bit marking a tester or setter command.
pub const CONFIG_BIT: u8 = 0b01000;

/// A decoded (or to-be-encoded) command frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    pub command: u8,
    pub args: Vec<f64>,
}

impl CommandFrame {
    /// Number of arguments announced by a command byte.
    pub fn announced_args(command: u8) -> usize {
        (command & 0b111) as usize
    }

    /// Build a frame, packing the argument count into the command byte.
    /// `selector` is the 5-bit selector; at most [`MAX_ARGS`] arguments.
    fn new(selector: u8, args: Vec<f64>) -> Self {
        debug_assert!(args.len() <= MAX_ARGS);
        Self {
            command: (selector << 3) | args.len() as u8,
            args,
        }
    }

    /// Parse a frame from raw bytes.
    ///
    /// The payload must contain exactly the announced number of arguments;
    /// short or oversized payloads are rejected.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&command, rest) = bytes.split_first()?;
        let count = Self::announced_args(command);
        if rest.len() != count * 8 {
            return None;
        }
        let args = rest
            .chunks_exact(8)
            .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("8-byte chunk")))
            .collect();
        Some(Self { command, args })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.args.len() * 8);
        bytes.push(self.command);
        for arg in &self.args {
            bytes.extend_from_slice(&arg.to_le_bytes());
        }
        bytes
    }

    // Movement commands.

    /// Install the Still fallback.
    pub fn stop() -> Self {
        Self::new(MOVEMENT_BIT, vec![])
    }

    /// Constant body velocity (m/s, m/s, rad/s).
    pub fn constant_speed(forward: f64, strafe: f64, theta: f64) -> Self {
        Self::new(MOVEMENT_BIT | 1, vec![forward, strafe, theta])
    }

    /// Constant normalised velocity (planar magnitude, direction, angular).
    pub fn constant_norm_speed(planar: f64, direction: f64, angular: f64) -> Self {
        Self::new(MOVEMENT_BIT | 2, vec![planar, direction, angular])
    }

    /// Reach a pose within a duration (s).
    pub fn target_pose_time(x: f64, y: f64, phi: f64, duration: f64) -> Self {
        Self::new(MOVEMENT_BIT | 3, vec![x, y, phi, duration])
    }

    /// Reach a pose at fixed speed magnitudes.
    pub fn target_pose_speed(x: f64, y: f64, phi: f64, planar: f64, angular: f64) -> Self {
        Self::new(MOVEMENT_BIT | 4, vec![x, y, phi, planar, angular])
    }

    /// Reach a pose at fixed normalised magnitudes in [0, 1].
    pub fn target_pose_norm_speed(x: f64, y: f64, phi: f64, planar: f64, angular: f64) -> Self {
        Self::new(MOVEMENT_BIT | 5, vec![x, y, phi, planar, angular])
    }

    /// Hold a body velocity for a duration.
    pub fn speed_for_time(forward: f64, strafe: f64, theta: f64, duration: f64) -> Self {
        Self::new(MOVEMENT_BIT | 6, vec![forward, strafe, theta, duration])
    }

    /// Hold a normalised velocity for a duration.
    pub fn norm_speed_for_time(planar: f64, direction: f64, angular: f64, duration: f64) -> Self {
        Self::new(MOVEMENT_BIT | 7, vec![planar, direction, angular, duration])
    }

    // Functions.

    pub fn home() -> Self {
        Self::new(0, vec![])
    }

    pub fn emergency_stop() -> Self {
        Self::new(1, vec![])
    }

    pub fn drain_schedule() -> Self {
        Self::new(2, vec![])
    }

    // Testers.

    pub fn test_is_still() -> Self {
        Self::new(CONFIG_BIT, vec![])
    }

    pub fn test_schedule_space() -> Self {
        Self::new(CONFIG_BIT | 1, vec![])
    }

    // Setters.

    pub fn set_wheel_radius(radius: f64) -> Self {
        Self::new(CONFIG_BIT, vec![radius])
    }

    pub fn set_chassis_radius(radius: f64) -> Self {
        Self::new(CONFIG_BIT | 1, vec![radius])
    }

    pub fn set_pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self::new(CONFIG_BIT | 2, vec![kp, ki, kd])
    }

    pub fn set_max_wheel_speed(speed: f64) -> Self {
        Self::new(CONFIG_BIT | 3, vec![speed])
    }

    pub fn set_friction(forward: f64, strafe: f64, angular: f64) -> Self {
        Self::new(CONFIG_BIT | 4, vec![forward, strafe, angular])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_byte_packs_selector_and_count() {
        let frame = CommandFrame::constant_speed(0.5, 0.0, 0.0);
        // Selector 0b10001, three arguments.
        assert_eq!(frame.command, 0b1000_1011);
        assert_eq!(CommandFrame::announced_args(frame.command), 3);

        let frame = CommandFrame::stop();
        assert_eq!(frame.command, 0b1000_0000);

        let frame = CommandFrame::home();
        assert_eq!(frame.command, 0b0000_0000);

        let frame = CommandFrame::set_max_wheel_speed(10.0);
        assert_eq!(frame.command, 0b0101_1001);

        let frame = CommandFrame::test_is_still();
        assert_eq!(frame.command, 0b0100_0000);
    }

    #[test]
    fn encode_decode_round_trip() {
        let frames = [
            CommandFrame::stop(),
            CommandFrame::constant_speed(0.5, -0.25, 1.0),
            CommandFrame::target_pose_time(0.3, 0.4, 0.0, 2.0),
            CommandFrame::target_pose_norm_speed(1.0, 1.0, 3.14, 0.5, 0.5),
            CommandFrame::emergency_stop(),
        ];
        for frame in frames {
            let decoded = CommandFrame::decode(&frame.encode()).expect("decodes");
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(CommandFrame::decode(&[]).is_none());

        // Announces 3 arguments but carries none.
        assert!(CommandFrame::decode(&[0b1000_1011]).is_none());

        // Announces 3 arguments but carries a truncated third.
        let mut bytes = CommandFrame::constant_speed(1.0, 2.0, 3.0).encode();
        bytes.pop();
        assert!(CommandFrame::decode(&bytes).is_none());

        // Trailing garbage after the announced arguments.
        let mut bytes = CommandFrame::stop().encode();
        bytes.push(0xFF);
        assert!(CommandFrame::decode(&bytes).is_none());
    }
}
