// Persistent drive parameters
//
// A packed little-endian record of nine f64 fields, read from a fixed
// offset in a stable-storage file (the host analogue of an EEPROM
// address). Field order is part of the format and must not change.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("parameter storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drive parameters as stored in stable storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredParams {
    /// Maximum wheel angular speed, rad/s.
    pub max_wheel_speed: f64,
    /// Wheel radius, m.
    pub wheel_radius: f64,
    /// Chassis radius (centre to wheel), m.
    pub robot_radius: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Braking-space friction coefficients per body axis.
    pub friction_forward: f64,
    pub friction_strafe: f64,
    pub friction_angular: f64,
}

impl Default for StoredParams {
    fn default() -> Self {
        Self {
            max_wheel_speed: 10.0,
            wheel_radius: 0.05,
            robot_radius: 0.15,
            kp: crate::motor::wheel::DEFAULT_KP,
            ki: crate::motor::wheel::DEFAULT_KI,
            kd: crate::motor::wheel::DEFAULT_KD,
            friction_forward: 0.0,
            friction_strafe: 0.0,
            friction_angular: 0.0,
        }
    }
}

impl StoredParams {
    /// Size of the packed record in bytes.
    pub const SIZE: usize = 9 * 8;

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut fields = [0.0_f64; 9];
        for (i, field) in fields.iter_mut().enumerate() {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *field = f64::from_le_bytes(raw);
        }
        Self {
            max_wheel_speed: fields[0],
            wheel_radius: fields[1],
            robot_radius: fields[2],
            kp: fields[3],
            ki: fields[4],
            kd: fields[5],
            friction_forward: fields[6],
            friction_strafe: fields[7],
            friction_angular: fields[8],
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let fields = [
            self.max_wheel_speed,
            self.wheel_radius,
            self.robot_radius,
            self.kp,
            self.ki,
            self.kd,
            self.friction_forward,
            self.friction_strafe,
            self.friction_angular,
        ];
        let mut bytes = [0_u8; Self::SIZE];
        for (i, field) in fields.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    /// Read the record at `offset` in the storage file.
    pub fn load(path: &Path, offset: u64) -> Result<Self, ParamsError> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = [0_u8; Self::SIZE];
        file.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Write the record at `offset` in the storage file, creating it if
    /// needed (used by calibration tooling).
    pub fn save(&self, path: &Path, offset: u64) -> Result<(), ParamsError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&self.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let params = StoredParams {
            max_wheel_speed: 12.5,
            wheel_radius: 0.04,
            robot_radius: 0.2,
            kp: 2.0,
            ki: 0.1,
            kd: 0.05,
            friction_forward: 0.3,
            friction_strafe: 0.3,
            friction_angular: 0.1,
        };
        assert_eq!(StoredParams::from_bytes(&params.to_bytes()), params);
    }

    #[test]
    fn layout_is_little_endian_in_field_order() {
        let params = StoredParams {
            max_wheel_speed: 1.0,
            ..StoredParams::default()
        };
        let bytes = params.to_bytes();
        assert_eq!(&bytes[0..8], &1.0_f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &0.05_f64.to_le_bytes());
    }

    #[test]
    fn save_then_load_at_offset() {
        let dir = std::env::temp_dir().join("omnibase-params-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("blob.bin");

        let params = StoredParams::default();
        params.save(&path, 16).unwrap();
        let loaded = StoredParams::load(&path, 16).unwrap();
        assert_eq!(loaded, params);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/omnibase/params.bin");
        assert!(StoredParams::load(missing, 0).is_err());
    }
}
