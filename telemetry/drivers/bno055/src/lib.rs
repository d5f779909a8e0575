pub mod registers;

use byteorder::{ByteOrder, LittleEndian};
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use log::{debug, error, info, warn};
use num_traits::FromPrimitive;
pub use registers::OperationMode;
use registers::{
    ChipRegisters, ClockStatus, Constants, GyroRegisters, PowerMode, QuaternionRegisters,
    RegisterPage, StatusRegisters, SysTrigger, UnitSelection,
};
use std::thread;
use std::time::{Duration, Instant};
use telemetry_traits::{BusConfig, DeviceError, DeviceSession, Quaternion, Vector3};
use thiserror::Error;

/// Quaternion LSB: 1 unit = 2^14 LSB.
const QUATERNION_SCALE: f64 = 1.0 / (1 << 14) as f64;
/// Gyroscope LSB with UNIT_SEL.GYRO_RPS set: 1 rad/s = 900 LSB.
const GYRO_RPS_SCALE: f64 = 1.0 / 900.0;

const DETECT_POLL: Duration = Duration::from_millis(10);
const RESET_SETTLE: Duration = Duration::from_millis(650);

// Local Error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I2C error: {0}")]
    I2c(#[from] LinuxI2CError),
    #[error("invalid chip ID: expected 0xA0, got {0:#04x}")]
    InvalidChipId(u8),
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

// Outside of `open` every failure is a lost sample, except a lost identity.
impl From<Error> for DeviceError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidChipId(_) => DeviceError::DeviceNotDetected(err.to_string()),
            Error::I2c(_) | Error::ShortRead { .. } => {
                DeviceError::TransientReadFailure(err.to_string())
            }
        }
    }
}

/// Calibration levels 0 (uncalibrated) to 3 (fully calibrated).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationStatus {
    pub sys: u8,
    pub gyro: u8,
    pub accel: u8,
    pub mag: u8,
}

impl CalibrationStatus {
    pub fn from_byte(byte: u8) -> Self {
        CalibrationStatus {
            sys: (byte >> 6) & 0b11,
            gyro: (byte >> 4) & 0b11,
            accel: (byte >> 2) & 0b11,
            mag: byte & 0b11,
        }
    }
}

pub fn decode_quaternion(buf: &[u8; 8]) -> Quaternion {
    Quaternion {
        w: f64::from(LittleEndian::read_i16(&buf[0..2])) * QUATERNION_SCALE,
        x: f64::from(LittleEndian::read_i16(&buf[2..4])) * QUATERNION_SCALE,
        y: f64::from(LittleEndian::read_i16(&buf[4..6])) * QUATERNION_SCALE,
        z: f64::from(LittleEndian::read_i16(&buf[6..8])) * QUATERNION_SCALE,
    }
}

/// Decodes gyroscope registers, assuming the session selected rad/s units.
pub fn decode_angular_rate(buf: &[u8; 6]) -> Vector3 {
    Vector3 {
        x: f64::from(LittleEndian::read_i16(&buf[0..2])) * GYRO_RPS_SCALE,
        y: f64::from(LittleEndian::read_i16(&buf[2..4])) * GYRO_RPS_SCALE,
        z: f64::from(LittleEndian::read_i16(&buf[4..6])) * GYRO_RPS_SCALE,
    }
}

/// A configured BNO055 running in NDOF fusion mode.
pub struct Bno055 {
    i2c: LinuxI2CDevice,
    external_crystal: bool,
}

impl Bno055 {
    /// Opens the device described by `config` and brings it up in NDOF mode.
    ///
    /// Detection is retried until `config.open_timeout()` expires. Anything that
    /// goes wrong before the chip identifies itself is reported as
    /// `DeviceNotDetected`; a failure later in bring-up is a `ConfigurationError`.
    pub fn new(config: &BusConfig) -> Result<Self, DeviceError> {
        debug!(
            "Opening BNO055 on {} at {:#04x} ({} Hz bus clock)",
            config.path, config.address, config.clock_hz
        );
        let i2c = LinuxI2CDevice::new(&config.path, config.address)
            .map_err(|e| DeviceError::DeviceNotDetected(format!("{}: {}", config.path, e)))?;
        let mut bno = Bno055 { i2c, external_crystal: false };

        bno.wait_for_chip(config.open_timeout())
            .map_err(|e| DeviceError::DeviceNotDetected(e.to_string()))?;

        bno.configure(config)
            .map_err(|e| DeviceError::ConfigurationError(e.to_string()))?;

        Ok(bno)
    }

    /// Polls the chip ID register until it reads 0xA0 or `timeout` passes.
    fn wait_for_chip(&mut self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        loop {
            let err = match self.verify_chip_id() {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if Instant::now() >= deadline {
                if let Error::InvalidChipId(id) = err {
                    error!("Invalid chip ID. Expected 0xA0, got {:#x}", id);
                }
                return Err(err);
            }
            debug!("BNO055 not ready yet: {}", err);
            thread::sleep(DETECT_POLL);
        }
    }

    fn configure(&mut self, config: &BusConfig) -> Result<(), Error> {
        self.set_mode(OperationMode::Config)?;
        self.reset()?;
        // The chip drops off the bus during reset.
        self.wait_for_chip(config.open_timeout())?;

        self.write_register(StatusRegisters::PwrMode as u8, PowerMode::Normal as u8)?;
        self.set_page(RegisterPage::Page0)?;
        self.write_register(StatusRegisters::SysTrigger as u8, 0)?;
        self.write_register(StatusRegisters::UnitSel as u8, UnitSelection::GYRO_RPS.bits())?;

        if config.external_crystal {
            self.external_crystal = match self.use_external_crystal() {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!("Failed to enable external crystal: {}", e);
                    false
                }
            };
        }

        self.set_mode(OperationMode::Ndof)?;

        let mode = self.read_register(StatusRegisters::OprMode as u8)?;
        match OperationMode::from_u8(mode & 0x0F) {
            Some(OperationMode::Ndof) => {}
            other => warn!("BNO055 reports mode {:?} after selecting NDOF", other),
        }

        let calibration = CalibrationStatus::from_byte(self.get_calibration_status()?);
        info!(
            "BNO055 ready (external crystal: {}), calibration sys={} gyro={} accel={} mag={}",
            self.external_crystal, calibration.sys, calibration.gyro, calibration.accel, calibration.mag
        );
        Ok(())
    }

    /// Switches the main clock to the external crystal. Must be called in CONFIG mode.
    /// Returns `false` when the clock is still busy and the switch was skipped.
    fn use_external_crystal(&mut self) -> Result<bool, Error> {
        let status = ClockStatus::from_bits_truncate(
            self.read_register(StatusRegisters::SysClkStatus as u8)?,
        );
        if status.contains(ClockStatus::MAIN_CLOCK_BUSY) {
            warn!("BNO055 main clock busy, staying on the internal oscillator");
            return Ok(false);
        }
        self.write_register(
            StatusRegisters::SysTrigger as u8,
            SysTrigger::EXTERNAL_CLOCK.bits(),
        )?;
        thread::sleep(Duration::from_millis(10));
        Ok(true)
    }

    fn set_page(&mut self, page: RegisterPage) -> Result<(), Error> {
        self.write_register(ChipRegisters::PageId as u8, page as u8)
    }

    fn verify_chip_id(&mut self) -> Result<(), Error> {
        self.set_page(RegisterPage::Page0)?;
        let chip_id = self.read_register(ChipRegisters::ChipId as u8)?;
        if Constants::ChipId as u8 != chip_id {
            return Err(Error::InvalidChipId(chip_id));
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.set_page(RegisterPage::Page0)?;
        self.write_register(
            StatusRegisters::SysTrigger as u8,
            SysTrigger::RESET_SYSTEM.bits(),
        )?;
        thread::sleep(RESET_SETTLE);
        Ok(())
    }

    /// Sets the operation mode of the BNO055.
    pub fn set_mode(&mut self, mode: OperationMode) -> Result<(), Error> {
        self.write_register(StatusRegisters::OprMode as u8, mode as u8)?;
        // Wait for mode switch to complete
        thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    /// Returns the current orientation as a quaternion.
    pub fn get_quaternion(&mut self) -> Result<Quaternion, Error> {
        let mut buf = [0u8; 8];
        self.read_registers(QuaternionRegisters::WLsb as u8, &mut buf)?;
        Ok(decode_quaternion(&buf))
    }

    /// Returns the gyroscope readings in rad/s.
    pub fn get_gyroscope(&mut self) -> Result<Vector3, Error> {
        let mut buf = [0u8; 6];
        self.read_registers(GyroRegisters::XLsb as u8, &mut buf)?;
        Ok(decode_angular_rate(&buf))
    }

    /// Returns the calibration status byte.
    /// Bits 7-6: system, 5-4: gyroscope, 3-2: accelerometer, 1-0: magnetometer
    pub fn get_calibration_status(&mut self) -> Result<u8, Error> {
        self.read_register(StatusRegisters::CalibStat as u8)
    }

    pub fn uses_external_crystal(&self) -> bool {
        self.external_crystal
    }

    fn read_register(&mut self, register: u8) -> Result<u8, Error> {
        Ok(self.i2c.smbus_read_byte_data(register)?)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error> {
        Ok(self.i2c.smbus_write_byte_data(register, value)?)
    }

    /// Burst read so multi-byte values come from the same output cycle.
    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<(), Error> {
        let data = self.i2c.smbus_read_i2c_block_data(start, buf.len() as u8)?;
        if data.len() != buf.len() {
            return Err(Error::ShortRead { expected: buf.len(), got: data.len() });
        }
        buf.copy_from_slice(&data);
        Ok(())
    }
}

impl DeviceSession for Bno055 {
    fn open(config: &BusConfig) -> Result<Self, DeviceError> {
        Bno055::new(config)
    }

    fn read_orientation(&mut self) -> Result<Quaternion, DeviceError> {
        Ok(self.get_quaternion()?)
    }

    fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError> {
        Ok(self.get_gyroscope()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_scale_is_two_to_the_fourteen() {
        // w = 16384 (1.0), x = -8192 (-0.5), y = 0, z = 1
        let buf = [0x00, 0x40, 0x00, 0xE0, 0x00, 0x00, 0x01, 0x00];
        let q = decode_quaternion(&buf);
        assert_eq!(q.w, 1.0);
        assert_eq!(q.x, -0.5);
        assert_eq!(q.y, 0.0);
        assert_eq!(q.z, 1.0 / 16384.0);
    }

    #[test]
    fn gyro_is_decoded_in_radians_per_second() {
        // 900 LSB = 1 rad/s, -1800 LSB = -2 rad/s
        let buf = [0x84, 0x03, 0xF8, 0xF8, 0x00, 0x00];
        let rate = decode_angular_rate(&buf);
        assert!((rate.x - 1.0).abs() < 1e-12);
        assert!((rate.y + 2.0).abs() < 1e-12);
        assert_eq!(rate.z, 0.0);
    }

    #[test]
    fn calibration_byte_splits_into_pairs() {
        let status = CalibrationStatus::from_byte(0b11_10_01_00);
        assert_eq!(status, CalibrationStatus { sys: 3, gyro: 2, accel: 1, mag: 0 });
    }

    #[test]
    fn identity_loss_is_not_transient() {
        let err: DeviceError = Error::InvalidChipId(0x00).into();
        assert!(matches!(err, DeviceError::DeviceNotDetected(_)));
        let err: DeviceError = Error::ShortRead { expected: 8, got: 2 }.into();
        assert!(err.is_transient());
    }

    #[test]
    fn register_flags_match_datasheet() {
        assert_eq!(UnitSelection::GYRO_RPS.bits(), 0x02);
        assert_eq!(SysTrigger::EXTERNAL_CLOCK.bits(), 0x80);
        assert_eq!(OperationMode::from_u8(0x0C), Some(OperationMode::Ndof));
    }
}
