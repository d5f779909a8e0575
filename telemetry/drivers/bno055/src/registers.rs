use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum ChipRegisters {
    ChipId = 0x00,
    PageId = 0x07,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum GyroRegisters {
    XLsb = 0x14,
    XMsb = 0x15,
    YLsb = 0x16,
    YMsb = 0x17,
    ZLsb = 0x18,
    ZMsb = 0x19,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum QuaternionRegisters {
    WLsb = 0x20,
    WMsb = 0x21,
    XLsb = 0x22,
    XMsb = 0x23,
    YLsb = 0x24,
    YMsb = 0x25,
    ZLsb = 0x26,
    ZMsb = 0x27,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum StatusRegisters {
    CalibStat = 0x35,
    SysClkStatus = 0x38,
    SysStatus = 0x39,
    SysErr = 0x3A,
    UnitSel = 0x3B,
    OprMode = 0x3D,
    PwrMode = 0x3E,
    SysTrigger = 0x3F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum RegisterPage {
    Page0 = 0x00,
    Page1 = 0x01,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum PowerMode {
    Normal = 0x00,
    Low = 0x01,
    Suspend = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum OperationMode {
    Config = 0x00,
    AccOnly = 0x01,
    MagOnly = 0x02,
    GyrOnly = 0x03,
    AccMag = 0x04,
    AccGyro = 0x05,
    MagGyro = 0x06,
    Amg = 0x07,
    Imu = 0x08,
    Compass = 0x09,
    M4g = 0x0A,
    NdofFmcOff = 0x0B,
    Ndof = 0x0C,
}

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive)]
pub enum Constants {
    ChipId = 0xA0,
    DefaultI2cAddr = 0x28,
}

bitflags! {
    /// UNIT_SEL (0x3B). Writable only in CONFIG mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UnitSelection: u8 {
        const ACCEL_MG = 0x01;
        const GYRO_RPS = 0x02;
        const EULER_RAD = 0x04;
        const TEMP_FAHRENHEIT = 0x10;
        const ORIENTATION_ANDROID = 0x80;
    }
}

bitflags! {
    /// SYS_TRIGGER (0x3F).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SysTrigger: u8 {
        const SELF_TEST = 0x01;
        const RESET_SYSTEM = 0x20;
        const RESET_INTERRUPTS = 0x40;
        const EXTERNAL_CLOCK = 0x80;
    }
}

bitflags! {
    /// SYS_CLK_STATUS (0x38).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClockStatus: u8 {
        /// Set while the main clock is still being configured.
        const MAIN_CLOCK_BUSY = 0x01;
    }
}
