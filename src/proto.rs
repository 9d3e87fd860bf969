//! Protocol-level constants and result types shared by the whole driver.

use std::fmt;

/// Addresses every servo on the bus; never elicits a response except for
/// sync-read, where each listed id replies in turn.
pub const BROADCAST_ID: u8 = 0xFE;
/// Highest legal unicast id. 0xFD is reserved and never a valid sender.
pub const MAX_ID: u8 = 0xFC;
/// 0xFD: reserved; anything above it at the id slot is a resync signal.
pub const RESERVED_ID: u8 = 0xFD;

pub const INST_PING: u8 = 0x01;
pub const INST_READ: u8 = 0x02;
pub const INST_WRITE: u8 = 0x03;
pub const INST_REG_WRITE: u8 = 0x04;
pub const INST_ACTION: u8 = 0x05;
pub const INST_SYNC_READ: u8 = 0x82;
pub const INST_SYNC_WRITE: u8 = 0x83;

/// Hard cap on total frame length, both directions.
pub const MAX_PACKET_LEN: usize = 250;
/// Shortest well-formed frame: header, id, length, instruction, checksum.
pub const MIN_PACKET_LEN: usize = 6;

// Byte offsets within a frame.
pub const PKT_HEADER0: usize = 0;
pub const PKT_HEADER1: usize = 1;
pub const PKT_ID: usize = 2;
pub const PKT_LENGTH: usize = 3;
pub const PKT_INSTRUCTION: usize = 4;
pub const PKT_ERROR: usize = 4;
pub const PKT_PARAM0: usize = 5;

// STS-family control table addresses used by the driver and its tests.
pub const REG_MODEL_NUMBER: u8 = 3;
pub const REG_ID: u8 = 5;
pub const REG_BAUD_RATE: u8 = 6;
pub const REG_TORQUE_ENABLE: u8 = 40;
pub const REG_GOAL_POSITION: u8 = 42;
pub const REG_GOAL_SPEED: u8 = 46;
pub const REG_LOCK: u8 = 55;
pub const REG_PRESENT_POSITION: u8 = 56;
pub const REG_PRESENT_SPEED: u8 = 58;
pub const REG_MOVING: u8 = 66;

/// Outcome of one bus transaction, as detected by the driver.
///
/// Orthogonal to [`ErrorFlags`]: a checksum-valid response with a non-zero
/// error byte is still `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommResult {
    Success,
    /// Re-entrant use of the bus was blocked by the guard flag.
    PortBusy,
    /// The port wrote fewer bytes than the frame holds.
    TxFail,
    /// The request would exceed the 250-byte frame cap (or is malformed).
    TxError,
    RxFail,
    RxWaiting,
    /// No bytes arrived inside the armed packet window.
    RxTimeout,
    /// Framing anomaly: bad checksum, impossible header field, or partial
    /// bytes left over when the window expired.
    RxCorrupt,
    /// The operation is not meaningful (unicast op with broadcast id, empty
    /// group transmit).
    NotAvailable,
}

impl CommResult {
    pub fn is_success(self) -> bool {
        self == CommResult::Success
    }
}

impl fmt::Display for CommResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CommResult::Success => "communication success",
            CommResult::PortBusy => "port is in use",
            CommResult::TxFail => "failed to transmit instruction packet",
            CommResult::TxError => "incorrect instruction packet",
            CommResult::RxFail => "failed to get status packet",
            CommResult::RxWaiting => "receiving status packet",
            CommResult::RxTimeout => "there is no status packet",
            CommResult::RxCorrupt => "incorrect status packet",
            CommResult::NotAvailable => "operation not available",
        };
        f.write_str(msg)
    }
}

/// Servo-reported error bitfield from a status packet.
///
/// Reserved bits propagate unchanged through [`ErrorFlags::bits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const VOLTAGE: u8 = 1;
    pub const ANGLE: u8 = 2;
    pub const OVERHEAT: u8 = 4;
    pub const OVERCURRENT: u8 = 8;
    pub const OVERLOAD: u8 = 32;

    pub fn from_bits(bits: u8) -> Self {
        ErrorFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_clear(self) -> bool {
        self.0 == 0
    }

    pub fn voltage(self) -> bool {
        self.0 & Self::VOLTAGE != 0
    }

    pub fn angle(self) -> bool {
        self.0 & Self::ANGLE != 0
    }

    pub fn overheat(self) -> bool {
        self.0 & Self::OVERHEAT != 0
    }

    pub fn overcurrent(self) -> bool {
        self.0 & Self::OVERCURRENT != 0
    }

    pub fn overload(self) -> bool {
        self.0 & Self::OVERLOAD != 0
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clear() {
            return f.write_str("ok");
        }
        let mut first = true;
        let mut put = |f: &mut fmt::Formatter<'_>, name: &str| -> fmt::Result {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(name)
        };
        if self.voltage() {
            put(f, "voltage")?;
        }
        if self.angle() {
            put(f, "angle")?;
        }
        if self.overheat() {
            put(f, "overheat")?;
        }
        if self.overcurrent() {
            put(f, "overcurrent")?;
        }
        if self.overload() {
            put(f, "overload")?;
        }
        let known = Self::VOLTAGE | Self::ANGLE | Self::OVERHEAT | Self::OVERCURRENT | Self::OVERLOAD;
        let reserved = self.0 & !known;
        if reserved != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "reserved(0x{reserved:02X})")?;
        }
        Ok(())
    }
}
