//! Host-side driver for the Feetech SCServo family (STS, SMS, SCS) of
//! serial bus servos.
//!
//! The driver speaks the half-duplex `FF FF`-framed request/response
//! protocol over a byte-stream capability ([`port::BusPort`]), typically a
//! USB-to-TTL bridge at 1 Mbps. It covers pinging, byte-addressed
//! control-table reads and writes, deferred reg-writes with action commit,
//! and grouped sync-read/sync-write across multiple servos on one bus.
//!
//! ```no_run
//! use scservo::{Endian, GroupSyncWrite, PacketHandler, SerialBus};
//! use scservo::proto::REG_GOAL_POSITION;
//!
//! # fn main() -> Result<(), scservo::PortError> {
//! let port = SerialBus::open("/dev/ttyUSB0", 1_000_000)?;
//! let mut bus = PacketHandler::new(port, Endian::Little);
//!
//! let (model, result, error) = bus.ping(1);
//! println!("servo 1: model {model:#06X} ({result}, {error})");
//!
//! let mut group = GroupSyncWrite::new(REG_GOAL_POSITION, 2);
//! group.add(1, &[0xE8, 0x03]);
//! group.add(2, &[0xD0, 0x07]);
//! group.tx(&mut bus);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod endian;
pub mod group;
pub mod handler;
pub mod port;
pub mod proto;

pub use endian::Endian;
pub use group::{GroupSyncRead, GroupSyncWrite};
pub use handler::PacketHandler;
pub use port::{BusPort, PortError, SerialBus};
#[cfg(unix)]
pub use port::VirtualUartPort;
pub use proto::{CommResult, ErrorFlags};
