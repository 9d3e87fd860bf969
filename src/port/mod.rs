//! Byte I/O capability consumed by the transaction engine.
//!
//! A port is the unit of isolation: it owns its endpoint, packet timer and
//! baud configuration. Reads are non-blocking and return whatever bytes are
//! currently available; the engine polls them under an armed packet window.

use std::time::Instant;

use thiserror::Error;

pub mod serial;
#[cfg(unix)]
pub mod virtual_uart;

pub use serial::SerialBus;
#[cfg(unix)]
pub use virtual_uart::VirtualUartPort;

/// Worst-case USB-to-TTL bridge latency, one direction.
pub const LATENCY_TIMER_MS: f64 = 16.0;

/// Failure at the byte I/O boundary. Distinct from [`crate::CommResult`]:
/// these never enter the communication-outcome space.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to open serial port {path}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("unsupported baud rate {0}")]
    InvalidBaud(u32),
    #[error("failed to set baud rate {baud}")]
    SetBaud {
        baud: u32,
        #[source]
        source: serialport::Error,
    },
    #[error("serial I/O error")]
    Io(#[from] std::io::Error),
}

/// Serial endpoint capability.
///
/// `read_bytes` must not block: it returns 0..length bytes that are already
/// available. `write_bytes` reports the bytes actually written; a short
/// count is a transmit failure at the engine level.
pub trait BusPort {
    /// Drain pending input and output.
    fn clear(&mut self);
    fn read_bytes(&mut self, length: usize) -> Vec<u8>;
    fn write_bytes(&mut self, packet: &[u8]) -> usize;
    /// Arm the single-shot packet window for an expected response of
    /// `packet_length` bytes.
    fn begin_packet_timeout(&mut self, packet_length: usize);
    fn begin_packet_timeout_ms(&mut self, msec: u64);
    fn packet_timeout_expired(&mut self) -> bool;
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), PortError>;
    fn baud_rate(&self) -> u32;
    fn bytes_available(&self) -> usize;
}

/// Single-shot packet window shared by every port implementation.
///
/// The window for an expected response of `n` bytes is
/// `tx_time_per_byte × n + 2 × LATENCY_TIMER_MS + 2` milliseconds, where
/// `tx_time_per_byte = 10_000 / baud` (10 bits per byte on the wire).
#[derive(Debug)]
pub struct PacketTimer {
    tx_time_per_byte_ms: f64,
    armed_at: Instant,
    window_ms: f64,
}

impl PacketTimer {
    pub fn new(baud: u32) -> Self {
        let mut timer = Self {
            tx_time_per_byte_ms: 0.0,
            armed_at: Instant::now(),
            window_ms: 0.0,
        };
        timer.set_baud(baud);
        timer
    }

    pub fn set_baud(&mut self, baud: u32) {
        self.tx_time_per_byte_ms = 10_000.0 / baud as f64;
    }

    pub fn arm(&mut self, packet_length: usize) {
        self.armed_at = Instant::now();
        self.window_ms =
            self.tx_time_per_byte_ms * packet_length as f64 + 2.0 * LATENCY_TIMER_MS + 2.0;
    }

    pub fn arm_ms(&mut self, msec: u64) {
        self.armed_at = Instant::now();
        self.window_ms = msec as f64;
    }

    /// One-shot: reports expiry once, then disarms.
    pub fn expired(&mut self) -> bool {
        if self.window_ms <= 0.0 {
            return false;
        }
        if self.armed_at.elapsed().as_secs_f64() * 1000.0 > self.window_ms {
            self.window_ms = 0.0;
            return true;
        }
        false
    }

    /// The currently armed window, in milliseconds.
    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }
}
