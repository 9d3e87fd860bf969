//! `serialport`-backed bus port.
//!
//! The port is opened in raw 8N1 mode with a 2 ms poll timeout so that
//! `read_bytes` approximates a non-blocking read: it returns whatever the
//! OS buffer holds, or nothing once the poll window lapses. Non-standard
//! rates such as 1 Mbps go through the crate's custom-baud paths.

use std::io::{Read, Write};
use std::time::Duration;

use log::{trace, warn};
use serialport::SerialPort;

use super::{BusPort, PacketTimer, PortError};

const POLL_TIMEOUT: Duration = Duration::from_millis(2);
/// Bounded retry on EAGAIN-equivalent write errors.
const WRITE_RETRIES: usize = 10;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(1);

pub struct SerialBus {
    port: Box<dyn SerialPort>,
    baud: u32,
    timer: PacketTimer,
}

impl SerialBus {
    /// Acquire the named endpoint at the given line rate.
    pub fn open(path: &str, baud: u32) -> Result<Self, PortError> {
        if baud == 0 {
            return Err(PortError::InvalidBaud(baud));
        }
        let port = serialport::new(path, baud)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|source| PortError::Open {
                path: path.to_string(),
                source,
            })?;
        trace!("opened {path} at {baud} baud");
        Ok(Self {
            port,
            baud,
            timer: PacketTimer::new(baud),
        })
    }

    /// Wrap an already-opened port, e.g. one configured by the caller.
    pub fn from_port(port: Box<dyn SerialPort>, baud: u32) -> Self {
        Self {
            port,
            baud,
            timer: PacketTimer::new(baud),
        }
    }
}

impl BusPort for SerialBus {
    fn clear(&mut self) {
        if let Err(err) = self.port.clear(serialport::ClearBuffer::All) {
            warn!("failed to clear serial buffers: {err}");
        }
    }

    fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        if length == 0 {
            return Vec::new();
        }
        let mut out = vec![0u8; length];
        match self.port.read(&mut out) {
            Ok(read_len) => {
                out.truncate(read_len);
                out
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::TimedOut
                    || err.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Vec::new()
            }
            Err(err) => {
                warn!("serial read failed: {err}");
                Vec::new()
            }
        }
    }

    fn write_bytes(&mut self, packet: &[u8]) -> usize {
        let mut written = 0;
        let mut retries = 0;
        while written < packet.len() {
            match self.port.write(&packet[written..]) {
                Ok(0) => break,
                Ok(n) => {
                    written += n;
                    retries = 0;
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut
                        || err.kind() == std::io::ErrorKind::Interrupted =>
                {
                    if retries == WRITE_RETRIES {
                        break;
                    }
                    retries += 1;
                    std::thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(err) => {
                    warn!("serial write failed: {err}");
                    break;
                }
            }
        }
        if written == packet.len() {
            let _ = self.port.flush();
        }
        written
    }

    fn begin_packet_timeout(&mut self, packet_length: usize) {
        self.timer.arm(packet_length);
    }

    fn begin_packet_timeout_ms(&mut self, msec: u64) {
        self.timer.arm_ms(msec);
    }

    fn packet_timeout_expired(&mut self) -> bool {
        self.timer.expired()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), PortError> {
        if baud == 0 {
            return Err(PortError::InvalidBaud(baud));
        }
        self.port
            .set_baud_rate(baud)
            .map_err(|source| PortError::SetBaud { baud, source })?;
        self.baud = baud;
        self.timer.set_baud(baud);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn bytes_available(&self) -> usize {
        self.port.bytes_to_read().unwrap_or(0) as usize
    }
}
