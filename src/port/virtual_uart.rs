//! Pseudo-terminal bus port for loopback rigs.
//!
//! Opens the master side of a POSIX pty; whatever opens the printed slave
//! path plays the servo end of the wire. The slave should be put in raw
//! mode, otherwise line discipline mangles the frames.

use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;

use log::trace;

use super::{BusPort, PacketTimer, PortError};

#[derive(Debug)]
pub struct VirtualUartPort {
    master_fd: RawFd,
    slave_path: String,
    baud: u32,
    timer: PacketTimer,
}

impl VirtualUartPort {
    pub fn new() -> Result<Self, PortError> {
        unsafe {
            let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            if libc::grantpt(fd) != 0 || libc::unlockpt(fd) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err.into());
            }

            let name_ptr = libc::ptsname(fd);
            if name_ptr.is_null() {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err.into());
            }
            let slave_path = CStr::from_ptr(name_ptr).to_string_lossy().into_owned();

            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags >= 0 {
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }

            trace!("virtual uart master fd {fd}, slave {slave_path}");
            Ok(Self {
                master_fd: fd,
                slave_path,
                baud: 1_000_000,
                timer: PacketTimer::new(1_000_000),
            })
        }
    }

    /// Path of the slave device to hand to the other end of the wire.
    pub fn slave_path(&self) -> &str {
        &self.slave_path
    }
}

impl Drop for VirtualUartPort {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.master_fd);
        }
    }
}

impl BusPort for VirtualUartPort {
    fn clear(&mut self) {
        let pending = self.bytes_available();
        if pending > 0 {
            let _ = self.read_bytes(pending);
        }
    }

    fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        if length == 0 {
            return Vec::new();
        }
        let mut out = vec![0u8; length];
        let read_len = unsafe {
            libc::read(
                self.master_fd,
                out.as_mut_ptr() as *mut libc::c_void,
                length,
            )
        };
        if read_len <= 0 {
            out.clear();
        } else {
            out.truncate(read_len as usize);
        }
        out
    }

    fn write_bytes(&mut self, packet: &[u8]) -> usize {
        if packet.is_empty() {
            return 0;
        }
        let written = unsafe {
            libc::write(
                self.master_fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
            )
        };
        if written < 0 {
            0
        } else {
            written as usize
        }
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
        // A pty has no physical line rate; only the timer cares.
        self.baud = baud;
        self.timer.set_baud(baud);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn bytes_available(&self) -> usize {
        let mut bytes: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(self.master_fd, libc::FIONREAD, &mut bytes) };
        if rc == 0 {
            bytes as usize
        } else {
            0
        }
    }
}
