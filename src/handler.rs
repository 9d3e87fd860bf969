//! Transaction engine: one synchronous request/response exchange at a time
//! over a half-duplex bus.
//!
//! Egress builds a frame, acquires the bus guard and writes it; ingress
//! polls the port under the armed packet window, resynchronising on the
//! `FF FF` marker when stale or garbled bytes precede a response. Every
//! operation surfaces a [`CommResult`] and, where a response carries one,
//! the servo-reported [`ErrorFlags`]. The two are independent: a reachable
//! servo reporting a fault is still `Success`.

use log::{debug, trace};

use crate::codec::{self, Instruction};
use crate::endian::Endian;
use crate::port::BusPort;
use crate::proto::{
    CommResult, ErrorFlags, BROADCAST_ID, INST_READ, INST_SYNC_WRITE, MAX_ID, MAX_PACKET_LEN,
    MIN_PACKET_LEN, PKT_ERROR, PKT_ID, PKT_INSTRUCTION, PKT_LENGTH, PKT_PARAM0, REG_MODEL_NUMBER,
    RESERVED_ID,
};

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == [0xFF, 0xFF])
}

/// The protocol driver for one bus. Owns the port, the endianness policy
/// for multi-byte fields, and the guard flag that serialises transactions.
#[derive(Debug)]
pub struct PacketHandler<P: BusPort> {
    port: P,
    endian: Endian,
    in_use: bool,
}

impl<P: BusPort> PacketHandler<P> {
    pub fn new(port: P, endian: Endian) -> Self {
        Self {
            port,
            endian,
            in_use: false,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    /// Acquire the bus and transmit one frame. On success the guard stays
    /// held for the receive path; every failure releases it.
    fn tx_packet(&mut self, frame: &[u8]) -> CommResult {
        if self.in_use {
            return CommResult::PortBusy;
        }
        self.in_use = true;

        if frame.len() < MIN_PACKET_LEN || frame.len() > MAX_PACKET_LEN {
            self.in_use = false;
            return CommResult::TxError;
        }

        trace!("tx {:02X?}", frame);
        self.port.clear();
        let written = self.port.write_bytes(frame);
        if written != frame.len() {
            debug!("short write: {written} of {} bytes", frame.len());
            self.in_use = false;
            return CommResult::TxFail;
        }

        CommResult::Success
    }

    /// Receive one frame inside the armed packet window, resynchronising on
    /// the `FF FF` marker. Expiry with an empty buffer is `RxTimeout`; with
    /// partial bytes it is `RxCorrupt`. Releases the bus guard.
    fn rx_packet(&mut self) -> (Vec<u8>, CommResult) {
        let mut rx: Vec<u8> = Vec::new();
        let mut wait = MIN_PACKET_LEN;

        let result = loop {
            if rx.len() < wait {
                let mut chunk = self.port.read_bytes(wait - rx.len());
                rx.append(&mut chunk);
            }

            if rx.len() < wait {
                if self.port.packet_timeout_expired() {
                    break if rx.is_empty() {
                        CommResult::RxTimeout
                    } else {
                        CommResult::RxCorrupt
                    };
                }
                std::thread::yield_now();
                continue;
            }

            match find_header(&rx) {
                Some(0) => {}
                Some(idx) => {
                    debug!("resync: dropping {idx} bytes before header");
                    rx.drain(..idx);
                    continue;
                }
                None => {
                    // Keep the trailing byte; it may be the first half of an
                    // incoming header.
                    let tail = rx.len() - 1;
                    debug!("resync: no header in {} bytes", rx.len());
                    rx.drain(..tail);
                    if self.port.packet_timeout_expired() {
                        break CommResult::RxCorrupt;
                    }
                    continue;
                }
            }

            // Impossible header fields mean a spurious FF FF inside noise:
            // drop one byte and rescan.
            if rx[PKT_ID] > RESERVED_ID
                || rx[PKT_LENGTH] as usize > MAX_PACKET_LEN
                || rx[PKT_ERROR] > 0x7F
            {
                debug!(
                    "resync: implausible header id={:#04X} len={} err={:#04X}",
                    rx[PKT_ID], rx[PKT_LENGTH], rx[PKT_ERROR]
                );
                rx.remove(0);
                continue;
            }

            let expected = rx[PKT_LENGTH] as usize + PKT_LENGTH + 1;
            if wait != expected {
                wait = expected;
                continue;
            }

            let checksum = codec::checksum(&rx[PKT_ID..wait - 1]);
            break if rx[wait - 1] == checksum {
                trace!("rx {:02X?}", &rx[..wait]);
                CommResult::Success
            } else {
                debug!("rx checksum mismatch");
                CommResult::RxCorrupt
            };
        };

        self.in_use = false;
        (rx, result)
    }

    /// Transmit, arm the window, and collect the matching response. Stray
    /// frames from other bus participants are discarded inside the same
    /// window. Broadcast requests return right after the transmit.
    fn tx_rx(&mut self, frame: &[u8]) -> (Option<Vec<u8>>, CommResult, ErrorFlags) {
        let result = self.tx_packet(frame);
        if !result.is_success() {
            return (None, result, ErrorFlags::default());
        }

        if frame[PKT_ID] == BROADCAST_ID {
            self.in_use = false;
            return (None, CommResult::Success, ErrorFlags::default());
        }

        let expected = if frame[PKT_INSTRUCTION] == INST_READ {
            frame[PKT_PARAM0 + 1] as usize + MIN_PACKET_LEN
        } else {
            MIN_PACKET_LEN
        };
        self.port.begin_packet_timeout(expected);

        loop {
            let (packet, rx_result) = self.rx_packet();
            if !rx_result.is_success() {
                return (Some(packet), rx_result, ErrorFlags::default());
            }
            if packet[PKT_ID] == frame[PKT_ID] {
                let error = ErrorFlags::from_bits(packet[PKT_ERROR]);
                return (Some(packet), CommResult::Success, error);
            }
            debug!("discarding response from id {}", packet[PKT_ID]);
        }
    }

    /// Ping a servo and recover its 16-bit model number via a follow-up
    /// register read.
    pub fn ping(&mut self, id: u8) -> (u16, CommResult, ErrorFlags) {
        if id > MAX_ID {
            return (0, CommResult::NotAvailable, ErrorFlags::default());
        }

        let frame = codec::encode_instruction(id, &Instruction::Ping);
        let (_, result, mut error) = self.tx_rx(&frame);

        let mut model_number = 0;
        if result.is_success() {
            let (data, read_result, read_error) = self.read(id, REG_MODEL_NUMBER, 2);
            if read_result.is_success() && data.len() == 2 {
                model_number = self.endian.word(data[0], data[1]);
                error = read_error;
            }
        }

        (model_number, result, error)
    }

    /// Commit previously reg-written values. Broadcast id is allowed and
    /// returns right after the transmit.
    pub fn action(&mut self, id: u8) -> CommResult {
        let frame = codec::encode_instruction(id, &Instruction::Action);
        let (_, result, _) = self.tx_rx(&frame);
        result
    }

    /// Read `length` bytes of the control table starting at `address`.
    pub fn read(&mut self, id: u8, address: u8, length: u8) -> (Vec<u8>, CommResult, ErrorFlags) {
        if id > MAX_ID {
            return (Vec::new(), CommResult::NotAvailable, ErrorFlags::default());
        }

        let frame = codec::encode_instruction(id, &Instruction::Read { address, length });
        let (rx, result, error) = self.tx_rx(&frame);

        let mut data = Vec::new();
        if result.is_success() {
            if let Some(packet) = rx {
                let end = PKT_PARAM0 + length as usize;
                if packet.len() >= end {
                    data.extend_from_slice(&packet[PKT_PARAM0..end]);
                }
            }
        }
        (data, result, error)
    }

    /// Transmit a read request and arm the window without receiving; pair
    /// with [`PacketHandler::read_rx`].
    pub fn read_tx(&mut self, id: u8, address: u8, length: u8) -> CommResult {
        if id > MAX_ID {
            return CommResult::NotAvailable;
        }
        let frame = codec::encode_instruction(id, &Instruction::Read { address, length });
        let result = self.tx_packet(&frame);
        if result.is_success() {
            self.port.begin_packet_timeout(length as usize + MIN_PACKET_LEN);
        }
        result
    }

    /// Receive-by-id: collect the next response from `id` inside the
    /// currently armed window, discarding frames from other senders.
    pub fn read_rx(&mut self, id: u8, length: u8) -> (Vec<u8>, CommResult, ErrorFlags) {
        loop {
            let (packet, result) = self.rx_packet();
            if !result.is_success() {
                return (Vec::new(), result, ErrorFlags::default());
            }
            if packet[PKT_ID] != id {
                debug!("discarding response from id {}", packet[PKT_ID]);
                continue;
            }
            let error = ErrorFlags::from_bits(packet[PKT_ERROR]);
            let end = PKT_PARAM0 + length as usize;
            let mut data = Vec::new();
            if packet.len() >= end {
                data.extend_from_slice(&packet[PKT_PARAM0..end]);
            }
            return (data, CommResult::Success, error);
        }
    }

    /// Write bytes at `address`. On broadcast there is no receive and the
    /// call returns after the transmit.
    pub fn write(&mut self, id: u8, address: u8, data: &[u8]) -> (CommResult, ErrorFlags) {
        let frame = codec::encode_instruction(
            id,
            &Instruction::Write {
                address,
                data: data.to_vec(),
            },
        );
        let (_, result, error) = self.tx_rx(&frame);
        (result, error)
    }

    /// Deferred write: identical framing to [`PacketHandler::write`] but the
    /// servo holds the value until an action instruction commits it.
    pub fn reg_write(&mut self, id: u8, address: u8, data: &[u8]) -> (CommResult, ErrorFlags) {
        let frame = codec::encode_instruction(
            id,
            &Instruction::RegWrite {
                address,
                data: data.to_vec(),
            },
        );
        let (_, result, error) = self.tx_rx(&frame);
        (result, error)
    }

    pub fn read_u8(&mut self, id: u8, address: u8) -> (u8, CommResult, ErrorFlags) {
        let (data, result, error) = self.read(id, address, 1);
        let value = if result.is_success() && !data.is_empty() {
            data[0]
        } else {
            0
        };
        (value, result, error)
    }

    pub fn read_u16(&mut self, id: u8, address: u8) -> (u16, CommResult, ErrorFlags) {
        let (data, result, error) = self.read(id, address, 2);
        let value = if result.is_success() && data.len() == 2 {
            self.endian.word(data[0], data[1])
        } else {
            0
        };
        (value, result, error)
    }

    pub fn read_u32(&mut self, id: u8, address: u8) -> (u32, CommResult, ErrorFlags) {
        let (data, result, error) = self.read(id, address, 4);
        let value = if result.is_success() && data.len() == 4 {
            self.endian.dword([data[0], data[1], data[2], data[3]])
        } else {
            0
        };
        (value, result, error)
    }

    pub fn write_u8(&mut self, id: u8, address: u8, value: u8) -> (CommResult, ErrorFlags) {
        self.write(id, address, &[value])
    }

    pub fn write_u16(&mut self, id: u8, address: u8, value: u16) -> (CommResult, ErrorFlags) {
        let data = self.endian.split_word(value);
        self.write(id, address, &data)
    }

    pub fn write_u32(&mut self, id: u8, address: u8, value: u32) -> (CommResult, ErrorFlags) {
        let data = self.endian.split_dword(value);
        self.write(id, address, &data)
    }

    /// Broadcast one sync-write frame carrying a prebuilt `[id, payload…]…`
    /// parameter block. Transmit-only; the bus guard is released right
    /// after a successful send.
    pub fn sync_write_tx(
        &mut self,
        start_address: u8,
        data_length: u8,
        param: &[u8],
    ) -> CommResult {
        let mut params = Vec::with_capacity(2 + param.len());
        params.push(start_address);
        params.push(data_length);
        params.extend_from_slice(param);
        let frame = codec::build_frame(BROADCAST_ID, INST_SYNC_WRITE, &params);
        let result = self.tx_packet(&frame);
        if result != CommResult::PortBusy {
            self.in_use = false;
        }
        result
    }

    /// Broadcast one sync-read request for `ids` and arm a window sized for
    /// one response per id. Pair with [`PacketHandler::read_rx`] per id.
    pub fn sync_read_tx(&mut self, start_address: u8, data_length: u8, ids: &[u8]) -> CommResult {
        if ids.is_empty() {
            return CommResult::NotAvailable;
        }
        let frame = codec::encode_instruction(
            BROADCAST_ID,
            &Instruction::SyncRead {
                address: start_address,
                length: data_length,
                ids: ids.to_vec(),
            },
        );
        let result = self.tx_packet(&frame);
        if result.is_success() {
            self.port
                .begin_packet_timeout((MIN_PACKET_LEN + data_length as usize) * ids.len());
        }
        result
    }
}
