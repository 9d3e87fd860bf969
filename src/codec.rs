//! Wire codec: frame construction, checksum, and a typed view of
//! instruction and status frames.
//!
//! ```text
//! [0xFF][0xFF][id][length][instruction|error][param0..paramN-1][checksum]
//! ```
//!
//! `length` counts every byte after it, checksum included. The checksum is
//! the one's complement of the 8-bit wrapping sum over id, length,
//! instruction/error and params; the header bytes and the checksum itself
//! are outside the domain.

use crate::proto::{
    INST_ACTION, INST_PING, INST_READ, INST_REG_WRITE, INST_SYNC_READ, INST_SYNC_WRITE, INST_WRITE,
    MIN_PACKET_LEN, PKT_LENGTH,
};

pub const HEADER_BYTE: u8 = 0xFF;

/// A request frame, as the host addresses a servo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Ping,
    Read { address: u8, length: u8 },
    Write { address: u8, data: Vec<u8> },
    /// Deferred write, committed by a later `Action`.
    RegWrite { address: u8, data: Vec<u8> },
    Action,
    SyncRead { address: u8, length: u8, ids: Vec<u8> },
    SyncWrite { address: u8, length: u8, writes: Vec<(u8, Vec<u8>)> },
}

/// A response frame, as a servo answers the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u8,
    pub error: u8,
    pub params: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    BadHeader,
    LengthMismatch,
    ChecksumMismatch,
    Malformed,
    UnknownInstruction,
}

/// Wrapping 8-bit sum, complemented. `body` is the frame slice from the id
/// byte through the last param.
pub fn checksum(body: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for byte in body {
        sum = sum.wrapping_add(*byte);
    }
    !sum
}

/// Assemble a complete frame around an instruction byte and its params.
pub fn build_frame(id: u8, instruction: u8, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8;
    let mut frame = Vec::with_capacity(MIN_PACKET_LEN + params.len());
    frame.push(HEADER_BYTE);
    frame.push(HEADER_BYTE);
    frame.push(id);
    frame.push(length);
    frame.push(instruction);
    frame.extend_from_slice(params);
    frame.push(checksum(&frame[2..]));
    frame
}

pub fn encode_instruction(id: u8, instruction: &Instruction) -> Vec<u8> {
    let (code, params) = match instruction {
        Instruction::Ping => (INST_PING, Vec::new()),
        Instruction::Read { address, length } => (INST_READ, vec![*address, *length]),
        Instruction::Write { address, data } => {
            let mut params = Vec::with_capacity(1 + data.len());
            params.push(*address);
            params.extend_from_slice(data);
            (INST_WRITE, params)
        }
        Instruction::RegWrite { address, data } => {
            let mut params = Vec::with_capacity(1 + data.len());
            params.push(*address);
            params.extend_from_slice(data);
            (INST_REG_WRITE, params)
        }
        Instruction::Action => (INST_ACTION, Vec::new()),
        Instruction::SyncRead { address, length, ids } => {
            let mut params = Vec::with_capacity(2 + ids.len());
            params.push(*address);
            params.push(*length);
            params.extend_from_slice(ids);
            (INST_SYNC_READ, params)
        }
        Instruction::SyncWrite { address, length, writes } => {
            let mut params = vec![*address, *length];
            for (id, data) in writes {
                params.push(*id);
                params.extend_from_slice(data);
            }
            (INST_SYNC_WRITE, params)
        }
    };
    build_frame(id, code, params.as_slice())
}

pub fn encode_status(status: &Status) -> Vec<u8> {
    build_frame(status.id, status.error, &status.params)
}

/// Validate framing on a complete frame and split it into
/// `(id, instruction_or_error, params)`.
fn split_frame(bytes: &[u8]) -> Result<(u8, u8, &[u8]), FrameError> {
    if bytes.len() < MIN_PACKET_LEN {
        return Err(FrameError::TooShort);
    }
    if bytes[0] != HEADER_BYTE || bytes[1] != HEADER_BYTE {
        return Err(FrameError::BadHeader);
    }
    let length = bytes[PKT_LENGTH] as usize;
    if length < 2 || bytes.len() != length + 4 {
        return Err(FrameError::LengthMismatch);
    }
    if checksum(&bytes[2..bytes.len() - 1]) != bytes[bytes.len() - 1] {
        return Err(FrameError::ChecksumMismatch);
    }
    Ok((bytes[2], bytes[4], &bytes[5..bytes.len() - 1]))
}

pub fn decode_status(bytes: &[u8]) -> Result<Status, FrameError> {
    let (id, error, params) = split_frame(bytes)?;
    Ok(Status {
        id,
        error,
        params: params.to_vec(),
    })
}

pub fn decode_instruction(bytes: &[u8]) -> Result<(u8, Instruction), FrameError> {
    let (id, code, params) = split_frame(bytes)?;
    let instruction = match code {
        INST_PING => {
            if !params.is_empty() {
                return Err(FrameError::Malformed);
            }
            Instruction::Ping
        }
        INST_READ => {
            if params.len() != 2 {
                return Err(FrameError::Malformed);
            }
            Instruction::Read {
                address: params[0],
                length: params[1],
            }
        }
        INST_WRITE => {
            if params.is_empty() {
                return Err(FrameError::Malformed);
            }
            Instruction::Write {
                address: params[0],
                data: params[1..].to_vec(),
            }
        }
        INST_REG_WRITE => {
            if params.is_empty() {
                return Err(FrameError::Malformed);
            }
            Instruction::RegWrite {
                address: params[0],
                data: params[1..].to_vec(),
            }
        }
        INST_ACTION => {
            if !params.is_empty() {
                return Err(FrameError::Malformed);
            }
            Instruction::Action
        }
        INST_SYNC_READ => {
            if params.len() < 2 {
                return Err(FrameError::Malformed);
            }
            Instruction::SyncRead {
                address: params[0],
                length: params[1],
                ids: params[2..].to_vec(),
            }
        }
        INST_SYNC_WRITE => {
            if params.len() < 2 {
                return Err(FrameError::Malformed);
            }
            let chunk_len = params[1] as usize + 1;
            let tail = &params[2..];
            if chunk_len < 2 || tail.len() % chunk_len != 0 {
                return Err(FrameError::Malformed);
            }
            let writes = tail
                .chunks(chunk_len)
                .map(|chunk| (chunk[0], chunk[1..].to_vec()))
                .collect();
            Instruction::SyncWrite {
                address: params[0],
                length: params[1],
                writes,
            }
        }
        _ => return Err(FrameError::UnknownInstruction),
    };
    Ok((id, instruction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frame_bytes() {
        let frame = encode_instruction(1, &Instruction::Ping);
        assert_eq!(frame, [0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
    }

    #[test]
    fn write_goal_position_frame_bytes() {
        // 2-byte goal position 1000 at address 42, little-endian payload.
        let frame = encode_instruction(
            1,
            &Instruction::Write {
                address: 42,
                data: vec![0xE8, 0x03],
            },
        );
        assert_eq!(frame, [0xFF, 0xFF, 0x01, 0x05, 0x03, 0x2A, 0xE8, 0x03, 0xE1]);
    }

    #[test]
    fn instruction_roundtrip() {
        let cases = [
            Instruction::Ping,
            Instruction::Read { address: 56, length: 4 },
            Instruction::Write { address: 42, data: vec![1, 2, 3] },
            Instruction::RegWrite { address: 42, data: vec![9] },
            Instruction::Action,
            Instruction::SyncRead { address: 56, length: 2, ids: vec![1, 2, 3] },
            Instruction::SyncWrite {
                address: 42,
                length: 2,
                writes: vec![(1, vec![0xE8, 0x03]), (2, vec![0xD0, 0x07])],
            },
        ];
        for instruction in cases {
            let frame = encode_instruction(7, &instruction);
            let (id, decoded) = decode_instruction(&frame).expect("decode");
            assert_eq!(id, 7);
            assert_eq!(decoded, instruction);
        }
    }

    #[test]
    fn status_roundtrip_and_checksum() {
        let status = Status {
            id: 1,
            error: 0,
            params: vec![0x00, 0x09],
        };
        let frame = encode_status(&status);
        assert_eq!(frame, [0xFF, 0xFF, 0x01, 0x04, 0x00, 0x00, 0x09, 0xF1]);
        assert_eq!(decode_status(&frame).expect("decode"), status);
    }

    #[test]
    fn flipped_bit_is_rejected() {
        let mut frame = encode_status(&Status {
            id: 1,
            error: 0,
            params: vec![0x00, 0x09],
        });
        *frame.last_mut().expect("nonempty") ^= 1;
        assert_eq!(decode_status(&frame), Err(FrameError::ChecksumMismatch));

        let mut frame2 = encode_instruction(1, &Instruction::Ping);
        frame2[2] ^= 0x10;
        assert_eq!(decode_instruction(&frame2), Err(FrameError::ChecksumMismatch));
    }

    #[test]
    fn length_field_must_match_byte_count() {
        let mut frame = encode_instruction(1, &Instruction::Ping);
        frame[PKT_LENGTH] = 3;
        assert_eq!(decode_instruction(&frame), Err(FrameError::LengthMismatch));
    }
}
