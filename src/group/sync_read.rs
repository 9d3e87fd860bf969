use std::collections::BTreeMap;

use crate::endian::Endian;
use crate::handler::PacketHandler;
use crate::port::BusPort;
use crate::proto::CommResult;

/// Accumulates a set of servo ids for one sync-read window, collects the
/// per-id replies to a broadcast request, and decodes values by register
/// offset.
///
/// After a round, each member either holds exactly `data_length` payload
/// bytes or remains empty (no valid response from that id in this round).
#[derive(Debug)]
pub struct GroupSyncRead {
    start_address: u8,
    data_length: u8,
    last_success: bool,
    dirty: bool,
    param: Vec<u8>,
    members: BTreeMap<u8, Vec<u8>>,
}

impl GroupSyncRead {
    pub fn new(start_address: u8, data_length: u8) -> Self {
        Self {
            start_address,
            data_length,
            last_success: false,
            dirty: false,
            param: Vec::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn start_address(&self) -> u8 {
        self.start_address
    }

    pub fn data_length(&self) -> u8 {
        self.data_length
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Register an id for the round. Rejects duplicates.
    pub fn add(&mut self, id: u8) -> bool {
        if self.members.contains_key(&id) {
            return false;
        }
        self.members.insert(id, Vec::new());
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, id: u8) {
        if self.members.remove(&id).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.param.clear();
        self.dirty = false;
        self.last_success = false;
    }

    /// Emit the broadcast sync-read request and arm a window sized for one
    /// reply per member.
    pub fn tx<P: BusPort>(&mut self, handler: &mut PacketHandler<P>) -> CommResult {
        if self.members.is_empty() {
            return CommResult::NotAvailable;
        }
        if self.dirty || self.param.is_empty() {
            self.param = self.members.keys().copied().collect();
            self.dirty = false;
        }
        handler.sync_read_tx(self.start_address, self.data_length, &self.param)
    }

    /// Collect one reply per member id, in ascending id order, inside the
    /// window armed by [`GroupSyncRead::tx`]. Terminates on the first
    /// non-success result; ids not yet served stay empty.
    pub fn rx<P: BusPort>(&mut self, handler: &mut PacketHandler<P>) -> CommResult {
        self.last_success = false;
        if self.members.is_empty() {
            return CommResult::NotAvailable;
        }

        for buffer in self.members.values_mut() {
            buffer.clear();
        }

        let ids: Vec<u8> = self.members.keys().copied().collect();
        let mut complete = true;
        for id in ids {
            let (data, result, _error) = handler.read_rx(id, self.data_length);
            if !result.is_success() {
                return result;
            }
            if data.len() == self.data_length as usize {
                self.members.insert(id, data);
            } else {
                complete = false;
            }
        }

        self.last_success = complete;
        CommResult::Success
    }

    /// One full round: transmit, then collect.
    pub fn txrx<P: BusPort>(&mut self, handler: &mut PacketHandler<P>) -> CommResult {
        let result = self.tx(handler);
        if !result.is_success() {
            return result;
        }
        self.rx(handler)
    }

    /// Whether the last round produced a full buffer for every member.
    pub fn last_success(&self) -> bool {
        self.last_success
    }

    /// Whether `length` bytes at `address` can be decoded for `id`:
    /// the id is a member, its buffer is populated, and the requested range
    /// lies inside the configured window.
    pub fn is_available(&self, id: u8, address: u8, length: u8) -> bool {
        let Some(data) = self.members.get(&id) else {
            return false;
        };
        if data.len() != self.data_length as usize {
            return false;
        }
        let start = self.start_address as usize;
        let addr = address as usize;
        start <= addr && addr + length as usize <= start + self.data_length as usize
    }

    /// Decode a 1/2/4-byte value buffered for `id` at `address` under the
    /// given byte-order policy. Returns 0 when unavailable or out of range.
    pub fn value(&self, id: u8, address: u8, length: u8, endian: Endian) -> u32 {
        if !self.is_available(id, address, length) {
            return 0;
        }
        let data = &self.members[&id];
        let offset = (address - self.start_address) as usize;
        match length {
            1 => data[offset] as u32,
            2 => endian.word(data[offset], data[offset + 1]) as u32,
            4 => endian.dword([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_group_decodes_to_zero() {
        let mut group = GroupSyncRead::new(56, 4);
        assert!(group.add(1));
        assert!(!group.is_available(1, 56, 2));
        assert_eq!(group.value(1, 56, 2, Endian::Little), 0);
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut group = GroupSyncRead::new(56, 4);
        assert!(group.add(1));
        assert!(!group.add(1));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn window_checks_are_overflow_safe() {
        let mut group = GroupSyncRead::new(250, 6);
        assert!(group.add(1));
        group.members.insert(1, vec![0xAA; 6]);
        assert!(group.is_available(1, 250, 6));
        assert!(group.is_available(1, 255, 1));
        // One past the window, and addresses below the start.
        assert!(!group.is_available(1, 255, 2));
        assert!(!group.is_available(1, 249, 1));
        assert_eq!(group.value(1, 255, 2, Endian::Little), 0);
    }

    #[test]
    fn value_decodes_at_offset() {
        let mut group = GroupSyncRead::new(56, 4);
        assert!(group.add(1));
        group.members.insert(1, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(group.value(1, 56, 1, Endian::Little), 0x78);
        assert_eq!(group.value(1, 57, 1, Endian::Little), 0x56);
        assert_eq!(group.value(1, 56, 2, Endian::Little), 0x5678);
        assert_eq!(group.value(1, 56, 2, Endian::Big), 0x7856);
        assert_eq!(group.value(1, 56, 4, Endian::Little), 0x1234_5678);
    }
}
