use std::collections::BTreeMap;

use crate::handler::PacketHandler;
use crate::port::BusPort;
use crate::proto::CommResult;

/// Accumulates `{id → payload}` for one sync-write window and emits a
/// single broadcast frame delivering all payloads at `start_address`.
#[derive(Debug)]
pub struct GroupSyncWrite {
    start_address: u8,
    data_length: u8,
    dirty: bool,
    param: Vec<u8>,
    entries: BTreeMap<u8, Vec<u8>>,
}

impl GroupSyncWrite {
    pub fn new(start_address: u8, data_length: u8) -> Self {
        Self {
            start_address,
            data_length,
            dirty: false,
            param: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    pub fn start_address(&self) -> u8 {
        self.start_address
    }

    pub fn data_length(&self) -> u8 {
        self.data_length
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Register a payload for `id`. Rejects duplicates and payloads longer
    /// than the window.
    pub fn add(&mut self, id: u8, data: &[u8]) -> bool {
        if self.entries.contains_key(&id) || data.len() > self.data_length as usize {
            return false;
        }
        self.entries.insert(id, data.to_vec());
        self.dirty = true;
        true
    }

    /// Replace the payload of an already-registered id.
    pub fn change(&mut self, id: u8, data: &[u8]) -> bool {
        if !self.entries.contains_key(&id) || data.len() > self.data_length as usize {
            return false;
        }
        self.entries.insert(id, data.to_vec());
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, id: u8) {
        if self.entries.remove(&id).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.param.clear();
        self.dirty = false;
    }

    fn rebuild(&mut self) {
        self.param.clear();
        for (id, data) in &self.entries {
            self.param.push(*id);
            self.param.extend_from_slice(data);
        }
        self.dirty = false;
    }

    /// Emit the broadcast sync-write frame. The parameter block is rebuilt
    /// only when membership changed since the last transmit.
    pub fn tx<P: BusPort>(&mut self, handler: &mut PacketHandler<P>) -> CommResult {
        if self.entries.is_empty() {
            return CommResult::NotAvailable;
        }
        if self.dirty || self.param.is_empty() {
            self.rebuild();
        }
        handler.sync_write_tx(self.start_address, self.data_length, &self.param)
    }
}
