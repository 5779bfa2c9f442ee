// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Bounded packet batches.
//!
//! A batch is the unit of work a module processes in one invocation.
//! Exactly one module processes a given batch at a time; the driver
//! hands it on only after the process call returns.

use super::packet::Packet;
use heapless::Vec;

/// Maximum number of packets in one batch (the burst size).
pub const MAX_BURST: usize = 32;

/// An ordered, fixed-capacity sequence of packets.
#[derive(Debug, Default)]
pub struct PacketBatch {
    pkts: Vec<Packet, MAX_BURST>,
}

impl PacketBatch {
    pub fn new() -> Self {
        Self { pkts: Vec::new() }
    }

    /// Append a packet; hands it back when the batch is full.
    pub fn push(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.pkts.push(pkt)
    }

    pub fn pop(&mut self) -> Option<Packet> {
        self.pkts.pop()
    }

    pub fn len(&self) -> usize {
        self.pkts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pkts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pkts.is_full()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Packet> {
        self.pkts.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Packet> {
        self.pkts.iter_mut()
    }
}

impl IntoIterator for PacketBatch {
    type Item = Packet;
    type IntoIter = <Vec<Packet, MAX_BURST> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.pkts.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::packet::PacketPool;

    #[test]
    fn batch_order_preserved() {
        let mut pool = PacketPool::new(3, 32).unwrap();
        let mut batch = PacketBatch::new();
        assert!(batch.is_empty());

        for tag in 0..3u8 {
            let mut pkt = pool.alloc().unwrap();
            pkt.buf_mut()[0] = tag;
            pkt.set_len(1);
            batch.push(pkt).unwrap();
        }
        assert_eq!(batch.len(), 3);

        let tags: std::vec::Vec<u8> =
            batch.into_iter().map(|p| p.data()[0]).collect();
        assert_eq!(tags, [0, 1, 2]);
    }

    #[test]
    fn batch_capacity_bounded() {
        let mut pool = PacketPool::new(MAX_BURST + 1, 32).unwrap();
        let mut batch = PacketBatch::new();
        for _ in 0..MAX_BURST {
            batch.push(pool.alloc().unwrap()).unwrap();
        }
        assert!(batch.is_full());
        let extra = pool.alloc().unwrap();
        let back = batch.push(extra).unwrap_err();
        pool.free(back);
    }
}
