// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Packet buffers and the pool that owns them.
//!
//! All packet memory is preallocated by a [`PacketPool`]; the hot
//! path never allocates. Ownership of a [`Packet`] transfers along
//! the pipeline with the batch that carries it. Whichever stage
//! fails to hand a packet onward is responsible for releasing it
//! back to the pool with [`PacketPool::free`] — a packet that is
//! simply dropped deallocates its buffer and the pool permanently
//! loses capacity.

use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::ModuleError;

/// Default per-packet buffer size in bytes.
pub const DEFAULT_BUF_SIZE: usize = 2048;

/// One network packet: a contiguous byte region plus length and
/// arrival-timestamp metadata.
#[derive(Debug)]
pub struct Packet {
    buf: Box<[u8]>,
    len: usize,
    arrival_ns: u64,
}

impl Packet {
    fn alloc(buf_size: usize) -> Result<Self, ModuleError> {
        let mut v = Vec::new();
        v.try_reserve_exact(buf_size).map_err(|_| {
            ModuleError::ResourceExhausted { what: "packet buffer".to_string() }
        })?;
        v.resize(buf_size, 0u8);
        Ok(Self { buf: v.into_boxed_slice(), len: 0, arrival_ns: 0 })
    }

    /// The live bytes of the packet.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The live bytes of the packet, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// The whole backing buffer, for filling a fresh packet.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Set the live length, clamped to the buffer capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }

    pub fn arrival_ns(&self) -> u64 {
        self.arrival_ns
    }

    pub fn set_arrival_ns(&mut self, ns: u64) {
        self.arrival_ns = ns;
    }
}

/// A preallocated, single-threaded packet pool.
///
/// The pool hands out [`Packet`]s it created at construction and
/// takes them back when a stage drops one from further processing.
pub struct PacketPool {
    free: Vec<Packet>,
    capacity: usize,
}

impl PacketPool {
    /// Preallocate `capacity` packets of `buf_size` bytes each.
    pub fn new(
        capacity: usize,
        buf_size: usize,
    ) -> Result<PacketPool, ModuleError> {
        let mut free = Vec::new();
        free.try_reserve_exact(capacity).map_err(|_| {
            ModuleError::ResourceExhausted { what: "packet pool".to_string() }
        })?;

        for _ in 0..capacity {
            free.push(Packet::alloc(buf_size)?);
        }

        Ok(Self { free, capacity })
    }

    /// Take a packet out of the pool, or `None` when exhausted.
    pub fn alloc(&mut self) -> Option<Packet> {
        self.free.pop()
    }

    /// Return a packet to the pool. The packet's metadata is reset.
    pub fn free(&mut self, mut pkt: Packet) {
        pkt.len = 0;
        pkt.arrival_ns = 0;
        self.free.push(pkt);
    }

    /// Packets currently available for allocation.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pool_alloc_free() {
        let mut pool = PacketPool::new(4, 64).unwrap();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);

        let mut pkt = pool.alloc().unwrap();
        assert_eq!(pool.available(), 3);
        assert_eq!(pkt.len(), 0);
        assert_eq!(pkt.capacity(), 64);

        pkt.buf_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        pkt.set_len(4);
        pkt.set_arrival_ns(99);
        assert_eq!(pkt.data(), &[1, 2, 3, 4]);

        pool.free(pkt);
        assert_eq!(pool.available(), 4);

        // Metadata was reset on release.
        let pkt = pool.alloc().unwrap();
        assert_eq!(pkt.len(), 0);
        assert_eq!(pkt.arrival_ns(), 0);
    }

    #[test]
    fn set_len_clamps() {
        let mut pool = PacketPool::new(1, 16).unwrap();
        let mut pkt = pool.alloc().unwrap();
        pkt.set_len(1000);
        assert_eq!(pkt.len(), 16);
    }
}
