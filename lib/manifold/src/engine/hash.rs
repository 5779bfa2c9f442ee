// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Gate-selection disciplines for the load balancer.
//!
//! Each function maps a flow window to a gate in `[0, n)`. Callers
//! guarantee `n > 0`; an empty gate range never reaches these
//! functions.

use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::ModuleError;

/// Byte-order-sensitive mixing hash. The per-byte fold is
/// add/rotate/xor; the tail avalanches the accumulated state so that
/// low-entropy windows still spread across gates.
pub fn directional(window: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in window {
        h = h.wrapping_add(b as u32);
        h = h.wrapping_add(h.rotate_left(10));
        h ^= h << 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}

/// Commutative byte sum. Swapping fields within the window cannot
/// change the result, so both directions of a conversation land on
/// one gate.
pub fn symmetric(window: &[u8]) -> u32 {
    window.iter().fold(0u32, |h, &b| h.wrapping_add(b as u32))
}

/// Divide the window's value space evenly across `ngates` and place
/// the window's big-endian value in its bucket.
///
/// The window is at most [`MODULO_WINDOW_MAX`] bytes. A mask selects
/// a sub-field of the value without narrowing the value space. The
/// result is clamped into `[0, ngates)` for value spaces that do not
/// divide evenly.
pub fn modulo(window: &[u8], mask: Option<u64>, ngates: u16) -> u16 {
    let mut value: u64 = 0;
    for &b in window {
        value = (value << 8) | b as u64;
    }
    if let Some(m) = mask {
        value &= m;
    }

    let space: u128 = 1u128 << (8 * window.len() as u32);
    let width = space / ngates as u128;
    let gate = (value as u128 / width) as u16;
    gate.min(ngates - 1)
}

/// Longest window the modulo policy can read as one integer.
pub const MODULO_WINDOW_MAX: usize = 8;

/// Precomputed consistent-hashing ring.
///
/// Each gate owns `buckets` virtual points, the one-way (crc32) hash
/// of the `(gate, bucket)` pair. A packet maps to the gate owning the
/// first point at or after the packet's own window hash, wrapping to
/// the smallest point. Because a gate's points do not move when the
/// gate count changes, resizing remaps only the flows whose successor
/// point belonged to the added or removed gates — about `1/n` of
/// them.
#[derive(Clone, Debug)]
pub struct ConsistentRing {
    points: Vec<(u32, u16)>,
}

impl ConsistentRing {
    pub fn new(ngates: u16, buckets: u16) -> Result<Self, ModuleError> {
        if buckets == 0 {
            return Err(ModuleError::InvalidArgument {
                field: "policy.buckets".to_string(),
                msg: "must be at least 1".to_string(),
            });
        }

        let n = ngates as usize * buckets as usize;
        let mut points = Vec::new();
        points.try_reserve_exact(n).map_err(|_| {
            ModuleError::ResourceExhausted {
                what: "consistent-hash ring".to_string(),
            }
        })?;

        for g in 0..ngates {
            for b in 0..buckets {
                let mut h = crc32fast::Hasher::new();
                h.update(&g.to_be_bytes());
                h.update(&b.to_be_bytes());
                points.push((h.finalize(), g));
            }
        }
        points.sort_unstable();

        Ok(Self { points })
    }

    /// The window hash consistent lookups key on.
    pub fn hash_window(window: &[u8]) -> u32 {
        crc32fast::hash(window)
    }

    /// Ring-successor lookup.
    pub fn gate(&self, hash: u32) -> u16 {
        let i = self.points.partition_point(|p| p.0 < hash);
        let i = if i == self.points.len() { 0 } else { i };
        self.points[i].1
    }
}
