// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Output-gate staging and split assignment.
//!
//! The driver owns the wiring between modules. During a process call
//! a module stages sub-batches on a [`GateSet`] the driver passes in;
//! after the call returns the driver drains each gate and delivers
//! the staged packets to the downstream consumer.

use super::batch::PacketBatch;
use super::packet::Packet;
use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::GateIdx;
use manifold_api::MAX_GATES;
use manifold_api::ModuleError;
use manifold_api::SplitRangeCfg;

/// Per-gate staging for one module's output side.
#[derive(Debug, Default)]
pub struct GateSet {
    out: Vec<PacketBatch>,
}

impl GateSet {
    /// Create staging for `ogates` output gates. The width is the
    /// module's effective output-gate count: every routing decision
    /// is bounded by it.
    pub fn new(ogates: usize) -> Self {
        let mut out = Vec::with_capacity(ogates);
        out.resize_with(ogates, PacketBatch::new);
        Self { out }
    }

    pub fn ogates(&self) -> usize {
        self.out.len()
    }

    /// Stage one packet on `gate`; hands the packet back when the
    /// gate is unknown or its batch is full.
    pub(crate) fn push(
        &mut self,
        gate: GateIdx,
        pkt: Packet,
    ) -> Result<(), Packet> {
        match self.out.get_mut(gate as usize) {
            Some(b) => b.push(pkt),
            None => Err(pkt),
        }
    }

    /// Number of packets currently staged on `gate`.
    pub fn staged(&self, gate: GateIdx) -> usize {
        self.out.get(gate as usize).map(|b| b.len()).unwrap_or(0)
    }

    /// Drain the batch staged on `gate`.
    pub fn take(&mut self, gate: GateIdx) -> PacketBatch {
        match self.out.get_mut(gate as usize) {
            Some(b) => core::mem::take(b),
            None => PacketBatch::new(),
        }
    }
}

/// One contiguous range of output gates assigned to an input gate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SplitRange {
    pub base: GateIdx,
    pub count: u16,
}

/// Per-input-gate mapping to contiguous output-gate ranges.
///
/// Ranges never overlap in gate-index space and never reach past
/// [`MAX_GATES`]; both are enforced at construction.
#[derive(Clone, Debug)]
pub struct SplitTable {
    ranges: Vec<Option<SplitRange>>,
}

impl SplitTable {
    pub fn new(cfg: &[SplitRangeCfg]) -> Result<SplitTable, ModuleError> {
        let mut ranges: Vec<Option<SplitRange>> = Vec::new();
        let mut covered = [false; MAX_GATES];

        for r in cfg {
            let igate = r.igate as usize;
            if igate >= MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "gates.igate".to_string(),
                    msg: format!("input gate {} exceeds {}", r.igate, MAX_GATES),
                });
            }

            let end = r.base as usize + r.count as usize;
            if end > MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "gates.base".to_string(),
                    msg: format!(
                        "range {}..{} exceeds {} gates",
                        r.base, end, MAX_GATES
                    ),
                });
            }

            for slot in &mut covered[r.base as usize..end] {
                if *slot {
                    return Err(ModuleError::InvalidArgument {
                        field: "gates".to_string(),
                        msg: format!(
                            "range {}..{} overlaps another range",
                            r.base, end
                        ),
                    });
                }
                *slot = true;
            }

            if ranges.len() <= igate {
                ranges.resize(igate + 1, None);
            }
            if ranges[igate].is_some() {
                return Err(ModuleError::InvalidArgument {
                    field: "gates.igate".to_string(),
                    msg: format!("input gate {} assigned twice", r.igate),
                });
            }
            ranges[igate] = Some(SplitRange { base: r.base, count: r.count });
        }

        Ok(SplitTable { ranges })
    }

    /// The output range assigned to `igate`, if any.
    pub fn range(&self, igate: GateIdx) -> Option<SplitRange> {
        self.ranges.get(igate as usize).copied().flatten()
    }

    /// Number of input gates the table addresses.
    pub fn igates(&self) -> usize {
        self.ranges.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::packet::PacketPool;

    fn r(igate: u16, base: u16, count: u16) -> SplitRangeCfg {
        SplitRangeCfg { igate, base, count }
    }

    #[test]
    fn split_ranges_disjoint() {
        let t = SplitTable::new(&[r(0, 0, 4), r(1, 4, 4), r(2, 8, 0)])
            .unwrap();
        assert_eq!(t.range(0), Some(SplitRange { base: 0, count: 4 }));
        assert_eq!(t.range(1), Some(SplitRange { base: 4, count: 4 }));
        assert_eq!(t.range(2), Some(SplitRange { base: 8, count: 0 }));
        assert_eq!(t.range(3), None);
    }

    #[test]
    fn split_rejects_overlap() {
        assert!(matches!(
            SplitTable::new(&[r(0, 0, 4), r(1, 3, 4)]),
            Err(ModuleError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn split_rejects_overflow() {
        assert!(matches!(
            SplitTable::new(&[r(0, 96, 8)]),
            Err(ModuleError::InvalidArgument { .. })
        ));
        assert!(matches!(
            SplitTable::new(&[r(MAX_GATES as u16, 0, 1)]),
            Err(ModuleError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn split_rejects_duplicate_igate() {
        assert!(matches!(
            SplitTable::new(&[r(0, 0, 2), r(0, 2, 2)]),
            Err(ModuleError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn gate_set_stage_and_take() {
        let mut pool = PacketPool::new(2, 32).unwrap();
        let mut gates = GateSet::new(2);

        gates.push(1, pool.alloc().unwrap()).unwrap();
        gates.push(1, pool.alloc().unwrap()).unwrap();
        assert_eq!(gates.staged(0), 0);
        assert_eq!(gates.staged(1), 2);

        let batch = gates.take(1);
        assert_eq!(batch.len(), 2);
        assert_eq!(gates.staged(1), 0);

        // Unknown gate hands the packet back.
        let mut batch = batch;
        let pkt = batch.pop().unwrap();
        let pkt = gates.push(7, pkt).unwrap_err();
        pool.free(pkt);
    }
}
