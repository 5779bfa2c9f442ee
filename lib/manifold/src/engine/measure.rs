// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The latency measurer: records per-packet latency samples against
//! send timestamps embedded by a peer stamping stage, and answers
//! percentile queries over the recorded distribution.

use super::batch::PacketBatch;
use super::histogram::Histogram;
use super::histogram::Record;
use super::module::CmdSafety;
use super::module::CommandDesc;
use super::module::Module;
use super::module::ModuleSpec;
use super::module::ProcCtx;
use super::module::Result;
use super::module::decode_req;
use super::module::encode_resp;
use super::module::unsupported;
use super::packet::Packet;
use super::NANOS;
use crate::ExecCtx;
use crate::provider::LogLevel;
use crate::stat::StatNamed;
use crate::stat::StatProvider;
use crate::stat::StatU64;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use manifold_api::GateIdx;
use manifold_api::GetPtileReq;
use manifold_api::GetPtileResp;
use manifold_api::GetSummaryResp;
use manifold_api::MeasureCfg;
use manifold_api::ModuleError;
use manifold_api::NoResp;
use manifold_api::SaveSnapshotReq;
use manifold_api::CMD_CLEAR;
use manifold_api::CMD_GET_PTILE;
use manifold_api::CMD_GET_SUMMARY;
use manifold_api::CMD_SAVE_SNAPSHOT;
use stat_macro::StatProvider;

/// Snapshot slots per instance.
pub const MAX_SNAPSHOTS: usize = 8;

/// Default offset of the timestamp block: past an Ethernet + IPv4 +
/// TCP header span.
pub const DEFAULT_TS_OFFSET: u16 = 54;

static SPEC: ModuleSpec = ModuleSpec {
    name: "LatencyMeasurer",
    igates: 1,
    ogates: 1,
    commands: &[
        CommandDesc { name: CMD_GET_SUMMARY, safety: CmdSafety::DataPathSafe },
        CommandDesc { name: CMD_CLEAR, safety: CmdSafety::DataPathSafe },
        CommandDesc {
            name: CMD_SAVE_SNAPSHOT,
            safety: CmdSafety::DataPathSafe,
        },
        CommandDesc { name: CMD_GET_PTILE, safety: CmdSafety::DataPathSafe },
    ],
};

#[derive(StatProvider)]
struct MeasureStats {
    /// Packets seen after warmup, measured or not.
    pkts: StatU64,
    /// Bytes of measured packets only.
    bytes: StatU64,
    /// Sum of recorded latencies.
    total_latency_ns: StatU64,
    /// Packets without a readable stamp, or stamped in the future.
    skipped: StatU64,
    /// Samples the histogram could not place.
    out_of_range: StatU64,
}

pub struct LatencyMeasurer {
    stats: StatNamed<MeasureStats>,
    curr: Histogram,
    snapshots: [Option<Histogram>; MAX_SNAPSHOTS],
    warmup_ns: u64,
    ts_offset: usize,
    start_ns: u64,
    ectx: Arc<ExecCtx>,
}

impl LatencyMeasurer {
    pub fn new(
        name: &str,
        cfg: MeasureCfg,
        ectx: Arc<ExecCtx>,
    ) -> Result<Self> {
        let stats = StatNamed::new("manifold", name, MeasureStats::new())
            .map_err(|e| ModuleError::InvalidArgument {
                field: "name".to_string(),
                msg: e.to_string(),
            })?;

        Ok(Self {
            stats,
            curr: Histogram::new()?,
            snapshots: core::array::from_fn(|_| None),
            warmup_ns: cfg.warmup_secs.saturating_mul(NANOS),
            ts_offset: cfg.ts_offset.unwrap_or(DEFAULT_TS_OFFSET) as usize,
            start_ns: 0,
            ectx,
        })
    }

    fn get_summary(&self) -> GetSummaryResp {
        let snap = self.stats.vals.snapshot();
        GetSummaryResp {
            packets: snap.pkts,
            bits: (snap.bytes + snap.pkts * 24) * 8,
            total_latency_ns: snap.total_latency_ns,
        }
    }

    fn save_snapshot(&mut self, req: SaveSnapshotReq) -> Result<()> {
        let idx = req.index as usize;
        if idx >= MAX_SNAPSHOTS {
            return Err(ModuleError::InvalidArgument {
                field: "index".to_string(),
                msg: format!("must be 0..{}, got {}", MAX_SNAPSHOTS, req.index),
            });
        }
        self.snapshots[idx] = Some(self.curr.snapshot()?);
        Ok(())
    }

    fn get_ptile(&self, req: &GetPtileReq) -> Result<GetPtileResp> {
        for p in &req.percentiles {
            if !(0.0..=100.0).contains(p) {
                return Err(ModuleError::InvalidArgument {
                    field: "percentiles".to_string(),
                    msg: format!("must be 0 - 100, got {}", p),
                });
            }
        }

        let snap = self
            .snapshots
            .get(req.index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| ModuleError::NotFound {
                what: format!("snapshot {}", req.index),
            })?;

        Ok(GetPtileResp {
            latencies_ns: self.curr.diff_percentiles(snap, &req.percentiles),
        })
    }
}

/// Read the marker byte and, when set, the little-endian send
/// timestamp behind it.
fn read_stamp(pkt: &Packet, offset: usize) -> Option<u64> {
    let data = pkt.data();
    if *data.get(offset)? == 0 {
        return None;
    }
    let ts = data.get(offset + 1..offset + 9)?;
    Some(u64::from_le_bytes(ts.try_into().ok()?))
}

impl Module for LatencyMeasurer {
    fn spec(&self) -> &'static ModuleSpec {
        &SPEC
    }

    fn process_batch(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        _igate: GateIdx,
        batch: PacketBatch,
    ) {
        let now = ctx.now_ns;
        if self.start_ns == 0 {
            self.start_ns = now;
        }

        if now.saturating_sub(self.start_ns) < self.warmup_ns {
            ctx.forward(0, batch);
            return;
        }

        self.stats.vals.pkts += batch.len() as u64;

        for pkt in batch.iter() {
            let sent = match read_stamp(pkt, self.ts_offset) {
                Some(sent) if sent <= now => sent,
                _ => {
                    self.stats.vals.skipped += 1;
                    continue;
                }
            };

            let diff = now - sent;
            self.stats.vals.bytes += pkt.len() as u64;
            self.stats.vals.total_latency_ns += diff;

            if self.curr.record(diff) == Record::OutOfRange {
                self.stats.vals.out_of_range += 1;
                self.ectx.log.log(
                    LogLevel::Error,
                    &format!("cannot place latency sample: {} ns", diff),
                );
            }
        }

        ctx.forward(0, batch);
    }

    fn command(&mut self, name: &str, arg: &[u8]) -> Result<Vec<u8>> {
        match name {
            CMD_GET_SUMMARY => encode_resp(&self.get_summary()),
            CMD_CLEAR => {
                self.curr.clear();
                encode_resp(&NoResp::default())
            }
            CMD_SAVE_SNAPSHOT => {
                let req: SaveSnapshotReq = decode_req(arg)?;
                self.save_snapshot(req)?;
                encode_resp(&NoResp::default())
            }
            CMD_GET_PTILE => {
                let req: GetPtileReq = decode_req(arg)?;
                encode_resp(&self.get_ptile(&req)?)
            }
            _ => Err(unsupported(SPEC.name, name)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::gate::GateSet;
    use crate::engine::packet::PacketPool;
    use crate::provider::PrintlnLog;
    use alloc::boxed::Box;

    fn ectx() -> Arc<ExecCtx> {
        Arc::new(ExecCtx { log: Box::new(PrintlnLog) })
    }

    fn stamped(pool: &mut PacketPool, offset: usize, sent_ns: u64) -> Packet {
        let mut pkt = pool.alloc().unwrap();
        pkt.set_len(offset + 16);
        pkt.data_mut()[offset] = 1;
        pkt.data_mut()[offset + 1..offset + 9]
            .copy_from_slice(&sent_ns.to_le_bytes());
        pkt
    }

    fn measurer(warmup_secs: u64) -> LatencyMeasurer {
        let cfg = MeasureCfg { warmup_secs, ts_offset: None };
        LatencyMeasurer::new("measure0", cfg, ectx()).unwrap()
    }

    #[test]
    fn records_latency_after_warmup() {
        let mut pool = PacketPool::new(8, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(0);

        let now = 2_000_000u64;
        let mut batch = PacketBatch::new();
        batch
            .push(stamped(&mut pool, DEFAULT_TS_OFFSET as usize, 500_000))
            .unwrap();
        let mut ctx = ProcCtx { now_ns: now, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, batch);

        // 1.5 ms: decade 4, bucket 150.
        assert_eq!(m.curr.count(4, 150), 1);
        assert_eq!(m.stats.vals.snapshot().pkts, 1);
        assert_eq!(m.stats.vals.snapshot().total_latency_ns, 1_500_000);
        assert_eq!(gates.staged(0), 1);
    }

    #[test]
    fn warmup_skips_but_forwards() {
        let mut pool = PacketPool::new(8, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(1);

        let mut batch = PacketBatch::new();
        batch
            .push(stamped(&mut pool, DEFAULT_TS_OFFSET as usize, 100))
            .unwrap();
        let mut ctx =
            ProcCtx { now_ns: 1_000, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, batch);

        assert_eq!(m.curr.total(), 0);
        assert_eq!(m.stats.vals.snapshot().pkts, 0);
        assert_eq!(gates.staged(0), 1);

        // Past the warmup window the same packet is measured.
        let mut batch = PacketBatch::new();
        batch
            .push(stamped(&mut pool, DEFAULT_TS_OFFSET as usize, 100))
            .unwrap();
        let mut ctx = ProcCtx {
            now_ns: 1_000 + 2 * NANOS,
            pool: &mut pool,
            gates: &mut gates,
        };
        m.process_batch(&mut ctx, 0, batch);
        assert_eq!(m.curr.total(), 1);
    }

    #[test]
    fn empty_batch_records_nothing() {
        let mut pool = PacketPool::new(2, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(0);

        let mut ctx =
            ProcCtx { now_ns: 5_000, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, PacketBatch::new());

        assert_eq!(m.curr.total(), 0);
        assert_eq!(gates.staged(0), 0);
    }

    #[test]
    fn unstamped_and_future_packets_skipped() {
        let mut pool = PacketPool::new(8, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(0);
        let off = DEFAULT_TS_OFFSET as usize;

        let mut batch = PacketBatch::new();
        // Marker clear.
        let mut unstamped = pool.alloc().unwrap();
        unstamped.set_len(off + 16);
        batch.push(unstamped).unwrap();
        // Stamped in the future.
        batch.push(stamped(&mut pool, off, 9_999_999)).unwrap();
        // Too short to carry a stamp.
        let mut short = pool.alloc().unwrap();
        short.set_len(8);
        batch.push(short).unwrap();

        let mut ctx =
            ProcCtx { now_ns: 1_000_000, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, batch);

        assert_eq!(m.curr.total(), 0);
        assert_eq!(m.stats.vals.snapshot().skipped, 3);
        assert_eq!(gates.staged(0), 3);
    }

    #[test]
    fn ptile_command_roundtrip() {
        let mut pool = PacketPool::new(8, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(0);
        let off = DEFAULT_TS_OFFSET as usize;

        let req = postcard::to_allocvec(&SaveSnapshotReq { index: 0 }).unwrap();
        m.command(CMD_SAVE_SNAPSHOT, &req).unwrap();

        let now = 10_000_000u64;
        let mut batch = PacketBatch::new();
        for sent in [now - 5_000, now - 5_000, now - 70_000] {
            batch.push(stamped(&mut pool, off, sent)).unwrap();
        }
        let mut ctx = ProcCtx { now_ns: now, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, batch);

        let req = postcard::to_allocvec(&GetPtileReq {
            index: 0,
            percentiles: vec![50.0, 100.0],
        })
        .unwrap();
        let resp = m.command(CMD_GET_PTILE, &req).unwrap();
        let resp: GetPtileResp = postcard::from_bytes(&resp).unwrap();

        let mut fresh = Histogram::new().unwrap();
        for lat in [5_000, 5_000, 70_000] {
            fresh.record(lat);
        }
        assert_eq!(
            resp.latencies_ns,
            fresh.percentiles(&[50.0, 100.0])
        );
    }

    #[test]
    fn ptile_errors() {
        let mut m = measurer(0);

        // Unpopulated snapshot slot.
        let req = postcard::to_allocvec(&GetPtileReq {
            index: 3,
            percentiles: vec![50.0],
        })
        .unwrap();
        assert!(matches!(
            m.command(CMD_GET_PTILE, &req),
            Err(ModuleError::NotFound { .. })
        ));

        // Percentile out of range.
        let save =
            postcard::to_allocvec(&SaveSnapshotReq { index: 0 }).unwrap();
        m.command(CMD_SAVE_SNAPSHOT, &save).unwrap();
        let req = postcard::to_allocvec(&GetPtileReq {
            index: 0,
            percentiles: vec![150.0],
        })
        .unwrap();
        assert!(matches!(
            m.command(CMD_GET_PTILE, &req),
            Err(ModuleError::InvalidArgument { .. })
        ));

        // Snapshot index out of range.
        let save =
            postcard::to_allocvec(&SaveSnapshotReq { index: 99 }).unwrap();
        assert!(matches!(
            m.command(CMD_SAVE_SNAPSHOT, &save),
            Err(ModuleError::InvalidArgument { .. })
        ));

        // Unknown command.
        assert!(matches!(
            m.command("no_such_cmd", &[]),
            Err(ModuleError::Unsupported { .. })
        ));
    }

    #[test]
    fn summary_counts_framing_overhead() {
        let mut pool = PacketPool::new(8, 128).unwrap();
        let mut gates = GateSet::new(1);
        let mut m = measurer(0);
        let off = DEFAULT_TS_OFFSET as usize;

        let mut batch = PacketBatch::new();
        batch.push(stamped(&mut pool, off, 1_000)).unwrap();
        let mut ctx =
            ProcCtx { now_ns: 2_000, pool: &mut pool, gates: &mut gates };
        m.process_batch(&mut ctx, 0, batch);

        let resp = m.command(CMD_GET_SUMMARY, &[]).unwrap();
        let resp: GetSummaryResp = postcard::from_bytes(&resp).unwrap();
        assert_eq!(resp.packets, 1);
        // One 70-byte packet plus 24 bytes of framing, in bits.
        assert_eq!(resp.bits, (70 + 24) * 8);
        assert_eq!(resp.total_latency_ns, 1_000);
    }
}
