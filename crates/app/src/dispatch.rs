// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;

use bt_output::{FrameRecord, SinkRegistry};
use bt_protocol::ble::{compute_crc, ADV_CRC_SEED, DATA_CRC_SEED};
use bt_protocol::ble_connection::ConnectionTable;
use bt_protocol::{AccessAddress, CrcErrorBudget, FrameError, RawFrame, Timespec};

/// Why a frame was not forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Malformed(FrameError),
    /// Access address too far from the expected one
    AccessAddress { offenses: u32 },
    CrcMismatch { expected: u32, carried: u32 },
}

/// Result of dispatching one raw frame
#[derive(Debug)]
pub enum Verdict<'a> {
    Accepted(FrameRecord<'a>),
    Rejected(RejectReason),
}

/// Per-session dispatch counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub aa_rejected: u64,
    pub crc_rejected: u64,
    pub sink_failures: u64,
    pub connections: usize,
}

impl CaptureStats {
    pub fn rejected(&self) -> u64 {
        self.malformed + self.aa_rejected + self.crc_rejected
    }

    fn record(&mut self, verdict: &Verdict<'_>) {
        self.frames += 1;
        match verdict {
            Verdict::Accepted(_) => self.accepted += 1,
            Verdict::Rejected(RejectReason::Malformed(_)) => self.malformed += 1,
            Verdict::Rejected(RejectReason::AccessAddress { .. }) => self.aa_rejected += 1,
            Verdict::Rejected(RejectReason::CrcMismatch { .. }) => self.crc_rejected += 1,
        }
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames: {} accepted: {} rejected: {} (malformed {}, AA {}, CRC {}) sink errors: {} conns: {}",
            self.frames,
            self.accepted,
            self.rejected(),
            self.malformed,
            self.aa_rejected,
            self.crc_rejected,
            self.sink_failures,
            self.connections,
        )
    }
}

/// Validates raw frames and routes the accepted ones to the sinks.
///
/// Checks run in order: frame shape, access address against the error
/// budget, then (when verification is on) the CRC with the seed of the
/// frame's channel class. With verification off a damaged length byte is
/// not a rejection; the record covers the whole payload area instead.
pub struct Dispatcher {
    verify: bool,
    expected_aa: Option<AccessAddress>,
    budget: CrcErrorBudget,
    connections: ConnectionTable,
    stats: CaptureStats,
}

impl Dispatcher {
    pub fn new(verify: bool, expected_aa: Option<AccessAddress>, budget: CrcErrorBudget) -> Self {
        Self {
            verify,
            expected_aa,
            budget,
            connections: ConnectionTable::new(),
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            connections: self.connections.count(),
            ..self.stats.clone()
        }
    }

    pub fn dispatch<'a>(&mut self, frame: &'a RawFrame) -> Verdict<'a> {
        self.dispatch_at(frame, Timespec::now())
    }

    pub fn dispatch_at<'a>(&mut self, frame: &'a RawFrame, timestamp: Timespec) -> Verdict<'a> {
        let verdict = self.classify(frame, timestamp);
        self.stats.record(&verdict);
        if let Verdict::Rejected(reason) = &verdict {
            log::debug!("frame rejected: {:?}", reason);
        }
        verdict
    }

    /// Dispatch one frame and forward it to every sink if accepted.
    /// Returns whether the frame was accepted.
    pub fn process(&mut self, frame: &RawFrame, sinks: &mut SinkRegistry) -> bool {
        match self.dispatch(frame) {
            Verdict::Accepted(rec) => {
                self.stats.sink_failures += sinks.write_all(&rec) as u64;
                true
            }
            Verdict::Rejected(_) => false,
        }
    }

    fn classify<'a>(&mut self, frame: &'a RawFrame, timestamp: Timespec) -> Verdict<'a> {
        let shape = if self.verify {
            frame.le_packet()
        } else {
            frame.le_packet_clamped()
        };
        let packet = match shape {
            Ok(p) => p,
            Err(e) => return Verdict::Rejected(RejectReason::Malformed(e)),
        };

        let aa = packet.access_address();
        let ref_aa = if packet.is_advertising() {
            Some(AccessAddress::ADVERTISING)
        } else {
            self.expected_aa
        };

        let mut offenses = 0;
        if let Some(expected) = ref_aa {
            offenses = aa.offenses(expected);
            if !self.budget.permits(expected, aa) {
                return Verdict::Rejected(RejectReason::AccessAddress { offenses });
            }
        }

        let mut rec = FrameRecord {
            frame,
            packet,
            timestamp,
            crc_checked: false,
            crc_valid: false,
            aa_offenses: offenses as u8,
            ref_aa,
        };
        if !self.verify {
            return Verdict::Accepted(rec);
        }

        let seed = if packet.is_advertising() {
            ADV_CRC_SEED
        } else {
            self.connections
                .crc_seed_for_aa(aa, timestamp.tv_sec)
                .unwrap_or(DATA_CRC_SEED)
        };
        let expected = compute_crc(seed, packet.pdu());
        let carried = packet.carried_crc();
        if expected != carried {
            return Verdict::Rejected(RejectReason::CrcMismatch { expected, carried });
        }

        if packet.is_advertising() {
            self.connections.observe(&packet, timestamp.tv_sec);
        }
        rec.crc_checked = true;
        rec.crc_valid = true;
        Verdict::Accepted(rec)
    }
}
