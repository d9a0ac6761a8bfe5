// Copyright 2025-2026 CEMAXECUTER LLC

use crate::address::{AccessAddress, LinkLayerAddress};
use crate::ble::{reverse_crc_init, PDU_CONNECT_IND};
use crate::frame::LePacket;

pub const BLE_MAX_CONNECTIONS: usize = 128;

/// LLData length of a CONNECT_IND: InitA(6) + AdvA(6) + LLData(22)
const CONNECT_IND_LEN: usize = 34;

/// Fields of a CONNECT_IND PDU needed to follow the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInd {
    pub aa: AccessAddress,
    pub crc_init: u32,
    pub init_addr: LinkLayerAddress,
    pub adv_addr: LinkLayerAddress,
    pub channel_map: [u8; 5],
    pub hop_increment: u8,
    pub interval: u16,
    pub latency: u16,
    pub timeout: u16,
}

impl ConnectInd {
    /// Parse a CONNECT_IND from an advertising channel packet.
    /// Payload layout: InitA(6) + AdvA(6) + AA(4) + CrcInit(3) + WinSize(1)
    /// + WinOffset(2) + Interval(2) + Latency(2) + Timeout(2) + ChM(5) + Hop/SCA(1)
    pub fn parse(p: &LePacket<'_>) -> Option<Self> {
        if !p.is_advertising() || !p.access_address().is_advertising() {
            return None;
        }
        if p.pdu_type() != PDU_CONNECT_IND || p.pdu_len() != CONNECT_IND_LEN {
            return None;
        }

        let d = p.payload();
        let init_addr: [u8; 6] = d[0..6].try_into().ok()?;
        let adv_addr: [u8; 6] = d[6..12].try_into().ok()?;
        let aa = u32::from_le_bytes(d[12..16].try_into().ok()?);
        let crc_init = d[16] as u32 | ((d[17] as u32) << 8) | ((d[18] as u32) << 16);
        // byte 19: WinSize, bytes 20-21: WinOffset (skip)
        let interval = u16::from_le_bytes(d[22..24].try_into().ok()?);
        let latency = u16::from_le_bytes(d[24..26].try_into().ok()?);
        let timeout = u16::from_le_bytes(d[26..28].try_into().ok()?);
        let channel_map: [u8; 5] = d[28..33].try_into().ok()?;
        let hop_increment = d[33] & 0x1F;

        Some(Self {
            aa: AccessAddress(aa),
            crc_init,
            init_addr: LinkLayerAddress::from_wire(init_addr),
            adv_addr: LinkLayerAddress::from_wire(adv_addr),
            channel_map,
            hop_increment,
            interval,
            latency,
            timeout,
        })
    }
}

/// BLE connection tracking (populated from CONNECT_IND packets)
#[derive(Debug, Clone)]
pub struct BleConnection {
    pub params: ConnectInd,
    pub created: u64,
    pub last_seen: u64,
    pub pkt_count: u32,
}

/// Connection table: tracks BLE connections from CONNECT_IND PDUs,
/// evicting the least recently seen entry when full.
pub struct ConnectionTable {
    slots: Vec<BleConnection>,
    capacity: usize,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::with_capacity(BLE_MAX_CONNECTIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn lookup(&self, aa: AccessAddress) -> Option<&BleConnection> {
        self.slots.iter().find(|c| c.params.aa == aa)
    }

    fn lookup_mut(&mut self, aa: AccessAddress) -> Option<&mut BleConnection> {
        self.slots.iter_mut().find(|c| c.params.aa == aa)
    }

    /// Add or refresh a connection. Returns true if a new connection was added.
    pub fn add(&mut self, params: ConnectInd, now: u64) -> bool {
        if let Some(c) = self.lookup_mut(params.aa) {
            c.last_seen = now;
            if c.params.crc_init != params.crc_init {
                log::debug!("connection {} re-established, new CRC init {:06x}", params.aa, params.crc_init);
                c.params = params;
                c.created = now;
                c.pkt_count = 0;
            }
            return false;
        }

        let conn = BleConnection {
            params,
            created: now,
            last_seen: now,
            pkt_count: 0,
        };

        if self.slots.len() < self.capacity {
            self.slots.push(conn);
        } else if let Some(oldest) = self.slots.iter_mut().min_by_key(|c| c.last_seen) {
            log::debug!("connection table full, evicting {}", oldest.params.aa);
            *oldest = conn;
        }
        true
    }

    /// Register the connection announced by a CONNECT_IND, if `p` is one.
    pub fn observe(&mut self, p: &LePacket<'_>, now: u64) -> Option<AccessAddress> {
        let ind = ConnectInd::parse(p)?;
        let (aa, crc_init) = (ind.aa, ind.crc_init);
        if self.add(ind, now) {
            log::info!("tracking connection {} (CRC init {:06x})", aa, crc_init);
        }
        Some(aa)
    }

    /// CRC engine seed for a data channel access address, if the connection
    /// is known. Updates last_seen and pkt_count for tracked connections.
    pub fn crc_seed_for_aa(&mut self, aa: AccessAddress, now: u64) -> Option<u32> {
        let c = self.lookup_mut(aa)?;
        c.last_seen = now;
        c.pkt_count += 1;
        Some(reverse_crc_init(c.params.crc_init))
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{with_crc, ADV_CRC_SEED, BLE_ADV_AA};
    use crate::frame::RawFrame;

    fn conn(aa: u32, crc_init: u32) -> ConnectInd {
        ConnectInd {
            aa: AccessAddress(aa),
            crc_init,
            init_addr: LinkLayerAddress::default(),
            adv_addr: LinkLayerAddress::default(),
            channel_map: [0xFF, 0xFF, 0xFF, 0xFF, 0x1F],
            hop_increment: 7,
            interval: 24,
            latency: 0,
            timeout: 200,
        }
    }

    fn connect_ind_packet(aa: u32, crc_init: u32) -> Vec<u8> {
        let mut pdu = vec![PDU_CONNECT_IND, CONNECT_IND_LEN as u8];
        pdu.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]); // InitA
        pdu.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]); // AdvA
        pdu.extend_from_slice(&aa.to_le_bytes());
        pdu.extend_from_slice(&crc_init.to_le_bytes()[..3]);
        pdu.push(2); // WinSize
        pdu.extend_from_slice(&[0, 0]); // WinOffset
        pdu.extend_from_slice(&24u16.to_le_bytes());
        pdu.extend_from_slice(&0u16.to_le_bytes());
        pdu.extend_from_slice(&200u16.to_le_bytes());
        pdu.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        pdu.push(0x27); // hop 7, SCA 1
        let mut pkt = BLE_ADV_AA.to_le_bytes().to_vec();
        pkt.extend_from_slice(&with_crc(&pdu, ADV_CRC_SEED));
        pkt
    }

    #[test]
    fn test_connection_table_add_lookup() {
        let mut table = ConnectionTable::new();
        assert_eq!(table.count(), 0);

        assert!(table.add(conn(0x12345678, 0xABCDEF), 1000));
        assert_eq!(table.count(), 1);

        let c = table.lookup(AccessAddress(0x12345678)).unwrap();
        assert_eq!(c.params.crc_init, 0xABCDEF);
        assert_eq!(c.params.hop_increment, 7);
        assert_eq!(c.params.interval, 24);

        // Adding same AA should not create new entry
        assert!(!table.add(conn(0x12345678, 0xABCDEF), 2000));
        assert_eq!(table.count(), 1);
        assert_eq!(table.lookup(AccessAddress(0x12345678)).unwrap().last_seen, 2000);
    }

    #[test]
    fn test_connection_table_eviction() {
        let mut table = ConnectionTable::with_capacity(4);
        for i in 0..4u32 {
            table.add(conn(i + 1, 0x111111), i as u64);
        }
        assert_eq!(table.count(), 4);

        // Adding one more should evict the oldest (last_seen = 0)
        table.add(conn(0xFFFFFFFF, 0x222222), 1000);
        assert_eq!(table.count(), 4);
        assert!(table.lookup(AccessAddress(0xFFFFFFFF)).is_some());
        assert!(table.lookup(AccessAddress(1)).is_none());
    }

    #[test]
    fn test_parse_connect_ind_packet() {
        let frame = RawFrame::with_le_packet(0, -50, &connect_ind_packet(0x50557BA1, 0x123456)).unwrap();
        let pkt = frame.le_packet().unwrap();
        let ind = ConnectInd::parse(&pkt).unwrap();
        assert_eq!(ind.aa, AccessAddress(0x50557BA1));
        assert_eq!(ind.crc_init, 0x123456);
        assert_eq!(ind.init_addr.to_string(), "66:55:44:33:22:11");
        assert_eq!(ind.adv_addr.to_string(), "ff:ee:dd:cc:bb:aa");
        assert_eq!(ind.interval, 24);
        assert_eq!(ind.timeout, 200);
        assert_eq!(ind.hop_increment, 7);
    }

    #[test]
    fn test_seed_lookup_reverses_crc_init() {
        let mut table = ConnectionTable::new();
        let frame = RawFrame::with_le_packet(24, 0, &connect_ind_packet(0x50557BA1, 0x555555)).unwrap();
        assert_eq!(table.observe(&frame.le_packet().unwrap(), 1), Some(AccessAddress(0x50557BA1)));

        assert_eq!(table.crc_seed_for_aa(AccessAddress(0x50557BA1), 2), Some(0xAAAAAA));
        assert_eq!(table.lookup(AccessAddress(0x50557BA1)).unwrap().pkt_count, 1);
        assert_eq!(table.crc_seed_for_aa(AccessAddress(0x01020304), 2), None);
    }
}
