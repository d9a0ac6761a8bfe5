// Copyright 2025-2026 CEMAXECUTER LLC

use crate::address::LinkLayerAddress;

pub const BLE_ADV_AA: u32 = 0x8E89BED6;

/// CRC engine seed for advertising channel packets
pub const ADV_CRC_SEED: u32 = 0xAAAAAA;
/// CRC engine seed for data channel packets of an unknown connection
pub const DATA_CRC_SEED: u32 = 0x555555;

/// Feedback taps of x^24 + x^10 + x^9 + x^6 + x^4 + x^3 + x + 1, minus bit 23
const LFSR_MASK: u32 = 0x5A6000;

// Advertising PDU types used here (header byte 0, low nibble)
pub const PDU_ADV_IND: u8 = 0x00;
pub const PDU_ADV_NONCONN_IND: u8 = 0x02;
pub const PDU_CONNECT_IND: u8 = 0x05;

/// Advertising data carried by the diagnostic ADV_IND in transmit mode
pub const TRANSMIT_ADV_DATA: [u8; 2] = [0x1D, 0x3F];

/// BLE CRC-24 as a 24-bit LFSR, fed least significant bit first.
///
/// `seed` is the register preset in the engine's bit order: 0xAAAAAA for
/// advertising channels, the bit-reversed CrcInit of the connection for data
/// channels (see [`reverse_crc_init`]). Empty input returns the masked seed.
pub fn compute_crc(seed: u32, data: &[u8]) -> u32 {
    let mut state = seed & 0xFFFFFF;

    for &byte in data {
        let mut cur = byte;
        for _ in 0..8 {
            let feedback = (state ^ cur as u32) & 1;
            cur >>= 1;
            state >>= 1;
            if feedback != 0 {
                state |= 1 << 23;
                state ^= LFSR_MASK;
            }
        }
    }

    state
}

/// Reflect (bit-reverse) a 24-bit value.
/// Turns a CONNECT_IND CrcInit field into a [`compute_crc`] seed.
pub fn reverse_crc_init(mut v: u32) -> u32 {
    let mut result: u32 = 0;
    for _ in 0..24 {
        result = (result << 1) | (v & 1);
        v >>= 1;
    }
    result
}

/// CRC as carried on air: three bytes, least significant first
pub fn crc_to_bytes(crc: u32) -> [u8; 3] {
    [
        (crc & 0xFF) as u8,
        ((crc >> 8) & 0xFF) as u8,
        ((crc >> 16) & 0xFF) as u8,
    ]
}

pub fn crc_from_bytes(b: [u8; 3]) -> u32 {
    b[0] as u32 | ((b[1] as u32) << 8) | ((b[2] as u32) << 16)
}

/// Build an ADV_IND PDU (header + AdvA + AdvData, no CRC).
/// The advertiser address is embedded in wire order.
pub fn adv_ind(adv_a: &LinkLayerAddress, adv_data: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(2 + 6 + adv_data.len());
    pdu.push(PDU_ADV_IND);
    pdu.push((6 + adv_data.len()) as u8);
    pdu.extend_from_slice(&adv_a.to_wire());
    pdu.extend_from_slice(adv_data);
    pdu
}

/// Append the CRC computed with `seed` to a PDU.
pub fn with_crc(pdu: &[u8], seed: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(pdu.len() + 3);
    out.extend_from_slice(pdu);
    out.extend_from_slice(&crc_to_bytes(compute_crc(seed, pdu)));
    out
}

/// Space separated lowercase hex dump, as used in diagnostic output
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
