// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::str::FromStr;

use crate::ble::BLE_ADV_AA;
use crate::error::ValidationError;

/// Length of a MAC address in its textual form: 6 hex pairs + 5 separators
pub const MAC_TEXT_LEN: usize = 6 * 2 + 5;

/// BLE device address, stored in display order (most significant octet first).
/// On air the octets are sent in reverse, see [`LinkLayerAddress::to_wire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkLayerAddress([u8; 6]);

impl LinkLayerAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Build from the over-the-air (least significant octet first) layout.
    pub fn from_wire(wire: [u8; 6]) -> Self {
        let mut octets = wire;
        octets.reverse();
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Octets in transmission order, as embedded in advertising PDUs.
    pub fn to_wire(&self) -> [u8; 6] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }
}

impl fmt::Display for LinkLayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for LinkLayerAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_mac(s)
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Parse `xx:xx:xx:xx:xx:xx` into an address in display order.
///
/// Length is checked first, then every hex pair and every separator.
/// Nothing is decoded until the whole string has been validated.
pub fn parse_mac(s: &str) -> Result<LinkLayerAddress, ValidationError> {
    let b = s.as_bytes();
    if b.len() != MAC_TEXT_LEN {
        return Err(ValidationError::InvalidLength(b.len()));
    }

    for i in (0..6 * 3).step_by(3) {
        if hex_nibble(b[i]).is_none() {
            return Err(ValidationError::InvalidCharacter(i));
        }
        if hex_nibble(b[i + 1]).is_none() {
            return Err(ValidationError::InvalidCharacter(i + 1));
        }
        if i < 5 * 3 && b[i + 2] != b':' {
            return Err(ValidationError::InvalidCharacter(i + 2));
        }
    }

    let mut octets = [0u8; 6];
    for (n, octet) in octets.iter_mut().enumerate() {
        let hi = hex_nibble(b[n * 3]).unwrap_or(0);
        let lo = hex_nibble(b[n * 3 + 1]).unwrap_or(0);
        *octet = (hi << 4) | lo;
    }
    Ok(LinkLayerAddress(octets))
}

/// 32-bit link-layer access address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessAddress(pub u32);

impl AccessAddress {
    /// Fixed access address of the advertising channels
    pub const ADVERTISING: AccessAddress = AccessAddress(BLE_ADV_AA);

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_advertising(&self) -> bool {
        self.0 == BLE_ADV_AA
    }

    /// Number of differing bits against `other`
    pub fn offenses(&self, other: AccessAddress) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for AccessAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_access_address(*self))
    }
}

impl FromStr for AccessAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_access_address(s)
    }
}

/// Parse 8 hex digits (optionally prefixed with `0x`) as an access address.
pub fn parse_access_address(s: &str) -> Result<AccessAddress, ValidationError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != 8 || !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAccessAddress(s.to_string()));
    }
    u32::from_str_radix(digits, 16)
        .map(AccessAddress)
        .map_err(|_| ValidationError::InvalidAccessAddress(s.to_string()))
}

pub fn format_access_address(aa: AccessAddress) -> String {
    format!("{:08x}", aa.0)
}

/// Number of access-address bit errors tolerated before a frame is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcErrorBudget(u32);

impl CrcErrorBudget {
    pub const MAX: u32 = 32;

    pub fn new(errors: u32) -> Result<Self, ValidationError> {
        if errors > Self::MAX {
            return Err(ValidationError::BudgetOutOfRange(errors));
        }
        Ok(Self(errors))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// True when `actual` is within the tolerated Hamming distance of `expected`.
    pub fn permits(&self, expected: AccessAddress, actual: AccessAddress) -> bool {
        actual.offenses(expected) <= self.0
    }
}

impl Default for CrcErrorBudget {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_mac_display_order() {
        let mac = parse_mac("22:44:66:88:aa:cc").unwrap();
        assert_eq!(mac.octets(), [0x22, 0x44, 0x66, 0x88, 0xAA, 0xCC]);
        assert_eq!(mac.to_wire(), [0xCC, 0xAA, 0x88, 0x66, 0x44, 0x22]);
        assert_eq!(mac.to_string(), "22:44:66:88:aa:cc");
    }

    #[test]
    fn test_parse_mac_uppercase() {
        let mac: LinkLayerAddress = "DE:AD:BE:EF:00:01".parse().unwrap();
        assert_eq!(mac.octets(), [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_mac_wrong_length() {
        assert_eq!(
            parse_mac("22:44:66:88:aa"),
            Err(ValidationError::InvalidLength(14))
        );
        // a missing separator also shortens the text, so length wins
        assert_eq!(
            parse_mac("224466:88:aa:cc"),
            Err(ValidationError::InvalidLength(15))
        );
    }

    #[test]
    fn test_parse_mac_bad_hex() {
        assert_eq!(
            parse_mac("2g:44:66:88:aa:cc"),
            Err(ValidationError::InvalidCharacter(1))
        );
    }

    #[test]
    fn test_parse_mac_missing_separator() {
        assert_eq!(
            parse_mac("224466:88:aa:cc:e"),
            Err(ValidationError::InvalidCharacter(2))
        );
        assert_eq!(
            parse_mac("22:44:66:88:aa-cc"),
            Err(ValidationError::InvalidCharacter(14))
        );
    }

    #[test]
    fn test_from_wire_reverses() {
        let mac = LinkLayerAddress::from_wire([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(mac.to_string(), "11:22:33:44:55:66");
    }

    #[test]
    fn test_access_address_parse_format() {
        let aa = parse_access_address("8e89bed6").unwrap();
        assert_eq!(aa, AccessAddress::ADVERTISING);
        assert!(aa.is_advertising());
        assert_eq!(parse_access_address("0x0000BEEF").unwrap().0, 0xBEEF);
        assert_eq!(format_access_address(AccessAddress(0xBEEF)), "0000beef");
    }

    #[test]
    fn test_access_address_rejects_garbage() {
        assert!(parse_access_address("8e89bed").is_err());
        assert!(parse_access_address("8e89bedz").is_err());
        assert!(parse_access_address("8e89bed600").is_err());
        assert!(parse_access_address("").is_err());
    }

    #[test]
    fn test_budget_range() {
        assert!(CrcErrorBudget::new(32).is_ok());
        assert_eq!(
            CrcErrorBudget::new(33),
            Err(ValidationError::BudgetOutOfRange(33))
        );
        assert_eq!(CrcErrorBudget::default().get(), 32);
    }

    #[test]
    fn test_budget_zero_requires_exact_match() {
        let budget = CrcErrorBudget::new(0).unwrap();
        let expected = AccessAddress::ADVERTISING;
        assert!(budget.permits(expected, expected));
        assert!(!budget.permits(expected, AccessAddress(BLE_ADV_AA ^ 0x0000_0100)));
    }

    proptest! {
        #[test]
        fn prop_full_budget_accepts_anything(expected in any::<u32>(), actual in any::<u32>()) {
            let budget = CrcErrorBudget::default();
            prop_assert!(budget.permits(AccessAddress(expected), AccessAddress(actual)));
        }

        #[test]
        fn prop_budget_matches_hamming_distance(
            expected in any::<u32>(),
            actual in any::<u32>(),
            errors in 0u32..=32,
        ) {
            let budget = CrcErrorBudget::new(errors).unwrap();
            let distance = (expected ^ actual).count_ones();
            prop_assert_eq!(
                budget.permits(AccessAddress(expected), AccessAddress(actual)),
                distance <= errors
            );
        }
    }
}
