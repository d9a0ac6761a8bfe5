// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;

use crate::error::ValidationError;

/// One of the three BLE advertising channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvertisingChannel {
    #[default]
    Ch37,
    Ch38,
    Ch39,
}

impl AdvertisingChannel {
    pub fn index(self) -> u8 {
        match self {
            AdvertisingChannel::Ch37 => 37,
            AdvertisingChannel::Ch38 => 38,
            AdvertisingChannel::Ch39 => 39,
        }
    }

    /// Channel setting in the unit the device expects (MHz).
    pub fn frequency(self) -> u16 {
        match self {
            AdvertisingChannel::Ch37 => 2402,
            AdvertisingChannel::Ch38 => 2426,
            AdvertisingChannel::Ch39 => 2480,
        }
    }
}

impl TryFrom<u32> for AdvertisingChannel {
    type Error = ValidationError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        match index {
            37 => Ok(AdvertisingChannel::Ch37),
            38 => Ok(AdvertisingChannel::Ch38),
            39 => Ok(AdvertisingChannel::Ch39),
            other => Err(ValidationError::InvalidChannelIndex(other)),
        }
    }
}

impl fmt::Display for AdvertisingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} MHz)", self.index(), self.frequency())
    }
}

/// Map an advertising channel index to its device channel setting.
pub fn resolve_channel(index: u32) -> Result<u16, ValidationError> {
    AdvertisingChannel::try_from(index).map(AdvertisingChannel::frequency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freq_to_channel;

    #[test]
    fn test_resolve_advertising_channels() {
        assert_eq!(resolve_channel(37), Ok(2402));
        assert_eq!(resolve_channel(38), Ok(2426));
        assert_eq!(resolve_channel(39), Ok(2480));
    }

    #[test]
    fn test_resolve_rejects_other_indices() {
        assert_eq!(resolve_channel(36), Err(ValidationError::InvalidChannelIndex(36)));
        assert_eq!(resolve_channel(40), Err(ValidationError::InvalidChannelIndex(40)));
        assert!(resolve_channel(0).is_err());
    }

    #[test]
    fn test_frequency_maps_back_to_index() {
        for ch in [AdvertisingChannel::Ch37, AdvertisingChannel::Ch38, AdvertisingChannel::Ch39] {
            assert_eq!(freq_to_channel(ch.frequency() as u32), Some(ch.index()));
        }
    }
}
