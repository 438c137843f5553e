use std::fmt;
use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::ADDRESS_SIZE;
use crate::error::LinkError;

/// A 48-bit device address in over-the-air byte order.
///
/// BLE transmits addresses least significant byte first, so the bytes held
/// here are the reverse of the usual `11:22:33:44:55:66` notation. Two
/// addresses are equal when their over-the-air bytes are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
#[repr(transparent)]
pub struct DeviceAddress([u8; ADDRESS_SIZE]);

impl DeviceAddress {
    /// Wrap bytes that are already in over-the-air order.
    pub const fn from_air_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from the human-readable 48-bit value, e.g. `0x112233445566`.
    pub const fn from_u64(mac: u64) -> Self {
        Self([
            mac as u8,
            (mac >> 8) as u8,
            (mac >> 16) as u8,
            (mac >> 24) as u8,
            (mac >> 32) as u8,
            (mac >> 40) as u8,
        ])
    }

    pub fn to_u64(&self) -> u64 {
        self.0
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Bytes as they appear on air.
    pub fn air_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAddress({})", self)
    }
}

impl FromStr for DeviceAddress {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != ADDRESS_SIZE {
            return Err(LinkError::InvalidAddress(s.to_string()));
        }
        let mut bytes = [0u8; ADDRESS_SIZE];
        // Human-readable order is most significant byte first
        for (slot, part) in bytes.iter_mut().rev().zip(parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| LinkError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = LinkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.to_string()
    }
}

/// Public or random address, signalled by the TxAdd/RxAdd header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AddressKind {
    #[default]
    Public,
    Random,
}

impl AddressKind {
    pub fn from_bit(bit: bool) -> Self {
        if bit { AddressKind::Random } else { AddressKind::Public }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, AddressKind::Random)
    }
}
