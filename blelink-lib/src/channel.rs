use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::DATA_CHANNEL_COUNT;
use crate::error::LinkError;

const MAP_MASK: u64 = (1 << DATA_CHANNEL_COUNT) - 1;

/// 37-bit map of the data channels a connection may use.
///
/// Bit `n` (little-endian across the 5 on-air bytes) marks channel `n`.
/// The 3 high bits of the last byte are reserved and ignored.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelMap(u64);

impl ChannelMap {
    pub const ALL: ChannelMap = ChannelMap(MAP_MASK);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits & MAP_MASK)
    }

    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        let mut wide = [0u8; 8];
        wide[..5].copy_from_slice(&bytes);
        Self::from_bits(u64::from_le_bytes(wide))
    }

    /// Map with exactly the listed channels set. Out of range channels are ignored.
    pub fn from_channels(channels: &[u8]) -> Self {
        let bits = channels
            .iter()
            .filter(|&&c| c < DATA_CHANNEL_COUNT)
            .fold(0u64, |acc, &c| acc | 1 << c);
        Self(bits)
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let wide = self.0.to_le_bytes();
        [wide[0], wide[1], wide[2], wide[3], wide[4]]
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_used(&self, channel: u8) -> bool {
        channel < DATA_CHANNEL_COUNT && self.0 & (1 << channel) != 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }
}

impl fmt::Debug for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMap({:#012x})", self.0)
    }
}

/// Ascending list of the data channels set in a [`ChannelMap`].
///
/// Construction guarantees at least two entries, so the remap modulo in
/// [`next_channel`] can never divide by zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedChannels {
    map: ChannelMap,
    channels: Vec<u8>,
}

impl UsedChannels {
    pub fn from_map(map: ChannelMap) -> Result<Self, LinkError> {
        let channels: Vec<u8> = (0..DATA_CHANNEL_COUNT).filter(|&c| map.is_used(c)).collect();
        if channels.len() < 2 {
            return Err(LinkError::DegenerateChannelMap { used: channels.len() });
        }
        Ok(Self { map, channels })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, channel: u8) -> bool {
        self.map.is_used(channel)
    }

    pub fn map(&self) -> ChannelMap {
        self.map
    }

    /// Map an unmapped channel onto the used list.
    pub fn remap(&self, unmapped: u8) -> u8 {
        if self.contains(unmapped) {
            unmapped
        } else {
            self.channels[unmapped as usize % self.channels.len()]
        }
    }
}

/// Channel selection #1: hop from `last` by `hop_increment`, remapping onto
/// `used` when the candidate channel is not in the map.
pub fn next_channel(last: u8, hop_increment: u8, used: &UsedChannels) -> u8 {
    used.remap(unmapped_hop(last, hop_increment))
}

fn unmapped_hop(last: u8, hop_increment: u8) -> u8 {
    ((last as u16 + hop_increment as u16) % DATA_CHANNEL_COUNT as u16) as u8
}

/// Per-connection channel sequence.
///
/// The hop arithmetic always continues from the last *unmapped* channel,
/// while the radio is tuned to the remapped one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelector {
    used: UsedChannels,
    hop_increment: u8,
    last_unmapped: u8,
    current: u8,
}

impl ChannelSelector {
    pub fn new(used: UsedChannels, hop_increment: u8) -> Self {
        Self {
            used,
            hop_increment,
            last_unmapped: 0,
            current: 0,
        }
    }

    /// Hop to the next connection event channel and return it.
    pub fn next(&mut self) -> u8 {
        self.last_unmapped = unmapped_hop(self.last_unmapped, self.hop_increment);
        self.current = self.used.remap(self.last_unmapped);
        self.current
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn used(&self) -> &UsedChannels {
        &self.used
    }
}
