use tracing::warn;

use crate::address::DeviceAddress;
use crate::channel::{ChannelMap, UsedChannels};
use crate::constants::{MAX_CONN_INTERVAL, MAX_HOP_INCREMENT, MIN_CONN_INTERVAL, MIN_HOP_INCREMENT};
use crate::error::LinkError;
use crate::pdu::ConnectRequest;
use crate::timing::TickRate;

/// Connection parameters negotiated by a CONNECT_REQ.
///
/// Built once per connection and never modified afterwards. Raw values keep
/// their on-air units; the `*_ticks` accessors convert them for a given
/// hardware tick rate so the context stays independent of the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    initiator: DeviceAddress,
    advertiser: DeviceAddress,
    access_address: u32,
    crc_init: u32,
    win_size: u8,
    win_offset: u16,
    interval: u16,
    latency: u16,
    timeout: u16,
    hop_increment: u8,
    sca: u8,
    used_channels: UsedChannels,
}

impl ConnectionContext {
    /// Rejects only a channel map with fewer than two usable channels.
    pub fn from_connect_request(request: &ConnectRequest) -> Result<Self, LinkError> {
        let used_channels = UsedChannels::from_map(request.channel_map())?;

        let interval = request.interval.get();
        if !(MIN_CONN_INTERVAL..=MAX_CONN_INTERVAL).contains(&interval) {
            warn!(interval, "Connection interval outside 7.5 ms..4 s");
        }
        let hop_increment = request.hop_increment();
        if !(MIN_HOP_INCREMENT..=MAX_HOP_INCREMENT).contains(&hop_increment) {
            warn!(hop_increment, "Hop increment outside 5..=16");
        }

        Ok(Self {
            initiator: request.initiator,
            advertiser: request.advertiser,
            access_address: request.access_address(),
            crc_init: request.crc_init(),
            win_size: request.win_size,
            win_offset: request.win_offset.get(),
            interval,
            latency: request.latency.get(),
            timeout: request.timeout.get(),
            hop_increment,
            sca: request.sleep_clock_accuracy(),
            used_channels,
        })
    }

    pub fn initiator(&self) -> DeviceAddress {
        self.initiator
    }

    pub fn advertiser(&self) -> DeviceAddress {
        self.advertiser
    }

    pub fn access_address(&self) -> u32 {
        self.access_address
    }

    pub fn crc_init(&self) -> u32 {
        self.crc_init
    }

    /// Transmit window size in 1.25 ms units
    pub fn win_size(&self) -> u8 {
        self.win_size
    }

    /// Transmit window offset in 1.25 ms units
    pub fn win_offset(&self) -> u16 {
        self.win_offset
    }

    /// Connection interval in 1.25 ms units
    pub fn interval(&self) -> u16 {
        self.interval
    }

    pub fn latency(&self) -> u16 {
        self.latency
    }

    /// Supervision timeout in 10 ms units
    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    pub fn hop_increment(&self) -> u8 {
        self.hop_increment
    }

    pub fn sleep_clock_accuracy(&self) -> u8 {
        self.sca
    }

    pub fn channel_map(&self) -> ChannelMap {
        self.used_channels.map()
    }

    pub fn used_channels(&self) -> &UsedChannels {
        &self.used_channels
    }

    pub fn window_offset_ticks(&self, rate: TickRate) -> u32 {
        rate.ticks_for_1250us_units(self.win_offset as u32)
    }

    pub fn window_end_ticks(&self, rate: TickRate) -> u32 {
        rate.ticks_for_1250us_units(self.win_offset as u32 + self.win_size as u32)
    }

    pub fn interval_ticks(&self, rate: TickRate) -> u32 {
        rate.ticks_for_1250us_units(self.interval as u32)
    }

    pub fn supervision_timeout_ticks(&self, rate: TickRate) -> u32 {
        rate.ticks_for_10ms_units(self.timeout as u32)
    }
}
