use bytes::Bytes;
use strum_macros::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::timing::Tick;

/// Physical layer the radio is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Phy {
    #[default]
    #[strum(to_string = "LE 1M")]
    Le1M,
    #[strum(to_string = "LE 2M")]
    Le2M,
    #[strum(to_string = "LE Coded S2")]
    CodedS2,
    #[strum(to_string = "LE Coded S8")]
    CodedS8,
}

/// A frame captured by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub bytes: Bytes,
    /// Tick at which reception completed
    pub timestamp: Tick,
}

/// Radio transceiver driven by the link layer.
///
/// Every operation is issue-then-poll: `transmit` and `receive` only arm the
/// hardware, and the caller spins on `tx_done` / `rx_ready`. Register
/// programming, whitening and CRC generation all live behind this trait.
pub trait Radio {
    /// Set the access address, CRC init and PHY used by later operations.
    fn configure(&mut self, access_address: u32, crc_init: u32, phy: Phy);

    /// Start transmitting `pdu` (header and payload) on `channel`.
    fn transmit(&mut self, pdu: &[u8], channel: u8);

    fn tx_done(&mut self) -> bool;

    /// Start listening on `channel`.
    fn receive(&mut self, channel: u8);

    /// Whether a frame has been received since the last `receive`.
    fn rx_ready(&mut self) -> bool;

    /// The most recently received frame. Only meaningful after `rx_ready`.
    fn frame(&self) -> RxFrame;

    /// Stop any transmission or reception in progress.
    fn idle(&mut self);
}

impl<R: Radio + ?Sized> Radio for &mut R {
    fn configure(&mut self, access_address: u32, crc_init: u32, phy: Phy) {
        (**self).configure(access_address, crc_init, phy)
    }

    fn transmit(&mut self, pdu: &[u8], channel: u8) {
        (**self).transmit(pdu, channel)
    }

    fn tx_done(&mut self) -> bool {
        (**self).tx_done()
    }

    fn receive(&mut self, channel: u8) {
        (**self).receive(channel)
    }

    fn rx_ready(&mut self) -> bool {
        (**self).rx_ready()
    }

    fn frame(&self) -> RxFrame {
        (**self).frame()
    }

    fn idle(&mut self) {
        (**self).idle()
    }
}
