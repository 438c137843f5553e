use bytes::{BufMut, Bytes, BytesMut};
use strum_macros::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ad::{AdStructure, FLAGS_CONNECTABLE, encode_ad_structures};
use crate::address::{AddressKind, DeviceAddress};
use crate::constants::{DEFAULT_ADV_INTERVAL_MS, DEFAULT_ADV_RX_WINDOW_US, MAX_PDU_SIZE};
use crate::error::LinkError;
use crate::frame::encode_advertising;
use crate::pdu::PduType;
use crate::radio::Phy;
use crate::timing::TickRate;

/// Which undirected advertising PDU the peripheral sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdvertisingMode {
    /// ADV_IND: scannable and connectable
    #[default]
    #[strum(to_string = "connectable")]
    Connectable,
    /// ADV_SCAN_IND: scannable only
    #[strum(to_string = "scannable")]
    Scannable,
    /// ADV_NONCONN_IND: broadcast only
    #[strum(to_string = "non-connectable")]
    NonConnectable,
}

impl AdvertisingMode {
    pub fn pdu_type(&self) -> PduType {
        match self {
            AdvertisingMode::Connectable => PduType::AdvInd,
            AdvertisingMode::Scannable => PduType::AdvScanInd,
            AdvertisingMode::NonConnectable => PduType::AdvNonconnInd,
        }
    }
}

/// Static configuration of a [`LinkLayer`](crate::link::LinkLayer).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    pub address: DeviceAddress,
    pub address_kind: AddressKind,
    pub mode: AdvertisingMode,
    pub advertising_data: Vec<AdStructure>,
    /// Empty means SCAN_REQs are not answered
    pub scan_response_data: Vec<AdStructure>,
    pub adv_interval_ms: u32,
    /// How long to listen after each advertisement
    pub adv_rx_window_us: u32,
    pub tick_rate: TickRate,
    pub phy: Phy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: DeviceAddress::from_u64(0x1122_3344_5566),
            address_kind: AddressKind::Public,
            mode: AdvertisingMode::Connectable,
            advertising_data: vec![
                AdStructure::Flags(FLAGS_CONNECTABLE),
                AdStructure::CompleteLocalName("blelink".to_string()),
            ],
            scan_response_data: Vec::new(),
            adv_interval_ms: DEFAULT_ADV_INTERVAL_MS,
            adv_rx_window_us: DEFAULT_ADV_RX_WINDOW_US,
            tick_rate: TickRate::new(1),
            phy: Phy::Le1M,
        }
    }
}

/// Advertising channel PDUs encoded once from a [`LinkConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPdus {
    pub advertisement: Bytes,
    pub scan_response: Option<Bytes>,
}

impl LinkConfig {
    /// Encode the advertisement and, when configured, the scan response.
    ///
    /// Fails when either AD payload does not fit next to the address.
    pub fn prepare(&self) -> Result<PreparedPdus, LinkError> {
        let advertisement = self.encode(self.mode.pdu_type(), &self.advertising_data)?;
        let scan_response = if self.scan_response_data.is_empty() {
            None
        } else {
            Some(self.encode(PduType::ScanRsp, &self.scan_response_data)?)
        };
        Ok(PreparedPdus {
            advertisement,
            scan_response,
        })
    }

    fn encode(&self, pdu_type: PduType, structures: &[AdStructure]) -> Result<Bytes, LinkError> {
        let ad = encode_ad_structures(structures)?;
        let mut payload = BytesMut::with_capacity(self.address.air_bytes().len() + ad.len());
        payload.put_slice(self.address.air_bytes());
        payload.put_slice(&ad);

        let mut buf = [0u8; MAX_PDU_SIZE];
        let len = encode_advertising(pdu_type, self.address_kind.is_random(), &payload, &mut buf)?;
        Ok(Bytes::copy_from_slice(&buf[..len]))
    }
}
