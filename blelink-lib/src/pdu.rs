use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::address::DeviceAddress;
use crate::channel::ChannelMap;
use crate::constants::{HOP_MASK, SCA_SHIFT};

/// Advertising channel PDU header.
///
/// ```text
/// LSB                                                           MSB
/// | PDU Type | RFU | ChSel | TxAdd | RxAdd | Length | RFU |
/// | 4 bits   | 1   | 1     | 1     | 1     | 6 bits | 2   |
/// ```
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvHeader {
    pub pdu_type: B4,
    #[skip]
    rfu0: bool,
    pub ch_sel: bool,
    pub tx_add: bool,
    pub rx_add: bool,
    pub length: B6,
    #[skip]
    rfu1: B2,
}

impl AdvHeader {
    pub fn kind(&self) -> PduType {
        PduType::from_primitive(self.pdu_type())
    }
}

/// Data channel PDU header.
///
/// ```text
/// LSB                                                  MSB
/// | LLID   | NESN | SN | MD | RFU    | Length |
/// | 2 bits | 1    | 1  | 1  | 3 bits | 8 bits |
/// ```
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataHeader {
    pub llid: B2,
    pub nesn: bool,
    pub sn: bool,
    pub md: bool,
    #[skip]
    rfu: B3,
    pub length: u8,
}

impl DataHeader {
    pub fn link_id(&self) -> Llid {
        Llid::from_primitive(self.llid())
    }
}

/// Advertising channel PDU types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum PduType {
    #[strum(to_string = "ADV_IND")]
    AdvInd = 0x00,
    #[strum(to_string = "ADV_DIRECT_IND")]
    AdvDirectInd = 0x01,
    #[strum(to_string = "ADV_NONCONN_IND")]
    AdvNonconnInd = 0x02,
    #[strum(to_string = "SCAN_REQ")]
    ScanReq = 0x03,
    #[strum(to_string = "SCAN_RSP")]
    ScanRsp = 0x04,
    #[strum(to_string = "CONNECT_REQ")]
    ConnectReq = 0x05,
    #[strum(to_string = "ADV_SCAN_IND")]
    AdvScanInd = 0x06,
    #[strum(to_string = "AUX_EXT_IND")]
    AuxExtInd = 0x07,
    #[strum(to_string = "AUX_CONNECT_RSP")]
    AuxConnectRsp = 0x08,

    #[num_enum(catch_all)]
    #[strum(to_string = "UNKNOWN")]
    Unknown(u8),
}

impl PduType {
    /// Every type the header can name explicitly.
    pub const KNOWN: [PduType; 9] = [
        PduType::AdvInd,
        PduType::AdvDirectInd,
        PduType::AdvNonconnInd,
        PduType::ScanReq,
        PduType::ScanRsp,
        PduType::ConnectReq,
        PduType::AdvScanInd,
        PduType::AuxExtInd,
        PduType::AuxConnectRsp,
    ];

    /// Whether a peer may answer this advertisement with a CONNECT_REQ.
    pub fn is_connectable(&self) -> bool {
        matches!(self, PduType::AdvInd | PduType::AdvDirectInd)
    }

    /// Whether a peer may answer this advertisement with a SCAN_REQ.
    pub fn is_scannable(&self) -> bool {
        matches!(self, PduType::AdvInd | PduType::AdvScanInd)
    }
}

/// Logical link identifier of a data channel PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Llid {
    #[num_enum(default)]
    Reserved = 0b00,
    /// Continuation fragment, or an empty PDU
    DataContinue = 0b01,
    /// Start of an L2CAP message
    DataStart = 0b10,
    Control = 0b11,
}

/// SCAN_REQ payload (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ScanRequest {
    pub initiator: DeviceAddress,
    pub advertiser: DeviceAddress,
}

/// CONNECT_REQ payload (34 bytes): InitA, AdvA and the LLData block
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ConnectRequest {
    pub initiator: DeviceAddress,
    pub advertiser: DeviceAddress,
    pub access_address: U32,
    pub crc_init: [u8; 3],  // 24-bit little-endian
    pub win_size: u8,       // 1.25 ms units
    pub win_offset: U16,    // 1.25 ms units
    pub interval: U16,      // 1.25 ms units
    pub latency: U16,       // connection events
    pub timeout: U16,       // 10 ms units
    pub channel_map: [u8; 5],
    pub hop_sca: u8,        // hop increment (5 bits) + SCA (3 bits)
}

impl ConnectRequest {
    pub fn access_address(&self) -> u32 {
        self.access_address.get()
    }

    pub fn crc_init(&self) -> u32 {
        u32::from_le_bytes([self.crc_init[0], self.crc_init[1], self.crc_init[2], 0])
    }

    pub fn hop_increment(&self) -> u8 {
        self.hop_sca & HOP_MASK
    }

    pub fn sleep_clock_accuracy(&self) -> u8 {
        self.hop_sca >> SCA_SHIFT
    }

    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap::from_bytes(self.channel_map)
    }
}

/// Connection parameters used to build a CONNECT_REQ payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub initiator: DeviceAddress,
    pub advertiser: DeviceAddress,
    pub access_address: u32,
    pub crc_init: u32,
    pub win_size: u8,
    pub win_offset: u16,
    pub interval: u16,
    pub latency: u16,
    pub timeout: u16,
    pub channel_map: ChannelMap,
    pub hop_increment: u8,
    pub sca: u8,
}

impl From<ConnectParams> for ConnectRequest {
    fn from(p: ConnectParams) -> Self {
        let crc = p.crc_init.to_le_bytes();
        ConnectRequest {
            initiator: p.initiator,
            advertiser: p.advertiser,
            access_address: U32::new(p.access_address),
            crc_init: [crc[0], crc[1], crc[2]],
            win_size: p.win_size,
            win_offset: U16::new(p.win_offset),
            interval: U16::new(p.interval),
            latency: U16::new(p.latency),
            timeout: U16::new(p.timeout),
            channel_map: p.channel_map.to_bytes(),
            hop_sca: (p.hop_increment & HOP_MASK) | (p.sca << SCA_SHIFT),
        }
    }
}
