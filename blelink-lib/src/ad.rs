use bytes::{BufMut, Bytes, BytesMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::MAX_AD_DATA;
use crate::error::LinkError;

// AD type codes from the assigned numbers document
pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_SERVICE_UUIDS_16: u8 = 0x03;
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TYPE_TX_POWER: u8 = 0x0A;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

// Flags AD values
pub const FLAGS_LE_LIMITED_DISC: u8 = 0x01;
pub const FLAGS_LE_GENERAL_DISC: u8 = 0x02;
pub const FLAGS_BR_EDR_NOT_SUPPORTED: u8 = 0x04;
pub const FLAGS_SIMULTANEOUS_LE_AND_BR_EDR: u8 = 0x08;
/// General discoverable, BR/EDR not supported
pub const FLAGS_CONNECTABLE: u8 = FLAGS_LE_GENERAL_DISC | FLAGS_BR_EDR_NOT_SUPPORTED;

/// One length-type-value element of advertising or scan response data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdStructure {
    Flags(u8),
    TxPower(i8),
    ServiceUuids16(Vec<u16>),
    CompleteLocalName(String),
    ManufacturerData { company_id: u16, data: Vec<u8> },
    Raw { ad_type: u8, data: Vec<u8> },
}

impl AdStructure {
    pub fn ad_type(&self) -> u8 {
        match self {
            AdStructure::Flags(_) => AD_TYPE_FLAGS,
            AdStructure::TxPower(_) => AD_TYPE_TX_POWER,
            AdStructure::ServiceUuids16(_) => AD_TYPE_SERVICE_UUIDS_16,
            AdStructure::CompleteLocalName(_) => AD_TYPE_COMPLETE_LOCAL_NAME,
            AdStructure::ManufacturerData { .. } => AD_TYPE_MANUFACTURER_DATA,
            AdStructure::Raw { ad_type, .. } => *ad_type,
        }
    }

    /// Encoded size including the length and type octets.
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            AdStructure::Flags(_) | AdStructure::TxPower(_) => 1,
            AdStructure::ServiceUuids16(uuids) => uuids.len() * 2,
            AdStructure::CompleteLocalName(name) => name.len(),
            AdStructure::ManufacturerData { data, .. } => 2 + data.len(),
            AdStructure::Raw { data, .. } => data.len(),
        }
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8((self.encoded_len() - 1) as u8);
        buf.put_u8(self.ad_type());
        match self {
            AdStructure::Flags(flags) => buf.put_u8(*flags),
            AdStructure::TxPower(dbm) => buf.put_i8(*dbm),
            AdStructure::ServiceUuids16(uuids) => uuids.iter().for_each(|&uuid| buf.put_u16_le(uuid)),
            AdStructure::CompleteLocalName(name) => buf.put_slice(name.as_bytes()),
            AdStructure::ManufacturerData { company_id, data } => {
                buf.put_u16_le(*company_id);
                buf.put_slice(data);
            }
            AdStructure::Raw { data, .. } => buf.put_slice(data),
        }
    }
}

/// Concatenate AD structures into an advertising payload body.
///
/// The result must fit next to the 6-byte advertiser address in a 37-byte
/// advertising payload.
pub fn encode_ad_structures(structures: &[AdStructure]) -> Result<Bytes, LinkError> {
    let len: usize = structures.iter().map(AdStructure::encoded_len).sum();
    if len > MAX_AD_DATA {
        return Err(LinkError::AdvertisingDataTooLong { len, max: MAX_AD_DATA });
    }
    let mut buf = BytesMut::with_capacity(len);
    for structure in structures {
        structure.write_to(&mut buf);
    }
    Ok(buf.freeze())
}
