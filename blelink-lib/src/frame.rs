//! Classification and encoding of over-the-air PDUs.
//!
//! Received buffers are never reinterpreted in place: the 2-byte header is
//! decoded explicitly, the declared length is checked against both the
//! buffer and the protocol limit, and fixed payload layouts are only borrowed
//! when their size matches exactly.

use zerocopy::FromBytes;

use crate::constants::{CONNECT_REQ_SIZE, HEADER_SIZE, MAX_ADV_PAYLOAD, MAX_DATA_PAYLOAD, SCAN_REQ_SIZE};
use crate::error::{FrameDefect, LinkError};
use crate::pdu::{AdvHeader, ConnectRequest, DataHeader, PduType, ScanRequest};

/// Which kind of channel a buffer was received on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Advertising,
    Data,
}

/// A classified PDU, borrowing the buffer it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PduView<'a> {
    ScanRequest {
        header: AdvHeader,
        request: &'a ScanRequest,
    },
    ConnectRequest {
        header: AdvHeader,
        request: &'a ConnectRequest,
    },
    /// Any other advertising channel PDU, not interpreted further
    Advertisement {
        pdu_type: PduType,
        header: AdvHeader,
        payload: &'a [u8],
    },
    Data {
        header: DataHeader,
        payload: &'a [u8],
    },
}

impl<'a> PduView<'a> {
    /// The PDU payload bytes, whatever the variant.
    pub fn payload(&self) -> &'a [u8] {
        use zerocopy::IntoBytes;
        match *self {
            PduView::ScanRequest { request, .. } => request.as_bytes(),
            PduView::ConnectRequest { request, .. } => request.as_bytes(),
            PduView::Advertisement { payload, .. } => payload,
            PduView::Data { payload, .. } => payload,
        }
    }

    pub fn pdu_type(&self) -> Option<PduType> {
        match *self {
            PduView::ScanRequest { .. } => Some(PduType::ScanReq),
            PduView::ConnectRequest { .. } => Some(PduType::ConnectReq),
            PduView::Advertisement { pdu_type, .. } => Some(pdu_type),
            PduView::Data { .. } => None,
        }
    }
}

/// Classify a received buffer. Never reads past the end of `buffer`.
pub fn classify(buffer: &[u8], kind: ChannelKind) -> Result<PduView<'_>, LinkError> {
    match kind {
        ChannelKind::Advertising => classify_advertising(buffer),
        ChannelKind::Data => classify_data(buffer),
    }
}

pub fn classify_advertising(buffer: &[u8]) -> Result<PduView<'_>, LinkError> {
    let (header_bytes, rest) = split_header(buffer)?;
    let header = AdvHeader::from_bytes(header_bytes);
    let payload = checked_payload(rest, header.length() as usize, MAX_ADV_PAYLOAD)?;

    match header.kind() {
        PduType::ScanReq => {
            let request = fixed_layout::<ScanRequest>(payload, PduType::ScanReq, SCAN_REQ_SIZE)?;
            Ok(PduView::ScanRequest { header, request })
        }
        PduType::ConnectReq => {
            let request = fixed_layout::<ConnectRequest>(payload, PduType::ConnectReq, CONNECT_REQ_SIZE)?;
            Ok(PduView::ConnectRequest { header, request })
        }
        pdu_type => Ok(PduView::Advertisement {
            pdu_type,
            header,
            payload,
        }),
    }
}

pub fn classify_data(buffer: &[u8]) -> Result<PduView<'_>, LinkError> {
    let (header_bytes, rest) = split_header(buffer)?;
    let header = DataHeader::from_bytes(header_bytes);
    let payload = checked_payload(rest, header.length() as usize, MAX_DATA_PAYLOAD)?;
    Ok(PduView::Data { header, payload })
}

/// Decode only the data header, without validating the length.
pub fn peek_data_header(buffer: &[u8]) -> Option<DataHeader> {
    split_header(buffer).ok().map(|(h, _)| DataHeader::from_bytes(h))
}

fn split_header(buffer: &[u8]) -> Result<([u8; HEADER_SIZE], &[u8]), LinkError> {
    if buffer.len() < HEADER_SIZE {
        return Err(FrameDefect::MissingHeader { actual: buffer.len() }.into());
    }
    let (head, rest) = buffer.split_at(HEADER_SIZE);
    Ok(([head[0], head[1]], rest))
}

fn checked_payload(rest: &[u8], declared: usize, max: usize) -> Result<&[u8], LinkError> {
    if declared > max {
        return Err(FrameDefect::OverLimit { declared, max }.into());
    }
    rest.get(..declared).ok_or_else(|| {
        FrameDefect::Truncated {
            declared,
            available: rest.len(),
        }
        .into()
    })
}

fn fixed_layout<'a, T>(payload: &'a [u8], pdu_type: PduType, expected: usize) -> Result<&'a T, LinkError>
where
    T: FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
{
    T::ref_from_bytes(payload).map_err(|_| {
        FrameDefect::PayloadSize {
            pdu_type,
            expected,
            actual: payload.len(),
        }
        .into()
    })
}

/// Write an advertising channel PDU into `buf`, returning the bytes used.
pub fn encode_advertising(pdu_type: PduType, tx_add: bool, payload: &[u8], buf: &mut [u8]) -> Result<usize, LinkError> {
    let header = AdvHeader::new()
        .with_pdu_type(u8::from(pdu_type) & 0x0F)
        .with_tx_add(tx_add)
        .with_length(checked_len(payload, MAX_ADV_PAYLOAD)?);
    write_pdu(header.into_bytes(), payload, buf)
}

/// Write a data channel PDU into `buf`. The header length is taken from `payload`.
pub fn encode_data(header: DataHeader, payload: &[u8], buf: &mut [u8]) -> Result<usize, LinkError> {
    let header = header.with_length(checked_len(payload, MAX_DATA_PAYLOAD)?);
    write_pdu(header.into_bytes(), payload, buf)
}

fn checked_len(payload: &[u8], max: usize) -> Result<u8, LinkError> {
    if payload.len() > max {
        return Err(LinkError::PayloadTooLong {
            len: payload.len(),
            max,
        });
    }
    // max <= 251, so this always fits
    Ok(payload.len() as u8)
}

fn write_pdu(header: [u8; HEADER_SIZE], payload: &[u8], buf: &mut [u8]) -> Result<usize, LinkError> {
    let needed = HEADER_SIZE + payload.len();
    if buf.len() < needed {
        return Err(LinkError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }
    buf[..HEADER_SIZE].copy_from_slice(&header);
    buf[HEADER_SIZE..needed].copy_from_slice(payload);
    Ok(needed)
}
