//! Common test utilities and shared imports

// Shared across test files; not every item is used by each one
#![allow(dead_code, unused_imports)]

use std::collections::VecDeque;

pub use blelink_lib::channel::ChannelMap;
pub use blelink_lib::constants::{ADV_ACCESS_ADDRESS, ADV_CRC_INIT, MAX_PDU_SIZE};
pub use blelink_lib::frame::{ChannelKind, PduView, classify, encode_advertising, encode_data};
pub use blelink_lib::link::{LinkEvent, LinkLayer, State};
pub use blelink_lib::pdu::{ConnectParams, ConnectRequest, DataHeader, Llid, PduType, ScanRequest};
pub use blelink_lib::sim::{Delivery, Peer, RadioOp, SimClock, SimRadio};
pub use blelink_lib::timing::{Tick, TickRate};
pub use blelink_lib::{DeviceAddress, FrameDefect, LinkConfig, LinkError, Phy};
pub use bytes::Bytes;
pub use hex;
use zerocopy::IntoBytes;

pub const PERIPHERAL: DeviceAddress = DeviceAddress::from_u64(0x1122_3344_5566);
pub const CENTRAL: DeviceAddress = DeviceAddress::from_u64(0x6BD4_55A7_ECB0);
pub const CONN_AA: u32 = 0x5065_4B3A;
pub const CONN_CRC: u32 = 0x12_3456;

/// Delay between the radio starting to listen and the peer's frame arriving
pub const REPLY_DELAY: u32 = 100;

/// Decode hex string to bytes for testing
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Interval 12.5 ms, window 5..7.5 ms, supervision timeout 40 ms, hop 7
pub fn connect_params() -> ConnectParams {
    ConnectParams {
        initiator: CENTRAL,
        advertiser: PERIPHERAL,
        access_address: CONN_AA,
        crc_init: CONN_CRC,
        win_size: 2,
        win_offset: 4,
        interval: 10,
        latency: 0,
        timeout: 4,
        channel_map: ChannelMap::ALL,
        hop_increment: 7,
        sca: 0,
    }
}

pub fn connect_req_frame(params: ConnectParams) -> Vec<u8> {
    let request = ConnectRequest::from(params);
    let mut buf = [0u8; MAX_PDU_SIZE];
    let len = encode_advertising(PduType::ConnectReq, false, request.as_bytes(), &mut buf).unwrap();
    buf[..len].to_vec()
}

pub fn scan_req_frame(scanner: DeviceAddress, advertiser: DeviceAddress) -> Vec<u8> {
    let request = ScanRequest {
        initiator: scanner,
        advertiser,
    };
    let mut buf = [0u8; MAX_PDU_SIZE];
    let len = encode_advertising(PduType::ScanReq, true, request.as_bytes(), &mut buf).unwrap();
    buf[..len].to_vec()
}

pub fn data_frame(llid: Llid, sn: bool, nesn: bool, payload: &[u8]) -> Vec<u8> {
    let header = DataHeader::new().with_llid(llid.into()).with_sn(sn).with_nesn(nesn);
    let mut buf = [0u8; MAX_PDU_SIZE];
    let len = encode_data(header, payload, &mut buf).unwrap();
    buf[..len].to_vec()
}

pub fn empty_pdu(sn: bool, nesn: bool) -> Vec<u8> {
    data_frame(Llid::DataContinue, sn, nesn, &[])
}

/// One tick per microsecond keeps the arithmetic in tests readable.
pub fn test_config() -> LinkConfig {
    LinkConfig {
        address: PERIPHERAL,
        adv_interval_ms: 10,
        tick_rate: TickRate::new(1),
        ..LinkConfig::default()
    }
}

/// Peer answering each receive window from a queue, one entry per window.
///
/// Advertising and data channel windows draw from separate queues; `None`
/// entries and an exhausted queue leave the window silent.
#[derive(Debug, Default)]
pub struct Script {
    pub advertising: VecDeque<Option<Vec<u8>>>,
    pub data: VecDeque<Option<Vec<u8>>>,
    pub received: Vec<Vec<u8>>,
}

impl Script {
    pub fn advertising(mut self, frame: Option<Vec<u8>>) -> Self {
        self.advertising.push_back(frame);
        self
    }

    pub fn data(mut self, frame: Option<Vec<u8>>) -> Self {
        self.data.push_back(frame);
        self
    }
}

impl Peer for Script {
    fn on_listen(&mut self, _channel: u8, access_address: u32, _now: Tick) -> Option<Delivery> {
        let queue = if access_address == ADV_ACCESS_ADDRESS {
            &mut self.advertising
        } else {
            &mut self.data
        };
        queue
            .pop_front()
            .flatten()
            .map(|bytes| Delivery::after(REPLY_DELAY, bytes))
    }

    fn on_transmit(&mut self, pdu: &[u8], _channel: u8, _access_address: u32, _now: Tick) {
        self.received.push(pdu.to_vec());
    }
}

pub type SimLink = LinkLayer<SimRadio<Script>, SimClock>;

pub fn link_with(config: LinkConfig, script: Script) -> SimLink {
    link_starting_at(0, config, script)
}

pub fn link_starting_at(start: Tick, config: LinkConfig, script: Script) -> SimLink {
    let clock = SimClock::starting_at(start, 1);
    let radio = SimRadio::new(clock.clone(), script);
    LinkLayer::new(radio, clock, config).expect("valid config")
}

/// A link that has gone through CONNECT_REQ and the first data exchange,
/// with `data` queued for the following connection events.
pub fn connected_link(config: LinkConfig, data: Vec<Option<Vec<u8>>>) -> SimLink {
    let mut script = Script::default()
        .advertising(Some(connect_req_frame(connect_params())))
        .data(Some(empty_pdu(false, false)));
    script.data.extend(data);

    let mut link = link_with(config, script);
    assert!(matches!(link.step(), LinkEvent::ConnectRequested { .. }));
    assert!(matches!(link.step(), LinkEvent::Connected { .. }));
    link
}

pub fn configure_ops(link: &SimLink) -> Vec<(u32, u32)> {
    link.radio()
        .ops()
        .iter()
        .filter_map(|op| match op {
            RadioOp::Configure {
                access_address,
                crc_init,
                ..
            } => Some((*access_address, *crc_init)),
            _ => None,
        })
        .collect()
}

/// Transmissions as (channel, bytes, tick).
pub fn transmissions(link: &SimLink) -> Vec<(u8, Bytes, Tick)> {
    link.radio()
        .transmissions()
        .map(|(channel, pdu, at)| (channel, pdu.clone(), at))
        .collect()
}
