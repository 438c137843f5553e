use blelink_lib::DeviceAddress;
use blelink_lib::channel::ChannelMap;
use blelink_lib::constants::{ADV_ACCESS_ADDRESS, MAX_PDU_SIZE};
use blelink_lib::frame::{encode_advertising, encode_data, peek_data_header};
use blelink_lib::link::AckState;
use blelink_lib::pdu::{ConnectParams, ConnectRequest, DataHeader, Llid, PduType, ScanRequest};
use blelink_lib::sim::{Delivery, Peer};
use blelink_lib::timing::Tick;
use tracing::debug;
use zerocopy::IntoBytes;

/// LL_TERMINATE_IND with "remote user terminated connection"
const TERMINATE_IND: [u8; 2] = [0x02, 0x13];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Scanning,
    Connecting,
    Connected,
    Gone,
}

/// A scripted central: scans once, connects, exchanges empty PDUs, then
/// either terminates or stops answering.
pub struct Central {
    address: DeviceAddress,
    params: ConnectParams,
    reply_delay: u32,
    drop_after: Option<u32>,
    terminate: bool,
    phase: Phase,
    ack: AckState,
    sent: u32,
}

impl Central {
    pub fn new(target: DeviceAddress, reply_delay: u32, drop_after: Option<u32>, terminate: bool) -> Self {
        let address = DeviceAddress::from_u64(0xC0FF_EE00_0001);
        let params = ConnectParams {
            initiator: address,
            advertiser: target,
            access_address: 0xAF9A_9CD7,
            crc_init: 0x2D_6F1B,
            win_size: 2,
            win_offset: 4,
            interval: 24,
            latency: 0,
            timeout: 20,
            channel_map: ChannelMap::ALL,
            hop_increment: 7,
            sca: 0,
        };
        Self {
            address,
            params,
            reply_delay,
            drop_after,
            terminate,
            phase: Phase::Scanning,
            ack: AckState::default(),
            sent: 0,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    fn advertising_reply(&mut self) -> Option<Delivery> {
        let mut buf = [0u8; MAX_PDU_SIZE];
        let len = match self.phase {
            Phase::Scanning => {
                self.phase = Phase::Connecting;
                let request = ScanRequest {
                    initiator: self.address,
                    advertiser: self.params.advertiser,
                };
                encode_advertising(PduType::ScanReq, false, request.as_bytes(), &mut buf).ok()?
            }
            Phase::Connecting => {
                let request = ConnectRequest::from(self.params);
                encode_advertising(PduType::ConnectReq, false, request.as_bytes(), &mut buf).ok()?
            }
            Phase::Connected | Phase::Gone => return None,
        };
        Some(Delivery::after(self.reply_delay, buf[..len].to_vec()))
    }

    fn data_reply(&mut self) -> Option<Delivery> {
        if self.phase == Phase::Connecting {
            self.phase = Phase::Connected;
        }
        if self.phase == Phase::Gone {
            return None;
        }

        let done = self.drop_after.is_some_and(|limit| self.sent >= limit);
        let (llid, payload): (Llid, &[u8]) = match (done, self.terminate) {
            (false, _) => (Llid::DataContinue, &[][..]),
            (true, true) => {
                self.phase = Phase::Gone;
                (Llid::Control, &TERMINATE_IND[..])
            }
            (true, false) => {
                debug!("Central going silent after {} PDUs", self.sent);
                self.phase = Phase::Gone;
                return None;
            }
        };

        let header = DataHeader::new()
            .with_llid(llid.into())
            .with_sn(self.ack.transmit_seq())
            .with_nesn(self.ack.next_expected());
        let mut buf = [0u8; MAX_PDU_SIZE];
        let len = encode_data(header, payload, &mut buf).ok()?;
        self.sent += 1;
        Some(Delivery::after(self.reply_delay, buf[..len].to_vec()))
    }
}

impl Peer for Central {
    fn on_listen(&mut self, _channel: u8, access_address: u32, _now: Tick) -> Option<Delivery> {
        if access_address == ADV_ACCESS_ADDRESS {
            self.advertising_reply()
        } else if access_address == self.params.access_address {
            self.data_reply()
        } else {
            None
        }
    }

    fn on_transmit(&mut self, pdu: &[u8], _channel: u8, access_address: u32, _now: Tick) {
        if access_address != self.params.access_address {
            return;
        }
        if let Some(header) = peek_data_header(pdu) {
            self.ack.on_receive(header);
        }
    }
}
