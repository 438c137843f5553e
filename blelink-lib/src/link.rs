//! The link layer state machine.
//!
//! ```text
//!            CONNECT_REQ for us             first data PDU
//!   ADV ─────────────────────────▶ CONNECT_REQUEST ─────────▶ CONNECTED
//!    ▲                                                            │
//!    └────────── supervision timeout / LL_TERMINATE_IND ──────────┘
//! ```
//!
//! Each call to [`LinkLayer::step`] runs exactly one transition: one
//! advertising event, the connection setup exchange, or one connection event.
//! All waits are busy-waits against the [`Clock`].

use std::mem;

use tracing::{debug, info, trace, warn};

use crate::address::DeviceAddress;
use crate::channel::ChannelSelector;
use crate::config::{LinkConfig, PreparedPdus};
use crate::constants::{ADV_ACCESS_ADDRESS, ADV_CHANNELS, ADV_CRC_INIT, HEADER_SIZE};
use crate::context::ConnectionContext;
use crate::control::{ControlAction, ControlPdu, ControlTable};
use crate::error::LinkError;
use crate::frame::{PduView, classify_advertising, classify_data, encode_data, peek_data_header};
use crate::pdu::{ConnectRequest, DataHeader, Llid, PduType};
use crate::radio::{Radio, RxFrame};
use crate::timing::{Clock, EventWindow, Tick, elapsed_since, has_elapsed};

/// Sequence number bookkeeping of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckState {
    transmit_seq: bool,
    next_expected: bool,
}

impl AckState {
    pub fn transmit_seq(&self) -> bool {
        self.transmit_seq
    }

    pub fn next_expected(&self) -> bool {
        self.next_expected
    }

    /// Fold in the header of a received PDU. Returns `false` for a
    /// retransmission of a PDU that was already accepted.
    pub fn on_receive(&mut self, header: DataHeader) -> bool {
        let is_new = header.sn() == self.next_expected;
        if is_new {
            self.next_expected = !self.next_expected;
        }
        // Peer acknowledged our last PDU
        if header.nesn() != self.transmit_seq {
            self.transmit_seq = !self.transmit_seq;
        }
        is_new
    }

    /// Header of the empty PDU acknowledging everything received so far.
    pub fn response_header(&self) -> DataHeader {
        DataHeader::new()
            .with_llid(Llid::Control.into())
            .with_sn(self.transmit_seq)
            .with_nesn(self.next_expected)
    }
}

/// Runtime state of a connection, discarded on return to advertising.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    context: ConnectionContext,
    selector: ChannelSelector,
    ack: AckState,
    anchor: Tick,
    interval_ticks: u32,
    window: EventWindow,
    supervision_ticks: u32,
    last_rx: Tick,
    missed: u32,
    event_counter: u16,
}

impl Connection {
    fn new(context: ConnectionContext, config: &LinkConfig) -> Self {
        let rate = config.tick_rate;
        let interval_ticks = context.interval_ticks(rate);
        let window = EventWindow::new(
            context.window_offset_ticks(rate),
            context.window_end_ticks(rate).saturating_sub(context.window_offset_ticks(rate)),
            interval_ticks,
        );
        let supervision_ticks = context.supervision_timeout_ticks(rate);
        let mut selector = ChannelSelector::new(context.used_channels().clone(), context.hop_increment());
        selector.next();

        Self {
            context,
            selector,
            ack: AckState::default(),
            anchor: 0,
            interval_ticks,
            window,
            supervision_ticks,
            last_rx: 0,
            missed: 0,
            event_counter: 0,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Data channel of the current connection event.
    pub fn channel(&self) -> u8 {
        self.selector.current()
    }

    pub fn ack(&self) -> AckState {
        self.ack
    }

    pub fn anchor(&self) -> Tick {
        self.anchor
    }

    pub fn window(&self) -> EventWindow {
        self.window
    }

    pub fn interval_ticks(&self) -> u32 {
        self.interval_ticks
    }

    /// Consecutive connection events without a valid frame.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn event_counter(&self) -> u16 {
        self.event_counter
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Advertising,
    ConnectRequest(Connection),
    Connected(Connection),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Advertising => "ADV",
            State::ConnectRequest(_) => "CONNECT_REQUEST",
            State::Connected(_) => "CONNECTED",
        }
    }

    pub fn connection(&self) -> Option<&Connection> {
        match self {
            State::Advertising => None,
            State::ConnectRequest(connection) | State::Connected(connection) => Some(connection),
        }
    }
}

/// Outcome of one [`LinkLayer::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Advertisement sent and the receive window closed without a request
    Advertised { channel: u8 },
    ScanResponseSent { channel: u8, scanner: DeviceAddress },
    ConnectRequested {
        initiator: DeviceAddress,
        access_address: u32,
        channel: u8,
    },
    ConnectionRejected {
        initiator: DeviceAddress,
        error: LinkError,
    },
    Connected { access_address: u32, channel: u8 },
    DataReceived {
        channel: u8,
        llid: Llid,
        len: usize,
        duplicate: bool,
    },
    EventMissed { error: LinkError, missed: u32 },
    ConnectionLost { error: LinkError },
    Terminated { reason: Option<u8> },
    FrameDiscarded { error: LinkError },
    /// A well-formed frame that needs no action
    Ignored { pdu_type: Option<PduType> },
}

/// BLE link layer, peripheral role.
pub struct LinkLayer<R: Radio, C: Clock> {
    radio: R,
    clock: C,
    config: LinkConfig,
    prepared: PreparedPdus,
    controls: ControlTable,
    state: State,
    adv_channel: usize,
    last_adv: Option<Tick>,
}

impl<R: Radio, C: Clock> LinkLayer<R, C> {
    /// Encode the advertising PDUs and put the radio on the advertising
    /// access address.
    pub fn new(mut radio: R, clock: C, config: LinkConfig) -> Result<Self, LinkError> {
        let prepared = config.prepare()?;
        radio.configure(ADV_ACCESS_ADDRESS, ADV_CRC_INIT, config.phy);
        info!(
            "Advertising as {} ({}, every {} ms)",
            config.address, config.mode, config.adv_interval_ms
        );
        Ok(Self {
            radio,
            clock,
            config,
            prepared,
            controls: ControlTable::default(),
            state: State::Advertising,
            adv_channel: 0,
            last_adv: None,
        })
    }

    pub fn with_controls(mut self, controls: ControlTable) -> Self {
        self.controls = controls;
        self
    }

    pub fn controls_mut(&mut self) -> &mut ControlTable {
        &mut self.controls
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one state transition.
    pub fn step(&mut self) -> LinkEvent {
        let from = self.state.name();
        let (next, event) = match mem::replace(&mut self.state, State::Advertising) {
            State::Advertising => self.advertise(),
            State::ConnectRequest(connection) => self.establish(connection),
            State::Connected(connection) => self.connection_event(connection),
        };
        if from != next.name() {
            debug!("{} -> {}", from, next.name());
        }
        self.state = next;
        event
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    fn advertise(&mut self) -> (State, LinkEvent) {
        let rate = self.config.tick_rate;
        if let Some(last) = self.last_adv {
            self.wait_until(last, rate.ticks_for_ms(self.config.adv_interval_ms));
        }

        let channel = ADV_CHANNELS[self.adv_channel];
        self.adv_channel = (self.adv_channel + 1) % ADV_CHANNELS.len();
        self.last_adv = Some(self.clock.now());

        let advertisement = self.prepared.advertisement.clone();
        self.send(&advertisement, channel);

        if self.config.mode.pdu_type() == PduType::AdvNonconnInd {
            return (State::Advertising, LinkEvent::Advertised { channel });
        }

        self.radio.receive(channel);
        let Some(frame) = self.listen_for(rate.ticks_for_us(self.config.adv_rx_window_us)) else {
            return (State::Advertising, LinkEvent::Advertised { channel });
        };
        trace!("RX ch{} @{}: {}", channel, frame.timestamp, hex::encode(&frame.bytes));

        let view = match classify_advertising(&frame.bytes) {
            Ok(view) => view,
            Err(error) => {
                debug!("Discarding advertising channel frame: {}", error);
                return (State::Advertising, LinkEvent::FrameDiscarded { error });
            }
        };

        match view {
            PduView::ScanRequest { request, .. } if request.advertiser == self.config.address => {
                self.answer_scan(request.initiator, channel, frame.timestamp)
            }
            PduView::ConnectRequest { request, .. } if request.advertiser == self.config.address => {
                self.accept_connect(request)
            }
            other => (
                State::Advertising,
                LinkEvent::Ignored {
                    pdu_type: other.pdu_type(),
                },
            ),
        }
    }

    fn answer_scan(&mut self, scanner: DeviceAddress, channel: u8, received_at: Tick) -> (State, LinkEvent) {
        let scan_response = match &self.prepared.scan_response {
            Some(scan_response) if self.config.mode.pdu_type().is_scannable() => scan_response.clone(),
            _ => {
                return (
                    State::Advertising,
                    LinkEvent::Ignored {
                        pdu_type: Some(PduType::ScanReq),
                    },
                );
            }
        };

        self.wait_until(received_at, self.config.tick_rate.t_ifs());
        self.send(&scan_response, channel);
        debug!("Sent SCAN_RSP to {} on channel {}", scanner, channel);
        (State::Advertising, LinkEvent::ScanResponseSent { channel, scanner })
    }

    fn accept_connect(&mut self, request: &ConnectRequest) -> (State, LinkEvent) {
        let initiator = request.initiator;
        if !self.config.mode.pdu_type().is_connectable() {
            return (
                State::Advertising,
                LinkEvent::Ignored {
                    pdu_type: Some(PduType::ConnectReq),
                },
            );
        }

        let context = match ConnectionContext::from_connect_request(request) {
            Ok(context) => context,
            Err(error) => {
                warn!("Rejecting CONNECT_REQ from {}: {}", initiator, error);
                return (State::Advertising, LinkEvent::ConnectionRejected { initiator, error });
            }
        };

        debug!(
            "CONNECT_REQ from {}: AA {:#010x}, interval {}, window {}+{}, timeout {}, hop {}, {} channels",
            initiator,
            context.access_address(),
            context.interval(),
            context.win_offset(),
            context.win_size(),
            context.timeout(),
            context.hop_increment(),
            context.used_channels().len()
        );

        let access_address = context.access_address();
        let connection = Connection::new(context, &self.config);
        let channel = connection.channel();
        (
            State::ConnectRequest(connection),
            LinkEvent::ConnectRequested {
                initiator,
                access_address,
                channel,
            },
        )
    }

    fn establish(&mut self, mut connection: Connection) -> (State, LinkEvent) {
        let channel = connection.channel();
        let access_address = connection.context.access_address();
        self.radio
            .configure(access_address, connection.context.crc_init(), self.config.phy);
        self.radio.receive(channel);

        let frame = self.wait_for_frame();
        trace!("RX ch{} @{}: {}", channel, frame.timestamp, hex::encode(&frame.bytes));

        // Acknowledge whatever arrived, even a frame that fails classification
        if let Some(header) = peek_data_header(&frame.bytes) {
            connection.ack.on_receive(header);
        }
        self.wait_until(frame.timestamp, self.config.tick_rate.t_ifs());
        self.send_ack(&connection.ack, channel);

        connection.anchor = self.clock.now();
        connection.last_rx = connection.anchor;
        info!(
            "Connected to {} on channel {} (AA {:#010x})",
            connection.context.initiator(),
            channel,
            access_address
        );
        (
            State::Connected(connection),
            LinkEvent::Connected {
                access_address,
                channel,
            },
        )
    }

    fn connection_event(&mut self, mut connection: Connection) -> (State, LinkEvent) {
        self.wait_until(connection.anchor, connection.interval_ticks);
        connection.anchor = connection.anchor.wrapping_add(connection.interval_ticks);
        connection.event_counter = connection.event_counter.wrapping_add(1);
        let channel = connection.selector.next();

        self.wait_until(connection.anchor, connection.window.open);
        self.radio.receive(channel);
        let frame = loop {
            if self.radio.rx_ready() {
                break Some(self.radio.frame());
            }
            if connection.window.has_closed(connection.anchor, self.clock.now()) {
                self.radio.idle();
                break None;
            }
            std::hint::spin_loop();
        };

        let Some(frame) = frame else {
            connection.missed += 1;
            let error = LinkError::WindowMiss {
                event_counter: connection.event_counter,
            };
            let missed = connection.missed;
            debug!("{} (channel {}, {} in a row)", error, channel, missed);
            return self.supervise(connection, LinkEvent::EventMissed { error, missed });
        };
        trace!("RX ch{} @{}: {}", channel, frame.timestamp, hex::encode(&frame.bytes));

        let (header, payload) = match classify_data(&frame.bytes) {
            Ok(PduView::Data { header, payload }) => (header, payload),
            Ok(other) => {
                let event = LinkEvent::Ignored {
                    pdu_type: other.pdu_type(),
                };
                return self.supervise(connection, event);
            }
            Err(error) => {
                debug!("Discarding data channel frame: {}", error);
                return self.supervise(connection, LinkEvent::FrameDiscarded { error });
            }
        };

        let is_new = connection.ack.on_receive(header);
        self.wait_until(frame.timestamp, self.config.tick_rate.t_ifs());
        self.send_ack(&connection.ack, channel);
        connection.missed = 0;
        connection.last_rx = frame.timestamp;

        let llid = header.link_id();
        if is_new && llid == Llid::Control {
            if let Some(pdu) = ControlPdu::parse(payload) {
                debug!("{} on event {}", pdu.opcode, connection.event_counter);
                if self.controls.dispatch(&pdu, &connection.context) == ControlAction::Terminate {
                    let reason = pdu.terminate_reason();
                    info!("Connection terminated by peer (reason {:?})", reason);
                    self.teardown();
                    return (State::Advertising, LinkEvent::Terminated { reason });
                }
            }
        }

        let event = LinkEvent::DataReceived {
            channel,
            llid,
            len: payload.len(),
            duplicate: !is_new,
        };
        (State::Connected(connection), event)
    }

    /// Tear the connection down once the peer has been silent for longer
    /// than the supervision timeout.
    fn supervise(&mut self, connection: Connection, event: LinkEvent) -> (State, LinkEvent) {
        let elapsed_ticks = elapsed_since(self.clock.now(), connection.last_rx);
        if elapsed_ticks <= connection.supervision_ticks {
            return (State::Connected(connection), event);
        }

        let error = LinkError::SupervisionTimeout {
            elapsed_ticks,
            budget_ticks: connection.supervision_ticks,
        };
        info!("Connection lost after {} missed events: {}", connection.missed, error);
        self.teardown();
        (State::Advertising, LinkEvent::ConnectionLost { error })
    }

    fn teardown(&mut self) {
        self.radio.idle();
        self.radio
            .configure(ADV_ACCESS_ADDRESS, ADV_CRC_INIT, self.config.phy);
    }

    fn send_ack(&mut self, ack: &AckState, channel: u8) {
        let mut buf = [0u8; HEADER_SIZE];
        // An empty payload always fits the header-sized buffer
        if let Ok(len) = encode_data(ack.response_header(), &[], &mut buf) {
            self.send(&buf[..len], channel);
        }
    }

    fn send(&mut self, pdu: &[u8], channel: u8) {
        trace!("TX ch{}: {}", channel, hex::encode(pdu));
        self.radio.transmit(pdu, channel);
        while !self.radio.tx_done() {
            std::hint::spin_loop();
        }
    }

    /// Listen until a frame arrives or `window` ticks have passed.
    fn listen_for(&mut self, window: u32) -> Option<RxFrame> {
        let opened = self.clock.now();
        loop {
            if self.radio.rx_ready() {
                return Some(self.radio.frame());
            }
            if has_elapsed(self.clock.now(), opened, window) {
                self.radio.idle();
                return None;
            }
            std::hint::spin_loop();
        }
    }

    fn wait_for_frame(&mut self) -> RxFrame {
        while !self.radio.rx_ready() {
            std::hint::spin_loop();
        }
        self.radio.frame()
    }

    fn wait_until(&self, start: Tick, span: u32) {
        while !has_elapsed(self.clock.now(), start, span) {
            std::hint::spin_loop();
        }
    }
}
