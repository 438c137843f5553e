//! Simulated clock, radio and peer for driving a [`LinkLayer`](crate::link::LinkLayer)
//! without hardware.
//!
//! Time only moves when something reads the clock: every [`SimClock::now`]
//! advances the shared counter by a fixed step, so the link layer's busy-waits
//! terminate after a bounded number of polls.

use std::cell::Cell;
use std::rc::Rc;

use bytes::Bytes;

use crate::radio::{Phy, Radio, RxFrame};
use crate::timing::{Clock, Tick, has_elapsed};

/// Tick counter shared between the link layer and the simulated radio.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<Tick>>,
    step: u32,
}

impl SimClock {
    pub fn new(step: u32) -> Self {
        Self::starting_at(0, step)
    }

    pub fn starting_at(start: Tick, step: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
            step,
        }
    }

    /// Read the time without advancing it.
    pub fn peek(&self) -> Tick {
        self.now.get()
    }

    pub fn advance(&self, ticks: u32) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }
}

impl Clock for SimClock {
    fn now(&self) -> Tick {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}

/// Everything the link layer asked the radio to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioOp {
    Configure { access_address: u32, crc_init: u32, phy: Phy },
    Transmit { channel: u8, pdu: Bytes, at: Tick },
    Receive { channel: u8, at: Tick },
    Idle { at: Tick },
}

/// A frame the peer sends once the radio has listened for `delay` ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delay: u32,
    pub bytes: Bytes,
}

impl Delivery {
    pub fn after(delay: u32, bytes: impl Into<Bytes>) -> Self {
        Self {
            delay,
            bytes: bytes.into(),
        }
    }
}

/// The other side of the air interface.
pub trait Peer {
    /// The radio started listening on `channel` with `access_address`.
    fn on_listen(&mut self, channel: u8, access_address: u32, now: Tick) -> Option<Delivery>;

    /// The radio transmitted `pdu`.
    fn on_transmit(&mut self, _pdu: &[u8], _channel: u8, _access_address: u32, _now: Tick) {}
}

impl<F> Peer for F
where
    F: FnMut(u8, u32, Tick) -> Option<Delivery>,
{
    fn on_listen(&mut self, channel: u8, access_address: u32, now: Tick) -> Option<Delivery> {
        self(channel, access_address, now)
    }
}

/// Radio backed by a [`Peer`]. Transmissions complete immediately.
pub struct SimRadio<P: Peer> {
    clock: SimClock,
    peer: P,
    ops: Vec<RadioOp>,
    access_address: u32,
    listening: Option<(Tick, Option<Delivery>)>,
    received: Option<RxFrame>,
}

impl<P: Peer> SimRadio<P> {
    pub fn new(clock: SimClock, peer: P) -> Self {
        Self {
            clock,
            peer,
            ops: Vec::new(),
            access_address: 0,
            listening: None,
            received: None,
        }
    }

    pub fn ops(&self) -> &[RadioOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn transmissions(&self) -> impl Iterator<Item = (u8, &Bytes, Tick)> {
        self.ops.iter().filter_map(|op| match op {
            RadioOp::Transmit { channel, pdu, at } => Some((*channel, pdu, *at)),
            _ => None,
        })
    }

    pub fn access_address(&self) -> u32 {
        self.access_address
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }
}

impl<P: Peer> Radio for SimRadio<P> {
    fn configure(&mut self, access_address: u32, crc_init: u32, phy: Phy) {
        self.access_address = access_address;
        self.ops.push(RadioOp::Configure {
            access_address,
            crc_init,
            phy,
        });
    }

    fn transmit(&mut self, pdu: &[u8], channel: u8) {
        let at = self.clock.peek();
        self.ops.push(RadioOp::Transmit {
            channel,
            pdu: Bytes::copy_from_slice(pdu),
            at,
        });
        self.peer.on_transmit(pdu, channel, self.access_address, at);
    }

    fn tx_done(&mut self) -> bool {
        true
    }

    fn receive(&mut self, channel: u8) {
        let at = self.clock.peek();
        self.ops.push(RadioOp::Receive { channel, at });
        let delivery = self.peer.on_listen(channel, self.access_address, at);
        self.listening = Some((at, delivery));
        self.received = None;
    }

    fn rx_ready(&mut self) -> bool {
        let now = self.clock.now();
        let due = match &self.listening {
            Some((opened, Some(delivery))) if has_elapsed(now, *opened, delivery.delay) => {
                opened.wrapping_add(delivery.delay)
            }
            _ => return false,
        };
        if let Some((_, Some(delivery))) = self.listening.take() {
            self.received = Some(RxFrame {
                bytes: delivery.bytes,
                timestamp: due,
            });
        }
        true
    }

    fn frame(&self) -> RxFrame {
        self.received.clone().unwrap_or(RxFrame {
            bytes: Bytes::new(),
            timestamp: self.clock.peek(),
        })
    }

    fn idle(&mut self) {
        self.listening = None;
        self.ops.push(RadioOp::Idle { at: self.clock.peek() });
    }
}
