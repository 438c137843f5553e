use thiserror::Error;

use crate::pdu::PduType;

/// The reason a received buffer could not be classified.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDefect {
    #[error("buffer of {actual} bytes is shorter than the 2-byte header")]
    MissingHeader { actual: usize },

    #[error("declared length {declared} exceeds the {available} bytes after the header")]
    Truncated { declared: usize, available: usize },

    #[error("declared length {declared} exceeds the protocol maximum of {max}")]
    OverLimit { declared: usize, max: usize },

    #[error("{pdu_type} payload must be {expected} bytes, got {actual}")]
    PayloadSize {
        pdu_type: PduType,
        expected: usize,
        actual: usize,
    },
}

/// The primary error type for the link layer.
///
/// None of these are fatal to the device: every failure is scoped to the
/// current frame, connection attempt or connection, and the state machine
/// resolves it by staying in or returning to advertising.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] FrameDefect),

    #[error("Channel map has {used} usable channels, at least 2 are required")]
    DegenerateChannelMap { used: usize },

    #[error("No frame received in the window of connection event {event_counter}")]
    WindowMiss { event_counter: u16 },

    #[error("Supervision timeout: {elapsed_ticks} ticks since last frame, budget {budget_ticks}")]
    SupervisionTimeout { elapsed_ticks: u32, budget_ticks: u32 },

    #[error("Payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Advertising data of {len} bytes exceeds the maximum of {max}")]
    AdvertisingDataTooLong { len: usize, max: usize },

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}
