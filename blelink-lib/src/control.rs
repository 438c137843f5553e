//! LL control PDUs received in the CONNECTED state.
//!
//! The link layer only acknowledges control PDUs. Anything beyond that is
//! hooked in through [`ControlTable`], which maps an opcode to a handler.

use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use tracing::debug;

use crate::context::ConnectionContext;

/// Opcodes of LL control PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ControlOpcode {
    #[strum(to_string = "LL_CONNECTION_UPDATE_IND")]
    ConnectionUpdateInd = 0x00,
    #[strum(to_string = "LL_CHANNEL_MAP_IND")]
    ChannelMapInd = 0x01,
    #[strum(to_string = "LL_TERMINATE_IND")]
    TerminateInd = 0x02,
    #[strum(to_string = "LL_ENC_REQ")]
    EncReq = 0x03,
    #[strum(to_string = "LL_ENC_RSP")]
    EncRsp = 0x04,
    #[strum(to_string = "LL_START_ENC_REQ")]
    StartEncReq = 0x05,
    #[strum(to_string = "LL_START_ENC_RSP")]
    StartEncRsp = 0x06,
    #[strum(to_string = "LL_UNKNOWN_RSP")]
    UnknownRsp = 0x07,
    #[strum(to_string = "LL_FEATURE_REQ")]
    FeatureReq = 0x08,
    #[strum(to_string = "LL_FEATURE_RSP")]
    FeatureRsp = 0x09,
    #[strum(to_string = "LL_PAUSE_ENC_REQ")]
    PauseEncReq = 0x0A,
    #[strum(to_string = "LL_PAUSE_ENC_RSP")]
    PauseEncRsp = 0x0B,
    #[strum(to_string = "LL_VERSION_IND")]
    VersionInd = 0x0C,
    #[strum(to_string = "LL_REJECT_IND")]
    RejectInd = 0x0D,
    #[strum(to_string = "LL_PERIPHERAL_FEATURE_REQ")]
    PeripheralFeatureReq = 0x0E,
    #[strum(to_string = "LL_CONNECTION_PARAM_REQ")]
    ConnectionParamReq = 0x0F,
    #[strum(to_string = "LL_CONNECTION_PARAM_RSP")]
    ConnectionParamRsp = 0x10,
    #[strum(to_string = "LL_REJECT_EXT_IND")]
    RejectExtInd = 0x11,
    #[strum(to_string = "LL_PING_REQ")]
    PingReq = 0x12,
    #[strum(to_string = "LL_PING_RSP")]
    PingRsp = 0x13,
    #[strum(to_string = "LL_LENGTH_REQ")]
    LengthReq = 0x14,
    #[strum(to_string = "LL_LENGTH_RSP")]
    LengthRsp = 0x15,
    #[strum(to_string = "LL_PHY_REQ")]
    PhyReq = 0x16,
    #[strum(to_string = "LL_PHY_RSP")]
    PhyRsp = 0x17,
    #[strum(to_string = "LL_PHY_UPDATE_IND")]
    PhyUpdateInd = 0x18,
    #[strum(to_string = "LL_MIN_USED_CHANNELS_IND")]
    MinUsedChannelsInd = 0x19,

    #[num_enum(catch_all)]
    #[strum(to_string = "LL_UNKNOWN")]
    Unknown(u8),
}

/// A control PDU payload: opcode followed by its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPdu<'a> {
    pub opcode: ControlOpcode,
    pub params: &'a [u8],
}

impl<'a> ControlPdu<'a> {
    /// `None` for an empty payload, which carries no opcode.
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        let (&opcode, params) = payload.split_first()?;
        Some(Self {
            opcode: ControlOpcode::from_primitive(opcode),
            params,
        })
    }

    /// Error code of an LL_TERMINATE_IND.
    pub fn terminate_reason(&self) -> Option<u8> {
        match self.opcode {
            ControlOpcode::TerminateInd => self.params.first().copied(),
            _ => None,
        }
    }
}

/// What the link layer does after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlAction {
    /// Keep the connection, acknowledgment only
    #[default]
    Continue,
    /// Tear the connection down and go back to advertising
    Terminate,
}

pub type ControlHandler = fn(&ControlPdu<'_>, &ConnectionContext) -> ControlAction;

/// Opcode-indexed table of control PDU handlers.
///
/// Opcodes without a handler are logged and acknowledged.
#[derive(Clone)]
pub struct ControlTable {
    handlers: [Option<ControlHandler>; 256],
}

impl ControlTable {
    pub fn new() -> Self {
        Self { handlers: [None; 256] }
    }

    pub fn register(&mut self, opcode: ControlOpcode, handler: ControlHandler) -> &mut Self {
        self.handlers[u8::from(opcode) as usize] = Some(handler);
        self
    }

    pub fn unregister(&mut self, opcode: ControlOpcode) {
        self.handlers[u8::from(opcode) as usize] = None;
    }

    pub fn is_registered(&self, opcode: ControlOpcode) -> bool {
        self.handlers[u8::from(opcode) as usize].is_some()
    }

    pub fn dispatch(&self, pdu: &ControlPdu<'_>, context: &ConnectionContext) -> ControlAction {
        match self.handlers[u8::from(pdu.opcode) as usize] {
            Some(handler) => handler(pdu, context),
            None => {
                debug!(opcode = %pdu.opcode, params = %hex::encode(pdu.params), "Unhandled control PDU");
                ControlAction::Continue
            }
        }
    }
}

impl Default for ControlTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler ending the connection when the peer sends LL_TERMINATE_IND.
pub fn terminate_on_request(pdu: &ControlPdu<'_>, context: &ConnectionContext) -> ControlAction {
    debug!(
        reason = ?pdu.terminate_reason(),
        access_address = format_args!("{:#010x}", context.access_address()),
        "Peer terminated the connection"
    );
    ControlAction::Terminate
}
