//! HSMS message header.
//!
//! Every HSMS message carries a fixed 10-byte header after its 4-byte length
//! prefix: session id, two header bytes whose meaning depends on the session
//! type, the presentation type, the session type and the system bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Header size in bytes
pub const HEADER_SIZE: usize = 10;

/// Size of the length prefix preceding the header
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Presentation type for SECS-II encoded bodies
pub const PTYPE_SECS_II: u8 = 0;

/// Session id used by Linktest and Separate
pub const CONTROL_DEVICE_ID: u16 = 0xFFFF;

/// Select/Deselect response status codes
pub mod status {
    /// Communication established / ended
    pub const OK: u8 = 0;
    /// Communication already active (select) or not established (deselect)
    pub const ALREADY_ACTIVE: u8 = 1;
    /// Connection not ready (select) or busy (deselect)
    pub const NOT_READY: u8 = 2;
    /// Connect exhausted
    pub const EXHAUSTED: u8 = 3;
}

/// Reject.req reason codes
pub mod reason {
    /// Session type not supported
    pub const STYPE_NOT_SUPPORTED: u8 = 1;
    /// Presentation type not supported
    pub const PTYPE_NOT_SUPPORTED: u8 = 2;
    /// Response without an open transaction
    pub const TRANSACTION_NOT_OPEN: u8 = 3;
    /// Data message while not selected
    pub const ENTITY_NOT_SELECTED: u8 = 4;
}

/// HSMS session types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// SECS-II data message
    Data = 0,
    /// Select request
    SelectReq = 1,
    /// Select response
    SelectRsp = 2,
    /// Deselect request
    DeselectReq = 3,
    /// Deselect response
    DeselectRsp = 4,
    /// Linktest request
    LinkTestReq = 5,
    /// Linktest response
    LinkTestRsp = 6,
    /// Reject request
    RejectReq = 7,
    /// Separate request
    SeparateReq = 9,
}

impl MessageType {
    /// Whether this type opens an exchange (Reject.req answers one)
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::SelectReq
                | MessageType::DeselectReq
                | MessageType::LinkTestReq
                | MessageType::SeparateReq
        )
    }

    /// Whether a reply of this type is expected for the request
    pub fn expects_reply(self) -> bool {
        matches!(
            self,
            MessageType::SelectReq | MessageType::DeselectReq | MessageType::LinkTestReq
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Data),
            1 => Ok(MessageType::SelectReq),
            2 => Ok(MessageType::SelectRsp),
            3 => Ok(MessageType::DeselectReq),
            4 => Ok(MessageType::DeselectRsp),
            5 => Ok(MessageType::LinkTestReq),
            6 => Ok(MessageType::LinkTestRsp),
            7 => Ok(MessageType::RejectReq),
            9 => Ok(MessageType::SeparateReq),
            _ => Err(crate::WireError::Type(value)),
        }
    }
}

/// Raw HSMS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Session id (device id)
    pub device: u16,
    /// W-bit and stream for data, 0 for control
    pub byte2: u8,
    /// Function for data, status or reason for control
    pub byte3: u8,
    /// Presentation type
    pub ptype: u8,
    /// Session type
    pub stype: MessageType,
    /// System bytes
    pub context: u32,
}

impl Header {
    /// Encode the header (big-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.device);
        buf.put_u8(self.byte2);
        buf.put_u8(self.byte3);
        buf.put_u8(self.ptype);
        buf.put_u8(self.stype as u8);
        buf.put_u32(self.context);
    }

    /// Decode the header (big-endian)
    pub fn decode(buf: &mut Bytes) -> Result<Self, crate::WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(crate::WireError::Incomplete);
        }

        let device = buf.get_u16();
        let byte2 = buf.get_u8();
        let byte3 = buf.get_u8();
        let ptype = buf.get_u8();
        if ptype != PTYPE_SECS_II {
            return Err(crate::WireError::PType(ptype));
        }
        let stype = MessageType::try_from(buf.get_u8())?;
        let context = buf.get_u32();

        Ok(Self {
            device,
            byte2,
            byte3,
            ptype,
            stype,
            context,
        })
    }
}
