//! HSMS messages.
//!
//! A [`Message`] is either a control message driving the session procedures
//! or a SECS-II data message carrying items.

use crate::codec::decode_items;
use crate::header::{
    Header, MessageType, CONTROL_DEVICE_ID, HEADER_SIZE, LENGTH_PREFIX_SIZE, PTYPE_SECS_II,
};
use crate::item::DataItem;
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::fmt;

/// Highest stream number (7 bits)
pub const MAX_STREAM: u8 = 0x7F;

/// Highest device id usable by data messages (15 bits)
pub const MAX_DATA_DEVICE_ID: u16 = 0x7FFF;

/// Upper bound of generated context values
pub const MAX_GENERATED_CONTEXT: u32 = 10_000;

/// Draw a fresh non-zero context value
pub fn generate_context() -> u32 {
    rand::thread_rng().gen_range(1..=MAX_GENERATED_CONTEXT)
}

/// SECS-II data message
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    stream: u8,
    function: u8,
    reply_expected: bool,
    items: Vec<DataItem>,
}

impl DataMessage {
    /// Create a data message; `stream` must fit in 7 bits
    pub fn new(
        stream: u8,
        function: u8,
        reply_expected: bool,
        items: Vec<DataItem>,
    ) -> Result<Self, WireError> {
        if stream > MAX_STREAM {
            return Err(WireError::Range("stream"));
        }
        Ok(Self {
            stream,
            function,
            reply_expected,
            items,
        })
    }

    /// Stream number
    pub fn stream(&self) -> u8 {
        self.stream
    }

    /// Function number
    pub fn function(&self) -> u8 {
        self.function
    }

    /// W-bit
    pub fn reply_expected(&self) -> bool {
        self.reply_expected
    }

    /// Body items
    pub fn items(&self) -> &[DataItem] {
        &self.items
    }

    /// Odd functions are primary messages
    pub fn is_primary(&self) -> bool {
        self.function % 2 == 1
    }
}

/// HSMS control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Select.req
    SelectReq,
    /// Select.rsp
    SelectRsp {
        /// Select status, 0 on success
        status: u8,
    },
    /// Deselect.req
    DeselectReq,
    /// Deselect.rsp
    DeselectRsp {
        /// Deselect status, 0 on success
        status: u8,
    },
    /// Linktest.req
    LinkTestReq,
    /// Linktest.rsp
    LinkTestRsp,
    /// Separate.req
    SeparateReq,
    /// Reject.req
    RejectReq {
        /// Reject reason code
        reason: u8,
    },
}

impl ControlMessage {
    /// Session type of the control message
    pub fn kind(&self) -> MessageType {
        match self {
            ControlMessage::SelectReq => MessageType::SelectReq,
            ControlMessage::SelectRsp { .. } => MessageType::SelectRsp,
            ControlMessage::DeselectReq => MessageType::DeselectReq,
            ControlMessage::DeselectRsp { .. } => MessageType::DeselectRsp,
            ControlMessage::LinkTestReq => MessageType::LinkTestReq,
            ControlMessage::LinkTestRsp => MessageType::LinkTestRsp,
            ControlMessage::SeparateReq => MessageType::SeparateReq,
            ControlMessage::RejectReq { .. } => MessageType::RejectReq,
        }
    }

    fn byte3(&self) -> u8 {
        match self {
            ControlMessage::SelectRsp { status } | ControlMessage::DeselectRsp { status } => {
                *status
            }
            ControlMessage::RejectReq { reason } => *reason,
            _ => 0,
        }
    }
}

/// Message body
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Control message
    Control(ControlMessage),
    /// Data message
    Data(DataMessage),
}

/// HSMS message
///
/// Built through the constructors below, which keep data messages on a
/// 15-bit device id and the link test and separate messages on
/// [`CONTROL_DEVICE_ID`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    device: u16,
    context: u32,
    body: MessageBody,
}

impl Message {
    fn control(device: u16, context: u32, control: ControlMessage) -> Self {
        let mut msg = Self {
            device,
            context,
            body: MessageBody::Control(control),
        };
        msg.assign_context();
        msg
    }

    /// Select.req; context 0 draws a fresh one
    pub fn select_req(device: u16, context: u32) -> Self {
        Self::control(device, context, ControlMessage::SelectReq)
    }

    /// Select.rsp
    pub fn select_rsp(device: u16, context: u32, status: u8) -> Self {
        Self::control(device, context, ControlMessage::SelectRsp { status })
    }

    /// Deselect.req; context 0 draws a fresh one
    pub fn deselect_req(device: u16, context: u32) -> Self {
        Self::control(device, context, ControlMessage::DeselectReq)
    }

    /// Deselect.rsp
    pub fn deselect_rsp(device: u16, context: u32, status: u8) -> Self {
        Self::control(device, context, ControlMessage::DeselectRsp { status })
    }

    /// Linktest.req on the control session id
    pub fn link_test_req(context: u32) -> Self {
        Self::control(CONTROL_DEVICE_ID, context, ControlMessage::LinkTestReq)
    }

    /// Linktest.rsp on the control session id
    pub fn link_test_rsp(context: u32) -> Self {
        Self::control(CONTROL_DEVICE_ID, context, ControlMessage::LinkTestRsp)
    }

    /// Separate.req on the control session id
    pub fn separate_req(context: u32) -> Self {
        Self::control(CONTROL_DEVICE_ID, context, ControlMessage::SeparateReq)
    }

    /// Reject.req answering the message with the given header fields
    pub fn reject_req(device: u16, context: u32, reason: u8) -> Self {
        Self::control(device, context, ControlMessage::RejectReq { reason })
    }

    /// Response to a Select/Deselect/Linktest request, keeping its context
    ///
    /// Returns `None` when `request` does not expect a control reply.
    pub fn response_to(request: &Message, status: u8) -> Option<Self> {
        let control = match request.body {
            MessageBody::Control(ControlMessage::SelectReq) => ControlMessage::SelectRsp { status },
            MessageBody::Control(ControlMessage::DeselectReq) => {
                ControlMessage::DeselectRsp { status }
            }
            MessageBody::Control(ControlMessage::LinkTestReq) => {
                return Some(Self::link_test_rsp(request.context));
            }
            _ => return None,
        };
        Some(Self::control(request.device, request.context, control))
    }

    /// Data message; a primary with context 0 gets a fresh context
    pub fn data(device: u16, context: u32, data: DataMessage) -> Result<Self, WireError> {
        if device > MAX_DATA_DEVICE_ID {
            return Err(WireError::Range("device"));
        }
        let mut msg = Self {
            device,
            context,
            body: MessageBody::Data(data),
        };
        msg.assign_context();
        Ok(msg)
    }

    /// Secondary data message answering `primary` with function + 1
    pub fn reply_to(primary: &Message, items: Vec<DataItem>) -> Result<Self, WireError> {
        let data = match &primary.body {
            MessageBody::Data(d) if d.is_primary() => d,
            _ => return Err(WireError::Construction("reply to a non-primary message")),
        };
        let reply = DataMessage::new(data.stream, data.function.wrapping_add(1), false, items)?;
        Self::data(primary.device, primary.context, reply)
    }

    /// Session id
    pub fn device(&self) -> u16 {
        self.device
    }

    /// System bytes shared by a request and its reply
    pub fn context(&self) -> u32 {
        self.context
    }

    /// Control or data body
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// The same message under another context
    pub fn with_context(mut self, context: u32) -> Self {
        self.context = context;
        self
    }

    fn assign_context(&mut self) {
        if self.context == 0 && self.is_primary() {
            self.context = generate_context();
        }
    }

    /// Session type
    pub fn kind(&self) -> MessageType {
        match &self.body {
            MessageBody::Control(c) => c.kind(),
            MessageBody::Data(_) => MessageType::Data,
        }
    }

    /// Data body, if any
    pub fn as_data(&self) -> Option<&DataMessage> {
        match &self.body {
            MessageBody::Data(d) => Some(d),
            MessageBody::Control(_) => None,
        }
    }

    /// Control body, if any
    pub fn as_control(&self) -> Option<&ControlMessage> {
        match &self.body {
            MessageBody::Control(c) => Some(c),
            MessageBody::Data(_) => None,
        }
    }

    /// Whether this message opens an exchange rather than answering one
    pub fn is_primary(&self) -> bool {
        match &self.body {
            MessageBody::Data(d) => d.is_primary(),
            MessageBody::Control(c) => c.kind().is_request(),
        }
    }

    /// Whether the sender waits for a reply
    pub fn is_reply_required(&self) -> bool {
        match &self.body {
            MessageBody::Data(d) => d.is_primary() && d.reply_expected,
            MessageBody::Control(c) => c.kind().expects_reply(),
        }
    }

    /// Header fields of this message
    pub fn header(&self) -> Header {
        let (byte2, byte3) = match &self.body {
            MessageBody::Data(d) => ((u8::from(d.reply_expected) << 7) | d.stream, d.function),
            MessageBody::Control(c) => (0, c.byte3()),
        };
        Header {
            device: self.device,
            byte2,
            byte3,
            ptype: PTYPE_SECS_II,
            stype: self.kind(),
            context: self.context,
        }
    }

    /// Body length in bytes
    pub fn body_len(&self) -> usize {
        match &self.body {
            MessageBody::Data(d) => d.items.iter().map(DataItem::encoded_len).sum(),
            MessageBody::Control(_) => 0,
        }
    }

    /// Total encoded size including the length prefix
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + HEADER_SIZE + self.body_len()
    }

    /// Encode with length prefix, header and body
    pub fn encode(&self) -> Bytes {
        let len = HEADER_SIZE + self.body_len();
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len);
        buf.put_u32(len as u32);
        self.header().encode(&mut buf);
        if let MessageBody::Data(d) = &self.body {
            for item in &d.items {
                item.encode(&mut buf);
            }
        }
        buf.freeze()
    }

    /// Decode header and body (the length prefix already stripped)
    pub fn decode(mut buf: Bytes) -> Result<Self, WireError> {
        let header = Header::decode(&mut buf)?;

        let body = match header.stype {
            MessageType::Data => {
                let items = decode_items(&mut buf)?;
                MessageBody::Data(DataMessage {
                    stream: header.byte2 & MAX_STREAM,
                    function: header.byte3,
                    reply_expected: header.byte2 & 0x80 != 0,
                    items,
                })
            }
            stype => {
                if !buf.is_empty() {
                    return Err(WireError::Malformed);
                }
                MessageBody::Control(match stype {
                    MessageType::SelectReq => ControlMessage::SelectReq,
                    MessageType::SelectRsp => ControlMessage::SelectRsp {
                        status: header.byte3,
                    },
                    MessageType::DeselectReq => ControlMessage::DeselectReq,
                    MessageType::DeselectRsp => ControlMessage::DeselectRsp {
                        status: header.byte3,
                    },
                    MessageType::LinkTestReq => ControlMessage::LinkTestReq,
                    MessageType::LinkTestRsp => ControlMessage::LinkTestRsp,
                    MessageType::SeparateReq => ControlMessage::SeparateReq,
                    MessageType::RejectReq => ControlMessage::RejectReq {
                        reason: header.byte3,
                    },
                    MessageType::Data => return Err(WireError::Malformed),
                })
            }
        };

        Ok(Self {
            device: header.device,
            context: header.context,
            body,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            MessageBody::Data(d) => write!(
                f,
                "S{}F{}{} device={} context={} items={}",
                d.stream,
                d.function,
                if d.reply_expected { " W" } else { "" },
                self.device,
                self.context,
                d.items.len()
            ),
            MessageBody::Control(c) => {
                write!(f, "{:?} device={} context={}", c, self.device, self.context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemFormat;

    #[test]
    fn test_select_rsp_literal() {
        let msg = Message::select_rsp(37, 23, 0);
        assert_eq!(
            &msg.encode()[..],
            &[
                0x00, 0x00, 0x00, 0x0a, 0x00, 0x25, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
                0x17
            ]
        );
    }

    #[test]
    fn test_control_roundtrip() {
        let messages = vec![
            Message::select_req(1, 5),
            Message::select_rsp(1, 5, 1),
            Message::deselect_req(1, 6),
            Message::deselect_rsp(1, 6, 2),
            Message::link_test_req(7),
            Message::link_test_rsp(7),
            Message::separate_req(8),
            Message::reject_req(1, 9, 4),
        ];
        for msg in messages {
            let bytes = msg.encode();
            let decoded = Message::decode(bytes.slice(LENGTH_PREFIX_SIZE..)).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_control_device_ids() {
        assert_eq!(Message::link_test_req(1).device(), 0xFFFF);
        assert_eq!(Message::link_test_rsp(1).device(), 0xFFFF);
        assert_eq!(Message::separate_req(1).device(), 0xFFFF);
    }

    #[test]
    fn test_link_test_rsp_on_control_device() {
        // a peer that sends Linktest.req on its own session id
        let bytes = Bytes::from_static(&[0, 5, 0, 0, 0, 5, 0, 0, 0, 42]);
        let req = Message::decode(bytes).unwrap();
        assert_eq!(req.device(), 5);

        let rsp = Message::response_to(&req, 0).unwrap();
        assert_eq!(rsp, Message::link_test_rsp(42));
        assert_eq!(rsp.device(), CONTROL_DEVICE_ID);
        assert_eq!(rsp.context(), 42);
    }

    #[test]
    fn test_with_context() {
        let msg = Message::deselect_req(12, 3).with_context(77);
        assert_eq!(msg.context(), 77);
        assert_eq!(msg.device(), 12);
        assert_eq!(msg.body(), &MessageBody::Control(ControlMessage::DeselectReq));
    }

    #[test]
    fn test_data_roundtrip() {
        let body = DataMessage::new(
            1,
            3,
            true,
            vec![
                DataItem::list(vec![DataItem::u4(1001), DataItem::text("TEMP").unwrap()]).unwrap(),
            ],
        )
        .unwrap();
        let msg = Message::data(10, 1234, body).unwrap();
        let bytes = msg.encode();
        assert_eq!(bytes[6], 0x81);
        assert_eq!(bytes[7], 3);
        assert_eq!(bytes.len(), msg.encoded_len());

        let decoded = Message::decode(bytes.slice(LENGTH_PREFIX_SIZE..)).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_primary());
        assert!(decoded.is_reply_required());
    }

    #[test]
    fn test_auto_context() {
        for _ in 0..100 {
            let msg = Message::select_req(1, 0);
            assert!((1..=MAX_GENERATED_CONTEXT).contains(&msg.context()));
        }
        let primary =
            Message::data(1, 0, DataMessage::new(1, 1, true, vec![]).unwrap()).unwrap();
        assert_ne!(primary.context(), 0);

        // secondaries keep what they are given
        let secondary =
            Message::data(1, 0, DataMessage::new(1, 2, false, vec![]).unwrap()).unwrap();
        assert_eq!(secondary.context(), 0);
    }

    #[test]
    fn test_reply_keeps_context() {
        let primary =
            Message::data(3, 0, DataMessage::new(1, 13, true, vec![]).unwrap()).unwrap();
        let reply =
            Message::reply_to(&primary, vec![DataItem::binary(1, &[0]).unwrap()]).unwrap();
        assert_eq!(reply.context(), primary.context());
        assert_eq!(reply.device(), 3);
        let data = reply.as_data().unwrap();
        assert_eq!((data.stream(), data.function()), (1, 14));
        assert!(!reply.is_primary());
        assert!(!reply.is_reply_required());

        assert!(Message::reply_to(&reply, vec![]).is_err());

        let select = Message::select_req(3, 0);
        let rsp = Message::response_to(&select, 0).unwrap();
        assert_eq!(rsp.context(), select.context());
        assert_eq!(rsp.kind(), MessageType::SelectRsp);
        assert!(Message::response_to(&rsp, 0).is_none());
    }

    #[test]
    fn test_data_validation() {
        assert_eq!(
            DataMessage::new(128, 1, false, vec![]),
            Err(WireError::Range("stream"))
        );
        let body = DataMessage::new(1, 1, false, vec![]).unwrap();
        assert!(Message::data(0x8000, 1, body).is_err());
    }

    #[test]
    fn test_primary_flags() {
        let no_wait =
            Message::data(1, 1, DataMessage::new(6, 11, false, vec![]).unwrap()).unwrap();
        assert!(no_wait.is_primary());
        assert!(!no_wait.is_reply_required());
        assert!(Message::select_req(1, 1).is_reply_required());
        assert!(!Message::separate_req(1).is_reply_required());
        assert!(!Message::reject_req(1, 1, 4).is_primary());
    }

    #[test]
    fn test_decode_errors() {
        // unknown session type
        let bytes = Bytes::from_static(&[0, 1, 0, 0, 0, 8, 0, 0, 0, 1]);
        assert_eq!(Message::decode(bytes), Err(WireError::Type(8)));

        // control message with a body
        let bytes = Bytes::from_static(&[0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0xA5, 0x01, 0x00]);
        assert_eq!(Message::decode(bytes), Err(WireError::Malformed));

        // truncated item in data body
        let bytes = Bytes::from_static(&[0, 1, 0x81, 1, 0, 0, 0, 0, 0, 1, 0xA5, 0x02, 0x00]);
        assert_eq!(Message::decode(bytes), Err(WireError::Malformed));
    }

    #[test]
    fn test_display() {
        let msg = Message::data(
            1,
            7,
            DataMessage::new(1, 1, true, vec![DataItem::scalar(ItemFormat::U1, 1).unwrap()])
                .unwrap(),
        )
        .unwrap();
        assert_eq!(msg.to_string(), "S1F1 W device=1 context=7 items=1");
    }
}
