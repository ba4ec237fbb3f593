//! HSMS framing and SECS-II item encoding/decoding.
//!
//! This crate provides the wire-level implementation of HSMS (SEMI E37) and
//! SECS-II (SEMI E5): typed data items, their binary encoding, the 10-byte
//! message header and length-prefixed stream framing.
//!
//! ## Features
//!
//! - **Validated Items**: values are range-checked against their format when built
//! - **Zero-Copy I/O**: Uses `Bytes`/`BytesMut` for minimal allocations
//! - **Stream Framing**: incremental decoding of length-prefixed messages
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 length           | header + body length       |
//! +----------------------+----------------------------+
//! | u16 device           | session id                 |
//! +----------------------+----------------------------+
//! | u8 byte2 | u8 byte3  | W/stream, function|status  |
//! +----------------------+----------------------------+
//! | u8 ptype | u8 stype  | 0, session type            |
//! +----------------------+----------------------------+
//! | u32 context          | system bytes               |
//! +----------------------+----------------------------+
//! | body                 | SECS-II items (data only)  |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod item;
pub mod message;

// Re-export main types
pub use codec::{decode_items, MAX_NESTING_DEPTH};
pub use error::WireError;
pub use frame::{FrameDecoder, DEFAULT_MAX_MESSAGE_SIZE};
pub use header::{
    reason, status, Header, MessageType, CONTROL_DEVICE_ID, HEADER_SIZE, LENGTH_PREFIX_SIZE,
    PTYPE_SECS_II,
};
pub use item::{DataItem, DataItemBuilder, ItemFormat, ItemValue, Number, Values, MAX_ITEM_LENGTH};
pub use message::{
    generate_context, ControlMessage, DataMessage, Message, MessageBody, MAX_DATA_DEVICE_ID,
    MAX_GENERATED_CONTEXT, MAX_STREAM,
};
