//! SECS-II item encoding and decoding.
//!
//! Every item starts with a format byte whose low two bits give the number of
//! big-endian length bytes that follow (1..=3). Lists count child items,
//! every other format counts payload bytes.

use crate::item::{DataItem, ItemFormat, ItemValue, Values};
use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Deepest list nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

fn length_bytes(len: usize) -> u8 {
    match len {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        _ => 3,
    }
}

macro_rules! put_values {
    ($buf:expr, $values:expr, $put:ident) => {
        for v in $values.as_slice() {
            $buf.$put(*v);
        }
    };
}

macro_rules! get_values {
    ($buf:expr, $count:expr, $get:ident) => {
        Values::from_vec((0..$count).map(|_| $buf.$get()).collect())
    };
}

impl DataItem {
    /// Number of bytes [`DataItem::encode`] writes
    pub fn encoded_len(&self) -> usize {
        let len = self.value().wire_len();
        let header = 1 + length_bytes(len) as usize;
        match self.value() {
            ItemValue::List(items) => {
                header + items.iter().map(DataItem::encoded_len).sum::<usize>()
            }
            _ => header + len,
        }
    }

    /// Encode the item (header and payload) into `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        let value = self.value();
        let len = value.wire_len();
        let n = length_bytes(len);

        buf.put_u8(value.format().code() | n);
        buf.put_uint(len as u64, n as usize);

        match value {
            ItemValue::List(items) => {
                for item in items {
                    item.encode(buf);
                }
            }
            ItemValue::Binary(b) => buf.put_slice(b),
            ItemValue::Ascii(s) => buf.put_slice(s.as_bytes()),
            ItemValue::Boolean(v) => {
                for b in v.as_slice() {
                    buf.put_u8(u8::from(*b));
                }
            }
            ItemValue::I1(v) => put_values!(buf, v, put_i8),
            ItemValue::I2(v) => put_values!(buf, v, put_i16),
            ItemValue::I4(v) => put_values!(buf, v, put_i32),
            ItemValue::I8(v) => put_values!(buf, v, put_i64),
            ItemValue::U1(v) => put_values!(buf, v, put_u8),
            ItemValue::U2(v) => put_values!(buf, v, put_u16),
            ItemValue::U4(v) => put_values!(buf, v, put_u32),
            ItemValue::U8(v) => put_values!(buf, v, put_u64),
            ItemValue::F4(v) => put_values!(buf, v, put_f32),
            ItemValue::F8(v) => put_values!(buf, v, put_f64),
        }
    }

    /// Encode the item into a new buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one item from the front of `buf`
    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        decode_item(buf, 0)
    }
}

fn decode_item(buf: &mut Bytes, depth: usize) -> Result<DataItem, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::Malformed);
    }

    let first = buf.get_u8();
    let format = ItemFormat::try_from(first)?;
    let n = (first & 0x03) as usize;
    if n == 0 || buf.remaining() < n {
        return Err(WireError::Malformed);
    }
    let len = buf.get_uint(n) as usize;

    if format == ItemFormat::List {
        if depth >= MAX_NESTING_DEPTH {
            return Err(WireError::Malformed);
        }
        // every child takes at least two bytes
        let mut items = Vec::with_capacity(len.min(buf.remaining() / 2));
        for _ in 0..len {
            items.push(decode_item(buf, depth + 1)?);
        }
        return Ok(DataItem::from_value(ItemValue::List(items)));
    }

    if buf.remaining() < len {
        return Err(WireError::Malformed);
    }

    let width = format.width().max(1);
    if len % width != 0 {
        return Err(WireError::Width { len, width });
    }
    let count = len / width;

    let value = match format {
        ItemFormat::Ascii => {
            let raw = buf.split_to(len);
            if !raw.is_ascii() {
                return Err(WireError::Malformed);
            }
            ItemValue::Ascii(raw.iter().map(|b| *b as char).collect())
        }
        ItemFormat::Binary => ItemValue::Binary(buf.split_to(len).to_vec()),
        ItemFormat::Boolean => ItemValue::Boolean(get_values!(buf, count, get_u8).map_bool()),
        ItemFormat::I1 => ItemValue::I1(get_values!(buf, count, get_i8)),
        ItemFormat::I2 => ItemValue::I2(get_values!(buf, count, get_i16)),
        ItemFormat::I4 => ItemValue::I4(get_values!(buf, count, get_i32)),
        ItemFormat::I8 => ItemValue::I8(get_values!(buf, count, get_i64)),
        ItemFormat::U1 => ItemValue::U1(get_values!(buf, count, get_u8)),
        ItemFormat::U2 => ItemValue::U2(get_values!(buf, count, get_u16)),
        ItemFormat::U4 => ItemValue::U4(get_values!(buf, count, get_u32)),
        ItemFormat::U8 => ItemValue::U8(get_values!(buf, count, get_u64)),
        ItemFormat::F4 => ItemValue::F4(get_values!(buf, count, get_f32)),
        ItemFormat::F8 => ItemValue::F8(get_values!(buf, count, get_f64)),
        ItemFormat::List => unreachable!("lists handled above"),
    };

    Ok(DataItem::from_value(value))
}

impl Values<u8> {
    fn map_bool(self) -> Values<bool> {
        match self {
            Values::Scalar(b) => Values::Scalar(b != 0),
            Values::Array(v) => Values::Array(v.into_iter().map(|b| b != 0).collect()),
        }
    }
}

/// Decode items until `buf` is exhausted
pub fn decode_items(buf: &mut Bytes) -> Result<Vec<DataItem>, WireError> {
    let mut items = Vec::new();
    while buf.has_remaining() {
        items.push(DataItem::decode(buf)?);
    }
    Ok(items)
}
