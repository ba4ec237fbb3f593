//! SECS-II data items.
//!
//! A [`DataItem`] is a typed, possibly nested value. Items are validated when
//! they are built, so every item that exists can be encoded.

use crate::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest length a SECS-II item header can carry (three length bytes)
pub const MAX_ITEM_LENGTH: usize = 0xFF_FFFF;

/// SECS-II format codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemFormat {
    /// Nested list of items
    List = 0o00,
    /// Raw bytes
    Binary = 0o40,
    /// Booleans, one byte each
    Boolean = 0o44,
    /// 7-bit ASCII text
    Ascii = 0o100,
    /// 8-byte signed integer
    I8 = 0o140,
    /// 1-byte signed integer
    I1 = 0o144,
    /// 2-byte signed integer
    I2 = 0o150,
    /// 4-byte signed integer
    I4 = 0o160,
    /// 8-byte float
    F8 = 0o200,
    /// 4-byte float
    F4 = 0o220,
    /// 8-byte unsigned integer
    U8 = 0o240,
    /// 1-byte unsigned integer
    U1 = 0o244,
    /// 2-byte unsigned integer
    U2 = 0o250,
    /// 4-byte unsigned integer
    U4 = 0o260,
}

impl ItemFormat {
    /// Wire code with the length-byte bits cleared
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Element width in bytes; 0 for variable formats
    pub fn width(self) -> usize {
        match self {
            ItemFormat::List | ItemFormat::Binary | ItemFormat::Ascii => 0,
            ItemFormat::Boolean | ItemFormat::I1 | ItemFormat::U1 => 1,
            ItemFormat::I2 | ItemFormat::U2 => 2,
            ItemFormat::I4 | ItemFormat::U4 | ItemFormat::F4 => 4,
            ItemFormat::I8 | ItemFormat::U8 | ItemFormat::F8 => 8,
        }
    }

    /// Whether the format carries an explicit byte size
    pub fn is_sizeable(self) -> bool {
        matches!(self, ItemFormat::Ascii | ItemFormat::Binary)
    }

    /// Whether the format is one of the eight integer formats
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ItemFormat::I1
                | ItemFormat::I2
                | ItemFormat::I4
                | ItemFormat::I8
                | ItemFormat::U1
                | ItemFormat::U2
                | ItemFormat::U4
                | ItemFormat::U8
        )
    }

    /// Short SML-style name
    pub fn as_str(self) -> &'static str {
        match self {
            ItemFormat::List => "L",
            ItemFormat::Binary => "B",
            ItemFormat::Boolean => "BOOLEAN",
            ItemFormat::Ascii => "A",
            ItemFormat::I1 => "I1",
            ItemFormat::I2 => "I2",
            ItemFormat::I4 => "I4",
            ItemFormat::I8 => "I8",
            ItemFormat::U1 => "U1",
            ItemFormat::U2 => "U2",
            ItemFormat::U4 => "U4",
            ItemFormat::U8 => "U8",
            ItemFormat::F4 => "F4",
            ItemFormat::F8 => "F8",
        }
    }
}

impl TryFrom<u8> for ItemFormat {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0xFC {
            0o00 => Ok(ItemFormat::List),
            0o40 => Ok(ItemFormat::Binary),
            0o44 => Ok(ItemFormat::Boolean),
            0o100 => Ok(ItemFormat::Ascii),
            0o140 => Ok(ItemFormat::I8),
            0o144 => Ok(ItemFormat::I1),
            0o150 => Ok(ItemFormat::I2),
            0o160 => Ok(ItemFormat::I4),
            0o200 => Ok(ItemFormat::F8),
            0o220 => Ok(ItemFormat::F4),
            0o240 => Ok(ItemFormat::U8),
            0o244 => Ok(ItemFormat::U1),
            0o250 => Ok(ItemFormat::U2),
            0o260 => Ok(ItemFormat::U4),
            _ => Err(WireError::Format(value)),
        }
    }
}

impl fmt::Display for ItemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single element or a flat array of elements of one numeric type
#[derive(Debug, Clone, PartialEq)]
pub enum Values<T> {
    /// Exactly one element
    Scalar(T),
    /// Zero or more elements
    Array(Vec<T>),
}

impl<T> Values<T> {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Values::Scalar(_) => 1,
            Values::Array(v) => v.len(),
        }
    }

    /// True for an empty array
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[T] {
        match self {
            Values::Scalar(v) => std::slice::from_ref(v),
            Values::Array(v) => v,
        }
    }

    pub(crate) fn from_vec(mut v: Vec<T>) -> Self {
        if v.len() == 1 {
            if let Some(x) = v.pop() {
                return Values::Scalar(x);
            }
        }
        Values::Array(v)
    }

    fn try_map<U>(
        self,
        f: impl Fn(T) -> Result<U, WireError>,
    ) -> Result<Values<U>, WireError> {
        Ok(match self {
            Values::Scalar(v) => Values::Scalar(f(v)?),
            Values::Array(v) => Values::Array(v.into_iter().map(f).collect::<Result<_, _>>()?),
        })
    }
}

/// Value carried by a data item, tagged by format
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    /// Ordered child items
    List(Vec<DataItem>),
    /// Raw bytes, exactly `size` long
    Binary(Vec<u8>),
    /// Booleans
    Boolean(Values<bool>),
    /// ASCII text, exactly `size` bytes long
    Ascii(String),
    /// I1 elements
    I1(Values<i8>),
    /// I2 elements
    I2(Values<i16>),
    /// I4 elements
    I4(Values<i32>),
    /// I8 elements
    I8(Values<i64>),
    /// U1 elements
    U1(Values<u8>),
    /// U2 elements
    U2(Values<u16>),
    /// U4 elements
    U4(Values<u32>),
    /// U8 elements
    U8(Values<u64>),
    /// F4 elements
    F4(Values<f32>),
    /// F8 elements
    F8(Values<f64>),
}

impl ItemValue {
    /// Format of this value
    pub fn format(&self) -> ItemFormat {
        match self {
            ItemValue::List(_) => ItemFormat::List,
            ItemValue::Binary(_) => ItemFormat::Binary,
            ItemValue::Boolean(_) => ItemFormat::Boolean,
            ItemValue::Ascii(_) => ItemFormat::Ascii,
            ItemValue::I1(_) => ItemFormat::I1,
            ItemValue::I2(_) => ItemFormat::I2,
            ItemValue::I4(_) => ItemFormat::I4,
            ItemValue::I8(_) => ItemFormat::I8,
            ItemValue::U1(_) => ItemFormat::U1,
            ItemValue::U2(_) => ItemFormat::U2,
            ItemValue::U4(_) => ItemFormat::U4,
            ItemValue::U8(_) => ItemFormat::U8,
            ItemValue::F4(_) => ItemFormat::F4,
            ItemValue::F8(_) => ItemFormat::F8,
        }
    }

    /// Length field as written on the wire: child count for lists, byte length otherwise
    pub fn wire_len(&self) -> usize {
        match self {
            ItemValue::List(items) => items.len(),
            ItemValue::Binary(b) => b.len(),
            ItemValue::Ascii(s) => s.len(),
            ItemValue::Boolean(v) => v.len(),
            ItemValue::I1(v) => v.len(),
            ItemValue::U1(v) => v.len(),
            ItemValue::I2(v) => v.len() * 2,
            ItemValue::U2(v) => v.len() * 2,
            ItemValue::I4(v) => v.len() * 4,
            ItemValue::U4(v) => v.len() * 4,
            ItemValue::F4(v) => v.len() * 4,
            ItemValue::I8(v) => v.len() * 8,
            ItemValue::U8(v) => v.len() * 8,
            ItemValue::F8(v) => v.len() * 8,
        }
    }
}

/// Untyped number accepted by the generic constructors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
}

macro_rules! number_from {
    ($variant:ident, $as:ty: $($t:ty),*) => {
        $(impl From<$t> for Number {
            fn from(v: $t) -> Self {
                Number::$variant(v as $as)
            }
        })*
    };
}

number_from!(Int, i64: i8, i16, i32, i64);
number_from!(UInt, u64: u8, u16, u32, u64);
number_from!(Float, f64: f32, f64);

impl From<bool> for Number {
    fn from(v: bool) -> Self {
        Number::Bool(v)
    }
}

impl Number {
    fn to_integer(self, format: ItemFormat) -> Result<i128, WireError> {
        match self {
            Number::Int(v) => Ok(v as i128),
            Number::UInt(v) => Ok(v as i128),
            Number::Float(v) if v.is_finite() && v.fract() == 0.0 => {
                if v.abs() > 2f64.powi(64) {
                    Err(WireError::Range(format.as_str()))
                } else {
                    Ok(v as i128)
                }
            }
            Number::Float(_) | Number::Bool(_) => Err(WireError::Shape(format.as_str())),
        }
    }

    fn to_float(self, format: ItemFormat) -> Result<f64, WireError> {
        match self {
            Number::Int(v) => Ok(v as f64),
            Number::UInt(v) => Ok(v as f64),
            Number::Float(v) => Ok(v),
            Number::Bool(_) => Err(WireError::Shape(format.as_str())),
        }
    }

    fn to_bool(self, format: ItemFormat) -> Result<bool, WireError> {
        match self {
            Number::Bool(v) => Ok(v),
            _ => Err(WireError::Shape(format.as_str())),
        }
    }
}

fn integer<T: TryFrom<i128>>(format: ItemFormat) -> impl Fn(Number) -> Result<T, WireError> {
    move |n| T::try_from(n.to_integer(format)?).map_err(|_| WireError::Range(format.as_str()))
}

fn f4(n: Number) -> Result<f32, WireError> {
    let v = n.to_float(ItemFormat::F4)?;
    if v.is_finite() && v.abs() > f32::MAX as f64 {
        return Err(WireError::Range(ItemFormat::F4.as_str()));
    }
    Ok(v as f32)
}

fn numeric_value(format: ItemFormat, values: Values<Number>) -> Result<ItemValue, WireError> {
    Ok(match format {
        ItemFormat::I1 => ItemValue::I1(values.try_map(integer(format))?),
        ItemFormat::I2 => ItemValue::I2(values.try_map(integer(format))?),
        ItemFormat::I4 => ItemValue::I4(values.try_map(integer(format))?),
        ItemFormat::I8 => ItemValue::I8(values.try_map(integer(format))?),
        ItemFormat::U1 => ItemValue::U1(values.try_map(integer(format))?),
        ItemFormat::U2 => ItemValue::U2(values.try_map(integer(format))?),
        ItemFormat::U4 => ItemValue::U4(values.try_map(integer(format))?),
        ItemFormat::U8 => ItemValue::U8(values.try_map(integer(format))?),
        ItemFormat::F4 => ItemValue::F4(values.try_map(f4)?),
        ItemFormat::F8 => ItemValue::F8(values.try_map(|n| n.to_float(format))?),
        ItemFormat::Boolean => ItemValue::Boolean(values.try_map(|n| n.to_bool(format))?),
        ItemFormat::List | ItemFormat::Ascii | ItemFormat::Binary => {
            return Err(WireError::Shape(format.as_str()))
        }
    })
}

fn check_size(size: usize) -> Result<(), WireError> {
    if size > MAX_ITEM_LENGTH {
        return Err(WireError::Size(Some(size)));
    }
    Ok(())
}

/// A SECS-II data item
///
/// The name is a local label only: it never travels on the wire and is
/// ignored by equality.
#[derive(Debug, Clone)]
pub struct DataItem {
    name: String,
    value: ItemValue,
}

impl PartialEq for DataItem {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl DataItem {
    pub(crate) fn from_value(value: ItemValue) -> Self {
        Self {
            name: String::new(),
            value,
        }
    }

    /// Create a list item
    pub fn list(items: Vec<DataItem>) -> Result<Self, WireError> {
        check_size(items.len())?;
        Ok(Self::from_value(ItemValue::List(items)))
    }

    /// Create an ASCII item of exactly `size` bytes, space-padded or truncated
    pub fn ascii(size: usize, text: &str) -> Result<Self, WireError> {
        check_size(size)?;
        if !text.is_ascii() {
            return Err(WireError::Shape(ItemFormat::Ascii.as_str()));
        }
        let mut s: String = text.chars().take(size).collect();
        while s.len() < size {
            s.push(' ');
        }
        Ok(Self::from_value(ItemValue::Ascii(s)))
    }

    /// Create an ASCII item sized to the text
    pub fn text(text: &str) -> Result<Self, WireError> {
        Self::ascii(text.len(), text)
    }

    /// Create a binary item of exactly `size` bytes, zero-padded or truncated
    pub fn binary(size: usize, bytes: &[u8]) -> Result<Self, WireError> {
        check_size(size)?;
        let mut b = bytes[..bytes.len().min(size)].to_vec();
        b.resize(size, 0);
        Ok(Self::from_value(ItemValue::Binary(b)))
    }

    /// Create a single boolean
    pub fn boolean(value: bool) -> Self {
        Self::from_value(ItemValue::Boolean(Values::Scalar(value)))
    }

    /// Create a single numeric or boolean element, validated against the format
    pub fn scalar(format: ItemFormat, value: impl Into<Number>) -> Result<Self, WireError> {
        numeric_value(format, Values::Scalar(value.into())).map(Self::from_value)
    }

    /// Create a numeric or boolean array, validated against the format
    pub fn array<N: Into<Number>>(format: ItemFormat, values: Vec<N>) -> Result<Self, WireError> {
        check_size(values.len() * format.width())?;
        let values = values.into_iter().map(Into::into).collect();
        numeric_value(format, Values::Array(values)).map(Self::from_value)
    }

    /// Single I1
    pub fn i1(v: i8) -> Self {
        Self::from_value(ItemValue::I1(Values::Scalar(v)))
    }

    /// Single I2
    pub fn i2(v: i16) -> Self {
        Self::from_value(ItemValue::I2(Values::Scalar(v)))
    }

    /// Single I4
    pub fn i4(v: i32) -> Self {
        Self::from_value(ItemValue::I4(Values::Scalar(v)))
    }

    /// Single I8
    pub fn i8(v: i64) -> Self {
        Self::from_value(ItemValue::I8(Values::Scalar(v)))
    }

    /// Single U1
    pub fn u1(v: u8) -> Self {
        Self::from_value(ItemValue::U1(Values::Scalar(v)))
    }

    /// Single U2
    pub fn u2(v: u16) -> Self {
        Self::from_value(ItemValue::U2(Values::Scalar(v)))
    }

    /// Single U4
    pub fn u4(v: u32) -> Self {
        Self::from_value(ItemValue::U4(Values::Scalar(v)))
    }

    /// Single U8
    pub fn u8(v: u64) -> Self {
        Self::from_value(ItemValue::U8(Values::Scalar(v)))
    }

    /// Single F4
    pub fn f4(v: f32) -> Self {
        Self::from_value(ItemValue::F4(Values::Scalar(v)))
    }

    /// Single F8
    pub fn f8(v: f64) -> Self {
        Self::from_value(ItemValue::F8(Values::Scalar(v)))
    }

    /// Attach a local name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Local name, empty for decoded items
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format of the item
    pub fn format(&self) -> ItemFormat {
        self.value.format()
    }

    /// Byte size for ASCII and Binary items
    pub fn size(&self) -> Option<usize> {
        match &self.value {
            ItemValue::Ascii(s) => Some(s.len()),
            ItemValue::Binary(b) => Some(b.len()),
            _ => None,
        }
    }

    /// Typed value
    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    /// Child items of a list
    pub fn items(&self) -> Option<&[DataItem]> {
        match &self.value {
            ItemValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Text of an ASCII item
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ItemValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes of a binary item
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            ItemValue::Binary(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Input {
    One(Number),
    Many(Vec<Number>),
    Text(String),
    Bytes(Vec<u8>),
}

/// Builder for [`DataItem`]
///
/// Every setter overwrites the previous call. Validation happens in
/// [`DataItemBuilder::build`], so the size is applied to whatever value is
/// set at that point.
#[derive(Debug, Clone, Default)]
pub struct DataItemBuilder {
    name: Option<String>,
    format: Option<ItemFormat>,
    size: Option<usize>,
    input: Option<Input>,
    items: Option<Vec<DataItem>>,
}

impl DataItemBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the format
    pub fn format(mut self, format: ItemFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the byte size (ASCII and Binary only)
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set a single numeric or boolean value
    pub fn value(mut self, value: impl Into<Number>) -> Self {
        self.input = Some(Input::One(value.into()));
        self
    }

    /// Set an array of numeric or boolean values
    pub fn values<N: Into<Number>>(mut self, values: Vec<N>) -> Self {
        self.input = Some(Input::Many(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Set ASCII text
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.input = Some(Input::Text(text.into()));
        self
    }

    /// Set binary content
    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.input = Some(Input::Bytes(bytes.into()));
        self
    }

    /// Set list children
    pub fn items(mut self, items: Vec<DataItem>) -> Self {
        self.items = Some(items);
        self
    }

    /// Validate and build the item
    pub fn build(self) -> Result<DataItem, WireError> {
        let format = self.format.ok_or(WireError::Construction("missing format"))?;

        if self.size.is_some() && !format.is_sizeable() {
            return Err(WireError::Construction("size given for a format without size"));
        }
        if self.items.is_some() && format != ItemFormat::List {
            return Err(WireError::Construction("items given for a non-list format"));
        }

        let item = match format {
            ItemFormat::List => {
                if self.input.is_some() {
                    return Err(WireError::Construction("value given for a list"));
                }
                DataItem::list(self.items.unwrap_or_default())?
            }
            ItemFormat::Ascii | ItemFormat::Binary => {
                let size = self.size.ok_or(WireError::Size(None))?;
                match (format, self.input) {
                    (ItemFormat::Ascii, Some(Input::Text(s))) => DataItem::ascii(size, &s)?,
                    (ItemFormat::Binary, Some(Input::Bytes(b))) => DataItem::binary(size, &b)?,
                    (_, None) => return Err(WireError::Construction("missing value")),
                    _ => return Err(WireError::Shape(format.as_str())),
                }
            }
            _ => match self.input {
                Some(Input::One(n)) => DataItem::scalar(format, n)?,
                Some(Input::Many(v)) => DataItem::array(format, v)?,
                Some(_) => return Err(WireError::Shape(format.as_str())),
                None => return Err(WireError::Construction("missing value")),
            },
        };

        Ok(match self.name {
            Some(name) => item.with_name(name),
            None => item,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_conversion() {
        assert_eq!(ItemFormat::try_from(0x69).unwrap(), ItemFormat::I2);
        assert_eq!(ItemFormat::try_from(0x41).unwrap(), ItemFormat::Ascii);
        assert_eq!(ItemFormat::try_from(0x01).unwrap(), ItemFormat::List);
        assert_eq!(ItemFormat::try_from(0xFC), Err(WireError::Format(0xFC)));
        assert_eq!(ItemFormat::U4.code(), 176);
        assert_eq!(ItemFormat::F4.code(), 144);
        assert_eq!(ItemFormat::Boolean.code(), 36);
    }

    #[test]
    fn test_format_properties() {
        assert!(ItemFormat::Ascii.is_sizeable());
        assert!(ItemFormat::Binary.is_sizeable());
        assert!(!ItemFormat::U2.is_sizeable());
        assert!(ItemFormat::I8.is_integer());
        assert!(!ItemFormat::F8.is_integer());
        assert_eq!(ItemFormat::Boolean.width(), 1);
        assert_eq!(ItemFormat::F8.width(), 8);
        assert_eq!(ItemFormat::List.width(), 0);
    }

    #[test]
    fn test_integer_range_limits() {
        assert!(DataItem::scalar(ItemFormat::I1, -128).is_ok());
        assert!(DataItem::scalar(ItemFormat::I1, 127).is_ok());
        assert_eq!(
            DataItem::scalar(ItemFormat::I1, 128),
            Err(WireError::Range("I1"))
        );
        assert!(DataItem::scalar(ItemFormat::I1, -129).is_err());

        assert!(DataItem::scalar(ItemFormat::U2, 65535).is_ok());
        assert!(DataItem::scalar(ItemFormat::U2, 65536).is_err());
        assert!(DataItem::scalar(ItemFormat::U2, -1).is_err());

        assert!(DataItem::scalar(ItemFormat::I8, i64::MIN).is_ok());
        assert!(DataItem::scalar(ItemFormat::U8, u64::MAX).is_ok());
        assert!(DataItem::scalar(ItemFormat::I8, u64::MAX).is_err());
        assert!(DataItem::scalar(ItemFormat::U4, u32::MAX as u64 + 1).is_err());
    }

    #[test]
    fn test_integer_rejects_fraction() {
        assert_eq!(
            DataItem::scalar(ItemFormat::I4, 1.5),
            Err(WireError::Shape("I4"))
        );
        assert_eq!(
            DataItem::scalar(ItemFormat::I4, 3.0).unwrap(),
            DataItem::i4(3)
        );
        assert!(DataItem::scalar(ItemFormat::U1, true).is_err());
    }

    #[test]
    fn test_float_ranges() {
        assert!(DataItem::scalar(ItemFormat::F4, f32::MAX as f64).is_ok());
        assert!(DataItem::scalar(ItemFormat::F4, f64::MAX).is_err());
        assert!(DataItem::scalar(ItemFormat::F4, f64::INFINITY).is_ok());
        assert!(DataItem::scalar(ItemFormat::F8, f64::MAX).is_ok());
        assert_eq!(
            DataItem::scalar(ItemFormat::F8, 2).unwrap(),
            DataItem::f8(2.0)
        );
    }

    #[test]
    fn test_boolean_accepts_only_bools() {
        assert_eq!(
            DataItem::scalar(ItemFormat::Boolean, true).unwrap(),
            DataItem::boolean(true)
        );
        assert!(DataItem::scalar(ItemFormat::Boolean, 1).is_err());
    }

    #[test]
    fn test_array_validation() {
        let item = DataItem::array(ItemFormat::U1, vec![1u8, 2, 3]).unwrap();
        assert_eq!(item.value(), &ItemValue::U1(Values::Array(vec![1, 2, 3])));
        assert!(DataItem::array(ItemFormat::I1, vec![1, 200]).is_err());
        assert!(DataItem::array(ItemFormat::Ascii, vec![1]).is_err());
    }

    #[test]
    fn test_ascii_padding_and_truncation() {
        let item = DataItem::ascii(10, "john").unwrap();
        assert_eq!(item.as_str(), Some("john      "));
        assert_eq!(item.size(), Some(10));

        let item = DataItem::ascii(5, "This is a long string").unwrap();
        assert_eq!(item.as_str(), Some("This "));

        assert!(DataItem::ascii(3, "ünï").is_err());
    }

    #[test]
    fn test_binary_padding() {
        let item = DataItem::binary(4, &[1, 2]).unwrap();
        assert_eq!(item.as_bytes(), Some(&[1u8, 2, 0, 0][..]));
        let item = DataItem::binary(1, &[9, 8, 7]).unwrap();
        assert_eq!(item.as_bytes(), Some(&[9u8][..]));
        assert_eq!(
            DataItem::binary(MAX_ITEM_LENGTH + 1, &[]),
            Err(WireError::Size(Some(MAX_ITEM_LENGTH + 1)))
        );
    }

    #[test]
    fn test_equality_ignores_name() {
        let a = DataItem::u4(7).with_name("svid");
        let b = DataItem::u4(7);
        assert_eq!(a, b);
        assert_eq!(a.name(), "svid");
        assert_ne!(DataItem::u4(7), DataItem::u2(7));
    }

    #[test]
    fn test_builder_last_call_wins() {
        let item = DataItemBuilder::new()
            .name("first")
            .name("mdln")
            .format(ItemFormat::U1)
            .format(ItemFormat::Ascii)
            .size(2)
            .text("abc")
            .size(6)
            .build()
            .unwrap();
        assert_eq!(item.name(), "mdln");
        assert_eq!(item.as_str(), Some("abc   "));

        let again = DataItemBuilder::new()
            .format(ItemFormat::Ascii)
            .size(6)
            .text("abc")
            .build()
            .unwrap();
        assert_eq!(item, again);
    }

    #[test]
    fn test_builder_errors() {
        assert_eq!(
            DataItemBuilder::new().value(1).build(),
            Err(WireError::Construction("missing format"))
        );
        assert!(matches!(
            DataItemBuilder::new().format(ItemFormat::U2).build(),
            Err(WireError::Construction(_))
        ));
        assert!(matches!(
            DataItemBuilder::new()
                .format(ItemFormat::U2)
                .size(2)
                .value(1)
                .build(),
            Err(WireError::Construction(_))
        ));
        assert!(matches!(
            DataItemBuilder::new()
                .format(ItemFormat::List)
                .value(1)
                .build(),
            Err(WireError::Construction(_))
        ));
        assert!(matches!(
            DataItemBuilder::new()
                .format(ItemFormat::I4)
                .items(vec![])
                .value(1)
                .build(),
            Err(WireError::Construction(_))
        ));
        assert_eq!(
            DataItemBuilder::new()
                .format(ItemFormat::Ascii)
                .text("x")
                .build(),
            Err(WireError::Size(None))
        );
    }

    #[test]
    fn test_builder_list() {
        let list = DataItemBuilder::new()
            .format(ItemFormat::List)
            .items(vec![DataItem::u1(1), DataItem::text("ok").unwrap()])
            .build()
            .unwrap();
        assert_eq!(list.items().map(|i| i.len()), Some(2));
        assert_eq!(list.value().wire_len(), 2);

        let empty = DataItemBuilder::new()
            .format(ItemFormat::List)
            .build()
            .unwrap();
        assert_eq!(empty.items(), Some(&[][..]));
    }
}
