//! Thrift binary protocol codec.
//!
//! Writing is synchronous into an in-memory buffer ([`MessageWriter`]) that
//! the transport flushes in one go. Reading is asynchronous
//! ([`MessageReader`]) because the stream is unframed: the decoder cannot
//! know a message's length up front, so it walks the type tags and builds a
//! [`WireStruct`] tree. Typed structs are then decoded from the tree, which
//! keeps unknown-field skipping in a single place.
//!
//! All integers are big-endian. Messages use the strict header
//! (`0x8001_0000 | type`), and the legacy non-strict header is accepted on
//! read.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Strict protocol version tag.
const VERSION_1: u32 = 0x8001_0000;

/// Mask selecting the version bits of a strict header.
const VERSION_MASK: u32 = 0xffff_0000;

/// Mask selecting the message type bits of a strict header.
const TYPE_MASK: u32 = 0x0000_00ff;

/// Default cap on the bytes consumed by a single inbound message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Maximum struct/container nesting accepted on read.
const MAX_DEPTH: usize = 64;

// ============================================================================
// TType
// ============================================================================

/// Wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TType {
    /// End of struct marker.
    Stop = 0,
    /// Boolean.
    Bool = 2,
    /// Signed byte.
    Byte = 3,
    /// 64-bit float.
    Double = 4,
    /// 16-bit integer.
    I16 = 6,
    /// 32-bit integer.
    I32 = 8,
    /// 64-bit integer.
    I64 = 10,
    /// Length-prefixed bytes (also used for UTF-8 strings).
    String = 11,
    /// Nested struct.
    Struct = 12,
    /// Map.
    Map = 13,
    /// Set.
    Set = 14,
    /// List.
    List = 15,
}

impl TType {
    /// Parses a wire type tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown tags.
    pub fn from_u8(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => Self::Stop,
            2 => Self::Bool,
            3 => Self::Byte,
            4 => Self::Double,
            6 => Self::I16,
            8 => Self::I32,
            10 => Self::I64,
            11 => Self::String,
            12 => Self::Struct,
            13 => Self::Map,
            14 => Self::Set,
            15 => Self::List,
            other => return Err(Error::protocol(format!("Unknown field type {other}"))),
        })
    }
}

// ============================================================================
// MessageType
// ============================================================================

/// Message kinds carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Request expecting a reply.
    Call = 1,
    /// Normal reply (may still carry a declared exception).
    Reply = 2,
    /// Application exception in place of a reply.
    Exception = 3,
    /// Request without reply.
    Oneway = 4,
}

impl MessageType {
    /// Parses a message type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown message types.
    pub fn from_u8(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => Self::Call,
            2 => Self::Reply,
            3 => Self::Exception,
            4 => Self::Oneway,
            other => return Err(Error::protocol(format!("Unknown message type {other}"))),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Call => "CALL",
            Self::Reply => "REPLY",
            Self::Exception => "EXCEPTION",
            Self::Oneway => "ONEWAY",
        };
        f.write_str(name)
    }
}

/// Decoded message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Method name.
    pub name: String,
    /// Message kind.
    pub kind: MessageType,
    /// Sequence id echoed by the peer.
    pub seqid: i32,
}

// ============================================================================
// WireValue
// ============================================================================

/// A decoded value, independent of any schema.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Boolean.
    Bool(bool),
    /// Signed byte.
    Byte(i8),
    /// 64-bit float.
    Double(f64),
    /// 16-bit integer.
    I16(i16),
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// Raw bytes of a string field.
    Binary(Vec<u8>),
    /// Nested struct.
    Struct(WireStruct),
    /// Map entries in wire order.
    Map(Vec<(WireValue, WireValue)>),
    /// Set elements in wire order.
    Set(Vec<WireValue>),
    /// List elements in wire order.
    List(Vec<WireValue>),
}

impl WireValue {
    /// Returns the UTF-8 string held by a binary value.
    ///
    /// `Ok(None)` when the value is not a string at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bytes are not valid UTF-8.
    pub fn as_string(&self) -> Result<Option<String>> {
        match self {
            Self::Binary(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| Error::protocol(format!("Invalid UTF-8 in string field: {e}"))),
            _ => Ok(None),
        }
    }

    /// Returns the elements of a list or set whose elements are strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if an element is not a valid UTF-8 string.
    pub fn as_string_elements(&self) -> Result<Option<Vec<String>>> {
        let elements = match self {
            Self::List(elements) | Self::Set(elements) => elements,
            _ => return Ok(None),
        };

        elements
            .iter()
            .map(|element| {
                element
                    .as_string()?
                    .ok_or_else(|| Error::protocol("Expected string container element"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

// ============================================================================
// WireStruct
// ============================================================================

/// Fields of a decoded struct, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireStruct {
    fields: Vec<(i16, WireValue)>,
}

impl WireStruct {
    /// Creates an empty struct.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    pub fn push(&mut self, id: i16, value: WireValue) {
        self.fields.push((id, value));
    }

    /// Returns the last value seen for a field id.
    #[must_use]
    pub fn get(&self, id: i16) -> Option<&WireValue> {
        self.fields
            .iter()
            .rev()
            .find(|(field_id, _)| *field_id == id)
            .map(|(_, value)| value)
    }

    /// Returns the number of fields read.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields were read.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads a string field. Fields of another type are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on invalid UTF-8.
    pub fn string(&self, id: i16) -> Result<Option<String>> {
        match self.get(id) {
            Some(value) => value.as_string(),
            None => Ok(None),
        }
    }

    /// Reads an i32 field. Fields of another type are ignored.
    #[must_use]
    pub fn i32(&self, id: i16) -> Option<i32> {
        match self.get(id) {
            Some(WireValue::I32(value)) => Some(*value),
            _ => None,
        }
    }

    /// Reads a bool field. Fields of another type are ignored.
    #[must_use]
    pub fn bool(&self, id: i16) -> Option<bool> {
        match self.get(id) {
            Some(WireValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Reads a nested struct field. Fields of another type are ignored.
    #[must_use]
    pub fn structure(&self, id: i16) -> Option<&WireStruct> {
        match self.get(id) {
            Some(WireValue::Struct(value)) => Some(value),
            _ => None,
        }
    }

    /// Reads a list field of strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on non-string elements.
    pub fn string_list(&self, id: i16) -> Result<Option<Vec<String>>> {
        match self.get(id) {
            Some(value @ WireValue::List(_)) => value.as_string_elements(),
            _ => Ok(None),
        }
    }

    /// Reads a set field of strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on non-string elements.
    pub fn string_set(&self, id: i16) -> Result<Option<Vec<String>>> {
        match self.get(id) {
            Some(value @ WireValue::Set(_)) => value.as_string_elements(),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// ThriftStruct
// ============================================================================

/// A struct with a fixed schema that can be written and decoded.
pub trait ThriftStruct: Sized {
    /// Writes the struct body, including the trailing stop marker.
    fn write(&self, writer: &mut MessageWriter);

    /// Decodes the struct from a wire tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed field contents.
    fn from_wire(wire: &WireStruct) -> Result<Self>;
}

// ============================================================================
// MessageWriter
// ============================================================================

/// Buffered encoder for one outbound message.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// Creates an empty writer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a complete message: header followed by the struct body.
    #[must_use]
    pub fn message<T: ThriftStruct>(name: &str, kind: MessageType, seqid: i32, body: &T) -> Vec<u8> {
        let mut writer = Self::new();
        writer.write_message_begin(name, kind, seqid);
        body.write(&mut writer);
        writer.into_bytes()
    }

    /// Returns the encoded bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns the encoded bytes so far.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a strict message header.
    pub fn write_message_begin(&mut self, name: &str, kind: MessageType, seqid: i32) {
        let version = VERSION_1 | kind as u32;
        self.buf.extend_from_slice(&version.to_be_bytes());
        self.write_string(name);
        self.write_i32(seqid);
    }

    /// Writes a field header.
    pub fn write_field_begin(&mut self, ttype: TType, id: i16) {
        self.write_byte(ttype as i8);
        self.write_i16(id);
    }

    /// Writes the end-of-struct marker.
    pub fn write_field_stop(&mut self) {
        self.write_byte(TType::Stop as i8);
    }

    /// Writes a list header.
    pub fn write_list_begin(&mut self, element: TType, len: usize) {
        self.write_byte(element as i8);
        self.write_len(len);
    }

    /// Writes a set header.
    pub fn write_set_begin(&mut self, element: TType, len: usize) {
        self.write_list_begin(element, len);
    }

    /// Writes a bool.
    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(i8::from(value));
    }

    /// Writes a byte.
    pub fn write_byte(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an i16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes an i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_len(value.len());
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Writes a string field when present.
    pub fn write_opt_string_field(&mut self, id: i16, value: Option<&str>) {
        if let Some(value) = value {
            self.write_field_begin(TType::String, id);
            self.write_string(value);
        }
    }

    /// Writes a list-of-strings field.
    pub fn write_string_list_field(&mut self, id: i16, values: &[String]) {
        self.write_field_begin(TType::List, id);
        self.write_list_begin(TType::String, values.len());
        for value in values {
            self.write_string(value);
        }
    }

    /// Writes a nested struct field.
    pub fn write_struct_field<T: ThriftStruct>(&mut self, id: i16, value: &T) {
        self.write_field_begin(TType::Struct, id);
        value.write(self);
    }

    fn write_len(&mut self, len: usize) {
        // Lengths above i32::MAX cannot be represented; saturate so the peer rejects it.
        let len = i32::try_from(len).unwrap_or(i32::MAX);
        self.write_i32(len);
    }
}

// ============================================================================
// MessageReader
// ============================================================================

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Asynchronous decoder over an unframed byte stream.
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
    max_message_size: usize,
    consumed: usize,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Creates a reader with the default message size cap.
    pub fn new(inner: R) -> Self {
        Self::with_max_message_size(inner, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a reader with a custom message size cap.
    pub fn with_max_message_size(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            consumed: 0,
        }
    }

    /// Returns a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads a message header, resetting the per-message size budget.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] on transport failure (EOF included)
    /// - [`Error::Protocol`] on a bad version or message type
    pub async fn read_message_begin(&mut self) -> Result<MessageHeader> {
        self.consumed = 0;
        let first = self.read_i32().await?;

        if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(Error::protocol(format!(
                    "Bad protocol version 0x{:08x}",
                    word & VERSION_MASK
                )));
            }
            let kind = MessageType::from_u8((word & TYPE_MASK) as u8)?;
            let name = self.read_string().await?;
            let seqid = self.read_i32().await?;
            return Ok(MessageHeader { name, kind, seqid });
        }

        // Non-strict header: the first word is the name length.
        let len = self.check_len(first)?;
        let bytes = self.read_bytes(len).await?;
        let name = String::from_utf8(bytes)
            .map_err(|e| Error::protocol(format!("Invalid UTF-8 in message name: {e}")))?;
        let kind = MessageType::from_u8(self.read_byte().await? as u8)?;
        let seqid = self.read_i32().await?;
        Ok(MessageHeader { name, kind, seqid })
    }

    /// Reads a complete struct body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Protocol`] on malformed input.
    pub async fn read_struct(&mut self) -> Result<WireStruct> {
        match self.read_value(TType::Struct, 0).await? {
            WireValue::Struct(wire) => Ok(wire),
            _ => Err(Error::protocol("Expected struct")),
        }
    }

    /// Reads a struct body and decodes it into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Protocol`] on malformed input.
    pub async fn read_typed<T: ThriftStruct>(&mut self) -> Result<T> {
        let wire = self.read_struct().await?;
        T::from_wire(&wire)
    }

    fn read_value(&mut self, ttype: TType, depth: usize) -> BoxFuture<'_, Result<WireValue>> {
        Box::pin(async move {
            if depth > MAX_DEPTH {
                return Err(Error::protocol(format!(
                    "Nesting deeper than {MAX_DEPTH} levels"
                )));
            }

            let value = match ttype {
                TType::Stop => return Err(Error::protocol("Unexpected STOP type")),
                TType::Bool => WireValue::Bool(self.read_byte().await? != 0),
                TType::Byte => WireValue::Byte(self.read_byte().await?),
                TType::Double => {
                    let mut raw = [0u8; 8];
                    self.read_exact(&mut raw).await?;
                    WireValue::Double(f64::from_be_bytes(raw))
                }
                TType::I16 => WireValue::I16(self.read_i16().await?),
                TType::I32 => WireValue::I32(self.read_i32().await?),
                TType::I64 => {
                    let mut raw = [0u8; 8];
                    self.read_exact(&mut raw).await?;
                    WireValue::I64(i64::from_be_bytes(raw))
                }
                TType::String => {
                    let len = self.read_i32().await?;
                    let len = self.check_len(len)?;
                    WireValue::Binary(self.read_bytes(len).await?)
                }
                TType::Struct => {
                    let mut wire = WireStruct::new();
                    loop {
                        let field_type = TType::from_u8(self.read_byte().await? as u8)?;
                        if field_type == TType::Stop {
                            break;
                        }
                        let id = self.read_i16().await?;
                        let value = self.read_value(field_type, depth + 1).await?;
                        wire.push(id, value);
                    }
                    WireValue::Struct(wire)
                }
                TType::Map => {
                    let key_type = TType::from_u8(self.read_byte().await? as u8)?;
                    let value_type = TType::from_u8(self.read_byte().await? as u8)?;
                    let len = self.read_i32().await?;
                    let len = self.check_len(len)?;
                    let mut entries = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        let key = self.read_value(key_type, depth + 1).await?;
                        let value = self.read_value(value_type, depth + 1).await?;
                        entries.push((key, value));
                    }
                    WireValue::Map(entries)
                }
                TType::Set | TType::List => {
                    let element_type = TType::from_u8(self.read_byte().await? as u8)?;
                    let len = self.read_i32().await?;
                    let len = self.check_len(len)?;
                    let mut elements = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        elements.push(self.read_value(element_type, depth + 1).await?);
                    }
                    if ttype == TType::Set {
                        WireValue::Set(elements)
                    } else {
                        WireValue::List(elements)
                    }
                }
            };

            Ok(value)
        })
    }

    fn check_len(&self, len: i32) -> Result<usize> {
        let len = usize::try_from(len)
            .map_err(|_| Error::protocol(format!("Negative length {len}")))?;
        if len > self.max_message_size.saturating_sub(self.consumed) {
            return Err(Error::protocol(format!(
                "Length {len} exceeds limit of {} bytes",
                self.max_message_size
            )));
        }
        Ok(len)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.consumed = self.consumed.saturating_add(buf.len());
        if self.consumed > self.max_message_size {
            return Err(Error::protocol(format!(
                "Message exceeds limit of {} bytes",
                self.max_message_size
            )));
        }
        self.inner.read_exact(buf).await?;
        Ok(())
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        // Grow with the data actually received rather than trusting the prefix.
        self.consumed = self.consumed.saturating_add(len);
        let mut bytes = Vec::with_capacity(len.min(64 * 1024));
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes).await?;
        if bytes.len() != len {
            return Err(IoError::new(ErrorKind::UnexpectedEof, "truncated string").into());
        }
        Ok(bytes)
    }

    async fn read_byte(&mut self) -> Result<i8> {
        let mut raw = [0u8; 1];
        self.read_exact(&mut raw).await?;
        Ok(i8::from_be_bytes(raw))
    }

    async fn read_i16(&mut self) -> Result<i16> {
        let mut raw = [0u8; 2];
        self.read_exact(&mut raw).await?;
        Ok(i16::from_be_bytes(raw))
    }

    async fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw).await?;
        Ok(i32::from_be_bytes(raw))
    }

    async fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32().await?;
        let len = self.check_len(len)?;
        let bytes = self.read_bytes(len).await?;
        String::from_utf8(bytes).map_err(|e| Error::protocol(format!("Invalid UTF-8: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[derive(Debug, PartialEq)]
    struct Sample {
        name: Option<String>,
        tags: Vec<String>,
    }

    impl ThriftStruct for Sample {
        fn write(&self, writer: &mut MessageWriter) {
            writer.write_opt_string_field(1, self.name.as_deref());
            writer.write_string_list_field(2, &self.tags);
            writer.write_field_stop();
        }

        fn from_wire(wire: &WireStruct) -> Result<Self> {
            Ok(Self {
                name: wire.string(1)?,
                tags: wire.string_list(2)?.unwrap_or_default(),
            })
        }
    }

    async fn decode(bytes: Vec<u8>) -> Result<(MessageHeader, WireStruct)> {
        let mut reader = MessageReader::new(bytes.as_slice());
        let header = reader.read_message_begin().await?;
        let body = reader.read_struct().await?;
        Ok((header, body))
    }

    #[test]
    fn test_strict_header_bytes() {
        let mut writer = MessageWriter::new();
        writer.write_message_begin("go", MessageType::Call, 7);
        assert_eq!(
            writer.as_bytes(),
            &[0x80, 0x01, 0x00, 0x01, 0, 0, 0, 2, b'g', b'o', 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_ttype_rejects_unknown() {
        assert!(TType::from_u8(1).is_err());
        assert_eq!(TType::from_u8(11).unwrap(), TType::String);
    }

    #[tokio::test]
    async fn test_message_roundtrip() {
        let sample = Sample {
            name: Some("layout".into()),
            tags: vec!["mobile".into(), "desktop".into()],
        };
        let bytes = MessageWriter::message("check", MessageType::Reply, 3, &sample);

        let (header, body) = decode(bytes).await.unwrap();
        assert_eq!(header.name, "check");
        assert_eq!(header.kind, MessageType::Reply);
        assert_eq!(header.seqid, 3);
        assert_eq!(Sample::from_wire(&body).unwrap(), sample);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_skipped() {
        let mut writer = MessageWriter::new();
        writer.write_message_begin("m", MessageType::Reply, 0);
        // Unknown nested struct with a map inside.
        writer.write_field_begin(TType::Struct, 9);
        writer.write_field_begin(TType::Map, 1);
        writer.write_byte(TType::String as i8);
        writer.write_byte(TType::I32 as i8);
        writer.write_i32(1);
        writer.write_string("k");
        writer.write_i32(5);
        writer.write_field_stop();
        // Known id with wrong type is ignored.
        writer.write_field_begin(TType::I32, 1);
        writer.write_i32(42);
        writer.write_field_stop();

        let (_, body) = decode(writer.into_bytes()).await.unwrap();
        let sample = Sample::from_wire(&body).unwrap();
        assert_eq!(sample.name, None);
        assert!(sample.tags.is_empty());
    }

    #[tokio::test]
    async fn test_non_strict_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(b"hi");
        bytes.push(MessageType::Reply as u8);
        bytes.extend_from_slice(&9i32.to_be_bytes());
        bytes.push(0);

        let (header, body) = decode(bytes).await.unwrap();
        assert_eq!(header.name, "hi");
        assert_eq!(header.seqid, 9);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_bad_version_rejected() {
        let bytes = 0x8002_0001u32.to_be_bytes().to_vec();
        let err = decode(bytes).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_negative_length_rejected() {
        let mut writer = MessageWriter::new();
        writer.write_message_begin("m", MessageType::Reply, 0);
        writer.write_field_begin(TType::String, 1);
        writer.write_i32(-5);

        let err = decode(writer.into_bytes()).await.unwrap_err();
        assert!(err.to_string().contains("Negative length"));
    }

    #[tokio::test]
    async fn test_message_size_cap() {
        let sample = Sample {
            name: Some("x".repeat(128)),
            tags: Vec::new(),
        };
        let bytes = MessageWriter::message("m", MessageType::Reply, 0, &sample);

        let mut reader = MessageReader::with_max_message_size(bytes.as_slice(), 64);
        reader.read_message_begin().await.unwrap();
        let err = reader.read_struct().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_truncated_input_is_io_error() {
        let sample = Sample {
            name: Some("truncated".into()),
            tags: Vec::new(),
        };
        let mut bytes = MessageWriter::message("m", MessageType::Reply, 0, &sample);
        bytes.truncate(bytes.len() - 3);

        let err = decode(bytes).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    proptest! {
        #[test]
        fn prop_strings_and_lists_survive(
            name in proptest::option::of(".{0,40}"),
            tags in proptest::collection::vec(".{0,12}", 0..8),
        ) {
            let sample = Sample { name, tags };
            let bytes = MessageWriter::message("p", MessageType::Call, 1, &sample);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (_, body) = runtime.block_on(decode(bytes)).unwrap();
            prop_assert_eq!(Sample::from_wire(&body).unwrap(), sample);
        }

        #[test]
        fn prop_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let _ = runtime.block_on(decode(bytes));
        }
    }
}
