//! Message envelope: the header in front of a method's argument or result struct.
//!
//! Strict header: `i32 (0x8001_0000 | type)`, `string name`, `i32 seq_id`.
//! The old non-strict form (`string name`, `byte type`, `i32 seq_id`) is accepted
//! on read and never written. Which struct follows depends on the message type
//! and the method, as looked up on the service in the registry.

use crate::codec::{read_field_header, read_length, read_payload, Codec, DecodeError, DecodeErrorKind, EncodeError};
use crate::protocol::{ByteSource, SliceSource, TType};
use crate::registry::RegistryError;
use crate::skip;
use crate::types::TypeSpec;
use crate::value::{PathSegment, Value};
use byteorder::{BigEndian, WriteBytesExt};
use tracing::debug;

pub const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const TYPE_MASK: u32 = 0x0000_00ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    pub fn from_u8(b: u8) -> Option<MessageType> {
        match b {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::Reply),
            3 => Some(MessageType::Exception),
            4 => Some(MessageType::Oneway),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub message_type: MessageType,
    pub seq_id: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("bad protocol version {0:#010x}")]
    BadVersion(u32),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("message name is not valid UTF-8")]
    InvalidName,
    #[error("method {0} is oneway and has no reply")]
    NoReply(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Standard error carried by an `Exception` message: `{1: string message, 2: i32 type}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    pub message: Option<String>,
    pub kind: ApplicationExceptionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
    Other(i32),
}

impl ApplicationExceptionKind {
    pub fn from_i32(code: i32) -> Self {
        use ApplicationExceptionKind::*;
        match code {
            0 => Unknown,
            1 => UnknownMethod,
            2 => InvalidMessageType,
            3 => WrongMethodName,
            4 => BadSequenceId,
            5 => MissingResult,
            6 => InternalError,
            7 => ProtocolError,
            8 => InvalidTransform,
            9 => InvalidProtocol,
            10 => UnsupportedClientType,
            other => Other(other),
        }
    }

    pub fn code(self) -> i32 {
        use ApplicationExceptionKind::*;
        match self {
            Unknown => 0,
            UnknownMethod => 1,
            InvalidMessageType => 2,
            WrongMethodName => 3,
            BadSequenceId => 4,
            MissingResult => 5,
            InternalError => 6,
            ProtocolError => 7,
            InvalidTransform => 8,
            InvalidProtocol => 9,
            UnsupportedClientType => 10,
            Other(code) => code,
        }
    }
}

/// What follows the header.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// The method's `_args` struct (Call, Oneway).
    Args(Value),
    /// The method's `_result` struct (Reply).
    Result(Value),
    Exception(ApplicationException),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), EncodeError> {
    let n = i32::try_from(s.len()).map_err(|_| EncodeError::LengthOverflow(s.len()))?;
    out.write_i32::<BigEndian>(n)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_name<S: ByteSource>(src: &mut S, len: usize) -> Result<String, MessageError> {
    let buf = read_payload(src, len)?;
    String::from_utf8(buf).map_err(|_| MessageError::InvalidName)
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, message_type: MessageType, seq_id: i32) -> Self {
        MessageHeader { name: name.into(), message_type, seq_id }
    }

    /// Append the strict form.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.write_u32::<BigEndian>(VERSION_1 | self.message_type as u32)?;
        write_string(out, &self.name)?;
        out.write_i32::<BigEndian>(self.seq_id)?;
        Ok(())
    }

    /// Read either form; the name length is bounded like any string.
    pub fn read<S: ByteSource>(src: &mut S, codec: &Codec<'_>) -> Result<MessageHeader, MessageError> {
        let at = src.position();
        let first = src.read_i32().map_err(|e| DecodeError::io(e, at))?;
        let (name, raw_type) = if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(MessageError::BadVersion(word));
            }
            let len = read_length(src, codec.options())?;
            (read_name(src, len)?, (word & TYPE_MASK) as u8)
        } else {
            let len = first as usize;
            if len > codec.options().max_string_length || src.remaining().is_some_and(|rem| len > rem) {
                return Err(DecodeError::new(
                    DecodeErrorKind::NegativeOrExcessiveLength { length: first as i64, limit: codec.options().max_string_length },
                    at,
                )
                .into());
            }
            let name = read_name(src, len)?;
            let tat = src.position();
            (name, src.read_u8().map_err(|e| DecodeError::io(e, tat))?)
        };
        let message_type = MessageType::from_u8(raw_type).ok_or(MessageError::UnknownMessageType(raw_type))?;
        let sat = src.position();
        let seq_id = src.read_i32().map_err(|e| DecodeError::io(e, sat))?;
        Ok(MessageHeader { name, message_type, seq_id })
    }
}

impl ApplicationException {
    pub fn new(kind: ApplicationExceptionKind, message: impl Into<String>) -> Self {
        ApplicationException { message: Some(message.into()), kind }
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if let Some(message) = &self.message {
            out.write_u8(TType::String.as_u8())?;
            out.write_i16::<BigEndian>(1)?;
            write_string(out, message)?;
        }
        out.write_u8(TType::I32.as_u8())?;
        out.write_i16::<BigEndian>(2)?;
        out.write_i32::<BigEndian>(self.kind.code())?;
        out.write_u8(TType::Stop.as_u8())?;
        Ok(())
    }

    /// Fields other than `1: string` and `2: i32` are skipped.
    pub fn read<S: ByteSource>(src: &mut S, codec: &Codec<'_>) -> Result<ApplicationException, DecodeError> {
        let mut out = ApplicationException { message: None, kind: ApplicationExceptionKind::Unknown };
        while let Some((tag, id, _)) = read_field_header(src)? {
            let at = src.position();
            match (id, tag) {
                (1, TType::String) => {
                    let len = read_length(src, codec.options())?;
                    let buf = read_payload(src, len)?;
                    let message = String::from_utf8(buf).map_err(|_| DecodeError::new(DecodeErrorKind::InvalidUtf8, at))?;
                    out.message = Some(message);
                }
                (2, TType::I32) => {
                    out.kind = ApplicationExceptionKind::from_i32(src.read_i32().map_err(|e| DecodeError::io(e, at))?);
                }
                _ => skip::skip_value(src, tag, codec.options()).map_err(|e| e.within(PathSegment::Field(id)))?,
            }
        }
        Ok(out)
    }
}

/// Header plus the method's args struct. Oneway methods get a `Oneway` header.
pub fn encode_call(codec: &Codec<'_>, service: &str, method: &str, seq_id: i32, args: &Value) -> Result<Vec<u8>, MessageError> {
    let (_, m) = codec.registry().find_method(service, method)?;
    let message_type = if m.oneway { MessageType::Oneway } else { MessageType::Call };
    let mut out = Vec::new();
    MessageHeader::new(method, message_type, seq_id).write(&mut out)?;
    out.extend(codec.encode(args, &TypeSpec::Struct(m.args_struct.clone()))?);
    Ok(out)
}

/// Header plus the method's result struct.
pub fn encode_reply(codec: &Codec<'_>, service: &str, method: &str, seq_id: i32, result: &Value) -> Result<Vec<u8>, MessageError> {
    let (_, m) = codec.registry().find_method(service, method)?;
    let result_struct = m.result_struct.as_ref().ok_or_else(|| MessageError::NoReply(method.to_string()))?;
    let mut out = Vec::new();
    MessageHeader::new(method, MessageType::Reply, seq_id).write(&mut out)?;
    out.extend(codec.encode(result, &TypeSpec::Struct(result_struct.clone()))?);
    Ok(out)
}

pub fn encode_exception(method: &str, seq_id: i32, exception: &ApplicationException) -> Result<Vec<u8>, MessageError> {
    let mut out = Vec::new();
    MessageHeader::new(method, MessageType::Exception, seq_id).write(&mut out)?;
    exception.write(&mut out)?;
    Ok(out)
}

/// Decode a whole message addressed to `service` (or a service it extends).
pub fn decode_message(codec: &Codec<'_>, service: &str, bytes: &[u8]) -> Result<Message, MessageError> {
    let mut src = SliceSource::new(bytes);
    let header = MessageHeader::read(&mut src, codec)?;
    debug!(method = %header.name, message_type = ?header.message_type, seq_id = header.seq_id, "message header");
    let body = match header.message_type {
        MessageType::Call | MessageType::Oneway => {
            let (_, m) = codec.registry().find_method(service, &header.name)?;
            MessageBody::Args(codec.read(&TypeSpec::Struct(m.args_struct.clone()), &mut src)?)
        }
        MessageType::Reply => {
            let (_, m) = codec.registry().find_method(service, &header.name)?;
            let result_struct = m.result_struct.as_ref().ok_or_else(|| MessageError::NoReply(header.name.clone()))?;
            MessageBody::Result(codec.read(&TypeSpec::Struct(result_struct.clone()), &mut src)?)
        }
        MessageType::Exception => MessageBody::Exception(ApplicationException::read(&mut src, codec)?),
    };
    let left = src.remaining_bytes().len();
    if left > 0 {
        return Err(DecodeError::new(DecodeErrorKind::TrailingBytes(left), src.position()).into());
    }
    Ok(Message { header, body })
}
