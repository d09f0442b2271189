//! Encode/decode [`Value`]s with the binary protocol, driven by linked [`TypeSpec`]s.
//!
//! Encoding validates the whole value first, so nothing reaches the sink for a
//! value that does not fit its spec. Decoding is strict about wire tags (a known
//! field with the wrong tag is an error, never coerced), skips unknown fields,
//! and checks every length prefix against the configured limits and the bytes
//! actually left before allocating.

use crate::protocol::{ByteSource, SliceSource, TType};
use crate::registry::TypeRegistry;
use crate::skip;
use crate::types::TypeSpec;
use crate::value::{EnumValue, FieldPath, PathSegment, StructValue, UnionValue, Validator, Value, ValueError, ValueErrorKind};
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use tracing::{debug, trace};

/// Decoder limits. Encoding only uses `max_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Deepest nesting of containers and structs accepted.
    pub max_depth: usize,
    /// Largest string/binary length prefix accepted.
    pub max_string_length: usize,
    /// Largest list/set/map count accepted.
    pub max_container_length: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            max_depth: crate::value::DEFAULT_MAX_DEPTH,
            max_string_length: 64 * 1024 * 1024,
            max_container_length: 16 * 1024 * 1024,
        }
    }
}

/// Binary protocol codec over a linked registry. Cheap to create; holds no state
/// between calls.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'r> {
    registry: &'r TypeRegistry,
    options: CodecOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("value does not match its type: {0}")]
    ValueSpecMismatch(#[from] ValueError),
    #[error("length {0} does not fit in an i32 length prefix")]
    LengthOverflow(usize),
    #[error("IO: {0}")]
    Io(#[from] io::Error),
}

/// Decoding failed at byte `offset`, inside the value reached by `path`.
#[derive(Debug, thiserror::Error)]
#[error("{kind} at byte {offset} (path {path})")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
    pub path: FieldPath,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("expected {expected}, found tag {found}")]
    UnexpectedTypeTag { expected: TType, found: u8 },
    #[error("input ended early")]
    TruncatedInput,
    #[error("length {length} is negative or exceeds {limit}")]
    NegativeOrExcessiveLength { length: i64, limit: usize },
    #[error("missing required field {id} ({name}) of {type_name}")]
    MissingRequiredField { type_name: String, id: i16, name: String },
    #[error("union {type_name} carries {count} fields, expected exactly one")]
    InvalidUnionArity { type_name: String, count: usize },
    #[error("invalid type tag {0}")]
    InvalidTypeTag(u8),
    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} bytes left after the value")]
    TrailingBytes(usize),
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("IO: {0}")]
    Source(#[source] io::Error),
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, offset: usize) -> Self {
        DecodeError { kind, offset, path: FieldPath::root() }
    }

    pub(crate) fn within(mut self, seg: PathSegment) -> Self {
        self.path.prepend(seg);
        self
    }

    pub(crate) fn io(e: io::Error, offset: usize) -> Self {
        let kind = if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeErrorKind::TruncatedInput
        } else {
            DecodeErrorKind::Source(e)
        };
        DecodeError::new(kind, offset)
    }
}

/// Read a tag byte that must be a valid, non-STOP wire type.
pub(crate) fn read_tag<S: ByteSource>(src: &mut S) -> Result<TType, DecodeError> {
    let at = src.position();
    let raw = src.read_u8().map_err(|e| DecodeError::io(e, at))?;
    match TType::from_u8(raw) {
        Some(t) if t != TType::Stop => Ok(t),
        _ => Err(DecodeError::new(DecodeErrorKind::InvalidTypeTag(raw), at)),
    }
}

/// Read a field header; `None` on STOP.
pub(crate) fn read_field_header<S: ByteSource>(src: &mut S) -> Result<Option<(TType, i16, usize)>, DecodeError> {
    let at = src.position();
    let raw = src.read_u8().map_err(|e| DecodeError::io(e, at))?;
    if raw == TType::Stop.as_u8() {
        return Ok(None);
    }
    let tag = TType::from_u8(raw).ok_or_else(|| DecodeError::new(DecodeErrorKind::InvalidTypeTag(raw), at))?;
    let id = src.read_i16().map_err(|e| DecodeError::io(e, src.position()))?;
    Ok(Some((tag, id, at)))
}

/// String/binary length prefix, checked against the limit and the bytes left.
pub(crate) fn read_length<S: ByteSource>(src: &mut S, options: &CodecOptions) -> Result<usize, DecodeError> {
    let at = src.position();
    let n = src.read_i32().map_err(|e| DecodeError::io(e, at))?;
    if n < 0 || n as usize > options.max_string_length {
        return Err(DecodeError::new(
            DecodeErrorKind::NegativeOrExcessiveLength { length: n as i64, limit: options.max_string_length },
            at,
        ));
    }
    let n = n as usize;
    if let Some(rem) = src.remaining() {
        if n > rem {
            return Err(DecodeError::new(DecodeErrorKind::TruncatedInput, src.position()));
        }
    }
    Ok(n)
}

/// Largest up-front reservation for a source that cannot report how many
/// bytes are left; past this, buffers grow as bytes actually arrive.
const UNKNOWN_LENGTH_PREALLOC: usize = 1024;

fn prealloc<S: ByteSource>(src: &S, count: usize) -> usize {
    match src.remaining() {
        Some(_) => count,
        None => count.min(UNKNOWN_LENGTH_PREALLOC),
    }
}

/// Read `n` payload bytes. Lengths from a sized source were already checked
/// against what is left; an unsized source is read in chunks.
pub(crate) fn read_payload<S: ByteSource>(src: &mut S, n: usize) -> Result<Vec<u8>, DecodeError> {
    let at = src.position();
    if src.remaining().is_some() {
        let mut buf = vec![0u8; n];
        src.read_exact(&mut buf).map_err(|e| DecodeError::io(e, at))?;
        return Ok(buf);
    }
    let mut buf = Vec::with_capacity(n.min(UNKNOWN_LENGTH_PREALLOC));
    let mut chunk = [0u8; 4096];
    while buf.len() < n {
        let k = (n - buf.len()).min(chunk.len());
        src.read_exact(&mut chunk[..k]).map_err(|e| DecodeError::io(e, at))?;
        buf.extend_from_slice(&chunk[..k]);
    }
    Ok(buf)
}

/// Container count, checked against the limit and against what `per_item`
/// bytes per element leaves room for.
pub(crate) fn read_count<S: ByteSource>(src: &mut S, options: &CodecOptions, per_item: usize) -> Result<usize, DecodeError> {
    let at = src.position();
    let n = src.read_i32().map_err(|e| DecodeError::io(e, at))?;
    let excessive = |limit| DecodeError::new(DecodeErrorKind::NegativeOrExcessiveLength { length: n as i64, limit }, at);
    if n < 0 || n as usize > options.max_container_length {
        return Err(excessive(options.max_container_length));
    }
    if let Some(rem) = src.remaining() {
        if (n as usize).saturating_mul(per_item) > rem {
            return Err(excessive(rem / per_item.max(1)));
        }
    }
    Ok(n as usize)
}

fn expect_tag(found: TType, expected: TType, at: usize) -> Result<(), DecodeError> {
    if found == expected {
        Ok(())
    } else {
        Err(DecodeError::new(DecodeErrorKind::UnexpectedTypeTag { expected, found: found.as_u8() }, at))
    }
}

/// Container header tag byte; anything but `expected` (valid tag or not) is a mismatch.
fn expect_tag_byte<S: ByteSource>(src: &mut S, expected: TType) -> Result<(), DecodeError> {
    let at = src.position();
    let raw = src.read_u8().map_err(|e| DecodeError::io(e, at))?;
    if raw == expected.as_u8() {
        Ok(())
    } else {
        Err(DecodeError::new(DecodeErrorKind::UnexpectedTypeTag { expected, found: raw }, at))
    }
}

impl<'r> Codec<'r> {
    pub fn new(registry: &'r TypeRegistry, options: CodecOptions) -> Self {
        Codec { registry, options }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Validate, then encode into a fresh buffer.
    pub fn encode(&self, value: &Value, spec: &TypeSpec) -> Result<Vec<u8>, EncodeError> {
        Validator::new(self.registry, self.options.max_depth).check(spec, value, 0)?;
        let mut out = Vec::new();
        self.write_value(&mut out, spec, value)?;
        trace!(spec = %spec, bytes = out.len(), "encoded value");
        Ok(out)
    }

    /// Validate and encode, then hand the bytes to `sink` in one `write_all`.
    /// Returns the number of bytes written.
    pub fn write<W: Write>(&self, value: &Value, spec: &TypeSpec, sink: &mut W) -> Result<usize, EncodeError> {
        let buf = self.encode(value, spec)?;
        sink.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Decode exactly one value occupying all of `bytes`.
    pub fn decode(&self, bytes: &[u8], spec: &TypeSpec) -> Result<Value, DecodeError> {
        let mut src = SliceSource::new(bytes);
        let value = self.read(spec, &mut src)?;
        let left = src.remaining_bytes().len();
        if left > 0 {
            return Err(DecodeError::new(DecodeErrorKind::TrailingBytes(left), src.position()));
        }
        Ok(value)
    }

    /// Decode one value; the source is left just after it.
    pub fn read<S: ByteSource>(&self, spec: &TypeSpec, source: &mut S) -> Result<Value, DecodeError> {
        let start = source.position();
        let value = self.read_value(source, spec, 0).map_err(|e| {
            debug!(spec = %spec, offset = e.offset, path = %e.path, error = %e.kind, "decode failed");
            e
        })?;
        trace!(spec = %spec, bytes = source.position() - start, "decoded value");
        Ok(value)
    }

    /// Wire tag of a spec, following typedefs.
    pub(crate) fn wire_type(&self, spec: &TypeSpec) -> Result<TType, String> {
        let canonical = self.registry.canonical(spec).map_err(|e| e.to_string())?;
        canonical.ttype().ok_or_else(|| format!("no wire type for {}", canonical))
    }

    fn wire_type_at(&self, spec: &TypeSpec, at: usize) -> Result<TType, DecodeError> {
        self.wire_type(spec).map_err(|e| DecodeError::new(DecodeErrorKind::UnknownType(e), at))
    }

    fn read_value<S: ByteSource>(&self, src: &mut S, spec: &TypeSpec, depth: usize) -> Result<Value, DecodeError> {
        let at = src.position();
        if depth > self.options.max_depth {
            return Err(DecodeError::new(DecodeErrorKind::DepthLimitExceeded(self.options.max_depth), at));
        }
        let spec = self
            .registry
            .canonical(spec)
            .map_err(|e| DecodeError::new(DecodeErrorKind::UnknownType(e.to_string()), at))?;
        let eof = |e: io::Error| DecodeError::io(e, at);
        Ok(match spec {
            TypeSpec::Bool => Value::Bool(src.read_u8().map_err(eof)? != 0),
            TypeSpec::Byte => Value::Byte(src.read_i8().map_err(eof)?),
            TypeSpec::I16 => Value::I16(src.read_i16().map_err(eof)?),
            TypeSpec::I32 => Value::I32(src.read_i32().map_err(eof)?),
            TypeSpec::I64 => Value::I64(src.read_i64().map_err(eof)?),
            TypeSpec::Double => Value::Double(src.read_f64().map_err(eof)?),
            TypeSpec::String => {
                let bytes = self.read_bytes(src)?;
                Value::String(String::from_utf8(bytes).map_err(|_| DecodeError::new(DecodeErrorKind::InvalidUtf8, at))?)
            }
            TypeSpec::Binary => Value::Binary(self.read_bytes(src)?),
            TypeSpec::List(elem) => {
                let count = self.read_seq_header(src, elem)?;
                let mut items = Vec::with_capacity(prealloc(src, count));
                for i in 0..count {
                    items.push(self.read_value(src, elem, depth + 1).map_err(|e| e.within(PathSegment::Index(i)))?);
                }
                Value::List(items)
            }
            TypeSpec::Set(elem) => {
                let count = self.read_seq_header(src, elem)?;
                let mut items = BTreeSet::new();
                for i in 0..count {
                    items.insert(self.read_value(src, elem, depth + 1).map_err(|e| e.within(PathSegment::Index(i)))?);
                }
                Value::Set(items)
            }
            TypeSpec::Map(kspec, vspec) => {
                let key_tag = self.wire_type_at(kspec, at)?;
                let value_tag = self.wire_type_at(vspec, at)?;
                expect_tag_byte(src, key_tag)?;
                expect_tag_byte(src, value_tag)?;
                let count = read_count(src, &self.options, key_tag.min_wire_size() + value_tag.min_wire_size())?;
                let mut entries = BTreeMap::new();
                for i in 0..count {
                    let k = self.read_value(src, kspec, depth + 1).map_err(|e| e.within(PathSegment::Key(i)))?;
                    let v = self.read_value(src, vspec, depth + 1).map_err(|e| e.within(PathSegment::MapValue(i)))?;
                    entries.insert(k, v);
                }
                Value::Map(entries)
            }
            TypeSpec::Struct(name) => Value::Struct(self.read_struct(src, name, depth)?),
            TypeSpec::Union(name) => Value::Union(self.read_union(src, name, depth)?),
            TypeSpec::Enum(name) => {
                let raw = src.read_i32().map_err(eof)?;
                let enum_spec = self
                    .registry
                    .enum_spec(name)
                    .map_err(|e| DecodeError::new(DecodeErrorKind::UnknownType(e.to_string()), at))?;
                match enum_spec.member_by_value(raw) {
                    Some(m) => Value::Enum(EnumValue { value: raw, name: Some(m.name.clone()) }),
                    None => Value::Enum(EnumValue::raw(raw)),
                }
            }
            TypeSpec::Typedef(name) => return Err(DecodeError::new(DecodeErrorKind::UnknownType(name.to_string()), at)),
        })
    }

    fn read_bytes<S: ByteSource>(&self, src: &mut S) -> Result<Vec<u8>, DecodeError> {
        let n = read_length(src, &self.options)?;
        read_payload(src, n)
    }

    /// List/set header: element tag (must match even for empty containers) and count.
    fn read_seq_header<S: ByteSource>(&self, src: &mut S, elem: &TypeSpec) -> Result<usize, DecodeError> {
        let at = src.position();
        let expected = self.wire_type_at(elem, at)?;
        expect_tag_byte(src, expected)?;
        read_count(src, &self.options, expected.min_wire_size())
    }

    fn read_struct<S: ByteSource>(&self, src: &mut S, name: &str, depth: usize) -> Result<StructValue, DecodeError> {
        let st = self
            .registry
            .struct_spec(name)
            .map_err(|e| DecodeError::new(DecodeErrorKind::UnknownType(e.to_string()), src.position()))?;
        let mut out = StructValue::new();
        while let Some((tag, id, at)) = read_field_header(src)? {
            match st.field(id) {
                Some(f) => {
                    let expected = self.wire_type_at(&f.type_spec, at)?;
                    expect_tag(tag, expected, at).map_err(|e| e.within(PathSegment::Field(id)))?;
                    let v = self.read_value(src, &f.type_spec, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
                    out.insert(id, v);
                }
                None => {
                    debug!(type_name = %st.name, field_id = id, tag = %tag, "skipping unknown field");
                    skip::skip_at_depth(src, tag, &self.options, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
                }
            }
        }
        for f in st.fields.iter().filter(|f| f.is_required()) {
            if !out.contains(f.id) {
                return Err(DecodeError::new(
                    DecodeErrorKind::MissingRequiredField { type_name: st.name.to_string(), id: f.id, name: f.name.clone() },
                    src.position(),
                ));
            }
        }
        Ok(out)
    }

    fn read_union<S: ByteSource>(&self, src: &mut S, name: &str, depth: usize) -> Result<UnionValue, DecodeError> {
        let un = self
            .registry
            .union_spec(name)
            .map_err(|e| DecodeError::new(DecodeErrorKind::UnknownType(e.to_string()), src.position()))?;
        // A repeated id counts once; its last value wins.
        let mut seen: BTreeMap<i16, Value> = BTreeMap::new();
        while let Some((tag, id, at)) = read_field_header(src)? {
            match un.field(id) {
                Some(f) => {
                    let expected = self.wire_type_at(&f.type_spec, at)?;
                    expect_tag(tag, expected, at).map_err(|e| e.within(PathSegment::Field(id)))?;
                    let v = self.read_value(src, &f.type_spec, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
                    seen.insert(id, v);
                }
                None => {
                    debug!(type_name = %un.name, field_id = id, tag = %tag, "skipping unknown field");
                    skip::skip_at_depth(src, tag, &self.options, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
                }
            }
        }
        if seen.len() != 1 {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidUnionArity { type_name: un.name.to_string(), count: seen.len() },
                src.position(),
            ));
        }
        let (id, value) = seen.into_iter().next().ok_or_else(|| {
            DecodeError::new(DecodeErrorKind::InvalidUnionArity { type_name: un.name.to_string(), count: 0 }, src.position())
        })?;
        Ok(UnionValue::new(id, value))
    }

    fn mismatch(spec: &TypeSpec, value: &Value) -> EncodeError {
        EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::WrongVariant {
            expected: spec.to_string(),
            found: value.kind_name(),
        }))
    }

    fn tag_for(&self, spec: &TypeSpec) -> Result<u8, EncodeError> {
        self.wire_type(spec)
            .map(TType::as_u8)
            .map_err(|e| EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::UnknownType(e))))
    }

    fn write_len(out: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
        let n = i32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))?;
        out.write_i32::<BigEndian>(n)?;
        Ok(())
    }

    fn write_value(&self, out: &mut Vec<u8>, spec: &TypeSpec, value: &Value) -> Result<(), EncodeError> {
        let spec = self.registry.canonical(spec).map_err(|e| {
            EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::UnknownType(e.to_string())))
        })?;
        match (spec, value) {
            (TypeSpec::Bool, Value::Bool(b)) => out.write_u8(*b as u8)?,
            (TypeSpec::Byte, Value::Byte(x)) => out.write_i8(*x)?,
            (TypeSpec::I16, Value::I16(x)) => out.write_i16::<BigEndian>(*x)?,
            (TypeSpec::I32, Value::I32(x)) => out.write_i32::<BigEndian>(*x)?,
            (TypeSpec::I64, Value::I64(x)) => out.write_i64::<BigEndian>(*x)?,
            (TypeSpec::Double, Value::Double(x)) => out.write_f64::<BigEndian>(*x)?,
            (TypeSpec::String, Value::String(s)) => {
                Self::write_len(out, s.len())?;
                out.extend_from_slice(s.as_bytes());
            }
            (TypeSpec::Binary, Value::Binary(b)) => {
                Self::write_len(out, b.len())?;
                out.extend_from_slice(b);
            }
            (TypeSpec::List(elem), Value::List(items)) => {
                out.write_u8(self.tag_for(elem)?)?;
                Self::write_len(out, items.len())?;
                for item in items {
                    self.write_value(out, elem, item)?;
                }
            }
            (TypeSpec::Set(elem), Value::Set(items)) => {
                out.write_u8(self.tag_for(elem)?)?;
                Self::write_len(out, items.len())?;
                for item in items {
                    self.write_value(out, elem, item)?;
                }
            }
            (TypeSpec::Map(kspec, vspec), Value::Map(entries)) => {
                out.write_u8(self.tag_for(kspec)?)?;
                out.write_u8(self.tag_for(vspec)?)?;
                Self::write_len(out, entries.len())?;
                for (k, v) in entries {
                    self.write_value(out, kspec, k)?;
                    self.write_value(out, vspec, v)?;
                }
            }
            (TypeSpec::Struct(name), Value::Struct(sv)) => {
                let st = self.registry.struct_spec(name).map_err(|e| {
                    EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::UnknownType(e.to_string())))
                })?;
                for f in &st.fields {
                    if let Some(v) = sv.get(f.id) {
                        out.write_u8(self.tag_for(&f.type_spec)?)?;
                        out.write_i16::<BigEndian>(f.id)?;
                        self.write_value(out, &f.type_spec, v)?;
                    }
                }
                out.write_u8(TType::Stop.as_u8())?;
            }
            (TypeSpec::Union(name), Value::Union(u)) => {
                let un = self.registry.union_spec(name).map_err(|e| {
                    EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::UnknownType(e.to_string())))
                })?;
                let f = un.field(u.id()).ok_or_else(|| {
                    EncodeError::ValueSpecMismatch(ValueError::root(ValueErrorKind::UndeclaredField {
                        type_name: name.to_string(),
                        id: u.id(),
                    }))
                })?;
                out.write_u8(self.tag_for(&f.type_spec)?)?;
                out.write_i16::<BigEndian>(f.id)?;
                self.write_value(out, &f.type_spec, u.value())?;
                out.write_u8(TType::Stop.as_u8())?;
            }
            (TypeSpec::Enum(_), Value::Enum(e)) => out.write_i32::<BigEndian>(e.value)?,
            (spec, value) => return Err(Self::mismatch(spec, value)),
        }
        Ok(())
    }
}

/// Encode with default options.
pub fn encode(registry: &TypeRegistry, value: &Value, spec: &TypeSpec) -> Result<Vec<u8>, EncodeError> {
    Codec::new(registry, CodecOptions::default()).encode(value, spec)
}

/// Decode with default options; all of `bytes` must be consumed.
pub fn decode(registry: &TypeRegistry, bytes: &[u8], spec: &TypeSpec) -> Result<Value, DecodeError> {
    Codec::new(registry, CodecOptions::default()).decode(bytes, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldSpec, NamedType, Requiredness, StructKind, StructSpec};
    use std::sync::Arc;

    fn registry() -> TypeRegistry {
        let mut r = TypeRegistry::default();
        r.insert_type(NamedType::Struct(StructSpec {
            name: Arc::from("t.Node"),
            kind: StructKind::Struct,
            fields: vec![
                FieldSpec::new(1, "value", TypeSpec::I32, Requiredness::Required),
                FieldSpec::new(2, "next", TypeSpec::Struct(Arc::from("t.Node")), Requiredness::Optional),
            ],
        }));
        r
    }

    fn node_chain(len: usize) -> Value {
        let mut v = StructValue::new().with(1, 0i32);
        for i in 1..len {
            v = StructValue::new().with(1, i as i32).with(2, v);
        }
        Value::Struct(v)
    }

    #[test]
    fn bool_decodes_any_nonzero_as_true() {
        let r = TypeRegistry::default();
        assert_eq!(decode(&r, &[0x00], &TypeSpec::Bool).unwrap(), Value::Bool(false));
        assert_eq!(decode(&r, &[0x01], &TypeSpec::Bool).unwrap(), Value::Bool(true));
        assert_eq!(decode(&r, &[0x7f], &TypeSpec::Bool).unwrap(), Value::Bool(true));
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let r = TypeRegistry::default();
        let err = decode(&r, &[0xff, 0xff, 0xff, 0xff], &TypeSpec::String).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::NegativeOrExcessiveLength { length: -1, .. }));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn invalid_utf8_is_rejected_for_string_but_not_binary() {
        let r = TypeRegistry::default();
        let bytes = [0, 0, 0, 2, 0xc3, 0x28];
        assert!(matches!(decode(&r, &bytes, &TypeSpec::String).unwrap_err().kind, DecodeErrorKind::InvalidUtf8));
        assert_eq!(decode(&r, &bytes, &TypeSpec::Binary).unwrap(), Value::Binary(vec![0xc3, 0x28]));
    }

    #[test]
    fn trailing_bytes_fail_decode_but_not_read() {
        let r = TypeRegistry::default();
        let bytes = [0, 7, 0xaa];
        let err = decode(&r, &bytes, &TypeSpec::I16).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::TrailingBytes(1)));
        let codec = Codec::new(&r, CodecOptions::default());
        let mut src = SliceSource::new(&bytes);
        assert_eq!(codec.read(&TypeSpec::I16, &mut src).unwrap(), Value::I16(7));
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn recursive_struct_round_trips() {
        let r = registry();
        let spec = TypeSpec::Struct(Arc::from("t.Node"));
        let v = node_chain(5);
        let bytes = encode(&r, &v, &spec).unwrap();
        assert_eq!(decode(&r, &bytes, &spec).unwrap(), v);
    }

    #[test]
    fn depth_limit_applies_to_both_directions() {
        let r = registry();
        let spec = TypeSpec::Struct(Arc::from("t.Node"));
        let deep = node_chain(10);
        let bytes = encode(&r, &deep, &spec).unwrap();
        let shallow = Codec::new(&r, CodecOptions { max_depth: 4, ..CodecOptions::default() });
        assert!(matches!(shallow.decode(&bytes, &spec).unwrap_err().kind, DecodeErrorKind::DepthLimitExceeded(4)));
        assert!(matches!(shallow.encode(&deep, &spec), Err(EncodeError::ValueSpecMismatch(_))));
    }

    #[test]
    fn write_hands_whole_buffer_to_sink() {
        let r = TypeRegistry::default();
        let codec = Codec::new(&r, CodecOptions::default());
        let mut sink = Vec::new();
        let n = codec.write(&Value::I32(-2), &TypeSpec::I32, &mut sink).unwrap();
        assert_eq!(n, 4);
        assert_eq!(sink, vec![0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn container_count_beyond_input_is_rejected_before_allocating() {
        let r = TypeRegistry::default();
        let bytes = [TType::I64.as_u8(), 0x00, 0x10, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 1];
        let err = decode(&r, &bytes, &TypeSpec::list(TypeSpec::I64)).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::NegativeOrExcessiveLength { length: 0x0010_0000, .. }));
        assert_eq!(err.offset, 1);
    }
}
