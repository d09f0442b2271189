//! Skip encoded values by wire tag, without a schema and without building [`Value`](crate::value::Value)s.
//!
//! This is what the decoder uses for unknown fields, and what callers use to
//! measure or step over values they do not want to decode. Only length
//! prefixes, counts and nested field headers are read; everything else is
//! skipped in place.

use crate::codec::{read_count, read_field_header, read_length, read_tag, CodecOptions, DecodeError, DecodeErrorKind};
use crate::protocol::{ByteSource, SliceSource, TType};
use crate::value::PathSegment;

/// Advance `source` past one value encoded with wire type `tag`.
pub fn skip_value<S: ByteSource>(source: &mut S, tag: TType, options: &CodecOptions) -> Result<(), DecodeError> {
    skip_at_depth(source, tag, options, 0)
}

/// Byte length of the value of type `tag` at the start of `bytes`.
///
/// ```
/// use idlwire::protocol::TType;
/// use idlwire::skip::value_extent;
///
/// // list<i16> [1, 2] followed by an unrelated byte
/// let bytes = [6, 0, 0, 0, 2, 0, 1, 0, 2, 0xff];
/// assert_eq!(value_extent(&bytes, TType::List).unwrap(), 9);
/// ```
pub fn value_extent(bytes: &[u8], tag: TType) -> Result<usize, DecodeError> {
    let mut src = SliceSource::new(bytes);
    skip_value(&mut src, tag, &CodecOptions::default())?;
    Ok(src.position())
}

pub(crate) fn skip_at_depth<S: ByteSource>(
    src: &mut S,
    tag: TType,
    options: &CodecOptions,
    depth: usize,
) -> Result<(), DecodeError> {
    let at = src.position();
    if depth > options.max_depth {
        return Err(DecodeError::new(DecodeErrorKind::DepthLimitExceeded(options.max_depth), at));
    }
    match tag {
        TType::Stop => Err(DecodeError::new(DecodeErrorKind::InvalidTypeTag(TType::Stop.as_u8()), at)),
        TType::Bool | TType::Byte => fixed(src, 1),
        TType::I16 => fixed(src, 2),
        TType::I32 => fixed(src, 4),
        TType::I64 | TType::Double => fixed(src, 8),
        TType::String => {
            let n = read_length(src, options)?;
            fixed(src, n)
        }
        TType::Struct => {
            while let Some((field_tag, id, _)) = read_field_header(src)? {
                skip_at_depth(src, field_tag, options, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
            }
            Ok(())
        }
        TType::Map => {
            let key = read_tag(src)?;
            let value = read_tag(src)?;
            let count = read_count(src, options, key.min_wire_size() + value.min_wire_size())?;
            for i in 0..count {
                skip_at_depth(src, key, options, depth + 1).map_err(|e| e.within(PathSegment::Key(i)))?;
                skip_at_depth(src, value, options, depth + 1).map_err(|e| e.within(PathSegment::MapValue(i)))?;
            }
            Ok(())
        }
        TType::Set | TType::List => {
            let elem = read_tag(src)?;
            let count = read_count(src, options, elem.min_wire_size())?;
            for i in 0..count {
                skip_at_depth(src, elem, options, depth + 1).map_err(|e| e.within(PathSegment::Index(i)))?;
            }
            Ok(())
        }
    }
}

fn fixed<S: ByteSource>(src: &mut S, n: usize) -> Result<(), DecodeError> {
    let at = src.position();
    src.skip(n).map_err(|e| DecodeError::io(e, at))
}
