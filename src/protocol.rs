//! Binary protocol primitives: wire type tags and the byte cursors the codec reads from.
//!
//! All multi-byte integers are big-endian. Sources report their position so
//! errors can name a byte offset, and (when known) how many bytes remain so
//! length prefixes can be checked before anything is allocated.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read};

/// Wire type tag preceding a field or describing container elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    pub fn from_u8(tag: u8) -> Option<TType> {
        Some(match tag {
            0 => TType::Stop,
            2 => TType::Bool,
            3 => TType::Byte,
            4 => TType::Double,
            6 => TType::I16,
            8 => TType::I32,
            10 => TType::I64,
            11 => TType::String,
            12 => TType::Struct,
            13 => TType::Map,
            14 => TType::Set,
            15 => TType::List,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Fewest bytes one value of this type can occupy on the wire.
    /// Used to reject container counts the remaining input cannot hold.
    pub fn min_wire_size(self) -> usize {
        match self {
            TType::Stop => 0,
            TType::Bool | TType::Byte => 1,
            TType::I16 => 2,
            TType::I32 => 4,
            TType::I64 | TType::Double => 8,
            TType::String => 4,
            TType::Struct => 1,
            TType::Map => 6,
            TType::Set | TType::List => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TType::Stop => "stop",
            TType::Bool => "bool",
            TType::Byte => "byte",
            TType::Double => "double",
            TType::I16 => "i16",
            TType::I32 => "i32",
            TType::I64 => "i64",
            TType::String => "string",
            TType::Struct => "struct",
            TType::Map => "map",
            TType::Set => "set",
            TType::List => "list",
        }
    }
}

impl std::fmt::Display for TType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

/// Byte cursor the decoder reads from.
pub trait ByteSource {
    /// Bytes consumed so far.
    fn position(&self) -> usize;

    /// Bytes left, when the source knows it (in-memory buffers do, streams do not).
    fn remaining(&self) -> Option<usize>;

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Advance `n` bytes without keeping them.
    fn skip(&mut self, n: usize) -> io::Result<()> {
        let mut scratch = [0u8; 512];
        let mut left = n;
        while left > 0 {
            let k = left.min(scratch.len());
            self.read_exact(&mut scratch[..k])?;
            left -= k;
        }
        Ok(())
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_i8(&mut self) -> io::Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    fn read_i16(&mut self) -> io::Result<i16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_i16(&b))
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_i32(&b))
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_i64(&b))
    }

    fn read_f64(&mut self) -> io::Result<f64> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(BigEndian::read_f64(&b))
    }
}

/// Zero-copy cursor over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data, pos: 0 }
    }

    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.data.len() - self.pos)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn skip(&mut self, n: usize) -> io::Result<()> {
        if n > self.data.len() - self.pos {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        self.pos += n;
        Ok(())
    }
}

/// Cursor over any [`Read`]; the remaining length is unknown, so only the
/// configured limits bound allocations.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    pos: usize,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        StreamSource { inner, pos: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> Option<usize> {
        None
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len();
        Ok(())
    }
}
