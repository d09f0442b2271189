//! # idlwire: Thrift IDL schema linker and binary protocol codec
//!
//! Schema files (parsed with the bundled PEST front end, or built by any other
//! producer of [`ast::SchemaFile`]) are linked into an immutable
//! [`TypeRegistry`]; values of any linked type are then encoded and decoded with
//! the Thrift binary protocol.
//!
//! ```text
//! IDL text --parser--> SchemaFile --link--> TypeRegistry --Codec(TypeSpec, Value)--> bytes
//! ```
//!
//! ## Layers
//!
//! - [`parser`]: `.thrift` source to AST.
//! - [`linker`]: resolves names across files and includes, checks the schema, links constants.
//! - [`registry`]: read API over linked types, services and constants.
//! - [`value`]: dynamic values, their total order and validation.
//! - [`codec`], [`skip`], [`protocol`]: the binary protocol.
//! - [`message`]: call/reply envelope for service methods.
//! - [`dump`]: human-readable rendering of values.
//!
//! ## Example
//!
//! ```
//! use idlwire::{decode, encode, link, parse, StructValue, Value};
//!
//! let file = parse(
//!     "struct Point { 1: required i32 x; 2: required i32 y; 3: optional string label }",
//!     "geo.thrift",
//! )
//! .unwrap();
//! let registry = link(vec![file]).unwrap();
//! let point = registry.resolve("geo.Point").unwrap();
//!
//! let value = Value::Struct(StructValue::new().with(1, 3i32).with(2, -4i32));
//! let bytes = encode(&registry, &value, &point).unwrap();
//! assert_eq!(decode(&registry, &bytes, &point).unwrap(), value);
//! ```

pub mod ast;
pub mod codec;
pub mod dump;
pub mod linker;
pub mod message;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod skip;
pub mod types;
pub mod value;

pub use ast::SchemaFile;
pub use codec::{decode, encode, Codec, CodecOptions, DecodeError, DecodeErrorKind, EncodeError};
pub use linker::{link, SchemaError};
pub use parser::{parse, ParseError};
pub use protocol::{ByteSource, SliceSource, StreamSource, TType};
pub use registry::{RegistryError, TypeRegistry};
pub use types::{FieldSpec, Requiredness, TypeName, TypeSpec};
pub use value::{validate, EnumValue, FieldPath, StructValue, UnionValue, Value, ValueError, ValueErrorKind};
