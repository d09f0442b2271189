//! Linked schema types: the nodes of the type graph held by the [registry](crate::registry).
//!
//! Primitive and container specs are plain values (structurally comparable; the
//! linker shares one `Arc` per distinct container shape). Structs, unions,
//! exceptions, enums and typedefs are referenced by qualified name and looked
//! up in the registry, so recursive schemas never own themselves.

use crate::protocol::TType;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Fully-qualified definition name: `module.Name`.
pub type TypeName = Arc<str>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    List(Arc<TypeSpec>),
    Set(Arc<TypeSpec>),
    Map(Arc<TypeSpec>, Arc<TypeSpec>),
    /// Struct or exception.
    Struct(TypeName),
    Union(TypeName),
    Enum(TypeName),
    Typedef(TypeName),
}

impl TypeSpec {
    pub fn list(elem: TypeSpec) -> Self {
        TypeSpec::List(Arc::new(elem))
    }

    pub fn set(elem: TypeSpec) -> Self {
        TypeSpec::Set(Arc::new(elem))
    }

    pub fn map(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::Map(Arc::new(key), Arc::new(value))
    }

    /// Wire tag for this spec. `None` for typedefs, which carry the tag of their target.
    pub fn ttype(&self) -> Option<TType> {
        Some(match self {
            TypeSpec::Bool => TType::Bool,
            TypeSpec::Byte => TType::Byte,
            TypeSpec::I16 => TType::I16,
            TypeSpec::I32 | TypeSpec::Enum(_) => TType::I32,
            TypeSpec::I64 => TType::I64,
            TypeSpec::Double => TType::Double,
            TypeSpec::String | TypeSpec::Binary => TType::String,
            TypeSpec::List(_) => TType::List,
            TypeSpec::Set(_) => TType::Set,
            TypeSpec::Map(_, _) => TType::Map,
            TypeSpec::Struct(_) | TypeSpec::Union(_) => TType::Struct,
            TypeSpec::Typedef(_) => return None,
        })
    }

    /// Qualified name for named specs.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeSpec::Struct(n) | TypeSpec::Union(n) | TypeSpec::Enum(n) | TypeSpec::Typedef(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Bool => f.write_str("bool"),
            TypeSpec::Byte => f.write_str("byte"),
            TypeSpec::I16 => f.write_str("i16"),
            TypeSpec::I32 => f.write_str("i32"),
            TypeSpec::I64 => f.write_str("i64"),
            TypeSpec::Double => f.write_str("double"),
            TypeSpec::String => f.write_str("string"),
            TypeSpec::Binary => f.write_str("binary"),
            TypeSpec::List(e) => write!(f, "list<{}>", e),
            TypeSpec::Set(e) => write!(f, "set<{}>", e),
            TypeSpec::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            TypeSpec::Struct(n) | TypeSpec::Union(n) | TypeSpec::Enum(n) | TypeSpec::Typedef(n) => {
                f.write_str(n)
            }
        }
    }
}

pub use crate::ast::Requiredness;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub id: i16,
    pub name: String,
    pub type_spec: TypeSpec,
    pub requiredness: Requiredness,
    /// Linked form of the declared default literal.
    pub default_value: Option<Value>,
}

impl FieldSpec {
    pub fn new(id: i16, name: impl Into<String>, type_spec: TypeSpec, requiredness: Requiredness) -> Self {
        FieldSpec { id, name: name.into(), type_spec, requiredness, default_value: None }
    }

    pub fn is_required(&self) -> bool {
        self.requiredness == Requiredness::Required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Struct,
    Exception,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructSpec {
    pub name: TypeName,
    pub kind: StructKind,
    /// Declaration order; this is also the write order.
    pub fields: Vec<FieldSpec>,
}

impl StructSpec {
    pub fn field(&self, id: i16) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionSpec {
    pub name: TypeName,
    pub fields: Vec<FieldSpec>,
}

impl UnionSpec {
    pub fn field(&self, id: i16) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSpec {
    pub name: TypeName,
    pub members: Vec<EnumMember>,
}

impl EnumSpec {
    /// First member declared with `value` (aliases share a value).
    pub fn member_by_value(&self, value: i32) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.value == value)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefSpec {
    pub name: TypeName,
    pub target: TypeSpec,
}

/// A named entry of the registry arena.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedType {
    Struct(StructSpec),
    Union(UnionSpec),
    Enum(EnumSpec),
    Typedef(TypedefSpec),
}

impl NamedType {
    pub fn name(&self) -> &TypeName {
        match self {
            NamedType::Struct(s) => &s.name,
            NamedType::Union(u) => &u.name,
            NamedType::Enum(e) => &e.name,
            NamedType::Typedef(t) => &t.name,
        }
    }

    /// The spec that refers to this definition.
    pub fn type_spec(&self) -> TypeSpec {
        match self {
            NamedType::Struct(s) => TypeSpec::Struct(s.name.clone()),
            NamedType::Union(u) => TypeSpec::Union(u.name.clone()),
            NamedType::Enum(e) => TypeSpec::Enum(e.name.clone()),
            NamedType::Typedef(t) => TypeSpec::Typedef(t.name.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    pub arguments: Vec<FieldSpec>,
    /// `None` for `void`.
    pub return_type: Option<TypeSpec>,
    /// Declared exceptions, as fields of the result struct.
    pub exceptions: Vec<FieldSpec>,
    pub oneway: bool,
    /// Registry name of the synthetic `<method>_args` struct.
    pub args_struct: TypeName,
    /// Registry name of the synthetic `<method>_result` struct; `None` for oneway.
    pub result_struct: Option<TypeName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: TypeName,
    pub parent: Option<TypeName>,
    pub methods: Vec<MethodSpec>,
}

impl ServiceSpec {
    /// Method declared directly on this service (see [`TypeRegistry::find_method`](crate::registry::TypeRegistry::find_method) for inherited ones).
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstSpec {
    pub name: TypeName,
    pub type_spec: TypeSpec,
    pub value: Value,
}
