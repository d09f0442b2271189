//! Runtime values for encoding/decoding (codec representation).
//!
//! `Value` mirrors [`TypeSpec`]: one variant per kind. Every value has a total
//! order (kind first, then content; doubles by IEEE total order), which is what
//! sets and maps iterate by and therefore the order their elements hit the wire.

use crate::registry::TypeRegistry;
use crate::types::{Requiredness, TypeSpec};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Nesting bound used by [`validate`] when no codec options are involved.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A single schema-typed value.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    Struct(StructValue),
    Union(UnionValue),
    Enum(EnumValue),
}

/// Struct (or exception) instance: field id -> value. Absent ids are unset fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StructValue {
    fields: BTreeMap<i16, Value>,
}

/// Union instance. Holding exactly one field is guaranteed by construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnionValue {
    id: i16,
    value: Box<Value>,
}

/// Enum instance: the raw integer, tagged with the member name when one matches.
/// Integers with no matching member are kept as-is (`name == None`).
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub value: i32,
    pub name: Option<String>,
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Byte(_) => 1,
            Value::I16(_) => 2,
            Value::I32(_) => 3,
            Value::I64(_) => 4,
            Value::Double(_) => 5,
            Value::String(_) => 6,
            Value::Binary(_) => 7,
            Value::List(_) => 8,
            Value::Set(_) => 9,
            Value::Map(_) => 10,
            Value::Struct(_) => 11,
            Value::Union(_) => 12,
            Value::Enum(_) => 13,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Union(_) => "union",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer kind (including enums) widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::Enum(e) => Some(e.value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&UnionValue> {
        match self {
            Value::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Build a struct value for `spec`, filling declared defaults for absent
    /// non-optional fields, then validating the result.
    pub fn new_struct(
        registry: &TypeRegistry,
        spec: &TypeSpec,
        fields: impl IntoIterator<Item = (i16, Value)>,
    ) -> Result<Value, ValueError> {
        let canonical = registry.canonical(spec).map_err(|e| ValueError::root(ValueErrorKind::UnknownType(e.to_string())))?;
        let name = match canonical {
            TypeSpec::Struct(name) => name,
            other => {
                return Err(ValueError::root(ValueErrorKind::WrongVariant {
                    expected: other.to_string(),
                    found: "struct",
                }))
            }
        };
        let struct_spec = registry
            .struct_spec(name)
            .map_err(|e| ValueError::root(ValueErrorKind::UnknownType(e.to_string())))?;
        let mut value: StructValue = fields.into_iter().collect();
        for f in &struct_spec.fields {
            if f.requiredness == Requiredness::Optional || value.contains(f.id) {
                continue;
            }
            if let Some(default) = &f.default_value {
                value.insert(f.id, default.clone());
            }
        }
        let value = Value::Struct(value);
        validate(registry, spec, &value)?;
        Ok(value)
    }

    /// Build a union value for `spec`; exactly one field must be given.
    pub fn new_union(
        registry: &TypeRegistry,
        spec: &TypeSpec,
        fields: impl IntoIterator<Item = (i16, Value)>,
    ) -> Result<Value, ValueError> {
        let union = UnionValue::from_fields(spec.name().unwrap_or("union"), fields)?;
        let value = Value::Union(union);
        validate(registry, spec, &value)?;
        Ok(value)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Byte(a), Value::Byte(b)) => a.cmp(b),
            (Value::I16(a), Value::I16(b)) => a.cmp(b),
            (Value::I32(a), Value::I32(b)) => a.cmp(b),
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            (Value::Union(a), Value::Union(b)) => a.cmp(b),
            (Value::Enum(a), Value::Enum(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl From<UnionValue> for Value {
    fn from(v: UnionValue) -> Self {
        Value::Union(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

impl StructValue {
    pub fn new() -> Self {
        StructValue::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, id: i16, value: impl Into<Value>) -> Self {
        self.fields.insert(id, value.into());
        self
    }

    pub fn insert(&mut self, id: i16, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(id, value.into())
    }

    pub fn remove(&mut self, id: i16) -> Option<Value> {
        self.fields.remove(&id)
    }

    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.get(&id)
    }

    pub fn contains(&self, id: i16) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (i16, &Value)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }
}

impl FromIterator<(i16, Value)> for StructValue {
    fn from_iter<T: IntoIterator<Item = (i16, Value)>>(iter: T) -> Self {
        StructValue { fields: iter.into_iter().collect() }
    }
}

impl UnionValue {
    pub fn new(id: i16, value: impl Into<Value>) -> Self {
        UnionValue { id, value: Box::new(value.into()) }
    }

    /// Rejects anything but exactly one field.
    pub fn from_fields(
        type_name: &str,
        fields: impl IntoIterator<Item = (i16, Value)>,
    ) -> Result<UnionValue, ValueError> {
        let mut it = fields.into_iter();
        match (it.next(), it.next()) {
            (Some((id, value)), None) => Ok(UnionValue::new(id, value)),
            (first, second) => {
                let count = first.is_some() as usize + second.is_some() as usize + it.count();
                Err(ValueError::root(ValueErrorKind::UnionArity { type_name: type_name.to_string(), count }))
            }
        }
    }

    pub fn id(&self) -> i16 {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (i16, Value) {
        (self.id, *self.value)
    }
}

impl EnumValue {
    /// Untagged integer.
    pub fn raw(value: i32) -> Self {
        EnumValue { value, name: None }
    }

    /// Integer tagged with the first member of `spec` carrying it, if any.
    pub fn new(registry: &TypeRegistry, spec: &TypeSpec, value: i32) -> Result<Self, ValueError> {
        let enum_spec = enum_spec_for(registry, spec)?;
        Ok(EnumValue { value, name: enum_spec.member_by_value(value).map(|m| m.name.clone()) })
    }

    /// Value of the member called `member`.
    pub fn named(registry: &TypeRegistry, spec: &TypeSpec, member: &str) -> Result<Self, ValueError> {
        let enum_spec = enum_spec_for(registry, spec)?;
        let m = enum_spec.member_by_name(member).ok_or_else(|| {
            ValueError::root(ValueErrorKind::UnknownEnumMember {
                type_name: enum_spec.name.to_string(),
                member: member.to_string(),
            })
        })?;
        Ok(EnumValue { value: m.value, name: Some(m.name.clone()) })
    }
}

fn enum_spec_for<'r>(registry: &'r TypeRegistry, spec: &TypeSpec) -> Result<&'r crate::types::EnumSpec, ValueError> {
    let canonical = registry.canonical(spec).map_err(|e| ValueError::root(ValueErrorKind::UnknownType(e.to_string())))?;
    match canonical {
        TypeSpec::Enum(name) => registry
            .enum_spec(name)
            .map_err(|e| ValueError::root(ValueErrorKind::UnknownType(e.to_string()))),
        other => Err(ValueError::root(ValueErrorKind::WrongVariant { expected: other.to_string(), found: "enum" })),
    }
}

// The member name is a label; identity is the integer.
impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for EnumValue {}

impl PartialOrd for EnumValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EnumValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

/// One step from a value to a nested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    Field(i16),
    Index(usize),
    Key(usize),
    MapValue(usize),
}

/// Location of a nested value: field ids and element positions from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn root() -> Self {
        FieldPath(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix with an outer step (errors gain context as they propagate outwards).
    pub fn prepend(&mut self, seg: PathSegment) {
        self.0.insert(0, seg);
    }

    /// Field ids only, outermost first.
    pub fn field_ids(&self) -> Vec<i16> {
        self.0
            .iter()
            .filter_map(|s| match s {
                PathSegment::Field(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for seg in &self.0 {
            match seg {
                PathSegment::Field(id) => write!(f, ".{}", id)?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
                PathSegment::Key(i) => write!(f, "[{}].key", i)?,
                PathSegment::MapValue(i) => write!(f, "[{}].value", i)?,
            }
        }
        Ok(())
    }
}

/// A value does not fit its spec.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at {path}")]
pub struct ValueError {
    pub kind: ValueErrorKind,
    pub path: FieldPath,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueErrorKind {
    #[error("expected {expected}, found {found}")]
    WrongVariant { expected: String, found: &'static str },
    #[error("missing required field {id} ({name}) of {type_name}")]
    MissingRequiredField { type_name: String, id: i16, name: String },
    #[error("field {id} is not declared by {type_name}")]
    UndeclaredField { type_name: String, id: i16 },
    #[error("union {type_name} must hold exactly one field, found {count}")]
    UnionArity { type_name: String, count: usize },
    #[error("enum {type_name} has no member {member}")]
    UnknownEnumMember { type_name: String, member: String },
    #[error("enum value {value} is tagged {member}, which is not a member of {type_name} with that value")]
    EnumNameMismatch { type_name: String, member: String, value: i32 },
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

impl ValueError {
    pub fn root(kind: ValueErrorKind) -> Self {
        ValueError { kind, path: FieldPath::root() }
    }

    fn within(mut self, seg: PathSegment) -> Self {
        self.path.prepend(seg);
        self
    }
}

/// Check `value` against `spec` (recursively).
pub fn validate(registry: &TypeRegistry, spec: &TypeSpec, value: &Value) -> Result<(), ValueError> {
    Validator::new(registry, DEFAULT_MAX_DEPTH).check(spec, value, 0)
}

pub(crate) struct Validator<'r> {
    registry: &'r TypeRegistry,
    max_depth: usize,
}

impl<'r> Validator<'r> {
    pub(crate) fn new(registry: &'r TypeRegistry, max_depth: usize) -> Self {
        Validator { registry, max_depth }
    }

    fn unknown(&self, e: impl fmt::Display) -> ValueError {
        ValueError::root(ValueErrorKind::UnknownType(e.to_string()))
    }

    pub(crate) fn check(&self, spec: &TypeSpec, value: &Value, depth: usize) -> Result<(), ValueError> {
        if depth > self.max_depth {
            return Err(ValueError::root(ValueErrorKind::TooDeep(self.max_depth)));
        }
        let spec = self.registry.canonical(spec).map_err(|e| self.unknown(e))?;
        let mismatch = || ValueError::root(ValueErrorKind::WrongVariant { expected: spec.to_string(), found: value.kind_name() });
        match (spec, value) {
            (TypeSpec::Bool, Value::Bool(_))
            | (TypeSpec::Byte, Value::Byte(_))
            | (TypeSpec::I16, Value::I16(_))
            | (TypeSpec::I32, Value::I32(_))
            | (TypeSpec::I64, Value::I64(_))
            | (TypeSpec::Double, Value::Double(_))
            | (TypeSpec::String, Value::String(_))
            | (TypeSpec::Binary, Value::Binary(_)) => Ok(()),
            (TypeSpec::List(elem), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.check(elem, item, depth + 1).map_err(|e| e.within(PathSegment::Index(i)))?;
                }
                Ok(())
            }
            (TypeSpec::Set(elem), Value::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.check(elem, item, depth + 1).map_err(|e| e.within(PathSegment::Index(i)))?;
                }
                Ok(())
            }
            (TypeSpec::Map(kspec, vspec), Value::Map(entries)) => {
                for (i, (k, v)) in entries.iter().enumerate() {
                    self.check(kspec, k, depth + 1).map_err(|e| e.within(PathSegment::Key(i)))?;
                    self.check(vspec, v, depth + 1).map_err(|e| e.within(PathSegment::MapValue(i)))?;
                }
                Ok(())
            }
            (TypeSpec::Struct(name), Value::Struct(s)) => {
                let st = self.registry.struct_spec(name).map_err(|e| self.unknown(e))?;
                for f in &st.fields {
                    if f.is_required() && !s.contains(f.id) {
                        return Err(ValueError::root(ValueErrorKind::MissingRequiredField {
                            type_name: name.to_string(),
                            id: f.id,
                            name: f.name.clone(),
                        }));
                    }
                }
                for (id, v) in s.iter() {
                    let f = st.field(id).ok_or_else(|| {
                        ValueError::root(ValueErrorKind::UndeclaredField { type_name: name.to_string(), id })
                    })?;
                    self.check(&f.type_spec, v, depth + 1).map_err(|e| e.within(PathSegment::Field(id)))?;
                }
                Ok(())
            }
            (TypeSpec::Union(name), Value::Union(u)) => {
                let un = self.registry.union_spec(name).map_err(|e| self.unknown(e))?;
                let f = un.field(u.id()).ok_or_else(|| {
                    ValueError::root(ValueErrorKind::UndeclaredField { type_name: name.to_string(), id: u.id() })
                })?;
                self.check(&f.type_spec, u.value(), depth + 1).map_err(|e| e.within(PathSegment::Field(u.id())))
            }
            (TypeSpec::Enum(name), Value::Enum(e)) => {
                let en = self.registry.enum_spec(name).map_err(|err| self.unknown(err))?;
                if let Some(member) = &e.name {
                    match en.member_by_name(member) {
                        Some(m) if m.value == e.value => {}
                        Some(_) => {
                            return Err(ValueError::root(ValueErrorKind::EnumNameMismatch {
                                type_name: name.to_string(),
                                member: member.clone(),
                                value: e.value,
                            }))
                        }
                        None => {
                            return Err(ValueError::root(ValueErrorKind::UnknownEnumMember {
                                type_name: name.to_string(),
                                member: member.clone(),
                            }))
                        }
                    }
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_order_totally() {
        let mut set = BTreeSet::new();
        set.insert(Value::Double(f64::NAN));
        set.insert(Value::Double(1.5));
        set.insert(Value::Double(-0.0));
        set.insert(Value::Double(f64::NAN));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().next(), Some(&Value::Double(-0.0)));
    }

    #[test]
    fn accessors_match_only_their_kind() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::I32(1).as_bool(), None);
        assert_eq!(Value::Double(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::I64(2).as_f64(), None);
        let list = Value::List(vec![Value::I16(1), Value::I16(2)]);
        assert_eq!(list.as_list().map(|l| l.len()), Some(2));
        assert!(Value::Set(BTreeSet::new()).as_list().is_none());
        let u = Value::Union(UnionValue::new(3, "x"));
        assert_eq!(u.as_union().map(|u| u.id()), Some(3));
        assert!(list.as_union().is_none());
    }

    #[test]
    fn union_into_parts() {
        let (id, value) = UnionValue::new(2, 7i64).into_parts();
        assert_eq!(id, 2);
        assert_eq!(value, Value::I64(7));
    }

    #[test]
    fn paths_grow_outwards() {
        let mut path = FieldPath::root();
        assert!(path.is_root());
        path.prepend(PathSegment::Index(4));
        path.prepend(PathSegment::Field(2));
        assert!(!path.is_root());
        assert_eq!(path.segments(), &[PathSegment::Field(2), PathSegment::Index(4)]);
        assert_eq!(path.field_ids(), vec![2]);
    }

    #[test]
    fn kinds_order_before_content() {
        assert!(Value::Bool(true) < Value::Byte(-128));
        assert!(Value::I64(i64::MAX) < Value::String(String::new()));
        assert!(Value::String("a".into()) < Value::String("b".into()));
    }

    #[test]
    fn enum_identity_is_the_integer() {
        let tagged = EnumValue { value: 1, name: Some("B".into()) };
        assert_eq!(Value::Enum(tagged), Value::Enum(EnumValue::raw(1)));
        assert_ne!(Value::Enum(EnumValue::raw(1)), Value::Enum(EnumValue::raw(2)));
    }

    #[test]
    fn union_from_fields_counts() {
        assert!(UnionValue::from_fields("U", vec![(1, Value::I32(1))]).is_ok());
        let err = UnionValue::from_fields("U", vec![]).unwrap_err();
        assert_eq!(err.kind, ValueErrorKind::UnionArity { type_name: "U".into(), count: 0 });
        let err = UnionValue::from_fields("U", vec![(1, Value::I32(1)), (2, Value::I32(2)), (3, Value::Bool(true))])
            .unwrap_err();
        assert_eq!(err.kind, ValueErrorKind::UnionArity { type_name: "U".into(), count: 3 });
    }

    #[test]
    fn field_path_display() {
        let mut p = FieldPath::root();
        assert_eq!(p.to_string(), "<root>");
        p.prepend(PathSegment::Field(2));
        p.prepend(PathSegment::Index(3));
        p.prepend(PathSegment::Field(1));
        assert_eq!(p.to_string(), ".1[3].2");
        assert_eq!(p.field_ids(), vec![1, 2]);
    }
}
