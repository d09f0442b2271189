//! Format decoded values for display, with field and enum member names from the registry.
//!
//! Rendering never fails: where the value does not fit the spec (or the spec is
//! unknown) the raw value is printed instead.

use crate::registry::TypeRegistry;
use crate::types::{FieldSpec, TypeSpec};
use crate::value::Value;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

fn short_name(qualified: &str) -> &str {
    qualified.rsplit_once('.').map(|(_, n)| n).unwrap_or(qualified)
}

/// One-line rendering: `Name {field: value, ...}`, enum members by name,
/// strings quoted, binary as hex.
pub fn format_value(registry: &TypeRegistry, spec: &TypeSpec, value: &Value) -> String {
    let spec = registry.canonical(spec).ok();
    match (spec, value) {
        (_, Value::Bool(x)) => x.to_string(),
        (_, Value::Byte(x)) => x.to_string(),
        (_, Value::I16(x)) => x.to_string(),
        (_, Value::I32(x)) => x.to_string(),
        (_, Value::I64(x)) => x.to_string(),
        (_, Value::Double(x)) => format!("{:?}", x),
        (_, Value::String(s)) => format!("{:?}", s),
        (_, Value::Binary(b)) => format!("hex({})", hex_string(b)),
        (Some(TypeSpec::List(elem)), Value::List(items)) => {
            let parts: Vec<String> = items.iter().map(|v| format_value(registry, elem, v)).collect();
            format!("[{}]", parts.join(", "))
        }
        (Some(TypeSpec::Set(elem)), Value::Set(items)) => {
            let parts: Vec<String> = items.iter().map(|v| format_value(registry, elem, v)).collect();
            format!("{{{}}}", parts.join(", "))
        }
        (Some(TypeSpec::Map(k, v)), Value::Map(entries)) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(key, val)| format!("{}: {}", format_value(registry, k, key), format_value(registry, v, val)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        (Some(TypeSpec::Struct(name)), Value::Struct(s)) => {
            let fields = registry.struct_spec(name).map(|st| st.fields.as_slice()).unwrap_or(&[]);
            let parts: Vec<String> = s.iter().map(|(id, v)| format_field(registry, fields, id, v)).collect();
            format!("{} {{{}}}", short_name(name), parts.join(", "))
        }
        (Some(TypeSpec::Union(name)), Value::Union(u)) => {
            let fields = registry.union_spec(name).map(|un| un.fields.as_slice()).unwrap_or(&[]);
            format!("{} {{{}}}", short_name(name), format_field(registry, fields, u.id(), u.value()))
        }
        (Some(TypeSpec::Enum(name)), Value::Enum(e)) => {
            let member = e.name.clone().or_else(|| {
                registry.enum_spec(name).ok().and_then(|es| es.member_by_value(e.value)).map(|m| m.name.clone())
            });
            match member {
                Some(m) => m,
                None => e.value.to_string(),
            }
        }
        (_, other) => format!("{:?}", other),
    }
}

fn format_field(registry: &TypeRegistry, fields: &[FieldSpec], id: i16, v: &Value) -> String {
    match fields.iter().find(|f| f.id == id) {
        Some(f) => format!("{}: {}", f.name, format_value(registry, &f.type_spec, v)),
        None => format!("#{}: {:?}", id, v),
    }
}

/// Multi-line rendering: one struct field or container element per line.
pub fn value_to_dump(registry: &TypeRegistry, spec: &TypeSpec, value: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let canonical = registry.canonical(spec).ok();
    match (canonical, value) {
        (Some(TypeSpec::Struct(name)), Value::Struct(s)) => {
            let fields = registry.struct_spec(name).map(|st| st.fields.as_slice()).unwrap_or(&[]);
            let mut lines = vec![format!("{}{} {{", pad, short_name(name))];
            for (id, v) in s.iter() {
                lines.push(dump_field(registry, fields, id, v, indent + 1));
            }
            lines.push(format!("{}}}", pad));
            lines.join("\n")
        }
        (Some(TypeSpec::Union(name)), Value::Union(u)) => {
            let fields = registry.union_spec(name).map(|un| un.fields.as_slice()).unwrap_or(&[]);
            [
                format!("{}{} {{", pad, short_name(name)),
                dump_field(registry, fields, u.id(), u.value(), indent + 1),
                format!("{}}}", pad),
            ]
            .join("\n")
        }
        (Some(TypeSpec::List(elem)), Value::List(items)) if !items.is_empty() => {
            let mut lines = vec![format!("{}[", pad)];
            for (i, item) in items.iter().enumerate() {
                let sub = value_to_dump(registry, elem, item, indent + 1);
                lines.push(format!("{}  [{}] {}", pad, i, sub.trim_start()));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
        _ => format!("{}{}", pad, format_value(registry, spec, value)),
    }
}

fn dump_field(registry: &TypeRegistry, fields: &[FieldSpec], id: i16, v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match fields.iter().find(|f| f.id == id) {
        Some(f) => {
            let sub = value_to_dump(registry, &f.type_spec, v, indent);
            format!("{}{}: {}", pad, f.name, sub.trim_start())
        }
        None => format!("{}#{}: {:?}", pad, id, v),
    }
}

/// First line of [`value_to_dump`].
pub fn value_summary_line(registry: &TypeRegistry, spec: &TypeSpec, value: &Value) -> String {
    let full = value_to_dump(registry, spec, value, 0);
    full.lines().next().map(|s| s.trim().to_string()).unwrap_or_default()
}
