//! Parse Thrift IDL source into an AST [`SchemaFile`] using PEST.
//!
//! This is a front end only: include paths are kept exactly as written and
//! matched by the [linker](crate::linker) against other files' paths, so callers
//! loading from disk should normalize both the same way.

use crate::ast::*;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct ThriftParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}:{line}:{column}: {message}")]
pub struct ParseError {
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn at(path: &str, span: Span, message: impl Into<String>) -> Self {
        ParseError { path: path.to_string(), line: span.line, column: span.column, message: message.into() }
    }

    fn from_pest(path: &str, e: pest::error::Error<Rule>) -> Self {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos(p) => p,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        ParseError { path: path.to_string(), line, column, message: e.variant.message().to_string() }
    }
}

/// Parse one file. `path` becomes [`SchemaFile::path`] and determines the module name.
pub fn parse(source: &str, path: &str) -> Result<SchemaFile, ParseError> {
    let mut pairs = ThriftParser::parse(Rule::document, source).map_err(|e| ParseError::from_pest(path, e))?;
    let doc = pairs.next().ok_or_else(|| ParseError::at(path, Span::default(), "empty parse"))?;
    let b = Builder { path };
    let mut file = SchemaFile::new(path);
    for item in doc.into_inner() {
        let span = span_of(&item);
        match item.as_rule() {
            Rule::include => {
                let lit = b.child(item, Rule::literal)?;
                file.includes.push(Include { path: unquote(lit.as_str()), span });
            }
            Rule::namespace => {
                let mut scope = String::new();
                let mut name = String::new();
                for p in item.into_inner() {
                    match p.as_rule() {
                        Rule::namespace_scope => scope = p.as_str().to_string(),
                        Rule::identifier => name = p.as_str().to_string(),
                        _ => {}
                    }
                }
                file.namespaces.push(Namespace { scope, name });
            }
            Rule::const_def => file.definitions.push(Definition::Const(b.const_def(item)?)),
            Rule::typedef_def => file.definitions.push(Definition::Typedef(b.typedef_def(item)?)),
            Rule::enum_def => file.definitions.push(Definition::Enum(b.enum_def(item)?)),
            Rule::struct_def => file.definitions.push(Definition::Struct(b.struct_def(item)?)),
            Rule::union_def => file.definitions.push(Definition::Union(b.struct_def(item)?)),
            Rule::exception_def => file.definitions.push(Definition::Exception(b.struct_def(item)?)),
            Rule::service_def => file.definitions.push(Definition::Service(b.service_def(item)?)),
            _ => {}
        }
    }
    Ok(file)
}

fn span_of(pair: &Pair<'_>) -> Span {
    let (line, column) = pair.as_span().start_pos().line_col();
    Span::new(line, column)
}

/// Strip quotes and resolve backslash escapes.
fn unquote(raw: &str) -> String {
    let inner = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

struct Builder<'p> {
    path: &'p str,
}

impl Builder<'_> {
    fn err(&self, pair: &Pair<'_>, message: impl Into<String>) -> ParseError {
        ParseError::at(self.path, span_of(pair), message)
    }

    fn child<'i>(&self, pair: Pair<'i>, rule: Rule) -> Result<Pair<'i>, ParseError> {
        let err = self.err(&pair, format!("expected {:?}", rule));
        pair.into_inner().find(|p| p.as_rule() == rule).ok_or(err)
    }

    fn const_def(&self, pair: Pair<'_>) -> Result<ConstDef, ParseError> {
        let span = span_of(&pair);
        let err = self.err(&pair, "incomplete const definition");
        let (mut type_ref, mut name, mut value) = (None, None, None);
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::field_type => type_ref = Some(self.field_type(p)?),
                Rule::decl_name => name = Some(p.as_str().to_string()),
                Rule::const_value => value = Some(self.const_value(p)?),
                _ => {}
            }
        }
        match (type_ref, name, value) {
            (Some(type_ref), Some(name), Some(value)) => Ok(ConstDef { name, type_ref, value, span }),
            _ => Err(err),
        }
    }

    fn typedef_def(&self, pair: Pair<'_>) -> Result<TypedefDef, ParseError> {
        let span = span_of(&pair);
        let err = self.err(&pair, "incomplete typedef");
        let (mut target, mut name, mut annotations) = (None, None, Vec::new());
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::field_type => target = Some(self.field_type(p)?),
                Rule::decl_name => name = Some(p.as_str().to_string()),
                Rule::annotations => annotations = self.annotations(p),
                _ => {}
            }
        }
        match (target, name) {
            (Some(target), Some(name)) => Ok(TypedefDef { name, target, annotations, span }),
            _ => Err(err),
        }
    }

    fn enum_def(&self, pair: Pair<'_>) -> Result<EnumDef, ParseError> {
        let span = span_of(&pair);
        let (mut name, mut members, mut annotations) = (String::new(), Vec::new(), Vec::new());
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::decl_name => name = p.as_str().to_string(),
                Rule::enum_member => {
                    let mspan = span_of(&p);
                    let mut member = EnumMemberDef { name: String::new(), value: None, span: mspan };
                    for q in p.into_inner() {
                        match q.as_rule() {
                            Rule::decl_name => member.name = q.as_str().to_string(),
                            Rule::int_constant => {
                                let v = parse_int(q.as_str()).ok_or_else(|| self.err(&q, "integer out of range"))?;
                                member.value = Some(v);
                            }
                            _ => {}
                        }
                    }
                    members.push(member);
                }
                Rule::annotations => annotations = self.annotations(p),
                _ => {}
            }
        }
        Ok(EnumDef { name, members, annotations, span })
    }

    fn struct_def(&self, pair: Pair<'_>) -> Result<StructDef, ParseError> {
        let span = span_of(&pair);
        let (mut name, mut annotations) = (String::new(), Vec::new());
        let mut fields = Vec::new();
        let mut implicit_id = -1;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::decl_name => name = p.as_str().to_string(),
                Rule::field => fields.push(self.field(p, &mut implicit_id)?),
                Rule::annotations => annotations = self.annotations(p),
                _ => {}
            }
        }
        Ok(StructDef { name, fields, annotations, span })
    }

    fn service_def(&self, pair: Pair<'_>) -> Result<ServiceDef, ParseError> {
        let span = span_of(&pair);
        let mut name = String::new();
        let mut extends = None;
        let mut functions = Vec::new();
        let mut annotations = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::identifier => extends = Some(p.as_str().to_string()),
                Rule::decl_name => name = p.as_str().to_string(),
                Rule::function => functions.push(self.function(p)?),
                Rule::annotations => annotations = self.annotations(p),
                _ => {}
            }
        }
        Ok(ServiceDef { name, extends, functions, annotations, span })
    }

    fn function(&self, pair: Pair<'_>) -> Result<FunctionDef, ParseError> {
        let span = span_of(&pair);
        let mut f = FunctionDef {
            name: String::new(),
            oneway: false,
            return_type: None,
            arguments: Vec::new(),
            throws: Vec::new(),
            annotations: Vec::new(),
            span,
        };
        let mut implicit_id = -1;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::oneway => f.oneway = true,
                Rule::function_type => {
                    let inner = self.child(p, Rule::field_type);
                    f.return_type = match inner {
                        Ok(t) => Some(self.field_type(t)?),
                        Err(_) => None,
                    };
                }
                Rule::decl_name => f.name = p.as_str().to_string(),
                Rule::field => f.arguments.push(self.field(p, &mut implicit_id)?),
                Rule::throws_clause => {
                    let mut throws_id = -1;
                    for q in p.into_inner().filter(|q| q.as_rule() == Rule::field) {
                        f.throws.push(self.field(q, &mut throws_id)?);
                    }
                }
                Rule::annotations => f.annotations = self.annotations(p),
                _ => {}
            }
        }
        Ok(f)
    }

    /// Fields without an explicit id get -1, -2, ... in declaration order.
    fn field(&self, pair: Pair<'_>, implicit_id: &mut i16) -> Result<FieldDef, ParseError> {
        let span = span_of(&pair);
        let err = self.err(&pair, "incomplete field");
        let mut id = None;
        let mut requiredness = Requiredness::Default;
        let (mut type_ref, mut name, mut default, mut annotations) = (None, None, None, Vec::new());
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::field_id => {
                    let v = p
                        .as_str()
                        .parse::<i16>()
                        .map_err(|_| self.err(&p, format!("field id {} does not fit in i16", p.as_str())))?;
                    id = Some(v);
                }
                Rule::requiredness => {
                    requiredness = if p.as_str() == "required" { Requiredness::Required } else { Requiredness::Optional }
                }
                Rule::field_type => type_ref = Some(self.field_type(p)?),
                Rule::decl_name => name = Some(p.as_str().to_string()),
                Rule::const_value => default = Some(self.const_value(p)?),
                Rule::annotations => annotations = self.annotations(p),
                _ => {}
            }
        }
        let id = match id {
            Some(id) => id,
            None => {
                let id = *implicit_id;
                *implicit_id = implicit_id.saturating_sub(1);
                id
            }
        };
        match (type_ref, name) {
            (Some(type_ref), Some(name)) => Ok(FieldDef { id, name, requiredness, type_ref, default, annotations, span }),
            _ => Err(err),
        }
    }

    fn field_type(&self, pair: Pair<'_>) -> Result<TypeRef, ParseError> {
        let err = self.err(&pair, "empty type");
        let inner = pair.into_inner().next().ok_or(err)?;
        Ok(match inner.as_rule() {
            Rule::base_type => TypeRef::Base(match inner.as_str() {
                "bool" => BaseType::Bool,
                "byte" | "i8" => BaseType::Byte,
                "i16" => BaseType::I16,
                "i32" => BaseType::I32,
                "i64" => BaseType::I64,
                "double" => BaseType::Double,
                "string" => BaseType::String,
                "binary" => BaseType::Binary,
                other => return Err(self.err(&inner, format!("unknown base type {}", other))),
            }),
            Rule::list_type => TypeRef::List(Box::new(self.field_type(self.child(inner, Rule::field_type)?)?)),
            Rule::set_type => TypeRef::Set(Box::new(self.field_type(self.child(inner, Rule::field_type)?)?)),
            Rule::map_type => {
                let err = self.err(&inner, "map needs key and value types");
                let mut parts = inner.into_inner().filter(|p| p.as_rule() == Rule::field_type);
                match (parts.next(), parts.next()) {
                    (Some(k), Some(v)) => TypeRef::Map(Box::new(self.field_type(k)?), Box::new(self.field_type(v)?)),
                    _ => return Err(err),
                }
            }
            Rule::identifier => TypeRef::Named { name: inner.as_str().to_string(), span: span_of(&inner) },
            other => return Err(self.err(&inner, format!("unexpected {:?} in type", other))),
        })
    }

    fn const_value(&self, pair: Pair<'_>) -> Result<ConstValue, ParseError> {
        let err = self.err(&pair, "empty constant");
        let inner = pair.into_inner().next().ok_or(err)?;
        Ok(match inner.as_rule() {
            Rule::double_constant => ConstValue::Double(
                inner.as_str().parse::<f64>().map_err(|_| self.err(&inner, "invalid double constant"))?,
            ),
            Rule::int_constant => {
                ConstValue::Int(parse_int(inner.as_str()).ok_or_else(|| self.err(&inner, "integer out of range"))?)
            }
            Rule::literal => ConstValue::Literal(unquote(inner.as_str())),
            Rule::identifier => ConstValue::Identifier(inner.as_str().to_string()),
            Rule::const_list => {
                ConstValue::List(inner.into_inner().map(|p| self.const_value(p)).collect::<Result<Vec<_>, _>>()?)
            }
            Rule::const_map => {
                let mut entries = Vec::new();
                for entry in inner.into_inner() {
                    let err = self.err(&entry, "map entry needs a key and a value");
                    let mut kv = entry.into_inner();
                    match (kv.next(), kv.next()) {
                        (Some(k), Some(v)) => entries.push((self.const_value(k)?, self.const_value(v)?)),
                        _ => return Err(err),
                    }
                }
                ConstValue::Map(entries)
            }
            other => return Err(self.err(&inner, format!("unexpected {:?} in constant", other))),
        })
    }

    fn annotations(&self, pair: Pair<'_>) -> Vec<Annotation> {
        pair.into_inner()
            .filter(|p| p.as_rule() == Rule::annotation)
            .map(|a| {
                let mut name = String::new();
                let mut value = None;
                for p in a.into_inner() {
                    match p.as_rule() {
                        Rule::identifier => name = p.as_str().to_string(),
                        Rule::literal => value = Some(unquote(p.as_str())),
                        _ => {}
                    }
                }
                Annotation { name, value }
            })
            .collect()
    }
}
