//! Link parsed schema files into a [`TypeRegistry`].
//!
//! Three passes over the files:
//!
//! 1. **Symbols**: every file gets a table of its top-level names; includes are
//!    checked and each file's transitive include set is computed (breadth-first,
//!    include cycles allowed).
//! 2. **Types**: every type reference is resolved to a [`TypeSpec`]. Named types
//!    are stored once in the registry under `module.Name`; containers are
//!    interned. Typedefs are followed eagerly outside containers and lazily
//!    (by name) inside them, which is what makes `typedef A B; typedef B A` an
//!    error while `struct Node { 1: list<Node> children }` is fine.
//! 3. **Constants**: `const` definitions and field defaults are converted to
//!    typed [`Value`]s.
//!
//! The first error aborts linking; no partial registry is returned.

use crate::ast::*;
use crate::registry::TypeRegistry;
use crate::types::*;
use crate::value::{EnumValue, StructValue, UnionValue, Validator, Value, DEFAULT_MAX_DEPTH};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("{file}:{span}: unresolved reference to {name}")]
    UnresolvedReference { file: String, span: Span, name: String },
    #[error("{file}:{span}: duplicate definition of {name}")]
    DuplicateDefinition { file: String, span: Span, name: String },
    #[error("{file}:{span}: illegal typedef cycle: {}", cycle.join(" -> "))]
    IllegalTypedefCycle { file: String, span: Span, cycle: Vec<String> },
    #[error("{file}:{span}: duplicate field id {id} in {owner}")]
    DuplicateFieldId { file: String, span: Span, owner: String, id: i16 },
    #[error("{file}:{span}: duplicate member {member} in enum {enum_name}")]
    DuplicateEnumMember { file: String, span: Span, enum_name: String, member: String },
    #[error("{file}:{span}: included file {include} was not provided")]
    UnresolvedInclude { file: String, span: Span, include: String },
    #[error("{file}:{span}: {name} must refer to {expected}")]
    InvalidReference { file: String, span: Span, name: String, expected: &'static str },
    #[error("{file}:{span}: invalid constant {name}: {reason}")]
    InvalidConstant { file: String, span: Span, name: String, reason: String },
}

/// Link parsed files. Files are deduplicated by [`SchemaFile::path`] (first wins).
pub fn link(files: Vec<SchemaFile>) -> Result<TypeRegistry, SchemaError> {
    Linker::new(files)?.run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefKind {
    Const,
    Typedef,
    Enum,
    Struct,
    Union,
    Exception,
    Service,
}

impl DefKind {
    fn of(def: &Definition) -> DefKind {
        match def {
            Definition::Const(_) => DefKind::Const,
            Definition::Typedef(_) => DefKind::Typedef,
            Definition::Enum(_) => DefKind::Enum,
            Definition::Struct(_) => DefKind::Struct,
            Definition::Union(_) => DefKind::Union,
            Definition::Exception(_) => DefKind::Exception,
            Definition::Service(_) => DefKind::Service,
        }
    }
}

struct FileEntry {
    file: SchemaFile,
    symbols: HashMap<String, usize>,
    /// Transitively included files, breadth-first, excluding this one.
    visible: Vec<usize>,
}

/// Where a linked default value goes once pass 3 has computed it.
#[derive(Clone)]
enum DefaultTarget {
    Type(TypeName),
    MethodArgs { service: TypeName, method: usize, args: TypeName },
}

struct PendingDefault {
    file: usize,
    target: DefaultTarget,
    field_id: i16,
    field_name: String,
    spec: TypeSpec,
    value: ConstValue,
    span: Span,
}

struct Linker {
    files: Vec<FileEntry>,
    registry: TypeRegistry,
    interned: HashMap<TypeSpec, Arc<TypeSpec>>,
    typedef_stack: Vec<TypeName>,
    const_stack: Vec<TypeName>,
    pending_defaults: Vec<PendingDefault>,
}

fn base_spec(b: BaseType) -> TypeSpec {
    match b {
        BaseType::Bool => TypeSpec::Bool,
        BaseType::Byte => TypeSpec::Byte,
        BaseType::I16 => TypeSpec::I16,
        BaseType::I32 => TypeSpec::I32,
        BaseType::I64 => TypeSpec::I64,
        BaseType::Double => TypeSpec::Double,
        BaseType::String => TypeSpec::String,
        BaseType::Binary => TypeSpec::Binary,
    }
}

impl Linker {
    /// Pass 1: dedupe files, check includes and modules, build symbol tables.
    fn new(files: Vec<SchemaFile>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let files: Vec<SchemaFile> = files.into_iter().filter(|f| seen.insert(f.path.clone())).collect();
        debug!(files = files.len(), "linking schema files");

        let edges = include_edges(&files)?;

        let mut entries = Vec::with_capacity(files.len());
        for (i, file) in files.into_iter().enumerate() {
            let mut symbols = HashMap::new();
            for (d, def) in file.definitions.iter().enumerate() {
                if symbols.insert(def.name().to_string(), d).is_some() {
                    return Err(SchemaError::DuplicateDefinition {
                        file: file.path.clone(),
                        span: def.span(),
                        name: def.name().to_string(),
                    });
                }
            }
            let visible = transitive_includes(i, &edges);
            trace!(file = %file.path, module = %file.module, symbols = symbols.len(), visible = visible.len(), "symbol table built");
            entries.push(FileEntry { file, symbols, visible });
        }

        Ok(Linker {
            files: entries,
            registry: TypeRegistry::default(),
            interned: HashMap::new(),
            typedef_stack: Vec::new(),
            const_stack: Vec::new(),
            pending_defaults: Vec::new(),
        })
    }

    fn run(mut self) -> Result<TypeRegistry, SchemaError> {
        // Pass 2
        for f in 0..self.files.len() {
            for d in 0..self.files[f].file.definitions.len() {
                match self.def_kind(f, d) {
                    DefKind::Typedef => self.resolve_typedef(f, d)?,
                    DefKind::Enum => self.link_enum(f, d)?,
                    DefKind::Struct | DefKind::Union | DefKind::Exception => self.link_struct(f, d)?,
                    DefKind::Service => self.link_service(f, d)?,
                    DefKind::Const => {}
                }
            }
        }
        // Pass 3
        for f in 0..self.files.len() {
            for d in 0..self.files[f].file.definitions.len() {
                if self.def_kind(f, d) == DefKind::Const {
                    self.ensure_const(f, d)?;
                }
            }
        }
        let pending = std::mem::take(&mut self.pending_defaults);
        for p in pending {
            let context = format!("{}.{}", target_name(&p.target), p.field_name);
            let value = self.convert_const(p.file, &p.spec, &p.value, p.span, &context)?;
            self.apply_default(&p.target, p.field_id, value);
        }
        debug!(
            types = self.registry.types.len(),
            services = self.registry.services.len(),
            constants = self.registry.constants.len(),
            interned = self.interned.len(),
            "schema linked"
        );
        Ok(self.registry)
    }

    fn path(&self, f: usize) -> String {
        self.files[f].file.path.clone()
    }

    fn def(&self, f: usize, d: usize) -> &Definition {
        &self.files[f].file.definitions[d]
    }

    fn def_kind(&self, f: usize, d: usize) -> DefKind {
        DefKind::of(self.def(f, d))
    }

    fn qualified(&self, f: usize, d: usize) -> TypeName {
        Arc::from(format!("{}.{}", self.files[f].file.module, self.def(f, d).name()))
    }

    /// Local names first; `module.Name` in the file with that module; bare names
    /// in transitively included files, nearest include first.
    fn lookup(&self, file: usize, name: &str) -> Option<(usize, usize)> {
        let entry = &self.files[file];
        if let Some(&d) = entry.symbols.get(name) {
            return Some((file, d));
        }
        if let Some((module, rest)) = name.split_once('.') {
            return std::iter::once(&file)
                .chain(entry.visible.iter())
                .filter(|&&f| self.files[f].file.module == module)
                .find_map(|&f| self.files[f].symbols.get(rest).map(|&d| (f, d)));
        }
        entry.visible.iter().find_map(|&f| self.files[f].symbols.get(name).map(|&d| (f, d)))
    }

    fn lookup_or_err(&self, file: usize, name: &str, span: Span) -> Result<(usize, usize), SchemaError> {
        self.lookup(file, name).ok_or_else(|| SchemaError::UnresolvedReference {
            file: self.path(file),
            span,
            name: name.to_string(),
        })
    }

    fn intern(&mut self, spec: TypeSpec) -> Arc<TypeSpec> {
        self.interned.entry(spec.clone()).or_insert_with(|| Arc::new(spec)).clone()
    }

    fn resolve_type(&mut self, file: usize, tref: &TypeRef, in_container: bool) -> Result<TypeSpec, SchemaError> {
        Ok(match tref {
            TypeRef::Base(b) => base_spec(*b),
            TypeRef::List(e) => {
                let inner = self.resolve_type(file, e, true)?;
                TypeSpec::List(self.intern(inner))
            }
            TypeRef::Set(e) => {
                let inner = self.resolve_type(file, e, true)?;
                TypeSpec::Set(self.intern(inner))
            }
            TypeRef::Map(k, v) => {
                let key = self.resolve_type(file, k, true)?;
                let value = self.resolve_type(file, v, true)?;
                TypeSpec::Map(self.intern(key), self.intern(value))
            }
            TypeRef::Named { name, span } => {
                let (f, d) = self.lookup_or_err(file, name, *span)?;
                let qname = self.qualified(f, d);
                match self.def_kind(f, d) {
                    DefKind::Struct | DefKind::Exception => TypeSpec::Struct(qname),
                    DefKind::Union => TypeSpec::Union(qname),
                    DefKind::Enum => TypeSpec::Enum(qname),
                    DefKind::Typedef => {
                        if !in_container {
                            self.resolve_typedef(f, d)?;
                        }
                        TypeSpec::Typedef(qname)
                    }
                    DefKind::Service | DefKind::Const => {
                        return Err(SchemaError::InvalidReference {
                            file: self.path(file),
                            span: *span,
                            name: name.clone(),
                            expected: "a type",
                        })
                    }
                }
            }
        })
    }

    fn resolve_typedef(&mut self, f: usize, d: usize) -> Result<(), SchemaError> {
        let qname = self.qualified(f, d);
        match self.registry.named(&qname) {
            Some(NamedType::Typedef(_)) => return Ok(()),
            Some(_) => {
                return Err(SchemaError::DuplicateDefinition {
                    file: self.path(f),
                    span: self.def(f, d).span(),
                    name: qname.to_string(),
                })
            }
            None => {}
        }
        if let Some(pos) = self.typedef_stack.iter().position(|n| *n == qname) {
            let mut cycle: Vec<String> = self.typedef_stack[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(qname.to_string());
            return Err(SchemaError::IllegalTypedefCycle { file: self.path(f), span: self.def(f, d).span(), cycle });
        }
        let target_ref = match self.def(f, d) {
            Definition::Typedef(t) => t.target.clone(),
            _ => return Ok(()),
        };
        self.typedef_stack.push(qname.clone());
        let target = self.resolve_type(f, &target_ref, false);
        self.typedef_stack.pop();
        let target = target?;
        trace!(typedef = %qname, target = %target, "resolved typedef");
        let span = self.def(f, d).span();
        self.insert_named(f, span, NamedType::Typedef(TypedefSpec { name: qname, target }))
    }

    fn link_enum(&mut self, f: usize, d: usize) -> Result<(), SchemaError> {
        let qname = self.qualified(f, d);
        let def = match self.def(f, d) {
            Definition::Enum(e) => e.clone(),
            _ => return Ok(()),
        };
        let mut names = HashSet::new();
        let mut members = Vec::with_capacity(def.members.len());
        let mut next: i64 = 0;
        for m in &def.members {
            if !names.insert(m.name.as_str()) {
                return Err(SchemaError::DuplicateEnumMember {
                    file: self.path(f),
                    span: m.span,
                    enum_name: qname.to_string(),
                    member: m.name.clone(),
                });
            }
            let raw = m.value.unwrap_or(next);
            let value = i32::try_from(raw).map_err(|_| SchemaError::InvalidConstant {
                file: self.path(f),
                span: m.span,
                name: format!("{}.{}", qname, m.name),
                reason: format!("enum value {} does not fit in i32", raw),
            })?;
            next = raw + 1;
            members.push(EnumMember { name: m.name.clone(), value });
        }
        trace!(name = %qname, members = members.len(), "linked enum");
        self.insert_named(f, def.span, NamedType::Enum(EnumSpec { name: qname, members }))
    }

    fn link_fields(
        &mut self,
        f: usize,
        owner: &TypeName,
        fields: &[FieldDef],
        force_optional: bool,
        defaults: Option<DefaultTarget>,
    ) -> Result<Vec<FieldSpec>, SchemaError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut out = Vec::with_capacity(fields.len());
        for fd in fields {
            if !ids.insert(fd.id) {
                return Err(SchemaError::DuplicateFieldId {
                    file: self.path(f),
                    span: fd.span,
                    owner: owner.to_string(),
                    id: fd.id,
                });
            }
            if !names.insert(fd.name.as_str()) {
                return Err(SchemaError::DuplicateDefinition {
                    file: self.path(f),
                    span: fd.span,
                    name: format!("{}.{}", owner, fd.name),
                });
            }
            let spec = self.resolve_type(f, &fd.type_ref, false)?;
            if let (Some(target), Some(value)) = (&defaults, &fd.default) {
                self.pending_defaults.push(PendingDefault {
                    file: f,
                    target: target.clone(),
                    field_id: fd.id,
                    field_name: fd.name.clone(),
                    spec: spec.clone(),
                    value: value.clone(),
                    span: fd.span,
                });
            }
            let requiredness = if force_optional { Requiredness::Optional } else { fd.requiredness };
            out.push(FieldSpec::new(fd.id, fd.name.clone(), spec, requiredness));
        }
        Ok(out)
    }

    /// Two definitions can still meet on one qualified name, for instance a
    /// hand-built `Svc.get_args` next to the args struct of `Svc.get`.
    fn insert_named(&mut self, f: usize, span: Span, t: NamedType) -> Result<(), SchemaError> {
        let name = t.name().to_string();
        if self.registry.insert_type(t) {
            Ok(())
        } else {
            Err(SchemaError::DuplicateDefinition { file: self.path(f), span, name })
        }
    }

    fn link_struct(&mut self, f: usize, d: usize) -> Result<(), SchemaError> {
        let qname = self.qualified(f, d);
        let (def, kind) = match self.def(f, d) {
            Definition::Struct(s) => (s.clone(), DefKind::Struct),
            Definition::Union(s) => (s.clone(), DefKind::Union),
            Definition::Exception(s) => (s.clone(), DefKind::Exception),
            _ => return Ok(()),
        };
        let is_union = kind == DefKind::Union;
        let fields = self.link_fields(f, &qname, &def.fields, is_union, Some(DefaultTarget::Type(qname.clone())))?;
        trace!(name = %qname, fields = fields.len(), "linked {:?}", kind);
        let named = if is_union {
            NamedType::Union(UnionSpec { name: qname, fields })
        } else {
            let kind = if kind == DefKind::Exception { StructKind::Exception } else { StructKind::Struct };
            NamedType::Struct(StructSpec { name: qname, kind, fields })
        };
        self.insert_named(f, def.span, named)
    }

    fn link_service(&mut self, f: usize, d: usize) -> Result<(), SchemaError> {
        let qname = self.qualified(f, d);
        let def = match self.def(f, d) {
            Definition::Service(s) => s.clone(),
            _ => return Ok(()),
        };
        let parent = match &def.extends {
            Some(p) => {
                let (pf, pd) = self.lookup_or_err(f, p, def.span)?;
                if self.def_kind(pf, pd) != DefKind::Service {
                    return Err(SchemaError::InvalidReference {
                        file: self.path(f),
                        span: def.span,
                        name: p.clone(),
                        expected: "a service",
                    });
                }
                Some(self.qualified(pf, pd))
            }
            None => None,
        };

        let mut method_names = HashSet::new();
        let mut methods = Vec::with_capacity(def.functions.len());
        for (mi, func) in def.functions.iter().enumerate() {
            if !method_names.insert(func.name.as_str()) {
                return Err(SchemaError::DuplicateDefinition {
                    file: self.path(f),
                    span: func.span,
                    name: format!("{}.{}", qname, func.name),
                });
            }
            let args_name: TypeName = Arc::from(format!("{}.{}_args", qname, func.name));
            let result_name: TypeName = Arc::from(format!("{}.{}_result", qname, func.name));
            let target = DefaultTarget::MethodArgs { service: qname.clone(), method: mi, args: args_name.clone() };
            let arguments = self.link_fields(f, &args_name, &func.arguments, false, Some(target))?;
            let return_type = match &func.return_type {
                Some(t) => Some(self.resolve_type(f, t, false)?),
                None => None,
            };
            for t in &func.throws {
                self.check_exception_type(f, &t.type_ref, t.span)?;
            }
            let exceptions = self.link_fields(f, &result_name, &func.throws, true, None)?;
            if func.oneway && (return_type.is_some() || !exceptions.is_empty()) {
                return Err(SchemaError::InvalidReference {
                    file: self.path(f),
                    span: func.span,
                    name: format!("{}.{}", qname, func.name),
                    expected: "a void method without throws when oneway",
                });
            }

            self.insert_named(
                f,
                func.span,
                NamedType::Struct(StructSpec { name: args_name.clone(), kind: StructKind::Struct, fields: arguments.clone() }),
            )?;
            let result_struct = if func.oneway {
                None
            } else {
                let mut fields = Vec::with_capacity(exceptions.len() + 1);
                if let Some(rt) = &return_type {
                    fields.push(FieldSpec::new(0, "success", rt.clone(), Requiredness::Optional));
                }
                for e in &exceptions {
                    if e.id == 0 && return_type.is_some() {
                        return Err(SchemaError::DuplicateFieldId {
                            file: self.path(f),
                            span: func.span,
                            owner: result_name.to_string(),
                            id: 0,
                        });
                    }
                    fields.push(e.clone());
                }
                self.insert_named(
                    f,
                    func.span,
                    NamedType::Struct(StructSpec { name: result_name.clone(), kind: StructKind::Struct, fields }),
                )?;
                Some(result_name)
            };

            methods.push(MethodSpec {
                name: func.name.clone(),
                arguments,
                return_type,
                exceptions,
                oneway: func.oneway,
                args_struct: args_name,
                result_struct,
            });
        }
        debug!(service = %qname, methods = methods.len(), parent = ?parent, "linked service");
        if !self.registry.insert_service(ServiceSpec { name: qname.clone(), parent, methods }) {
            return Err(SchemaError::DuplicateDefinition { file: self.path(f), span: def.span, name: qname.to_string() });
        }
        Ok(())
    }

    /// `throws` entries must name exceptions (possibly through typedefs).
    fn check_exception_type(&self, f: usize, tref: &TypeRef, span: Span) -> Result<(), SchemaError> {
        let invalid = |name: String| SchemaError::InvalidReference { file: self.path(f), span, name, expected: "an exception" };
        let mut current = (f, tref.clone());
        for _ in 0..=self.files.iter().map(|e| e.file.definitions.len()).sum::<usize>() {
            let name = match &current.1 {
                TypeRef::Named { name, .. } => name.clone(),
                other => return Err(invalid(format!("{:?}", other))),
            };
            let (tf, td) = self.lookup_or_err(current.0, &name, span)?;
            match self.def(tf, td) {
                Definition::Exception(_) => return Ok(()),
                Definition::Typedef(t) => current = (tf, t.target.clone()),
                _ => return Err(invalid(name)),
            }
        }
        Err(invalid(format!("{:?}", tref)))
    }

    fn ensure_const(&mut self, f: usize, d: usize) -> Result<Value, SchemaError> {
        let qname = self.qualified(f, d);
        if let Ok(v) = self.registry.constant(&qname) {
            return Ok(v.clone());
        }
        let def = match self.def(f, d) {
            Definition::Const(c) => c.clone(),
            other => {
                return Err(SchemaError::InvalidReference {
                    file: self.path(f),
                    span: other.span(),
                    name: qname.to_string(),
                    expected: "a constant",
                })
            }
        };
        if self.const_stack.contains(&qname) {
            return Err(SchemaError::InvalidConstant {
                file: self.path(f),
                span: def.span,
                name: qname.to_string(),
                reason: "cyclic constant reference".to_string(),
            });
        }
        self.const_stack.push(qname.clone());
        let linked = self.link_const_body(f, &def, &qname);
        self.const_stack.pop();
        let (type_spec, value) = linked?;
        trace!(constant = %qname, "linked constant");
        if !self.registry.insert_constant(ConstSpec { name: qname.clone(), type_spec, value: value.clone() }) {
            return Err(SchemaError::DuplicateDefinition { file: self.path(f), span: def.span, name: qname.to_string() });
        }
        Ok(value)
    }

    fn link_const_body(&mut self, f: usize, def: &ConstDef, qname: &TypeName) -> Result<(TypeSpec, Value), SchemaError> {
        let spec = self.resolve_type(f, &def.type_ref, false)?;
        let value = self.convert_const(f, &spec, &def.value, def.span, qname)?;
        Ok((spec, value))
    }

    fn bad_const(&self, f: usize, span: Span, name: &str, reason: impl Into<String>) -> SchemaError {
        SchemaError::InvalidConstant { file: self.path(f), span, name: name.to_string(), reason: reason.into() }
    }

    /// Type-directed conversion of a literal.
    fn convert_const(
        &mut self,
        f: usize,
        spec: &TypeSpec,
        cv: &ConstValue,
        span: Span,
        name: &str,
    ) -> Result<Value, SchemaError> {
        let canonical = self
            .registry
            .canonical(spec)
            .map_err(|e| self.bad_const(f, span, name, e.to_string()))?
            .clone();
        let out_of_range = |i: &i64| format!("{} is out of range for {}", i, canonical);
        Ok(match (&canonical, cv) {
            (_, ConstValue::Identifier(id)) => return self.convert_identifier(f, spec, &canonical, id, span, name),
            (TypeSpec::Bool, ConstValue::Int(0)) => Value::Bool(false),
            (TypeSpec::Bool, ConstValue::Int(1)) => Value::Bool(true),
            (TypeSpec::Byte, ConstValue::Int(i)) => {
                Value::Byte(i8::try_from(*i).map_err(|_| self.bad_const(f, span, name, out_of_range(i)))?)
            }
            (TypeSpec::I16, ConstValue::Int(i)) => {
                Value::I16(i16::try_from(*i).map_err(|_| self.bad_const(f, span, name, out_of_range(i)))?)
            }
            (TypeSpec::I32, ConstValue::Int(i)) => {
                Value::I32(i32::try_from(*i).map_err(|_| self.bad_const(f, span, name, out_of_range(i)))?)
            }
            (TypeSpec::I64, ConstValue::Int(i)) => Value::I64(*i),
            (TypeSpec::Double, ConstValue::Int(i)) => Value::Double(*i as f64),
            (TypeSpec::Double, ConstValue::Double(x)) => Value::Double(*x),
            (TypeSpec::String, ConstValue::Literal(s)) => Value::String(s.clone()),
            (TypeSpec::Binary, ConstValue::Literal(s)) => Value::Binary(s.clone().into_bytes()),
            (TypeSpec::Enum(_), ConstValue::Int(i)) => {
                let raw = i32::try_from(*i).map_err(|_| self.bad_const(f, span, name, out_of_range(i)))?;
                let e = EnumValue::new(&self.registry, &canonical, raw).map_err(|e| self.bad_const(f, span, name, e.to_string()))?;
                Value::Enum(e)
            }
            (TypeSpec::List(elem), ConstValue::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.convert_const(f, elem, item, span, name)?);
                }
                Value::List(out)
            }
            (TypeSpec::Set(elem), ConstValue::List(items)) => {
                let mut out = BTreeSet::new();
                for item in items {
                    out.insert(self.convert_const(f, elem, item, span, name)?);
                }
                Value::Set(out)
            }
            (TypeSpec::Map(kspec, vspec), ConstValue::Map(entries)) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let key = self.convert_const(f, kspec, k, span, name)?;
                    let value = self.convert_const(f, vspec, v, span, name)?;
                    out.insert(key, value);
                }
                Value::Map(out)
            }
            (TypeSpec::Struct(sname), ConstValue::Map(entries)) => {
                let fields = self
                    .registry
                    .struct_spec(sname)
                    .map_err(|e| self.bad_const(f, span, name, e.to_string()))?
                    .fields
                    .clone();
                let mut out = StructValue::new();
                for (k, v) in entries {
                    let field = self.literal_field(f, &fields, k, span, name)?;
                    let value = self.convert_const(f, &field.type_spec, v, span, name)?;
                    out.insert(field.id, value);
                }
                let value = Value::Struct(out);
                self.check_value(f, &canonical, &value, span, name)?;
                value
            }
            (TypeSpec::Union(uname), ConstValue::Map(entries)) => {
                let fields = self
                    .registry
                    .union_spec(uname)
                    .map_err(|e| self.bad_const(f, span, name, e.to_string()))?
                    .fields
                    .clone();
                let mut converted = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let field = self.literal_field(f, &fields, k, span, name)?;
                    converted.push((field.id, self.convert_const(f, &field.type_spec, v, span, name)?));
                }
                let union = UnionValue::from_fields(uname, converted).map_err(|e| self.bad_const(f, span, name, e.to_string()))?;
                Value::Union(union)
            }
            _ => return Err(self.bad_const(f, span, name, format!("{:?} is not a valid {}", cv, canonical))),
        })
    }

    fn literal_field(
        &self,
        f: usize,
        fields: &[FieldSpec],
        key: &ConstValue,
        span: Span,
        name: &str,
    ) -> Result<FieldSpec, SchemaError> {
        match key {
            ConstValue::Literal(k) | ConstValue::Identifier(k) => fields
                .iter()
                .find(|fs| fs.name == *k)
                .cloned()
                .ok_or_else(|| self.bad_const(f, span, name, format!("no field named {}", k))),
            other => Err(self.bad_const(f, span, name, format!("struct literal keys must be field names, found {:?}", other))),
        }
    }

    fn check_value(&self, f: usize, spec: &TypeSpec, value: &Value, span: Span, name: &str) -> Result<(), SchemaError> {
        Validator::new(&self.registry, DEFAULT_MAX_DEPTH)
            .check(spec, value, 0)
            .map_err(|e| self.bad_const(f, span, name, e.to_string()))
    }

    fn convert_identifier(
        &mut self,
        f: usize,
        spec: &TypeSpec,
        canonical: &TypeSpec,
        id: &str,
        span: Span,
        name: &str,
    ) -> Result<Value, SchemaError> {
        if *canonical == TypeSpec::Bool {
            match id {
                "true" => return Ok(Value::Bool(true)),
                "false" => return Ok(Value::Bool(false)),
                _ => {}
            }
        }
        if let TypeSpec::Enum(enum_name) = canonical {
            if let Some((enum_ref, member)) = id.rsplit_once('.') {
                if let Some((ef, ed)) = self.lookup(f, enum_ref) {
                    if self.qualified(ef, ed) == *enum_name {
                        let e = EnumValue::named(&self.registry, canonical, member)
                            .map_err(|e| self.bad_const(f, span, name, e.to_string()))?;
                        return Ok(Value::Enum(e));
                    }
                }
            }
        }
        let (cf, cd) = self.lookup_or_err(f, id, span)?;
        if self.def_kind(cf, cd) != DefKind::Const {
            return Err(SchemaError::InvalidReference {
                file: self.path(f),
                span,
                name: id.to_string(),
                expected: "a constant",
            });
        }
        let value = self.ensure_const(cf, cd)?;
        self.check_value(f, spec, &value, span, name)?;
        Ok(value)
    }

    fn apply_default(&mut self, target: &DefaultTarget, field_id: i16, value: Value) {
        let owner = match target {
            DefaultTarget::Type(owner) => owner,
            DefaultTarget::MethodArgs { service, method, args } => {
                if let Some(field) = self
                    .registry
                    .service_mut(service)
                    .and_then(|s| s.methods.get_mut(*method))
                    .and_then(|m| m.arguments.iter_mut().find(|a| a.id == field_id))
                {
                    field.default_value = Some(value.clone());
                }
                args
            }
        };
        let fields = match self.registry.named_mut(owner) {
            Some(NamedType::Struct(s)) => &mut s.fields,
            Some(NamedType::Union(u)) => &mut u.fields,
            _ => return,
        };
        if let Some(field) = fields.iter_mut().find(|fs| fs.id == field_id) {
            field.default_value = Some(value);
        }
    }
}

fn target_name(target: &DefaultTarget) -> &str {
    match target {
        DefaultTarget::Type(n) => n,
        DefaultTarget::MethodArgs { args, .. } => args,
    }
}

/// Include targets per file, by index. Also rejects two files claiming one module name.
fn include_edges(files: &[SchemaFile]) -> Result<Vec<Vec<usize>>, SchemaError> {
    let index_by_path: HashMap<&str, usize> = files.iter().enumerate().map(|(i, f)| (f.path.as_str(), i)).collect();
    let mut modules: HashMap<&str, &str> = HashMap::new();
    let mut edges = Vec::with_capacity(files.len());
    for f in files {
        if let Some(other) = modules.insert(f.module.as_str(), f.path.as_str()) {
            return Err(SchemaError::DuplicateDefinition {
                file: f.path.clone(),
                span: Span::default(),
                name: format!("module {} (also defined by {})", f.module, other),
            });
        }
        let mut out = Vec::with_capacity(f.includes.len());
        for inc in &f.includes {
            let target = index_by_path.get(inc.path.as_str()).ok_or_else(|| SchemaError::UnresolvedInclude {
                file: f.path.clone(),
                span: inc.span,
                include: inc.path.clone(),
            })?;
            out.push(*target);
        }
        edges.push(out);
    }
    Ok(edges)
}

fn transitive_includes(start: usize, edges: &[Vec<usize>]) -> Vec<usize> {
    let mut seen = HashSet::from([start]);
    let mut order = Vec::new();
    let mut queue: VecDeque<usize> = edges[start].iter().copied().collect();
    while let Some(next) = queue.pop_front() {
        if !seen.insert(next) {
            continue;
        }
        order.push(next);
        queue.extend(edges[next].iter().copied());
    }
    order
}
