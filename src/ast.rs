//! Abstract Syntax Tree for Thrift IDL files, prior to linking.
//!
//! One [`SchemaFile`] per source file. Include paths are canonical identifiers
//! already resolved by whoever produced the AST (the bundled [parser](crate::parser)
//! or an external front end); the linker only matches them against other files'
//! [`SchemaFile::path`].

/// Source location of a declaration (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Root of one parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFile {
    /// Canonical identifier of the file (e.g. a normalized path).
    pub path: String,
    /// Module name used to qualify this file's definitions (`module.Name`).
    pub module: String,
    pub includes: Vec<Include>,
    pub namespaces: Vec<Namespace>,
    pub definitions: Vec<Definition>,
}

impl SchemaFile {
    /// Empty file whose module name is derived from the path's file stem.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let module = module_name_from_path(&path);
        SchemaFile {
            path,
            module,
            includes: Vec::new(),
            namespaces: Vec::new(),
            definitions: Vec::new(),
        }
    }
}

/// `shared/base.thrift` -> `base`.
pub fn module_name_from_path(path: &str) -> String {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.find('.') {
        Some(i) if i > 0 => file[..i].to_string(),
        _ => file.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub scope: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Const(ConstDef),
    Typedef(TypedefDef),
    Enum(EnumDef),
    Struct(StructDef),
    Union(StructDef),
    Exception(StructDef),
    Service(ServiceDef),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Const(d) => &d.name,
            Definition::Typedef(d) => &d.name,
            Definition::Enum(d) => &d.name,
            Definition::Struct(d) | Definition::Union(d) | Definition::Exception(d) => &d.name,
            Definition::Service(d) => &d.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Definition::Const(d) => d.span,
            Definition::Typedef(d) => d.span,
            Definition::Enum(d) => d.span,
            Definition::Struct(d) | Definition::Union(d) | Definition::Exception(d) => d.span,
            Definition::Service(d) => d.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub name: String,
    pub type_ref: TypeRef,
    pub value: ConstValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDef {
    pub name: String,
    pub target: TypeRef,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<EnumMemberDef>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberDef {
    pub name: String,
    /// Explicit value; `None` means previous member + 1.
    pub value: Option<i64>,
    pub span: Span,
}

/// Body shared by struct, union and exception.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub id: i16,
    pub name: String,
    pub requiredness: Requiredness,
    pub type_ref: TypeRef,
    pub default: Option<ConstValue>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requiredness {
    Required,
    Optional,
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDef {
    pub name: String,
    pub extends: Option<String>,
    pub functions: Vec<FunctionDef>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub oneway: bool,
    /// `None` for `void`.
    pub return_type: Option<TypeRef>,
    pub arguments: Vec<FieldDef>,
    pub throws: Vec<FieldDef>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

/// Unresolved type reference as written in the IDL.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Base(BaseType),
    List(Box<TypeRef>),
    Set(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// A user-defined type, possibly qualified with an include's module name.
    Named { name: String, span: Span },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named { name: name.into(), span: Span::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
}

/// Constant literal as written (defaults and `const` definitions).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Double(f64),
    Literal(String),
    /// `true`, `false`, a const name, or an enum member (`Color.RED`).
    Identifier(String),
    List(Vec<ConstValue>),
    Map(Vec<(ConstValue, ConstValue)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub value: Option<String>,
}
