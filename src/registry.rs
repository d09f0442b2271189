//! The linked, immutable schema: named types, services and constants by qualified name.
//!
//! Built only by [`link`](crate::linker::link). Nothing mutates it afterwards, so a
//! `&TypeRegistry` can be shared across threads and handed to any number of codecs.

use crate::types::*;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("type not found: {0}")]
    NotFound(String),
    #[error("{name} is a {actual}, not a {expected}")]
    WrongKind { name: String, expected: &'static str, actual: &'static str },
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("method {method} not found on service {service}")]
    MethodNotFound { service: String, method: String },
    #[error("constant not found: {0}")]
    ConstantNotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeRegistry {
    pub(crate) types: Vec<NamedType>,
    pub(crate) types_by_name: HashMap<TypeName, usize>,
    pub(crate) services: Vec<ServiceSpec>,
    pub(crate) services_by_name: HashMap<TypeName, usize>,
    pub(crate) constants: Vec<ConstSpec>,
    pub(crate) constants_by_name: HashMap<TypeName, usize>,
}

fn kind_name(t: &NamedType) -> &'static str {
    match t {
        NamedType::Struct(s) if s.kind == StructKind::Exception => "exception",
        NamedType::Struct(_) => "struct",
        NamedType::Union(_) => "union",
        NamedType::Enum(_) => "enum",
        NamedType::Typedef(_) => "typedef",
    }
}

impl TypeRegistry {
    /// Spec referring to the named type `qualified_name` (`module.Name`).
    pub fn resolve(&self, qualified_name: &str) -> Result<TypeSpec, RegistryError> {
        self.named(qualified_name)
            .map(NamedType::type_spec)
            .ok_or_else(|| RegistryError::NotFound(qualified_name.to_string()))
    }

    pub fn named(&self, qualified_name: &str) -> Option<&NamedType> {
        self.types_by_name.get(qualified_name).map(|&i| &self.types[i])
    }

    pub fn struct_spec(&self, name: &str) -> Result<&StructSpec, RegistryError> {
        match self.named(name) {
            Some(NamedType::Struct(s)) => Ok(s),
            Some(other) => Err(RegistryError::WrongKind { name: name.to_string(), expected: "struct", actual: kind_name(other) }),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn union_spec(&self, name: &str) -> Result<&UnionSpec, RegistryError> {
        match self.named(name) {
            Some(NamedType::Union(u)) => Ok(u),
            Some(other) => Err(RegistryError::WrongKind { name: name.to_string(), expected: "union", actual: kind_name(other) }),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn enum_spec(&self, name: &str) -> Result<&EnumSpec, RegistryError> {
        match self.named(name) {
            Some(NamedType::Enum(e)) => Ok(e),
            Some(other) => Err(RegistryError::WrongKind { name: name.to_string(), expected: "enum", actual: kind_name(other) }),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    pub fn typedef_target(&self, name: &str) -> Result<&TypeSpec, RegistryError> {
        match self.named(name) {
            Some(NamedType::Typedef(t)) => Ok(&t.target),
            Some(other) => Err(RegistryError::WrongKind { name: name.to_string(), expected: "typedef", actual: kind_name(other) }),
            None => Err(RegistryError::NotFound(name.to_string())),
        }
    }

    /// Follow typedefs until a non-typedef spec. Containers are returned as-is,
    /// so typedefs nested in element types stay unexpanded.
    pub fn canonical<'a>(&'a self, spec: &'a TypeSpec) -> Result<&'a TypeSpec, RegistryError> {
        let mut current = spec;
        // Linked typedef chains are acyclic, so this walks at most one step per typedef.
        for _ in 0..=self.types.len() {
            match current {
                TypeSpec::Typedef(name) => current = self.typedef_target(name)?,
                _ => return Ok(current),
            }
        }
        Err(RegistryError::NotFound(spec.to_string()))
    }

    pub fn service(&self, name: &str) -> Result<&ServiceSpec, RegistryError> {
        self.services_by_name
            .get(name)
            .map(|&i| &self.services[i])
            .ok_or_else(|| RegistryError::ServiceNotFound(name.to_string()))
    }

    /// Look `method` up on `service`, then along its `extends` chain.
    pub fn find_method(&self, service: &str, method: &str) -> Result<(&ServiceSpec, &MethodSpec), RegistryError> {
        let mut current = self.service(service)?;
        for _ in 0..=self.services.len() {
            if let Some(m) = current.method(method) {
                return Ok((current, m));
            }
            match &current.parent {
                Some(parent) => current = self.service(parent)?,
                None => break,
            }
        }
        Err(RegistryError::MethodNotFound { service: service.to_string(), method: method.to_string() })
    }

    pub fn constant(&self, name: &str) -> Result<&Value, RegistryError> {
        self.constants_by_name
            .get(name)
            .map(|&i| &self.constants[i].value)
            .ok_or_else(|| RegistryError::ConstantNotFound(name.to_string()))
    }

    pub fn constant_spec(&self, name: &str) -> Option<&ConstSpec> {
        self.constants_by_name.get(name).map(|&i| &self.constants[i])
    }

    /// Named types in link order.
    pub fn types(&self) -> impl Iterator<Item = &NamedType> {
        self.types.iter()
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.iter()
    }

    pub fn constants(&self) -> impl Iterator<Item = &ConstSpec> {
        self.constants.iter()
    }

    /// Returns false, leaving the registry unchanged, when the name is taken.
    pub(crate) fn insert_type(&mut self, t: NamedType) -> bool {
        if self.types_by_name.contains_key(t.name()) {
            return false;
        }
        self.types_by_name.insert(t.name().clone(), self.types.len());
        self.types.push(t);
        true
    }

    pub(crate) fn insert_service(&mut self, s: ServiceSpec) -> bool {
        if self.services_by_name.contains_key(&s.name) {
            return false;
        }
        self.services_by_name.insert(s.name.clone(), self.services.len());
        self.services.push(s);
        true
    }

    pub(crate) fn insert_constant(&mut self, c: ConstSpec) -> bool {
        if self.constants_by_name.contains_key(&c.name) {
            return false;
        }
        self.constants_by_name.insert(c.name.clone(), self.constants.len());
        self.constants.push(c);
        true
    }

    pub(crate) fn named_mut(&mut self, name: &str) -> Option<&mut NamedType> {
        match self.types_by_name.get(name) {
            Some(&i) => self.types.get_mut(i),
            None => None,
        }
    }

    pub(crate) fn service_mut(&mut self, name: &str) -> Option<&mut ServiceSpec> {
        match self.services_by_name.get(name) {
            Some(&i) => self.services.get_mut(i),
            None => None,
        }
    }
}
