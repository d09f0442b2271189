//! Load Thrift IDL files (following includes), link them, and print the registry.
//!
//! Usage:
//!   idlwire-check [OPTIONS] FILE.thrift ...
//!
//! Options:
//!   --decode TYPE FILE   Decode FILE (binary protocol) as qualified TYPE and dump it
//!   --quiet, -q          Only report errors
//!
//! Includes are resolved relative to the including file. Set `RUST_LOG=debug`
//! for linker and codec logs.

use anyhow::{bail, Context};
use idlwire::ast::SchemaFile;
use idlwire::types::{NamedType, StructKind};
use idlwire::{dump, link, parse, TypeRegistry};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Parse `roots` and everything they include, transitively. Every file's path
/// and include paths are rewritten to canonical filesystem paths, so the
/// linker can match them.
fn load_schema_set(roots: &[PathBuf]) -> anyhow::Result<Vec<SchemaFile>> {
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    for root in roots {
        queue.push_back(std::fs::canonicalize(root).with_context(|| format!("{}", root.display()))?);
    }
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    while let Some(path) = queue.pop_front() {
        if !seen.insert(path.clone()) {
            continue;
        }
        let source = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let key = path.to_string_lossy().into_owned();
        let mut file = parse(&source, &key)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for inc in &mut file.includes {
            let target = dir.join(&inc.path);
            let target = std::fs::canonicalize(&target)
                .with_context(|| format!("{}:{}: include {}", key, inc.span, target.display()))?;
            inc.path = target.to_string_lossy().into_owned();
            queue.push_back(target);
        }
        debug!(path = %key, definitions = file.definitions.len(), includes = file.includes.len(), "loaded schema file");
        files.push(file);
    }
    Ok(files)
}

fn print_registry(registry: &TypeRegistry) {
    for t in registry.types() {
        match t {
            NamedType::Struct(s) => {
                let kind = if s.kind == StructKind::Exception { "exception" } else { "struct" };
                println!("{} {} ({} fields)", kind, s.name, s.fields.len());
                for f in &s.fields {
                    println!("  {}: {:?} {} {}", f.id, f.requiredness, f.type_spec, f.name);
                }
            }
            NamedType::Union(u) => {
                println!("union {} ({} fields)", u.name, u.fields.len());
                for f in &u.fields {
                    println!("  {}: {} {}", f.id, f.type_spec, f.name);
                }
            }
            NamedType::Enum(e) => {
                let members: Vec<String> = e.members.iter().map(|m| format!("{}={}", m.name, m.value)).collect();
                println!("enum {} {{{}}}", e.name, members.join(", "));
            }
            NamedType::Typedef(t) => println!("typedef {} = {}", t.name, t.target),
        }
    }
    for s in registry.services() {
        match &s.parent {
            Some(p) => println!("service {} extends {}", s.name, p),
            None => println!("service {}", s.name),
        }
        for m in &s.methods {
            let ret = m.return_type.as_ref().map(|t| t.to_string()).unwrap_or_else(|| "void".to_string());
            let oneway = if m.oneway { "oneway " } else { "" };
            println!("  {}{} {}({} args)", oneway, ret, m.name, m.arguments.len());
        }
    }
    for c in registry.constants() {
        println!("const {} {} = {}", c.type_spec, c.name, dump::format_value(registry, &c.type_spec, &c.value));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let quiet = if let Some(pos) = args.iter().position(|a| a == "--quiet" || a == "-q") {
        args.remove(pos);
        true
    } else {
        false
    };
    let decode = if let Some(pos) = args.iter().position(|a| a == "--decode") {
        if pos + 2 >= args.len() {
            bail!("--decode needs TYPE and FILE");
        }
        let parts: Vec<String> = args.drain(pos..pos + 3).collect();
        Some((parts[1].clone(), PathBuf::from(&parts[2])))
    } else {
        None
    };
    if args.is_empty() {
        bail!("usage: idlwire-check [--quiet] [--decode TYPE FILE] FILE.thrift ...");
    }

    let roots: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
    let files = load_schema_set(&roots)?;
    let file_count = files.len();
    let registry = link(files)?;
    if !quiet {
        print_registry(&registry);
        eprintln!(
            "linked {} file(s): {} type(s), {} service(s), {} constant(s)",
            file_count,
            registry.types().count(),
            registry.services().count(),
            registry.constants().count()
        );
    }

    if let Some((type_name, path)) = decode {
        let spec = registry.resolve(&type_name)?;
        let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let value = idlwire::decode(&registry, &bytes, &spec)?;
        println!("{}", dump::value_to_dump(&registry, &spec, &value, 0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loader_follows_includes_relative_to_the_including_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("common")).unwrap();
        fs::write(dir.path().join("common/base.thrift"), "struct Id { 1: required i64 value }").unwrap();
        fs::write(
            dir.path().join("api.thrift"),
            "include \"common/base.thrift\"\nstruct User { 1: required base.Id id; 2: optional string name }",
        )
        .unwrap();

        let files = load_schema_set(&[dir.path().join("api.thrift")]).unwrap();
        assert_eq!(files.len(), 2);
        let registry = link(files).unwrap();
        let user = registry.struct_spec("api.User").unwrap();
        assert_eq!(user.fields[0].type_spec, registry.resolve("base.Id").unwrap());
    }

    #[test]
    fn loader_tolerates_include_cycles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.thrift"), "include \"b.thrift\"\nstruct A { 1: optional b.B b }").unwrap();
        fs::write(dir.path().join("b.thrift"), "include \"a.thrift\"\nstruct B { 1: optional a.A a }").unwrap();
        let files = load_schema_set(&[dir.path().join("a.thrift")]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(link(files).is_ok());
    }

    #[test]
    fn missing_include_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.thrift"), "include \"nope.thrift\"").unwrap();
        assert!(load_schema_set(&[dir.path().join("a.thrift")]).is_err());
    }
}
