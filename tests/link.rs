//! Linking: multi-file resolution, schema errors, constants and services.

use idlwire::ast::SchemaFile;
use idlwire::types::{NamedType, StructKind};
use idlwire::{link, parse, Requiredness, SchemaError, TypeRegistry, TypeSpec, Value};
use std::sync::Arc;

fn file(path: &str, source: &str) -> SchemaFile {
    parse(source, path).unwrap_or_else(|e| panic!("{}", e))
}

fn link_one(path: &str, source: &str) -> Result<TypeRegistry, SchemaError> {
    link(vec![file(path, source)])
}

fn named(kind: fn(Arc<str>) -> TypeSpec, name: &str) -> TypeSpec {
    kind(Arc::from(name))
}

const BASE: &str = r#"
namespace rs base
enum Status { ACTIVE = 1, DISABLED }
typedef i64 Timestamp
struct Audit {
  1: required Timestamp created
  2: optional string by
}
"#;

const ACCOUNTS: &str = r#"
include "shared/base.thrift"
struct Account {
  1: required i64 id
  2: base.Status status = base.Status.ACTIVE
  3: optional base.Audit audit
  4: list<Account> linked
}
"#;

fn account_files() -> Vec<SchemaFile> {
    vec![file("shared/base.thrift", BASE), file("accounts.thrift", ACCOUNTS)]
}

#[test]
fn names_are_qualified_by_module_across_includes() {
    let r = link(account_files()).unwrap();
    let account = r.struct_spec("accounts.Account").unwrap();
    assert_eq!(account.kind, StructKind::Struct);
    assert_eq!(account.fields[1].type_spec, named(TypeSpec::Enum, "base.Status"));
    assert_eq!(account.fields[2].type_spec, named(TypeSpec::Struct, "base.Audit"));
    assert_eq!(account.fields[3].type_spec, TypeSpec::list(named(TypeSpec::Struct, "accounts.Account")));

    let audit = r.struct_spec("base.Audit").unwrap();
    assert_eq!(audit.fields[0].type_spec, named(TypeSpec::Typedef, "base.Timestamp"));
    assert_eq!(r.canonical(&audit.fields[0].type_spec).unwrap(), &TypeSpec::I64);
}

#[test]
fn file_order_does_not_matter() {
    let mut files = account_files();
    files.reverse();
    let reversed = link(files).unwrap();
    let forward = link(account_files()).unwrap();
    for name in ["accounts.Account", "base.Audit"] {
        assert_eq!(reversed.struct_spec(name).unwrap(), forward.struct_spec(name).unwrap());
    }
    assert_eq!(reversed.types().count(), forward.types().count());
}

#[test]
fn linking_is_idempotent() {
    let files = account_files();
    let first = link(files.clone()).unwrap();
    let second = link(files).unwrap();
    assert_eq!(first, second);
}

#[test]
fn enum_members_auto_increment() {
    let r = link(account_files()).unwrap();
    let status = r.enum_spec("base.Status").unwrap();
    let values: Vec<(&str, i32)> = status.members.iter().map(|m| (m.name.as_str(), m.value)).collect();
    assert_eq!(values, vec![("ACTIVE", 1), ("DISABLED", 2)]);
}

#[test]
fn enum_default_is_tagged_with_member_name() {
    let r = link(account_files()).unwrap();
    let status = &r.struct_spec("accounts.Account").unwrap().fields[1];
    let default = status.default_value.as_ref().and_then(Value::as_enum).unwrap();
    assert_eq!(default.value, 1);
    assert_eq!(default.name.as_deref(), Some("ACTIVE"));
}

#[test]
fn recursive_struct_through_list_links() {
    let r = link_one("tree.thrift", "struct Node { 1: i32 value; 2: list<Node> children }").unwrap();
    let node = r.struct_spec("tree.Node").unwrap();
    assert_eq!(node.fields[1].type_spec, TypeSpec::list(named(TypeSpec::Struct, "tree.Node")));
}

#[test]
fn direct_self_reference_links() {
    assert!(link_one("ll.thrift", "struct Link { 1: optional Link next; 2: i32 v }").is_ok());
}

#[test]
fn typedef_cycle_is_rejected() {
    let err = link_one("t.thrift", "typedef A B\ntypedef B A").unwrap_err();
    match err {
        SchemaError::IllegalTypedefCycle { cycle, file, .. } => {
            assert_eq!(file, "t.thrift");
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"t.A".to_string()));
            assert!(cycle.contains(&"t.B".to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn self_typedef_is_a_cycle() {
    assert!(matches!(
        link_one("t.thrift", "typedef Loop Loop").unwrap_err(),
        SchemaError::IllegalTypedefCycle { .. }
    ));
}

#[test]
fn unresolved_reference_names_the_type() {
    let err = link_one("u.thrift", "struct S {\n  1: Missing m\n}").unwrap_err();
    match err {
        SchemaError::UnresolvedReference { name, file, span } => {
            assert_eq!(name, "Missing");
            assert_eq!(file, "u.thrift");
            assert_eq!(span.line, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn names_from_files_not_included_are_invisible() {
    let files = vec![file("a.thrift", "struct A { 1: i32 x }"), file("b.thrift", "struct B { 1: a.A a }")];
    assert!(matches!(link(files).unwrap_err(), SchemaError::UnresolvedReference { .. }));
}

#[test]
fn includes_are_transitive() {
    let files = vec![
        file("a.thrift", "struct A { 1: i32 x }"),
        file("b.thrift", "include \"a.thrift\"\nstruct B { 1: a.A a }"),
        file("c.thrift", "include \"b.thrift\"\nstruct C { 1: a.A a; 2: b.B b }"),
    ];
    let r = link(files).unwrap();
    assert_eq!(r.struct_spec("c.C").unwrap().fields[0].type_spec, named(TypeSpec::Struct, "a.A"));
}

#[test]
fn unresolved_include() {
    let err = link_one("a.thrift", "include \"gone.thrift\"").unwrap_err();
    assert!(matches!(err, SchemaError::UnresolvedInclude { include, .. } if include == "gone.thrift"));
}

#[test]
fn duplicate_definition() {
    let err = link_one("d.thrift", "struct X { 1: i32 a }\nenum X { A }").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateDefinition { name, .. } if name == "X"));
}

#[test]
fn declared_names_cannot_be_dotted() {
    let err = parse("struct Svc.ping_args { 1: required string user_field }", "m.thrift").unwrap_err();
    assert_eq!(err.line, 1);
    assert!(parse("struct S { 1: i32 a.b }", "m.thrift").is_err());
    assert!(parse("enum E { A.B }", "m.thrift").is_err());
}

fn with_renamed_struct(source: &str, index: usize, name: &str) -> SchemaFile {
    let mut f = file("m.thrift", source);
    match &mut f.definitions[index] {
        idlwire::ast::Definition::Struct(s) => s.name = name.to_string(),
        other => panic!("unexpected {:?}", other),
    }
    f
}

#[test]
fn struct_colliding_with_method_args_is_a_duplicate() {
    let struct_first = with_renamed_struct(
        "struct Placeholder { 1: required string user_field }\nservice Svc { void ping(1: i32 a) }",
        0,
        "Svc.ping_args",
    );
    let err = link(vec![struct_first]).unwrap_err();
    assert!(matches!(&err, SchemaError::DuplicateDefinition { name, .. } if name == "m.Svc.ping_args"), "{:?}", err);

    let service_first = with_renamed_struct(
        "service Svc { i32 ping(1: i32 a) }\nstruct Placeholder { 1: optional string user_field }",
        1,
        "Svc.ping_result",
    );
    let err = link(vec![service_first]).unwrap_err();
    assert!(matches!(&err, SchemaError::DuplicateDefinition { name, .. } if name == "m.Svc.ping_result"), "{:?}", err);
}

#[test]
fn duplicate_field_id() {
    let err = link_one("d.thrift", "struct X { 1: i32 a; 1: i32 b }").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateFieldId { id: 1, owner, .. } if owner == "d.X"));
}

#[test]
fn duplicate_enum_member() {
    let err = link_one("d.thrift", "enum E { A, B, A }").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateEnumMember { member, .. } if member == "A"));
}

#[test]
fn field_of_service_type_is_invalid() {
    let err = link_one("s.thrift", "service Svc {}\nstruct S { 1: Svc s }").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference { expected: "a type", .. }));
}

#[test]
fn throws_must_name_an_exception() {
    let err = link_one("s.thrift", "struct NotErr {}\nservice Svc { void f() throws (1: NotErr e) }").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference { expected: "an exception", .. }));
}

#[test]
fn oneway_must_be_void() {
    let err = link_one("s.thrift", "service Svc { oneway i32 f() }").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference { .. }));
}

#[test]
fn extends_must_name_a_service() {
    let err = link_one("s.thrift", "struct Base {}\nservice Svc extends Base {}").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference { expected: "a service", .. }));
}

#[test]
fn union_fields_are_optional() {
    let r = link_one("u.thrift", "union Shape { 1: required double circle; 2: double square }").unwrap();
    let shape = r.union_spec("u.Shape").unwrap();
    assert!(shape.fields.iter().all(|f| f.requiredness == Requiredness::Optional));
    assert_eq!(shape.field_by_name("square").map(|f| f.id), Some(2));
    assert!(shape.field_by_name("triangle").is_none());
}

const CONSTS: &str = r#"
enum Level { LOW, HIGH = 10 }
struct Limits { 1: required i32 max; 2: optional string unit }
const i32 MAX = 100
const i64 BIG = 0x7fffffff
const double RATIO = 0.5
const bool ON = true
const bool OFF = 0
const string NAME = "limits"
const Level DEFAULT_LEVEL = Level.HIGH
const i32 ALIAS = MAX
const list<i16> PRIMES = [2, 3, 5, 7]
const set<string> TAGS = ["b", "a", "b"]
const map<string, Level> LEVELS = { "low": Level.LOW, "high": 10 }
const Limits DEFAULT_LIMITS = { "max": MAX, "unit": "ms" }
"#;

#[test]
fn constants_are_typed() {
    let r = link_one("c.thrift", CONSTS).unwrap();
    assert_eq!(r.constant("c.MAX").unwrap(), &Value::I32(100));
    assert_eq!(r.constant("c.BIG").unwrap(), &Value::I64(0x7fff_ffff));
    assert_eq!(r.constant("c.RATIO").unwrap(), &Value::Double(0.5));
    assert_eq!(r.constant("c.ON").unwrap(), &Value::Bool(true));
    assert_eq!(r.constant("c.OFF").unwrap(), &Value::Bool(false));
    assert_eq!(r.constant("c.ON").unwrap().as_bool(), Some(true));
    assert_eq!(r.constant("c.RATIO").unwrap().as_f64(), Some(0.5));
    let limits = r.struct_spec("c.Limits").unwrap();
    assert_eq!(limits.field_by_name("unit").map(|f| f.requiredness), Some(Requiredness::Optional));
    assert_eq!(limits.field_by_name("max").map(|f| f.id), Some(1));
    assert_eq!(r.constant("c.NAME").unwrap(), &Value::String("limits".into()));
    assert_eq!(r.constant("c.DEFAULT_LEVEL").unwrap().as_enum().unwrap().value, 10);
    assert_eq!(r.constant("c.ALIAS").unwrap(), &Value::I32(100));
    assert_eq!(
        r.constant("c.PRIMES").unwrap(),
        &Value::List(vec![Value::I16(2), Value::I16(3), Value::I16(5), Value::I16(7)])
    );
    assert_eq!(r.constant("c.TAGS").unwrap().as_set().unwrap().len(), 2);
    let levels = r.constant("c.LEVELS").unwrap().as_map().unwrap();
    assert_eq!(levels.get(&Value::from("high")).and_then(Value::as_enum).map(|e| e.value), Some(10));

    let limits = r.constant("c.DEFAULT_LIMITS").unwrap().as_struct().unwrap();
    assert_eq!(limits.get(1), Some(&Value::I32(100)));
    assert_eq!(limits.get(2), Some(&Value::String("ms".into())));
    assert_eq!(r.constant_spec("c.DEFAULT_LIMITS").unwrap().type_spec, named(TypeSpec::Struct, "c.Limits"));
}

#[test]
fn constant_out_of_range() {
    let err = link_one("c.thrift", "const byte B = 300").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidConstant { name, .. } if name == "c.B"));
}

#[test]
fn constant_of_wrong_shape() {
    assert!(matches!(
        link_one("c.thrift", "const i32 X = \"text\"").unwrap_err(),
        SchemaError::InvalidConstant { .. }
    ));
}

#[test]
fn struct_constant_missing_required_field() {
    let err = link_one("c.thrift", "struct P { 1: required i32 x }\nconst P ORIGIN = {}").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidConstant { .. }));
}

#[test]
fn cyclic_constants() {
    let err = link_one("c.thrift", "const i32 A = B\nconst i32 B = A").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidConstant { .. }));
}

#[test]
fn unknown_enum_member_in_constant() {
    let err = link_one("c.thrift", "enum E { A }\nconst E X = E.NOPE").unwrap_err();
    assert!(matches!(err, SchemaError::InvalidConstant { .. }));
}

#[test]
fn field_defaults_are_linked() {
    let r = link_one("d.thrift", "const i32 TEN = 10\nstruct S { 1: i32 a = TEN; 2: string b = \"x\"; 3: optional list<i32> c = [1] }").unwrap();
    let s = r.struct_spec("d.S").unwrap();
    assert_eq!(s.fields[0].default_value, Some(Value::I32(10)));
    assert_eq!(s.fields[1].default_value, Some(Value::String("x".into())));
    assert_eq!(s.fields[2].default_value, Some(Value::List(vec![Value::I32(1)])));
}

const SERVICES: &str = r#"
exception NotFound { 1: string key }
service Base {
  string ping()
}
service Store extends Base {
  binary get(1: required string key, 2: i32 version = 1) throws (1: NotFound missing)
  void put(1: string key, 2: binary data)
  oneway void forget(1: string key)
}
"#;

#[test]
fn services_get_args_and_result_structs() {
    let r = link_one("kv.thrift", SERVICES).unwrap();
    let store = r.service("kv.Store").unwrap();
    assert_eq!(store.parent.as_deref(), Some("kv.Base"));

    let get = store.method("get").unwrap();
    assert_eq!(&*get.args_struct, "kv.Store.get_args");
    assert_eq!(get.result_struct.as_deref(), Some("kv.Store.get_result"));
    assert_eq!(get.arguments[1].default_value, Some(Value::I32(1)));

    let args = r.struct_spec("kv.Store.get_args").unwrap();
    assert_eq!(args.fields.len(), 2);
    assert!(args.fields[0].is_required());
    assert_eq!(args.fields[1].default_value, Some(Value::I32(1)));

    let result = r.struct_spec("kv.Store.get_result").unwrap();
    let ids: Vec<(i16, &str)> = result.fields.iter().map(|f| (f.id, f.name.as_str())).collect();
    assert_eq!(ids, vec![(0, "success"), (1, "missing")]);
    assert!(result.fields.iter().all(|f| f.requiredness == Requiredness::Optional));
    assert_eq!(result.fields[0].type_spec, TypeSpec::Binary);

    let put_result = r.struct_spec("kv.Store.put_result").unwrap();
    assert!(put_result.fields.is_empty());

    let forget = store.method("forget").unwrap();
    assert!(forget.oneway);
    assert_eq!(forget.result_struct, None);
    assert!(r.named("kv.Store.forget_result").is_none());
}

#[test]
fn methods_are_found_through_extends() {
    let r = link_one("kv.thrift", SERVICES).unwrap();
    let (owner, ping) = r.find_method("kv.Store", "ping").unwrap();
    assert_eq!(&*owner.name, "kv.Base");
    assert_eq!(ping.return_type, Some(TypeSpec::String));
    assert!(r.find_method("kv.Store", "nope").is_err());
}

#[test]
fn duplicate_method_names() {
    let err = link_one("s.thrift", "service S { void a(); void a() }").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateDefinition { .. }));
}

#[test]
fn registry_lists_everything_in_link_order() {
    let r = link(account_files()).unwrap();
    let names: Vec<&str> = r.types().map(|t| &**t.name()).collect();
    assert!(names.contains(&"base.Status"));
    assert!(names.contains(&"accounts.Account"));
    assert!(r.types().any(|t| matches!(t, NamedType::Typedef(td) if &*td.name == "base.Timestamp")));
    assert_eq!(r.services().count(), 0);
}
