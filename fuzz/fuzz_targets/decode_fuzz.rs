//! Decoder fuzz target: decode arbitrary bytes against a fixed recursive schema.
//! Decoding must not panic or allocate unboundedly; whatever decodes must re-encode.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
enum Kind { A, B }
union Leaf { 1: string text; 2: binary raw; 3: double num }
struct Node {
  1: required i32 id
  2: optional Kind kind
  3: list<Node> children
  4: map<string, Leaf> leaves
  5: set<i64> tags
  6: optional bool flag
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let file = match idlwire::parse(SCHEMA, "fuzz.thrift") {
        Ok(f) => f,
        Err(_) => return,
    };
    let registry = match idlwire::link(vec![file]) {
        Ok(r) => r,
        Err(_) => return,
    };
    let spec = match registry.resolve("fuzz.Node") {
        Ok(s) => s,
        Err(_) => return,
    };
    if let Ok(value) = idlwire::decode(&registry, data, &spec) {
        assert!(idlwire::encode(&registry, &value, &spec).is_ok());
    }
    let _ = idlwire::skip::value_extent(data, idlwire::TType::Struct);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
