#![no_main]

use arbitrary::Arbitrary;
use dcf_core::value::{PropMap, PropValue};
use dcf_render::prop_diff::{diff, wire_props};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<u8>),
}

impl Value {
    fn into_prop(self) -> PropValue {
        match self {
            Self::Null => PropValue::Null,
            Self::Bool(b) => PropValue::Bool(b),
            Self::Int(i) => PropValue::Int(i),
            Self::Float(f) => PropValue::Float(f),
            Self::Str(s) => PropValue::Str(s),
            Self::List(items) => {
                PropValue::List(items.into_iter().map(|b| PropValue::Int(i64::from(b))).collect())
            }
        }
    }
}

fn props(entries: Vec<(u8, Value)>) -> PropMap {
    entries
        .into_iter()
        .map(|(k, v)| (format!("p{}", k % 8), v.into_prop()))
        .collect()
}

fuzz_target!(|input: (Vec<(u8, Value)>, Vec<(u8, Value)>)| {
    let (old, new) = (props(input.0), props(input.1));
    let patch = diff(&old, &new);
    if old == new {
        assert!(patch.is_empty());
    }

    let (set, removed) = patch.to_wire();
    let mut native = wire_props(&old);
    for key in &removed {
        assert!(!new.contains_key(key));
        native.remove(key);
    }
    native.extend(set);
    assert_eq!(native, wire_props(&new));
});
