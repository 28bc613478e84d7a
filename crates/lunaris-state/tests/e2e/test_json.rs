use lunaris_state::{BridgeError, CodecError, LuaValue};
use serde_json::json;

use super::helpers::*;

#[test]
fn test_nested_table_round_trip() {
    let lua = new_state();
    let v = lua
        .run_string(
            "return { id = 7, tags = { 'a', 'b' }, pos = { x = 1.5, y = -2 }, on = true }",
            "doc",
        )
        .unwrap()
        .remove(0);
    let encoded = v.to_json().unwrap();
    assert_eq!(
        encoded,
        json!({ "id": 7, "tags": ["a", "b"], "pos": { "x": 1.5, "y": -2 }, "on": true })
    );
    let decoded = lua.value_from_json(&encoded).unwrap();
    assert_eq!(decoded.to_json().unwrap(), encoded);
}

#[test]
fn test_string_round_trip() {
    let lua = new_state();
    let text = r#"{"list":[1,2,3],"name":"x"}"#;
    let v = lua.value_from_json_str(text).unwrap();
    assert_eq!(v.get_field("list").unwrap().length().unwrap(), 3);
    assert_eq!(v.to_json_string().unwrap(), text);
}

#[test]
fn test_reference_variants_refuse_to_encode() {
    let (r, _lua) = run_with_state("return print, coroutine.create(print), io.stdout");
    for v in &r {
        assert!(
            matches!(v.to_json(), Err(BridgeError::Codec(CodecError::Unsupported(_)))),
            "{v:?} encoded"
        );
    }
}

#[test]
fn test_host_object_refuses_to_encode() {
    let lua = new_state();
    let obj = LuaValue::object(super::test_host_object::Counter::default());
    let t = lua.table_pack([obj.clone()]).unwrap();
    assert!(obj.to_json().is_err());
    assert!(LuaValue::Table(t).to_json().is_err());
}

#[test]
fn test_sparse_table_is_object() {
    let (r, _lua) = run_with_state("return { [2] = 'b' }");
    assert_eq!(r[0].to_json().unwrap(), json!({ "2": "b" }));
}
