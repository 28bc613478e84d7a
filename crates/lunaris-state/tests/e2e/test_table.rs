use lunaris_state::{BridgeError, LuaValue};

use super::helpers::*;

// ---- unpack / range ----

#[test]
fn test_unpack_stops_at_first_hole() {
    let (r, _lua) = run_with_state("return {10, 20, nil, 40}");
    let items = r[0].unpack().unwrap();
    assert_eq!(items, vec![LuaValue::Integer(10), LuaValue::Integer(20)]);
}

#[test]
fn test_unpack_on_non_table_is_empty() {
    assert!(LuaValue::Integer(1).unpack().unwrap().is_empty());
    assert!(LuaValue::Nil.pairs().unwrap().is_empty());
}

#[test]
fn test_range_includes_nils() {
    let (r, _lua) = run_with_state("return {1, nil, 3}");
    let items = r[0].range(1, 4).unwrap();
    assert_eq!(items.len(), 4);
    assert_int(&items, 0, 1);
    assert_nil(&items, 1);
    assert_int(&items, 2, 3);
    assert_nil(&items, 3);
}

#[test]
fn test_merge_unpack() {
    let (r, _lua) = run_with_state("return {1, 2}, {3}");
    let merged = LuaValue::merge_unpack(&r[0], &r[1]).unwrap();
    assert_eq!(
        merged,
        vec![LuaValue::Integer(1), LuaValue::Integer(2), LuaValue::Integer(3)]
    );
}

// ---- indexing ----

#[test]
fn test_index_honors_metamethods() {
    let (r, _lua) = run_with_state(
        "return setmetatable({}, { __index = function(_, k) return k .. '!' end })",
    );
    assert_eq!(r[0].get_field("hey").unwrap(), LuaValue::from("hey!"));
    assert!(r[0].as_table().unwrap().raw_get("hey").unwrap().is_nil());
}

#[test]
fn test_newindex_error_is_runtime() {
    let (r, lua) = run_with_state(
        "return setmetatable({}, { __newindex = function() error('read only') end })",
    );
    let t = r[0].as_table().unwrap();
    let err = t.set_field("x", 1).unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(ref m) if m.contains("read only")));
    assert_eq!(lua.get_top(), 0);
}

#[test]
fn test_set_on_non_table_is_noop() {
    let v = LuaValue::from("text");
    v.set_field("x", 1).unwrap();
    assert!(v.get_field("x").unwrap().is_nil());
}

#[test]
fn test_length() {
    let (r, _lua) = run_with_state("return {1, 2, 3}, 'four', setmetatable({}, { __len = function() return 9 end })");
    assert_eq!(r[0].length().unwrap(), 3);
    assert_eq!(r[1].length().unwrap(), 4);
    assert_eq!(r[2].length().unwrap(), 9);
}

// ---- iteration ----

#[test]
fn test_pairs_sees_every_entry() {
    let (r, _lua) = run_with_state("return { a = 1, b = 2, 30 }");
    let mut keys: Vec<String> = r[0].keys().unwrap().iter().map(|k| k.to_string()).collect();
    keys.sort();
    assert_eq!(keys, vec!["1", "a", "b"]);
    let sum: i64 = r[0].values().unwrap().iter().map(LuaValue::to_integer).sum();
    assert_eq!(sum, 33);
}

// ---- metatables and shapes ----

#[test]
fn test_metatable_round_trip() {
    let lua = new_state();
    let t = LuaValue::Table(lua.create_table().unwrap());
    let mt = LuaValue::Table(lua.create_table().unwrap());
    assert!(t.set_metatable(&mt).unwrap());
    assert_eq!(t.get_metatable().unwrap(), mt);
    assert!(!LuaValue::Integer(1).set_metatable(&mt).unwrap());
    assert!(LuaValue::Integer(1).get_metatable().unwrap().is_nil());
}

#[test]
fn test_implements_schema() {
    let (r, _lua) = run_with_state(
        "return { name = 'a', size = 3, extra = true }, { name = '', size = 0 }, { name = 0 }",
    );
    assert!(r[0].implements(&r[1]).unwrap());
    assert!(!r[0].implements(&r[2]).unwrap());
    assert!(r[0].implements_any(&[r[2].clone(), r[1].clone()]).unwrap());
    assert!(!r[0].implements_all(&[r[1].clone(), r[2].clone()]).unwrap());
}

#[test]
fn test_vector_conversion() {
    let (r, lua) = run_with_state("return { x = 1, y = 2, z = 3 }, { 4, 5, 6 }");
    assert_eq!(r[0].to_vector().unwrap(), [1.0, 2.0, 3.0]);
    assert_eq!(r[1].to_vector().unwrap(), [4.0, 5.0, 6.0]);
    assert_eq!(r[0].detect_shape().unwrap().map(|s| s.name), Some("vector"));

    let v = lua.vector_to_value([7.0, 8.0, 9.0]).unwrap();
    assert_eq!(v.to_vector().unwrap(), [7.0, 8.0, 9.0]);
    assert!(LuaValue::Nil.to_vector().unwrap()[0].is_nan());
}
