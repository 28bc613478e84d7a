use lunaris_state::{LuaValue, ValueType};

use super::helpers::*;

// ---- scalars cross the boundary by value ----

#[test]
fn test_integer_and_float_stay_distinct() {
    let r = run_lua("return 3, 3.0, 2^53, 7 // 2, 7 / 2");
    assert_int(&r, 0, 3);
    assert_float(&r, 1, 3.0);
    assert_float(&r, 2, 9007199254740992.0);
    assert_int(&r, 3, 3);
    assert_float(&r, 4, 3.5);
}

#[test]
fn test_strings_keep_raw_bytes() {
    let r = run_lua(r#"return "a\0b", "\xff\xfe", """#);
    assert_eq!(r[0].as_bytes(), Some(&b"a\0b"[..]));
    assert_eq!(r[1].as_bytes(), Some(&[0xff, 0xfe][..]));
    assert!(r[1].as_str().is_none());
    assert_str(&r, 2, "");
}

#[test]
fn test_nil_and_booleans() {
    let r = run_lua("return nil, true, false");
    assert_nil(&r, 0);
    assert_bool(&r, 1, true);
    assert_bool(&r, 2, false);
}

#[test]
fn test_value_types() {
    let (r, _lua) = run_with_state(
        "return {}, print, coroutine.create(function() end), io.stdout, 1, 's'",
    );
    let types: Vec<ValueType> = r.iter().map(LuaValue::value_type).collect();
    assert_eq!(
        types,
        vec![
            ValueType::Table,
            ValueType::Function,
            ValueType::Thread,
            ValueType::UserData,
            ValueType::Integer,
            ValueType::String,
        ]
    );
    assert!(r[..4].iter().all(LuaValue::is_instance_bound));
    assert!(!r[4].is_instance_bound());
}

// ---- coercions ----

#[test]
fn test_coercions_follow_lua_rules() {
    let r = run_lua("return '0x10', ' 12 ', '1e2', 'abc', 2.9, -2.9");
    assert_eq!(r[0].to_integer(), 16);
    assert_eq!(r[1].to_integer(), 12);
    assert_eq!(r[2].to_float(), 100.0);
    assert_eq!(r[3].to_integer(), 0);
    assert_eq!(r[4].to_integer(), 2);
    assert_eq!(r[5].to_integer(), -2);
}

#[test]
fn test_truthiness() {
    let r = run_lua("return 0, '', nil, false");
    assert!(r[0].to_bool());
    assert!(r[1].to_bool());
    assert!(!r[2].to_bool());
    assert!(!r[3].to_bool());
}

#[test]
fn test_display_matches_tostring() {
    let lua = new_state();
    for src in ["1", "1.5", "1e100", "-0.0", "2^63", "'x'", "true", "nil"] {
        let expected = lua
            .run_string(format!("return tostring({src})"), "tostring")
            .unwrap()
            .remove(0);
        let value = lua.run_string(format!("return {src}"), "value").unwrap().remove(0);
        assert_eq!(Some(value.to_string().as_str()), expected.as_str(), "{src}");
    }
}

// ---- push/pop ----

#[test]
fn test_push_then_read_back_table() {
    let lua = new_state();
    let t = lua.table_pack([1.into(), 2.into()]).unwrap();
    lua.push(&LuaValue::Table(t.clone())).unwrap();
    let first = lua.to_value(-1);
    let second = lua.pop_value();
    assert_eq!(first, second);
    assert_eq!(first.as_table().unwrap(), &t);
    assert_eq!(lua.get_top(), 0);
}

#[test]
fn test_global_round_trip_preserves_identity() {
    let lua = new_state();
    let f = lua.load("return 1", "f").unwrap();
    lua.set_global("f", f.clone()).unwrap();
    let back = lua.get_global("f").unwrap();
    assert_eq!(back.as_function().unwrap(), &f);
    assert_eq!(back.to_pointer(), f.to_pointer());
}
