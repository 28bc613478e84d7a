use lunaris_state::{BridgeError, HostReturn, LuaValue};

use super::helpers::*;

#[test]
fn test_three_results_in_order() {
    let lua = new_state();
    let f = lua.load("return 'a', 2, 3.5", "three").unwrap();
    let depth = lua.get_top();
    let r = f.call_multi([]).unwrap();
    assert_eq!(r.len(), 3);
    assert_str(&r, 0, "a");
    assert_int(&r, 1, 2);
    assert_float(&r, 2, 3.5);
    assert_eq!(lua.get_top(), depth);
}

#[test]
fn test_arguments_are_passed_in_order() {
    let lua = new_state();
    let f = lua.load("local a, b, c = ... ; return c, b, a", "rev").unwrap();
    let r = f.call_multi([1.into(), "two".into(), LuaValue::Nil]).unwrap();
    assert_nil(&r, 0);
    assert_str(&r, 1, "two");
    assert_int(&r, 2, 1);
}

#[test]
fn test_runtime_error_keeps_depth() {
    let lua = new_state();
    lua.push(&LuaValue::Integer(7)).unwrap();
    let f = lua.load("local t = nil ; return t.x", "index").unwrap();
    let err = f.call([]).unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(_)));
    assert!(err.to_string().contains("attempt to index"), "{err}");
    assert_eq!(lua.get_top(), 1);
    assert_eq!(lua.pop_value(), LuaValue::Integer(7));
}

#[test]
fn test_script_catches_host_error() {
    let lua = new_state();
    let fail = lua
        .create_function(|_, _| Err(BridgeError::Runtime("host says no".into())))
        .unwrap();
    lua.set_global("fail", fail).unwrap();
    let r = lua
        .run_string("local ok, msg = pcall(fail) ; return ok, msg", "catch")
        .unwrap();
    assert_bool(&r, 0, false);
    assert!(r[1].as_str().unwrap().contains("host says no"));
}

#[test]
fn test_host_function_reenters() {
    let lua = new_state();
    let apply = lua
        .create_function(|_, args| {
            let f = args[0].as_function()?;
            let x = f.call([args[1].clone()])?;
            Ok(HostReturn::single(x.to_integer() + 1))
        })
        .unwrap();
    lua.set_global("apply", apply).unwrap();
    run_check_ints_with(&lua, "return apply(function(x) return x * 10 end, 4)", &[41]);
}

#[test]
fn test_global_call_variants() {
    let lua = new_state();
    lua.run_string("function pair(a) return a, a * 2 end", "def").unwrap();
    assert_eq!(lua.global_call("pair", [5.into()]).unwrap(), LuaValue::Integer(5));
    assert_eq!(
        lua.global_call_multi("pair", [5.into()]).unwrap(),
        vec![LuaValue::Integer(5), LuaValue::Integer(10)]
    );
    assert!(lua.global_call("undefined_fn", []).unwrap().is_nil());
    assert_eq!(
        lua.resolve_global("string.upper").unwrap().call(["abc".into()]).unwrap(),
        LuaValue::from("ABC")
    );
}

#[test]
fn test_strict_function_handle() {
    assert!(matches!(
        LuaValue::Integer(1).as_function(),
        Err(BridgeError::TypeMismatch { .. })
    ));
}

fn run_check_ints_with(lua: &lunaris_state::LuaState, source: &str, expected: &[i64]) {
    let r = lua.run_string(source, "check").unwrap();
    assert_eq!(r.len(), expected.len());
    for (i, &exp) in expected.iter().enumerate() {
        assert_int(&r, i, exp);
    }
}
