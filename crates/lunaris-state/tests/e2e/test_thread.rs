use lunaris_state::{BridgeError, LuaValue, ThreadStatus};

use super::helpers::*;

#[test]
fn test_generator_runs_to_completion() {
    let lua = new_state();
    let body = lua
        .load("for i = 1, 3 do coroutine.yield(i) end ; return 'done'", "gen")
        .unwrap();
    let co = lua.create_thread(&body).unwrap();
    let mut seen = Vec::new();
    while co.status().unwrap() == ThreadStatus::Suspended {
        seen.extend(co.resume([]).unwrap());
    }
    assert_eq!(
        seen,
        vec![
            LuaValue::Integer(1),
            LuaValue::Integer(2),
            LuaValue::Integer(3),
            LuaValue::from("done"),
        ]
    );
    assert_eq!(lua.get_top(), 0);
}

#[test]
fn test_resume_dead_is_runtime_error() {
    let lua = new_state();
    let body = lua.load("return", "empty").unwrap();
    let co = lua.create_thread(&body).unwrap();
    co.resume([]).unwrap();
    assert_eq!(co.status().unwrap(), ThreadStatus::Dead);
    assert!(matches!(co.resume([]), Err(BridgeError::Runtime(_))));
}

#[test]
fn test_host_yield_passes_values_both_ways() {
    let lua = new_state();
    let ask = lua
        .create_function(|ctx, args| Ok(ctx.yield_values(args)))
        .unwrap();
    lua.set_global("ask", ask).unwrap();
    let body = lua
        .load("local a = ask('first') ; local b = ask('second', a) ; return a + b", "dialog")
        .unwrap();
    let co = lua.create_thread(&body).unwrap();

    let r = co.resume([]).unwrap();
    assert_str(&r, 0, "first");
    let r = co.resume([10.into()]).unwrap();
    assert_str(&r, 0, "second");
    assert_int(&r, 1, 10);
    let r = co.resume([5.into()]).unwrap();
    assert_int(&r, 0, 15);
    assert_eq!(co.status().unwrap(), ThreadStatus::Dead);
}

#[test]
fn test_nested_coroutine_is_normal() {
    let lua = new_state();
    let r = lua
        .run_string(
            "local outer ; outer = coroutine.create(function() \
                 local inner = coroutine.create(function() return coroutine.status(outer) end) \
                 return select(2, coroutine.resume(inner)) \
             end) \
             return outer",
            "nest",
        )
        .unwrap();
    let outer = r[0].as_thread().unwrap();
    let out = outer.resume([]).unwrap();
    assert_str(&out, 0, "normal");
}

#[test]
fn test_thread_value_fail_soft() {
    assert!(LuaValue::Integer(1).resume([]).unwrap().is_empty());
    assert!(LuaValue::Nil.thread_status().unwrap().is_none());
}

#[test]
fn test_script_created_thread() {
    let (r, _lua) = run_with_state("return coroutine.create(function(x) return x * 2 end)");
    assert_eq!(r[0].thread_status().unwrap(), Some(ThreadStatus::Suspended));
    let out = r[0].resume([21.into()]).unwrap();
    assert_int(&out, 0, 42);
}
