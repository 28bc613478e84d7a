#![allow(dead_code)]

use lunaris_state::{LuaState, LuaValue};

/// Fresh instance with the standard libraries open.
pub fn new_state() -> LuaState {
    LuaState::new().unwrap_or_else(|e| panic!("cannot create state: {e}"))
}

/// Run Lua source on a fresh instance, returning the results together with
/// the instance that owns them.
pub fn run_with_state(source: &str) -> (Vec<LuaValue>, LuaState) {
    let lua = new_state();
    let results = lua
        .run_string(source, "test")
        .unwrap_or_else(|e| panic!("runtime error: {e}"));
    (results, lua)
}

/// Run Lua source, keeping only self-contained results meaningful.
pub fn run_lua(source: &str) -> Vec<LuaValue> {
    run_with_state(source).0
}

/// Run Lua source, expecting an error.
pub fn run_lua_err(source: &str) -> String {
    let lua = new_state();
    match lua.run_string(source, "test") {
        Err(e) => format!("{e}"),
        Ok(vals) => panic!("expected error, got {} results: {:?}", vals.len(), vals),
    }
}

/// Check that results[idx] is an integer with the expected value.
pub fn assert_int(results: &[LuaValue], idx: usize, expected: i64) {
    let val = &results[idx];
    let got = val
        .as_integer()
        .unwrap_or_else(|| panic!("result[{idx}] = {:?}, expected integer {expected}", val));
    assert_eq!(got, expected, "result[{idx}] = {got}, expected {expected}");
}

/// Check that results[idx] is a float with the expected value.
pub fn assert_float(results: &[LuaValue], idx: usize, expected: f64) {
    let val = &results[idx];
    let got = val
        .as_float()
        .unwrap_or_else(|| panic!("result[{idx}] = {:?}, expected float {expected}", val));
    assert!(
        (got - expected).abs() < 1e-10,
        "result[{idx}] = {got}, expected {expected}"
    );
}

pub fn assert_bool(results: &[LuaValue], idx: usize, expected: bool) {
    let val = &results[idx];
    let got = val
        .as_boolean()
        .unwrap_or_else(|| panic!("result[{idx}] = {:?}, expected bool {expected}", val));
    assert_eq!(got, expected, "result[{idx}] = {got}, expected {expected}");
}

pub fn assert_nil(results: &[LuaValue], idx: usize) {
    let val = &results[idx];
    assert!(val.is_nil(), "result[{idx}] = {:?}, expected nil", val);
}

pub fn assert_str(results: &[LuaValue], idx: usize, expected: &str) {
    let val = &results[idx];
    let got = val
        .as_str()
        .unwrap_or_else(|| panic!("result[{idx}] = {:?}, expected string \"{expected}\"", val));
    assert_eq!(got, expected, "result[{idx}] = \"{got}\", expected \"{expected}\"");
}

/// Run Lua source and check results against expected integer values.
pub fn run_check_ints(source: &str, expected: &[i64]) {
    let results = run_lua(source);
    assert_eq!(
        results.len(),
        expected.len(),
        "expected {} results, got {}",
        expected.len(),
        results.len()
    );
    for (i, &exp) in expected.iter().enumerate() {
        assert_int(&results, i, exp);
    }
}
