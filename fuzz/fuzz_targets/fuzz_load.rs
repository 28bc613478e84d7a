#![no_main]

use libfuzzer_sys::fuzz_target;
use lunaris_state::{LuaState, LuaValue};

fuzz_target!(|data: &[u8]| {
    // Compile only; running arbitrary scripts could loop forever.
    let Ok(lua) = LuaState::new() else { return };
    let _ = lua.load(data, "fuzz");
    let _ = lua.value_from_json_str(&String::from_utf8_lossy(data));
    if let Ok(v) = LuaValue::from_utf8(data) {
        let _ = v.to_json_string();
    }
    assert_eq!(lua.get_top(), 0);
});
