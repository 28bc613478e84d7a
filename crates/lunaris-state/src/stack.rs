//! Marshalling between the native stack and [`LuaValue`].
//!
//! Scalars and strings are copied out of their slot. Tables, functions,
//! threads and full userdata are anchored in the registry with `luaL_ref`
//! and come back as handles carrying the key. Nothing outside this module
//! retains a stack position.

use std::ffi::{c_int, c_void, CStr};
use std::ptr;

use mlua_sys as ffi;
use tracing::{error, trace};

use crate::error::{BridgeError, Result};
use crate::host;
use crate::reference::{LuaFunction, LuaRef, LuaTable, LuaThread, LuaUserData};
use crate::state::LuaState;
use crate::value::{LuaValue, ValueType};

/// Restores the stack top it was created with when dropped.
pub(crate) struct StackGuard {
    l: *mut ffi::lua_State,
    top: c_int,
}

impl StackGuard {
    pub(crate) unsafe fn new(l: *mut ffi::lua_State) -> Self {
        StackGuard {
            l,
            top: ffi::lua_gettop(l),
        }
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        unsafe { ffi::lua_settop(self.l, self.top) }
    }
}

/// Make room for `n` more slots.
pub(crate) unsafe fn check_stack(l: *mut ffi::lua_State, n: usize) -> Result<()> {
    let n = c_int::try_from(n).map_err(|_| BridgeError::runtime("stack overflow"))?;
    if ffi::lua_checkstack(l, n) == 0 {
        return Err(BridgeError::runtime("stack overflow"));
    }
    Ok(())
}

/// Describe the error object at `idx` the way the standalone interpreter
/// does.
pub(crate) unsafe fn error_message(l: *mut ffi::lua_State, idx: c_int) -> String {
    match ffi::lua_type(l, idx) {
        ffi::LUA_TSTRING | ffi::LUA_TNUMBER => {
            let mut len = 0usize;
            // Converts numbers in place; callers discard the slot afterwards.
            let p = ffi::lua_tolstring(l, idx, &mut len);
            if p.is_null() {
                return String::new();
            }
            let bytes = std::slice::from_raw_parts(p as *const u8, len);
            String::from_utf8_lossy(bytes).into_owned()
        }
        t => {
            let name = CStr::from_ptr(ffi::lua_typename(l, t)).to_string_lossy();
            format!("(error object is a {name} value)")
        }
    }
}

impl LuaState {
    /// Pop the value on top of `l` into the registry.
    pub(crate) unsafe fn register_top(&self, l: *mut ffi::lua_State) -> LuaRef {
        self.0.maybe_flush();
        let ptr = ffi::lua_topointer(l, -1) as usize;
        let key = ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX);
        trace!(key, ptr, "registered value");
        LuaRef::new(self.downgrade(), key, ptr)
    }

    /// Push a registry handle. Foreign or dead handles are an error in
    /// strict mode and become `nil` otherwise.
    pub(crate) unsafe fn push_ref(
        &self,
        l: *mut ffi::lua_State,
        r: &LuaRef,
        strict: bool,
    ) -> Result<()> {
        if r.is_owned_by(self) {
            ffi::lua_rawgeti(l, ffi::LUA_REGISTRYINDEX, r.key() as ffi::lua_Integer);
            return Ok(());
        }
        if strict {
            return Err(BridgeError::OwnershipConflict);
        }
        error!(
            ptr = r.to_pointer(),
            "value belongs to another Lua state, pushing nil"
        );
        ffi::lua_pushnil(l);
        Ok(())
    }

    /// Push `value`. The caller has reserved one slot.
    pub(crate) unsafe fn push_value(
        &self,
        l: *mut ffi::lua_State,
        value: &LuaValue,
        strict: bool,
    ) -> Result<()> {
        match value {
            LuaValue::Nil => ffi::lua_pushnil(l),
            LuaValue::Boolean(b) => ffi::lua_pushboolean(l, *b as c_int),
            LuaValue::Integer(i) => ffi::lua_pushinteger(l, *i),
            LuaValue::Number(n) => ffi::lua_pushnumber(l, *n),
            LuaValue::String(bytes) => {
                ffi::lua_pushlstring(l, bytes.as_ptr() as *const _, bytes.len());
            }
            LuaValue::Object(obj) => host::push_object(l, obj)?,
            LuaValue::Table(t) => self.push_ref(l, &t.r, strict)?,
            LuaValue::Function(f) => self.push_ref(l, &f.0, strict)?,
            LuaValue::Thread(t) => self.push_ref(l, &t.0, strict)?,
            LuaValue::UserData(LuaUserData::Light(p)) => {
                ffi::lua_pushlightuserdata(l, *p as *mut c_void)
            }
            LuaValue::UserData(LuaUserData::Ref(r)) => self.push_ref(l, r, strict)?,
        }
        Ok(())
    }

    /// Push every value in order, reserving stack space first.
    pub(crate) unsafe fn push_values(
        &self,
        l: *mut ffi::lua_State,
        values: &[LuaValue],
        strict: bool,
    ) -> Result<()> {
        check_stack(l, values.len())?;
        for v in values {
            self.push_value(l, v, strict)?;
        }
        Ok(())
    }

    /// Read the slot at `idx` without popping it.
    pub(crate) unsafe fn read_value(&self, l: *mut ffi::lua_State, idx: c_int) -> LuaValue {
        let idx = ffi::lua_absindex(l, idx);
        match ffi::lua_type(l, idx) {
            ffi::LUA_TBOOLEAN => LuaValue::Boolean(ffi::lua_toboolean(l, idx) != 0),
            ffi::LUA_TNUMBER => {
                if ffi::lua_isinteger(l, idx) != 0 {
                    LuaValue::Integer(ffi::lua_tointegerx(l, idx, ptr::null_mut()))
                } else {
                    LuaValue::Number(ffi::lua_tonumberx(l, idx, ptr::null_mut()))
                }
            }
            ffi::LUA_TSTRING => {
                let mut len = 0usize;
                let p = ffi::lua_tolstring(l, idx, &mut len);
                if p.is_null() {
                    LuaValue::String(Vec::new())
                } else {
                    LuaValue::String(std::slice::from_raw_parts(p as *const u8, len).to_vec())
                }
            }
            ffi::LUA_TLIGHTUSERDATA => {
                LuaValue::UserData(LuaUserData::Light(ffi::lua_touserdata(l, idx) as usize))
            }
            t @ (ffi::LUA_TTABLE | ffi::LUA_TFUNCTION | ffi::LUA_TTHREAD | ffi::LUA_TUSERDATA) => {
                if ffi::lua_checkstack(l, 2) == 0 {
                    error!("stack exhausted while reading a value");
                    return LuaValue::Nil;
                }
                if t == ffi::LUA_TUSERDATA {
                    if let Some(obj) = host::object_at(l, idx) {
                        return LuaValue::Object(obj);
                    }
                }
                ffi::lua_pushvalue(l, idx);
                let r = self.register_top(l);
                match t {
                    ffi::LUA_TTABLE => LuaValue::Table(LuaTable::new(r)),
                    ffi::LUA_TFUNCTION => LuaValue::Function(LuaFunction(r)),
                    ffi::LUA_TTHREAD => LuaValue::Thread(LuaThread(r)),
                    _ => LuaValue::UserData(LuaUserData::Ref(r)),
                }
            }
            _ => LuaValue::Nil,
        }
    }

    /// Read `n` values starting at absolute index `first`.
    pub(crate) unsafe fn read_values(
        &self,
        l: *mut ffi::lua_State,
        first: c_int,
        n: c_int,
    ) -> Vec<LuaValue> {
        (first..first + n).map(|i| self.read_value(l, i)).collect()
    }

    /// Current stack depth.
    pub fn get_top(&self) -> i32 {
        unsafe { ffi::lua_gettop(self.lua()) }
    }

    /// Push a value onto the stack. A value produced by another instance is
    /// pushed as `nil` and the conflict is logged.
    pub fn push(&self, value: &LuaValue) -> Result<()> {
        let l = self.lua();
        unsafe {
            check_stack(l, 1)?;
            self.push_value(l, value, false)
        }
    }

    pub fn push_nil(&self) -> Result<()> {
        self.push(&LuaValue::Nil)
    }

    /// Read the slot at `index` (negative counts from the top) without
    /// popping it. Indices outside the stack read as `nil`.
    pub fn to_value(&self, index: i32) -> LuaValue {
        let l = self.lua();
        let top = self.get_top();
        if index == 0 || index.unsigned_abs() > top as u32 {
            return LuaValue::Nil;
        }
        unsafe { self.read_value(l, index) }
    }

    /// Discard `n` slots from the top. Popping more than the depth empties
    /// the stack.
    pub fn pop(&self, n: i32) {
        let l = self.lua();
        let n = n.clamp(0, self.get_top());
        unsafe { ffi::lua_settop(l, -n - 1) }
    }

    /// Read the top slot and discard it.
    pub fn pop_value(&self) -> LuaValue {
        let value = self.to_value(-1);
        self.pop(1);
        value
    }

    /// Advance a traversal of the table at `table_index`.
    ///
    /// Expects the previous key (or `nil` to start) on top. On `true` the key
    /// and value have been pushed in its place; on `false` the key was popped
    /// and nothing pushed. The key must be one returned by the previous step.
    pub fn next(&self, table_index: i32) -> Result<bool> {
        let l = self.lua();
        unsafe {
            let top = ffi::lua_gettop(l);
            if top < 1 || table_index == 0 || table_index.unsigned_abs() > top as u32 {
                return Err(BridgeError::runtime("invalid stack index for next"));
            }
            let idx = ffi::lua_absindex(l, table_index);
            if ffi::lua_type(l, idx) != ffi::LUA_TTABLE {
                return Err(BridgeError::TypeMismatch {
                    expected: ValueType::Table,
                    found: self.read_value(l, idx).value_type(),
                });
            }
            check_stack(l, 3)?;
            // A key the table does not hold makes `lua_next` raise, so the
            // step runs under `lua_pcall`.
            let key = ffi::lua_gettop(l);
            ffi::lua_pushcfunction(l, next_step);
            ffi::lua_pushvalue(l, idx);
            ffi::lua_pushvalue(l, key);
            if ffi::lua_pcall(l, 2, 2, 0) != ffi::LUA_OK {
                let msg = error_message(l, -1);
                ffi::lua_settop(l, key);
                return Err(BridgeError::Runtime(msg));
            }
            if ffi::lua_type(l, -2) == ffi::LUA_TNIL {
                ffi::lua_settop(l, key - 1);
                return Ok(false);
            }
            ffi::lua_remove(l, key);
            Ok(true)
        }
    }
}

unsafe extern "C-unwind" fn next_step(l: *mut ffi::lua_State) -> c_int {
    ffi::lua_settop(l, 2);
    if ffi::lua_next(l, 1) != 0 {
        2
    } else {
        0
    }
}
