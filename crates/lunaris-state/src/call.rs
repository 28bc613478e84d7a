//! Call protocol.
//!
//! Every call records the stack depth, pushes the callee and its arguments,
//! runs `lua_pcall` with `LUA_MULTRET`, and reads back however many values
//! landed above the recorded depth. The stack guard restores the depth on
//! every path.

use std::ffi::c_int;

use mlua_sys as ffi;

use crate::error::{BridgeError, Result};
use crate::reference::{LuaFunction, LuaTable};
use crate::stack::{check_stack, error_message, StackGuard};
use crate::state::LuaState;
use crate::value::LuaValue;

impl LuaState {
    /// Call whatever `push_callee` pushes with `args`, returning every
    /// result.
    pub(crate) unsafe fn pcall_values(
        &self,
        l: *mut ffi::lua_State,
        push_callee: impl FnOnce() -> Result<()>,
        args: &[LuaValue],
    ) -> Result<Vec<LuaValue>> {
        let _guard = StackGuard::new(l);
        let base = ffi::lua_gettop(l);
        check_stack(l, args.len() + 1)?;
        push_callee()?;
        for arg in args {
            self.push_value(l, arg, true)?;
        }
        let nargs = c_int::try_from(args.len()).map_err(|_| BridgeError::runtime("too many arguments"))?;
        if ffi::lua_pcall(l, nargs, ffi::LUA_MULTRET, 0) != ffi::LUA_OK {
            return Err(BridgeError::Runtime(error_message(l, -1)));
        }
        let nres = ffi::lua_gettop(l) - base;
        Ok(self.read_values(l, base + 1, nres))
    }

    /// Run one of the protected indexing helpers.
    pub(crate) fn call_helper(&self, helper: c_int, args: &[LuaValue]) -> Result<LuaValue> {
        let l = self.lua();
        let results = unsafe {
            self.pcall_values(
                l,
                || {
                    ffi::lua_rawgeti(l, ffi::LUA_REGISTRYINDEX, helper as ffi::lua_Integer);
                    Ok(())
                },
                args,
            )?
        };
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Resolve a global by name. Dotted names (`"string.format"`) walk
    /// through nested tables; a missing link resolves to `nil`.
    pub fn resolve_global(&self, path: &str) -> Result<LuaValue> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut value = self.get_global(first)?;
        for segment in segments {
            value = match &value {
                LuaValue::Table(t) => t.get_field(segment)?,
                _ => return Ok(LuaValue::Nil),
            };
        }
        Ok(value)
    }

    /// Call a global function by (possibly dotted) name and return its first
    /// result. A name that does not resolve to a function yields `nil`.
    pub fn global_call(
        &self,
        name: &str,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<LuaValue> {
        self.resolve_global(name)?.call(args)
    }

    pub fn global_call_multi(
        &self,
        name: &str,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<Vec<LuaValue>> {
        self.resolve_global(name)?.call_multi(args)
    }
}

impl LuaFunction {
    /// Call and return the first result, or `nil` when there is none.
    pub fn call(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<LuaValue> {
        Ok(self.call_multi(args)?.into_iter().next().unwrap_or_default())
    }

    /// Call and return every result in order.
    pub fn call_multi(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<Vec<LuaValue>> {
        let state = self.0.owner()?;
        let args: Vec<LuaValue> = args.into_iter().collect();
        let l = state.lua();
        unsafe { state.pcall_values(l, || state.push_ref(l, &self.0, true), &args) }
    }
}

impl LuaTable {
    /// `t:name(args...)`: call field `name` with the table as first argument.
    pub fn call_method(
        &self,
        name: &str,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<Vec<LuaValue>> {
        let field = self.get_field(name)?;
        let func = field.as_function()?;
        let args = std::iter::once(LuaValue::Table(self.clone())).chain(args);
        func.call_multi(args)
    }
}

impl LuaValue {
    /// Call a function value and return its first result. Non-functions
    /// return `nil`.
    pub fn call(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<LuaValue> {
        match self {
            LuaValue::Function(f) => f.call(args),
            _ => Ok(LuaValue::Nil),
        }
    }

    /// Call a function value and return every result. Non-functions return
    /// nothing.
    pub fn call_multi(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Function(f) => f.call_multi(args),
            _ => Ok(Vec::new()),
        }
    }

    /// Like [`call`](Self::call), with `nil` skipped silently.
    pub fn call_if_not_nil(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<LuaValue> {
        if self.is_nil() {
            return Ok(LuaValue::Nil);
        }
        self.call(args)
    }

    /// Fetch field `key` and call it.
    pub fn key_call(&self, key: &str, args: impl IntoIterator<Item = LuaValue>) -> Result<LuaValue> {
        self.get_field(key)?.call(args)
    }

    /// Fetch field `key` and call it with this value as first argument.
    pub fn key_call_with_self(
        &self,
        key: &str,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<LuaValue> {
        let args = std::iter::once(self.clone()).chain(args);
        self.get_field(key)?.call(args)
    }

    /// Same as [`key_call_with_self`](Self::key_call_with_self), returning
    /// every result.
    pub fn call_method(
        &self,
        key: &str,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<Vec<LuaValue>> {
        let args = std::iter::once(self.clone()).chain(args);
        self.get_field(key)?.call_multi(args)
    }

    /// Fetch element `index` and call it.
    pub fn index_call(&self, index: i64, args: impl IntoIterator<Item = LuaValue>) -> Result<LuaValue> {
        self.get_index(index)?.call(args)
    }

    pub fn index_call_with_self(
        &self,
        index: i64,
        args: impl IntoIterator<Item = LuaValue>,
    ) -> Result<LuaValue> {
        let args = std::iter::once(self.clone()).chain(args);
        self.get_index(index)?.call(args)
    }
}
