//! Coroutine protocol.
//!
//! A coroutine is `Suspended` until resumed, `Running` while host code runs
//! on it, `Normal` while it has resumed another coroutine, and `Dead` once
//! its body returns or raises. Suspension only happens through a host
//! function returning [`HostReturn::Yield`](crate::HostReturn::Yield) or a
//! script calling `coroutine.yield`.

use std::ffi::c_int;
use std::fmt;

use mlua_sys as ffi;
use tracing::trace;

use crate::error::{BridgeError, Result};
use crate::reference::{LuaFunction, LuaThread};
use crate::stack::{check_stack, error_message, StackGuard};
use crate::state::{LuaState, ThreadScope};
use crate::value::LuaValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Suspended,
    Running,
    Normal,
    Dead,
}

impl ThreadStatus {
    pub fn name(self) -> &'static str {
        match self {
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Running => "running",
            ThreadStatus::Normal => "normal",
            ThreadStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of `co` as seen from the thread host code is running on.
unsafe fn status_of(state: &LuaState, co: *mut ffi::lua_State) -> ThreadStatus {
    if co == state.lua() {
        return ThreadStatus::Running;
    }
    match ffi::lua_status(co) {
        ffi::LUA_YIELD => ThreadStatus::Suspended,
        ffi::LUA_OK => {
            let mut ar: ffi::lua_Debug = std::mem::zeroed();
            if ffi::lua_getstack(co, 0, &mut ar) > 0 {
                ThreadStatus::Normal
            } else if ffi::lua_gettop(co) == 0 {
                ThreadStatus::Dead
            } else {
                ThreadStatus::Suspended
            }
        }
        _ => ThreadStatus::Dead,
    }
}

impl LuaState {
    /// Create a coroutine whose body is `function`.
    pub fn create_thread(&self, function: &LuaFunction) -> Result<LuaThread> {
        let l = self.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 2)?;
            let co = ffi::lua_newthread(l);
            self.push_ref(l, &function.0, true)?;
            ffi::lua_xmove(l, co, 1);
            Ok(LuaThread(self.register_top(l)))
        }
    }
}

impl LuaThread {
    pub fn status(&self) -> Result<ThreadStatus> {
        let state = self.0.owner()?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            state.push_ref(l, &self.0, true)?;
            Ok(status_of(&state, ffi::lua_tothread(l, -1)))
        }
    }

    /// Depth of the coroutine's own stack.
    pub fn stack_top(&self) -> Result<i32> {
        let state = self.0.owner()?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            state.push_ref(l, &self.0, true)?;
            Ok(ffi::lua_gettop(ffi::lua_tothread(l, -1)))
        }
    }

    /// Start or continue the coroutine. Returns the values it yielded, or
    /// its return values once it finishes.
    ///
    /// Resuming a coroutine that is not suspended fails, as does one whose
    /// body raises; the latter leaves it dead.
    pub fn resume(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<Vec<LuaValue>> {
        let state = self.0.owner()?;
        let args: Vec<LuaValue> = args.into_iter().collect();
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, args.len() + 1)?;
            state.push_ref(l, &self.0, true)?;
            let co = ffi::lua_tothread(l, -1);

            let status = status_of(&state, co);
            if status != ThreadStatus::Suspended {
                return Err(BridgeError::Runtime(match status {
                    ThreadStatus::Dead => "cannot resume dead coroutine".to_string(),
                    _ => "cannot resume non-suspended coroutine".to_string(),
                }));
            }

            let nargs = c_int::try_from(args.len())
                .map_err(|_| BridgeError::runtime("too many arguments to resume"))?;
            if ffi::lua_checkstack(co, nargs + 1) == 0 {
                return Err(BridgeError::runtime("too many arguments to resume"));
            }
            for arg in &args {
                state.push_value(l, arg, true)?;
            }
            ffi::lua_xmove(l, co, nargs);

            let mut nres: c_int = 0;
            let code = {
                let _scope = ThreadScope::enter(&state.0, co);
                ffi::lua_resume(co, l, nargs, &mut nres)
            };
            trace!(code, nres, "coroutine resumed");

            match code {
                ffi::LUA_OK | ffi::LUA_YIELD => {
                    if ffi::lua_checkstack(l, nres + 1) == 0 {
                        ffi::lua_settop(co, -nres - 1);
                        return Err(BridgeError::runtime("too many results to resume"));
                    }
                    ffi::lua_xmove(co, l, nres);
                    let first = ffi::lua_gettop(l) - nres + 1;
                    Ok(state.read_values(l, first, nres))
                }
                _ => {
                    ffi::lua_xmove(co, l, 1);
                    Err(BridgeError::Runtime(error_message(l, -1)))
                }
            }
        }
    }
}

impl LuaValue {
    /// [`LuaThread::resume`] for thread values; other variants resume to
    /// nothing.
    pub fn resume(&self, args: impl IntoIterator<Item = LuaValue>) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Thread(t) => t.resume(args),
            _ => Ok(Vec::new()),
        }
    }

    /// Status of a thread value; `None` for other variants.
    pub fn thread_status(&self) -> Result<Option<ThreadStatus>> {
        match self {
            LuaValue::Thread(t) => t.status().map(Some),
            _ => Ok(None),
        }
    }
}
