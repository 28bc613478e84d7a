//! The runtime instance.
//!
//! A [`LuaState`] owns one `lua_State` together with the bookkeeping the
//! bridge needs: the thread host code is currently running on, the queue of
//! registry keys released by dropped handles, and the protected helper
//! functions used for metamethod-aware table access.

use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::fmt;
use std::rc::{Rc, Weak};

use mlua_sys as ffi;
use tracing::{debug, trace};

use crate::config::StateConfig;
use crate::error::{BridgeError, Result};
use crate::host;
use crate::reference::LuaTable;
use crate::stack::{check_stack, StackGuard};
use crate::value::LuaValue;

/// Indexing helpers run under `lua_pcall` so metamethod errors are caught.
const HELPERS_SOURCE: &str = "return \
    function(t, k) return t[k] end, \
    function(t, k, v) t[k] = v end, \
    function(t) return #t end";

/// Registry keys of the protected helper functions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Helpers {
    pub(crate) get: c_int,
    pub(crate) set: c_int,
    pub(crate) len: c_int,
}

pub(crate) struct StateInner {
    main: *mut ffi::lua_State,
    current: Cell<*mut ffi::lua_State>,
    weak_self: Weak<StateInner>,
    pending_unrefs: RefCell<Vec<c_int>>,
    /// Keys released while `pending_unrefs` was borrowed.
    deferred_unrefs: Cell<Vec<c_int>>,
    pub(crate) helpers: Helpers,
    pub(crate) config: StateConfig,
}

impl StateInner {
    pub(crate) fn upgrade(&self) -> Option<LuaState> {
        self.weak_self.upgrade().map(LuaState)
    }

    /// Queue a registry key for release. Never touches the interpreter, so
    /// it is safe from finalizers and from `Drop`.
    pub(crate) fn queue_unref(&self, key: c_int) {
        match self.pending_unrefs.try_borrow_mut() {
            Ok(mut pending) => pending.push(key),
            Err(_) => {
                let mut deferred = self.deferred_unrefs.take();
                deferred.push(key);
                self.deferred_unrefs.set(deferred);
                trace!(key, "registry key release deferred");
            }
        }
    }

    /// Release every queued registry key. Returns how many were released.
    pub(crate) fn flush_unrefs(&self) -> usize {
        let mut keys = match self.pending_unrefs.try_borrow_mut() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return 0,
        };
        keys.extend(self.deferred_unrefs.take());
        if keys.is_empty() {
            return 0;
        }
        let l = self.current.get();
        unsafe {
            if ffi::lua_checkstack(l, 2) == 0 {
                // Try again on the next pass.
                self.pending_unrefs.borrow_mut().extend(keys);
                return 0;
            }
            for key in &keys {
                ffi::luaL_unref(l, ffi::LUA_REGISTRYINDEX, *key);
            }
        }
        trace!(count = keys.len(), "released registry keys");
        keys.len()
    }

    fn queued_unrefs(&self) -> usize {
        let deferred = self.deferred_unrefs.take();
        let count = deferred.len();
        self.deferred_unrefs.set(deferred);
        count + self.pending_unrefs.try_borrow().map(|p| p.len()).unwrap_or(0)
    }

    pub(crate) fn maybe_flush(&self) {
        if self.queued_unrefs() >= self.config.registry_flush_threshold {
            self.flush_unrefs();
        }
    }
}

impl Drop for StateInner {
    fn drop(&mut self) {
        debug!(state = ?(self as *const StateInner), "closing Lua state");
        self.pending_unrefs.get_mut().clear();
        self.deferred_unrefs.get_mut().clear();
        unsafe { ffi::lua_close(self.main) }
    }
}

/// Marks `thread` as the one host code is running on until dropped.
pub(crate) struct ThreadScope<'a> {
    inner: &'a StateInner,
    prev: *mut ffi::lua_State,
}

impl<'a> ThreadScope<'a> {
    pub(crate) fn enter(inner: &'a StateInner, thread: *mut ffi::lua_State) -> Self {
        let prev = inner.current.replace(thread);
        ThreadScope { inner, prev }
    }
}

impl Drop for ThreadScope<'_> {
    fn drop(&mut self) {
        self.inner.current.set(self.prev);
    }
}

/// An owning handle to an interpreter instance.
///
/// Cloning is cheap and shares the instance. The instance is closed when the
/// last `LuaState` is dropped; values it produced then fail with
/// [`BridgeError::NotOwned`]. The handle is reference counted with `Rc` and
/// stays on the thread that created it.
#[derive(Clone)]
pub struct LuaState(pub(crate) Rc<StateInner>);

/// A non-owning handle to an interpreter instance.
#[derive(Clone)]
pub struct WeakState(pub(crate) Weak<StateInner>);

impl WeakState {
    pub fn upgrade(&self) -> Option<LuaState> {
        self.0.upgrade().map(LuaState)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub(crate) fn points_to(&self, state: &LuaState) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&state.0))
    }
}

impl fmt::Debug for WeakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakState({:p}, alive: {})", self.0.as_ptr(), self.is_alive())
    }
}

impl fmt::Debug for LuaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LuaState({:p})", Rc::as_ptr(&self.0))
    }
}

impl LuaState {
    /// Create an instance with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Result<Self> {
        let main = unsafe { ffi::luaL_newstate() };
        if main.is_null() {
            return Err(BridgeError::runtime("cannot allocate a Lua state"));
        }
        unsafe {
            if config.open_stdlibs {
                ffi::luaL_openlibs(main);
            }
        }
        let helpers = match unsafe { load_helpers(main) } {
            Ok(helpers) => helpers,
            Err(e) => {
                unsafe { ffi::lua_close(main) };
                return Err(e);
            }
        };

        let inner = Rc::new_cyclic(|weak| StateInner {
            main,
            current: Cell::new(main),
            weak_self: weak.clone(),
            pending_unrefs: RefCell::new(Vec::new()),
            deferred_unrefs: Cell::new(Vec::new()),
            helpers,
            config,
        });
        let state = LuaState(inner);
        host::install_metatables(&state)?;
        debug!(
            state = ?Rc::as_ptr(&state.0),
            stdlibs = state.0.config.open_stdlibs,
            "created Lua state"
        );
        Ok(state)
    }

    pub fn config(&self) -> &StateConfig {
        &self.0.config
    }

    pub fn downgrade(&self) -> WeakState {
        WeakState(Rc::downgrade(&self.0))
    }

    /// Whether both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &LuaState) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The thread host code is currently running on.
    pub(crate) fn lua(&self) -> *mut ffi::lua_State {
        self.0.current.get()
    }

    pub(crate) fn inner_ptr(&self) -> *mut c_void {
        Rc::as_ptr(&self.0) as *mut c_void
    }

    /// Run a full collection cycle, releasing queued registry keys first.
    pub fn gc_collect(&self) {
        let released = self.0.flush_unrefs();
        let l = self.lua();
        unsafe {
            ffi::lua_gc(l, ffi::LUA_GCCOLLECT, 0);
        }
        debug!(released, used = self.used_memory(), "garbage collection pass");
    }

    pub fn gc_stop(&self) {
        unsafe {
            ffi::lua_gc(self.lua(), ffi::LUA_GCSTOP, 0);
        }
    }

    pub fn gc_restart(&self) {
        unsafe {
            ffi::lua_gc(self.lua(), ffi::LUA_GCRESTART, 0);
        }
    }

    /// Bytes currently allocated by the interpreter.
    pub fn used_memory(&self) -> usize {
        let l = self.lua();
        unsafe {
            let kbytes = ffi::lua_gc(l, ffi::LUA_GCCOUNT, 0).max(0) as usize;
            let bytes = ffi::lua_gc(l, ffi::LUA_GCCOUNTB, 0).max(0) as usize;
            kbytes * 1024 + bytes
        }
    }

    /// Number of released registry keys waiting for the next flush.
    pub fn pending_releases(&self) -> usize {
        self.0.queued_unrefs()
    }

    /// The global table.
    pub fn globals(&self) -> Result<LuaTable> {
        let l = self.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            ffi::lua_rawgeti(l, ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_GLOBALS);
            Ok(LuaTable::new(self.register_top(l)))
        }
    }

    pub fn get_global(&self, name: &str) -> Result<LuaValue> {
        self.globals()?.get_field(name)
    }

    pub fn set_global(&self, name: &str, value: impl Into<LuaValue>) -> Result<()> {
        self.globals()?.set_field(name, value)
    }
}

/// Load the indexing helpers and anchor them in the registry.
unsafe fn load_helpers(l: *mut ffi::lua_State) -> Result<Helpers> {
    let status = ffi::luaL_loadbufferx(
        l,
        HELPERS_SOURCE.as_ptr() as *const _,
        HELPERS_SOURCE.len(),
        c"=lunaris".as_ptr(),
        c"t".as_ptr(),
    );
    if status != ffi::LUA_OK || ffi::lua_pcall(l, 0, 3, 0) != ffi::LUA_OK {
        let msg = crate::stack::error_message(l, -1);
        ffi::lua_settop(l, 0);
        return Err(BridgeError::Runtime(msg));
    }
    let len = ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX);
    let set = ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX);
    let get = ffi::luaL_ref(l, ffi::LUA_REGISTRYINDEX);
    Ok(Helpers { get, set, len })
}
