//! Host functions and host objects.
//!
//! Rust closures become Lua C closures whose first upvalue is a userdata
//! slot holding the closure and whose second is a light pointer back to the
//! instance. Host objects become full userdata holding an `Rc` to the object,
//! with a shared metatable that routes indexing through [`HostObject`]
//! reflection.
//!
//! The trampoline is the only place that raises or yields into the
//! interpreter. It computes a plain `Outcome` with every Rust value already
//! dropped, then performs `lua_error`/`lua_yield` as its final action.

use std::any::Any;
use std::ffi::{c_int, CStr};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use mlua_sys as ffi;

use crate::error::{BridgeError, Result};
use crate::reference::LuaFunction;
use crate::stack::{check_stack, StackGuard};
use crate::state::{LuaState, StateInner, ThreadScope};
use crate::value::LuaValue;

const OBJECT_METATABLE: &CStr = c"lunaris.object";
const FUNCTION_METATABLE: &CStr = c"lunaris.function";

/// What a name resolves to on a host object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReflectionKind {
    Property,
    Function,
    Unknown,
}

/// A host object exposed to scripts through reflection.
///
/// Objects are shared (`Rc`), so mutation goes through interior mutability.
/// Objects must not hold an owning [`LuaState`]; keep a
/// [`WeakState`](crate::WeakState) instead.
pub trait HostObject {
    fn class_name(&self) -> &str;

    fn reflect(&self, name: &str) -> ReflectionKind;

    fn get_property(&self, name: &str) -> Result<LuaValue> {
        Err(BridgeError::Runtime(format!(
            "{} has no readable property '{name}'",
            self.class_name()
        )))
    }

    fn set_property(&self, name: &str, _value: LuaValue) -> Result<()> {
        Err(BridgeError::Runtime(format!(
            "{} has no writable property '{name}'",
            self.class_name()
        )))
    }

    fn invoke(&self, _ctx: &CallContext, name: &str, _args: Vec<LuaValue>) -> Result<Vec<LuaValue>> {
        Err(BridgeError::Runtime(format!(
            "{} has no function '{name}'",
            self.class_name()
        )))
    }
}

/// A shared handle to a host object. Equality is identity.
#[derive(Clone)]
pub struct HostObjectRef(Rc<dyn HostObject>);

impl HostObjectRef {
    pub fn new(obj: impl HostObject + 'static) -> Self {
        HostObjectRef(Rc::new(obj))
    }

    pub fn to_pointer(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: HostObject + 'static> From<Rc<T>> for HostObjectRef {
    fn from(obj: Rc<T>) -> Self {
        HostObjectRef(obj)
    }
}

impl Deref for HostObjectRef {
    type Target = dyn HostObject;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for HostObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.to_pointer() == other.to_pointer()
    }
}

impl Eq for HostObjectRef {}

impl Hash for HostObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_pointer().hash(state)
    }
}

impl fmt::Debug for HostObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({}, {:#x})", self.class_name(), self.to_pointer())
    }
}

/// What a host function hands back to the interpreter.
#[derive(Debug)]
pub enum HostReturn {
    Values(Vec<LuaValue>),
    /// Suspend the running coroutine, passing these values to `resume`.
    Yield(Vec<LuaValue>),
}

impl HostReturn {
    pub fn none() -> Self {
        HostReturn::Values(Vec::new())
    }

    pub fn single(value: impl Into<LuaValue>) -> Self {
        HostReturn::Values(vec![value.into()])
    }
}

impl From<Vec<LuaValue>> for HostReturn {
    fn from(values: Vec<LuaValue>) -> Self {
        HostReturn::Values(values)
    }
}

impl From<LuaValue> for HostReturn {
    fn from(value: LuaValue) -> Self {
        HostReturn::Values(vec![value])
    }
}

/// Per-call context handed to host functions.
pub struct CallContext {
    state: LuaState,
    thread: *mut ffi::lua_State,
}

impl CallContext {
    pub fn state(&self) -> &LuaState {
        &self.state
    }

    /// Whether the calling thread is a coroutine that can be suspended.
    pub fn is_yieldable(&self) -> bool {
        unsafe { ffi::lua_isyieldable(self.thread) != 0 }
    }

    /// Suspend the calling coroutine once the host function returns.
    pub fn yield_values(&self, values: impl IntoIterator<Item = LuaValue>) -> HostReturn {
        HostReturn::Yield(values.into_iter().collect())
    }
}

type HostFn = dyn Fn(&CallContext, Vec<LuaValue>) -> Result<HostReturn>;

#[derive(Clone, Copy)]
enum Outcome {
    Return(c_int),
    Yield(c_int),
    Raise,
}

impl LuaState {
    /// Expose a Rust closure to scripts.
    ///
    /// Errors returned by the closure, and panics inside it, become Lua
    /// errors that scripts can catch with `pcall`.
    pub fn create_function<F>(&self, f: F) -> Result<LuaFunction>
    where
        F: Fn(&CallContext, Vec<LuaValue>) -> Result<HostReturn> + 'static,
    {
        let func: Rc<HostFn> = Rc::new(f);
        let l = self.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 3)?;
            let slot = ffi::lua_newuserdatauv(l, mem::size_of::<Option<Rc<HostFn>>>(), 0)
                as *mut Option<Rc<HostFn>>;
            ptr::write(slot, Some(func));
            ffi::lua_getfield(l, ffi::LUA_REGISTRYINDEX, FUNCTION_METATABLE.as_ptr());
            ffi::lua_setmetatable(l, -2);
            ffi::lua_pushlightuserdata(l, self.inner_ptr());
            ffi::lua_pushcclosure(l, call_host_function, 2);
            Ok(LuaFunction(self.register_top(l)))
        }
    }

    /// How `name` resolves on a host object value. Non-objects resolve to
    /// [`ReflectionKind::Unknown`].
    pub fn reflection_kind(&self, object: &LuaValue, name: &str) -> ReflectionKind {
        match object {
            LuaValue::Object(obj) => obj.reflect(name),
            _ => ReflectionKind::Unknown,
        }
    }
}

unsafe extern "C-unwind" fn call_host_function(l: *mut ffi::lua_State) -> c_int {
    match dispatch(l) {
        Outcome::Return(n) => n,
        Outcome::Yield(n) => ffi::lua_yield(l, n),
        Outcome::Raise => ffi::lua_error(l),
    }
}

unsafe fn dispatch(l: *mut ffi::lua_State) -> Outcome {
    let message = match panic::catch_unwind(AssertUnwindSafe(|| invoke(l))) {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => format!("host function panicked: {}", panic_message(&*payload)),
    };
    ffi::lua_settop(l, 0);
    ffi::luaL_where(l, 1);
    ffi::lua_pushlstring(l, message.as_ptr() as *const _, message.len());
    ffi::lua_concat(l, 2);
    Outcome::Raise
}

unsafe fn invoke(l: *mut ffi::lua_State) -> Result<Outcome> {
    let inner = ffi::lua_touserdata(l, ffi::lua_upvalueindex(2)) as *const StateInner;
    let slot = ffi::lua_touserdata(l, ffi::lua_upvalueindex(1)) as *const Option<Rc<HostFn>>;
    if inner.is_null() || slot.is_null() {
        return Err(BridgeError::runtime("corrupted host function"));
    }
    let state = (*inner).upgrade().ok_or(BridgeError::NotOwned)?;
    let func = (*slot)
        .clone()
        .ok_or_else(|| BridgeError::runtime("host function has been released"))?;

    let returned = {
        let _scope = ThreadScope::enter(&state.0, l);
        let nargs = ffi::lua_gettop(l);
        let args = state.read_values(l, 1, nargs);
        let ctx = CallContext {
            state: state.clone(),
            thread: l,
        };
        (*func)(&ctx, args)?
    };

    match returned {
        HostReturn::Values(values) => {
            state.push_values(l, &values, true)?;
            Ok(Outcome::Return(values.len() as c_int))
        }
        HostReturn::Yield(values) => {
            if ffi::lua_isyieldable(l) == 0 {
                return Err(BridgeError::runtime(
                    "attempt to yield from outside a coroutine",
                ));
            }
            state.push_values(l, &values, true)?;
            Ok(Outcome::Yield(values.len() as c_int))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

unsafe extern "C-unwind" fn function_gc(l: *mut ffi::lua_State) -> c_int {
    let slot = ffi::lua_touserdata(l, 1) as *mut Option<Rc<HostFn>>;
    if !slot.is_null() {
        let taken = (*slot).take();
        let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(taken)));
    }
    0
}

unsafe extern "C-unwind" fn object_gc(l: *mut ffi::lua_State) -> c_int {
    let slot = ffi::lua_touserdata(l, 1) as *mut Option<HostObjectRef>;
    if !slot.is_null() {
        let taken = (*slot).take();
        let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(taken)));
    }
    0
}

/// Push a host object as a fresh full userdata.
pub(crate) unsafe fn push_object(l: *mut ffi::lua_State, obj: &HostObjectRef) -> Result<()> {
    check_stack(l, 2)?;
    let slot = ffi::lua_newuserdatauv(l, mem::size_of::<Option<HostObjectRef>>(), 0)
        as *mut Option<HostObjectRef>;
    ptr::write(slot, Some(obj.clone()));
    ffi::lua_getfield(l, ffi::LUA_REGISTRYINDEX, OBJECT_METATABLE.as_ptr());
    ffi::lua_setmetatable(l, -2);
    Ok(())
}

/// The host object at `idx`, if that slot is one of ours. Needs two free
/// slots.
pub(crate) unsafe fn object_at(l: *mut ffi::lua_State, idx: c_int) -> Option<HostObjectRef> {
    let slot = ffi::luaL_testudata(l, idx, OBJECT_METATABLE.as_ptr()) as *const Option<HostObjectRef>;
    if slot.is_null() {
        None
    } else {
        (*slot).clone()
    }
}

/// Register the userdata metatables. Called once per instance.
pub(crate) fn install_metatables(state: &LuaState) -> Result<()> {
    let l = state.lua();
    unsafe {
        let _guard = StackGuard::new(l);
        check_stack(l, 4)?;

        ffi::luaL_newmetatable(l, FUNCTION_METATABLE.as_ptr());
        ffi::lua_pushcclosure(l, function_gc, 0);
        ffi::lua_setfield(l, -2, c"__gc".as_ptr());
        ffi::lua_pushboolean(l, 0);
        ffi::lua_setfield(l, -2, c"__metatable".as_ptr());
        ffi::lua_settop(l, -2);

        ffi::luaL_newmetatable(l, OBJECT_METATABLE.as_ptr());
        ffi::lua_pushcclosure(l, object_gc, 0);
        ffi::lua_setfield(l, -2, c"__gc".as_ptr());
        ffi::lua_pushboolean(l, 0);
        ffi::lua_setfield(l, -2, c"__metatable".as_ptr());

        let metamethods: [(&CStr, LuaFunction); 4] = [
            (c"__index", state.create_function(object_index)?),
            (c"__newindex", state.create_function(object_newindex)?),
            (c"__eq", state.create_function(object_eq)?),
            (c"__tostring", state.create_function(object_tostring)?),
        ];
        for (name, func) in &metamethods {
            state.push_ref(l, &func.0, true)?;
            ffi::lua_setfield(l, -2, name.as_ptr());
        }
    }
    Ok(())
}

fn object_arg(args: &[LuaValue]) -> Result<&HostObjectRef> {
    args.first()
        .and_then(LuaValue::as_object)
        .ok_or_else(|| BridgeError::runtime("host object expected"))
}

fn object_index(ctx: &CallContext, args: Vec<LuaValue>) -> Result<HostReturn> {
    let obj = object_arg(&args)?;
    let Some(name) = args.get(1).and_then(LuaValue::as_str) else {
        return Ok(HostReturn::single(LuaValue::Nil));
    };
    match obj.reflect(name) {
        ReflectionKind::Property => Ok(HostReturn::single(obj.get_property(name)?)),
        ReflectionKind::Function => {
            let bound = obj.clone();
            let method = name.to_string();
            let func = ctx.state().create_function(move |ctx, mut args| {
                // Method syntax passes the object itself first.
                if matches!(args.first(), Some(LuaValue::Object(o)) if *o == bound) {
                    args.remove(0);
                }
                Ok(HostReturn::Values(bound.invoke(ctx, &method, args)?))
            })?;
            Ok(HostReturn::single(func))
        }
        ReflectionKind::Unknown => Ok(HostReturn::single(LuaValue::Nil)),
    }
}

fn object_newindex(_ctx: &CallContext, mut args: Vec<LuaValue>) -> Result<HostReturn> {
    let value = if args.len() > 2 {
        args.swap_remove(2)
    } else {
        LuaValue::Nil
    };
    let obj = object_arg(&args)?;
    let name = args
        .get(1)
        .and_then(LuaValue::as_str)
        .ok_or_else(|| BridgeError::runtime("property name must be a string"))?;
    match obj.reflect(name) {
        ReflectionKind::Property => {
            obj.set_property(name, value)?;
            Ok(HostReturn::none())
        }
        _ => Err(BridgeError::Runtime(format!(
            "{} has no property '{name}'",
            obj.class_name()
        ))),
    }
}

fn object_eq(_ctx: &CallContext, args: Vec<LuaValue>) -> Result<HostReturn> {
    let same = match (args.first(), args.get(1)) {
        (Some(LuaValue::Object(a)), Some(LuaValue::Object(b))) => a == b,
        _ => false,
    };
    Ok(HostReturn::single(same))
}

fn object_tostring(_ctx: &CallContext, args: Vec<LuaValue>) -> Result<HostReturn> {
    let obj = object_arg(&args)?;
    Ok(HostReturn::single(format!(
        "{}: 0x{:x}",
        obj.class_name(),
        obj.to_pointer()
    )))
}
