//! Registry-backed handles.
//!
//! Every table, function, coroutine or full userdata that reaches host code
//! is anchored in the interpreter registry. The handle keeps the key, a weak
//! back-reference to the instance and the object's identity pointer. The key
//! is released lazily: dropping the last clone only queues it on the
//! instance.

use std::ffi::c_int;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use lunaris_core::Shape;

use crate::error::{BridgeError, Result};
use crate::state::{LuaState, WeakState};

struct RegistryKey {
    state: WeakState,
    key: c_int,
    ptr: usize,
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        if let Some(inner) = self.state.0.upgrade() {
            inner.queue_unref(self.key);
        }
    }
}

/// A shared registry key with a weak reference to its instance.
///
/// Two `LuaRef`s are equal when they come from the same instance and name
/// the same interpreter object, regardless of their key.
#[derive(Clone)]
pub struct LuaRef(Rc<RegistryKey>);

impl LuaRef {
    pub(crate) fn new(state: WeakState, key: c_int, ptr: usize) -> Self {
        LuaRef(Rc::new(RegistryKey { state, key, ptr }))
    }

    pub(crate) fn key(&self) -> c_int {
        self.0.key
    }

    /// The instance this handle belongs to, if it is still alive.
    pub fn owner(&self) -> Result<LuaState> {
        self.0.state.upgrade().ok_or(BridgeError::NotOwned)
    }

    pub fn is_owned_by(&self, state: &LuaState) -> bool {
        self.0.state.points_to(state)
    }

    pub fn is_alive(&self) -> bool {
        self.0.state.is_alive()
    }

    /// Identity of the referenced interpreter object.
    pub fn to_pointer(&self) -> usize {
        self.0.ptr
    }
}

impl PartialEq for LuaRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr == other.0.ptr && self.0.state.0.ptr_eq(&other.0.state.0)
    }
}

impl Eq for LuaRef {}

impl Hash for LuaRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ptr.hash(state);
        (self.0.state.0.as_ptr() as usize).hash(state);
    }
}

impl fmt::Debug for LuaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LuaRef(key: {}, ptr: {:#x})", self.0.key, self.0.ptr)
    }
}

/// A table, optionally tagged with a known shape.
#[derive(Clone)]
pub struct LuaTable {
    pub(crate) r: LuaRef,
    pub(crate) shape: Option<&'static Shape>,
}

impl LuaTable {
    pub(crate) fn new(r: LuaRef) -> Self {
        LuaTable { r, shape: None }
    }

    /// Tag the table with a shape; identity is unaffected.
    pub fn with_shape(mut self, shape: &'static Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn shape(&self) -> Option<&'static Shape> {
        self.shape
    }

    pub fn registry_ref(&self) -> &LuaRef {
        &self.r
    }

    pub fn to_pointer(&self) -> usize {
        self.r.to_pointer()
    }
}

impl PartialEq for LuaTable {
    fn eq(&self, other: &Self) -> bool {
        self.r == other.r
    }
}

impl Eq for LuaTable {}

impl Hash for LuaTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.r.hash(state)
    }
}

impl fmt::Debug for LuaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Some(shape) => write!(f, "LuaTable({:#x}, shape: {})", self.r.to_pointer(), shape.name),
            None => write!(f, "LuaTable({:#x})", self.r.to_pointer()),
        }
    }
}

/// A Lua or host function.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LuaFunction(pub(crate) LuaRef);

impl LuaFunction {
    pub fn registry_ref(&self) -> &LuaRef {
        &self.0
    }

    pub fn to_pointer(&self) -> usize {
        self.0.to_pointer()
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LuaFunction({:#x})", self.0.to_pointer())
    }
}

/// A coroutine.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LuaThread(pub(crate) LuaRef);

impl LuaThread {
    pub fn registry_ref(&self) -> &LuaRef {
        &self.0
    }

    pub fn to_pointer(&self) -> usize {
        self.0.to_pointer()
    }
}

impl fmt::Debug for LuaThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LuaThread({:#x})", self.0.to_pointer())
    }
}

/// Userdata that is not a bridged host object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LuaUserData {
    /// A bare pointer-sized value; needs no instance.
    Light(usize),
    /// Full userdata created by the interpreter or another library.
    Ref(LuaRef),
}

impl LuaUserData {
    pub fn to_pointer(&self) -> usize {
        match self {
            LuaUserData::Light(p) => *p,
            LuaUserData::Ref(r) => r.to_pointer(),
        }
    }
}
