//! Lunaris: a value bridge between host code and an embedded Lua 5.4
//! interpreter.
//!
//! A [`LuaState`] owns one interpreter instance. Everything that crosses the
//! boundary is a [`LuaValue`]: scalars and strings are copied, while tables,
//! functions, coroutines and full userdata are held through registry
//! references that point back weakly at the instance that produced them.
//!
//! ```no_run
//! use lunaris_state::{LuaState, LuaValue};
//!
//! let lua = LuaState::new()?;
//! let results = lua.run_string("return 1 + 1, 'two'", "example")?;
//! assert_eq!(results[0], LuaValue::Integer(2));
//! # Ok::<(), lunaris_state::BridgeError>(())
//! ```

pub mod call;
pub mod chunk;
pub mod config;
pub mod error;
pub mod host;
pub mod json;
pub mod reference;
pub mod stack;
pub mod state;
pub mod table;
pub mod thread;
pub mod value;

pub use config::StateConfig;
pub use error::{BridgeError, Result};
pub use host::{CallContext, HostObject, HostObjectRef, HostReturn, ReflectionKind};
pub use lunaris_core::{CodecError, Endian, Shape};
pub use reference::{LuaFunction, LuaRef, LuaTable, LuaThread, LuaUserData};
pub use state::{LuaState, WeakState};
pub use thread::ThreadStatus;
pub use value::{LuaValue, ValueType};
