//! Loading and precompiling chunks.

use std::ffi::{c_int, c_void, CStr, CString};
use std::path::Path;

use mlua_sys as ffi;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::reference::LuaFunction;
use crate::stack::{check_stack, error_message, StackGuard};
use crate::state::LuaState;
use crate::value::LuaValue;

impl LuaState {
    /// Compile `source` without running it.
    pub fn load(&self, source: impl AsRef<[u8]>, chunk_name: &str) -> Result<LuaFunction> {
        self.load_chunk(source.as_ref(), &self.config().chunk_name(chunk_name), c"t")
    }

    /// Compile and run `source`, returning every value the chunk returns.
    pub fn run_string(&self, source: impl AsRef<[u8]>, chunk_name: &str) -> Result<Vec<LuaValue>> {
        self.load(source, chunk_name)?.call_multi([])
    }

    /// Compile a script or precompiled file. A leading `#` line is skipped
    /// so executable scripts work.
    ///
    /// Precompiled files carry the same trust requirement as
    /// [`run_bytecode`](Self::run_bytecode).
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LuaFunction> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), len = bytes.len(), "loading file");
        let name = format!("@{}", path.display());
        self.load_chunk(skip_shebang(&bytes), &name, c"bt")
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Vec<LuaValue>> {
        self.load_file(path)?.call_multi([])
    }

    /// Run precompiled bytecode produced by [`dump`](Self::dump).
    ///
    /// # Trust
    ///
    /// The interpreter does not verify bytecode. Truncated or foreign blobs
    /// are rejected, but a well-formed blob with crafted instructions can
    /// corrupt memory. Only pass bytes from a trusted `dump`, never input
    /// from an untrusted source.
    pub fn run_bytecode(&self, bytes: &[u8], chunk_name: &str) -> Result<Vec<LuaValue>> {
        self.load_chunk(bytes, &self.config().chunk_name(chunk_name), c"b")?
            .call_multi([])
    }

    /// Precompile a function. `strip` drops debug information.
    pub fn dump(&self, function: &LuaFunction, strip: bool) -> Result<Vec<u8>> {
        let l = self.lua();
        let mut out: Vec<u8> = Vec::new();
        let status = unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            self.push_ref(l, &function.0, true)?;
            ffi::lua_dump(
                l,
                write_chunk,
                &mut out as *mut Vec<u8> as *mut c_void,
                strip as c_int,
            )
        };
        if status != 0 {
            return Err(BridgeError::runtime("unable to dump given function"));
        }
        Ok(out)
    }

    fn load_chunk(&self, bytes: &[u8], name: &str, mode: &CStr) -> Result<LuaFunction> {
        let name = CString::new(name)
            .map_err(|_| BridgeError::runtime("chunk name contains a NUL byte"))?;
        let l = self.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            let status = ffi::luaL_loadbufferx(
                l,
                bytes.as_ptr() as *const _,
                bytes.len(),
                name.as_ptr(),
                mode.as_ptr(),
            );
            if status != ffi::LUA_OK {
                return Err(BridgeError::Runtime(error_message(l, -1)));
            }
            Ok(LuaFunction(self.register_top(l)))
        }
    }
}

/// Blank out a `#!` line but keep its newline so line numbers still match.
fn skip_shebang(bytes: &[u8]) -> &[u8] {
    if bytes.first() != Some(&b'#') {
        return bytes;
    }
    match bytes.iter().position(|&b| b == b'\n') {
        Some(end) => &bytes[end..],
        None => &[],
    }
}

unsafe extern "C-unwind" fn write_chunk(
    _l: *mut ffi::lua_State,
    p: *const c_void,
    sz: usize,
    ud: *mut c_void,
) -> c_int {
    let out = &mut *(ud as *mut Vec<u8>);
    out.extend_from_slice(std::slice::from_raw_parts(p as *const u8, sz));
    0
}
