//! The dynamic value.
//!
//! [`LuaValue`] is a closed sum over everything that can cross the bridge.
//! Its coercions are permissive and never fail: a value of the wrong kind
//! converts to `0`, `0.0`, `false` or an empty string. The typed handles it
//! wraps carry the strict, `Result`-returning API.

use std::fmt;
use std::rc::Rc;

use lunaris_core::codec::{self, Endian};
use lunaris_core::coerce::{self, Number};

use crate::error::{BridgeError, Result};
use crate::host::{HostObject, HostObjectRef};
use crate::reference::{LuaFunction, LuaTable, LuaThread, LuaUserData};
use crate::state::LuaState;

/// Variant tag of a [`LuaValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nil,
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Table,
    Function,
    Thread,
    UserData,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::Thread => "thread",
            ValueType::UserData => "userdata",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value crossing the host/interpreter boundary.
#[derive(Clone, Debug, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    /// Raw bytes; Lua strings need not be UTF-8.
    String(Vec<u8>),
    /// A host object exposed through reflection.
    Object(HostObjectRef),
    Table(LuaTable),
    Function(LuaFunction),
    Thread(LuaThread),
    UserData(LuaUserData),
}

impl LuaValue {
    /// Wrap a host object.
    pub fn object(obj: impl HostObject + 'static) -> Self {
        LuaValue::Object(HostObjectRef::new(obj))
    }

    pub fn light_user_data(ptr: usize) -> Self {
        LuaValue::UserData(LuaUserData::Light(ptr))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            LuaValue::Nil => ValueType::Nil,
            LuaValue::Boolean(_) => ValueType::Boolean,
            LuaValue::Integer(_) => ValueType::Integer,
            LuaValue::Number(_) => ValueType::Number,
            LuaValue::String(_) => ValueType::String,
            LuaValue::Object(_) => ValueType::Object,
            LuaValue::Table(_) => ValueType::Table,
            LuaValue::Function(_) => ValueType::Function,
            LuaValue::Thread(_) => ValueType::Thread,
            LuaValue::UserData(_) => ValueType::UserData,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, LuaValue::Boolean(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, LuaValue::Integer(_))
    }

    /// Float subtype only; see [`is_numeric`](Self::is_numeric).
    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Number(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, LuaValue::Integer(_) | LuaValue::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, LuaValue::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, LuaValue::Object(_))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, LuaValue::Table(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, LuaValue::Function(_))
    }

    pub fn is_thread(&self) -> bool {
        matches!(self, LuaValue::Thread(_))
    }

    pub fn is_user_data(&self) -> bool {
        matches!(self, LuaValue::UserData(_))
    }

    /// Whether the value lives in an instance's registry.
    pub fn is_instance_bound(&self) -> bool {
        matches!(
            self,
            LuaValue::Table(_)
                | LuaValue::Function(_)
                | LuaValue::Thread(_)
                | LuaValue::UserData(LuaUserData::Ref(_))
        )
    }

    /// The instance an instance-bound value belongs to.
    ///
    /// Fails with [`BridgeError::NotOwned`] for self-contained values and for
    /// values whose instance has been destroyed.
    pub fn owner(&self) -> Result<LuaState> {
        match self {
            LuaValue::Table(t) => t.r.owner(),
            LuaValue::Function(f) => f.0.owner(),
            LuaValue::Thread(t) => t.0.owner(),
            LuaValue::UserData(LuaUserData::Ref(r)) => r.owner(),
            _ => Err(BridgeError::NotOwned),
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            LuaValue::Integer(i) => Some(Number::Integer(*i)),
            LuaValue::Number(n) => Some(Number::Float(*n)),
            LuaValue::String(s) => coerce::str_to_number(s),
            _ => None,
        }
    }

    /// Integer coercion: floats truncate toward zero, strings follow
    /// `tonumber`, everything else is `0`.
    pub fn to_integer(&self) -> i64 {
        self.as_number().map(Number::to_i64_truncated).unwrap_or(0)
    }

    pub fn to_float(&self) -> f64 {
        self.as_number().map(Number::to_f64).unwrap_or(0.0)
    }

    /// Lua truthiness: only `nil` and `false` are false.
    pub fn to_bool(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    /// Byte content of strings and the `tostring` form of numbers; empty
    /// for everything else.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            LuaValue::String(s) => s.clone(),
            LuaValue::Integer(i) => coerce::number_to_string(Number::Integer(*i)).into_bytes(),
            LuaValue::Number(n) => coerce::format_float(*n).into_bytes(),
            _ => Vec::new(),
        }
    }

    /// Exact-variant accessors.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LuaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_object(&self) -> Option<&HostObjectRef> {
        match self {
            LuaValue::Object(o) => Some(o),
            _ => None,
        }
    }

    fn mismatch(&self, expected: ValueType) -> BridgeError {
        BridgeError::TypeMismatch {
            expected,
            found: self.value_type(),
        }
    }

    /// Strict accessor for the table variant.
    pub fn as_table(&self) -> Result<&LuaTable> {
        match self {
            LuaValue::Table(t) => Ok(t),
            _ => Err(self.mismatch(ValueType::Table)),
        }
    }

    pub fn as_function(&self) -> Result<&LuaFunction> {
        match self {
            LuaValue::Function(f) => Ok(f),
            _ => Err(self.mismatch(ValueType::Function)),
        }
    }

    pub fn as_thread(&self) -> Result<&LuaThread> {
        match self {
            LuaValue::Thread(t) => Ok(t),
            _ => Err(self.mismatch(ValueType::Thread)),
        }
    }

    /// Identity of reference values; `0` for scalars and strings.
    pub fn to_pointer(&self) -> usize {
        match self {
            LuaValue::Object(o) => o.to_pointer(),
            LuaValue::Table(t) => t.to_pointer(),
            LuaValue::Function(f) => f.to_pointer(),
            LuaValue::Thread(t) => t.to_pointer(),
            LuaValue::UserData(u) => u.to_pointer(),
            _ => 0,
        }
    }

    pub fn to_hex_pointer(&self) -> String {
        format!("0x{:x}", self.to_pointer())
    }

    pub fn to_base64(&self) -> String {
        codec::encode_base64(&self.to_bytes())
    }

    pub fn from_base64(text: &str) -> Result<LuaValue> {
        Ok(LuaValue::String(codec::decode_base64(text)?))
    }

    /// Validate UTF-8 bytes into a string value.
    pub fn from_utf8(bytes: &[u8]) -> Result<LuaValue> {
        Ok(LuaValue::from(codec::decode_utf8(bytes)?))
    }

    pub fn to_utf8(&self) -> Result<Vec<u8>> {
        Ok(codec::encode_utf8(&self.utf8_text()?))
    }

    pub fn from_utf16(bytes: &[u8]) -> Result<LuaValue> {
        Self::from_utf16_with(bytes, Endian::NATIVE)
    }

    pub fn from_utf16_with(bytes: &[u8], endian: Endian) -> Result<LuaValue> {
        Ok(LuaValue::from(codec::decode_utf16(bytes, endian)?))
    }

    pub fn to_utf16(&self) -> Result<Vec<u8>> {
        self.to_utf16_with(Endian::NATIVE)
    }

    pub fn to_utf16_with(&self, endian: Endian) -> Result<Vec<u8>> {
        Ok(codec::encode_utf16(&self.utf8_text()?, endian))
    }

    pub fn from_utf32(bytes: &[u8]) -> Result<LuaValue> {
        Self::from_utf32_with(bytes, Endian::NATIVE)
    }

    pub fn from_utf32_with(bytes: &[u8], endian: Endian) -> Result<LuaValue> {
        Ok(LuaValue::from(codec::decode_utf32(bytes, endian)?))
    }

    pub fn to_utf32(&self) -> Result<Vec<u8>> {
        self.to_utf32_with(Endian::NATIVE)
    }

    pub fn to_utf32_with(&self, endian: Endian) -> Result<Vec<u8>> {
        Ok(codec::encode_utf32(&self.utf8_text()?, endian))
    }

    fn utf8_text(&self) -> Result<String> {
        Ok(codec::decode_utf8(&self.to_bytes())?)
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Integer(b)) => a == b,
            (LuaValue::Number(a), LuaValue::Number(b)) => a == b,
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Object(a), LuaValue::Object(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => a == b,
            (LuaValue::Function(a), LuaValue::Function(b)) => a == b,
            (LuaValue::Thread(a), LuaValue::Thread(b)) => a == b,
            (LuaValue::UserData(a), LuaValue::UserData(b)) => a == b,
            _ => false,
        }
    }
}

/// `tostring`-style rendering.
impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => f.write_str("nil"),
            LuaValue::Boolean(b) => write!(f, "{b}"),
            LuaValue::Integer(i) => write!(f, "{i}"),
            LuaValue::Number(n) => f.write_str(&coerce::format_float(*n)),
            LuaValue::String(s) => f.write_str(&String::from_utf8_lossy(s)),
            LuaValue::Object(o) => write!(f, "{}: 0x{:x}", o.class_name(), o.to_pointer()),
            LuaValue::Table(t) => write!(f, "table: 0x{:x}", t.to_pointer()),
            LuaValue::Function(func) => write!(f, "function: 0x{:x}", func.to_pointer()),
            LuaValue::Thread(t) => write!(f, "thread: 0x{:x}", t.to_pointer()),
            LuaValue::UserData(u) => write!(f, "userdata: 0x{:x}", u.to_pointer()),
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<i64> for LuaValue {
    fn from(i: i64) -> Self {
        LuaValue::Integer(i)
    }
}

impl From<i32> for LuaValue {
    fn from(i: i32) -> Self {
        LuaValue::Integer(i as i64)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<f32> for LuaValue {
    fn from(n: f32) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<&str> for LuaValue {
    fn from(s: &str) -> Self {
        LuaValue::String(s.as_bytes().to_vec())
    }
}

impl From<String> for LuaValue {
    fn from(s: String) -> Self {
        LuaValue::String(s.into_bytes())
    }
}

impl From<Vec<u8>> for LuaValue {
    fn from(b: Vec<u8>) -> Self {
        LuaValue::String(b)
    }
}

impl From<&[u8]> for LuaValue {
    fn from(b: &[u8]) -> Self {
        LuaValue::String(b.to_vec())
    }
}

impl From<LuaTable> for LuaValue {
    fn from(t: LuaTable) -> Self {
        LuaValue::Table(t)
    }
}

impl From<LuaFunction> for LuaValue {
    fn from(f: LuaFunction) -> Self {
        LuaValue::Function(f)
    }
}

impl From<LuaThread> for LuaValue {
    fn from(t: LuaThread) -> Self {
        LuaValue::Thread(t)
    }
}

impl From<HostObjectRef> for LuaValue {
    fn from(o: HostObjectRef) -> Self {
        LuaValue::Object(o)
    }
}

impl<T: HostObject + 'static> From<Rc<T>> for LuaValue {
    fn from(o: Rc<T>) -> Self {
        LuaValue::Object(HostObjectRef::from(o))
    }
}

impl<T: Into<LuaValue>> From<Option<T>> for LuaValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(LuaValue::Nil)
    }
}
