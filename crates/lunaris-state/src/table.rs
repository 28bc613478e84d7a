//! Table protocol.
//!
//! Field access goes through the protected helpers so `__index`,
//! `__newindex` and `__len` run and their errors are caught. Traversal uses
//! `lua_next` directly and therefore sees raw contents.

use std::ffi::c_int;

use lunaris_core::shape::{self, ShapeKey, VECTOR};
use lunaris_core::Shape;
use mlua_sys as ffi;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::host::{HostObjectRef, ReflectionKind};
use crate::reference::LuaTable;
use crate::stack::{check_stack, StackGuard};
use crate::state::LuaState;
use crate::value::LuaValue;

impl LuaState {
    pub fn create_table(&self) -> Result<LuaTable> {
        self.create_table_with_capacity(0, 0)
    }

    /// Create a table with preallocated array and hash parts.
    pub fn create_table_with_capacity(&self, narr: usize, nrec: usize) -> Result<LuaTable> {
        let l = self.lua();
        let narr = c_int::try_from(narr).unwrap_or(c_int::MAX);
        let nrec = c_int::try_from(nrec).unwrap_or(c_int::MAX);
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            ffi::lua_createtable(l, narr, nrec);
            Ok(LuaTable::new(self.register_top(l)))
        }
    }

    /// Build an array-style table from `values`. `nil` entries leave holes.
    pub fn table_pack(&self, values: impl IntoIterator<Item = LuaValue>) -> Result<LuaTable> {
        let values: Vec<LuaValue> = values.into_iter().collect();
        let table = self.create_table_with_capacity(values.len(), 0)?;
        let l = self.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 2)?;
            self.push_ref(l, &table.r, true)?;
            for (i, v) in values.iter().enumerate() {
                self.push_value(l, v, true)?;
                ffi::lua_rawseti(l, -2, i as ffi::lua_Integer + 1);
            }
        }
        Ok(table)
    }

    /// Pack `first` followed by `second` into one array-style table.
    pub fn table_merge_pack(
        &self,
        first: impl IntoIterator<Item = LuaValue>,
        second: impl IntoIterator<Item = LuaValue>,
    ) -> Result<LuaTable> {
        self.table_pack(first.into_iter().chain(second))
    }

    /// Build a table from key/value pairs. Keys that cannot index a table
    /// (`nil`, NaN) are an error.
    pub fn table_from_map<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<LuaTable>
    where
        K: Into<LuaValue>,
        V: Into<LuaValue>,
    {
        let table = self.create_table()?;
        for (k, v) in entries {
            table.raw_set(k, v)?;
        }
        Ok(table)
    }

    /// Convert a host vector. A global `vector` constructor takes precedence
    /// when scripts define one; otherwise the result is an `{x, y, z}` table
    /// tagged with the vector shape.
    pub fn vector_to_value(&self, v: [f64; 3]) -> Result<LuaValue> {
        let ctor = self.get_global("vector")?;
        if ctor.is_function() {
            return ctor.call(v.map(LuaValue::Number));
        }
        let table = self.create_table_with_capacity(0, 3)?.with_shape(&VECTOR);
        for (field, component) in VECTOR.fields.iter().zip(v) {
            table.raw_set(shape_key_value(field.primary_key()), component)?;
        }
        Ok(LuaValue::Table(table))
    }
}

fn shape_key_value(key: ShapeKey) -> LuaValue {
    match key {
        ShapeKey::Name(name) => LuaValue::from(name),
        ShapeKey::Index(i) => LuaValue::Integer(i),
    }
}

fn check_raw_key(key: &LuaValue) -> Result<()> {
    match key {
        LuaValue::Nil => Err(BridgeError::runtime("table index is nil")),
        LuaValue::Number(n) if n.is_nan() => Err(BridgeError::runtime("table index is NaN")),
        _ => Ok(()),
    }
}

impl LuaTable {
    fn self_value(&self) -> LuaValue {
        LuaValue::Table(self.clone())
    }

    /// `t[key]`, honoring `__index`.
    pub fn get(&self, key: impl Into<LuaValue>) -> Result<LuaValue> {
        let state = self.r.owner()?;
        let helper = state.0.helpers.get;
        state.call_helper(helper, &[self.self_value(), key.into()])
    }

    /// `t[key] = value`, honoring `__newindex`. Assigning `nil` removes the
    /// entry.
    pub fn set(&self, key: impl Into<LuaValue>, value: impl Into<LuaValue>) -> Result<()> {
        let state = self.r.owner()?;
        let helper = state.0.helpers.set;
        state
            .call_helper(helper, &[self.self_value(), key.into(), value.into()])
            .map(drop)
    }

    pub fn get_field(&self, name: &str) -> Result<LuaValue> {
        self.get(name)
    }

    pub fn set_field(&self, name: &str, value: impl Into<LuaValue>) -> Result<()> {
        self.set(name, value)
    }

    pub fn get_index(&self, index: i64) -> Result<LuaValue> {
        self.get(index)
    }

    pub fn set_index(&self, index: i64, value: impl Into<LuaValue>) -> Result<()> {
        self.set(index, value)
    }

    /// Read without metamethods.
    pub fn raw_get(&self, key: impl Into<LuaValue>) -> Result<LuaValue> {
        let state = self.r.owner()?;
        let key = key.into();
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 2)?;
            state.push_ref(l, &self.r, true)?;
            state.push_value(l, &key, true)?;
            ffi::lua_rawget(l, -2);
            Ok(state.read_value(l, -1))
        }
    }

    /// Write without metamethods.
    pub fn raw_set(&self, key: impl Into<LuaValue>, value: impl Into<LuaValue>) -> Result<()> {
        let state = self.r.owner()?;
        let (key, value) = (key.into(), value.into());
        check_raw_key(&key)?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 3)?;
            state.push_ref(l, &self.r, true)?;
            state.push_value(l, &key, true)?;
            state.push_value(l, &value, true)?;
            ffi::lua_rawset(l, -3);
        }
        Ok(())
    }

    /// The length operator, honoring `__len`.
    pub fn length(&self) -> Result<i64> {
        let state = self.r.owner()?;
        let helper = state.0.helpers.len;
        Ok(state.call_helper(helper, &[self.self_value()])?.to_integer())
    }

    /// Border of the array part, without metamethods.
    pub fn raw_len(&self) -> Result<usize> {
        let state = self.r.owner()?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 1)?;
            state.push_ref(l, &self.r, true)?;
            Ok(ffi::lua_rawlen(l, -1) as usize)
        }
    }

    /// `t[1], t[2], ...` up to the first `nil`.
    pub fn unpack(&self) -> Result<Vec<LuaValue>> {
        let mut values = Vec::new();
        for index in 1.. {
            let item = self.get_index(index)?;
            if item.is_nil() {
                break;
            }
            values.push(item);
        }
        Ok(values)
    }

    /// `t[first] ..= t[last]`, holes included as `nil`.
    pub fn range(&self, first: i64, last: i64) -> Result<Vec<LuaValue>> {
        (first..=last).map(|i| self.get_index(i)).collect()
    }

    /// Every key/value pair, in `next` order.
    pub fn pairs(&self) -> Result<Vec<(LuaValue, LuaValue)>> {
        let state = self.r.owner()?;
        let l = state.lua();
        let mut entries = Vec::new();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 4)?;
            state.push_ref(l, &self.r, true)?;
            ffi::lua_pushnil(l);
            while ffi::lua_next(l, -2) != 0 {
                let key = state.read_value(l, -2);
                let value = state.read_value(l, -1);
                entries.push((key, value));
                ffi::lua_settop(l, -2);
            }
        }
        Ok(entries)
    }

    pub fn keys(&self) -> Result<Vec<LuaValue>> {
        Ok(self.pairs()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values(&self) -> Result<Vec<LuaValue>> {
        Ok(self.pairs()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Attach `metatable`, or detach with `None`.
    pub fn set_metatable(&self, metatable: Option<&LuaTable>) -> Result<()> {
        let state = self.r.owner()?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 2)?;
            state.push_ref(l, &self.r, true)?;
            match metatable {
                Some(mt) => state.push_ref(l, &mt.r, true)?,
                None => ffi::lua_pushnil(l),
            }
            ffi::lua_setmetatable(l, -2);
        }
        Ok(())
    }

    pub fn get_metatable(&self) -> Result<Option<LuaTable>> {
        let state = self.r.owner()?;
        let l = state.lua();
        unsafe {
            let _guard = StackGuard::new(l);
            check_stack(l, 2)?;
            state.push_ref(l, &self.r, true)?;
            if ffi::lua_getmetatable(l, -1) == 0 {
                return Ok(None);
            }
            Ok(Some(LuaTable::new(state.register_top(l))))
        }
    }

    /// Whether every key of `schema` is present here with a value of the
    /// same variant.
    pub fn implements(&self, schema: &LuaTable) -> Result<bool> {
        for (key, expected) in schema.pairs()? {
            let item = self.get(key)?;
            if item.is_nil() || item.value_type() != expected.value_type() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn implements_all<'a>(&self, schemas: impl IntoIterator<Item = &'a LuaTable>) -> Result<bool> {
        for schema in schemas {
            if !self.implements(schema)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn implements_any<'a>(&self, schemas: impl IntoIterator<Item = &'a LuaTable>) -> Result<bool> {
        for schema in schemas {
            if self.implements(schema)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The registered shape this table satisfies. A tagged table reports its
    /// tag; otherwise the shape with the most fields whose keys are all
    /// present wins.
    pub fn detect_shape(&self) -> Result<Option<&'static Shape>> {
        if self.shape.is_some() {
            return Ok(self.shape);
        }
        let keys = self.keys()?;
        Ok(shape::best_match(|key| {
            keys.iter().any(|k| match (key, k) {
                (ShapeKey::Name(name), LuaValue::String(s)) => s.as_slice() == name.as_bytes(),
                (ShapeKey::Index(i), LuaValue::Integer(j)) => i == *j,
                _ => false,
            })
        }))
    }

    /// Read the vector components through the shape's key fallbacks
    /// (`x`/`X`/`1`, ...). Missing or non-numeric components are NaN.
    pub fn to_vector(&self) -> Result<[f64; 3]> {
        let mut out = [f64::NAN; 3];
        for (slot, field) in out.iter_mut().zip(VECTOR.fields) {
            for key in field.keys {
                let value = self.get(shape_key_value(*key))?;
                if value.is_numeric() {
                    *slot = value.to_float();
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Copy string-keyed entries onto matching properties of `object`.
    /// Returns how many properties were set.
    pub fn fill_object(&self, object: &HostObjectRef) -> Result<usize> {
        let mut assigned = 0;
        for (key, value) in self.pairs()? {
            let Some(name) = key.as_str() else { continue };
            if object.reflect(name) == ReflectionKind::Property {
                object.set_property(name, value)?;
                assigned += 1;
            }
        }
        debug!(class = object.class_name(), assigned, "filled host object from table");
        Ok(assigned)
    }
}

impl LuaValue {
    /// `self[key]` on tables; `nil` for every other variant.
    pub fn get(&self, key: impl Into<LuaValue>) -> Result<LuaValue> {
        match self {
            LuaValue::Table(t) => t.get(key),
            _ => Ok(LuaValue::Nil),
        }
    }

    /// `self[key] = value` on tables; ignored for every other variant.
    pub fn set(&self, key: impl Into<LuaValue>, value: impl Into<LuaValue>) -> Result<()> {
        match self {
            LuaValue::Table(t) => t.set(key, value),
            _ => Ok(()),
        }
    }

    pub fn get_field(&self, name: &str) -> Result<LuaValue> {
        self.get(name)
    }

    pub fn set_field(&self, name: &str, value: impl Into<LuaValue>) -> Result<()> {
        self.set(name, value)
    }

    pub fn get_index(&self, index: i64) -> Result<LuaValue> {
        self.get(index)
    }

    pub fn set_index(&self, index: i64, value: impl Into<LuaValue>) -> Result<()> {
        self.set(index, value)
    }

    /// Table length (honoring `__len`), byte length of strings, `0`
    /// otherwise.
    pub fn length(&self) -> Result<i64> {
        match self {
            LuaValue::Table(t) => t.length(),
            LuaValue::String(s) => Ok(s.len() as i64),
            _ => Ok(0),
        }
    }

    pub fn unpack(&self) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Table(t) => t.unpack(),
            _ => Ok(Vec::new()),
        }
    }

    /// `unpack(first)` followed by `unpack(second)`.
    pub fn merge_unpack(first: &LuaValue, second: &LuaValue) -> Result<Vec<LuaValue>> {
        let mut values = first.unpack()?;
        values.extend(second.unpack()?);
        Ok(values)
    }

    pub fn range(&self, first: i64, last: i64) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Table(t) => t.range(first, last),
            _ => Ok(Vec::new()),
        }
    }

    pub fn pairs(&self) -> Result<Vec<(LuaValue, LuaValue)>> {
        match self {
            LuaValue::Table(t) => t.pairs(),
            _ => Ok(Vec::new()),
        }
    }

    pub fn keys(&self) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Table(t) => t.keys(),
            _ => Ok(Vec::new()),
        }
    }

    pub fn values(&self) -> Result<Vec<LuaValue>> {
        match self {
            LuaValue::Table(t) => t.values(),
            _ => Ok(Vec::new()),
        }
    }

    /// Attach a metatable to a table value; a `nil` metatable detaches.
    /// Returns whether anything was changed.
    pub fn set_metatable(&self, metatable: &LuaValue) -> Result<bool> {
        match (self, metatable) {
            (LuaValue::Table(t), LuaValue::Table(mt)) => t.set_metatable(Some(mt)).map(|_| true),
            (LuaValue::Table(t), LuaValue::Nil) => t.set_metatable(None).map(|_| true),
            _ => Ok(false),
        }
    }

    pub fn get_metatable(&self) -> Result<LuaValue> {
        match self {
            LuaValue::Table(t) => Ok(t.get_metatable()?.map(LuaValue::Table).unwrap_or_default()),
            _ => Ok(LuaValue::Nil),
        }
    }

    /// [`LuaTable::implements`]; `false` unless both values are tables.
    pub fn implements(&self, schema: &LuaValue) -> Result<bool> {
        match (self, schema) {
            (LuaValue::Table(t), LuaValue::Table(s)) => t.implements(s),
            _ => Ok(false),
        }
    }

    pub fn implements_all(&self, schemas: &[LuaValue]) -> Result<bool> {
        for schema in schemas {
            if !self.implements(schema)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn implements_any(&self, schemas: &[LuaValue]) -> Result<bool> {
        for schema in schemas {
            if self.implements(schema)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Vector components of a table value; all NaN for other variants.
    pub fn to_vector(&self) -> Result<[f64; 3]> {
        match self {
            LuaValue::Table(t) => t.to_vector(),
            _ => Ok([f64::NAN; 3]),
        }
    }

    pub fn detect_shape(&self) -> Result<Option<&'static Shape>> {
        match self {
            LuaValue::Table(t) => t.detect_shape(),
            _ => Ok(None),
        }
    }

    /// [`LuaTable::fill_object`] for table values; other variants set
    /// nothing.
    pub fn fill_object(&self, object: &HostObjectRef) -> Result<usize> {
        match self {
            LuaValue::Table(t) => t.fill_object(object),
            other => {
                debug!(found = %other.value_type(), "fill_object on a non-table value");
                Ok(0)
            }
        }
    }
}
