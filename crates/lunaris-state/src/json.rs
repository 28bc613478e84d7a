//! JSON encoding of values.
//!
//! A table whose keys are exactly `1..=n` (n > 0) encodes as an array; any
//! other table, including an empty one, encodes as an object with string or
//! number keys. Functions, threads, host objects and userdata have no JSON
//! form.

use lunaris_core::coerce::{self, Number};
use lunaris_core::CodecError;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::reference::LuaTable;
use crate::state::LuaState;
use crate::value::LuaValue;

const DEFAULT_MAX_DEPTH: usize = 64;

fn json_error(msg: impl Into<String>) -> CodecError {
    CodecError::Json(msg.into())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| json_error(format!("string is not valid UTF-8: {e}")).into())
}

impl LuaValue {
    pub fn to_json(&self) -> Result<Value> {
        let max_depth = self
            .owner()
            .map(|state| state.config().json_max_depth)
            .unwrap_or(DEFAULT_MAX_DEPTH);
        encode(self, 0, max_depth)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let value = self.to_json()?;
        serde_json::to_string(&value).map_err(|e| json_error(e.to_string()).into())
    }
}

fn encode(value: &LuaValue, depth: usize, max_depth: usize) -> Result<Value> {
    Ok(match value {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(i) => Value::from(*i),
        LuaValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or_else(|| json_error(format!("cannot encode {} as a number", coerce::format_float(*n))))?,
        LuaValue::String(s) => Value::String(utf8(s)?),
        LuaValue::Table(t) => encode_table(t, depth + 1, max_depth)?,
        other => return Err(CodecError::Unsupported(other.value_type().name()).into()),
    })
}

fn encode_table(table: &LuaTable, depth: usize, max_depth: usize) -> Result<Value> {
    if depth > max_depth {
        return Err(json_error(format!("nesting deeper than {max_depth} levels")).into());
    }
    let pairs = table.pairs()?;

    let n = pairs.len();
    let is_array = n > 0
        && pairs
            .iter()
            .all(|(k, _)| matches!(k, LuaValue::Integer(i) if *i >= 1 && (*i as usize) <= n));
    if is_array {
        let mut items = vec![Value::Null; n];
        for (k, v) in &pairs {
            if let LuaValue::Integer(i) = k {
                items[*i as usize - 1] = encode(v, depth, max_depth)?;
            }
        }
        return Ok(Value::Array(items));
    }

    let mut map = Map::new();
    for (k, v) in &pairs {
        let key = match k {
            LuaValue::String(s) => utf8(s)?,
            LuaValue::Integer(i) => coerce::number_to_string(Number::Integer(*i)),
            LuaValue::Number(f) => coerce::format_float(*f),
            other => {
                return Err(json_error(format!(
                    "cannot use a {} value as an object key",
                    other.value_type()
                ))
                .into())
            }
        };
        map.insert(key, encode(v, depth, max_depth)?);
    }
    Ok(Value::Object(map))
}

impl LuaState {
    /// Build a value from parsed JSON. Arrays become sequences starting at
    /// 1, objects become tables keyed by string, and `null` becomes `nil`.
    pub fn value_from_json(&self, json: &Value) -> Result<LuaValue> {
        self.decode(json, 0)
    }

    pub fn value_from_json_str(&self, text: &str) -> Result<LuaValue> {
        let json: Value = serde_json::from_str(text).map_err(|e| json_error(e.to_string()))?;
        self.value_from_json(&json)
    }

    fn decode(&self, json: &Value, depth: usize) -> Result<LuaValue> {
        let max_depth = self.config().json_max_depth;
        Ok(match json {
            Value::Null => LuaValue::Nil,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => LuaValue::Integer(i),
                None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => LuaValue::from(s.as_str()),
            Value::Array(items) => {
                if depth >= max_depth {
                    return Err(json_error(format!("nesting deeper than {max_depth} levels")).into());
                }
                let table = self.create_table_with_capacity(items.len(), 0)?;
                for (i, item) in items.iter().enumerate() {
                    table.raw_set(i as i64 + 1, self.decode(item, depth + 1)?)?;
                }
                LuaValue::Table(table)
            }
            Value::Object(map) => {
                if depth >= max_depth {
                    return Err(json_error(format!("nesting deeper than {max_depth} levels")).into());
                }
                let table = self.create_table_with_capacity(0, map.len())?;
                for (k, v) in map {
                    table.raw_set(k.as_str(), self.decode(v, depth + 1)?)?;
                }
                LuaValue::Table(table)
            }
        })
    }
}
