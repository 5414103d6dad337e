//! Conversion between `serde_json::Value` and `mlua::Value`.
//!
//! Maps become key-indexed Lua tables, arrays become 1-indexed Lua tables,
//! primitives pass through unchanged. The inverse direction (Lua table back
//! to JSON) cannot tell a map from an array by type alone — Lua only has
//! tables — so it probes the table's keys: a table round-trips to a JSON
//! array only if its keys are exactly `1..=n` for some `n >= 1`; otherwise
//! (including the empty table) it becomes a JSON object.

use chrono::DateTime;
use mlua::{Lua, Value as LuaValue};
use serde_json::Value as JsonValue;

use super::ScriptError;

/// Timestamps are handed to scripts as Unix seconds, not RFC3339 strings, so
/// policy authors can do arithmetic on them without a date library in Lua.
fn json_to_lua_string(lua: &Lua, s: &str) -> Result<LuaValue, ScriptError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(LuaValue::Integer(t.timestamp()));
    }
    Ok(LuaValue::String(lua.create_string(s)?))
}

pub fn json_to_lua(lua: &Lua, value: &JsonValue) -> Result<LuaValue, ScriptError> {
    Ok(match value {
        JsonValue::Null => LuaValue::Nil,
        JsonValue::Bool(b) => LuaValue::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                LuaValue::Integer(i)
            } else {
                LuaValue::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => json_to_lua_string(lua, s)?,
        JsonValue::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        JsonValue::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (k, v) in map {
                table.set(k.as_str(), json_to_lua(lua, v)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Returns `Some(n)` if `table`'s keys are exactly the positive integers `1..=n`.
fn array_length(table: &mlua::Table) -> Result<Option<usize>, ScriptError> {
    let mut max_key: i64 = 0;
    let mut count: i64 = 0;
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (key, _) = pair?;
        count += 1;
        let as_positive_int = match key {
            LuaValue::Integer(i) if i >= 1 => Some(i),
            LuaValue::Number(n) if n.fract() == 0.0 && n >= 1.0 => Some(n as i64),
            _ => None,
        };
        match as_positive_int {
            Some(i) => max_key = max_key.max(i),
            None => return Ok(None),
        }
    }
    if count == 0 || max_key != count {
        return Ok(None);
    }
    Ok(Some(max_key as usize))
}

pub fn lua_to_json(value: LuaValue) -> Result<JsonValue, ScriptError> {
    Ok(match value {
        LuaValue::Nil => JsonValue::Null,
        LuaValue::Boolean(b) => JsonValue::Bool(b),
        LuaValue::Integer(i) => JsonValue::Number(i.into()),
        LuaValue::Number(n) => serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        LuaValue::String(s) => JsonValue::String(s.to_str()?.to_owned()),
        LuaValue::Table(table) => match array_length(&table)? {
            Some(n) => {
                let mut items = Vec::with_capacity(n);
                for i in 1..=n {
                    let v: LuaValue = table.get(i)?;
                    items.push(lua_to_json(v)?);
                }
                JsonValue::Array(items)
            }
            None => {
                let mut map = serde_json::Map::new();
                for pair in table.pairs::<LuaValue, LuaValue>() {
                    let (k, v) = pair?;
                    let key = match k {
                        LuaValue::String(s) => s.to_str()?.to_owned(),
                        LuaValue::Integer(i) => i.to_string(),
                        LuaValue::Number(n) => n.to_string(),
                        other => {
                            return Err(ScriptError::UnsupportedKey(format!("{other:?}")));
                        }
                    };
                    map.insert(key, lua_to_json(v)?);
                }
                JsonValue::Object(map)
            }
        },
        other => return Err(ScriptError::UnsupportedValue(format!("{other:?}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_round_trips() {
        let lua = Lua::new();
        let original = json!({
            "a": 1,
            "b": "two",
            "c": true,
            "d": [1, 2, 3],
            "e": {"nested": "map"},
        });
        let lua_value = json_to_lua(&lua, &original).unwrap();
        let back = lua_to_json(lua_value).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn empty_array_round_trips_as_object() {
        let lua = Lua::new();
        let lua_value = json_to_lua(&lua, &json!([])).unwrap();
        let back = lua_to_json(lua_value).unwrap();
        // An empty Lua table cannot be distinguished from an empty map.
        assert_eq!(back, json!({}));
    }

    #[test]
    fn sparse_keys_become_object() {
        let lua = Lua::new();
        let table = lua.create_table().unwrap();
        table.set(1, "a").unwrap();
        table.set(3, "c").unwrap();
        let back = lua_to_json(LuaValue::Table(table)).unwrap();
        assert_eq!(back, json!({"1": "a", "3": "c"}));
    }

    #[test]
    fn rfc3339_timestamp_collapses_to_unix_seconds() {
        let lua = Lua::new();
        let lua_value = json_to_lua(&lua, &json!("2026-01-01T00:00:30Z")).unwrap();
        assert!(matches!(lua_value, LuaValue::Integer(1767225630)));
    }

    #[test]
    fn non_timestamp_string_passes_through() {
        let lua = Lua::new();
        let lua_value = json_to_lua(&lua, &json!("not-a-time")).unwrap();
        match lua_value {
            LuaValue::String(s) => assert_eq!(s.to_str().unwrap(), "not-a-time"),
            other => panic!("expected string, got {other:?}"),
        }
    }
}
