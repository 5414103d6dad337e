mod convert;

use crate::model::ResourceResult;
use convert::{json_to_lua, lua_to_json};
use kube::core::DynamicObject;
use mlua::{Lua, Table as LuaTable, Value as LuaValue};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to parse or run script: {0}")]
    Runtime(#[from] mlua::Error),

    #[error("script's top-level `{0}` function is missing")]
    MissingFunction(&'static str),

    #[error("script did not return a table")]
    NonTableReturn,

    #[error("failed to (de)serialize script input/output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported Lua table key: {0}")]
    UnsupportedKey(String),

    #[error("unsupported Lua value in script output: {0}")]
    UnsupportedValue(String),
}

/// A polymorphic capability: running user scripts over cluster objects.
/// Lua (via `mlua`) is one implementation; the trait boundary is what the
/// rest of the pipeline depends on, so a different embedded runtime could
/// be substituted without touching C2/C3.
pub trait ScriptRuntime: Send + Sync {
    fn is_match(&self, object: &DynamicObject, script: &str) -> Result<(bool, String), ScriptError>;

    fn transform(
        &self,
        object: &DynamicObject,
        script: &str,
    ) -> Result<DynamicObject, ScriptError>;

    fn aggregated_selection(
        &self,
        script: &str,
        resources: &[ResourceResult],
    ) -> Result<Vec<ResourceResult>, ScriptError>;
}

/// `ScriptRuntime` backed by a fresh `mlua::Lua` state per call.
///
/// No interpreter is pooled across calls: each of `is_match`/`transform`/
/// `aggregated_selection` constructs a new `Lua`, loads the script, calls
/// the expected top-level function, and lets the state drop on every
/// return path (including error paths), so there is no cross-call global
/// leakage. Pooling would need an audit of how scripts mutate globals
/// first — see the TODO in `cleaner-operator::dispatcher`.
#[derive(Default)]
pub struct LuaRuntime;

#[derive(Deserialize)]
struct EvaluateStatus {
    matching: bool,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct TransformStatus {
    resource: serde_json::Value,
    #[serde(default)]
    #[allow(dead_code)]
    message: String,
}

#[derive(Deserialize)]
struct AggregatedStatus {
    resources: Vec<AggregatedResource>,
}

#[derive(Deserialize)]
struct AggregatedResource {
    resource: serde_json::Value,
    #[serde(default)]
    message: String,
}

fn call_function(lua: &Lua, script: &str, name: &'static str) -> Result<LuaTable, ScriptError> {
    lua.load(script).exec()?;
    let func: mlua::Function = lua
        .globals()
        .get(name)
        .map_err(|_| ScriptError::MissingFunction(name))?;
    let ret: LuaValue = func.call(())?;
    match ret {
        LuaValue::Table(t) => Ok(t),
        _ => Err(ScriptError::NonTableReturn),
    }
}

impl ScriptRuntime for LuaRuntime {
    fn is_match(&self, object: &DynamicObject, script: &str) -> Result<(bool, String), ScriptError> {
        if script.trim().is_empty() {
            return Ok((true, String::new()));
        }

        let lua = Lua::new();
        let object_json = serde_json::to_value(object)?;
        let obj_table = json_to_lua(&lua, &object_json)?;
        lua.globals().set("obj", obj_table)?;

        let result_table = call_function(&lua, script, "evaluate")?;
        let result_json = lua_to_json(LuaValue::Table(result_table))?;
        let result: EvaluateStatus = serde_json::from_value(result_json)?;
        Ok((result.matching, result.message))
    }

    fn transform(
        &self,
        object: &DynamicObject,
        script: &str,
    ) -> Result<DynamicObject, ScriptError> {
        if script.trim().is_empty() {
            return Ok(object.clone());
        }

        let lua = Lua::new();
        let object_json = serde_json::to_value(object)?;
        let obj_table = json_to_lua(&lua, &object_json)?;
        lua.globals().set("obj", obj_table)?;

        let result_table = call_function(&lua, script, "transform")?;
        let result_json = lua_to_json(LuaValue::Table(result_table))?;
        let result: TransformStatus = serde_json::from_value(result_json)?;
        let new_object: DynamicObject = serde_json::from_value(result.resource)?;
        Ok(new_object)
    }

    fn aggregated_selection(
        &self,
        script: &str,
        resources: &[ResourceResult],
    ) -> Result<Vec<ResourceResult>, ScriptError> {
        if script.trim().is_empty() {
            return Ok(resources.to_vec());
        }

        let lua = Lua::new();
        let resources_json: Vec<serde_json::Value> = resources
            .iter()
            .map(|r| serde_json::to_value(&r.resource))
            .collect::<Result<_, _>>()?;
        let resources_table = json_to_lua(&lua, &serde_json::Value::Array(resources_json))?;
        lua.globals().set("resources", resources_table.clone())?;

        lua.load(script).exec()?;
        let func: mlua::Function = lua
            .globals()
            .get("evaluate")
            .map_err(|_| ScriptError::MissingFunction("evaluate"))?;
        let ret: LuaValue = func.call(resources_table)?;
        let result_table = match ret {
            LuaValue::Table(t) => t,
            _ => return Err(ScriptError::NonTableReturn),
        };
        let result_json = lua_to_json(LuaValue::Table(result_table))?;
        let result: AggregatedStatus = serde_json::from_value(result_json)?;
        result
            .resources
            .into_iter()
            .map(|r| -> Result<ResourceResult, ScriptError> {
                let resource: DynamicObject = serde_json::from_value(r.resource)?;
                Ok(ResourceResult::with_message(resource, r.message))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::{ObjectMeta, TypeMeta};

    fn sample_object() -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".into(),
                kind: "Secret".into(),
            }),
            metadata: ObjectMeta {
                name: Some("s".into()),
                namespace: Some("ns".into()),
                labels: Some(std::collections::BTreeMap::from([(
                    "k".to_string(),
                    "v".to_string(),
                )])),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_script_is_always_a_match() {
        let runtime = LuaRuntime;
        let (matching, message) = runtime.is_match(&sample_object(), "").unwrap();
        assert!(matching);
        assert_eq!(message, "");
    }

    #[test]
    fn is_match_reads_labels() {
        let runtime = LuaRuntime;
        let script = r#"
            function evaluate()
                if obj.metadata.labels.k == "v" then
                    return {matching=true, message="has label"}
                end
                return {matching=false}
            end
        "#;
        let (matching, message) = runtime.is_match(&sample_object(), script).unwrap();
        assert!(matching);
        assert_eq!(message, "has label");
    }

    #[test]
    fn identity_transform_returns_equal_object() {
        let runtime = LuaRuntime;
        let script = "function transform() return {resource=obj} end";
        let transformed = runtime.transform(&sample_object(), script).unwrap();
        assert_eq!(transformed, sample_object());
    }

    #[test]
    fn transform_mutates_requested_field() {
        let runtime = LuaRuntime;
        let script = r#"
            function transform()
                obj.metadata.labels.k = "new"
                return {resource=obj}
            end
        "#;
        let transformed = runtime.transform(&sample_object(), script).unwrap();
        assert_eq!(
            transformed.metadata.labels.unwrap().get("k").unwrap(),
            "new"
        );
    }

    #[test]
    fn identity_aggregation_is_identity() {
        let runtime = LuaRuntime;
        let resources = vec![ResourceResult::new(sample_object())];
        let out = runtime
            .aggregated_selection("function evaluate(r) return {resources=r} end", &resources)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].resource, sample_object());
    }

    #[test]
    fn missing_function_is_a_script_error() {
        let runtime = LuaRuntime;
        let err = runtime.is_match(&sample_object(), "x = 1").unwrap_err();
        assert!(matches!(err, ScriptError::MissingFunction("evaluate")));
    }
}
