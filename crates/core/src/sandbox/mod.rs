//! Sandboxed script runner for dynamic tools: the Lua body an approved
//! `tool_creation` proposal registers is compiled and run here, never
//! against the host's own interpreter.
//!
//! Out-of-process interpreters are the usual sandbox for a scripting
//! language; here the host language is itself compiled, so we embed a
//! scripting VM instead: a fresh `mlua::Lua` instance per execution with a
//! minimal allow-listed global table. `os`, `io`, `package`, and the debug
//! library are never registered — the VM simply has no handle to them,
//! which is a stronger guarantee than trying to blocklist dangerous calls
//! on a fully-loaded interpreter.

use std::time::Duration;

use mlua::{Lua, LuaOptions, StdLib, Value as LuaValue};
use serde_json::Value;

use crate::error::SandboxError;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const MIN_TIMEOUT_SECONDS: u64 = 30;
const MAX_TIMEOUT_SECONDS: u64 = 60;

pub struct ScriptRunner {
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(timeout_seconds: u64) -> Self {
        let clamped = timeout_seconds.clamp(MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS);
        Self {
            timeout: Duration::from_secs(clamped),
        }
    }

    /// Runs `script_body`'s global `run(params)` function against `params`
    /// under a timeout, returning `{"error": ...}`-shaped JSON on timeout
    /// or runtime failure, matching the documented script contract.
    pub async fn run(&self, script_body: String, params: Value) -> Result<Value, SandboxError> {
        let timeout = self.timeout;
        let handle = tokio::task::spawn_blocking(move || Self::run_sync(&script_body, params));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(_join_error)) => Err(SandboxError::RuntimeError {
                message: "script task panicked".to_string(),
            }),
            Err(_elapsed) => Ok(serde_json::json!({ "error": format!("script timed out after {}s", timeout.as_secs()) })),
        }
    }

    fn run_sync(script_body: &str, params: Value) -> Result<Value, SandboxError> {
        let lua = Lua::new_with(StdLib::TABLE | StdLib::STRING | StdLib::MATH, LuaOptions::default())
            .map_err(|e| SandboxError::RuntimeError { message: e.to_string() })?;

        register_allowed_globals(&lua).map_err(|e| SandboxError::RuntimeError { message: e.to_string() })?;

        let compiled = lua
            .load(script_body)
            .into_function()
            .map_err(|e| SandboxError::CompileError { message: e.to_string() })?;
        compiled
            .call::<_, ()>(())
            .map_err(|e| SandboxError::CompileError { message: e.to_string() })?;

        let run_fn: mlua::Function = lua
            .globals()
            .get("run")
            .map_err(|_| SandboxError::CompileError {
                message: "script must define a global function run(params)".to_string(),
            })?;

        let lua_params = json_to_lua(&lua, &params).map_err(|e| SandboxError::RuntimeError { message: e.to_string() })?;
        let result: LuaValue = run_fn
            .call(lua_params)
            .map_err(|e| SandboxError::RuntimeError { message: e.to_string() })?;

        lua_to_json(result).map_err(|e| SandboxError::RuntimeError { message: e.to_string() })
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS)
    }
}

fn register_allowed_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    let json_encode = lua.create_function(|_, value: LuaValue| {
        let json = lua_to_json(value).map_err(mlua::Error::external)?;
        Ok(json.to_string())
    })?;
    globals.set("json_encode", json_encode)?;

    let json_decode = lua.create_function(|lua, text: String| {
        let value: Value = serde_json::from_str(&text).map_err(mlua::Error::external)?;
        json_to_lua(lua, &value)
    })?;
    globals.set("json_decode", json_decode)?;

    let http_get = lua.create_function(|_, url: String| {
        let response = reqwest::blocking::get(&url).map_err(mlua::Error::external)?;
        response.text().map_err(mlua::Error::external)
    })?;
    globals.set("http_get", http_get)?;

    let http_post = lua.create_function(|_, (url, body): (String, String)| {
        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .map_err(mlua::Error::external)?;
        response.text().map_err(mlua::Error::external)
    })?;
    globals.set("http_post", http_post)?;

    Ok(())
}

fn json_to_lua<'lua>(lua: &'lua Lua, value: &Value) -> mlua::Result<LuaValue<'lua>> {
    Ok(match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => LuaValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

fn lua_to_json(value: LuaValue) -> mlua::Result<Value> {
    Ok(match value {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(b),
        LuaValue::Integer(i) => Value::Number(i.into()),
        LuaValue::Number(n) => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        LuaValue::String(s) => Value::String(s.to_str()?.to_string()),
        LuaValue::Table(table) => {
            let is_array = table.clone().pairs::<LuaValue, LuaValue>().enumerate().all(|(i, pair)| {
                pair.ok()
                    .map(|(k, _)| matches!(k, LuaValue::Integer(n) if n as usize == i + 1))
                    .unwrap_or(false)
            });
            if is_array {
                let mut items = Vec::new();
                for pair in table.sequence_values::<LuaValue>() {
                    items.push(lua_to_json(pair?)?);
                }
                Value::Array(items)
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.pairs::<String, LuaValue>() {
                    let (key, val) = pair?;
                    map.insert(key, lua_to_json(val)?);
                }
                Value::Object(map)
            }
        }
        _ => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_simple_script_and_returns_result() {
        let runner = ScriptRunner::new(30);
        let script = "function run(params) return { doubled = params.n * 2 } end".to_string();
        let result = runner.run(script, serde_json::json!({"n": 21})).await.unwrap();
        assert_eq!(result["doubled"], 42);
    }

    #[tokio::test]
    async fn rejects_script_with_syntax_error() {
        let runner = ScriptRunner::new(30);
        let script = "function run(params return end".to_string();
        let result = runner.run(script, serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn script_without_run_function_errors() {
        let runner = ScriptRunner::new(30);
        let script = "local x = 1".to_string();
        let result = runner.run(script, serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sandboxed_script_cannot_reach_os_library() {
        let runner = ScriptRunner::new(30);
        let script = "function run(params) return { path = os.getenv('HOME') } end".to_string();
        let result = runner.run(script, serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn slow_script_times_out() {
        let runner = ScriptRunner::new(MIN_TIMEOUT_SECONDS);
        // Can't practically sleep 30s in a unit test; this asserts the
        // timeout path shape instead via a direct Ok({"error":...}) call
        // would require a real timeout, so we just check the clamp logic.
        assert_eq!(runner.timeout, Duration::from_secs(MIN_TIMEOUT_SECONDS));
    }
}
