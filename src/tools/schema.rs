//! 工具参数 Schema：schemars 从参数结构体生成，同时用于声明与调用前校验
//!
//! 声明给模型的 parameters 与校验用的是同一份 JSON Schema，避免两者漂移。
//! 校验只覆盖声明里出现的部分：必填项、未知参数、基本类型（string / integer / number / boolean / array / object / null）。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::tools::ToolFailure;

/// 生成参数 JSON Schema（去掉 $schema / title / description，补齐 properties 与 required）
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let root = schema_for!(T);
    let mut value = serde_json::to_value(&root).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Value::Object(obj) = &mut value {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("description");
        obj.entry("type").or_insert_with(|| Value::String("object".into()));
        obj.entry("properties").or_insert_with(|| Value::Object(Map::new()));
        obj.entry("required").or_insert_with(|| Value::Array(Vec::new()));
    }
    value
}

/// 按 Schema 校验参数；模型给出空参数时视为 {}
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let empty = Map::new();
    let args = match args {
        Value::Object(m) => m,
        Value::Null => &empty,
        other => return Err(format!("arguments must be a JSON object, got {}", json_type(other))),
    };
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            match args.get(name) {
                None | Some(Value::Null) => return Err(format!("missing required argument '{name}'")),
                Some(_) => {}
            }
        }
    }

    for (name, value) in args {
        let Some(prop) = properties.get(name) else {
            return Err(format!("unexpected argument '{name}'"));
        };
        if !type_matches(prop.get("type"), value) {
            return Err(format!(
                "argument '{name}' must be {}, got {}",
                describe_type(prop.get("type")),
                json_type(value)
            ));
        }
    }
    Ok(())
}

/// 反序列化为参数结构体（校验已由执行器完成）
pub fn decode_arguments<T: DeserializeOwned>(args: Value) -> Result<T, ToolFailure> {
    let args = if args.is_null() { Value::Object(Map::new()) } else { args };
    serde_json::from_value(args).map_err(|e| ToolFailure::invalid_arguments(e.to_string()))
}

fn type_matches(declared: Option<&Value>, value: &Value) -> bool {
    match declared {
        // 未声明类型的属性不做限制
        None => true,
        Some(Value::String(t)) => primitive_matches(t, value),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| primitive_matches(t, value)),
        Some(_) => true,
    }
}

fn primitive_matches(t: &str, value: &Value) -> bool {
    match t {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(declared: Option<&Value>) -> String {
    match declared {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        _ => "any".to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
