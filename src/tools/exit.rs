//! 退出哨兵：处理函数不做任何事，结果消息本身就是终止信号

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ExitArgs {}

pub fn exit_program(_args: ExitArgs) -> Value {
    Value::String(String::new())
}
