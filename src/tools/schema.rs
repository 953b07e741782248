//! 委派请求 JSON Schema 生成（schemars 自动生成）
//!
//! 将「合法 delegate 调用」的 JSON 结构注入可委派角色的指令，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};

/// delegate 动作的参数格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DelegateCallFormat {
    /// 目标工人角色名，如 researcher、coder
    pub worker: String,
    /// 交给该工人的任务描述
    pub task: String,
}

/// 返回 delegate 参数的 JSON Schema 字符串，可拼入角色指令
pub fn delegate_args_schema_json() -> String {
    let schema = schema_for!(DelegateCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
