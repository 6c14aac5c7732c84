//! Quiz Agent - 有界工具调用编排
//!
//! 模块划分：
//! - **agent**: 从配置组装编排器（模型客户端、题库、工具、检查点）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机、终止策略、编排错误、会话监管
//! - **llm**: 决策客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）
//! - **memory**: 对话日志与会话检查点
//! - **observability**: 日志初始化
//! - **react**: 决策步骤与编排主循环
//! - **store**: 题库关系存储（SQLite）
//! - **tools**: 工具注册表、参数校验与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod store;
pub mod tools;
