//! Hive - Rust 多智能体编排引擎
//!
//! 模块划分：
//! - **checkpoint**: 带版本的会话快照存储（内存 / SQLite）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、会话监管（取消传播）
//! - **delegation**: 角色注册表与子会话委派（fan-out/fan-in）
//! - **engine**: 节点、路由、Agent 步、执行循环、事件广播
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本）
//! - **observability**: tracing 初始化
//! - **session**: 消息模型、关联校验、会话与快照
//! - **tools**: 工具箱（echo）与批量执行单元

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod delegation;
pub mod engine;
pub mod llm;
pub mod observability;
pub mod session;
pub mod tools;

pub use engine::{Engine, EngineConfig, SessionOutcome};
