//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ENGINE__MAX_ITERATIONS=25`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::delegation::SameRolePolicy;
use crate::engine::{EngineConfig, OverflowPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub delegation: DelegationSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [engine] 段：迭代上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 全局迭代上限（必配项，默认 50；可按角色覆盖）
    pub max_iterations: u32,
    /// 单次 LLM 调用超时（秒）
    pub agent_timeout_secs: u64,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            agent_timeout_secs: 60,
            tool_timeout_secs: 30,
        }
    }
}

/// [delegation] 段：同名角色并发策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    /// independent（默认，全并行）/ serialized（同角色串行）
    pub same_role: SameRolePolicy,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            same_role: SameRolePolicy::Independent,
        }
    }
}

/// [events] 段：订阅者缓冲与溢出策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    pub capacity: usize,
    /// drop_oldest / drop_newest
    pub overflow: OverflowPolicy,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// [checkpoint] 段：存储后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// memory / sqlite
    pub backend: String,
    /// sqlite 后端的数据库路径
    pub db_path: Option<PathBuf>,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            db_path: None,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            delegation: DelegationSection::default(),
            events: EventsSection::default(),
            checkpoint: CheckpointSection::default(),
            llm: LlmSection::default(),
        }
    }
}

impl AppConfig {
    /// 提取引擎运行参数
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_iterations: self.engine.max_iterations,
            agent_timeout_secs: self.engine.agent_timeout_secs,
            tool_timeout_secs: self.engine.tool_timeout_secs,
            same_role_policy: self.delegation.same_role,
            event_capacity: self.events.capacity,
            event_overflow: self.events.overflow,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
