//! 角色注册表：主管与工人特化
//!
//! 每个角色有专属指令；迭代上限可按角色覆盖全局配置（主管统筹型任务往往需要
//! 比单一工人更多的步数）。

use std::collections::HashMap;

/// 一个角色的定义
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    /// 角色专属系统指令
    pub instructions: String,
    /// 按角色覆盖的迭代上限；None 时用全局配置
    pub max_iterations: Option<u32>,
    /// 是否允许发起委派（通常只有主管）
    pub can_delegate: bool,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            max_iterations: None,
            can_delegate: false,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// 允许该角色发起委派
    pub fn delegating(mut self) -> Self {
        self.can_delegate = true;
        self
    }
}

/// 角色注册表：一个主管 + 若干工人
pub struct RoleRegistry {
    supervisor: String,
    roles: HashMap<String, RoleSpec>,
}

impl RoleRegistry {
    /// 以主管角色创建注册表
    pub fn new(supervisor: RoleSpec) -> Self {
        let name = supervisor.name.clone();
        let mut roles = HashMap::new();
        roles.insert(name.clone(), supervisor);
        Self {
            supervisor: name,
            roles,
        }
    }

    /// 注册一个工人角色
    pub fn with_worker(mut self, role: RoleSpec) -> Self {
        self.roles.insert(role.name.clone(), role);
        self
    }

    pub fn register(&mut self, role: RoleSpec) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn get(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.get(name)
    }

    pub fn supervisor(&self) -> &RoleSpec {
        &self.roles[&self.supervisor]
    }

    /// 工人角色名列表（不含主管，排序稳定）
    pub fn worker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .roles
            .keys()
            .filter(|n| **n != self.supervisor)
            .cloned()
            .collect();
        names.sort();
        names
    }
}
