//! 委派层：角色注册表与子会话委派管理

pub mod manager;
pub mod roles;

pub use manager::{DelegateArgs, SameRolePolicy, DELEGATE_ACTION};
pub use roles::{RoleRegistry, RoleSpec};

pub(crate) use manager::run_delegations;
