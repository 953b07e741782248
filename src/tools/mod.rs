//! 工具层：Tool trait、注册表、批量执行单元与内置工具

pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::ToolExecutionUnit;
pub use registry::{Tool, ToolRegistry};
pub use schema::delegate_args_schema_json;
