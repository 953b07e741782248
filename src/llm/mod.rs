//! LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脚本）

pub mod mock;
pub mod openai;
pub mod parse;
pub mod traits;

pub use mock::{MockLlmClient, RepeatingLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use parse::parse_agent_reply;
pub use traits::{AgentReply, LlmClient};
