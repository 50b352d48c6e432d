//! 核心层：错误类型、运行阶段、运行上下文与组件构建

pub mod builder;
pub mod context;
pub mod error;
pub mod state;

pub use builder::{AgentBuilder, AgentComponents};
pub use context::RunContext;
pub use error::AgentError;
pub use state::{PhaseTracker, RunPhase};
