//! Agent 错误类型
//!
//! 只有「任务目标缺字段」会让一次运行失败；动作失败、训练数据不足、模型缺失等都在循环内降级处理，
//! 以值（而非错误）的形式返回给调用方。

use thiserror::Error;

use crate::automation::DriverError;

/// Agent 运行过程中可能出现的错误（前置条件、动作派发、浏览器、模型存储、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 任务目标缺少 destination / date；在任何页面操作之前快速失败，不重试
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Action '{action}' failed: {cause}")]
    ActionDispatch { action: String, cause: String },

    #[error("Action timeout: {0}")]
    ActionTimeout(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Model store error: {0}")]
    Store(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Classifier error: {0}")]
    Classifier(String),
}

impl AgentError {
    /// 是否为前置条件失败（CLI 据此返回非零退出码）
    pub fn is_precondition(&self) -> bool {
        matches!(self, AgentError::Precondition(_))
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}
