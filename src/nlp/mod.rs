//! 任务文本理解：文本 → {context, intent, entities}
//!
//! 核心逻辑只把分类器当黑盒使用；默认实现是确定性的关键词 / 正则规则，便于测试注入。

pub mod keyword;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub use keyword::KeywordClassifier;

pub const INTENT_BOOK_FLIGHT: &str = "Book a flight";
pub const INTENT_COMPLETE_FORM: &str = "Complete a form";
pub const INTENT_BROWSE: &str = "Browse";
pub const INTENT_UNKNOWN: &str = "Unknown";

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub context: String,
    pub intent: String,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
}

impl TaskContext {
    pub fn new(context: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            intent: intent.into(),
            entities: BTreeMap::new(),
        }
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }
}

#[async_trait]
pub trait ContextClassifier: Send + Sync {
    async fn infer(&self, text: &str) -> Result<TaskContext, AgentError>;
}

/// 固定结果的分类器（测试注入）
#[derive(Debug, Clone)]
pub struct FixedClassifier(pub TaskContext);

#[async_trait]
impl ContextClassifier for FixedClassifier {
    async fn infer(&self, _text: &str) -> Result<TaskContext, AgentError> {
        Ok(self.0.clone())
    }
}
