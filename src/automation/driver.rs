//! 页面驱动抽象
//!
//! 核心逻辑只依赖这里的几个操作：navigate / find / find_all / text / send_keys / click / wait_until。
//! 选择器语法（CSS）由具体实现负责解释；元素以不透明的 `ElementHandle` 传递。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 页面元素的不透明句柄，只在产生它的驱动内有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// 有界等待的条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// 元素出现在 DOM 中
    Present,
    /// 元素可见且可交互
    Clickable,
}

/// 驱动层错误（元素缺失、等待超时、导航失败等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {timeout_ms} ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// 页面驱动 trait：`scope` 为 None 时在整个文档内查找，否则只在该元素的后代中查找
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn find(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError>;

    async fn find_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    async fn text(&self, element: ElementHandle) -> Result<String, DriverError>;

    async fn send_keys(&self, element: ElementHandle, text: &str) -> Result<(), DriverError>;

    async fn click(&self, element: ElementHandle) -> Result<(), DriverError>;

    /// 有界等待：超时返回 `DriverError::Timeout`
    async fn wait_until(
        &self,
        selector: &str,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError>;

    /// 结束会话（关闭标签页 / 浏览器）
    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// find 的必需版本：找不到即 ElementNotFound
    async fn find_required(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<ElementHandle, DriverError> {
        self.find(scope, selector)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
    }
}
