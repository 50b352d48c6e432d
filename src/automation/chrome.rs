//! Headless Chrome 驱动
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! headless_chrome 是同步 API，所有调用都放进 `spawn_blocking`；元素句柄即 DOM node id。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, Element, Tab};

use crate::automation::{DriverError, ElementHandle, PageDriver, WaitCondition};

pub struct ChromeDriver {
    // 持有 Browser 保证进程存活到会话结束
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    /// 启动浏览器并打开一个标签页
    pub async fn launch() -> Result<Self, DriverError> {
        tokio::task::spawn_blocking(|| {
            let browser = Browser::default()
                .map_err(|e| DriverError::Session(format!("Chrome launch failed: {e}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| DriverError::Session(format!("Browser tab failed: {e}")))?;
            tracing::info!("chrome session started");
            Ok(Self {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| DriverError::Session(e.to_string()))?
    }

    /// 在阻塞线程上执行一次 Tab 操作
    async fn with_tab<T, F>(&self, f: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(tab.as_ref()))
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?
    }
}

fn element(tab: &Tab, handle: ElementHandle) -> Result<Element<'_>, DriverError> {
    Element::new(tab, handle.id() as u32)
        .map_err(|e| DriverError::ElementNotFound(format!("node {}: {e}", handle.id())))
}

fn handle_of(el: &Element<'_>) -> ElementHandle {
    ElementHandle::new(u64::from(el.node_id))
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let url = url.to_string();
        tracing::info!(url = %url, "browser navigate");
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| DriverError::Navigation(format!("{url}: {e}")))?;
            tab.wait_until_navigated()
                .map_err(|e| DriverError::Navigation(format!("{url}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn find(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let found = match scope {
                Some(s) => element(tab, s)?.find_element(&selector).ok(),
                None => tab.find_element(&selector).ok(),
            };
            Ok(found.as_ref().map(handle_of))
        })
        .await
    }

    async fn find_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let found = match scope {
                Some(s) => element(tab, s)?.find_elements(&selector).unwrap_or_default(),
                None => tab.find_elements(&selector).unwrap_or_default(),
            };
            Ok(found.iter().map(handle_of).collect())
        })
        .await
    }

    async fn text(&self, handle: ElementHandle) -> Result<String, DriverError> {
        self.with_tab(move |tab| {
            element(tab, handle)?
                .get_inner_text()
                .map_err(|e| DriverError::Session(format!("inner text: {e}")))
        })
        .await
    }

    async fn send_keys(&self, handle: ElementHandle, text: &str) -> Result<(), DriverError> {
        let text = text.to_string();
        self.with_tab(move |tab| {
            let el = element(tab, handle)?;
            el.click()
                .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
            el.type_into(&text)
                .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn click(&self, handle: ElementHandle) -> Result<(), DriverError> {
        self.with_tab(move |tab| {
            let el = element(tab, handle)?;
            el.scroll_into_view()
                .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
            el.click()
                .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn wait_until(
        &self,
        selector: &str,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let timed_out = || DriverError::Timeout {
                selector: selector.clone(),
                timeout_ms: timeout.as_millis() as u64,
            };
            let el = tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .map_err(|_| timed_out())?;
            // 没有盒模型即不可见，视为不可点击
            if condition == WaitCondition::Clickable && el.get_box_model().is_err() {
                return Err(timed_out());
            }
            Ok(handle_of(&el))
        })
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.with_tab(|tab| {
            tab.close(true)
                .map_err(|e| DriverError::Session(format!("close tab: {e}")))?;
            tracing::info!("chrome session closed");
            Ok(())
        })
        .await
    }
}
