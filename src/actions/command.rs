//! 动作命令：标签 → 一组具体的页面操作
//!
//! 动作以数据声明（`ActionSpec`：标签 + 步骤列表），在运行时构造成 `StepsCommand`；
//! 没有映射的标签解析为 `NoopCommand`，只记录、不报错。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::automation::{DriverError, PageDriver, WaitCondition};

/// 步骤模板变量（如 `{destination}`、`{date}`）
pub type ActionVars = BTreeMap<String, String>;

/// 把模板中的 `{name}` 替换为变量值；未知变量保持原样
pub fn render(template: &str, vars: &ActionVars) -> String {
    vars.iter().fold(template.to_string(), |acc, (k, v)| {
        acc.replace(&format!("{{{k}}}"), v)
    })
}

/// 单个页面操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionStep {
    /// 等待元素可点击后点击
    Click { selector: String },
    /// 点击匹配到的第一个元素（如结果列表的首行）
    ClickFirst { selector: String },
    /// 等待输入框可用后输入文本
    Fill { selector: String, text: String },
    Navigate { url: String },
}

impl ActionStep {
    async fn run(&self, driver: &dyn PageDriver, vars: &ActionVars, wait: Duration) -> Result<(), DriverError> {
        match self {
            ActionStep::Click { selector } => {
                let el = driver.wait_until(selector, WaitCondition::Clickable, wait).await?;
                driver.click(el).await
            }
            ActionStep::ClickFirst { selector } => {
                let first = driver
                    .find_all(None, selector)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DriverError::ElementNotFound(selector.clone()))?;
                driver.click(first).await
            }
            ActionStep::Fill { selector, text } => {
                let el = driver.wait_until(selector, WaitCondition::Clickable, wait).await?;
                driver.send_keys(el, &render(text, vars)).await
            }
            ActionStep::Navigate { url } => driver.navigate(&render(url, vars)).await,
        }
    }
}

/// 动作声明（来自配置）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub label: String,
    pub steps: Vec<ActionStep>,
}

impl ActionSpec {
    pub fn new(label: impl Into<String>, steps: Vec<ActionStep>) -> Self {
        Self {
            label: label.into(),
            steps,
        }
    }
}

/// 动作命令 trait：给定页面驱动执行一次
#[async_trait]
pub trait ActionCommand: Send + Sync {
    fn label(&self) -> &str;

    /// 空操作（未知标签）不会触碰页面
    fn is_noop(&self) -> bool {
        false
    }

    async fn execute(&self, driver: &dyn PageDriver, vars: &ActionVars) -> Result<(), DriverError>;
}

/// 按顺序执行一组步骤；任一步失败即返回该错误
pub struct StepsCommand {
    spec: ActionSpec,
    wait: Duration,
}

impl StepsCommand {
    pub fn new(spec: ActionSpec, wait: Duration) -> Self {
        Self { spec, wait }
    }
}

#[async_trait]
impl ActionCommand for StepsCommand {
    fn label(&self) -> &str {
        &self.spec.label
    }

    async fn execute(&self, driver: &dyn PageDriver, vars: &ActionVars) -> Result<(), DriverError> {
        for step in &self.spec.steps {
            step.run(driver, vars, self.wait).await?;
        }
        Ok(())
    }
}

pub struct NoopCommand {
    label: String,
}

impl NoopCommand {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl ActionCommand for NoopCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_noop(&self) -> bool {
        true
    }

    async fn execute(&self, _driver: &dyn PageDriver, _vars: &ActionVars) -> Result<(), DriverError> {
        Ok(())
    }
}

fn click(selector: &str) -> ActionStep {
    ActionStep::Click {
        selector: selector.to_string(),
    }
}

fn fill(selector: &str, text: &str) -> ActionStep {
    ActionStep::Fill {
        selector: selector.to_string(),
        text: text.to_string(),
    }
}

fn navigate(url: &str) -> ActionStep {
    ActionStep::Navigate { url: url.to_string() }
}

/// 内置动作表：策略模型的三个桶标签，加上订票计划用到的动作
pub fn default_action_specs() -> Vec<ActionSpec> {
    vec![
        ActionSpec::new("Click Button", vec![click("#submit")]),
        ActionSpec::new("Fill Form", vec![fill("#name", "John Doe")]),
        ActionSpec::new("Navigate", vec![navigate("https://example.com/new_page")]),
        ActionSpec::new("Navigate to booking site", vec![navigate("https://example.com/flights")]),
        ActionSpec::new(
            "Search for flights",
            vec![fill("#search_input", "{destination}"), click("#search_button")],
        ),
        ActionSpec::new(
            "Select cheapest option",
            vec![ActionStep::ClickFirst {
                selector: ".select-flight".to_string(),
            }],
        ),
        ActionSpec::new(
            "Fill form",
            vec![fill("#name", "John Doe"), fill("#email", "john@example.com")],
        ),
        ActionSpec::new("Submit booking", vec![click("#submit_button")]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::FixturePage;

    #[test]
    fn test_render_substitutes_known_vars() {
        let mut vars = ActionVars::new();
        vars.insert("destination".into(), "Tokyo".into());
        assert_eq!(render("to {destination} on {date}", &vars), "to Tokyo on {date}");
    }

    #[test]
    fn test_step_serde_shape() {
        let step: ActionStep =
            serde_json::from_str(r##"{"kind": "click_first", "selector": ".row"}"##).unwrap();
        assert_eq!(
            step,
            ActionStep::ClickFirst {
                selector: ".row".into()
            }
        );
    }

    #[tokio::test]
    async fn test_steps_command_runs_in_order() {
        let page = FixturePage::booking_site(&[("$1", "1 h", "01:00", "X")]);
        let spec = default_action_specs()
            .into_iter()
            .find(|s| s.label == "Search for flights")
            .unwrap();
        let cmd = StepsCommand::new(spec, Duration::from_secs(1));
        let mut vars = ActionVars::new();
        vars.insert("destination".into(), "Osaka".into());
        cmd.execute(&page, &vars).await.unwrap();
        assert_eq!(page.typed_value("search_input").as_deref(), Some("Osaka"));
        assert_eq!(page.clicks(), vec!["#search_button".to_string()]);
    }

    #[tokio::test]
    async fn test_click_first_without_match_fails() {
        let page = FixturePage::booking_site(&[]);
        let spec = ActionSpec::new(
            "Select",
            vec![ActionStep::ClickFirst {
                selector: ".select-flight".into(),
            }],
        );
        let err = StepsCommand::new(spec, Duration::from_secs(1))
            .execute(&page, &ActionVars::new())
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::ElementNotFound(".select-flight".into()));
    }
}
