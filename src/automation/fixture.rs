//! 静态夹具页面：内存中的 DOM 树，实现 PageDriver
//!
//! 用于离线运行（`--fixture page.json`）与测试：所有导航 / 点击 / 输入都会被记录，便于断言。
//! 选择器支持 `tag`、`#id`、`.class` 的组合（如 `button.primary`），以及用空格表示的后代关系。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::automation::{DriverError, ElementHandle, PageDriver, WaitCondition};

/// 夹具中的一个元素（可嵌套）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureElement {
    pub tag: String,
    pub id: Option<String>,
    pub class: Vec<String>,
    pub text: String,
    pub disabled: bool,
    pub hidden: bool,
    pub children: Vec<FixtureElement>,
}

impl FixtureElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn child(mut self, child: FixtureElement) -> Self {
        self.children.push(child);
        self
    }
}

/// 夹具文件的根结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDocument {
    pub elements: Vec<FixtureElement>,
    /// 导航到这些 URL 时返回 Navigation 错误
    pub unreachable: Vec<String>,
}

/// 驱动调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Navigate(String),
    SendKeys { target: String, text: String },
    Click { target: String },
    Close,
}

#[derive(Debug)]
struct Node {
    tag: String,
    id: Option<String>,
    class: Vec<String>,
    text: String,
    disabled: bool,
    hidden: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct FixtureState {
    url: Option<String>,
    typed: HashMap<usize, String>,
    calls: Vec<DriverCall>,
    closed: bool,
}

/// 选择器中的一段复合条件：tag / #id / .class
#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

fn parse_compound(part: &str) -> Result<Compound, DriverError> {
    let mut compound = Compound::default();
    let mut rest = part;
    let tag_end = rest.find(['#', '.']).unwrap_or(rest.len());
    if tag_end > 0 {
        compound.tag = Some(rest[..tag_end].to_lowercase());
    }
    rest = &rest[tag_end..];
    while !rest.is_empty() {
        let marker = rest.as_bytes()[0];
        let body = &rest[1..];
        let end = body.find(['#', '.']).unwrap_or(body.len());
        let name = &body[..end];
        if name.is_empty() {
            return Err(DriverError::Parse(format!("bad selector: {part}")));
        }
        if marker == b'#' {
            compound.id = Some(name.to_string());
        } else {
            compound.classes.push(name.to_string());
        }
        rest = &body[end..];
    }
    Ok(compound)
}

fn parse_selector(selector: &str) -> Result<Vec<Compound>, DriverError> {
    let parts: Vec<Compound> = selector
        .split_whitespace()
        .map(parse_compound)
        .collect::<Result<_, _>>()?;
    if parts.is_empty() {
        return Err(DriverError::Parse("empty selector".to_string()));
    }
    Ok(parts)
}

/// 内存夹具页面
#[derive(Debug)]
pub struct FixturePage {
    nodes: Vec<Node>,
    unreachable: Vec<String>,
    state: Mutex<FixtureState>,
}

impl FixturePage {
    pub fn new(elements: Vec<FixtureElement>) -> Self {
        Self::from_document(FixtureDocument {
            elements,
            unreachable: Vec::new(),
        })
    }

    pub fn from_document(doc: FixtureDocument) -> Self {
        let mut nodes = Vec::new();
        for element in &doc.elements {
            Self::push_node(&mut nodes, element, None);
        }
        Self {
            nodes,
            unreachable: doc.unreachable,
            state: Mutex::new(FixtureState::default()),
        }
    }

    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let doc: FixtureDocument = serde_json::from_str(&data)?;
        Ok(Self::from_document(doc))
    }

    fn push_node(nodes: &mut Vec<Node>, element: &FixtureElement, parent: Option<usize>) -> usize {
        let idx = nodes.len();
        nodes.push(Node {
            tag: element.tag.to_lowercase(),
            id: element.id.clone(),
            class: element.class.clone(),
            text: element.text.clone(),
            disabled: element.disabled,
            hidden: element.hidden,
            parent,
            children: Vec::new(),
        });
        for child in &element.children {
            let child_idx = Self::push_node(nodes, child, Some(idx));
            nodes[idx].children.push(child_idx);
        }
        idx
    }

    /// 机票预订站点夹具：搜索表单、通用表单、以及每行一个 `.flight-item`
    ///
    /// `rows` 为 (价格, 时长, 出发时间, 航司) 的原始文本，例如 `("$450", "10 h", "06:30", "AirJapan")`。
    pub fn booking_site(rows: &[(&str, &str, &str, &str)]) -> Self {
        let mut elements = vec![
            FixtureElement::new("input").with_id("destination"),
            FixtureElement::new("input").with_id("departure_date"),
            FixtureElement::new("button").with_id("search_flights").with_text("Search"),
            FixtureElement::new("input").with_id("search_input"),
            FixtureElement::new("button").with_id("search_button").with_text("Go"),
            FixtureElement::new("input").with_id("name"),
            FixtureElement::new("input").with_id("email"),
            FixtureElement::new("button").with_id("submit").with_text("Submit"),
            FixtureElement::new("button").with_id("submit_button").with_text("Book"),
            FixtureElement::new("a").with_id("home").with_text("Home"),
        ];
        for (i, (price, duration, departure, airline)) in rows.iter().enumerate() {
            elements.push(
                FixtureElement::new("div")
                    .with_class("flight-item")
                    .child(FixtureElement::new("span").with_class("price").with_text(*price))
                    .child(FixtureElement::new("span").with_class("duration").with_text(*duration))
                    .child(
                        FixtureElement::new("span")
                            .with_class("departure-time")
                            .with_text(*departure),
                    )
                    .child(FixtureElement::new("span").with_class("airline").with_text(*airline))
                    .child(
                        FixtureElement::new("button")
                            .with_id(format!("select-{i}"))
                            .with_class("select-flight")
                            .with_text("Select"),
                    ),
            );
        }
        Self::new(elements)
    }

    fn handle(idx: usize) -> ElementHandle {
        ElementHandle::new(idx as u64)
    }

    fn node(&self, element: ElementHandle) -> Result<(usize, &Node), DriverError> {
        let idx = element.id() as usize;
        self.nodes
            .get(idx)
            .map(|n| (idx, n))
            .ok_or_else(|| DriverError::ElementNotFound(format!("handle {}", element.id())))
    }

    fn describe(&self, idx: usize) -> String {
        let node = &self.nodes[idx];
        match (&node.id, node.class.first()) {
            (Some(id), _) => format!("#{id}"),
            (None, Some(class)) => format!("{}.{}", node.tag, class),
            (None, None) => node.tag.clone(),
        }
    }

    fn matches(&self, idx: usize, compound: &Compound) -> bool {
        let node = &self.nodes[idx];
        compound.tag.as_ref().map_or(true, |t| *t == node.tag)
            && compound
                .id
                .as_ref()
                .map_or(true, |id| node.id.as_deref() == Some(id.as_str()))
            && compound.classes.iter().all(|c| node.class.contains(c))
    }

    /// 最后一段匹配自身，前面各段依次匹配某个祖先
    fn matches_selector(&self, idx: usize, parts: &[Compound]) -> bool {
        let Some((last, ancestors)) = parts.split_last() else {
            return false;
        };
        if !self.matches(idx, last) {
            return false;
        }
        let mut cursor = self.nodes[idx].parent;
        let mut pending = ancestors.iter().rev().peekable();
        while let Some(want) = pending.peek() {
            let Some(p) = cursor else {
                return false;
            };
            if self.matches(p, want) {
                pending.next();
            }
            cursor = self.nodes[p].parent;
        }
        true
    }

    fn is_descendant(&self, idx: usize, ancestor: usize) -> bool {
        let mut cursor = self.nodes[idx].parent;
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.nodes[p].parent;
        }
        false
    }

    fn query(&self, scope: Option<ElementHandle>, selector: &str) -> Result<Vec<usize>, DriverError> {
        let parts = parse_selector(selector)?;
        let scope_idx = match scope {
            Some(s) => Some(self.node(s)?.0),
            None => None,
        };
        // push_node 按先序遍历编号，下标顺序即文档顺序
        Ok((0..self.nodes.len())
            .filter(|&idx| scope_idx.map_or(true, |s| self.is_descendant(idx, s)))
            .filter(|&idx| self.matches_selector(idx, &parts))
            .collect())
    }

    fn collect_text(&self, idx: usize, typed: &HashMap<usize, String>, out: &mut Vec<String>) {
        let node = &self.nodes[idx];
        let own = typed.get(&idx).unwrap_or(&node.text).trim();
        if !own.is_empty() {
            out.push(own.to_string());
        }
        for &child in &node.children {
            self.collect_text(child, typed, out);
        }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, FixtureState>, DriverError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| DriverError::Session(e.to_string()))?;
        if guard.closed {
            return Err(DriverError::Session("session closed".to_string()));
        }
        Ok(guard)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        self.state().map(|_| ())
    }

    fn ensure_interactable(&self, idx: usize) -> Result<(), DriverError> {
        let node = &self.nodes[idx];
        if node.hidden || node.disabled {
            return Err(DriverError::NotInteractable(self.describe(idx)));
        }
        Ok(())
    }

    // ---------- 断言辅助 ----------

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// 被点击元素的描述（`#id` 或 `tag.class`），按点击顺序
    pub fn clicks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Click { target } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    /// 通过 `#id` 读取已输入的值
    pub fn typed_value(&self, id: &str) -> Option<String> {
        let idx = self.nodes.iter().position(|n| n.id.as_deref() == Some(id))?;
        self.state.lock().ok()?.typed.get(&idx).cloned()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().ok()?.url.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(false)
    }
}

#[async_trait]
impl PageDriver for FixturePage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state()?;
        state.calls.push(DriverCall::Navigate(url.to_string()));
        if self.unreachable.iter().any(|u| u == url) {
            return Err(DriverError::Navigation(format!("{url} is unreachable")));
        }
        state.url = Some(url.to_string());
        Ok(())
    }

    async fn find(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        self.ensure_open()?;
        Ok(self.query(scope, selector)?.first().map(|&i| Self::handle(i)))
    }

    async fn find_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.ensure_open()?;
        Ok(self
            .query(scope, selector)?
            .into_iter()
            .map(Self::handle)
            .collect())
    }

    async fn text(&self, element: ElementHandle) -> Result<String, DriverError> {
        let state = self.state()?;
        let (idx, _) = self.node(element)?;
        let mut parts = Vec::new();
        self.collect_text(idx, &state.typed, &mut parts);
        Ok(parts.join(" "))
    }

    async fn send_keys(&self, element: ElementHandle, text: &str) -> Result<(), DriverError> {
        let mut state = self.state()?;
        let (idx, _) = self.node(element)?;
        self.ensure_interactable(idx)?;
        state.typed.entry(idx).or_default().push_str(text);
        state.calls.push(DriverCall::SendKeys {
            target: self.describe(idx),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn click(&self, element: ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state()?;
        let (idx, _) = self.node(element)?;
        self.ensure_interactable(idx)?;
        state.calls.push(DriverCall::Click {
            target: self.describe(idx),
        });
        Ok(())
    }

    /// 夹具是静态的：条件此刻不满足就直接超时，不真的等待
    async fn wait_until(
        &self,
        selector: &str,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        self.ensure_open()?;
        let found = self.query(None, selector)?.into_iter().find(|&idx| {
            let node = &self.nodes[idx];
            match condition {
                WaitCondition::Present => true,
                WaitCondition::Clickable => !node.hidden && !node.disabled,
            }
        });
        found.map(Self::handle).ok_or_else(|| DriverError::Timeout {
            selector: selector.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.state()?;
        state.calls.push(DriverCall::Close);
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> FixturePage {
        FixturePage::booking_site(&[
            ("$450", "10 h", "06:30", "AirJapan"),
            ("$480", "11 h", "14:00", "ANA"),
        ])
    }

    #[test]
    fn test_parse_compound_selector() {
        let c = parse_compound("button#go.primary.big").unwrap();
        assert_eq!(c.tag.as_deref(), Some("button"));
        assert_eq!(c.id.as_deref(), Some("go"));
        assert_eq!(c.classes, vec!["primary".to_string(), "big".to_string()]);
        assert!(parse_compound("div.").is_err());
    }

    #[tokio::test]
    async fn test_find_scoped_and_descendant() {
        let page = page();
        let items = page.find_all(None, ".flight-item").await.unwrap();
        assert_eq!(items.len(), 2);

        let price = page.find(Some(items[1]), ".price").await.unwrap().unwrap();
        assert_eq!(page.text(price).await.unwrap(), "$480");

        let all_prices = page.find_all(None, ".flight-item .price").await.unwrap();
        assert_eq!(all_prices.len(), 2);
        assert!(page.find(None, "#missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interactions_are_recorded() {
        let page = page();
        let dest = page.find_required(None, "#destination").await.unwrap();
        page.send_keys(dest, "Tokyo").await.unwrap();
        let submit = page.find_required(None, "#submit").await.unwrap();
        page.click(submit).await.unwrap();
        page.navigate("https://example.com").await.unwrap();

        assert_eq!(page.typed_value("destination").as_deref(), Some("Tokyo"));
        assert_eq!(page.clicks(), vec!["#submit".to_string()]);
        assert_eq!(page.current_url().as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_wait_until_times_out_on_disabled() {
        let page = FixturePage::new(vec![FixtureElement::new("button").with_id("go").disabled()]);
        let present = page
            .wait_until("#go", WaitCondition::Present, Duration::from_secs(10))
            .await;
        assert!(present.is_ok());
        let clickable = page
            .wait_until("#go", WaitCondition::Clickable, Duration::from_secs(10))
            .await;
        assert_eq!(
            clickable.unwrap_err(),
            DriverError::Timeout {
                selector: "#go".to_string(),
                timeout_ms: 10_000
            }
        );
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let page = page();
        page.close().await.unwrap();
        assert!(page.is_closed());
        assert!(page.find(None, "#submit").await.is_err());
    }

    #[test]
    fn test_document_from_json() {
        let doc: FixtureDocument = serde_json::from_str(
            r#"{"elements": [{"tag": "div", "class": ["flight-item"], "children": [{"tag": "span", "class": ["price"], "text": "$1"}]}]}"#,
        )
        .unwrap();
        let page = FixturePage::from_document(doc);
        assert_eq!(page.nodes.len(), 2);
    }
}
