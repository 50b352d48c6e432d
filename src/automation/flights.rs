//! 机票页面对象：填写搜索表单、等待结果、解析候选航班、按稳定身份选择航班

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automation::{DriverError, ElementHandle, PageDriver, WaitCondition};
use crate::scoring::{FlightOption, TaskGoal};

fn default_destination_input() -> String {
    "#destination".to_string()
}
fn default_date_input() -> String {
    "#departure_date".to_string()
}
fn default_search_button() -> String {
    "#search_flights".to_string()
}
fn default_result_row() -> String {
    ".flight-item".to_string()
}
fn default_price() -> String {
    ".price".to_string()
}
fn default_duration() -> String {
    ".duration".to_string()
}
fn default_departure() -> String {
    ".departure-time".to_string()
}
fn default_airline() -> String {
    ".airline".to_string()
}
fn default_select_button() -> String {
    ".select-flight".to_string()
}

/// 机票站点的 CSS 选择器（字段相对于结果行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSelectors {
    #[serde(default = "default_destination_input")]
    pub destination_input: String,
    #[serde(default = "default_date_input")]
    pub date_input: String,
    #[serde(default = "default_search_button")]
    pub search_button: String,
    #[serde(default = "default_result_row")]
    pub result_row: String,
    #[serde(default = "default_price")]
    pub price: String,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_departure")]
    pub departure_time: String,
    #[serde(default = "default_airline")]
    pub airline: String,
    #[serde(default = "default_select_button")]
    pub select_button: String,
}

impl Default for FlightSelectors {
    fn default() -> Self {
        Self {
            destination_input: default_destination_input(),
            date_input: default_date_input(),
            search_button: default_search_button(),
            result_row: default_result_row(),
            price: default_price(),
            duration: default_duration(),
            departure_time: default_departure(),
            airline: default_airline(),
            select_button: default_select_button(),
        }
    }
}

/// `$1,450.00` → 1450.0；负数与非有限值拒绝
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// `10 h` → 10.0（取第一个词）
pub fn parse_duration(text: &str) -> Option<f64> {
    text.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// `06:30` → 630（去掉冒号后按整数解析）
pub fn parse_departure(text: &str) -> Option<i64> {
    let digits: String = text.trim().chars().filter(|c| *c != ':').collect();
    digits.parse::<i64>().ok()
}

/// 选择结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 已点击该行的选择按钮
    Clicked { row: usize },
    /// 重新解析后找不到同一航班
    NotFound,
}

/// 绑定到某个驱动的机票页面
pub struct FlightPage<'a> {
    driver: &'a dyn PageDriver,
    selectors: &'a FlightSelectors,
    wait: Duration,
}

impl<'a> FlightPage<'a> {
    pub fn new(driver: &'a dyn PageDriver, selectors: &'a FlightSelectors, wait: Duration) -> Self {
        Self {
            driver,
            selectors,
            wait,
        }
    }

    /// 填写目的地与日期并提交搜索
    pub async fn search(&self, goal: &TaskGoal) -> Result<(), DriverError> {
        let dest = self
            .driver
            .wait_until(&self.selectors.destination_input, WaitCondition::Clickable, self.wait)
            .await?;
        self.driver.send_keys(dest, goal.destination()).await?;

        let date = self
            .driver
            .wait_until(&self.selectors.date_input, WaitCondition::Clickable, self.wait)
            .await?;
        self.driver.send_keys(date, goal.date()).await?;

        let button = self
            .driver
            .wait_until(&self.selectors.search_button, WaitCondition::Clickable, self.wait)
            .await?;
        self.driver.click(button).await?;
        tracing::info!(destination = goal.destination(), date = goal.date(), "search submitted");
        Ok(())
    }

    /// 等待第一条结果出现；超时视为没有结果（返回 false）
    pub async fn wait_for_results(&self) -> Result<bool, DriverError> {
        match self
            .driver
            .wait_until(&self.selectors.result_row, WaitCondition::Present, self.wait)
            .await
        {
            Ok(_) => Ok(true),
            Err(DriverError::Timeout { selector, timeout_ms }) => {
                tracing::warn!(selector = %selector, timeout_ms, "no search results before timeout");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn field_text(&self, row: ElementHandle, selector: &str) -> Result<Option<String>, DriverError> {
        match self.driver.find(Some(row), selector).await? {
            Some(el) => Ok(Some(self.driver.text(el).await?)),
            None => Ok(None),
        }
    }

    async fn parse_row(&self, row: ElementHandle, index: usize) -> Result<Option<FlightOption>, DriverError> {
        let s = self.selectors;
        let price = self.field_text(row, &s.price).await?;
        let duration = self.field_text(row, &s.duration).await?;
        let departure = self.field_text(row, &s.departure_time).await?;
        let airline = self.field_text(row, &s.airline).await?;

        let parsed = (|| {
            let price = parse_price(price.as_deref()?)?;
            let duration = parse_duration(duration.as_deref()?)?;
            let departure = parse_departure(departure.as_deref()?)?;
            let airline = airline.as_deref()?.trim();
            if airline.is_empty() {
                return None;
            }
            Some(FlightOption::new(price, duration, departure, airline).at_index(index))
        })();

        if parsed.is_none() {
            tracing::warn!(
                row = index,
                price = ?price,
                duration = ?duration,
                departure = ?departure,
                airline = ?airline,
                "skipping unparseable result row"
            );
        }
        Ok(parsed)
    }

    async fn rows(&self) -> Result<Vec<(ElementHandle, FlightOption)>, DriverError> {
        let handles = self.driver.find_all(None, &self.selectors.result_row).await?;
        let mut rows = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            if let Some(option) = self.parse_row(handle, index).await? {
                rows.push((handle, option));
            }
        }
        Ok(rows)
    }

    /// 解析当前可见的全部候选航班（页面顺序）
    pub async fn parse_options(&self) -> Result<Vec<FlightOption>, DriverError> {
        let options: Vec<FlightOption> = self.rows().await?.into_iter().map(|(_, o)| o).collect();
        tracing::debug!(count = options.len(), "parsed flight options");
        Ok(options)
    }

    /// 重新解析页面，按行号定位并校验组合键；行号不符时按组合键查找
    pub async fn select(&self, chosen: &FlightOption) -> Result<Selection, DriverError> {
        let rows = self.rows().await?;
        let target = rows
            .iter()
            .find(|(_, o)| o.index == chosen.index && o.same_flight(chosen))
            .or_else(|| rows.iter().find(|(_, o)| o.same_flight(chosen)));

        let Some((row, option)) = target else {
            tracing::warn!(row = chosen.index, airline = %chosen.airline, "chosen flight no longer on page");
            return Ok(Selection::NotFound);
        };

        let button = self
            .driver
            .find_required(Some(*row), &self.selectors.select_button)
            .await?;
        self.driver.click(button).await?;
        tracing::info!(row = option.index, price = option.price, airline = %option.airline, "flight selected");
        Ok(Selection::Clicked { row: option.index })
    }
}
