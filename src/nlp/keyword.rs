//! 关键词分类器：规则匹配意图，正则抽取目的地 / 日期 / URL

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;

use crate::core::AgentError;
use crate::nlp::{
    ContextClassifier, TaskContext, INTENT_BOOK_FLIGHT, INTENT_BROWSE, INTENT_COMPLETE_FORM,
    INTENT_UNKNOWN,
};

static DESTINATION_RE: OnceLock<Regex> = OnceLock::new();
static ISO_DATE_RE: OnceLock<Regex> = OnceLock::new();
static MONTH_DATE_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();

/// "to" 之后的连续大写开头单词，如 "to New York"
fn destination_re() -> &'static Regex {
    DESTINATION_RE
        .get_or_init(|| Regex::new(r"\b[Tt]o\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*)").unwrap())
}

fn iso_date_re() -> &'static Regex {
    ISO_DATE_RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

/// "March 3rd, 2025" / "Jan 15 2025"
fn month_date_re() -> &'static Regex {
    MONTH_DATE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        )
        .unwrap()
    })
}

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// 识别文本中的第一个日期，输出 ISO-8601（YYYY-MM-DD）
pub fn extract_date(text: &str) -> Option<String> {
    if let Some(c) = iso_date_re().captures(text) {
        let y: i32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        let d: u32 = c[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    let c = month_date_re().captures(text)?;
    let prefix = c[1].to_lowercase();
    let month = MONTHS.iter().position(|m| prefix.starts_with(m))? as u32 + 1;
    let day: u32 = c[2].parse().ok()?;
    let year: i32 = c[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn extract_destination(text: &str) -> Option<String> {
    destination_re()
        .captures(text)
        .map(|c| c[1].trim().to_string())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify(&self, text: &str) -> TaskContext {
        let lower = text.to_lowercase();
        let url = url_re().find(text).map(|m| m.as_str().to_string());

        let mut ctx = if contains_any(&lower, &["flight", "fly ", "plane ticket", "airfare"]) {
            TaskContext::new("Travel booking", INTENT_BOOK_FLIGHT)
        } else if contains_any(&lower, &["form", "fill in", "fill out", "sign up", "register"]) {
            TaskContext::new("Form filling", INTENT_COMPLETE_FORM)
        } else if url.is_some() || contains_any(&lower, &["browse", "visit", "open ", "go to"]) {
            TaskContext::new("Web browsing", INTENT_BROWSE)
        } else {
            TaskContext::new("General", INTENT_UNKNOWN)
        };

        if let Some(destination) = extract_destination(text) {
            ctx.entities.insert("destination".into(), destination);
        }
        if let Some(date) = extract_date(text) {
            ctx.entities.insert("date".into(), date);
        }
        if let Some(url) = url {
            ctx.entities.insert("url".into(), url);
        }
        ctx
    }
}

#[async_trait]
impl ContextClassifier for KeywordClassifier {
    async fn infer(&self, text: &str) -> Result<TaskContext, AgentError> {
        let ctx = self.classify(text);
        tracing::debug!(intent = %ctx.intent, entities = ?ctx.entities, "task classified");
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dates() {
        assert_eq!(extract_date("leave on 2025-01-01 please").as_deref(), Some("2025-01-01"));
        assert_eq!(extract_date("on March 3rd, 2025").as_deref(), Some("2025-03-03"));
        assert_eq!(extract_date("on sept 21 2026").as_deref(), Some("2026-09-21"));
        assert_eq!(extract_date("2025-02-30"), None);
        assert_eq!(extract_date("next month"), None);
    }

    #[test]
    fn test_extract_destination() {
        assert_eq!(
            extract_destination("Book the cheapest flight to Tokyo next month").as_deref(),
            Some("Tokyo")
        );
        assert_eq!(
            extract_destination("fly to New York on 2025-01-01").as_deref(),
            Some("New York")
        );
        assert_eq!(extract_destination("go to the shop"), None);
    }

    #[tokio::test]
    async fn test_infer_flight_task() {
        let ctx = KeywordClassifier::new()
            .infer("Book the cheapest flight to Tokyo on January 1st, 2025")
            .await
            .unwrap();
        assert_eq!(ctx.intent, INTENT_BOOK_FLIGHT);
        assert_eq!(ctx.context, "Travel booking");
        assert_eq!(ctx.entity("destination"), Some("Tokyo"));
        assert_eq!(ctx.entity("date"), Some("2025-01-01"));
    }

    #[tokio::test]
    async fn test_infer_other_intents() {
        let c = KeywordClassifier::new();
        assert_eq!(c.infer("Fill out the signup form").await.unwrap().intent, INTENT_COMPLETE_FORM);
        let browse = c.infer("open https://example.com/deals").await.unwrap();
        assert_eq!(browse.intent, INTENT_BROWSE);
        assert_eq!(browse.entity("url"), Some("https://example.com/deals"));
        assert_eq!(c.infer("hello there").await.unwrap().intent, INTENT_UNKNOWN);
    }
}
