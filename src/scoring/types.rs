//! 打分层数据模型：任务目标、用户偏好、候选航班

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 任务目标：一次运行内不可变，打分前必须同时具备目的地与日期
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGoal {
    destination: String,
    date: String,
}

impl TaskGoal {
    /// 构造并校验；任一字段为空即返回 Precondition
    pub fn new(destination: impl Into<String>, date: impl Into<String>) -> Result<Self, AgentError> {
        let goal = Self {
            destination: destination.into().trim().to_string(),
            date: date.into().trim().to_string(),
        };
        goal.validate()?;
        Ok(goal)
    }

    /// 由分类器实体与命令行参数合并而来，缺失字段同样是前置条件失败
    pub fn from_parts(destination: Option<String>, date: Option<String>) -> Result<Self, AgentError> {
        match (destination, date) {
            (Some(destination), Some(date)) => Self::new(destination, date),
            (None, Some(_)) => Err(AgentError::Precondition(
                "task goal must include a destination".to_string(),
            )),
            (Some(_), None) => Err(AgentError::Precondition(
                "task goal must include a date".to_string(),
            )),
            (None, None) => Err(AgentError::Precondition(
                "task goal must include destination and date".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.destination.is_empty() || self.date.is_empty() {
            return Err(AgentError::Precondition(
                "task goal must include destination and date".to_string(),
            ));
        }
        Ok(())
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn date(&self) -> &str {
        &self.date
    }
}

/// 用户偏好：构造 Agent 时给定，运行期间不变
///
/// 价格、时长上限缺省为 +∞；`preferred_time` 与 `departure_time` 使用同一种整数时钟编码（如 06:30 → 630）。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub max_price: Option<f64>,
    pub max_duration: Option<f64>,
    pub preferred_time: Option<i64>,
    pub preferred_airline: Option<String>,
    pub frequent_airlines: BTreeSet<String>,
}

impl UserPreferences {
    pub fn max_price(&self) -> f64 {
        self.max_price.unwrap_or(f64::INFINITY)
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration.unwrap_or(f64::INFINITY)
    }

    pub fn is_frequent(&self, airline: &str) -> bool {
        self.frequent_airlines.contains(airline)
    }
}

/// 页面上解析出的一个候选航班；`index` 为解析时的行号，用作稳定标识
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    pub price: f64,
    pub duration: f64,
    pub departure_time: i64,
    pub airline: String,
    #[serde(default)]
    pub index: usize,
}

impl FlightOption {
    pub fn new(price: f64, duration: f64, departure_time: i64, airline: impl Into<String>) -> Self {
        Self {
            price,
            duration,
            departure_time,
            airline: airline.into(),
            index: 0,
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// 复合键比较（忽略行号），重新解析页面后用来确认是同一个航班
    pub fn same_flight(&self, other: &FlightOption) -> bool {
        self.price == other.price
            && self.duration == other.duration
            && self.departure_time == other.departure_time
            && self.airline == other.airline
    }
}

/// 带分数的候选项，只在排序时短暂存在
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredOption {
    pub option: FlightOption,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_requires_both_fields() {
        assert!(TaskGoal::new("Tokyo", "2025-01-01").is_ok());
        assert!(TaskGoal::new("", "2025-01-01").unwrap_err().is_precondition());
        assert!(TaskGoal::new("Tokyo", "  ").unwrap_err().is_precondition());
        assert!(TaskGoal::from_parts(Some("Tokyo".into()), None)
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn test_preferences_default_to_unbounded() {
        let prefs = UserPreferences::default();
        assert!(prefs.max_price().is_infinite());
        assert!(prefs.max_duration().is_infinite());
        assert!(!prefs.is_frequent("ANA"));
    }

    #[test]
    fn test_same_flight_ignores_index() {
        let a = FlightOption::new(450.0, 10.0, 630, "AirJapan").at_index(0);
        let b = FlightOption::new(450.0, 10.0, 630, "AirJapan").at_index(3);
        let c = FlightOption::new(450.0, 11.0, 630, "AirJapan");
        assert!(a.same_flight(&b));
        assert!(!a.same_flight(&c));
    }
}
