//! 多准则偏好打分器
//!
//! 纯函数：无状态、无 I/O。每个候选项的分数为以下各项之和：
//! 价格 ±1、时长 ±1、出发时间偏差惩罚 `|departure - preferred| / 3600`、首选航司 +1、常飞航司 +0.5。
//! 按分数降序稳定排序，同分保持解析顺序。

use std::cmp::Ordering;

use crate::core::AgentError;
use crate::scoring::{FlightOption, ScoredOption, TaskGoal, UserPreferences};

/// 时钟编码差值 → 小时等价惩罚的除数
const TIME_PENALTY_DIVISOR: f64 = 3600.0;
const AIRLINE_MATCH_BONUS: f64 = 1.0;
const LOYALTY_BONUS: f64 = 0.5;

#[derive(Debug, Default, Clone, Copy)]
pub struct PreferenceScorer;

impl PreferenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// 单个候选项的分数
    pub fn score(&self, prefs: &UserPreferences, option: &FlightOption) -> f64 {
        let mut score = 0.0;

        score += if option.price < prefs.max_price() { 1.0 } else { -1.0 };
        score += if option.duration < prefs.max_duration() { 1.0 } else { -1.0 };

        if let Some(preferred) = prefs.preferred_time {
            let diff = option.departure_time.abs_diff(preferred) as f64;
            score -= diff / TIME_PENALTY_DIVISOR;
        }

        if prefs.preferred_airline.as_deref() == Some(option.airline.as_str()) {
            score += AIRLINE_MATCH_BONUS;
        }

        if prefs.is_frequent(&option.airline) {
            score += LOYALTY_BONUS;
        }

        score
    }

    /// 排序：分数降序，最好的在前；目标缺字段时返回 Precondition
    pub fn rank(
        &self,
        goal: &TaskGoal,
        prefs: &UserPreferences,
        options: &[FlightOption],
    ) -> Result<Vec<ScoredOption>, AgentError> {
        goal.validate()?;

        let mut scored: Vec<ScoredOption> = options
            .iter()
            .map(|option| ScoredOption {
                score: self.score(prefs, option),
                option: option.clone(),
            })
            .collect();

        // sort_by 为稳定排序
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(scored)
    }

    /// 最优候选项；输入为空时返回 None（不是错误）
    pub fn best(
        &self,
        goal: &TaskGoal,
        prefs: &UserPreferences,
        options: &[FlightOption],
    ) -> Result<Option<FlightOption>, AgentError> {
        Ok(self
            .rank(goal, prefs, options)?
            .into_iter()
            .next()
            .map(|s| s.option))
    }
}
