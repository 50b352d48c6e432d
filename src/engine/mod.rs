//! 执行循环：打分运行、学习运行、计划运行
//!
//! 三种运行都是严格顺序的：每次只有一个页面操作在进行，动作之间按配置的间隔暂停。
//! 除任务目标缺字段外，循环内的失败都降级为结果中的记录，不中断运行。

pub mod learning;
pub mod planned;
pub mod scoring;

use std::time::Duration;

use serde::Serialize;

use crate::actions::ActionRecord;
use crate::core::RunPhase;
use crate::learning::{ActionDecision, TrainOutcome};
use crate::scoring::ScoredOption;

pub use learning::{LearningRun, LearningSettings};
pub use planned::{default_plans, PlanSpec, PlannedRun};
pub use scoring::ScoringRun;

/// 一次运行的终态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// 已点击最佳航班
    Selected { choice: ScoredOption },
    /// 选出了最佳航班，但重新定位或点击失败
    NotSelected { choice: ScoredOption, reason: String },
    NoSuitableOption,
    /// 导航或搜索表单失败，没有拿到候选项
    SearchFailed { cause: String },
    Learned {
        cycles: usize,
        /// None 表示训练本身报错（已记录日志）
        training: Option<TrainOutcome>,
        final_decision: ActionDecision,
    },
    Planned {
        intent: String,
        executed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// 运行报告（CLI 以 JSON 输出）
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub task: String,
    pub intent: String,
    pub outcome: RunOutcome,
    pub phases: Vec<RunPhase>,
    pub actions: Vec<ActionRecord>,
    pub logged_interactions: usize,
}

/// 动作间隔；为 0 时不让出
pub async fn pace(interval: Duration) {
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}
