//! 运行阶段：打分运行与学习运行共用一套阶段枚举
//!
//! - 打分：Init → Searching → Evaluating → Selecting | NoResult → Done
//! - 学习：Init → Observing ⇄ Acting (×N) → Training → FinalAct → Done
//! - 计划：Init → Acting (×N) → Done

use serde::Serialize;

/// 运行阶段（日志与报告用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Searching,
    Evaluating,
    Selecting,
    NoResult,
    Observing,
    Acting,
    Training,
    FinalAct,
    Done,
}

impl RunPhase {
    /// 合法迁移表；任何阶段都可以直接进入 Done（外部收尾）
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        if next == Done {
            return true;
        }
        matches!(
            (self, next),
            (Init, Searching)
                | (Searching, Evaluating)
                | (Evaluating, Selecting)
                | (Evaluating, NoResult)
                | (Init, Observing)
                | (Observing, Acting)
                | (Acting, Observing)
                | (Acting, Training)
                | (Init, Training)
                | (Training, FinalAct)
                | (Init, Acting)
                | (Acting, Acting)
        )
    }
}

/// 阶段跟踪：记录迁移历史，非法迁移只告警不中断
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    current: RunPhase,
    history: Vec<RunPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: RunPhase::Init,
            history: vec![RunPhase::Init],
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: RunPhase) {
        if !self.current.can_transition_to(next) {
            tracing::warn!(from = ?self.current, to = ?next, "unexpected run phase transition");
        }
        tracing::debug!(from = ?self.current, to = ?next, "run phase");
        self.current = next;
        self.history.push(next);
    }
}
