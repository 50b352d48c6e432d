//! 单次运行的上下文：任务、目标、阶段、交互日志与动作历史
//!
//! 每次运行独占一个 RunContext，运行结束后通过 `finish` 转成 RunReport。

use uuid::Uuid;

use crate::actions::{ActionRecord, ActionVars};
use crate::core::state::{PhaseTracker, RunPhase};
use crate::engine::{RunOutcome, RunReport};
use crate::learning::InteractionLog;
use crate::nlp::TaskContext;
use crate::scoring::TaskGoal;

pub struct RunContext {
    run_id: String,
    task: String,
    task_context: TaskContext,
    goal: Option<TaskGoal>,
    phases: PhaseTracker,
    log: InteractionLog,
    actions: Vec<ActionRecord>,
}

impl RunContext {
    pub fn new(task: impl Into<String>, task_context: TaskContext) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            task: task.into(),
            task_context,
            goal: None,
            phases: PhaseTracker::new(),
            log: InteractionLog::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_goal(mut self, goal: TaskGoal) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn task_context(&self) -> &TaskContext {
        &self.task_context
    }

    pub fn goal(&self) -> Option<&TaskGoal> {
        self.goal.as_ref()
    }

    pub fn phase(&self) -> RunPhase {
        self.phases.current()
    }

    pub fn advance(&mut self, next: RunPhase) {
        self.phases.advance(next);
    }

    pub fn log(&self) -> &InteractionLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut InteractionLog {
        &mut self.log
    }

    pub fn record_action(&mut self, record: ActionRecord) {
        self.actions.push(record);
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    /// 动作模板变量：目标字段优先，其次是分类器实体
    pub fn vars(&self) -> ActionVars {
        let mut vars: ActionVars = self.task_context.entities.clone();
        if let Some(goal) = &self.goal {
            vars.insert("destination".into(), goal.destination().to_string());
            vars.insert("date".into(), goal.date().to_string());
        }
        vars
    }

    pub fn finish(mut self, outcome: RunOutcome) -> RunReport {
        if self.phases.current() != RunPhase::Done {
            self.phases.advance(RunPhase::Done);
        }
        RunReport {
            run_id: self.run_id,
            task: self.task,
            intent: self.task_context.intent,
            outcome,
            phases: self.phases.history().to_vec(),
            actions: self.actions,
            logged_interactions: self.log.len(),
        }
    }
}
