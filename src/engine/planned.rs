//! 计划运行：按识别出的意图取出动作序列，逐个派发

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actions::{ActionDispatcher, DispatchOutcome};
use crate::automation::PageDriver;
use crate::core::{AgentError, RunContext, RunPhase};
use crate::engine::{pace, RunOutcome};
use crate::nlp::INTENT_BOOK_FLIGHT;

/// 一个意图对应的动作序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub intent: String,
    pub actions: Vec<String>,
}

pub fn default_plans() -> Vec<PlanSpec> {
    vec![PlanSpec {
        intent: INTENT_BOOK_FLIGHT.to_string(),
        actions: [
            "Navigate to booking site",
            "Search for flights",
            "Select cheapest option",
            "Fill form",
            "Submit booking",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }]
}

pub struct PlannedRun<'a> {
    driver: &'a dyn PageDriver,
    dispatcher: &'a ActionDispatcher,
    plans: &'a [PlanSpec],
    pacing: Duration,
}

impl<'a> PlannedRun<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        dispatcher: &'a ActionDispatcher,
        plans: &'a [PlanSpec],
        pacing: Duration,
    ) -> Self {
        Self {
            driver,
            dispatcher,
            plans,
            pacing,
        }
    }

    /// 意图匹配不区分大小写；未知意图得到空计划
    pub fn plan_for(&self, intent: &str) -> &[String] {
        self.plans
            .iter()
            .find(|p| p.intent.eq_ignore_ascii_case(intent.trim()))
            .map(|p| p.actions.as_slice())
            .unwrap_or(&[])
    }

    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunOutcome, AgentError> {
        let intent = ctx.task_context().intent.clone();
        let plan = self.plan_for(&intent);
        if plan.is_empty() {
            tracing::info!(intent = %intent, "no plan for intent");
        } else {
            tracing::info!(intent = %intent, actions = ?plan, "plan selected");
        }

        let (mut executed, mut failed, mut skipped) = (0, 0, 0);
        for label in plan {
            ctx.advance(RunPhase::Acting);
            let record = self.dispatcher.dispatch(label, self.driver, &ctx.vars()).await;
            match record.outcome {
                DispatchOutcome::Executed => executed += 1,
                DispatchOutcome::Failed { .. } => failed += 1,
                DispatchOutcome::Skipped => skipped += 1,
            }
            ctx.record_action(record);
            pace(self.pacing).await;
        }

        Ok(RunOutcome::Planned {
            intent,
            executed,
            failed,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{default_action_specs, ActionRegistry};
    use crate::automation::FixturePage;
    use crate::nlp::TaskContext;

    fn dispatcher() -> ActionDispatcher {
        ActionDispatcher::new(
            ActionRegistry::from_specs(default_action_specs(), Duration::from_millis(10)),
            5,
        )
    }

    #[tokio::test]
    async fn test_booking_plan_runs_in_order() {
        let page = FixturePage::booking_site(&[("$450", "10 h", "06:30", "AirJapan")]);
        let dispatcher = dispatcher();
        let plans = default_plans();
        let run = PlannedRun::new(&page, &dispatcher, &plans, Duration::ZERO);
        let mut ctx = RunContext::new(
            "Book a flight to Tokyo",
            TaskContext::new("Travel booking", "book a FLIGHT").with_entity("destination", "Tokyo"),
        );
        let outcome = run.run(&mut ctx).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Planned {
                intent: "book a FLIGHT".into(),
                executed: 5,
                failed: 0,
                skipped: 0
            }
        );
        let labels: Vec<&str> = ctx.actions().iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, plans[0].actions.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(page.typed_value("search_input").as_deref(), Some("Tokyo"));
        assert_eq!(
            page.clicks(),
            vec!["#search_button".to_string(), "#select-0".to_string(), "#submit_button".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_plan() {
        // 没有结果行：选择动作失败，其余照常执行
        let page = FixturePage::booking_site(&[]);
        let dispatcher = dispatcher();
        let plans = default_plans();
        let run = PlannedRun::new(&page, &dispatcher, &plans, Duration::ZERO);
        let mut ctx = RunContext::new("t", TaskContext::new("Travel booking", "Book a flight"));
        let outcome = run.run(&mut ctx).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Planned {
                intent: "Book a flight".into(),
                executed: 4,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(ctx.actions().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_intent_is_empty_plan() {
        let page = FixturePage::booking_site(&[]);
        let dispatcher = dispatcher();
        let plans = default_plans();
        let run = PlannedRun::new(&page, &dispatcher, &plans, Duration::ZERO);
        let mut ctx = RunContext::new("hello", TaskContext::new("General", "Unknown"));
        let outcome = run.run(&mut ctx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Planned { executed: 0, failed: 0, skipped: 0, .. }));
        assert!(page.calls().is_empty());
    }
}
