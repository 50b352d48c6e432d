//! 打分运行：搜索 → 解析候选 → 打分排序 → 选择最佳

use std::time::Duration;

use crate::actions::{ActionRecord, DispatchOutcome};
use crate::automation::{FlightPage, FlightSelectors, PageDriver, Selection};
use crate::core::{AgentError, RunContext, RunPhase};
use crate::engine::RunOutcome;
use crate::scoring::{PreferenceScorer, UserPreferences};

const SELECT_ACTION: &str = "Select flight";

pub struct ScoringRun<'a> {
    driver: &'a dyn PageDriver,
    selectors: &'a FlightSelectors,
    preferences: &'a UserPreferences,
    search_url: &'a str,
    wait: Duration,
}

impl<'a> ScoringRun<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        selectors: &'a FlightSelectors,
        preferences: &'a UserPreferences,
        search_url: &'a str,
        wait: Duration,
    ) -> Self {
        Self {
            driver,
            selectors,
            preferences,
            search_url,
            wait,
        }
    }

    /// 目标缺字段时在任何页面操作之前返回 Precondition；其余失败都体现在 RunOutcome 中
    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunOutcome, AgentError> {
        let goal = ctx
            .goal()
            .cloned()
            .ok_or_else(|| AgentError::Precondition("task goal not set".to_string()))?;
        goal.validate()?;

        ctx.advance(RunPhase::Searching);
        let page = FlightPage::new(self.driver, self.selectors, self.wait);
        let searched = async {
            self.driver.navigate(self.search_url).await?;
            page.search(&goal).await?;
            page.wait_for_results().await
        }
        .await;
        let has_results = match searched {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, url = self.search_url, "flight search failed");
                return Ok(RunOutcome::SearchFailed { cause: e.to_string() });
            }
        };

        ctx.advance(RunPhase::Evaluating);
        let options = if has_results {
            match page.parse_options().await {
                Ok(options) => options,
                Err(e) => {
                    tracing::warn!(error = %e, "reading flight results failed");
                    return Ok(RunOutcome::SearchFailed { cause: e.to_string() });
                }
            }
        } else {
            Vec::new()
        };

        let ranked = PreferenceScorer.rank(&goal, self.preferences, &options)?;
        let Some(choice) = ranked.into_iter().next() else {
            ctx.advance(RunPhase::NoResult);
            tracing::info!("No suitable flight found");
            return Ok(RunOutcome::NoSuitableOption);
        };
        tracing::info!(
            price = choice.option.price,
            airline = %choice.option.airline,
            score = choice.score,
            candidates = options.len(),
            "best flight chosen"
        );

        ctx.advance(RunPhase::Selecting);
        let start = std::time::Instant::now();
        let selection = page.select(&choice.option).await;
        let (outcome, dispatch) = match selection {
            Ok(Selection::Clicked { .. }) => (RunOutcome::Selected { choice }, DispatchOutcome::Executed),
            Ok(Selection::NotFound) => {
                let reason = "chosen flight no longer on page".to_string();
                let dispatch = DispatchOutcome::Failed { cause: reason.clone() };
                (RunOutcome::NotSelected { choice, reason }, dispatch)
            }
            Err(e) => {
                let err = AgentError::ActionDispatch {
                    action: SELECT_ACTION.to_string(),
                    cause: e.to_string(),
                };
                tracing::warn!(error = %err, "flight selection failed");
                let dispatch = DispatchOutcome::Failed { cause: e.to_string() };
                (
                    RunOutcome::NotSelected {
                        choice,
                        reason: e.to_string(),
                    },
                    dispatch,
                )
            }
        };
        ctx.record_action(ActionRecord {
            label: SELECT_ACTION.to_string(),
            outcome: dispatch,
            duration_ms: start.elapsed().as_millis() as u64,
        });
        Ok(outcome)
    }
}
