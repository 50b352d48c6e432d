//! 学习运行：观察 → 记录 → 预测 → 派发（×N）→ 训练并持久化 → 终态预测与派发

use std::time::Duration;

use crate::actions::ActionDispatcher;
use crate::automation::PageDriver;
use crate::core::{AgentError, RunContext, RunPhase};
use crate::engine::{pace, RunOutcome};
use crate::learning::{
    BlobStore, FeatureMap, InteractionRecord, PolicyModel, PolicySettings, StateObserver,
    TrainOutcome,
};

/// 学习运行参数
#[derive(Debug, Clone)]
pub struct LearningSettings {
    /// 初始导航地址；None 表示停留在当前页面
    pub start_url: Option<String>,
    pub cycles: usize,
    pub pacing: Duration,
    pub model_key: String,
    /// 训练后用于最终决策的状态
    pub final_state: FeatureMap,
    pub policy: PolicySettings,
}

pub struct LearningRun<'a> {
    driver: &'a dyn PageDriver,
    dispatcher: &'a ActionDispatcher,
    store: &'a dyn BlobStore,
    settings: LearningSettings,
}

impl<'a> LearningRun<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        dispatcher: &'a ActionDispatcher,
        store: &'a dyn BlobStore,
        settings: LearningSettings,
    ) -> Self {
        Self {
            driver,
            dispatcher,
            store,
            settings,
        }
    }

    /// 读取已保存的模型；读取或解码失败时告警并从新模型开始
    fn load_model(&self) -> PolicyModel {
        let key = &self.settings.model_key;
        match PolicyModel::load(self.store, key, self.settings.policy.clone()) {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "model unreadable, starting fresh");
                PolicyModel::new(self.settings.policy.clone())
            }
        }
    }

    fn train_and_save(&self, model: &mut PolicyModel, ctx: &RunContext) -> Option<TrainOutcome> {
        let outcome = match model.train(ctx.log()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "training failed, keeping previous model");
                return None;
            }
        };
        if outcome.is_trained() {
            if let Err(e) = model.save(self.store, &self.settings.model_key) {
                tracing::warn!(key = %self.settings.model_key, error = %e, "model save failed");
            }
        }
        Some(outcome)
    }

    pub async fn run(
        &self,
        ctx: &mut RunContext,
        observer: &mut dyn StateObserver,
    ) -> Result<RunOutcome, AgentError> {
        let mut model = self.load_model();

        if let Some(url) = &self.settings.start_url {
            if let Err(e) = self.driver.navigate(url).await {
                tracing::warn!(url = %url, error = %e, "initial navigation failed, continuing");
            }
        }

        let cycles = self.settings.cycles;
        for cycle in 0..cycles {
            ctx.advance(RunPhase::Observing);
            let state = match observer.observe(self.driver).await {
                Ok(state) => {
                    let record = InteractionRecord::from_state(state);
                    let features = record.features().clone();
                    ctx.log_mut().append(record);
                    features
                }
                Err(e) => {
                    tracing::warn!(cycle, observer = observer.name(), error = %e, "observation failed");
                    FeatureMap::new()
                }
            };

            ctx.advance(RunPhase::Acting);
            let decision = model.predict(&state);
            tracing::info!(cycle, action = %decision.label, raw = ?decision.raw, "predicted action");
            let record = self
                .dispatcher
                .dispatch(&decision.label, self.driver, &ctx.vars())
                .await;
            ctx.record_action(record);
            pace(self.settings.pacing).await;
        }

        ctx.advance(RunPhase::Training);
        let training = self.train_and_save(&mut model, ctx);

        ctx.advance(RunPhase::FinalAct);
        let final_decision = model.predict(&self.settings.final_state);
        tracing::info!(action = %final_decision.label, raw = ?final_decision.raw, "final action");
        let record = self
            .dispatcher
            .dispatch(&final_decision.label, self.driver, &ctx.vars())
            .await;
        ctx.record_action(record);

        Ok(RunOutcome::Learned {
            cycles,
            training,
            final_decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{default_action_specs, ActionRegistry};
    use crate::automation::FixturePage;
    use crate::learning::{MemoryBlobStore, PageObserver, SyntheticObserver};
    use crate::nlp::TaskContext;
    use serde_json::json;

    fn settings(cycles: usize) -> LearningSettings {
        let mut final_state = FeatureMap::new();
        final_state.insert("page_load_time".into(), json!(3));
        final_state.insert("button_clicks".into(), json!(1));
        final_state.insert("form_fields_filled".into(), json!(2));
        LearningSettings {
            start_url: Some("https://example.com".into()),
            cycles,
            pacing: Duration::ZERO,
            model_key: "voyant_model".into(),
            final_state,
            policy: PolicySettings::default(),
        }
    }

    fn dispatcher() -> ActionDispatcher {
        ActionDispatcher::new(
            ActionRegistry::from_specs(default_action_specs(), Duration::from_millis(10)),
            5,
        )
    }

    fn ctx() -> RunContext {
        RunContext::new("learn", TaskContext::new("General", "Unknown"))
    }

    #[tokio::test]
    async fn test_fresh_model_trains_and_saves() {
        let page = FixturePage::booking_site(&[]);
        let store = MemoryBlobStore::new();
        let dispatcher = dispatcher();
        let run = LearningRun::new(&page, &dispatcher, &store, settings(5));
        let mut ctx = ctx();
        let mut observer = SyntheticObserver::new(42);

        let outcome = run.run(&mut ctx, &mut observer).await.unwrap();
        let RunOutcome::Learned { cycles, training, final_decision } = outcome else {
            panic!("expected learned outcome");
        };
        assert_eq!(cycles, 5);
        assert!(training.unwrap().is_trained());
        assert!(!final_decision.is_fallback);
        assert!(store.contains("voyant_model"));
        assert_eq!(ctx.log().len(), 5);
        // 5 个周期的动作 + 终态动作
        assert_eq!(ctx.actions().len(), 6);
        // 未训练时每个周期都是兜底动作（没有映射，跳过）
        assert!(ctx.actions()[..5].iter().all(|a| a.label == "Default Action"));
    }

    #[tokio::test]
    async fn test_zero_cycles_skips_training_and_falls_back() {
        let page = FixturePage::booking_site(&[]);
        let store = MemoryBlobStore::new();
        let dispatcher = dispatcher();
        let run = LearningRun::new(&page, &dispatcher, &store, settings(0));
        let mut ctx = ctx();
        let outcome = run.run(&mut ctx, &mut SyntheticObserver::new(1)).await.unwrap();
        let RunOutcome::Learned { training, final_decision, .. } = outcome else {
            panic!("expected learned outcome");
        };
        assert_eq!(
            training,
            Some(TrainOutcome::InsufficientData(crate::learning::InsufficientData::EmptyLog))
        );
        assert_eq!(final_decision.label, "Default Action");
        assert!(!store.contains("voyant_model"));
    }

    #[tokio::test]
    async fn test_page_observer_without_outcomes_does_not_train() {
        let page = FixturePage::booking_site(&[]);
        let store = MemoryBlobStore::new();
        let dispatcher = dispatcher();
        let run = LearningRun::new(&page, &dispatcher, &store, settings(3));
        let mut ctx = ctx();
        let outcome = run.run(&mut ctx, &mut PageObserver::new()).await.unwrap();
        let RunOutcome::Learned { training, .. } = outcome else {
            panic!("expected learned outcome");
        };
        assert_eq!(
            training,
            Some(TrainOutcome::InsufficientData(crate::learning::InsufficientData::NoOutcomes))
        );
        assert_eq!(ctx.log().len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_model_starts_fresh() {
        let page = FixturePage::booking_site(&[]);
        let store = MemoryBlobStore::new();
        store.save("voyant_model", b"garbage").unwrap();
        let dispatcher = dispatcher();
        let run = LearningRun::new(&page, &dispatcher, &store, settings(2));
        let outcome = run.run(&mut ctx(), &mut SyntheticObserver::new(3)).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Learned { .. }));
    }
}
