//! 动作派发器
//!
//! 持有 ActionRegistry 与单动作超时，dispatch(label) 解析命令并在超时内执行；
//! 失败与超时只记录、不向上抛出。每次派发输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;

use crate::actions::command::ActionVars;
use crate::actions::ActionRegistry;
use crate::automation::PageDriver;
use crate::core::AgentError;

/// 一次派发的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Executed,
    /// 标签没有映射，按空操作处理
    Skipped,
    Failed { cause: String },
}

/// 派发历史中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub label: String,
    pub outcome: DispatchOutcome,
    pub duration_ms: u64,
}

impl ActionRecord {
    pub fn is_executed(&self) -> bool {
        self.outcome == DispatchOutcome::Executed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Failed { .. })
    }
}

pub struct ActionDispatcher {
    registry: ActionRegistry,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: ActionRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// 派发一个动作；永远不返回错误，失败体现在 ActionRecord 中
    pub async fn dispatch(&self, label: &str, driver: &dyn PageDriver, vars: &ActionVars) -> ActionRecord {
        let start = Instant::now();
        let command = self.registry.resolve(label);

        let outcome = if command.is_noop() {
            tracing::warn!(action = label, "no handler for action label, skipping");
            DispatchOutcome::Skipped
        } else {
            let result = match timeout(self.timeout, command.execute(driver, vars)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AgentError::ActionDispatch {
                    action: label.to_string(),
                    cause: e.to_string(),
                }),
                Err(_) => Err(AgentError::ActionTimeout(label.to_string())),
            };
            match result {
                Ok(()) => DispatchOutcome::Executed,
                Err(e) => {
                    tracing::warn!(action = label, error = %e, "action failed, continuing");
                    DispatchOutcome::Failed {
                        cause: e.to_string(),
                    }
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": label,
            "outcome": &outcome,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        ActionRecord {
            label: label.to_string(),
            outcome,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{default_action_specs, ActionSpec, ActionStep};
    use crate::automation::FixturePage;

    fn dispatcher() -> ActionDispatcher {
        let mut specs = default_action_specs();
        specs.push(ActionSpec::new(
            "Broken",
            vec![ActionStep::Click {
                selector: "#does-not-exist".into(),
            }],
        ));
        ActionDispatcher::new(ActionRegistry::from_specs(specs, Duration::from_millis(10)), 5)
    }

    #[tokio::test]
    async fn test_dispatch_executes_mapped_label() {
        let page = FixturePage::booking_site(&[]);
        let record = dispatcher().dispatch("Click Button", &page, &ActionVars::new()).await;
        assert!(record.is_executed());
        assert_eq!(page.clicks(), vec!["#submit".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_label_is_skipped_without_driver_calls() {
        let page = FixturePage::booking_site(&[]);
        let record = dispatcher().dispatch("Unknown Action", &page, &ActionVars::new()).await;
        assert_eq!(record.outcome, DispatchOutcome::Skipped);
        assert!(page.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let page = FixturePage::booking_site(&[]);
        let record = dispatcher().dispatch("Broken", &page, &ActionVars::new()).await;
        assert!(record.is_failed());
        let DispatchOutcome::Failed { cause } = record.outcome else {
            unreachable!()
        };
        assert!(cause.contains("#does-not-exist"));
    }
}
