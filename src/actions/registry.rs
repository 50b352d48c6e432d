//! 动作注册表：标签 → Arc<dyn ActionCommand>

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::command::{ActionCommand, ActionSpec, NoopCommand, StepsCommand};

#[derive(Default)]
pub struct ActionRegistry {
    commands: HashMap<String, Arc<dyn ActionCommand>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由声明构建；同名标签后者覆盖前者
    pub fn from_specs(specs: impl IntoIterator<Item = ActionSpec>, wait: Duration) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(StepsCommand::new(spec, wait));
        }
        registry
    }

    pub fn register(&mut self, command: impl ActionCommand + 'static) {
        let label = command.label().to_string();
        self.commands.insert(label, Arc::new(command));
    }

    pub fn get(&self, label: &str) -> Option<Arc<dyn ActionCommand>> {
        self.commands.get(label).cloned()
    }

    /// 未注册的标签解析为 NoopCommand
    pub fn resolve(&self, label: &str) -> Arc<dyn ActionCommand> {
        self.get(label)
            .unwrap_or_else(|| Arc::new(NoopCommand::new(label)))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.commands.contains_key(label)
    }

    /// 已注册标签（排序后返回）
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.commands.keys().cloned().collect();
        labels.sort();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::default_action_specs;

    #[test]
    fn test_resolve_unknown_is_noop() {
        let registry = ActionRegistry::from_specs(default_action_specs(), Duration::from_secs(1));
        assert!(!registry.resolve("Click Button").is_noop());
        let noop = registry.resolve("Unknown Action");
        assert!(noop.is_noop());
        assert_eq!(noop.label(), "Unknown Action");
        assert!(!registry.contains("Default Action"));
    }

    #[test]
    fn test_labels_sorted() {
        let registry = ActionRegistry::from_specs(default_action_specs(), Duration::from_secs(1));
        let labels = registry.labels();
        assert_eq!(labels.len(), 8);
        assert!(labels.windows(2).all(|w| w[0] <= w[1]));
    }
}
