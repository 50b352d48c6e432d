//! Agent 构建器：从配置组装分类器、动作派发器与模型存储
//!
//! 各运行方式（book / learn / plan）共用同一套组件；测试可注入分类器与内存存储。

use std::sync::Arc;

use crate::actions::{ActionDispatcher, ActionRegistry};
use crate::config::AppConfig;
use crate::learning::{BlobStore, FileBlobStore};
use crate::nlp::{ContextClassifier, KeywordClassifier};

/// Agent 构建器：未注入的组件按配置使用默认实现
pub struct AgentBuilder {
    config: AppConfig,
    classifier: Option<Arc<dyn ContextClassifier>>,
    store: Option<Arc<dyn BlobStore>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            classifier: None,
            store: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContextClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 构建动作注册表与派发器（配置中的动作声明）
    pub fn build_dispatcher(&self) -> ActionDispatcher {
        let registry = ActionRegistry::from_specs(self.config.actions.clone(), self.config.agent.wait());
        ActionDispatcher::new(registry, self.config.agent.action_timeout_secs)
    }

    pub fn build_store(&self) -> Arc<dyn BlobStore> {
        match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(FileBlobStore::new(&self.config.policy.store_dir)),
        }
    }

    pub fn build_classifier(&self) -> Arc<dyn ContextClassifier> {
        match &self.classifier {
            Some(classifier) => Arc::clone(classifier),
            None => Arc::new(KeywordClassifier::new()),
        }
    }

    pub fn build_components(&self) -> AgentComponents {
        let dispatcher = self.build_dispatcher();
        tracing::debug!(actions = ?dispatcher.registry().labels(), "action registry built");
        AgentComponents {
            classifier: self.build_classifier(),
            dispatcher,
            store: self.build_store(),
            config: self.config.clone(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 预构建的 Agent 组件
pub struct AgentComponents {
    pub classifier: Arc<dyn ContextClassifier>,
    pub dispatcher: ActionDispatcher,
    pub store: Arc<dyn BlobStore>,
    pub config: AppConfig,
}

impl AgentComponents {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
