//! 动作策略模型
//!
//! 包装随机森林回归器：从交互日志训练，把连续预测值四舍五入到整数桶并查表得到离散动作标签。
//! 未训练时返回兜底标签并告警；训练数据不足时跳过训练并保留原模型。

use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::learning::forest::{mean_squared_error, ForestParams, RandomForest};
use crate::learning::log::{FeatureMap, InteractionLog, OUTCOME_COLUMN};
use crate::learning::BlobStore;

/// 持久化格式版本
const FORMAT_VERSION: u32 = 1;

/// 连续预测值 → 动作标签的桶表
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTable {
    buckets: BTreeMap<i64, String>,
    fallback_label: String,
    unknown_label: String,
}

impl Default for ActionTable {
    fn default() -> Self {
        let buckets = [(0, "Click Button"), (1, "Fill Form"), (2, "Navigate")]
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        Self {
            buckets,
            fallback_label: "Default Action".to_string(),
            unknown_label: "Unknown Action".to_string(),
        }
    }
}

impl ActionTable {
    pub fn new(
        buckets: BTreeMap<i64, String>,
        fallback_label: impl Into<String>,
        unknown_label: impl Into<String>,
    ) -> Self {
        Self {
            buckets,
            fallback_label: fallback_label.into(),
            unknown_label: unknown_label.into(),
        }
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    pub fn unknown_label(&self) -> &str {
        &self.unknown_label
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buckets.values().map(String::as_str)
    }

    /// round(raw) 命中桶则返回对应标签，否则返回 unknown 标签
    pub fn label_for(&self, raw: f64) -> &str {
        if !raw.is_finite() {
            return &self.unknown_label;
        }
        let bucket = raw.round();
        if bucket < i64::MIN as f64 || bucket > i64::MAX as f64 {
            return &self.unknown_label;
        }
        self.buckets
            .get(&(bucket as i64))
            .map(String::as_str)
            .unwrap_or(&self.unknown_label)
    }
}

/// 一次预测的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDecision {
    pub label: String,
    /// 模型原始输出；兜底时为 None
    pub raw: Option<f64>,
    /// 未训练模型给出的兜底动作
    pub is_fallback: bool,
}

/// 训练跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientData {
    EmptyLog,
    NoOutcomes,
    NoNumericFeatures,
}

impl std::fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsufficientData::EmptyLog => write!(f, "No interaction data to train on."),
            InsufficientData::NoOutcomes => write!(f, "No outcome data to train on."),
            InsufficientData::NoNumericFeatures => write!(f, "No numeric features to train on."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub features: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    /// 留出集均方误差（留出集为空时为 None）
    pub holdout_mse: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrainOutcome {
    Trained(TrainReport),
    InsufficientData(InsufficientData),
}

impl TrainOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainOutcome::Trained(_))
    }
}

/// 策略模型的可调参数
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySettings {
    pub forest: ForestParams,
    pub test_fraction: f64,
    pub table: ActionTable,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_fraction: 0.2,
            table: ActionTable::default(),
        }
    }
}

/// 训练后的投影：特征列顺序、填补值、森林
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedPolicy {
    features: Vec<String>,
    fill: Vec<f64>,
    forest: RandomForest,
}

impl FittedPolicy {
    fn project(&self, state: &FeatureMap) -> Vec<f64> {
        self.features
            .iter()
            .zip(self.fill.iter())
            .map(|(name, fill)| {
                state
                    .get(name)
                    .and_then(|v| v.as_f64())
                    .filter(|v| v.is_finite())
                    .unwrap_or(*fill)
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedPolicy {
    format: u32,
    params: ForestParams,
    fitted: Option<FittedPolicy>,
}

pub struct PolicyModel {
    settings: PolicySettings,
    fitted: Option<FittedPolicy>,
}

impl PolicyModel {
    /// 未训练的新模型
    pub fn new(settings: PolicySettings) -> Self {
        Self {
            settings,
            fitted: None,
        }
    }

    /// 从存储恢复；没有条目时返回新模型（不是错误）
    pub fn load(store: &dyn BlobStore, key: &str, settings: PolicySettings) -> Result<Self, AgentError> {
        let Some(blob) = store.load(key)? else {
            tracing::info!(key, "No model found. Initialized a new model.");
            return Ok(Self::new(settings));
        };

        let persisted: PersistedPolicy = serde_json::from_slice(&blob)
            .map_err(|e| AgentError::Model(format!("decode {key}: {e}")))?;
        if persisted.format != FORMAT_VERSION {
            return Err(AgentError::Model(format!(
                "unsupported model format {} (expected {FORMAT_VERSION})",
                persisted.format
            )));
        }

        tracing::info!(key, trained = persisted.fitted.is_some(), "model loaded");
        // 已拟合的森林照常使用，下一次训练按当前配置的超参数
        if persisted.params != settings.forest {
            tracing::info!(
                key,
                saved = ?persisted.params,
                configured = ?settings.forest,
                "saved forest params differ from config; retraining will use config"
            );
        }
        Ok(Self {
            settings,
            fitted: persisted.fitted,
        })
    }

    /// 序列化为不透明 blob 写入存储；未训练时写入默认状态
    pub fn save(&self, store: &dyn BlobStore, key: &str) -> Result<(), AgentError> {
        let persisted = PersistedPolicy {
            format: FORMAT_VERSION,
            params: self.settings.forest.clone(),
            fitted: self.fitted.clone(),
        };
        let blob = serde_json::to_vec(&persisted)
            .map_err(|e| AgentError::Model(format!("encode {key}: {e}")))?;
        store.save(key, &blob)?;
        tracing::debug!(key, bytes = blob.len(), "model saved");
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// 下一次训练使用的森林超参数
    pub fn forest_params(&self) -> &ForestParams {
        &self.settings.forest
    }

    pub fn table(&self) -> &ActionTable {
        &self.settings.table
    }

    /// 训练时使用的特征列（未训练为空）
    pub fn features(&self) -> &[String] {
        self.fitted.as_ref().map(|f| f.features.as_slice()).unwrap_or(&[])
    }

    /// 从日志训练。数据不足时返回 InsufficientData 且不改动模型状态。
    pub fn train(&mut self, log: &InteractionLog) -> Result<TrainOutcome, AgentError> {
        if log.is_empty() {
            return Ok(self.skip(InsufficientData::EmptyLog));
        }
        if !log.has_trainable_outcomes() {
            return Ok(self.skip(InsufficientData::NoOutcomes));
        }

        let table = log.as_table();
        let features = table.numeric_feature_columns();
        if features.is_empty() {
            return Ok(self.skip(InsufficientData::NoNumericFeatures));
        }

        let outcome_idx = table
            .column_index(OUTCOME_COLUMN)
            .ok_or_else(|| AgentError::Model("outcome column missing".to_string()))?;
        let outcomes = table.numeric_column(outcome_idx);
        let columns: Vec<Vec<f64>> = features
            .iter()
            .filter_map(|name| table.column_index(name))
            .map(|idx| table.numeric_column(idx))
            .collect();

        // 只保留有标签的行
        let mut labelled: Vec<usize> = (0..outcomes.len())
            .filter(|&i| outcomes[i].is_finite())
            .collect();

        let mut rng = StdRng::seed_from_u64(self.settings.forest.seed);
        labelled.shuffle(&mut rng);
        let n = labelled.len();
        let fraction = self.settings.test_fraction.clamp(0.0, 1.0);
        let mut n_test = (n as f64 * fraction).ceil() as usize;
        if n_test >= n {
            n_test = 0;
        }
        let (test_rows, train_rows) = labelled.split_at(n_test);

        let fill: Vec<f64> = columns
            .iter()
            .map(|col| {
                let known: Vec<f64> = train_rows
                    .iter()
                    .map(|&i| col[i])
                    .filter(|v| v.is_finite())
                    .collect();
                if known.is_empty() {
                    0.0
                } else {
                    known.iter().sum::<f64>() / known.len() as f64
                }
            })
            .collect();

        let matrix = |rows: &[usize]| -> Vec<Vec<f64>> {
            rows.iter()
                .map(|&i| {
                    columns
                        .iter()
                        .zip(fill.iter())
                        .map(|(col, fill)| if col[i].is_finite() { col[i] } else { *fill })
                        .collect()
                })
                .collect()
        };
        let x_train = matrix(train_rows);
        let y_train: Vec<f64> = train_rows.iter().map(|&i| outcomes[i]).collect();

        let mut forest = RandomForest::new(self.settings.forest.clone());
        forest.fit(&x_train, &y_train)?;

        let holdout_mse = if test_rows.is_empty() {
            None
        } else {
            let x_test = matrix(test_rows);
            let y_test: Vec<f64> = test_rows.iter().map(|&i| outcomes[i]).collect();
            Some(mean_squared_error(&forest.predict(&x_test), &y_test))
        };

        let report = TrainReport {
            features: features.clone(),
            train_rows: train_rows.len(),
            test_rows: test_rows.len(),
            holdout_mse,
        };
        tracing::info!(
            train_rows = report.train_rows,
            test_rows = report.test_rows,
            features = ?report.features,
            holdout_mse = ?report.holdout_mse,
            "policy model trained"
        );

        self.fitted = Some(FittedPolicy {
            features,
            fill,
            forest,
        });
        Ok(TrainOutcome::Trained(report))
    }

    fn skip(&self, reason: InsufficientData) -> TrainOutcome {
        tracing::warn!(reason = %reason, trained = self.is_trained(), "training skipped");
        TrainOutcome::InsufficientData(reason)
    }

    /// 模型原始输出；未训练为 None
    pub fn predict_value(&self, state: &FeatureMap) -> Option<f64> {
        let fitted = self.fitted.as_ref()?;
        fitted.forest.predict_one(&fitted.project(state))
    }

    /// 预测动作标签；未训练时返回兜底标签（告警，不报错）
    pub fn predict(&self, state: &FeatureMap) -> ActionDecision {
        match self.predict_value(state) {
            Some(raw) => ActionDecision {
                label: self.settings.table.label_for(raw).to_string(),
                raw: Some(raw),
                is_fallback: false,
            },
            None => {
                tracing::warn!("Model not trained or loaded. Using default action.");
                ActionDecision {
                    label: self.settings.table.fallback_label().to_string(),
                    raw: None,
                    is_fallback: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{InteractionRecord, MemoryBlobStore};
    use serde_json::json;

    fn state(load: f64, clicks: i64, filled: i64) -> FeatureMap {
        let mut s = FeatureMap::new();
        s.insert("page_load_time".into(), json!(load));
        s.insert("button_clicks".into(), json!(clicks));
        s.insert("form_fields_filled".into(), json!(filled));
        s
    }

    fn trained_log() -> InteractionLog {
        let mut log = InteractionLog::new();
        for i in 0..30 {
            let clicks = i % 3;
            log.append(
                InteractionRecord::new()
                    .with("page_load_time", 1.0 + (i % 5) as f64)
                    .with("button_clicks", clicks)
                    .with("form_fields_filled", i % 4)
                    .with("page_name", "checkout")
                    .with_outcome(clicks as f64),
            );
        }
        log
    }

    #[test]
    fn test_label_for_rounds_to_bucket() {
        let table = ActionTable::default();
        assert_eq!(table.label_for(0.4), "Click Button");
        assert_eq!(table.label_for(0.6), "Fill Form");
        assert_eq!(table.label_for(2.2), "Navigate");
        assert_eq!(table.label_for(3.0), "Unknown Action");
        assert_eq!(table.label_for(-0.7), "Unknown Action");
        assert_eq!(table.label_for(f64::NAN), "Unknown Action");
    }

    #[test]
    fn test_untrained_predicts_fallback() {
        let model = PolicyModel::new(PolicySettings::default());
        for s in [state(1.0, 0, 0), state(4.0, 2, 3), FeatureMap::new()] {
            let decision = model.predict(&s);
            assert_eq!(decision.label, "Default Action");
            assert!(decision.is_fallback);
        }
    }

    #[test]
    fn test_train_skips_without_data() {
        let mut model = PolicyModel::new(PolicySettings::default());
        let outcome = model.train(&InteractionLog::new()).unwrap();
        assert_eq!(outcome, TrainOutcome::InsufficientData(InsufficientData::EmptyLog));

        let mut log = InteractionLog::new();
        for i in 0..5 {
            log.append(InteractionRecord::new().with("button_clicks", i));
        }
        let outcome = model.train(&log).unwrap();
        assert_eq!(outcome, TrainOutcome::InsufficientData(InsufficientData::NoOutcomes));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_skipped_training_keeps_previous_model() {
        let mut model = PolicyModel::new(PolicySettings::default());
        assert!(model.train(&trained_log()).unwrap().is_trained());
        let before = model.predict(&state(2.0, 1, 1));

        let outcome = model.train(&InteractionLog::new()).unwrap();
        assert!(!outcome.is_trained());
        assert!(model.is_trained());
        assert_eq!(model.predict(&state(2.0, 1, 1)), before);
    }

    #[test]
    fn test_train_uses_numeric_features_and_holdout() {
        let mut model = PolicyModel::new(PolicySettings::default());
        let TrainOutcome::Trained(report) = model.train(&trained_log()).unwrap() else {
            panic!("expected training to run");
        };
        assert_eq!(report.train_rows + report.test_rows, 30);
        assert_eq!(report.test_rows, 6);
        assert!(report.holdout_mse.is_some());
        assert!(!report.features.iter().any(|f| f == "page_name" || f == "outcome"));
        assert_eq!(model.predict(&state(2.0, 2, 1)).label, "Navigate");
        assert_eq!(model.predict(&state(2.0, 0, 1)).label, "Click Button");
    }

    #[test]
    fn test_single_row_trains_without_holdout() {
        let mut log = InteractionLog::new();
        log.append(InteractionRecord::new().with("x", 1.0).with_outcome(1.0));
        let mut model = PolicyModel::new(PolicySettings::default());
        let TrainOutcome::Trained(report) = model.train(&log).unwrap() else {
            panic!("expected training to run");
        };
        assert_eq!(report.train_rows, 1);
        assert_eq!(report.holdout_mse, None);
        assert_eq!(model.predict(&FeatureMap::new()).label, "Fill Form");
    }

    #[test]
    fn test_load_miss_is_fresh_model() {
        let store = MemoryBlobStore::new();
        let model = PolicyModel::load(&store, "policy", PolicySettings::default()).unwrap();
        assert!(!model.is_trained());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = MemoryBlobStore::new();
        let mut model = PolicyModel::new(PolicySettings::default());
        model.train(&trained_log()).unwrap();
        model.save(&store, "policy").unwrap();

        let restored = PolicyModel::load(&store, "policy", PolicySettings::default()).unwrap();
        assert!(restored.is_trained());
        for s in [state(1.0, 0, 0), state(3.5, 1, 2), state(5.0, 2, 3)] {
            assert_eq!(
                model.predict_value(&s).map(f64::to_bits),
                restored.predict_value(&s).map(f64::to_bits)
            );
            assert_eq!(model.predict(&s), restored.predict(&s));
        }
    }

    #[test]
    fn test_load_keeps_configured_forest_params() {
        let store = MemoryBlobStore::new();
        let mut model = PolicyModel::new(PolicySettings::default());
        model.train(&trained_log()).unwrap();
        model.save(&store, "policy").unwrap();

        let mut settings = PolicySettings::default();
        settings.forest.n_trees = 7;
        settings.forest.seed = 99;
        let restored = PolicyModel::load(&store, "policy", settings.clone()).unwrap();
        assert_eq!(restored.forest_params(), &settings.forest);
        let s = state(3.5, 1, 2);
        assert_eq!(
            model.predict_value(&s).map(f64::to_bits),
            restored.predict_value(&s).map(f64::to_bits)
        );
    }

    #[test]
    fn test_save_untrained_is_loadable() {
        let store = MemoryBlobStore::new();
        let model = PolicyModel::new(PolicySettings::default());
        model.save(&store, "policy").unwrap();
        model.save(&store, "policy").unwrap();
        let restored = PolicyModel::load(&store, "policy", PolicySettings::default()).unwrap();
        assert!(!restored.is_trained());
    }

    #[test]
    fn test_corrupt_blob_is_error() {
        let store = MemoryBlobStore::new();
        store.save("policy", b"not json").unwrap();
        assert!(PolicyModel::load(&store, "policy", PolicySettings::default()).is_err());
    }
}
