//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WHISP__*` 覆盖（双下划线表示嵌套，如 `WHISP__AGENT__PACING_MS=0`）。

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::actions::{default_action_specs, ActionSpec};
use crate::automation::FlightSelectors;
use crate::core::AgentError;
use crate::engine::{default_plans, PlanSpec};
use crate::learning::{ActionTable, FeatureMap, ForestParams, PolicySettings};
use crate::scoring::UserPreferences;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub preferences: UserPreferences,
    pub selectors: FlightSelectors,
    pub policy: PolicySection,
    #[serde(default = "default_action_specs")]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_plans")]
    pub plans: Vec<PlanSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            preferences: UserPreferences::default(),
            selectors: FlightSelectors::default(),
            policy: PolicySection::default(),
            actions: default_action_specs(),
            plans: default_plans(),
        }
    }
}

impl AppConfig {
    /// 加载后的一致性检查（动作标签重复、桶重复、比例越界）
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut labels = HashSet::new();
        for spec in &self.actions {
            if !labels.insert(spec.label.as_str()) {
                return Err(AgentError::Config(format!("duplicate action label: {}", spec.label)));
            }
        }
        let mut buckets = HashSet::new();
        for entry in &self.policy.action_table {
            if !buckets.insert(entry.bucket) {
                return Err(AgentError::Config(format!(
                    "duplicate action_table bucket: {}",
                    entry.bucket
                )));
            }
        }
        if !(0.0..1.0).contains(&self.policy.test_fraction) {
            return Err(AgentError::Config(format!(
                "policy.test_fraction must be in [0, 1), got {}",
                self.policy.test_fraction
            )));
        }
        Ok(())
    }
}

/// [agent] 段：起始页面、等待与节奏、学习周期数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 打分运行打开的机票搜索页
    pub search_url: String,
    /// 学习运行的初始导航地址；为空则不导航
    pub start_url: Option<String>,
    /// 元素有界等待（秒）
    pub wait_timeout_secs: u64,
    /// 动作之间的暂停（毫秒），0 表示不暂停
    pub pacing_ms: u64,
    /// 单个动作的超时（秒）
    pub action_timeout_secs: u64,
    pub cycles: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            search_url: "https://example-flight-booking-site.com".to_string(),
            start_url: Some("https://example.com".to_string()),
            wait_timeout_secs: 10,
            pacing_ms: 2000,
            action_timeout_secs: 30,
            cycles: 5,
        }
    }
}

impl AgentSection {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// [[policy.action_table]] 条目：round(预测值) == bucket 时输出 label
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BucketEntry {
    pub bucket: i64,
    pub label: String,
}

fn default_action_table() -> Vec<BucketEntry> {
    [(0, "Click Button"), (1, "Fill Form"), (2, "Navigate")]
        .into_iter()
        .map(|(bucket, label)| BucketEntry {
            bucket,
            label: label.to_string(),
        })
        .collect()
}

fn default_final_state() -> BTreeMap<String, f64> {
    [
        ("page_load_time", 3.0),
        ("button_clicks", 1.0),
        ("form_fields_filled", 2.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// [policy] 段：模型存储、森林超参数、动作桶表、终态
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub model_key: String,
    pub store_dir: PathBuf,
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub fallback_label: String,
    pub unknown_label: String,
    #[serde(default = "default_action_table")]
    pub action_table: Vec<BucketEntry>,
    #[serde(default = "default_final_state")]
    pub final_state: BTreeMap<String, f64>,
}

impl Default for PolicySection {
    fn default() -> Self {
        let forest = ForestParams::default();
        Self {
            model_key: "voyant_model".to_string(),
            store_dir: PathBuf::from("models"),
            test_fraction: 0.2,
            seed: forest.seed,
            n_trees: forest.n_trees,
            max_depth: forest.max_depth,
            min_samples_split: forest.min_samples_split,
            fallback_label: "Default Action".to_string(),
            unknown_label: "Unknown Action".to_string(),
            action_table: default_action_table(),
            final_state: default_final_state(),
        }
    }
}

impl PolicySection {
    pub fn settings(&self) -> PolicySettings {
        let buckets = self
            .action_table
            .iter()
            .map(|e| (e.bucket, e.label.clone()))
            .collect();
        PolicySettings {
            forest: ForestParams {
                n_trees: self.n_trees,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                seed: self.seed,
            },
            test_fraction: self.test_fraction,
            table: ActionTable::new(buckets, &self.fallback_label, &self.unknown_label),
        }
    }

    pub fn final_state(&self) -> FeatureMap {
        self.final_state
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::json!(v)))
            .collect()
    }
}

/// 从 config 目录加载配置，环境变量 WHISP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键）；文件不存在时报错
/// 3. 最后叠加环境变量 WHISP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WHISP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_policy_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.policy.settings(), PolicySettings::default());
        assert_eq!(cfg.agent.wait(), Duration::from_secs(10));
        assert_eq!(cfg.actions.len(), default_action_specs().len());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_load_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r##"
[agent]
pacing_ms = 0
cycles = 3

[preferences]
max_price = 500.0
preferred_airline = "AirJapan"
frequent_airlines = ["AirJapan", "ANA"]

[policy]
seed = 7

[[policy.action_table]]
bucket = 0
label = "Click Button"

[[actions]]
label = "Click Button"
steps = [{{ kind = "click", selector = "#go" }}]

[[plans]]
intent = "Complete a form"
actions = ["Click Button"]
"##
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agent.pacing_ms, 0);
        assert_eq!(cfg.agent.cycles, 3);
        assert_eq!(cfg.agent.wait_timeout_secs, 10);
        assert_eq!(cfg.preferences.max_price, Some(500.0));
        assert!(cfg.preferences.is_frequent("ANA"));
        assert_eq!(cfg.policy.seed, 7);
        assert_eq!(cfg.policy.action_table.len(), 1);
        assert_eq!(cfg.policy.settings().table.label_for(1.0), "Unknown Action");
        assert_eq!(cfg.actions.len(), 1);
        assert_eq!(cfg.plans[0].intent, "Complete a form");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/whisp.toml"))).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_buckets() {
        let mut cfg = AppConfig::default();
        cfg.policy.action_table.push(BucketEntry {
            bucket: 0,
            label: "Again".into(),
        });
        assert!(cfg.validate().is_err());
    }
}
