//! 交互日志：只追加的 {状态特征, 结果} 观测记录
//!
//! 记录的特征集合可以互不相同；`as_table` 以全部记录出现过的键的并集为列（按首次出现顺序），
//! 缺失值为 null。日志只活在一次运行内，不持久化。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一条状态快照：特征名 → 值（数值列参与训练，其它类型的列在训练前被剔除）
pub type FeatureMap = BTreeMap<String, Value>;

/// 结果标签列名
pub const OUTCOME_COLUMN: &str = "outcome";

/// 单条交互记录；追加后不再修改
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    features: FeatureMap,
    outcome: Option<f64>,
}

impl InteractionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从状态快照构造；若快照里带 `outcome` 键则拆出来作为标签（null / 非数值视为无标签）
    pub fn from_state(mut state: FeatureMap) -> Self {
        let outcome = state
            .remove(OUTCOME_COLUMN)
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite());
        Self {
            features: state,
            outcome,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.features.insert(key.into(), value.into());
        self
    }

    pub fn with_outcome(mut self, outcome: f64) -> Self {
        self.outcome = Some(outcome).filter(|v| v.is_finite());
        self
    }

    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    pub fn outcome(&self) -> Option<f64> {
        self.outcome
    }
}

/// 矩形视图：列为特征键并集（有标签时末尾追加 outcome 列），缺失为 null
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 数值列：至少一个非 null 值，且所有非 null 值都是数字
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        let mut seen = false;
        for row in &self.rows {
            match &row[idx] {
                Value::Null => {}
                Value::Number(_) => seen = true,
                _ => return false,
            }
        }
        seen
    }

    /// 除 outcome 外的数值列名（保持列顺序）
    pub fn numeric_feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, name)| name.as_str() != OUTCOME_COLUMN && self.is_numeric_column(*idx))
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// 取出一列为 f64，null 记为 NaN
    pub fn numeric_column(&self, idx: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row[idx].as_f64().unwrap_or(f64::NAN))
            .collect()
    }
}

/// 交互日志
#[derive(Clone, Debug, Default)]
pub struct InteractionLog {
    records: Vec<InteractionRecord>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: InteractionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    /// 至少一条记录带有非 null 的 outcome
    pub fn has_trainable_outcomes(&self) -> bool {
        self.records.iter().any(|r| r.outcome.is_some())
    }

    pub fn as_table(&self) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.features.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let with_outcome = self.has_trainable_outcomes();
        if with_outcome {
            columns.push(OUTCOME_COLUMN.to_string());
        }

        let rows = self
            .records
            .iter()
            .map(|record| {
                let mut row: Vec<Value> = columns
                    .iter()
                    .take(columns.len() - usize::from(with_outcome))
                    .map(|c| record.features.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                if with_outcome {
                    row.push(record.outcome.map(Value::from).unwrap_or(Value::Null));
                }
                row
            })
            .collect();

        Table { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_columns_are_union_of_keys() {
        let mut log = InteractionLog::new();
        log.append(InteractionRecord::new().with("page_load_time", 2.5).with("button_clicks", 1));
        log.append(InteractionRecord::new().with("form_fields_filled", 3).with_outcome(0.4));

        let table = log.as_table();
        assert_eq!(
            table.columns(),
            &["button_clicks", "page_load_time", "form_fields_filled", "outcome"]
        );
        assert_eq!(table.rows()[0][2], Value::Null);
        assert_eq!(table.rows()[0][3], Value::Null);
        assert_eq!(table.rows()[1][3], json!(0.4));
    }

    #[test]
    fn test_categorical_columns_are_not_numeric() {
        let mut log = InteractionLog::new();
        log.append(InteractionRecord::new().with("page", "home").with("clicks", 2));
        log.append(InteractionRecord::new().with("page", "search").with("clicks", 0));
        let table = log.as_table();
        assert_eq!(table.numeric_feature_columns(), vec!["clicks".to_string()]);
    }

    #[test]
    fn test_outcome_extracted_from_state() {
        let mut state = FeatureMap::new();
        state.insert("page_load_time".into(), json!(1.5));
        state.insert("outcome".into(), json!(0.9));
        let record = InteractionRecord::from_state(state);
        assert_eq!(record.outcome(), Some(0.9));
        assert!(!record.features().contains_key("outcome"));

        let mut state = FeatureMap::new();
        state.insert("outcome".into(), Value::Null);
        assert_eq!(InteractionRecord::from_state(state).outcome(), None);
    }

    #[test]
    fn test_no_outcomes_not_trainable() {
        let mut log = InteractionLog::new();
        assert!(!log.has_trainable_outcomes());
        for i in 0..5 {
            log.append(InteractionRecord::new().with("button_clicks", i));
        }
        assert!(!log.has_trainable_outcomes());
        assert!(!log.as_table().columns().iter().any(|c| c == OUTCOME_COLUMN));
    }
}
