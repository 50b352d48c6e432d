//! 状态观察器：每个学习周期产生一份特征快照

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::json;

use crate::automation::{DriverError, PageDriver};
use crate::learning::log::{FeatureMap, OUTCOME_COLUMN};

#[async_trait]
pub trait StateObserver: Send {
    fn name(&self) -> &str;

    async fn observe(&mut self, driver: &dyn PageDriver) -> Result<FeatureMap, DriverError>;
}

/// 合成观察器：固定种子的均匀随机特征与结果，页面无关
pub struct SyntheticObserver {
    rng: SmallRng,
}

impl SyntheticObserver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

#[async_trait]
impl StateObserver for SyntheticObserver {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn observe(&mut self, _driver: &dyn PageDriver) -> Result<FeatureMap, DriverError> {
        let mut state = FeatureMap::new();
        state.insert("page_load_time".into(), json!(self.rng.gen_range(1.0..5.0)));
        state.insert("button_clicks".into(), json!(self.rng.gen_range(0..3)));
        state.insert("form_fields_filled".into(), json!(self.rng.gen_range(0..5)));
        state.insert(OUTCOME_COLUMN.into(), json!(self.rng.gen_range(0.0..1.0)));
        Ok(state)
    }
}

/// 页面观察器：统计当前页面上的按钮、输入框与链接数量，不产生结果标签
#[derive(Default)]
pub struct PageObserver;

impl PageObserver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateObserver for PageObserver {
    fn name(&self) -> &str {
        "page"
    }

    async fn observe(&mut self, driver: &dyn PageDriver) -> Result<FeatureMap, DriverError> {
        let mut state = FeatureMap::new();
        for (feature, selector) in [("buttons", "button"), ("inputs", "input"), ("links", "a")] {
            let count = driver.find_all(None, selector).await?.len();
            state.insert(feature.into(), json!(count));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::FixturePage;

    #[tokio::test]
    async fn test_synthetic_ranges_and_seed() {
        let page = FixturePage::new(Vec::new());
        let mut a = SyntheticObserver::new(7);
        let mut b = SyntheticObserver::new(7);
        for _ in 0..20 {
            let s = a.observe(&page).await.unwrap();
            assert_eq!(s, b.observe(&page).await.unwrap());
            let load = s["page_load_time"].as_f64().unwrap();
            assert!((1.0..5.0).contains(&load));
            assert!((0..3).contains(&s["button_clicks"].as_i64().unwrap()));
            assert!((0..5).contains(&s["form_fields_filled"].as_i64().unwrap()));
            let outcome = s[OUTCOME_COLUMN].as_f64().unwrap();
            assert!((0.0..1.0).contains(&outcome));
        }
    }

    #[tokio::test]
    async fn test_page_observer_counts_elements() {
        let page = FixturePage::booking_site(&[("$1", "1 h", "01:00", "X")]);
        let state = PageObserver::new().observe(&page).await.unwrap();
        assert_eq!(state["inputs"], json!(5));
        assert_eq!(state["links"], json!(1));
        // 4 个表单按钮 + 1 个结果行选择按钮
        assert_eq!(state["buttons"], json!(5));
        assert!(!state.contains_key(OUTCOME_COLUMN));
    }
}
