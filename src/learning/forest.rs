//! 随机森林回归器
//!
//! 每棵树是在 bootstrap 样本上训练的 CART 回归树：按平方误差和最小化选择切分，
//! 阈值取相邻两个不同取值的中点。预测为所有树输出的平均值。
//! bootstrap 使用固定种子的 `StdRng`，同样的数据与参数得到同样的模型。

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 森林超参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// 单棵回归树，节点平铺存储，根节点下标为 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], sample: &[usize], params: &ForestParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(x, y, sample, 0, params);
        tree
    }

    fn build(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        idx: &[usize],
        depth: usize,
        params: &ForestParams,
    ) -> usize {
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: mean_of(y, idx),
        });

        if depth >= params.max_depth || idx.len() < params.min_samples_split.max(2) {
            return node_id;
        }

        let Some(split) = best_split(x, y, idx) else {
            return node_id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .partition(|&&i| x[i][split.feature] <= split.threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return node_id;
        }

        let left = self.build(x, y, &left_idx, depth + 1, params);
        let right = self.build(x, y, &right_idx, depth + 1, params);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }

    fn predict_one(&self, row: &[f64]) -> f64 {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    current = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn mean_of(y: &[f64], idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return 0.0;
    }
    idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len() as f64
}

fn sse_of(sum: f64, sum_sq: f64, n: f64) -> f64 {
    (sum_sq - sum * sum / n).max(0.0)
}

/// 在所有特征上寻找使左右平方误差和最小的切分；无法降低误差时返回 None
fn best_split(x: &[Vec<f64>], y: &[f64], idx: &[usize]) -> Option<Split> {
    let n = idx.len();
    let total_sum: f64 = idx.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = idx.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = sse_of(total_sum, total_sq, n as f64);
    if parent_sse <= f64::EPSILON {
        return None;
    }

    let n_features = x[idx[0]].len();
    let mut best: Option<Split> = None;
    let mut sorted = idx.to_vec();

    for feature in 0..n_features {
        sorted.sort_by(|&a, &b| {
            x[a][feature]
                .partial_cmp(&x[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            let prev = sorted[k - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];

            let lo = x[prev][feature];
            let hi = x[sorted[k]][feature];
            if lo >= hi {
                continue;
            }

            let left_n = k as f64;
            let right_n = (n - k) as f64;
            let sse = sse_of(left_sum, left_sq, left_n)
                + sse_of(total_sum - left_sum, total_sq - left_sq, right_n);

            if sse + 1e-12 < parent_sse && best.as_ref().map_or(true, |b| sse < b.sse) {
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid < hi { mid } else { lo };
                best = Some(Split {
                    feature,
                    threshold,
                    sse,
                });
            }
        }
    }

    best
}

/// 随机森林回归器；`trees` 为空即未训练
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// 在 (x, y) 上重新训练；x 中不能含 NaN（调用方负责填补）
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), AgentError> {
        if x.is_empty() {
            return Err(AgentError::Model("cannot fit on zero rows".to_string()));
        }
        if x.len() != y.len() {
            return Err(AgentError::Model(format!(
                "row count mismatch: {} feature rows vs {} labels",
                x.len(),
                y.len()
            )));
        }
        let width = x[0].len();
        if x.iter().any(|row| row.len() != width) {
            return Err(AgentError::Model("ragged feature matrix".to_string()));
        }
        if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(AgentError::Model("non-finite value in training data".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let n = x.len();
        let trees = (0..self.params.n_trees.max(1))
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &sample, &self.params)
            })
            .collect();

        self.trees = trees;
        self.n_features = width;
        Ok(())
    }

    /// 单行预测；未训练时返回 None
    pub fn predict_one(&self, row: &[f64]) -> Option<f64> {
        if self.trees.is_empty() {
            return None;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(row)).sum();
        Some(sum / self.trees.len() as f64)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().filter_map(|row| self.predict_one(row)).collect()
    }
}

pub fn mean_squared_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, l)| (p - l).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 2.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_unfitted_predicts_none() {
        let forest = RandomForest::new(ForestParams::default());
        assert!(!forest.is_fitted());
        assert_eq!(forest.predict_one(&[1.0, 2.0]), None);
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestParams::default());
        forest.fit(&x, &y).unwrap();
        assert!(forest.is_fitted());
        assert!(forest.predict_one(&[1.0, 0.0]).unwrap() < 0.5);
        assert!(forest.predict_one(&[18.0, 0.0]).unwrap() > 1.5);
        let mse = mean_squared_error(&forest.predict(&x), &y);
        assert!(mse < 0.2, "training mse too high: {mse}");
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = step_data();
        let mut a = RandomForest::new(ForestParams::default());
        let mut b = RandomForest::new(ForestParams::default());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_target_single_leaf() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0.7, 0.7, 0.7];
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 3,
            ..ForestParams::default()
        });
        forest.fit(&x, &y).unwrap();
        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
        assert!((forest.predict_one(&[10.0]).unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut forest = RandomForest::new(ForestParams::default());
        assert!(forest.fit(&[], &[]).is_err());
        assert!(forest.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(forest.fit(&[vec![f64::NAN]], &[1.0]).is_err());
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestParams::default());
        forest.fit(&x, &y).unwrap();
        let blob = serde_json::to_vec(&forest).unwrap();
        let restored: RandomForest = serde_json::from_slice(&blob).unwrap();
        for row in &x {
            assert_eq!(
                forest.predict_one(row).unwrap().to_bits(),
                restored.predict_one(row).unwrap().to_bits()
            );
        }
    }
}
