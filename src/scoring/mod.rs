//! 打分层：任务目标、用户偏好、候选项与多准则偏好打分

pub mod scorer;
pub mod types;

pub use scorer::PreferenceScorer;
pub use types::{FlightOption, ScoredOption, TaskGoal, UserPreferences};
