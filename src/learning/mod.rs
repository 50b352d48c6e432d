//! 学习层：交互日志、随机森林、动作策略模型、模型存储与状态观察器

pub mod forest;
pub mod log;
pub mod observer;
pub mod policy;
pub mod store;

pub use forest::{ForestParams, RandomForest};
pub use log::{FeatureMap, InteractionLog, InteractionRecord, Table, OUTCOME_COLUMN};
pub use observer::{PageObserver, StateObserver, SyntheticObserver};
pub use policy::{
    ActionDecision, ActionTable, InsufficientData, PolicyModel, PolicySettings, TrainOutcome,
    TrainReport,
};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore};
