//! Whisp - 任务自动化智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时入口（book / learn / plan）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、运行阶段、运行上下文、组件构建
//! - **scoring**: 任务目标、用户偏好与多准则偏好打分
//! - **learning**: 交互日志、随机森林、动作策略模型、模型存储、状态观察器
//! - **automation**: 页面驱动抽象、静态夹具、Headless Chrome、机票页面对象
//! - **actions**: 动作标签到页面操作的映射与派发
//! - **nlp**: 任务文本 → 意图与实体
//! - **engine**: 打分 / 学习 / 计划三种执行循环
//! - **observability**: 日志初始化

pub mod actions;
pub mod agent;
pub mod automation;
pub mod config;
pub mod core;
pub mod engine;
pub mod learning;
pub mod nlp;
pub mod observability;
pub mod scoring;

pub use agent::GoalOverrides;
pub use config::{load_config, AppConfig};
pub use core::{AgentBuilder, AgentComponents, AgentError, RunContext};
pub use engine::{RunOutcome, RunReport};
