//! 动作层：标签到页面操作的映射、注册表与带超时的派发器

pub mod command;
pub mod dispatcher;
pub mod registry;

pub use command::{
    default_action_specs, render, ActionCommand, ActionSpec, ActionStep, ActionVars, NoopCommand,
    StepsCommand,
};
pub use dispatcher::{ActionDispatcher, ActionRecord, DispatchOutcome};
pub use registry::ActionRegistry;
