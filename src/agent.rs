//! 无头 Agent 运行时
//!
//! book / learn / plan 三个入口共用同一流程：分类任务文本 → 建立 RunContext → 运行 → 关闭会话 → 返回报告。
//! 无论运行成功与否都会调用 `PageDriver::close`。

use tracing::Instrument;

use crate::automation::PageDriver;
use crate::core::{AgentComponents, AgentError, RunContext};
use crate::engine::{LearningRun, LearningSettings, PlannedRun, RunOutcome, RunReport, ScoringRun};
use crate::learning::StateObserver;
use crate::nlp::TaskContext;
use crate::scoring::TaskGoal;

/// 命令行显式给出的目标字段，优先于分类器实体
#[derive(Debug, Clone, Default)]
pub struct GoalOverrides {
    pub destination: Option<String>,
    pub date: Option<String>,
}

/// 合并分类器实体与显式字段得到任务目标；缺字段为前置条件失败
pub fn resolve_goal(task_context: &TaskContext, overrides: &GoalOverrides) -> Result<TaskGoal, AgentError> {
    let pick = |explicit: &Option<String>, key: &str| {
        explicit
            .clone()
            .or_else(|| task_context.entity(key).map(str::to_string))
            .filter(|v| !v.trim().is_empty())
    };
    TaskGoal::from_parts(
        pick(&overrides.destination, "destination"),
        pick(&overrides.date, "date"),
    )
}

async fn close_session(driver: &dyn PageDriver) {
    if let Err(e) = driver.close().await {
        tracing::warn!(error = %e, "closing browser session failed");
    }
}

fn completed(ctx: RunContext, outcome: RunOutcome) -> RunReport {
    let report = ctx.finish(outcome);
    tracing::info!(
        run_id = %report.run_id,
        actions = report.actions.len(),
        outcome = ?report.outcome,
        "Task execution completed"
    );
    report
}

async fn classify(components: &AgentComponents, task: &str) -> Result<TaskContext, AgentError> {
    let task_context = components.classifier.infer(task).await?;
    tracing::info!(
        context = %task_context.context,
        intent = %task_context.intent,
        entities = ?task_context.entities,
        "task understood"
    );
    Ok(task_context)
}

/// 已分类且目标完整的打分任务；在打开浏览器之前得到
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub task: String,
    pub task_context: TaskContext,
    pub goal: TaskGoal,
}

/// 分类任务文本并合并目标字段；目标缺字段时返回 Precondition，此时尚未触碰页面
pub async fn prepare_book(
    components: &AgentComponents,
    task: &str,
    overrides: &GoalOverrides,
) -> Result<BookingRequest, AgentError> {
    let task_context = classify(components, task).await?;
    let goal = resolve_goal(&task_context, overrides)?;
    Ok(BookingRequest {
        task: task.to_string(),
        task_context,
        goal,
    })
}

/// 打分运行：按偏好选出最佳航班
pub async fn book(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    task: &str,
    overrides: &GoalOverrides,
) -> Result<RunReport, AgentError> {
    match prepare_book(components, task, overrides).await {
        Ok(request) => book_prepared(components, driver, request).await,
        Err(e) => {
            close_session(driver).await;
            Err(e)
        }
    }
}

/// 用 `prepare_book` 的结果执行打分运行
pub async fn book_prepared(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    request: BookingRequest,
) -> Result<RunReport, AgentError> {
    let result = run_book(components, driver, request).await;
    close_session(driver).await;
    result
}

async fn run_book(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    request: BookingRequest,
) -> Result<RunReport, AgentError> {
    let mut ctx = RunContext::new(request.task, request.task_context).with_goal(request.goal);
    let span = tracing::info_span!("run", run_id = %ctx.run_id(), mode = "book");

    let cfg = components.config();
    let run = ScoringRun::new(
        driver,
        &cfg.selectors,
        &cfg.preferences,
        &cfg.agent.search_url,
        cfg.agent.wait(),
    );
    let outcome = run.run(&mut ctx).instrument(span).await?;
    Ok(completed(ctx, outcome))
}

/// 学习运行：`cycles` 为 None 时使用配置值
pub async fn learn(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    task: &str,
    observer: &mut dyn StateObserver,
    cycles: Option<usize>,
) -> Result<RunReport, AgentError> {
    let result = run_learn(components, driver, task, observer, cycles).await;
    close_session(driver).await;
    result
}

async fn run_learn(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    task: &str,
    observer: &mut dyn StateObserver,
    cycles: Option<usize>,
) -> Result<RunReport, AgentError> {
    let task_context = classify(components, task).await?;
    let mut ctx = RunContext::new(task, task_context);
    let span = tracing::info_span!("run", run_id = %ctx.run_id(), mode = "learn");

    let cfg = components.config();
    let settings = LearningSettings {
        start_url: cfg.agent.start_url.clone().filter(|u| !u.is_empty()),
        cycles: cycles.unwrap_or(cfg.agent.cycles),
        pacing: cfg.agent.pacing(),
        model_key: cfg.policy.model_key.clone(),
        final_state: cfg.policy.final_state(),
        policy: cfg.policy.settings(),
    };
    let run = LearningRun::new(driver, &components.dispatcher, components.store.as_ref(), settings);
    let outcome = run.run(&mut ctx, observer).instrument(span).await?;
    Ok(completed(ctx, outcome))
}

/// 计划运行：按意图执行预设动作序列
pub async fn plan(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    task: &str,
) -> Result<RunReport, AgentError> {
    let result = run_plan(components, driver, task).await;
    close_session(driver).await;
    result
}

async fn run_plan(
    components: &AgentComponents,
    driver: &dyn PageDriver,
    task: &str,
) -> Result<RunReport, AgentError> {
    let task_context = classify(components, task).await?;
    let mut ctx = RunContext::new(task, task_context);
    // 计划动作可以引用 {destination} / {date}，目标不完整时不强制
    if let Ok(goal) = resolve_goal(ctx.task_context(), &GoalOverrides::default()) {
        ctx = ctx.with_goal(goal);
    }
    let span = tracing::info_span!("run", run_id = %ctx.run_id(), mode = "plan");

    let cfg = components.config();
    let run = PlannedRun::new(driver, &components.dispatcher, &cfg.plans, cfg.agent.pacing());
    let outcome = run.run(&mut ctx).instrument(span).await?;
    Ok(completed(ctx, outcome))
}

/// 运行结果对应的进程退出码：完成（包括没有合适选项）为 0，目标缺字段为 2，其余错误为 1
pub fn exit_code(result: &Result<RunReport, AgentError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) if e.is_precondition() => 2,
        Err(_) => 1,
    }
}
