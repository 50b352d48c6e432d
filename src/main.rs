//! Whisp - 任务自动化智能体
//!
//! 入口：解析命令行、初始化日志、加载配置、选择页面驱动（夹具或 Chrome），执行一次运行并把报告以 JSON 打印到 stdout。
//! 退出码：0 完成（包括「没有合适选项」），2 任务目标缺字段，1 其他错误。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use whisp::agent::{self, GoalOverrides};
use whisp::automation::{FixturePage, PageDriver};
use whisp::core::{AgentBuilder, AgentError};
use whisp::engine::RunReport;
use whisp::learning::{PageObserver, StateObserver, SyntheticObserver};
use whisp::{config, observability};

#[derive(Parser)]
#[command(name = "whisp", version, about = "Preference-scored and learned-policy web task agent")]
struct Args {
    /// Extra TOML config layered over config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against a static JSON page instead of a browser
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG still wins)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Search flights, score them against preferences and select the best
    Book {
        #[arg(long)]
        task: String,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        max_duration: Option<f64>,
        /// Clock encoding without colon, e.g. 630 for 06:30
        #[arg(long)]
        preferred_time: Option<i64>,
        #[arg(long)]
        preferred_airline: Option<String>,
        /// Repeatable
        #[arg(long = "frequent-airline")]
        frequent_airlines: Vec<String>,
    },
    /// Observe, act and retrain the action policy
    Learn {
        #[arg(long, default_value = "")]
        task: String,
        #[arg(long)]
        cycles: Option<usize>,
        #[arg(long, value_enum, default_value_t = ObserverKind::Synthetic)]
        observer: ObserverKind,
    },
    /// Run the action plan for the task's recognized intent
    Plan {
        #[arg(long)]
        task: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ObserverKind {
    Synthetic,
    Page,
}

#[cfg(feature = "browser")]
async fn launch_browser() -> anyhow::Result<Box<dyn PageDriver>> {
    let driver = whisp::automation::ChromeDriver::launch()
        .await
        .context("Failed to launch Chrome")?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "browser"))]
async fn launch_browser() -> anyhow::Result<Box<dyn PageDriver>> {
    anyhow::bail!("built without the `browser` feature; pass --fixture <page.json>")
}

async fn open_driver(fixture: Option<&PathBuf>) -> anyhow::Result<Box<dyn PageDriver>> {
    if let Some(path) = fixture {
        let page = FixturePage::from_json_file(path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?;
        tracing::info!(fixture = %path.display(), "using fixture page");
        return Ok(Box::new(page));
    }
    launch_browser().await
}

async fn run(args: Args) -> anyhow::Result<Result<RunReport, AgentError>> {
    let mut cfg = config::load_config(args.config.clone()).context("Failed to load config")?;

    if let Mode::Book {
        max_price,
        max_duration,
        preferred_time,
        preferred_airline,
        frequent_airlines,
        ..
    } = &args.mode
    {
        let prefs = &mut cfg.preferences;
        prefs.max_price = max_price.or(prefs.max_price);
        prefs.max_duration = max_duration.or(prefs.max_duration);
        prefs.preferred_time = preferred_time.or(prefs.preferred_time);
        if preferred_airline.is_some() {
            prefs.preferred_airline = preferred_airline.clone();
        }
        prefs.frequent_airlines.extend(frequent_airlines.iter().cloned());
    }

    let seed = cfg.policy.seed;
    let components = AgentBuilder::new(cfg).build_components();
    let fixture = args.fixture.as_ref();

    let result = match args.mode {
        Mode::Book {
            task,
            destination,
            date,
            ..
        } => {
            let overrides = GoalOverrides { destination, date };
            // 目标不完整时直接返回，不启动浏览器
            let request = match agent::prepare_book(&components, &task, &overrides).await {
                Ok(request) => request,
                Err(e) => return Ok(Err(e)),
            };
            let driver = open_driver(fixture).await?;
            agent::book_prepared(&components, driver.as_ref(), request).await
        }
        Mode::Learn {
            task,
            cycles,
            observer,
        } => {
            let mut observer: Box<dyn StateObserver> = match observer {
                ObserverKind::Synthetic => Box::new(SyntheticObserver::new(seed)),
                ObserverKind::Page => Box::new(PageObserver::new()),
            };
            let driver = open_driver(fixture).await?;
            agent::learn(&components, driver.as_ref(), &task, observer.as_mut(), cycles).await
        }
        Mode::Plan { task } => {
            let driver = open_driver(fixture).await?;
            agent::plan(&components, driver.as_ref(), &task).await
        }
    };
    Ok(result)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    observability::init(args.verbose);

    let result = run(args).await?;
    match &result {
        Ok(report) => {
            let json = serde_json::to_string_pretty(report).context("Failed to encode report")?;
            println!("{json}");
        }
        Err(e) if e.is_precondition() => {
            tracing::error!(error = %e, "task rejected");
            eprintln!("{e}");
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("{e}");
        }
    }
    Ok(ExitCode::from(agent::exit_code(&result)))
}
