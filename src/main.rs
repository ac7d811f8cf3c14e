use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

use literature_analyzer::utils::logging;
use literature_analyzer::{App, AppResult, BatchRun, Config};

/// AI 驱动的学术文献批量分析工具
#[derive(Parser)]
#[command(name = "literature_analyzer", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 输出 debug 级别日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 测试模式：只分析第一篇文献
    Test,
    /// 批量分析输入目录中的文献
    Analyze {
        /// 最多分析的文献数
        #[arg(long)]
        limit: Option<usize>,
        /// 重新分析已有报告的文献
        #[arg(long)]
        no_skip: bool,
    },
    /// 查看当前分析进度
    Progress,
    /// 持续监控分析进度
    Monitor {
        /// 刷新间隔（秒）
        #[arg(long, default_value_t = 30)]
        interval: u64,
        /// 最长监控时间（秒）
        #[arg(long)]
        max_duration: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 加载配置
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置错误: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // 初始化日志
    if let Err(e) = logging::init(&config.logging, config.paths.log_file.as_deref(), cli.verbose) {
        eprintln!("⚠️ {:#}", e);
    }

    let app = App::new(config);
    match run(&app, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(app: &App, command: Option<Command>) -> AppResult<ExitCode> {
    match command {
        None => {
            app.show_overview();
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Test) => Ok(exit_code(&app.test_single().await?)),
        Some(Command::Analyze { limit, no_skip }) => {
            Ok(exit_code(&app.analyze(limit, no_skip).await?))
        }
        Some(Command::Progress) => {
            app.show_progress();
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Monitor {
            interval,
            max_duration,
        }) => {
            app.monitor(
                Duration::from_secs(interval.max(1)),
                max_duration.map(Duration::from_secs),
            )
            .await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 批次致命中止时返回非零退出码；单篇失败不影响退出码
fn exit_code(run: &BatchRun) -> ExitCode {
    if run.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
