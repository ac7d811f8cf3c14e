//! 日志工具模块
//!
//! 提供日志初始化以及批次进度输出的辅助函数

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::models::{BatchRun, OutcomeStatus};

/// 初始化全局日志
///
/// - `--verbose` 强制 debug 级别
/// - 否则 `RUST_LOG` 优先于配置中的级别
/// - 配置了日志文件时追加写入，每次运行先写一段运行头
/// - 日志文件打不开时只输出到控制台，并通过日志报告原因
pub fn init(config: &LoggingConfig, log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let (file, file_error) = match log_file.map(open_log_file).transpose() {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };

    // 文件不可用时控制台必须保留
    let console_layer = (config.console_output || file.is_none())
        .then(|| fmt::layer().with_target(false));

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("初始化日志失败")?;

    if let Some(e) = file_error {
        warn!("⚠️ 日志文件不可用，仅输出到控制台: {:#}", e);
    }

    Ok(())
}

/// 打开日志文件并写入运行头
fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("无法创建日志目录: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("无法打开日志文件: {}", path.display()))?;

    let header = format!(
        "\n{}\n文献分析日志 - {}\n{}\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    file.write_all(header.as_bytes())?;
    Ok(file)
}

/// 记录批次启动信息
pub fn log_startup(model: &str, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始批量文献分析");
    info!("🤖 使用模型: {}", model);
    info!("📊 最大并发数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录文献加载信息
pub fn log_documents_loaded(total: usize, skipped: usize, queued: usize) {
    info!("✓ 找到 {} 篇 PDF 文献", total);
    if skipped > 0 {
        info!("⏭️ 跳过 {} 篇已分析的文献", skipped);
    }
    info!("📋 本次待处理: {} 篇\n", queued);
}

/// 记录分组开始信息
pub fn log_chunk_start(chunk_num: usize, total_chunks: usize, start: usize, end: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 组", chunk_num, total_chunks);
    info!("📄 本组文献: {}-{} / 共 {} 篇", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录分组完成信息
pub fn log_chunk_complete(chunk_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 组完成: 成功 {}/{}", chunk_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印批次最终统计
pub fn print_final_stats(run: &BatchRun) {
    let counts = &run.counts;
    info!("\n{}", "=".repeat(60));
    info!("📊 批量分析完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {} 篇", counts.succeeded);
    info!("⏭️ 跳过: {} 篇", counts.skipped);
    info!("❌ 失败: {} 篇", counts.failed);
    if counts.attempted > 0 {
        info!("📈 成功率: {:.1}%", run.success_rate());
    }

    for outcome in run.failed() {
        if let OutcomeStatus::Failed { stage, reason } = &outcome.outcome {
            info!("   - {} [{}] {}", outcome.file_name, stage, reason);
        }
    }

    if let Some(reason) = &run.fatal_error {
        info!("🛑 批次中止: {}", reason);
    }
    if run.cancelled {
        info!("🛑 批次被用户中断");
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("模型轻量化", 2), "模型...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_unusable_log_file_falls_back_to_console() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();

        let config = LoggingConfig {
            console_output: false,
            ..LoggingConfig::default()
        };
        init(&config, Some(&blocker.join("analyzer.log")), false).unwrap();
        assert!(tracing::dispatcher::has_been_set());
    }

    #[test]
    fn test_log_file_gets_run_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/analyzer.log");

        drop(open_log_file(&path).unwrap());
        drop(open_log_file(&path).unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("文献分析日志").count(), 2);
    }
}
