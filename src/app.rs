//! 应用入口
//!
//! 把配置装配成真实组件（lopdf 提取器、HTTP 模型客户端、文件写入），
//! 并提供命令行各子命令对应的操作。

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::LopdfExtractor;
use crate::models::{list_documents_sync, BatchRun};
use crate::orchestrator::BatchOrchestrator;
use crate::services::{
    ApiClient, ProgressMonitor, ProgressSnapshot, PromptTemplates, ResultWriter,
};
use crate::workflow::DocumentFlow;

/// 应用主结构
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 初始化分析所需的全部组件
    ///
    /// 密钥、模板和输出目录在这里一次性检查，任何一项不满足都不会开始处理
    pub fn build_orchestrator(&self) -> AppResult<BatchOrchestrator> {
        self.config.require_api_key()?;
        self.config.create_directories()?;

        let prompts = PromptTemplates::from_config(&self.config)?;
        let client = ApiClient::from_config(&self.config.api)?;
        let extractor = LopdfExtractor::new(self.config.processing.extract_pages);

        let flow = DocumentFlow::new(
            Arc::new(extractor),
            Arc::new(client),
            Arc::new(prompts),
            Arc::new(ResultWriter::from_config(&self.config)),
        );

        Ok(BatchOrchestrator::new(&self.config, flow))
    }

    /// 批量分析
    pub async fn analyze(&self, limit: Option<usize>, no_skip: bool) -> AppResult<BatchRun> {
        let orchestrator = self.build_orchestrator()?;
        let skip = self.config.processing.skip_analyzed && !no_skip;

        // Ctrl-C 只设置取消标记，当前文献会处理完
        let cancel = orchestrator.cancel_handle();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到 Ctrl-C，当前文献完成后停止");
                cancel.cancel();
            }
        });

        let run = orchestrator.run(limit, skip).await;
        listener.abort();
        Ok(run)
    }

    /// 测试模式：只分析第一篇文献
    pub async fn test_single(&self) -> AppResult<BatchRun> {
        info!("🧪 测试模式：分析第一篇文献");
        let orchestrator = self.build_orchestrator()?;
        let run = orchestrator
            .run_single(self.config.processing.skip_analyzed)
            .await;

        if run.total_documents == 0 && !run.is_fatal() {
            return Err(AppError::NoDocuments(self.config.paths.input_dir.clone()));
        }
        if run.counts.skipped > 0 {
            info!("⏭️ 第一篇文献已经分析过，如需重新分析请删除对应的分析报告");
        } else if run.counts.succeeded > 0 {
            info!("✅ 测试成功！可以运行 analyze 进行批量分析");
        }
        Ok(run)
    }

    /// 打印当前进度
    pub fn show_progress(&self) {
        let snapshot = ProgressMonitor::from_config(&self.config).snapshot();
        print_snapshot(&snapshot);
    }

    /// 持续监控进度
    ///
    /// 全部完成、Ctrl-C 或达到最长时间时结束
    pub async fn monitor(&self, interval: Duration, max_duration: Option<Duration>) {
        self.monitor_until(interval, max_duration, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }

    /// 持续监控进度，`stop` 完成时退出
    pub async fn monitor_until<F>(&self, interval: Duration, max_duration: Option<Duration>, stop: F)
    where
        F: Future<Output = ()>,
    {
        let monitor = ProgressMonitor::from_config(&self.config);
        let stream = monitor.watch(interval);
        futures::pin_mut!(stream);

        let deadline = async {
            match max_duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        // 整个监控期间只创建一次，打印快照时收到的信号也不会丢失
        tokio::pin!(stop);

        info!("👀 开始监控分析进度 (每 {} 秒刷新，Ctrl-C 退出)", interval.as_secs());
        let mut previous: Option<ProgressSnapshot> = None;

        loop {
            tokio::select! {
                next = stream.next() => {
                    let Some(snapshot) = next else { break };

                    match &previous {
                        None => print_snapshot(&snapshot),
                        Some(prev) if prev.done != snapshot.done => {
                            println!(
                                "[{}] 进度: {}/{} ({:.1}%)",
                                chrono::Local::now().format("%H:%M:%S"),
                                snapshot.done,
                                snapshot.total_inputs,
                                snapshot.progress_percentage()
                            );
                            for name in snapshot.newly_finished(prev) {
                                println!("  ✅ 新完成: {}", name);
                            }
                        }
                        Some(_) => {}
                    }

                    if snapshot.is_complete() {
                        info!("🎉 所有文献分析完成！");
                        break;
                    }
                    previous = Some(snapshot);
                }
                _ = &mut stop => {
                    info!("监控已停止");
                    break;
                }
                _ = &mut deadline => {
                    info!("⏰ 已达到最长监控时间");
                    break;
                }
            }
        }
    }

    /// 未指定子命令时的概览
    pub fn show_overview(&self) {
        let paths = &self.config.paths;
        let pdf_count = list_documents_sync(&paths.input_dir).len();

        println!("{}", "=".repeat(60));
        println!("📚 AI 驱动的学术文献分析系统");
        println!("{}", "=".repeat(60));
        println!("📁 输入目录: {}", paths.input_dir.display());
        println!("📁 输出目录: {}", paths.output_dir.display());
        println!("🤖 使用模型: {}", self.config.api.model);
        println!("📄 待分析 PDF: {} 篇", pdf_count);
        println!();
        println!("可用命令:");
        println!("  test                    测试模式，分析第一篇文献");
        println!("  analyze [--limit N]     批量分析 (--no-skip 重新分析已完成的文献)");
        println!("  progress                查看分析进度");
        println!("  monitor [--interval S]  持续监控分析进度");
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    println!("{}", "=".repeat(60));
    println!(
        "📊 分析进度: {}/{} ({:.1}%)",
        snapshot.done,
        snapshot.total_inputs,
        snapshot.progress_percentage()
    );
    println!("⏳ 待分析: {} 篇", snapshot.pending);
    if snapshot.failed_last_run > 0 {
        println!("❌ 上次批量运行失败: {} 篇", snapshot.failed_last_run);
    }
    if !snapshot.recent.is_empty() {
        println!("🕒 最近完成:");
        for name in &snapshot.recent {
            println!("  - {}", name);
        }
    }
    println!("{}", "=".repeat(60));
}
