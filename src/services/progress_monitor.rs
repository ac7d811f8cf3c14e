//! 进度监控 - 业务能力层
//!
//! 只读。进度完全由文件系统推导：输入目录中的 PDF 数量，
//! 以及对应分析报告是否存在。不依赖分析进程是否在运行。

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures::stream::{self, Stream};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::models::{list_documents_sync, BatchRun, OutputLayout};

/// 最近完成列表的长度
const RECENT_LIMIT: usize = 3;

/// 某一时刻的进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total_inputs: usize,
    pub done: usize,
    pub pending: usize,
    /// 最近一次批次报告中的失败数
    pub failed_last_run: usize,
    /// 最近修改的分析报告文件名（新的在前）
    pub recent: Vec<String>,
    /// 已完成的源文件名
    pub finished: BTreeSet<String>,
}

impl ProgressSnapshot {
    pub fn progress_percentage(&self) -> f64 {
        if self.total_inputs == 0 {
            0.0
        } else {
            self.done as f64 / self.total_inputs as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_inputs > 0 && self.pending == 0
    }

    /// 相比上一次快照新完成的文献
    pub fn newly_finished<'a>(&'a self, previous: &ProgressSnapshot) -> Vec<&'a str> {
        self.finished
            .iter()
            .filter(|name| !previous.finished.contains(*name))
            .map(String::as_str)
            .collect()
    }
}

/// 进度监控器
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    input_dir: PathBuf,
    layout: OutputLayout,
}

impl ProgressMonitor {
    pub fn new(input_dir: PathBuf, layout: OutputLayout) -> Self {
        Self { input_dir, layout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.input_dir.clone(),
            OutputLayout::from_config(config),
        )
    }

    /// 读取当前进度
    ///
    /// 目录不存在时按 0 计
    pub fn snapshot(&self) -> ProgressSnapshot {
        let documents = list_documents_sync(&self.input_dir);
        let finished: BTreeSet<String> = documents
            .iter()
            .filter(|d| self.layout.is_done(d))
            .map(|d| d.file_name.clone())
            .collect();

        let total_inputs = documents.len();
        let done = finished.len();

        ProgressSnapshot {
            total_inputs,
            done,
            pending: total_inputs - done,
            failed_last_run: self.failed_last_run(),
            recent: self.recent_summaries(RECENT_LIMIT),
            finished,
        }
    }

    /// 周期性快照流
    ///
    /// 第一次立即产出，之后每隔 `interval` 产出一次。流本身不会结束，
    /// 由调用方决定何时停止（丢弃即取消）。
    pub fn watch(&self, interval: Duration) -> impl Stream<Item = ProgressSnapshot> + Send {
        let monitor = self.clone();
        stream::unfold(true, move |first| {
            let monitor = monitor.clone();
            async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                Some((monitor.snapshot(), false))
            }
        })
    }

    /// 最近一次 JSON 批次报告中的失败数
    fn failed_last_run(&self) -> usize {
        let Some(latest) = latest_batch_report(&self.layout.batch_reports_dir) else {
            return 0;
        };

        match fs::read_to_string(&latest)
            .ok()
            .and_then(|content| serde_json::from_str::<BatchRun>(&content).ok())
        {
            Some(run) => run.counts.failed,
            None => {
                debug!("无法解析批次报告: {}", latest.display());
                0
            }
        }
    }

    fn recent_summaries(&self, limit: usize) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.layout.summaries_dir) else {
            return Vec::new();
        };

        let mut summaries: Vec<(SystemTime, String)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| self.layout.is_summary_file(&e.path()))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.file_name().to_string_lossy().to_string()))
            })
            .collect();

        summaries.sort_by(|a, b| b.cmp(a));
        summaries
            .into_iter()
            .take(limit)
            .map(|(_, name)| name)
            .collect()
    }
}

/// 文件名中的时间戳可直接按字典序比较
fn latest_batch_report(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ai_batch_analysis_"))
        })
        .max()
}
