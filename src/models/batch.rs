//! 批次运行记录
//!
//! 一次批量调用的全部处理尝试及其汇总。计数只通过 [`BatchRun::record`] 更新，
//! 并发处理时也由编排任务统一记录，保证总数准确。

use crate::error::FailureStage;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 单篇文献的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded {
        summary_path: PathBuf,
        method_card_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method_card_error: Option<String>,
    },
    /// 已有分析报告，未处理
    Skipped,
    Failed {
        stage: FailureStage,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub file_name: String,
    pub path: PathBuf,
    pub outcome: OutcomeStatus,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, OutcomeStatus::Succeeded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, OutcomeStatus::Skipped)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, OutcomeStatus::Failed { .. })
    }
}

/// 批次计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// 实际进入流水线的文献数
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// 一次批量运行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub model: String,
    /// 输入目录中发现的文献总数
    pub total_documents: usize,
    pub counts: BatchCounts,
    pub outcomes: Vec<DocumentOutcome>,
    /// 导致批次中止的错误
    pub fatal_error: Option<String>,
    /// 被用户中断
    pub cancelled: bool,
}

impl BatchRun {
    pub fn start(model: impl Into<String>) -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            model: model.into(),
            total_documents: 0,
            counts: BatchCounts::default(),
            outcomes: Vec::new(),
            fatal_error: None,
            cancelled: false,
        }
    }

    /// 记录一篇文献的结果并更新计数
    pub fn record(&mut self, outcome: DocumentOutcome) {
        match &outcome.outcome {
            OutcomeStatus::Succeeded { .. } => {
                self.counts.attempted += 1;
                self.counts.succeeded += 1;
            }
            OutcomeStatus::Failed { .. } => {
                self.counts.attempted += 1;
                self.counts.failed += 1;
            }
            OutcomeStatus::Skipped => self.counts.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    /// 标记批次致命错误，只保留第一个
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.fatal_error.is_none() {
            self.fatal_error = Some(reason.into());
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_error.is_some()
    }

    /// 成功率（相对实际处理数）
    pub fn success_rate(&self) -> f64 {
        if self.counts.attempted == 0 {
            0.0
        } else {
            self.counts.succeeded as f64 / self.counts.attempted as f64 * 100.0
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}
