//! 批量文献处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **批量加载**：扫描输入目录中的 PDF（`Vec<Document>`）
//! 2. **跳过与限量**：过滤已分析的文献，再按 `limit` 截取
//! 3. **并发控制**：按分组处理，组内使用 Semaphore 限制并发
//! 4. **失败隔离**：单篇失败只记录，致命错误中止后续文献
//! 5. **全局统计**：汇总结果并保存批次报告
//!
//! 计数只由本模块的编排任务更新，工作任务只返回结果。

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{DocumentFailure, FailureStage};
use crate::models::{
    load_all_documents, load_first_document, ArtifactPaths, BatchRun, Document, DocumentOutcome,
    OutcomeStatus, OutputLayout,
};
use crate::services::ReportSettings;
use crate::utils::logging::{
    log_chunk_complete, log_chunk_start, log_documents_loaded, log_startup, print_final_stats,
};
use crate::workflow::{DocumentCtx, DocumentFlow};

/// 批次取消标记
///
/// 只在两组文献之间检查，正在处理的文献会完整结束
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 批量编排器
pub struct BatchOrchestrator {
    input_dir: PathBuf,
    layout: OutputLayout,
    flow: DocumentFlow,
    settings: ReportSettings,
    max_concurrent: usize,
    cancel: CancelHandle,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, flow: DocumentFlow) -> Self {
        Self {
            input_dir: config.paths.input_dir.clone(),
            layout: OutputLayout::from_config(config),
            flow,
            settings: ReportSettings::from_config(config),
            max_concurrent: config.processing.max_concurrent_documents.max(1),
            cancel: CancelHandle::new(),
        }
    }

    /// 使用外部提供的取消标记
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 批量分析
    ///
    /// 无论正常结束、致命中止还是被取消，都会保存批次报告
    pub async fn run(&self, limit: Option<usize>, skip_already_done: bool) -> BatchRun {
        let mut run = BatchRun::start(self.flow.model_id());
        log_startup(&run.model, self.max_concurrent);

        info!("\n📁 正在扫描待处理的文献...");
        match load_all_documents(&self.input_dir).await {
            Ok(documents) => {
                run.total_documents = documents.len();
                let queue = self.select(documents, limit, skip_already_done, &mut run);
                log_documents_loaded(run.total_documents, run.counts.skipped, queue.len());
                self.process_queue(queue, &mut run).await;
            }
            Err(e) => {
                error!("❌ 输入目录不可读: {:#}", e);
                run.abort(format!("输入目录不可读: {:#}", e));
            }
        }

        run.finish();
        print_final_stats(&run);

        if let Err(e) = self
            .flow
            .writer()
            .write_batch_report(&run, &self.settings)
        {
            error!("❌ 保存批量分析报告失败: {}", e);
            if e.is_batch_fatal() {
                run.abort(e.to_string());
            }
        }

        run
    }

    /// 测试模式：只处理排序后的第一篇文献，不保存批次报告
    pub async fn run_single(&self, skip_already_done: bool) -> BatchRun {
        let mut run = BatchRun::start(self.flow.model_id());

        match load_first_document(&self.input_dir).await {
            Ok(first) => {
                let first: Vec<Document> = first.into_iter().collect();
                run.total_documents = first.len();
                let queue = self.select(first, None, skip_already_done, &mut run);
                if let Some(document) = queue.first() {
                    info!("🧪 测试模式，分析文献: {}", document.file_name);
                }
                self.process_queue(queue, &mut run).await;
            }
            Err(e) => {
                error!("❌ 输入目录不可读: {:#}", e);
                run.abort(format!("输入目录不可读: {:#}", e));
            }
        }

        run.finish();
        run
    }

    /// 过滤已完成的文献并应用数量限制
    ///
    /// 被跳过的文献记为 Skipped；超出限制的文献不产生任何记录
    fn select(
        &self,
        documents: Vec<Document>,
        limit: Option<usize>,
        skip_already_done: bool,
        run: &mut BatchRun,
    ) -> Vec<Document> {
        let mut queue = Vec::with_capacity(documents.len());

        for document in documents {
            if skip_already_done && self.layout.is_done(&document) {
                info!("⏭️ 跳过已分析的文献: {}", document.file_name);
                run.record(outcome(&document, OutcomeStatus::Skipped));
            } else {
                queue.push(document);
            }
        }

        if let Some(limit) = limit {
            queue.truncate(limit);
        }
        queue
    }

    async fn process_queue(&self, queue: Vec<Document>, run: &mut BatchRun) {
        let total = queue.len();
        let chunks = plan_chunks(queue, self.max_concurrent, &self.layout);
        let total_chunks = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut processed = 0;

        for (chunk_idx, chunk) in chunks.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("🛑 收到中断信号，停止处理剩余 {} 篇文献", total - processed);
                run.cancelled = true;
                break;
            }
            if run.is_fatal() {
                break;
            }

            let chunk_num = chunk_idx + 1;
            let chunk_len = chunk.len();
            if self.max_concurrent > 1 {
                log_chunk_start(
                    chunk_num,
                    total_chunks,
                    processed + 1,
                    processed + chunk_len,
                    total,
                );
            }

            let mut handles = Vec::with_capacity(chunk_len);
            for document in chunk {
                processed += 1;
                let ctx = DocumentCtx::new(processed, total, document.file_name.clone());
                info!("\n--- 处理 {}/{}: {} ---", processed, total, document.file_name);

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let flow = self.flow.clone();
                let task_document = document.clone();
                let task_ctx = ctx.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    flow.run(&task_document, &task_ctx).await
                });
                handles.push((document, ctx, handle));
            }

            // 等待本组全部结束后再统一记录
            let mut chunk_success = 0;
            for (document, ctx, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| {
                    Err(DocumentFailure::new(
                        FailureStage::Task,
                        format!("任务执行失败: {}", e),
                    ))
                });

                if self.record_result(&document, &ctx, result, run) {
                    chunk_success += 1;
                }
            }

            if self.max_concurrent > 1 {
                log_chunk_complete(chunk_num, chunk_success, chunk_len);
            }
        }
    }

    /// 记录单篇结果，返回是否成功
    fn record_result(
        &self,
        document: &Document,
        ctx: &DocumentCtx,
        result: Result<ArtifactPaths, DocumentFailure>,
        run: &mut BatchRun,
    ) -> bool {
        match result {
            Ok(paths) => {
                if paths.method_card_error.is_some() {
                    info!("{} ✅ 分析成功（方法卡片缺失）", ctx);
                } else {
                    info!("{} ✅ 分析成功", ctx);
                }
                run.record(outcome(
                    document,
                    OutcomeStatus::Succeeded {
                        summary_path: paths.summary_path,
                        method_card_path: paths.method_card_path,
                        method_card_error: paths.method_card_error,
                    },
                ));
                true
            }
            Err(failure) => {
                error!("{} ❌ [{}] {}", ctx, failure.stage, failure.reason);
                if failure.batch_fatal {
                    error!("🛑 致命错误，中止批次: {}", failure.reason);
                    run.abort(failure.reason.clone());
                }
                run.record(outcome(
                    document,
                    OutcomeStatus::Failed {
                        stage: failure.stage,
                        reason: failure.reason,
                    },
                ));
                false
            }
        }
    }
}

fn outcome(document: &Document, status: OutcomeStatus) -> DocumentOutcome {
    DocumentOutcome {
        file_name: document.file_name.clone(),
        path: document.path.clone(),
        outcome: status,
    }
}

/// 按并发数分组
///
/// 同一组内不会出现输出路径相同的两篇文献，遇到冲突时提前开启新组
fn plan_chunks(queue: Vec<Document>, size: usize, layout: &OutputLayout) -> Vec<Vec<Document>> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<Document> = Vec::with_capacity(size);
    let mut targets = HashSet::new();

    for document in queue {
        let target = layout.summary_path(&document);
        if current.len() == size || targets.contains(&target) {
            chunks.push(std::mem::take(&mut current));
            targets.clear();
        }
        targets.insert(target);
        current.push(document);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout {
            summaries_dir: root.join("summaries"),
            method_cards_dir: root.join("method_cards"),
            batch_reports_dir: root.join("batch_reports"),
            summary_suffix: "_ai_analysis".to_string(),
            method_card_suffix: "_method_card".to_string(),
        }
    }

    fn docs(names: &[&str]) -> Vec<Document> {
        names
            .iter()
            .map(|n| Document::new(PathBuf::from("/in").join(n), 1))
            .collect()
    }

    fn names(chunks: &[Vec<Document>]) -> Vec<Vec<&str>> {
        chunks
            .iter()
            .map(|c| c.iter().map(|d| d.file_name.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_plan_chunks_by_size() {
        let layout = layout(Path::new("/out"));
        let chunks = plan_chunks(docs(&["a.pdf", "b.pdf", "c.pdf"]), 2, &layout);
        assert_eq!(names(&chunks), vec![vec!["a.pdf", "b.pdf"], vec!["c.pdf"]]);

        let chunks = plan_chunks(docs(&["a.pdf", "b.pdf"]), 1, &layout);
        assert_eq!(chunks.len(), 2);

        assert!(plan_chunks(Vec::new(), 4, &layout).is_empty());
    }

    #[test]
    fn test_plan_chunks_splits_colliding_outputs() {
        let layout = layout(Path::new("/out"));
        // "a b.pdf" 和 "a_b.pdf" 的输出文件名相同
        let chunks = plan_chunks(docs(&["a b.pdf", "a_b.pdf", "c.pdf"]), 4, &layout);
        assert_eq!(
            names(&chunks),
            vec![vec!["a b.pdf"], vec!["a_b.pdf", "c.pdf"]]
        );
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
