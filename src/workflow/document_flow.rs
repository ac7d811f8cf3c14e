//! 文献处理流程 - 流程层
//!
//! 核心职责：定义"一篇文献"的完整处理流程
//!
//! 流程顺序：
//! 1. 提取 PDF 文本
//! 2. 渲染分析提示词 → 模型分析
//! 3. 渲染方法卡片提示词 → 模型生成（可关闭）
//! 4. 写入分析报告和方法卡片
//!
//! 模型调用全部结束后才开始写入。方法卡片生成失败时只记录警告，
//! 分析报告照常保存；认证失败仍会中止整个批次。

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::DocumentFailure;
use crate::infrastructure::{extract_blocking, TextExtractor};
use crate::models::{AnalysisResult, ArtifactPaths, Document};
use crate::services::{ModelClient, PromptTemplates, ResultWriter};
use crate::utils::logging::truncate_text;
use crate::workflow::document_ctx::DocumentCtx;

/// 文献处理流程
///
/// - 编排单篇文献的处理步骤
/// - 不持有批次状态，不更新计数
/// - 只依赖业务能力（services）和基础设施
#[derive(Clone)]
pub struct DocumentFlow {
    extractor: Arc<dyn TextExtractor>,
    model: Arc<dyn ModelClient>,
    prompts: Arc<PromptTemplates>,
    writer: Arc<ResultWriter>,
}

impl DocumentFlow {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        model: Arc<dyn ModelClient>,
        prompts: Arc<PromptTemplates>,
        writer: Arc<ResultWriter>,
    ) -> Self {
        Self {
            extractor,
            model,
            prompts,
            writer,
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn writer(&self) -> &ResultWriter {
        &self.writer
    }

    pub async fn run(
        &self,
        document: &Document,
        ctx: &DocumentCtx,
    ) -> Result<ArtifactPaths, DocumentFailure> {
        // ========== 步骤 1: 提取文本 ==========
        info!("{} 📖 正在提取 PDF 文本...", ctx);
        let text = extract_blocking(self.extractor.clone(), document.path.clone()).await?;
        info!(
            "{} ✓ 提取完成，共 {} 字符",
            ctx,
            text.chars().count()
        );

        // ========== 步骤 2: 分析 ==========
        let prompt = self.prompts.render_analysis(&document.file_name, &text)?;
        info!("{} 🤖 正在进行 AI 深度分析...", ctx);
        let analysis = self
            .model
            .analyze(self.prompts.analysis_system_prompt(), &prompt)
            .await?;
        info!(
            "{} ✓ 分析完成: {}",
            ctx,
            truncate_text(analysis.lines().next().unwrap_or_default(), 60)
        );

        // ========== 步骤 3: 方法卡片 ==========
        let mut method_card_error = None;
        let method_card = match self
            .prompts
            .render_method_card(&document.file_name, &analysis)
        {
            Some(rendered) => {
                let prompt = rendered?;
                info!("{} 🗂️ 生成方法卡片...", ctx);
                match self
                    .model
                    .analyze(self.prompts.method_card_system_prompt(), &prompt)
                    .await
                {
                    Ok(card) => Some(card),
                    Err(e) if e.kind.is_batch_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("{} ⚠️ 方法卡片生成失败，仅保存分析报告: {}", ctx, e);
                        method_card_error = Some(e.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        let result = AnalysisResult::new(
            document.id.clone(),
            document.file_name.clone(),
            analysis,
            method_card,
            self.model.model_id(),
        );

        let missing = result.missing_sections();
        if !missing.is_empty() {
            let titles: Vec<&str> = missing.iter().map(|s| s.title()).collect();
            warn!("{} ⚠️ 分析结果缺少章节: {}", ctx, titles.join("、"));
        }

        // ========== 步骤 4: 写入 ==========
        let mut paths = self.writer.write(document, &result)?;
        paths.method_card_error = method_card_error;
        Ok(paths)
    }
}
