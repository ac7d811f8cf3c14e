//! 结果写入服务 - 业务能力层
//!
//! 只负责"把分析结果落盘"，不关心流程。
//!
//! 每个文件先写入目标目录下的临时文件，再重命名到最终路径。
//! 方法卡片先落盘、分析报告最后落盘；报告落盘失败时删除本次的方法卡片，
//! 因此"报告存在"总是意味着这篇文献的产物完整。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::WriteError;
use crate::models::{AnalysisResult, ArtifactPaths, BatchRun, Document, OutputLayout};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 批次报告中的"系统配置"部分
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub max_text_length: usize,
    pub extract_pages: usize,
    pub skip_analyzed: bool,
}

impl ReportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_text_length: config.processing.max_text_length,
            extract_pages: config.processing.extract_pages,
            skip_analyzed: config.processing.skip_analyzed,
        }
    }
}

/// 结果写入服务
///
/// 职责：
/// - 按 [`OutputLayout`] 的命名规则写分析报告和方法卡片
/// - 写批次报告（Markdown + JSON）
/// - 只处理单篇文献的产物，不更新批次计数
#[derive(Debug, Clone)]
pub struct ResultWriter {
    layout: OutputLayout,
    include_metadata: bool,
}

impl ResultWriter {
    pub fn new(layout: OutputLayout, include_metadata: bool) -> Self {
        Self {
            layout,
            include_metadata,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            OutputLayout::from_config(config),
            config.output.include_metadata,
        )
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// 写入一篇文献的全部产物
    pub fn write(
        &self,
        document: &Document,
        result: &AnalysisResult,
    ) -> Result<ArtifactPaths, WriteError> {
        let summary_path = self.layout.summary_path(document);

        let method_card_path = match &result.method_card {
            Some(card) => {
                let path = self.layout.method_card_path(document);
                write_atomic(&path, &self.render_method_card(document, result, card))?;
                info!("📝 方法卡片已保存: {}", display_name(&path));
                Some(path)
            }
            None => None,
        };

        if let Err(e) = write_atomic(&summary_path, &self.render_summary(document, result)) {
            if let Some(card) = &method_card_path {
                if let Err(remove_err) = fs::remove_file(card) {
                    warn!("⚠️ 回滚方法卡片失败 ({}): {}", card.display(), remove_err);
                }
            }
            return Err(e);
        }
        info!("📄 分析报告已保存: {}", display_name(&summary_path));

        Ok(ArtifactPaths {
            summary_path,
            method_card_path,
            method_card_error: None,
        })
    }

    fn render_summary(&self, document: &Document, result: &AnalysisResult) -> String {
        let mut parts = vec![format!("# {} - AI深度分析", document.file_name)];

        if self.include_metadata {
            parts.extend([
                String::new(),
                format!("**分析时间**: {}", result.analyzed_at.format(TIME_FORMAT)),
                format!("**使用模型**: {}", result.model),
                format!("**原始文件**: {}", document.file_name),
                String::new(),
            ]);
        }

        parts.extend([
            "---".to_string(),
            String::new(),
            result.analysis.clone(),
            String::new(),
            "---".to_string(),
            String::new(),
            "*本分析由AI系统自动生成*".to_string(),
        ]);

        parts.join("\n")
    }

    fn render_method_card(&self, document: &Document, result: &AnalysisResult, card: &str) -> String {
        let mut parts = vec![format!("# {} - 方法卡片", document.file_name)];

        if self.include_metadata {
            parts.extend([
                String::new(),
                format!("**生成时间**: {}", result.analyzed_at.format(TIME_FORMAT)),
                format!("**原始文件**: {}", document.file_name),
                String::new(),
            ]);
        }

        parts.extend([
            "---".to_string(),
            String::new(),
            card.to_string(),
            String::new(),
            "---".to_string(),
            String::new(),
            "*本卡片由AI系统自动生成*".to_string(),
        ]);

        parts.join("\n")
    }

    /// 写入批次报告，返回 Markdown 报告路径
    ///
    /// 同名的 `.json` 文件保存机器可读的完整记录
    pub fn write_batch_report(
        &self,
        run: &BatchRun,
        settings: &ReportSettings,
    ) -> Result<PathBuf, WriteError> {
        let stem = format!("ai_batch_analysis_{}", run.started_at.format("%Y%m%d_%H%M%S"));
        let dir = &self.layout.batch_reports_dir;
        let md_path = dir.join(format!("{}.md", stem));
        let json_path = dir.join(format!("{}.json", stem));

        let json = serde_json::to_string_pretty(run)?;
        write_atomic(&json_path, &json)?;
        write_atomic(&md_path, &self.render_batch_report(run, settings))?;

        info!("📊 批量分析报告已保存: {}", display_name(&md_path));
        Ok(md_path)
    }

    fn render_batch_report(&self, run: &BatchRun, settings: &ReportSettings) -> String {
        let now = Local::now().format(TIME_FORMAT);
        let counts = &run.counts;
        let mut out = String::new();

        out.push_str("# AI驱动批量文献分析报告\n\n");
        out.push_str("## 📊 分析统计\n\n");
        out.push_str(&format!("- **分析时间**: {}\n", run.started_at.format(TIME_FORMAT)));
        out.push_str(&format!("- **使用模型**: {}\n", run.model));
        out.push_str(&format!("- **总论文数**: {}\n", run.total_documents));
        out.push_str(&format!("- **成功分析**: {} 篇\n", counts.succeeded));
        out.push_str(&format!("- **跳过文件**: {} 篇\n", counts.skipped));
        out.push_str(&format!("- **分析失败**: {} 篇\n", counts.failed));
        out.push_str(&format!("- **成功率**: {:.1}%\n", run.success_rate()));
        if let Some(reason) = &run.fatal_error {
            out.push_str(&format!("- **批次中止**: {}\n", reason));
        }
        if run.cancelled {
            out.push_str("- **批次中止**: 用户中断\n");
        }
        out.push_str("\n## 📋 分析详情\n\n");

        let succeeded: Vec<_> = run.succeeded().collect();
        if !succeeded.is_empty() {
            out.push_str("### ✅ 成功分析的论文\n\n");
            for (i, outcome) in succeeded.iter().enumerate() {
                out.push_str(&format!("{}. **{}**", i + 1, outcome.file_name));
                if let crate::models::OutcomeStatus::Succeeded {
                    method_card_error: Some(reason),
                    ..
                } = &outcome.outcome
                {
                    out.push_str(&format!(" - 方法卡片未生成: {}", reason));
                }
                out.push('\n');
            }
            out.push('\n');
        }

        let skipped: Vec<_> = run.skipped().collect();
        if !skipped.is_empty() {
            out.push_str("### ⏭️ 跳过的论文\n\n");
            for (i, outcome) in skipped.iter().enumerate() {
                out.push_str(&format!(
                    "{}. **{}** - 已存在分析结果\n",
                    i + 1,
                    outcome.file_name
                ));
            }
            out.push('\n');
        }

        let failed: Vec<_> = run.failed().collect();
        if !failed.is_empty() {
            out.push_str("### ❌ 分析失败的论文\n\n");
            for (i, outcome) in failed.iter().enumerate() {
                if let crate::models::OutcomeStatus::Failed { stage, reason } = &outcome.outcome {
                    out.push_str(&format!(
                        "{}. **{}** - [{}] {}\n",
                        i + 1,
                        outcome.file_name,
                        stage,
                        reason
                    ));
                }
            }
            out.push('\n');
        }

        let pages = if settings.extract_pages == 0 {
            "全部".to_string()
        } else {
            settings.extract_pages.to_string()
        };

        out.push_str("## 🎯 系统配置\n\n");
        out.push_str(&format!("- **AI模型**: {}\n", run.model));
        out.push_str(&format!("- **最大文本长度**: {} 字符\n", settings.max_text_length));
        out.push_str(&format!("- **提取页数**: {}\n", pages));
        out.push_str(&format!(
            "- **跳过已分析**: {}\n\n",
            if settings.skip_analyzed { "是" } else { "否" }
        ));

        out.push_str("## 📚 生成文件\n\n");
        out.push_str(&format!(
            "- **分析报告**: `{}/*{}.md`\n",
            dir_name(&self.layout.summaries_dir),
            self.layout.summary_suffix
        ));
        out.push_str(&format!(
            "- **方法卡片**: `{}/*{}.md`\n",
            dir_name(&self.layout.method_cards_dir),
            self.layout.method_card_suffix
        ));
        out.push_str("- **批量报告**: 本文件\n\n");
        out.push_str("---\n\n");
        out.push_str(&format!("*报告生成时间: {}*\n", now));
        out.push_str("*AI驱动文献分析系统*\n");

        out
    }
}

/// 临时文件 + 重命名
///
/// 无法在目录中创建临时文件时返回 [`WriteError::DirectoryUnwritable`]
pub fn write_atomic(path: &Path, content: &str) -> Result<(), WriteError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| WriteError::DirectoryUnwritable {
        path: dir.to_path_buf(),
        source,
    })?;

    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!("已写入 {} ({} 字节)", path.display(), content.len());
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureStage;
    use crate::models::{DocumentOutcome, OutcomeStatus};

    fn setup(root: &Path) -> ResultWriter {
        let layout = OutputLayout {
            summaries_dir: root.join("summaries"),
            method_cards_dir: root.join("method_cards"),
            batch_reports_dir: root.join("batch_reports"),
            summary_suffix: "_ai_analysis".to_string(),
            method_card_suffix: "_method_card".to_string(),
        };
        for dir in [
            &layout.summaries_dir,
            &layout.method_cards_dir,
            &layout.batch_reports_dir,
        ] {
            fs::create_dir_all(dir).unwrap();
        }
        ResultWriter::new(layout, true)
    }

    fn document(root: &Path) -> Document {
        Document::new(root.join("Deep Compression.pdf"), 1024)
    }

    fn result(card: Option<&str>) -> AnalysisResult {
        AnalysisResult::new(
            "Deep_Compression",
            "Deep Compression.pdf",
            "## 论文基本信息\n剪枝、量化与霍夫曼编码".to_string(),
            card.map(str::to_string),
            "test-model",
        )
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .count()
    }

    #[test]
    fn test_write_summary_and_method_card() {
        let dir = tempfile::tempdir().unwrap();
        let writer = setup(dir.path());
        let doc = document(dir.path());

        let paths = writer.write(&doc, &result(Some("三阶段压缩"))).unwrap();

        let summary = fs::read_to_string(&paths.summary_path).unwrap();
        assert!(summary.starts_with("# Deep Compression.pdf - AI深度分析"));
        assert!(summary.contains("**使用模型**: test-model"));
        assert!(summary.contains("剪枝、量化与霍夫曼编码"));
        assert!(summary.ends_with("*本分析由AI系统自动生成*"));

        let card = fs::read_to_string(paths.method_card_path.unwrap()).unwrap();
        assert!(card.starts_with("# Deep Compression.pdf - 方法卡片"));
        assert!(card.contains("三阶段压缩"));

        assert!(writer.layout().is_done(&doc));
    }

    #[test]
    fn test_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = setup(dir.path());
        writer.include_metadata = false;

        let paths = writer.write(&document(dir.path()), &result(None)).unwrap();
        let summary = fs::read_to_string(&paths.summary_path).unwrap();
        assert!(!summary.contains("**分析时间**"));
        assert!(paths.method_card_path.is_none());
    }

    #[test]
    fn test_failed_summary_leaves_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = setup(dir.path());
        let doc = document(dir.path());

        // 目标路径被目录占用，重命名必然失败
        fs::create_dir_all(writer.layout().summary_path(&doc)).unwrap();

        let err = writer.write(&doc, &result(Some("卡片"))).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
        assert!(!err.is_batch_fatal());
        assert!(!writer.layout().method_card_path(&doc).exists());
        assert!(!writer.layout().is_done(&doc));
        assert_eq!(leftover_temp_files(&writer.layout().summaries_dir), 0);
        assert_eq!(leftover_temp_files(&writer.layout().method_cards_dir), 0);
    }

    #[test]
    fn test_missing_directory_is_batch_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let writer = setup(dir.path());
        fs::remove_dir_all(&writer.layout().summaries_dir).unwrap();

        let err = writer.write(&document(dir.path()), &result(None)).unwrap_err();
        assert!(matches!(err, WriteError::DirectoryUnwritable { .. }));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_batch_report_markdown_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = setup(dir.path());

        let mut run = BatchRun::start("test-model");
        run.total_documents = 2;
        run.record(DocumentOutcome {
            file_name: "a.pdf".to_string(),
            path: PathBuf::from("a.pdf"),
            outcome: OutcomeStatus::Skipped,
        });
        run.record(DocumentOutcome {
            file_name: "b.pdf".to_string(),
            path: PathBuf::from("b.pdf"),
            outcome: OutcomeStatus::Failed {
                stage: FailureStage::Extraction,
                reason: "没有文本层".to_string(),
            },
        });
        run.finish();

        let settings = ReportSettings {
            max_text_length: 8000,
            extract_pages: 0,
            skip_analyzed: true,
        };
        let md_path = writer.write_batch_report(&run, &settings).unwrap();

        let name = md_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ai_batch_analysis_"));
        assert!(name.ends_with(".md"));

        let md = fs::read_to_string(&md_path).unwrap();
        assert!(md.contains("- **跳过文件**: 1 篇"));
        assert!(md.contains("1. **b.pdf** - [文本提取] 没有文本层"));
        assert!(md.contains("- **提取页数**: 全部"));
        assert!(md.contains("`summaries/*_ai_analysis.md`"));

        let json = fs::read_to_string(md_path.with_extension("json")).unwrap();
        let back: BatchRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back.counts.failed, 1);
    }
}
