//! 文献与输出文件布局
//!
//! [`OutputLayout`] 是输出命名规则的唯一实现：编排层的"是否已分析"判断、
//! 结果写入的目标路径、进度监控的统计都通过它计算，三者不会出现分歧。

use crate::config::Config;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// 输出文件名的最大字符数
const MAX_ID_CHARS: usize = 50;

/// 一篇待分析的文献
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// 源文件路径
    pub path: PathBuf,
    /// 源文件名（含扩展名）
    pub file_name: String,
    /// 输出文件名主干（由文件名派生）
    pub id: String,
    /// 文件大小（字节）
    pub size_bytes: u64,
}

impl Document {
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id: safe_filename(&stem),
            path,
            file_name,
            size_bytes,
        }
    }
}

/// 生成安全的文件名
///
/// 去掉 `< > : " / \ | ? *`，连续空白替换为 `_`，最多保留 50 个字符。
pub fn safe_filename(stem: &str) -> String {
    static FORBIDDEN: OnceLock<Option<Regex>> = OnceLock::new();
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();

    let mut cleaned = stem.to_string();
    if let Some(re) = FORBIDDEN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).ok()) {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    if let Some(re) = WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()) {
        cleaned = re.replace_all(&cleaned, "_").into_owned();
    }
    cleaned.chars().take(MAX_ID_CHARS).collect()
}

/// 分析产物路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub summary_path: PathBuf,
    pub method_card_path: Option<PathBuf>,
    /// 方法卡片生成失败的原因，分析报告仍会保存
    pub method_card_error: Option<String>,
}

/// 输出目录布局和命名规则
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub summaries_dir: PathBuf,
    pub method_cards_dir: PathBuf,
    pub batch_reports_dir: PathBuf,
    pub summary_suffix: String,
    pub method_card_suffix: String,
}

impl OutputLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            summaries_dir: config.paths.summaries_dir.clone(),
            method_cards_dir: config.paths.method_cards_dir.clone(),
            batch_reports_dir: config.paths.batch_reports_dir.clone(),
            summary_suffix: config.output.summary_suffix.clone(),
            method_card_suffix: config.output.method_card_suffix.clone(),
        }
    }

    /// 分析报告路径
    pub fn summary_path(&self, document: &Document) -> PathBuf {
        self.summaries_dir
            .join(format!("{}{}.md", document.id, self.summary_suffix))
    }

    /// 方法卡片路径
    pub fn method_card_path(&self, document: &Document) -> PathBuf {
        self.method_cards_dir
            .join(format!("{}{}.md", document.id, self.method_card_suffix))
    }

    /// 文献是否已经分析完成
    ///
    /// 当且仅当分析报告存在、是普通文件且非空
    pub fn is_done(&self, document: &Document) -> bool {
        is_complete_artifact(&self.summary_path(document))
    }

    /// 文件名是否符合分析报告的命名规则
    pub fn is_summary_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(&format!("{}.md", self.summary_suffix)))
            .unwrap_or(false)
    }
}

fn is_complete_artifact(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout {
            summaries_dir: root.join("summaries"),
            method_cards_dir: root.join("method_cards"),
            batch_reports_dir: root.join("batch_reports"),
            summary_suffix: "_ai_analysis".to_string(),
            method_card_suffix: "_method_card".to_string(),
        }
    }

    #[test]
    fn test_safe_filename_strips_forbidden_chars() {
        assert_eq!(safe_filename("a<b>c:d\"e|f?g*h"), "abcdefgh");
        assert_eq!(safe_filename("Deep  Compression\tpaper"), "Deep_Compression_paper");
    }

    #[test]
    fn test_safe_filename_truncates_by_chars() {
        let long = "模".repeat(80);
        assert_eq!(safe_filename(&long).chars().count(), 50);
    }

    #[test]
    fn test_document_from_path() {
        let doc = Document::new(PathBuf::from("/in/Pruning Filters.pdf"), 42);
        assert_eq!(doc.file_name, "Pruning Filters.pdf");
        assert_eq!(doc.id, "Pruning_Filters");
        assert_eq!(doc.size_bytes, 42);
    }

    #[test]
    fn test_artifact_paths_follow_suffixes() {
        let layout = layout(Path::new("/out"));
        let doc = Document::new(PathBuf::from("/in/paper.pdf"), 1);
        assert_eq!(
            layout.summary_path(&doc),
            PathBuf::from("/out/summaries/paper_ai_analysis.md")
        );
        assert_eq!(
            layout.method_card_path(&doc),
            PathBuf::from("/out/method_cards/paper_method_card.md")
        );
        assert!(layout.is_summary_file(Path::new("x/paper_ai_analysis.md")));
        assert!(!layout.is_summary_file(Path::new("x/paper_method_card.md")));
    }

    #[test]
    fn test_is_done_requires_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        std::fs::create_dir_all(&layout.summaries_dir).unwrap();
        let doc = Document::new(dir.path().join("paper.pdf"), 1);

        assert!(!layout.is_done(&doc));

        std::fs::write(layout.summary_path(&doc), "").unwrap();
        assert!(!layout.is_done(&doc));

        std::fs::write(layout.summary_path(&doc), "# report").unwrap();
        assert!(layout.is_done(&doc));
    }
}
