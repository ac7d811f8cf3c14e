//! PDF 文本提取 - 基础设施层
//!
//! 只暴露"给一个路径，拿回文本"的能力，不认识批次和报告。

use crate::error::ExtractionError;
use lopdf::Document as PdfDocument;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// 文本提取器
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// 基于 lopdf 的提取器
pub struct LopdfExtractor {
    /// 最多提取的页数，0 表示全部
    max_pages: usize,
}

impl LopdfExtractor {
    pub fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }
}

impl TextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let shown = path.display().to_string();
        let doc = PdfDocument::load(path).map_err(|e| ExtractionError::Unreadable {
            path: shown.clone(),
            message: e.to_string(),
        })?;

        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let budget = page_budget(pages.len(), self.max_pages);
        debug!("{}: 共 {} 页，提取前 {} 页", shown, pages.len(), budget);

        let mut text = String::new();
        let mut last_error = None;

        for page in pages.iter().take(budget) {
            match doc.extract_text(&[*page]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => {
                    warn!("{} 第 {} 页提取失败: {}", shown, page, e);
                    last_error = Some(ExtractionError::PageFailed {
                        page: *page,
                        message: e.to_string(),
                    });
                }
            }
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(last_error.unwrap_or(ExtractionError::NoText { path: shown }));
        }

        Ok(text.to_string())
    }
}

/// 实际提取的页数
pub fn page_budget(total_pages: usize, max_pages: usize) -> usize {
    if max_pages == 0 {
        total_pages
    } else {
        total_pages.min(max_pages)
    }
}

/// 在阻塞线程池中执行提取
pub async fn extract_blocking(
    extractor: Arc<dyn TextExtractor>,
    path: PathBuf,
) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extractor.extract(&path))
        .await
        .map_err(|e| ExtractionError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_budget() {
        assert_eq!(page_budget(12, 0), 12);
        assert_eq!(page_budget(12, 10), 10);
        assert_eq!(page_budget(3, 10), 3);
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = LopdfExtractor::new(10).extract(&path).unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_extract_blocking_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let extractor: Arc<dyn TextExtractor> = Arc::new(LopdfExtractor::new(0));
        let err = extract_blocking(extractor, dir.path().join("missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }));
    }
}
