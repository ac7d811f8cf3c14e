use crate::models::document::Document;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 扫描输入目录中的所有 PDF 文件
///
/// 只收集扩展名为 `.pdf`（不区分大小写）的普通文件，按文件名字典序排序，
/// 保证相同目录状态下每次得到相同的处理顺序。
pub async fn load_all_documents(folder: &Path) -> Result<Vec<Document>> {
    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder.display());
    }

    let mut documents = Vec::new();
    let mut entries = fs::read_dir(folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder.display()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder.display()))?
    {
        let path = entry.path();
        if !is_pdf(&path) {
            continue;
        }

        // 跟随符号链接
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => documents.push(Document::new(path, meta.len())),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("读取文件信息失败 {}: {}", path.display(), e);
            }
        }
    }

    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(documents)
}

/// 加载排序后的第一个 PDF（测试模式使用）
pub async fn load_first_document(folder: &Path) -> Result<Option<Document>> {
    let documents = load_all_documents(folder).await?;
    Ok(documents.into_iter().next())
}

/// 同步统计版本，供只读的进度监控使用；目录不存在时返回空列表
pub fn list_documents_sync(folder: &Path) -> Vec<Document> {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };

    let mut documents: Vec<Document> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_pdf(path))
        .filter_map(|path| {
            let meta = std::fs::metadata(&path).ok()?;
            meta.is_file().then(|| Document::new(path, meta.len()))
        })
        .collect();

    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    documents
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
