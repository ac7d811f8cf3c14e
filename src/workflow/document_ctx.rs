//! 文献处理上下文
//!
//! 封装"我正在处理本批次的第几篇文献"这一信息

use std::fmt::Display;

/// 文献处理上下文
#[derive(Debug, Clone)]
pub struct DocumentCtx {
    /// 在本次处理队列中的序号（从 1 开始，仅用于日志显示）
    pub index: usize,

    /// 本次处理队列的长度
    pub total: usize,

    /// 源文件名
    pub file_name: String,
}

impl DocumentCtx {
    pub fn new(index: usize, total: usize, file_name: impl Into<String>) -> Self {
        Self {
            index,
            total,
            file_name: file_name.into(),
        }
    }
}

impl Display for DocumentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{} {}]", self.index, self.total, self.file_name)
    }
}
