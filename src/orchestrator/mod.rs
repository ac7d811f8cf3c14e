//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量文献处理器
//! - 扫描输入目录，跳过已分析的文献，应用数量限制
//! - 控制并发数量（Semaphore），按组处理
//! - 区分单篇失败与批次致命错误
//! - 汇总统计并保存批次报告
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Document>)
//!     ↓
//! workflow::DocumentFlow (处理单篇 Document)
//!     ↓
//! services (能力层：api_client / prompt_renderer / result_writer)
//!     ↓
//! infrastructure (基础设施：pdf_extractor / http_transport)
//! ```
//!
//! 编排层只做调度和统计，不做具体业务判断。

pub mod batch_processor;

pub use batch_processor::{BatchOrchestrator, CancelHandle};
