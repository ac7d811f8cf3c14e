//! # Literature Analyzer
//!
//! 一个用于批量分析学术论文 PDF 的 Rust 应用程序：
//! 提取文本，交给大模型生成结构化分析报告和方法卡片，并跟踪整体进度。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与外部世界交互，只暴露能力
//! - `TextExtractor` - PDF 文本提取（lopdf）
//! - `ChatTransport` - 单次聊天补全请求（reqwest）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单篇文献
//! - `ApiClient` - 带重试和退避的模型调用
//! - `PromptTemplates` - 提示词模板渲染
//! - `ResultWriter` - 原子写入分析报告、方法卡片和批次报告
//! - `ProgressMonitor` - 基于文件系统的只读进度查询
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇文献"的完整处理流程
//! - `DocumentCtx` - 上下文封装（序号 + 文件名）
//! - `DocumentFlow` - 流程编排（extract → analyze → method card → write）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理并发、失败隔离和统计
//!
//! ## 模块结构

pub mod app;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{BatchRun, Document};
pub use orchestrator::{BatchOrchestrator, CancelHandle};
pub use workflow::{DocumentCtx, DocumentFlow};
