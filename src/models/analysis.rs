//! 分析结果
//!
//! 模型输出按固定的章节集合切分。章节标题是分析模板与下游工具之间的约定，
//! 修改时两边必须同步。

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;

/// 分析报告的固定章节
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportSection {
    /// 论文身份（标题、作者、出处）
    PaperIdentity,
    /// 技术分类
    TechnicalCategory,
    /// 核心贡献
    CoreContribution,
    /// 方法
    Method,
    /// 实验验证
    ExperimentalValidation,
    /// 质量评估
    QualityAssessment,
    /// 优势与局限
    StrengthsLimitations,
    /// 学习价值
    LearningValue,
}

impl ReportSection {
    pub const ALL: [ReportSection; 8] = [
        ReportSection::PaperIdentity,
        ReportSection::TechnicalCategory,
        ReportSection::CoreContribution,
        ReportSection::Method,
        ReportSection::ExperimentalValidation,
        ReportSection::QualityAssessment,
        ReportSection::StrengthsLimitations,
        ReportSection::LearningValue,
    ];

    /// 模板中使用的章节标题
    pub fn title(self) -> &'static str {
        match self {
            ReportSection::PaperIdentity => "论文基本信息",
            ReportSection::TechnicalCategory => "技术分类",
            ReportSection::CoreContribution => "核心贡献",
            ReportSection::Method => "方法详解",
            ReportSection::ExperimentalValidation => "实验验证",
            ReportSection::QualityAssessment => "质量评估",
            ReportSection::StrengthsLimitations => "优势与局限",
            ReportSection::LearningValue => "学习价值",
        }
    }

    /// 从 Markdown 标题行识别章节
    fn from_heading(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            return None;
        }
        let heading = trimmed.trim_start_matches('#');
        Self::ALL.into_iter().find(|s| heading.contains(s.title()))
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// 按章节标题切分模型输出
///
/// 第一个已知章节之前的内容被忽略；未识别的标题保留在当前章节正文中。
pub fn parse_sections(analysis: &str) -> BTreeMap<ReportSection, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<(ReportSection, Vec<&str>)> = None;

    for line in analysis.lines() {
        if let Some(section) = ReportSection::from_heading(line) {
            if let Some((prev, body)) = current.take() {
                sections.insert(prev, body.join("\n").trim().to_string());
            }
            current = Some((section, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((prev, body)) = current {
        sections.insert(prev, body.join("\n").trim().to_string());
    }

    sections
}

/// 单篇文献的分析结果
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub document_id: String,
    pub file_name: String,
    /// 模型返回的完整分析文本
    pub analysis: String,
    pub sections: BTreeMap<ReportSection, String>,
    pub method_card: Option<String>,
    pub model: String,
    pub analyzed_at: DateTime<Local>,
}

impl AnalysisResult {
    pub fn new(
        document_id: impl Into<String>,
        file_name: impl Into<String>,
        analysis: String,
        method_card: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            file_name: file_name.into(),
            sections: parse_sections(&analysis),
            analysis,
            method_card,
            model: model.into(),
            analyzed_at: Local::now(),
        }
    }

    /// 模型输出中缺失的章节
    pub fn missing_sections(&self) -> Vec<ReportSection> {
        ReportSection::ALL
            .into_iter()
            .filter(|s| !self.sections.contains_key(s))
            .collect()
    }
}
