//! 提示词渲染 - 业务能力层
//!
//! 模板使用命名占位符：`{name}` 替换为变量值，
//! `{{` 和 `}}` 输出字面花括号。

use std::fs;

use crate::config::Config;
use crate::error::{ConfigError, RenderError};

const ANALYSIS_REQUIRED: &[&str] = &["content"];
const ANALYSIS_ALLOWED: &[&str] = &["content", "filename"];
const METHOD_CARD_REQUIRED: &[&str] = &["analysis"];
const METHOD_CARD_ALLOWED: &[&str] = &["analysis", "filename"];

enum Segment<'a> {
    Text(&'a str),
    Brace(char),
    Placeholder(&'a str),
}

fn tokenize(template: &str) -> Result<Vec<Segment<'_>>, RenderError> {
    let mut segments = Vec::new();
    let mut chars = template.char_indices().peekable();
    let mut text_start = 0;

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' | '}' => {
                if text_start < pos {
                    segments.push(Segment::Text(&template[text_start..pos]));
                }

                if chars.peek().map(|&(_, next)| next) == Some(c) {
                    chars.next();
                    segments.push(Segment::Brace(c));
                    text_start = pos + 2;
                    continue;
                }

                if c == '}' {
                    return Err(RenderError::UnbalancedBrace(template[..pos].chars().count()));
                }

                let rest = &template[pos + 1..];
                let end = rest
                    .find(|ch: char| ch == '{' || ch == '}')
                    .filter(|&i| rest[i..].starts_with('}'))
                    .ok_or_else(|| RenderError::UnbalancedBrace(template[..pos].chars().count()))?;

                segments.push(Segment::Placeholder(rest[..end].trim()));
                // 跳过占位符名和右花括号
                for _ in 0..rest[..=end].chars().count() {
                    chars.next();
                }
                text_start = pos + 1 + end + 1;
            }
            _ => {}
        }
    }

    if text_start < template.len() {
        segments.push(Segment::Text(&template[text_start..]));
    }

    Ok(segments)
}

/// 渲染模板
///
/// 模板中出现未提供的占位符时返回 [`RenderError::UnknownPlaceholder`]
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());

    for segment in tokenize(template)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Brace(c) => out.push(c),
            Segment::Placeholder(name) => {
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| RenderError::UnknownPlaceholder(name.to_string()))?;
                out.push_str(value);
            }
        }
    }

    Ok(out)
}

/// 检查模板只使用允许的占位符，并包含所有必需的占位符
pub fn validate_template(
    template: &str,
    allowed: &[&str],
    required: &[&str],
) -> Result<(), RenderError> {
    let placeholders: Vec<&str> = tokenize(template)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name),
            _ => None,
        })
        .collect();

    if let Some(unknown) = placeholders.iter().find(|p| !allowed.contains(*p)) {
        return Err(RenderError::UnknownPlaceholder(unknown.to_string()));
    }
    if let Some(missing) = required.iter().find(|r| !placeholders.contains(*r)) {
        return Err(RenderError::MissingPlaceholder(missing.to_string()));
    }
    Ok(())
}

/// 按字符截断正文
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 已校验的提示词模板
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    analysis: String,
    /// 关闭方法卡片时为 None
    method_card: Option<String>,
    analysis_system: String,
    method_card_system: String,
    max_text_length: usize,
}

impl PromptTemplates {
    /// 读取并校验配置中的模板文件
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let read = |path: &std::path::Path| {
            fs::read_to_string(path).map_err(|source| ConfigError::TemplateUnreadable {
                path: path.to_path_buf(),
                source,
            })
        };

        let analysis = read(&config.prompts.analysis_template)?;
        let method_card = if config.processing.generate_method_card {
            Some(read(&config.prompts.method_card_template)?)
        } else {
            None
        };

        Self::new(
            analysis,
            method_card,
            config.prompts.analysis_system_prompt.clone(),
            config.prompts.method_card_system_prompt.clone(),
            config.processing.max_text_length,
        )
    }

    pub fn new(
        analysis: String,
        method_card: Option<String>,
        analysis_system: String,
        method_card_system: String,
        max_text_length: usize,
    ) -> Result<Self, ConfigError> {
        validate_template(&analysis, ANALYSIS_ALLOWED, ANALYSIS_REQUIRED).map_err(|source| {
            ConfigError::InvalidTemplate {
                name: "analysis_template".to_string(),
                source,
            }
        })?;
        if let Some(card) = &method_card {
            validate_template(card, METHOD_CARD_ALLOWED, METHOD_CARD_REQUIRED).map_err(
                |source| ConfigError::InvalidTemplate {
                    name: "method_card_template".to_string(),
                    source,
                },
            )?;
        }

        Ok(Self {
            analysis,
            method_card,
            analysis_system,
            method_card_system,
            max_text_length,
        })
    }

    pub fn analysis_system_prompt(&self) -> &str {
        &self.analysis_system
    }

    pub fn method_card_system_prompt(&self) -> &str {
        &self.method_card_system
    }

    pub fn method_card_enabled(&self) -> bool {
        self.method_card.is_some()
    }

    /// 渲染分析提示词，正文截断到 `max_text_length` 个字符
    pub fn render_analysis(&self, file_name: &str, text: &str) -> Result<String, RenderError> {
        let content = truncate_chars(text, self.max_text_length);
        render(&self.analysis, &[("filename", file_name), ("content", content)])
    }

    /// 渲染方法卡片提示词，未启用时返回 None
    pub fn render_method_card(
        &self,
        file_name: &str,
        analysis: &str,
    ) -> Option<Result<String, RenderError>> {
        self.method_card
            .as_deref()
            .map(|template| render(template, &[("filename", file_name), ("analysis", analysis)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_and_escapes() {
        let out = render(
            "文件: {filename}\n格式示例: {{\"key\": 1}}\n{content}",
            &[("filename", "a.pdf"), ("content", "正文 {不是占位符}")],
        )
        .unwrap();
        assert_eq!(out, "文件: a.pdf\n格式示例: {\"key\": 1}\n正文 {不是占位符}");
    }

    #[test]
    fn test_render_unknown_placeholder() {
        let err = render("{content} {author}", &[("content", "x")]).unwrap_err();
        assert_eq!(err, RenderError::UnknownPlaceholder("author".to_string()));
    }

    #[test]
    fn test_render_unbalanced_braces() {
        assert_eq!(
            render("前言 {content", &[("content", "x")]).unwrap_err(),
            RenderError::UnbalancedBrace(3)
        );
        assert_eq!(
            render("a } b", &[]).unwrap_err(),
            RenderError::UnbalancedBrace(2)
        );
        assert_eq!(
            render("{a{b}", &[]).unwrap_err(),
            RenderError::UnbalancedBrace(0)
        );
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("{filename}: {content}", ANALYSIS_ALLOWED, ANALYSIS_REQUIRED).is_ok());
        assert_eq!(
            validate_template("{filename}", ANALYSIS_ALLOWED, ANALYSIS_REQUIRED).unwrap_err(),
            RenderError::MissingPlaceholder("content".to_string())
        );
        assert_eq!(
            validate_template("{content}", METHOD_CARD_ALLOWED, METHOD_CARD_REQUIRED).unwrap_err(),
            RenderError::UnknownPlaceholder("content".to_string())
        );
    }

    #[test]
    fn test_shipped_templates_are_valid() {
        let analysis = include_str!("../../prompts/analysis_template.txt");
        let card = include_str!("../../prompts/method_card_template.txt");
        assert!(validate_template(analysis, ANALYSIS_ALLOWED, ANALYSIS_REQUIRED).is_ok());
        assert!(validate_template(card, METHOD_CARD_ALLOWED, METHOD_CARD_REQUIRED).is_ok());

        // 模板中的章节标题必须能被解析器识别
        let sections = crate::models::parse_sections(analysis);
        assert_eq!(sections.len(), crate::models::ReportSection::ALL.len());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate_chars("模型压缩论文", 2), "模型");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_templates_render_with_truncation() {
        let templates = PromptTemplates::new(
            "《{filename}》\n{content}".to_string(),
            Some("总结: {analysis}".to_string()),
            "sys".to_string(),
            "card sys".to_string(),
            4,
        )
        .unwrap();

        assert_eq!(
            templates.render_analysis("p.pdf", "abcdefgh").unwrap(),
            "《p.pdf》\nabcd"
        );
        assert_eq!(
            templates.render_method_card("p.pdf", "结论").unwrap().unwrap(),
            "总结: 结论"
        );
        assert!(templates.method_card_enabled());
    }

    #[test]
    fn test_invalid_template_is_config_error() {
        let err = PromptTemplates::new(
            "{filename}".to_string(),
            None,
            String::new(),
            String::new(),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_from_config_reads_template_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("prompts")).unwrap();
        fs::write(
            dir.path().join("prompts/analysis_template.txt"),
            "{content}",
        )
        .unwrap();

        let config = Config::from_toml_str(
            "[processing]\ngenerate_method_card = false\n",
            dir.path(),
        )
        .unwrap();
        let templates = PromptTemplates::from_config(&config).unwrap();
        assert!(!templates.method_card_enabled());
        assert!(templates.render_method_card("a", "b").is_none());

        let config = Config::from_toml_str("", dir.path()).unwrap();
        let err = PromptTemplates::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::TemplateUnreadable { .. }));
    }
}
