//! 程序配置
//!
//! 配置从 TOML 文件加载，启动时一次性校验，之后以只读结构体的形式
//! 显式传给各个组件，不存在进程级的全局状态。

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认配置文件位置（相对当前目录）
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// 示例配置里的占位密钥
const API_KEY_PLACEHOLDER: &str = "your-api-key-here";

/// 程序配置
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub paths: PathsConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
    /// 项目根目录，相对路径以此为基准
    #[serde(skip)]
    pub project_root: PathBuf,
}

/// 模型 API 配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 每次调用的总尝试次数
    pub max_retries: u32,
    /// 首次重试前的等待（毫秒），之后指数增长
    pub retry_delay_ms: u64,
    /// 重试等待上限（毫秒）
    pub max_retry_delay_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            model: "deepseek-ai/DeepSeek-R1".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_delay_ms: 5_000,
            max_retry_delay_ms: 60_000,
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// 目录配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub summaries_dir: PathBuf,
    pub method_cards_dir: PathBuf,
    pub batch_reports_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            summaries_dir: PathBuf::from("data/output/summaries"),
            method_cards_dir: PathBuf::from("data/output/method_cards"),
            batch_reports_dir: PathBuf::from("data/output/batch_reports"),
            log_file: Some(PathBuf::from("logs/analyzer.log")),
        }
    }
}

/// 处理配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 送入模型的最大字符数
    pub max_text_length: usize,
    /// 最多提取的页数，0 表示全部
    pub extract_pages: usize,
    /// 跳过已有分析报告的文献
    pub skip_analyzed: bool,
    /// 同时处理的文献数量
    pub max_concurrent_documents: usize,
    /// 是否用第二次模型调用生成方法卡片
    pub generate_method_card: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_text_length: 8000,
            extract_pages: 10,
            skip_analyzed: true,
            max_concurrent_documents: 1,
            generate_method_card: true,
        }
    }
}

/// 输出文件配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub summary_suffix: String,
    pub method_card_suffix: String,
    pub include_metadata: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_suffix: "_ai_analysis".to_string(),
            method_card_suffix: "_method_card".to_string(),
            include_metadata: true,
        }
    }
}

/// 提示词配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub analysis_template: PathBuf,
    pub method_card_template: PathBuf,
    pub analysis_system_prompt: String,
    pub method_card_system_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            analysis_template: PathBuf::from("prompts/analysis_template.txt"),
            method_card_template: PathBuf::from("prompts/method_card_template.txt"),
            analysis_system_prompt: "你是一个模型轻量化领域的专家，专门分析深度学习模型压缩和优化相关的学术论文。你的分析深入、客观、专业。".to_string(),
            method_card_system_prompt: "你是一个技术文档专家，专门生成清晰简洁的技术方法卡片。".to_string(),
        }
    }
}

/// 日志配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
        }
    }
}

impl Config {
    /// 从文件加载并校验配置
    ///
    /// 相对路径以配置文件所在目录的上一级为项目根目录解析
    /// （`config/config.toml` → 项目根目录）。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let project_root = project_root_for(&path);
        let mut config = Self::parse(&content, project_root).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文本构建配置（不读取环境变量）
    pub fn from_toml_str(content: &str, project_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::parse(content, project_root.into()).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, project_root: PathBuf) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.project_root = project_root;
        config.resolve_paths();
        Ok(config)
    }

    /// 环境变量覆盖 API 配置
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.api.api_key = key;
        }
        if let Ok(base_url) = std::env::var("LLM_API_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL_NAME") {
            self.api.model = model;
        }
    }

    /// 将相对路径转换为基于项目根目录的绝对路径
    fn resolve_paths(&mut self) {
        let root = self.project_root.clone();
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };

        resolve(&mut self.paths.input_dir);
        resolve(&mut self.paths.output_dir);
        resolve(&mut self.paths.summaries_dir);
        resolve(&mut self.paths.method_cards_dir);
        resolve(&mut self.paths.batch_reports_dir);
        if let Some(log_file) = self.paths.log_file.as_mut() {
            resolve(log_file);
        }
        resolve(&mut self.prompts.analysis_template);
        resolve(&mut self.prompts.method_card_template);
    }

    /// 校验数值范围，不检查 API 密钥
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = &self.api;
        if api.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("api.base_url", "不能为空"));
        }
        if api.model.trim().is_empty() {
            return Err(ConfigError::invalid("api.model", "不能为空"));
        }
        if api.timeout_secs == 0 {
            return Err(ConfigError::invalid("api.timeout_secs", "必须大于 0"));
        }
        if api.max_retries == 0 {
            return Err(ConfigError::invalid("api.max_retries", "至少为 1"));
        }
        if !(0.0..=2.0).contains(&api.temperature) {
            return Err(ConfigError::invalid(
                "api.temperature",
                format!("{} 不在 [0, 2] 范围内", api.temperature),
            ));
        }
        if api.max_tokens == 0 {
            return Err(ConfigError::invalid("api.max_tokens", "必须大于 0"));
        }
        if api.max_retry_delay_ms < api.retry_delay_ms {
            return Err(ConfigError::invalid(
                "api.max_retry_delay_ms",
                "不能小于 api.retry_delay_ms",
            ));
        }
        if self.processing.max_text_length == 0 {
            return Err(ConfigError::invalid("processing.max_text_length", "必须大于 0"));
        }
        if self.processing.max_concurrent_documents == 0 {
            return Err(ConfigError::invalid(
                "processing.max_concurrent_documents",
                "至少为 1",
            ));
        }
        if self.output.summary_suffix.is_empty() {
            return Err(ConfigError::invalid("output.summary_suffix", "不能为空"));
        }
        Ok(())
    }

    /// 需要调用模型的模式在启动时检查密钥
    pub fn require_api_key(&self) -> Result<(), ConfigError> {
        let key = self.api.api_key.trim();
        if key.is_empty() || key == API_KEY_PLACEHOLDER {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// 创建所有输出目录
    pub fn create_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.paths.output_dir,
            &self.paths.summaries_dir,
            &self.paths.method_cards_dir,
            &self.paths.batch_reports_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn project_root_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml_str("", "/project").unwrap();
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.output.summary_suffix, "_ai_analysis");
        assert_eq!(config.paths.input_dir, PathBuf::from("/project/data/input"));
        assert_eq!(
            config.prompts.analysis_template,
            PathBuf::from("/project/prompts/analysis_template.txt")
        );
        assert!(config.processing.skip_analyzed);
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let toml = r#"
            [paths]
            input_dir = "/papers"
            summaries_dir = "out/summaries"
        "#;
        let config = Config::from_toml_str(toml, "/project").unwrap();
        assert_eq!(config.paths.input_dir, PathBuf::from("/papers"));
        assert_eq!(
            config.paths.summaries_dir,
            PathBuf::from("/project/out/summaries")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_toml_str("[api]\nmax_retries = 0\n", "/p").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "api.max_retries"));

        let err = Config::from_toml_str("[api]\ntemperature = 3.5\n", "/p").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "api.temperature"));

        let err =
            Config::from_toml_str("[processing]\nmax_concurrent_documents = 0\n", "/p").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("[api\nmodel = ", "/p").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_placeholder_api_key_is_missing() {
        let config =
            Config::from_toml_str("[api]\napi_key = \"your-api-key-here\"\n", "/p").unwrap();
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));

        let config = Config::from_toml_str("[api]\napi_key = \"sk-test\"\n", "/p").unwrap();
        assert!(config.require_api_key().is_ok());
    }

    #[test]
    fn test_project_root_from_config_path() {
        assert_eq!(
            project_root_for(Path::new("/home/me/analyzer/config/config.toml")),
            PathBuf::from("/home/me/analyzer")
        );
        assert_eq!(
            project_root_for(Path::new("config/config.toml")),
            PathBuf::from(".")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
