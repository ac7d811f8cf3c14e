//! 聊天补全 HTTP 传输 - 基础设施层
//!
//! 负责单次请求的发送和失败分类，不做重试。
//! 兼容 OpenAI `/chat/completions` 协议的服务都可以使用。

use crate::config::ApiConfig;
use crate::error::ApiFailure;
use crate::utils::logging::truncate_text;
use anyhow::{Context, Result};
use async_openai::types::chat::CreateChatCompletionRequest;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 错误信息中保留的响应体长度
const BODY_PREVIEW_CHARS: usize = 300;

/// 单次请求的传输层
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// 发送一次请求，返回模型输出的文本内容
    async fn send(&self, request: &CreateChatCompletionRequest) -> Result<String, ApiFailure>;
}

/// 基于 reqwest 的 HTTP 传输
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &CreateChatCompletionRequest) -> Result<String, ApiFailure> {
        debug!("POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.text().await.map_err(classify_request_error)?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body, retry_after));
        }

        parse_completion(&body)
    }
}

/// 按 HTTP 状态码分类失败
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> ApiFailure {
    let message = format!("HTTP {}: {}", status, truncate_text(body.trim(), BODY_PREVIEW_CHARS));
    match status {
        401 | 403 => ApiFailure::auth(message),
        429 => ApiFailure::rate_limited(message).with_retry_after(retry_after),
        408 => ApiFailure::timeout(message),
        500..=599 => ApiFailure::network(message),
        _ => ApiFailure::malformed(message),
    }
}

/// 分类 reqwest 层面的错误
fn classify_request_error(err: reqwest::Error) -> ApiFailure {
    if err.is_timeout() {
        ApiFailure::timeout(err.to_string())
    } else if err.is_decode() {
        ApiFailure::malformed(err.to_string())
    } else {
        ApiFailure::network(err.to_string())
    }
}

/// Retry-After 只支持秒数形式
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// 从响应体中取出第一条回复的内容
pub fn parse_completion(body: &str) -> Result<String, ApiFailure> {
    let parsed: CompletionBody = serde_json::from_str(body).map_err(|e| {
        ApiFailure::malformed(format!(
            "响应不是有效的 JSON ({}): {}",
            e,
            truncate_text(body, BODY_PREVIEW_CHARS)
        ))
    })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(ApiFailure::malformed("模型返回内容为空"));
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiFailureKind;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401, "", None).kind, ApiFailureKind::AuthError);
        assert_eq!(classify_status(403, "", None).kind, ApiFailureKind::AuthError);
        assert_eq!(classify_status(429, "", None).kind, ApiFailureKind::RateLimited);
        assert_eq!(classify_status(503, "", None).kind, ApiFailureKind::NetworkError);
        assert_eq!(classify_status(408, "", None).kind, ApiFailureKind::Timeout);
        assert_eq!(
            classify_status(400, "bad", None).kind,
            ApiFailureKind::MalformedResponse
        );
    }

    #[test]
    fn test_rate_limit_keeps_retry_after() {
        let failure = classify_status(429, "slow down", parse_retry_after(" 7 "));
        assert_eq!(failure.retry_after, Some(Duration::from_secs(7)));
        assert!(failure.message.contains("slow down"));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  ## 论文基本信息\n...  "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "## 论文基本信息\n...");
    }

    #[test]
    fn test_parse_completion_failures() {
        let err = parse_completion("<html>gateway</html>").unwrap_err();
        assert_eq!(err.kind, ApiFailureKind::MalformedResponse);

        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, ApiFailureKind::MalformedResponse);

        let err = parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert_eq!(err.kind, ApiFailureKind::MalformedResponse);
    }
}
