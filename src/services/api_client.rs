//! 模型 API 客户端 - 业务能力层
//!
//! 只负责"把一段提示词交给模型并拿回文本"，带超时、重试和退避。
//!
//! ## 技术栈
//! - 使用 `async-openai` 的请求构建器生成请求体
//! - 通过 [`ChatTransport`] 发送，默认实现为 reqwest
//! - 兼容 OpenAI API 的服务（如 SiliconFlow, DeepSeek 等）

use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ApiFailure;
use crate::infrastructure::{ChatTransport, HttpTransport};

/// 编排层看到的模型接口
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 发送一轮对话，返回模型输出
    async fn analyze(&self, system_prompt: &str, prompt: &str) -> Result<String, ApiFailure>;

    /// 写入报告的模型名
    fn model_id(&self) -> &str;
}

/// 带重试的 API 客户端
///
/// 职责：
/// - 每次逻辑调用只构建一次请求，每次尝试发送同一个请求
/// - 按失败类型决定是否重试
/// - 不关心文献、批次和输出文件
pub struct ApiClient<T = HttpTransport> {
    transport: T,
    model: String,
    temperature: f32,
    max_tokens: u32,
    /// 总尝试次数（含第一次）
    max_attempts: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl ApiClient<HttpTransport> {
    /// 使用 HTTP 传输创建客户端
    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self::with_transport(config, HttpTransport::new(config)?))
    }
}

impl<T: ChatTransport> ApiClient<T> {
    pub fn with_transport(config: &ApiConfig, transport: T) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            max_retry_delay: config.max_retry_delay(),
        }
    }

    #[allow(deprecated)]
    fn build_request(
        &self,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<CreateChatCompletionRequest, ApiFailure> {
        let build_failed = |e: async_openai::error::OpenAIError| {
            ApiFailure::malformed(format!("构建请求失败: {}", e))
        };

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(build_failed)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(build_failed)?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(build_failed)
    }
}

#[async_trait]
impl<T: ChatTransport> ModelClient for ApiClient<T> {
    async fn analyze(&self, system_prompt: &str, prompt: &str) -> Result<String, ApiFailure> {
        let request = self.build_request(system_prompt, prompt)?;
        debug!(
            "调用模型 API，模型: {}，提示词长度: {} 字符",
            self.model,
            prompt.chars().count()
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(&request).await {
                Ok(content) => {
                    debug!("模型 API 调用成功 (第 {} 次尝试)", attempt);
                    return Ok(content);
                }
                Err(mut failure) => {
                    failure.attempts = attempt;
                    if !failure.kind.is_retryable() || attempt >= self.max_attempts {
                        return Err(failure);
                    }

                    let delay = backoff_delay(
                        attempt,
                        self.retry_delay,
                        self.max_retry_delay,
                        failure.retry_after,
                    );
                    warn!(
                        "⚠️ API 调用失败 (第 {}/{} 次): {}，{:.1} 秒后重试",
                        attempt,
                        self.max_attempts,
                        failure.message,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// 第 `attempt` 次失败后的等待时间
///
/// `base * 2^(attempt-1)`，不小于 Retry-After，最终不超过 `cap`
pub fn backoff_delay(
    attempt: u32,
    base: Duration,
    cap: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let delay = base.saturating_mul(factor);
    let delay = retry_after.map_or(delay, |ra| delay.max(ra));
    delay.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiFailureKind;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// 按脚本依次返回结果的传输
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, ApiFailure>>>,
        calls: AtomicU32,
        last_request: Mutex<Option<String>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<String, ApiFailure>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, request: &CreateChatCompletionRequest) -> Result<String, ApiFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(serde_json::to_string(request).unwrap());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiFailure::network("脚本已用完")))
        }
    }

    fn api_config(max_retries: u32) -> ApiConfig {
        ApiConfig {
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            max_retries,
            retry_delay_ms: 0,
            max_retry_delay_ms: 0,
            ..ApiConfig::default()
        }
    }

    fn flaky() -> Vec<Result<String, ApiFailure>> {
        vec![
            Err(ApiFailure::network("HTTP 502")),
            Err(ApiFailure::timeout("timed out")),
            Ok("## 论文基本信息".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let client = ApiClient::with_transport(&api_config(3), ScriptedTransport::new(flaky()));
        let content = client.analyze("sys", "prompt").await.unwrap();
        assert_eq!(content, "## 论文基本信息");
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let client = ApiClient::with_transport(&api_config(1), ScriptedTransport::new(flaky()));
        let failure = client.analyze("sys", "prompt").await.unwrap_err();
        assert_eq!(failure.kind, ApiFailureKind::NetworkError);
        assert_eq!(failure.attempts, 1);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_kind() {
        let client = ApiClient::with_transport(&api_config(2), ScriptedTransport::new(flaky()));
        let failure = client.analyze("sys", "prompt").await.unwrap_err();
        assert_eq!(failure.kind, ApiFailureKind::Timeout);
        assert_eq!(failure.attempts, 2);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(ApiFailure::auth("HTTP 401")),
            Ok("不应到达".to_string()),
        ]);
        let client = ApiClient::with_transport(&api_config(5), transport);
        let failure = client.analyze("sys", "prompt").await.unwrap_err();
        assert_eq!(failure.kind, ApiFailureKind::AuthError);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(ApiFailure::malformed("空内容"))]);
        let client = ApiClient::with_transport(&api_config(3), transport);
        let failure = client.analyze("sys", "prompt").await.unwrap_err();
        assert_eq!(failure.kind, ApiFailureKind::MalformedResponse);
        assert_eq!(client.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_carries_model_and_messages() {
        let transport = ScriptedTransport::new(vec![Ok("ok".to_string())]);
        let client = ApiClient::with_transport(&api_config(1), transport);
        client.analyze("你是专家", "分析这篇论文").await.unwrap();

        let body = client.transport.last_request.lock().unwrap().clone().unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "分析这篇论文");
        assert_eq!(client.model_id(), "test-model");
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(1, base, cap, None), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, base, cap, None), Duration::from_secs(10));
        assert_eq!(backoff_delay(3, base, cap, None), Duration::from_secs(20));
        assert_eq!(backoff_delay(10, base, cap, None), cap);
        assert_eq!(backoff_delay(40, base, cap, None), cap);
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(60);
        assert_eq!(
            backoff_delay(1, base, cap, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            backoff_delay(1, base, cap, Some(Duration::from_secs(600))),
            cap
        );
    }
}
