//! 翻译服务客户端
//!
//! [`TranslationClient`] 是编排层唯一依赖的外部能力：给定系统提示、少样本历史和
//! 原文，返回一段译文。[`ChatCompletionClient`] 是基于 OpenAI 兼容聊天补全接口
//! （如 LM Studio、Ollama）的默认实现。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::sleep;

use crate::error::{Result, TranslationError};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, RetryConfig, TranslationConfig};

/// 连通性检查的超时时间
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// 翻译客户端
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// 执行一次逻辑翻译调用
    async fn translate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        text: &str,
        target_lang: &str,
    ) -> Result<String>;

    /// 检查服务是否可达
    async fn check_connectivity(&self) -> Result<()>;
}

/// 带指数退避的重试机制
///
/// 只有可重试的错误（连接失败、超时、429/5xx）才会重试，
/// 按指数增长的延迟等待，直到达到最大重试次数。
pub async fn retry_with_backoff<F, Fut, T>(mut operation: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay_ms;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= config.max_retries || !e.is_retryable() => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!("Attempt {} failed: {}. Retrying in {}ms...", attempt, e, delay);
                sleep(Duration::from_millis(delay)).await;
                delay = std::cmp::min(
                    (delay as f64 * config.backoff_multiplier) as u64,
                    config.max_delay_ms,
                );
            }
        }
    }
}

/// 聊天补全客户端
#[derive(Clone)]
pub struct ChatCompletionClient {
    /// HTTP客户端，用于API调用
    client: Client,
    config: TranslationConfig,
    retry: RetryConfig,
}

impl ChatCompletionClient {
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .user_agent(concat!("blog-translator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TranslationError::Config(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            retry: RetryConfig::from_translation(&config),
            config,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 模型列表地址，用于连通性检查
    fn models_url(&self) -> String {
        let url = self.config.api_url.trim_end_matches('/');
        match url.strip_suffix("/chat/completions") {
            Some(base) => format!("{base}/models"),
            None => url.to_string(),
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        text: &str,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(text));

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String> {
        let mut builder = self
            .client
            .post(&self.config.api_url)
            .header("Accept", "application/json")
            .json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        tracing::debug!("翻译服务响应状态: {}", status);

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            return Err(TranslationError::Api {
                code: status.as_u16(),
                message: error_text,
            });
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(TranslationError::EmptyResult)?;
        if content.trim().is_empty() {
            return Err(TranslationError::EmptyResult);
        }
        Ok(content)
    }
}

#[async_trait]
impl TranslationClient for ChatCompletionClient {
    async fn translate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        text: &str,
        target_lang: &str,
    ) -> Result<String> {
        tracing::debug!(
            "发送翻译请求到: {} ({} 字符, 目标语言 {})",
            self.config.api_url,
            text.chars().count(),
            target_lang
        );
        let request = self.build_request(system_prompt, history, text);
        retry_with_backoff(|| self.send_once(&request), &self.retry).await
    }

    async fn check_connectivity(&self) -> Result<()> {
        let url = self.models_url();
        match self
            .client
            .get(&url)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
        {
            // 任何 HTTP 响应都说明服务在线
            Ok(response) => {
                tracing::info!("翻译服务可达: {} ({})", url, response.status());
                Ok(())
            }
            Err(e) => Err(TranslationError::Connectivity(format!("{url}: {e}"))),
        }
    }
}
