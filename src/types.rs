//! 类型定义模块
//!
//! 定义翻译库中使用的配置类型、聊天补全接口的请求/响应结构以及运行统计。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 翻译配置
///
/// 包含翻译服务的所有配置选项，如API地址、语言设置、节流参数等。
///
/// # 字段说明
///
/// * `api_url` - 聊天补全接口地址（OpenAI 兼容，如 LM Studio）
/// * `model` - 模型名称
/// * `api_key` - 可选的 Bearer 密钥
/// * `source_lang` - 源语言代码
/// * `target_lang` - 默认目标语言代码
/// * `request_delay_ms` - 相邻两次 API 调用之间的最小间隔
/// * `timeout_secs` - 单次请求超时时间
/// * `temperature` / `max_tokens` - 生成参数
/// * `max_retries` - 可重试错误的最大重试次数
/// * `max_text_length` - 单次翻译的最大字符数，超出时按句子切分
/// * `generate_slug` - 翻译文章时是否根据标题生成 slug
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: usize,
    pub max_text_length: usize,
    pub generate_slug: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:1234/v1/chat/completions".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            api_key: None,
            source_lang: "zh".to_string(),
            target_lang: "en".to_string(),
            request_delay_ms: 500,
            timeout_secs: 60,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 1,
            max_text_length: 3000,
            generate_slug: true,
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存文件所在目录
    pub dir: PathBuf,
    /// 条目过期天数
    pub expiry_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".translation-cache"),
            expiry_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 根据翻译配置构造重试配置
    pub fn from_translation(config: &TranslationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// 翻译运行统计
///
/// 一次翻译运行总是以逐条成功/失败汇总结束，而不会在第一个错误处中止。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationStats {
    /// 实际发出的 API 调用次数
    pub api_calls: usize,
    /// 命中缓存的次数
    pub cache_hits: usize,
    /// 成功翻译（新调用）的条目数
    pub translated: usize,
    /// 翻译失败并回退为原文的条目数
    pub failed: usize,
    /// 不含中文而直接跳过的条目数
    pub skipped: usize,
    /// 失败的原文，供人工复查
    pub failures: Vec<String>,
}

impl TranslationStats {
    pub fn summary(&self) -> String {
        format!(
            "API调用 {} 次，缓存命中 {} 次，成功 {} 条，失败 {} 条，跳过 {} 条",
            self.api_calls, self.cache_hits, self.translated, self.failed, self.skipped
        )
    }
}
