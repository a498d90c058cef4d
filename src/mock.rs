//! 测试用模拟翻译客户端
//!
//! 不访问网络、结果确定的 [`TranslationClient`]。记录每次请求并统计调用次数，
//! 便于测试断言缓存幂等和回退行为。
//!
//! # 示例
//!
//! ```rust
//! use blog_translator::{MockMode, MockTranslator, TranslationClient};
//!
//! let mock = MockTranslator::new(MockMode::Tagged);
//! let result = tokio_test::block_on(mock.translate("", &[], "你好", "en")).unwrap();
//! assert_eq!(result, "[en]你好");
//! assert_eq!(mock.call_count(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::TranslationClient;
use crate::error::{Result, TranslationError};
use crate::types::ChatMessage;

/// 模拟模式
#[derive(Debug, Clone)]
pub enum MockMode {
    /// 加目标语言前缀："你好" → "[en]你好"，占位符原样保留
    Tagged,

    /// 预设映射，未知文本按 `Tagged` 处理
    Mappings(HashMap<String, String>),

    /// 每次调用都返回 API 错误
    Error(String),

    /// 服务完全不可达
    Unreachable,

    /// 每次调用都返回空结果
    Empty,
}

/// 模拟各种翻译场景的客户端
#[derive(Debug)]
pub struct MockTranslator {
    mode: MockMode,
    delay: Duration,
    fail_on: HashSet<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            fail_on: HashSet::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 由 `(原文, 译文)` 对构造映射模式
    pub fn with_mappings<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(MockMode::Mappings(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// 每次调用的模拟网络延迟
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 仅对该原文返回失败
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on.insert(text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 收到的原文，按调用顺序
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TranslationClient for MockTranslator {
    async fn translate(
        &self,
        _system_prompt: &str,
        _history: &[ChatMessage],
        text: &str,
        target_lang: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(text.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on.contains(text) {
            return Err(TranslationError::Api {
                code: 500,
                message: format!("模拟失败: {text}"),
            });
        }

        match &self.mode {
            MockMode::Tagged => Ok(format!("[{target_lang}]{text}")),
            MockMode::Mappings(map) => Ok(map
                .get(text)
                .cloned()
                .unwrap_or_else(|| format!("[{target_lang}]{text}"))),
            MockMode::Error(message) => Err(TranslationError::Api {
                code: 500,
                message: message.clone(),
            }),
            MockMode::Unreachable => Err(TranslationError::Connectivity(
                "模拟服务不可达".to_string(),
            )),
            MockMode::Empty => Err(TranslationError::EmptyResult),
        }
    }

    async fn check_connectivity(&self) -> Result<()> {
        match self.mode {
            MockMode::Unreachable => Err(TranslationError::Connectivity(
                "模拟服务不可达".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
