//! # Blog Translator
//!
//! 中文 Markdown 博客翻译核心库：把带 front matter 的中文文章翻译成目标语言，
//! 同时保持 Markdown 结构、代码和链接不变。
//!
//! ## 主要特性
//!
//! - **结构感知分段**: 代码块、标题、列表、引用、表格等按结构单元处理，代码永不翻译
//! - **语法保护**: 行内代码、链接、图片、粗体等先替换为占位符，翻译后原样还原
//! - **中英混排**: 只翻译中文片段，已是英文的词语原样保留
//! - **持久缓存**: 按类别（标签/slug/分类/文章）分文件缓存，带过期时间，原子写入
//! - **批量预热**: 先汇总全部标签和标题，只为未命中项调用 API，服务不可达时回退为拼音 slug
//! - **速率限制与取消**: 顺序调用并保持固定间隔，网络调用和等待都可被取消
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use blog_translator::{
//!     ChatCompletionClient, Document, TranslationCache, TranslationService, TranslatorLibConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TranslatorLibConfig::load_from_default_locations();
//!
//!     let cache = Arc::new(TranslationCache::from_config(&config.cache));
//!     cache.load();
//!
//!     let client = Arc::new(ChatCompletionClient::new(config.translation.clone())?);
//!     let service = TranslationService::new(client, cache.clone(), config.translation.clone());
//!
//!     let doc = Document::parse(&std::fs::read_to_string("content/post.md")?)?;
//!     let translated = service.translate_document(&doc, "en").await?;
//!     std::fs::write("content/post.en.md", translated.render())?;
//!
//!     cache.save()?;
//!     println!("{}", service.stats().summary());
//!     Ok(())
//! }
//! ```
//!
//! ## 配置文件支持
//!
//! ```toml
//! [translation]
//! api_url = "http://localhost:1234/v1/chat/completions"
//! model = "qwen2.5-7b-instruct"
//! target_lang = "en"
//! request_delay_ms = 500
//! timeout_secs = 60
//! max_text_length = 3000
//!
//! [cache]
//! dir = ".translation-cache"
//! expiry_days = 30
//! ```

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod guard;
pub mod markdown;
pub mod mock;
pub mod planner;
pub mod slug;
pub mod splitter;
pub mod translator;
pub mod types;

pub use cache::{CacheClass, CacheEntry, CacheStats, CacheStore, JsonFileStore, TranslationCache};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use client::{retry_with_backoff, ChatCompletionClient, TranslationClient};
pub use config::TranslatorLibConfig;
pub use document::{ArticleSource, Document, FieldRule, FileArticleSource, FIELD_RULES};
pub use error::{Result, TranslationError};
pub use guard::{protect, restore, Protected, ProtectedElement};
pub use markdown::{LineEnding, Segment, SegmentKind};
pub use mock::{MockMode, MockTranslator};
pub use planner::{collect_corpus, warm, BulkCachePlanner, CachePlan, Corpus, WarmReport};
pub use slug::{heuristic_slug, slugify};
pub use splitter::{contains_cjk, TextRun};
pub use translator::{FieldSplit, RateLimiter, TranslationService};
pub use types::{
    CacheConfig, ChatMessage, RetryConfig, TranslationConfig, TranslationStats,
};
