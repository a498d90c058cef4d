//! 翻译服务核心模块
//!
//! 把分段、语法保护、混排切分和缓存组合起来，翻译单个字段、标签列表、
//! 文章正文或整篇文档。所有 API 调用顺序执行，相邻调用之间插入固定间隔；
//! 单个片段失败时回退为原文并计数，不会中止整篇文档。

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::time::{sleep, Instant};

use crate::cache::{CacheClass, TranslationCache};
use crate::cancel::CancelToken;
use crate::client::TranslationClient;
use crate::document::{decode_list, decode_scalar, Document, FieldFormat, FieldKind, FieldRule, FIELD_RULES};
use crate::error::{Result, TranslationError};
use crate::guard::{self, Protected};
use crate::markdown::{self, SegmentKind};
use crate::slug::{heuristic_slug, slugify};
use crate::splitter::{self, contains_cjk};
use crate::types::{ChatMessage, TranslationConfig, TranslationStats};

/// 速率限制器
///
/// 保证相邻两次 API 调用之间至少间隔 `delay`。命中缓存时不调用 API，也就不等待。
pub struct RateLimiter {
    /// 请求间隔延迟
    delay: Duration,
    /// 上一次调用结束的时间
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// 创建新的速率限制器
    ///
    /// # 示例
    ///
    /// ```rust
    /// use blog_translator::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let limiter = RateLimiter::new(Duration::from_millis(500));
    /// ```
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    fn last_call(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_call.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 距离下一次允许调用还需等待的时间
    pub fn remaining(&self) -> Duration {
        self.last_call()
            .map(|last| self.delay.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// 获取请求许可，必要时等待；等待可被取消
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<()> {
        let wait = self.remaining();
        if !wait.is_zero() {
            tracing::debug!("等待 {}ms 后发起下一次请求", wait.as_millis());
            cancel.run(sleep(wait)).await?;
        }
        Ok(())
    }

    /// 记录一次调用结束
    pub fn mark(&self) {
        *self.last_call() = Some(Instant::now());
    }

    pub fn reset(&self) {
        *self.last_call() = None;
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "pt" => "Portuguese",
        "it" => "Italian",
        "zh" => "Chinese",
        other => other,
    }
}

/// 各缓存类别对应的系统提示
pub fn system_prompt(class: CacheClass, source_lang: &str, target_lang: &str) -> String {
    let source = language_name(source_lang);
    let lang = language_name(target_lang);
    match class {
        CacheClass::Tag => format!(
            "You translate {source} blog tags into {lang}. Reply with the translated tag only, \
             in lowercase, words separated by hyphens. Do not explain."
        ),
        CacheClass::Slug => format!(
            "You turn {source} blog post titles into concise {lang} URL slugs. Reply with the slug \
             only: lowercase words separated by hyphens, no punctuation. Do not explain."
        ),
        CacheClass::Category => format!(
            "You translate {source} blog category names into {lang}. Reply with the category name \
             only, in Title Case. Do not explain."
        ),
        CacheClass::Article => format!(
            "You are a professional translator. Translate the following {source} Markdown text into \
             {lang}. Keep every token of the form __NAME_N__ exactly as it is, keep line breaks and \
             Markdown markers, and leave text that is already in {lang} unchanged. Reply with the \
             translation only."
        ),
    }
}

/// 少样本示例（仅英文目标语言）
pub fn few_shot_history(class: CacheClass, target_lang: &str) -> Vec<ChatMessage> {
    if target_lang != "en" {
        return Vec::new();
    }
    let (source, answer) = match class {
        CacheClass::Tag => ("机器学习", "machine-learning"),
        CacheClass::Slug => ("如何用 Rust 编写命令行工具", "how-to-write-cli-tools-in-rust"),
        CacheClass::Category => ("技术笔记", "Tech Notes"),
        CacheClass::Article => (
            "运行 __INLINE_CODE_0__ 即可启动服务。",
            "Run __INLINE_CODE_0__ to start the service.",
        ),
    };
    vec![ChatMessage::user(source), ChatMessage::assistant(answer)]
}

const ANSWER_PREFIXES: [&str; 8] = [
    "translation:",
    "translated text:",
    "here is the translation:",
    "slug:",
    "翻译：",
    "翻译:",
    "译文：",
    "译文:",
];

const QUOTE_PAIRS: [(char, char); 6] = [
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('「', '」'),
    ('`', '`'),
    ('《', '》'),
];

/// 清理模型输出中多余的包装
///
/// 去掉 `<think>` 推理块、"Translation:" 之类的前缀、整体包裹的代码围栏和引号；
/// 单行类别只保留第一行非空内容。原文本身以引号开头时不去引号。
pub fn clean_output(raw: &str, source: &str, class: CacheClass) -> String {
    static THINK: OnceLock<Regex> = OnceLock::new();
    let think = THINK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("static pattern is valid"));
    let without_think = think.replace_all(raw, "");
    let mut text = without_think.trim();

    if text.starts_with("```") && text.ends_with("```") && text.len() > 6 && !source.trim_start().starts_with("```") {
        let inner = &text[3..text.len() - 3];
        // 去掉围栏后的语言标记行
        text = inner.split_once('\n').map_or(inner, |(_, rest)| rest).trim();
    }

    let lowered = text.to_lowercase();
    for prefix in ANSWER_PREFIXES {
        if lowered.starts_with(prefix) && text.is_char_boundary(prefix.len()) {
            text = text[prefix.len()..].trim_start();
            break;
        }
    }

    if class != CacheClass::Article {
        text = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    }

    let source = source.trim();
    loop {
        let stripped = QUOTE_PAIRS.iter().find_map(|&(open, close)| {
            if source.starts_with(open) {
                return None;
            }
            text.strip_prefix(open)?.strip_suffix(close)
        });
        match stripped {
            Some(inner) if !inner.trim().is_empty() => text = inner.trim(),
            _ => break,
        }
    }

    text.to_string()
}

#[derive(Debug, Clone)]
enum FieldPart {
    Keep(String),
    Translate {
        prefix: String,
        core: String,
        suffix: String,
    },
}

/// 字段值的切分结果
///
/// 记录哪些中文片段需要翻译（它们同时也是缓存键），以及如何把译文拼回原有结构。
/// 逐篇翻译和批量预热共用这一切分，保证两边的缓存键一致。
#[derive(Debug, Clone)]
pub struct FieldSplit {
    protected: Protected,
    parts: Vec<FieldPart>,
}

impl FieldSplit {
    pub fn new(value: &str) -> Self {
        let protected = guard::protect(value);
        let (runs, _) = splitter::split(&protected.text);
        let parts = runs
            .into_iter()
            .map(|run| {
                if !run.needs_translation {
                    return FieldPart::Keep(run.content);
                }
                let (prefix, core, suffix) = splitter::trim_run(&run.content);
                FieldPart::Translate {
                    prefix: prefix.to_string(),
                    core: core.to_string(),
                    suffix: suffix.to_string(),
                }
            })
            .collect();
        Self { protected, parts }
    }

    /// 需要翻译的片段，按出现顺序
    pub fn units(&self) -> impl Iterator<Item = &str> + '_ {
        self.parts.iter().filter_map(|part| match part {
            FieldPart::Translate { core, .. } => Some(core.as_str()),
            FieldPart::Keep(_) => None,
        })
    }

    /// 按顺序代入译文并还原语法
    ///
    /// `translations` 与 [`units`](Self::units) 一一对应，缺少的片段保留原文。
    /// 译文与相邻英文单词或占位符之间补一个空格。
    pub fn assemble(&self, translations: &[String]) -> String {
        let mut out = String::new();
        let mut spans = Vec::new();
        let mut translations = translations.iter();

        for part in &self.parts {
            match part {
                FieldPart::Keep(text) => out.push_str(text),
                FieldPart::Translate {
                    prefix,
                    core,
                    suffix,
                } => {
                    out.push_str(prefix);
                    let translated = translations.next().map_or(core.as_str(), String::as_str);
                    let start = out.len();
                    out.push_str(translated);
                    spans.push((start, out.len()));
                    out.push_str(suffix);
                }
            }
        }

        // 从后往前插入，前面的下标保持有效
        for &(start, end) in spans.iter().rev() {
            if needs_word_break(&out[..end], &out[end..]) {
                out.insert(end, ' ');
            }
            if needs_word_break(&out[..start], &out[start..]) {
                out.insert(start, ' ');
            }
        }

        self.protected.restore(&out)
    }
}

/// 相接处一侧是英文单词、另一侧是单词或占位符时需要空格
fn needs_word_break(left: &str, right: &str) -> bool {
    let left_word = left.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    let right_word = right.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    (left_word && right_word)
        || (left_word && guard::starts_with_placeholder(right))
        || (right_word && guard::ends_with_placeholder(left))
}

/// 字段值中实际送去翻译（也是缓存键）的中文片段，按出现顺序
pub fn field_units(value: &str) -> Vec<String> {
    if !contains_cjk(value) {
        return Vec::new();
    }
    FieldSplit::new(value).units().map(str::to_string).collect()
}

/// 拆出首尾空白：(前导空白, 核心, 尾随空白)
fn split_whitespace_edges(text: &str) -> (&str, &str, &str) {
    let core = text.trim();
    if core.is_empty() {
        return (text, "", "");
    }
    let start = text.len() - text.trim_start().len();
    let end = start + core.len();
    (&text[..start], core, &text[end..])
}

/// 翻译服务主类
///
/// 通过构造函数注入翻译客户端、共享缓存和配置，不依赖任何全局状态。
///
/// # 示例
///
/// ```rust
/// use std::sync::Arc;
/// use blog_translator::{
///     CacheClass, JsonFileStore, MockMode, MockTranslator, TranslationCache,
///     TranslationConfig, TranslationService,
/// };
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = Arc::new(TranslationCache::new(
///     JsonFileStore::new(dir.path()),
///     chrono::Duration::days(30),
/// ));
/// cache.set(CacheClass::Tag, "en", "人工智能", "artificial-intelligence");
///
/// let service = TranslationService::new(
///     Arc::new(MockTranslator::new(MockMode::Tagged)),
///     cache,
///     TranslationConfig::default(),
/// );
/// let tags = tokio_test::block_on(
///     service.translate_tags(&["人工智能".to_string(), "Go".to_string()], "en"),
/// )
/// .unwrap();
/// assert_eq!(tags, vec!["artificial-intelligence", "go"]);
/// ```
pub struct TranslationService {
    client: Arc<dyn TranslationClient>,
    cache: Arc<TranslationCache>,
    config: TranslationConfig,
    rate_limiter: RateLimiter,
    cancel: CancelToken,
    stats: Mutex<TranslationStats>,
}

impl TranslationService {
    /// 创建新的翻译服务实例
    ///
    /// # 参数
    ///
    /// * `client` - 翻译客户端
    /// * `cache` - 共享的翻译缓存（需事先 `load()`）
    /// * `config` - 翻译配置，其中 `request_delay_ms` 决定调用间隔
    pub fn new(
        client: Arc<dyn TranslationClient>,
        cache: Arc<TranslationCache>,
        config: TranslationConfig,
    ) -> Self {
        Self {
            client,
            cache,
            rate_limiter: RateLimiter::new(Duration::from_millis(config.request_delay_ms)),
            config,
            cancel: CancelToken::never(),
            stats: Mutex::new(TranslationStats::default()),
        }
    }

    /// 设置取消令牌（网络调用与等待都可被取消）
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn stats(&self) -> TranslationStats {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        *self.lock_stats() = TranslationStats::default();
    }

    fn lock_stats(&self) -> MutexGuard<'_, TranslationStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<F: FnOnce(&mut TranslationStats)>(&self, update: F) {
        update(&mut self.lock_stats());
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        self.cancel.run(self.client.check_connectivity()).await?
    }

    /// 调用 API 翻译一段文本，不读写缓存
    ///
    /// 返回已清理并按类别格式化的译文。批量预热在全部完成后统一写缓存时使用。
    pub async fn resolve(&self, text: &str, class: CacheClass, target_lang: &str) -> Result<String> {
        self.resolve_checked(text, class, target_lang, &[]).await
    }

    async fn resolve_checked(
        &self,
        text: &str,
        class: CacheClass,
        target_lang: &str,
        required: &[&str],
    ) -> Result<String> {
        self.rate_limiter.acquire(&self.cancel).await?;

        let prompt = system_prompt(class, &self.config.source_lang, target_lang);
        let history = few_shot_history(class, target_lang);
        let outcome = self
            .cancel
            .run(self.client.translate(&prompt, &history, text, target_lang))
            .await;
        self.rate_limiter.mark();
        self.record(|s| s.api_calls += 1);

        let raw = outcome??;
        let cleaned = clean_output(&raw, text, class);
        if cleaned.is_empty() {
            return Err(TranslationError::EmptyResult);
        }
        if let Some(lost) = required.iter().find(|p| !cleaned.contains(*p)) {
            return Err(TranslationError::Parse(format!("译文丢失占位符 {lost}")));
        }

        Ok(match class {
            CacheClass::Tag | CacheClass::Slug => slugify(&cleaned),
            CacheClass::Category | CacheClass::Article => cleaned,
        })
    }

    /// 先查缓存，未命中再调用 API 并写入缓存
    async fn cached_or_resolve(
        &self,
        text: &str,
        class: CacheClass,
        target_lang: &str,
        required: &[&str],
    ) -> Result<String> {
        if let Some(hit) = self.cache.get(class, target_lang, text) {
            self.record(|s| s.cache_hits += 1);
            return Ok(hit);
        }
        let translated = self.resolve_checked(text, class, target_lang, required).await?;
        self.cache.set(class, target_lang, text, &translated);
        self.record(|s| s.translated += 1);
        Ok(translated)
    }

    /// 翻译单元；失败时回退为原文并计数，只有取消会向上传播
    async fn translate_or_fallback(
        &self,
        text: &str,
        class: CacheClass,
        target_lang: &str,
        required: &[&str],
    ) -> Result<String> {
        match self.cached_or_resolve(text, class, target_lang, required).await {
            Ok(translated) => Ok(translated),
            Err(TranslationError::Cancelled) => Err(TranslationError::Cancelled),
            Err(e) => {
                tracing::warn!("翻译失败，保留原文 \"{}\": {}", text, e);
                self.record(|s| {
                    s.failed += 1;
                    s.failures.push(text.to_string());
                });
                Ok(text.to_string())
            }
        }
    }

    /// 翻译一个字段值
    ///
    /// 不含中文时原样返回（不调用 API，也不访问缓存）。否则先保护 Markdown 语法，
    /// 再按中英混排切分，只翻译中文片段，最后按原顺序拼接并还原语法。
    ///
    /// # 参数
    ///
    /// * `value` - 字段值（标题、标签、分类等）
    /// * `class` - 缓存类别
    /// * `target_lang` - 目标语言代码
    pub async fn translate_field(
        &self,
        value: &str,
        class: CacheClass,
        target_lang: &str,
    ) -> Result<String> {
        if !contains_cjk(value) {
            self.record(|s| s.skipped += 1);
            return Ok(value.to_string());
        }

        let split = FieldSplit::new(value);
        let mut translations = Vec::new();
        for unit in split.units() {
            translations.push(
                self.translate_or_fallback(unit, class, target_lang, &[])
                    .await?,
            );
        }

        Ok(split.assemble(&translations))
    }

    /// 翻译单个标签并整理为 slug
    pub async fn translate_tag(&self, tag: &str, target_lang: &str) -> Result<String> {
        let translated = self
            .translate_field(tag.trim(), CacheClass::Tag, target_lang)
            .await?;
        Ok(slugify(&translated))
    }

    /// 翻译标签列表：已是英文的标签只做小写/slug 整理，结果去重并保持顺序
    pub async fn translate_tags(&self, tags: &[String], target_lang: &str) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let slug = self.translate_tag(tag, target_lang).await?;
            if !slug.is_empty() && !out.contains(&slug) {
                out.push(slug);
            }
        }
        Ok(out)
    }

    /// 根据标题生成 slug
    ///
    /// 翻译失败（结果仍含中文）时退回到词典 + 拼音的启发式 slug。
    pub async fn generate_slug(&self, title: &str, target_lang: &str) -> Result<String> {
        let title = title.trim();
        if !contains_cjk(title) {
            return Ok(slugify(title));
        }
        let translated = self
            .translate_or_fallback(title, CacheClass::Slug, target_lang, &[])
            .await?;
        let slug = slugify(&translated);
        if slug.is_empty() || contains_cjk(&slug) {
            return Ok(heuristic_slug(title));
        }
        Ok(slug)
    }

    /// 翻译一个正文单元（段落、标题正文、表格单元格等）
    ///
    /// 整段保护后作为一个整体发送，超长时按句子切块。译文丢失占位符时该段回退为原文。
    async fn translate_block(&self, text: &str, target_lang: &str) -> Result<String> {
        if !contains_cjk(text) {
            return Ok(text.to_string());
        }
        let (leading, core, trailing) = split_whitespace_edges(text);
        let protected = guard::protect(core);

        let mut parts = Vec::new();
        for chunk in markdown::split_long_text(&protected.text, self.config.max_text_length) {
            let (chunk_lead, chunk_core, chunk_trail) = split_whitespace_edges(&chunk);
            if !contains_cjk(chunk_core) {
                parts.push(chunk.clone());
                continue;
            }
            let required: Vec<&str> = protected
                .elements
                .iter()
                .map(|e| e.placeholder.as_str())
                .filter(|p| chunk_core.contains(*p))
                .collect();
            let translated = self
                .translate_or_fallback(chunk_core, CacheClass::Article, target_lang, &required)
                .await?;
            parts.push(format!("{chunk_lead}{translated}{chunk_trail}"));
        }

        let translated = splitter::join_runs(&parts);
        let missing = protected.missing_placeholders(&translated);
        if !missing.is_empty() {
            tracing::warn!("译文丢失占位符 {:?}，保留原文", missing);
            return Ok(text.to_string());
        }
        Ok(format!("{leading}{}{trailing}", protected.restore(&translated)))
    }

    async fn translate_table(&self, table: &str, newline: &str, target_lang: &str) -> Result<String> {
        let mut rows = Vec::new();
        for line in table.lines() {
            if !contains_cjk(line) {
                rows.push(line.to_string());
                continue;
            }
            let mut cells = Vec::new();
            for cell in line.split('|') {
                cells.push(self.translate_block(cell, target_lang).await?);
            }
            rows.push(cells.join("|"));
        }
        Ok(rows.join(newline))
    }

    /// 翻译文章正文
    ///
    /// 代码块和不含中文的段落原样保留；标题、列表、引用保留结构标记只翻译正文；
    /// 表格逐个单元格翻译。
    pub async fn translate_body(&self, body: &str, target_lang: &str) -> Result<String> {
        let mut segments = markdown::segment(body);
        tracing::info!("正文共 {} 段", segments.len());

        for segment in segments.iter_mut() {
            if !segment.translatable {
                continue;
            }
            let translated = match segment.kind {
                SegmentKind::Code | SegmentKind::HorizontalRule | SegmentKind::LinkDefinition => {
                    continue
                }
                SegmentKind::Table => {
                    self.translate_table(&segment.content, segment.line_ending.as_str(), target_lang)
                        .await?
                }
                SegmentKind::Heading | SegmentKind::List | SegmentKind::Quote => {
                    let (marker, prose) = markdown::split_block_marker(segment);
                    let marker = marker.to_string();
                    let prose = prose.to_string();
                    format!("{marker}{}", self.translate_block(&prose, target_lang).await?)
                }
                SegmentKind::Text | SegmentKind::Html => {
                    self.translate_block(&segment.content, target_lang).await?
                }
            };
            segment.content = translated;
        }

        let mut out = markdown::join(&segments);
        if !out.is_empty() {
            // 还原结尾的换行
            out.push_str(&body[body.trim_end_matches(['\r', '\n']).len()..]);
        }
        Ok(out)
    }

    async fn translate_rule_value(
        &self,
        value: &str,
        rule: &FieldRule,
        target_lang: &str,
    ) -> Result<String> {
        let translated = self.translate_field(value, rule.class, target_lang).await?;
        Ok(match rule.format {
            FieldFormat::Slug => slugify(&translated),
            FieldFormat::Text => translated,
        })
    }

    /// 按字段表翻译 front matter
    ///
    /// 只处理字段表中标记为可翻译的键，其余键（包括未知键）原样保留。
    pub async fn translate_front_matter(&self, doc: &mut Document, target_lang: &str) -> Result<()> {
        for rule in FIELD_RULES.iter().filter(|rule| rule.translate) {
            let Some(raw) = doc.get_raw(rule.name) else {
                continue;
            };

            match rule.kind {
                FieldKind::Scalar => {
                    let value = decode_scalar(raw);
                    if !contains_cjk(&value) {
                        continue;
                    }
                    let translated = self.translate_rule_value(&value, rule, target_lang).await?;
                    doc.set_scalar(rule.name, &translated);
                }
                FieldKind::Array => {
                    let Some(items) = decode_list(raw) else {
                        tracing::warn!("字段 {} 不是列表，跳过", rule.name);
                        continue;
                    };
                    let mut translated: Vec<String> = Vec::with_capacity(items.len());
                    for item in &items {
                        let value = self.translate_rule_value(item, rule, target_lang).await?;
                        if !value.is_empty() && !translated.contains(&value) {
                            translated.push(value);
                        }
                    }
                    doc.set_list(rule.name, &translated);
                }
            }
        }
        Ok(())
    }

    /// 翻译整篇文档
    ///
    /// 翻译 front matter 与正文；启用 `generate_slug` 且文档没有 `slug` 时，根据中文标题生成。
    pub async fn translate_document(&self, doc: &Document, target_lang: &str) -> Result<Document> {
        let mut out = doc.clone();

        if self.config.generate_slug && doc.get_raw("slug").is_none() {
            if let Some(title) = doc.scalar("title").filter(|t| contains_cjk(t)) {
                let slug = self.generate_slug(&title, target_lang).await?;
                out.set_scalar("slug", &slug);
            }
        }

        self.translate_front_matter(&mut out, target_lang).await?;
        out.body = self.translate_body(&doc.body, target_lang).await?;

        tracing::info!("文档翻译完成: {}", self.stats().summary());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::JsonFileStore;
    use crate::cancel::cancel_pair;
    use crate::mock::{MockMode, MockTranslator};

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: Arc<TranslationCache>,
        mock: Arc<MockTranslator>,
        service: TranslationService,
    }

    fn fixture(mock: MockTranslator) -> Fixture {
        fixture_with_delay(mock, 0)
    }

    fn fixture_with_delay(mock: MockTranslator, request_delay_ms: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TranslationCache::new(
            JsonFileStore::new(dir.path()),
            chrono::Duration::days(30),
        ));
        let mock = Arc::new(mock);
        let config = TranslationConfig {
            request_delay_ms,
            ..TranslationConfig::default()
        };
        let service = TranslationService::new(mock.clone(), cache.clone(), config);
        Fixture {
            _dir: dir,
            cache,
            mock,
            service,
        }
    }

    #[tokio::test]
    async fn test_field_without_cjk_is_untouched() {
        let f = fixture(MockTranslator::new(MockMode::Tagged));
        let out = f
            .service
            .translate_field("Hello **Go**", CacheClass::Article, "en")
            .await
            .unwrap();
        assert_eq!(out, "Hello **Go**");
        assert_eq!(f.mock.call_count(), 0);
        assert_eq!(f.cache.stats(CacheClass::Article).total, 0);
    }

    #[tokio::test]
    async fn test_only_cjk_runs_are_sent() {
        let f = fixture(MockTranslator::with_mappings([("使用", "Using"), ("语言", "language")]));
        let out = f
            .service
            .translate_field("使用 Go 语言", CacheClass::Article, "en")
            .await
            .unwrap();
        assert_eq!(out, "Using Go language");
        assert_eq!(f.mock.requests(), vec!["使用", "语言"]);
    }

    #[tokio::test]
    async fn test_bold_span_survives_field_translation() {
        let f = fixture(MockTranslator::with_mappings([
            ("这是", "This is"),
            ("的", "the"),
            ("代码", "code"),
        ]));
        let out = f
            .service
            .translate_field("这是**重要**的 Go 代码", CacheClass::Article, "en")
            .await
            .unwrap();
        assert_eq!(out, "This is **重要** the Go code");
        assert!(f.mock.requests().iter().all(|r| !r.contains("**")));
    }

    #[tokio::test]
    async fn test_inline_code_keeps_word_boundaries() {
        let f = fixture(MockTranslator::with_mappings([("使用", "Using"), ("语言", "language")]));
        let out = f
            .service
            .translate_field("使用`Go`语言", CacheClass::Article, "en")
            .await
            .unwrap();
        assert_eq!(out, "Using `Go` language");
        assert_eq!(f.mock.requests(), vec!["使用", "语言"]);
    }

    #[test]
    fn test_field_split_assembles_with_missing_translations() {
        let split = FieldSplit::new("这是**重要**的说明");
        assert_eq!(split.units().collect::<Vec<_>>(), vec!["这是", "的说明"]);
        assert_eq!(
            split.assemble(&["This is".to_string(), "a note".to_string()]),
            "This is **重要** a note"
        );
        assert_eq!(split.assemble(&["This is".to_string()]), "This is **重要**的说明");
        assert_eq!(split.assemble(&[]), "这是**重要**的说明");
    }

    #[tokio::test]
    async fn test_second_translation_hits_cache() {
        let f = fixture(MockTranslator::with_mappings([("你好世界", "Hello world")]));
        let first = f.service.translate_field("你好世界", CacheClass::Article, "en").await.unwrap();
        let second = f.service.translate_field("你好世界", CacheClass::Article, "en").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.mock.call_count(), 1);
        let stats = f.service.stats();
        assert_eq!(stats.api_calls, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_failed_run_falls_back_and_continues() {
        let f = fixture(MockTranslator::with_mappings([("语言", "language")]).failing_on("使用"));
        let out = f
            .service
            .translate_field("使用 Go 语言", CacheClass::Article, "en")
            .await
            .unwrap();
        assert_eq!(out, "使用 Go language");
        let stats = f.service.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures, vec!["使用".to_string()]);
        assert_eq!(f.cache.get(CacheClass::Article, "en", "使用"), None);
    }

    #[tokio::test]
    async fn test_tags_scenario_uses_cache_and_slugs() {
        let f = fixture(MockTranslator::new(MockMode::Tagged));
        f.cache.set(CacheClass::Tag, "en", "人工智能", "artificial-intelligence");

        let tags = f
            .service
            .translate_tags(&["人工智能".to_string(), "Go".to_string(), "go".to_string()], "en")
            .await
            .unwrap();
        assert_eq!(tags, vec!["artificial-intelligence", "go"]);
        assert_eq!(f.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tag_translation_is_slugged_before_caching() {
        let f = fixture(MockTranslator::with_mappings([("机器学习", "\"Machine Learning\"")]));
        let tag = f.service.translate_tag("机器学习", "en").await.unwrap();
        assert_eq!(tag, "machine-learning");
        assert_eq!(
            f.cache.get(CacheClass::Tag, "en", "机器学习"),
            Some("machine-learning".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_slug_falls_back_to_heuristic() {
        let f = fixture(MockTranslator::new(MockMode::Error("down".into())));
        let slug = f.service.generate_slug("机器学习入门", "en").await.unwrap();
        assert_eq!(slug, "machine-learning-getting-started");
    }

    #[tokio::test]
    async fn test_body_keeps_code_and_markers() {
        let f = fixture(MockTranslator::new(MockMode::Tagged));
        let body = "## 介绍\n\n这是 `main` 函数。\n\n```rust\n// 中文注释\nfn main() {}\n```\n\n- 第一项\n> 引用\n\nEnglish only.\n";
        let out = f.service.translate_body(body, "en").await.unwrap();
        assert_eq!(
            out,
            "## [en]介绍\n\n[en]这是 `main` 函数。\n\n```rust\n// 中文注释\nfn main() {}\n```\n\n- [en]第一项\n> [en]引用\n\nEnglish only.\n"
        );
        assert!(f.mock.requests().contains(&"这是 __INLINE_CODE_0__ 函数。".to_string()));
    }

    #[tokio::test]
    async fn test_body_table_cells() {
        let f = fixture(MockTranslator::with_mappings([("名称", "Name"), ("说明", "Description")]));
        let out = f
            .service
            .translate_body("| 名称 | 说明 |\n|---|---|\n| a | b |", "en")
            .await
            .unwrap();
        assert_eq!(out, "| Name | Description |\n|---|---|\n| a | b |");
    }

    #[tokio::test]
    async fn test_body_keeps_crlf_line_endings() {
        let f = fixture(MockTranslator::new(MockMode::Tagged));
        let body = "## 介绍\r\n\r\n| 名称 | 说明 |\r\n|---|---|\r\n\r\n```\r\n代码\r\n```\r\n";
        let out = f.service.translate_body(body, "en").await.unwrap();
        assert_eq!(
            out,
            "## [en]介绍\r\n\r\n| [en]名称 | [en]说明 |\r\n|---|---|\r\n\r\n```\r\n代码\r\n```\r\n"
        );
    }

    #[tokio::test]
    async fn test_body_keeps_trailing_blank_lines() {
        let f = fixture(MockTranslator::new(MockMode::Tagged));
        let out = f.service.translate_body("段落\n\n", "en").await.unwrap();
        assert_eq!(out, "[en]段落\n\n");
    }

    #[tokio::test]
    async fn test_lost_placeholder_keeps_original_segment() {
        let f = fixture(MockTranslator::with_mappings([(
            "点击__LINK_0__查看",
            "Click to view",
        )]));
        let body = "点击[这里](https://example.com)查看";
        let out = f.service.translate_body(body, "en").await.unwrap();
        assert_eq!(out, body);
        assert_eq!(f.cache.stats(CacheClass::Article).total, 0);
        assert_eq!(f.service.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_front_matter_table() {
        let f = fixture(MockTranslator::with_mappings([
            ("我的第一篇文章", "My First Post"),
            ("技术", "Technology"),
        ]));
        f.cache.set(CacheClass::Tag, "en", "人工智能", "artificial-intelligence");

        let mut doc = Document::parse(
            "---\ntitle: 我的第一篇文章\ndate: 2024-01-01\ntags: [人工智能, Go]\ncategories: [技术]\nweight: 10\n---\n正文\n",
        )
        .unwrap();
        f.service.translate_front_matter(&mut doc, "en").await.unwrap();

        assert_eq!(
            doc.render(),
            "---\ntitle: My First Post\ndate: 2024-01-01\ntags: [\"artificial-intelligence\", \"go\"]\ncategories: [\"Technology\"]\nweight: 10\n---\n正文\n"
        );
    }

    #[tokio::test]
    async fn test_translate_document_generates_slug() {
        let f = fixture(MockTranslator::with_mappings([
            ("我的第一篇文章", "My First Post"),
            ("正文", "Body"),
        ]));
        let doc = Document::parse("---\ntitle: 我的第一篇文章\n---\n正文\n").unwrap();
        let out = f.service.translate_document(&doc, "en").await.unwrap();

        assert_eq!(out.scalar("title").unwrap(), "My First Post");
        assert_eq!(out.scalar("slug").unwrap(), "my-first-post");
        assert_eq!(out.body, "Body\n");
    }

    #[tokio::test]
    async fn test_cancellation_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(TranslationCache::new(
            JsonFileStore::new(dir.path()),
            chrono::Duration::days(30),
        ));
        let mock = Arc::new(MockTranslator::new(MockMode::Tagged).with_delay(Duration::from_secs(30)));
        let (handle, token) = cancel_pair();
        let service = TranslationService::new(mock, cache.clone(), TranslationConfig::default())
            .with_cancel_token(token);

        let task = tokio::spawn(async move {
            service.translate_field("你好", CacheClass::Article, "en").await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TranslationError::Cancelled)));
        assert_eq!(cache.stats(CacheClass::Article).total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let cancel = CancelToken::never();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        limiter.mark();
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hits_skip_request_delay() {
        let f = fixture_with_delay(MockTranslator::new(MockMode::Tagged), 500);
        let first = f.service.translate_field("你好", CacheClass::Article, "en").await.unwrap();
        let start = Instant::now();

        let cached = f.service.translate_field("你好", CacheClass::Article, "en").await.unwrap();
        assert_eq!(cached, first);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(f.mock.call_count(), 1);

        f.service.translate_field("世界", CacheClass::Article, "en").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(f.mock.call_count(), 2);
        assert_eq!(f.service.stats().cache_hits, 1);
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(
            clean_output("<think>hmm</think>\nTranslation: \"Hello\"", "你好", CacheClass::Article),
            "Hello"
        );
        assert_eq!(clean_output("「machine-learning」\nexplanation", "机器学习", CacheClass::Tag), "machine-learning");
        assert_eq!(clean_output("```markdown\n# Title\n```", "# 标题", CacheClass::Article), "# Title");
        assert_eq!(clean_output("\"Quoted\"", "\"引用\"", CacheClass::Article), "\"Quoted\"");
    }

    #[test]
    fn test_field_units_match_translated_runs() {
        assert_eq!(field_units("使用 **Go** 语言"), vec!["使用", "语言"]);
        assert_eq!(field_units("人工智能"), vec!["人工智能"]);
        assert!(field_units("Rust").is_empty());
    }

    #[test]
    fn test_prompts_mention_language() {
        assert!(system_prompt(CacheClass::Article, "zh", "ja").contains("Chinese Markdown text into Japanese"));
        assert!(system_prompt(CacheClass::Tag, "zh", "en").contains("hyphens"));
        assert_eq!(few_shot_history(CacheClass::Tag, "en").len(), 2);
        assert!(few_shot_history(CacheClass::Tag, "fr").is_empty());
    }
}
