//! 批量缓存预热
//!
//! 在逐篇翻译之前，把所有文章的标签、分类和标题收集起来，
//! 先一次性划分出缓存命中与未命中，再只为未命中项调用 API，
//! 最后一次性写回缓存并保存。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::{CacheClass, TranslationCache};
use crate::document::Document;
use crate::error::{Result, TranslationError};
use crate::slug::heuristic_slug;
use crate::splitter::contains_cjk;
use crate::translator::{field_units, FieldSplit, TranslationService};

/// 批量计划
///
/// `hits` 与 `misses` 合起来恰好覆盖去重后的全部输入文本。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePlan {
    /// 可直接得到结果的 (原文, 译文)，按首次出现顺序
    ///
    /// 译文与逐字段翻译拼出的结果相同；不含中文的文本映射到自身。
    pub hits: Vec<(String, String)>,
    /// 仍有中文片段未缓存的原文，按首次出现顺序
    pub misses: Vec<String>,
    /// 原文 → 出现它的来源（如文件名），仅用于报告
    pub provenance: HashMap<String, Vec<String>>,
}

impl CachePlan {
    /// 去重后的输入文本总数（命中 + 未命中）
    pub fn len(&self) -> usize {
        self.hits.len() + self.misses.len()
    }

    /// 文本的来源列表；未记录时为空
    pub fn sources(&self, text: &str) -> &[String] {
        self.provenance.get(text).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 预热结果
///
/// `translated` 与 `failed` 按缓存键（中文片段或整个标题）记录，`fallback` 按原文记录。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    /// 翻译成功并写入缓存的 (缓存键, 译文)
    pub translated: Vec<(String, String)>,
    /// 翻译失败的缓存键（未写缓存）
    pub failed: Vec<String>,
    /// 服务不可达时使用启发式 slug 的 (原文, 回退值)，不写缓存
    pub fallback: Vec<(String, String)>,
}

/// 批量输入：每项为 (文本, 来源)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub tags: Vec<(String, String)>,
    pub categories: Vec<(String, String)>,
    pub titles: Vec<(String, String)>,
}

/// 从已解析的文章中收集标签、分类和标题
pub fn collect_corpus(documents: &[(String, Document)]) -> Corpus {
    let mut corpus = Corpus::default();
    for (name, doc) in documents {
        for tag in doc.list("tags").unwrap_or_default() {
            corpus.tags.push((tag, name.clone()));
        }
        for category in doc.list("categories").unwrap_or_default() {
            corpus.categories.push((category, name.clone()));
        }
        if let Some(title) = doc.scalar("title") {
            corpus.titles.push((title, name.clone()));
        }
    }
    corpus
}

/// 批量缓存规划器
pub struct BulkCachePlanner {
    cache: Arc<TranslationCache>,
}

impl BulkCachePlanner {
    pub fn new(cache: Arc<TranslationCache>) -> Self {
        Self { cache }
    }

    /// 一次遍历划分命中与未命中
    ///
    /// 按输入文本去重并保持原顺序。文本的全部中文片段都已缓存时为命中，
    /// 空文本和不含中文的文本直接命中。
    pub fn plan<S: AsRef<str>>(&self, texts: &[S], lang: &str, class: CacheClass) -> CachePlan {
        let items: Vec<(&str, Option<&str>)> = texts.iter().map(|t| (t.as_ref(), None)).collect();
        self.build(&items, lang, class)
    }

    /// 与 [`plan`](Self::plan) 相同，并记录每个文本的来源
    pub fn plan_with_provenance(
        &self,
        items: &[(String, String)],
        lang: &str,
        class: CacheClass,
    ) -> CachePlan {
        let items: Vec<(&str, Option<&str>)> = items
            .iter()
            .map(|(text, source)| (text.as_str(), Some(source.as_str())))
            .collect();
        self.build(&items, lang, class)
    }

    fn build(&self, items: &[(&str, Option<&str>)], lang: &str, class: CacheClass) -> CachePlan {
        let mut plan = CachePlan::default();
        let mut seen = HashSet::new();

        for &(text, source) in items {
            if let Some(source) = source {
                let sources = plan.provenance.entry(text.to_string()).or_default();
                if !sources.iter().any(|s| s == source) {
                    sources.push(source.to_string());
                }
            }
            if !seen.insert(text) {
                continue;
            }
            match self.lookup(text, lang, class) {
                Some(translation) => plan.hits.push((text.to_string(), translation)),
                None => plan.misses.push(text.to_string()),
            }
        }

        tracing::info!(
            "{} 缓存计划: {} 命中, {} 待翻译",
            class.as_str(),
            plan.hits.len(),
            plan.misses.len()
        );
        plan
    }

    /// 所有缓存键都命中时，返回逐篇翻译会拼出的结果
    fn lookup(&self, text: &str, lang: &str, class: CacheClass) -> Option<String> {
        if class == CacheClass::Slug {
            let title = text.trim();
            if !contains_cjk(title) {
                return Some(title.to_string());
            }
            return self.cache.get(class, lang, title);
        }

        let split = FieldSplit::new(text);
        let translations = split
            .units()
            .map(|unit| self.cache.get(class, lang, unit))
            .collect::<Option<Vec<_>>>()?;
        Some(split.assemble(&translations))
    }
}

/// 与逐篇翻译时相同的缓存键：slug 取整个标题，其余按中文片段
fn cache_keys(text: &str, class: CacheClass) -> Vec<String> {
    match class {
        CacheClass::Slug => {
            let title = text.trim();
            if contains_cjk(title) {
                vec![title.to_string()]
            } else {
                Vec::new()
            }
        }
        _ => field_units(text),
    }
}

/// 未命中文本中尚未缓存的键，去重并记下各自所属的原文
fn pending_keys(
    cache: &TranslationCache,
    misses: &[String],
    class: CacheClass,
    lang: &str,
) -> Vec<(String, Vec<String>)> {
    let mut pending: Vec<(String, Vec<String>)> = Vec::new();
    for text in misses {
        for key in cache_keys(text, class) {
            if let Some((_, owners)) = pending.iter_mut().find(|(k, _)| *k == key) {
                if !owners.contains(text) {
                    owners.push(text.clone());
                }
                continue;
            }
            if cache.get(class, lang, &key).is_none() {
                pending.push((key, vec![text.clone()]));
            }
        }
    }
    pending
}

fn heuristic_fallback(misses: &[String]) -> Vec<(String, String)> {
    misses
        .iter()
        .map(|text| (text.clone(), heuristic_slug(text)))
        .collect()
}

fn commit(service: &TranslationService, class: CacheClass, lang: &str, report: &WarmReport) -> Result<()> {
    let cache = service.cache();
    cache.set_batch(class, lang, report.translated.iter().cloned());
    cache.save()
}

/// 为计划中的未命中项预热缓存
///
/// 先做一次连通性检查：不可达时所有未命中项使用启发式 slug 回退，不写缓存。
/// 否则逐个翻译未命中文本中尚未缓存的键（去重，不经缓存），成功项最后一次性写入并保存。
/// 中途取消时先提交已完成的部分，再返回 [`TranslationError::Cancelled`]。
pub async fn warm(
    service: &TranslationService,
    plan: &CachePlan,
    class: CacheClass,
    lang: &str,
) -> Result<WarmReport> {
    let mut report = WarmReport::default();
    if plan.misses.is_empty() {
        return Ok(report);
    }

    match service.check_connectivity().await {
        Ok(()) => {}
        Err(TranslationError::Cancelled) => return Err(TranslationError::Cancelled),
        Err(e) => {
            tracing::warn!("翻译服务不可达，{} 项使用启发式回退: {}", plan.misses.len(), e);
            report.fallback = heuristic_fallback(&plan.misses);
            return Ok(report);
        }
    }

    let pending = pending_keys(service.cache(), &plan.misses, class, lang);
    for (i, (key, owners)) in pending.iter().enumerate() {
        match service.resolve(key, class, lang).await {
            Ok(translation) => {
                tracing::debug!("[{}/{}] {} → {}", i + 1, pending.len(), key, translation);
                report.translated.push((key.clone(), translation));
            }
            Err(TranslationError::Cancelled) => {
                tracing::warn!("预热被取消，提交已完成的 {} 项", report.translated.len());
                commit(service, class, lang, &report)?;
                return Err(TranslationError::Cancelled);
            }
            Err(e) if e.is_connectivity() => {
                tracing::warn!("翻译服务中途断开，剩余项使用启发式回退: {}", e);
                let mut stranded: Vec<String> = Vec::new();
                for (_, owners) in &pending[i..] {
                    for owner in owners {
                        if !stranded.contains(owner) {
                            stranded.push(owner.clone());
                        }
                    }
                }
                report.fallback = heuristic_fallback(&stranded);
                break;
            }
            Err(e) => {
                let sources: Vec<&String> = owners.iter().flat_map(|text| plan.sources(text)).collect();
                tracing::warn!("翻译失败 \"{}\" (来源 {:?}): {}", key, sources, e);
                report.failed.push(key.clone());
            }
        }
    }

    commit(service, class, lang, &report)?;
    tracing::info!(
        "预热完成: {} 成功, {} 失败, {} 回退",
        report.translated.len(),
        report.failed.len(),
        report.fallback.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::JsonFileStore;
    use crate::cancel::cancel_pair;
    use crate::mock::{MockMode, MockTranslator};
    use crate::types::TranslationConfig;
    use std::time::Duration;

    fn cache_in(dir: &tempfile::TempDir) -> Arc<TranslationCache> {
        Arc::new(TranslationCache::new(
            JsonFileStore::new(dir.path()),
            chrono::Duration::days(30),
        ))
    }

    fn service(cache: Arc<TranslationCache>, mock: Arc<MockTranslator>) -> TranslationService {
        let config = TranslationConfig {
            request_delay_ms: 0,
            ..TranslationConfig::default()
        };
        TranslationService::new(mock, cache, config)
    }

    #[test]
    fn test_plan_partitions_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.set(CacheClass::Tag, "en", "人工智能", "artificial-intelligence");

        let planner = BulkCachePlanner::new(cache);
        let plan = planner.plan(
            &["编程", "人工智能", "Rust", "", "编程", "数据库"],
            "en",
            CacheClass::Tag,
        );

        assert_eq!(
            plan.hits,
            vec![
                ("人工智能".to_string(), "artificial-intelligence".to_string()),
                ("Rust".to_string(), "Rust".to_string()),
                (String::new(), String::new()),
            ]
        );
        assert_eq!(plan.misses, vec!["编程", "数据库"]);
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_plan_covers_every_input_text() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.set(CacheClass::Tag, "en", "语言", "language");

        let inputs = ["Rust", "Go 语言", "人工智能", "Go 语言", "使用 Go 编程"];
        let plan = BulkCachePlanner::new(cache).plan(&inputs, "en", CacheClass::Tag);

        assert_eq!(
            plan.hits,
            vec![
                ("Rust".to_string(), "Rust".to_string()),
                ("Go 语言".to_string(), "Go language".to_string()),
            ]
        );
        assert_eq!(plan.misses, vec!["人工智能", "使用 Go 编程"]);

        let mut covered: Vec<&str> = plan.hits.iter().map(|(text, _)| text.as_str()).collect();
        covered.extend(plan.misses.iter().map(String::as_str));
        covered.sort_unstable();
        let mut expected = vec!["Rust", "Go 语言", "人工智能", "使用 Go 编程"];
        expected.sort_unstable();
        assert_eq!(covered, expected);
    }

    #[test]
    fn test_plan_records_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let planner = BulkCachePlanner::new(cache_in(&dir));
        let items = vec![
            ("编程".to_string(), "a.md".to_string()),
            ("编程".to_string(), "b.md".to_string()),
            ("编程".to_string(), "a.md".to_string()),
        ];
        let plan = planner.plan_with_provenance(&items, "en", CacheClass::Tag);
        assert_eq!(plan.misses, vec!["编程"]);
        assert_eq!(plan.sources("编程"), ["a.md".to_string(), "b.md".to_string()]);
        assert!(plan.sources("其他").is_empty());
    }

    #[test]
    fn test_slug_plan_keys_whole_title() {
        let dir = tempfile::tempdir().unwrap();
        let planner = BulkCachePlanner::new(cache_in(&dir));
        let plan = planner.plan(&[" Rust 入门 ", "English Title"], "en", CacheClass::Slug);
        assert_eq!(plan.misses, vec![" Rust 入门 "]);
        assert_eq!(
            plan.hits,
            vec![("English Title".to_string(), "English Title".to_string())]
        );

        planner.cache.set(CacheClass::Slug, "en", "Rust 入门", "getting-started-with-rust");
        let plan = planner.plan(&[" Rust 入门 "], "en", CacheClass::Slug);
        assert_eq!(
            plan.hits,
            vec![(" Rust 入门 ".to_string(), "getting-started-with-rust".to_string())]
        );
    }

    #[test]
    fn test_collect_corpus() {
        let a = Document::parse("---\ntitle: 第一篇\ntags: [编程, Go]\ncategories: [技术]\n---\n").unwrap();
        let b = Document::parse("---\ntitle: Second\ntags:\n  - 编程\n---\n").unwrap();
        let corpus = collect_corpus(&[("a.md".to_string(), a), ("b.md".to_string(), b)]);

        assert_eq!(corpus.tags.len(), 3);
        assert_eq!(corpus.tags[2], ("编程".to_string(), "b.md".to_string()));
        assert_eq!(corpus.categories, vec![("技术".to_string(), "a.md".to_string())]);
        assert_eq!(corpus.titles.len(), 2);
    }

    #[tokio::test]
    async fn test_warm_commits_once_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mock = Arc::new(MockTranslator::with_mappings([
            ("编程", "Programming"),
            ("数据库", "Database"),
        ]));
        let service = service(cache.clone(), mock.clone());

        let plan = BulkCachePlanner::new(cache.clone()).plan(&["编程", "数据库"], "en", CacheClass::Tag);
        let report = warm(&service, &plan, CacheClass::Tag, "en").await.unwrap();

        assert_eq!(
            report.translated,
            vec![
                ("编程".to_string(), "programming".to_string()),
                ("数据库".to_string(), "database".to_string()),
            ]
        );
        assert_eq!(mock.call_count(), 2);
        assert!(!cache.is_dirty());
        assert!(dir.path().join("tag_cache.json").exists());

        let tags = service
            .translate_tags(&["编程".to_string(), "数据库".to_string()], "en")
            .await
            .unwrap();
        assert_eq!(tags, vec!["programming", "database"]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_warm_translates_only_uncached_keys_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.set(CacheClass::Category, "en", "语言", "Language");
        let mock = Arc::new(MockTranslator::with_mappings([("数据库", "Database")]));
        let service = service(cache.clone(), mock.clone());

        let planner = BulkCachePlanner::new(cache.clone());
        let plan = planner.plan(&["Go 数据库", "数据库", "语言 Go 数据库"], "en", CacheClass::Category);
        assert_eq!(plan.misses.len(), 3);

        let report = warm(&service, &plan, CacheClass::Category, "en").await.unwrap();
        assert_eq!(report.translated, vec![("数据库".to_string(), "Database".to_string())]);
        assert_eq!(mock.requests(), vec!["数据库"]);

        let plan = planner.plan(&["Go 数据库", "语言 Go 数据库"], "en", CacheClass::Category);
        assert!(plan.misses.is_empty());
        assert_eq!(
            plan.hits,
            vec![
                ("Go 数据库".to_string(), "Go Database".to_string()),
                ("语言 Go 数据库".to_string(), "Language Go Database".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mock = Arc::new(MockTranslator::new(MockMode::Unreachable));
        let service = service(cache.clone(), mock.clone());

        let plan = BulkCachePlanner::new(cache.clone()).plan(&["人工智能", "你好"], "en", CacheClass::Slug);
        let report = warm(&service, &plan, CacheClass::Slug, "en").await.unwrap();

        assert_eq!(
            report.fallback,
            vec![
                ("人工智能".to_string(), "artificial-intelligence".to_string()),
                ("你好".to_string(), "ni-hao".to_string()),
            ]
        );
        assert_eq!(mock.call_count(), 0);
        assert_eq!(cache.stats(CacheClass::Slug).total, 0);
        assert!(!dir.path().join("slug_cache.json").exists());
    }

    #[tokio::test]
    async fn test_failed_items_are_reported_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mock = Arc::new(MockTranslator::new(MockMode::Tagged).failing_on("数据库"));
        let service = service(cache.clone(), mock);

        let plan = BulkCachePlanner::new(cache.clone()).plan(&["编程", "数据库"], "en", CacheClass::Category);
        let report = warm(&service, &plan, CacheClass::Category, "en").await.unwrap();

        assert_eq!(report.failed, vec!["数据库"]);
        assert_eq!(report.translated.len(), 1);
        assert!(cache.get(CacheClass::Category, "en", "数据库").is_none());
        assert!(cache.get(CacheClass::Category, "en", "编程").is_some());
    }

    #[tokio::test]
    async fn test_cancel_commits_resolved_items() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let mock = Arc::new(
            MockTranslator::with_mappings([("编程", "programming")]).with_delay(Duration::from_millis(100)),
        );
        let (handle, token) = cancel_pair();
        let config = TranslationConfig {
            request_delay_ms: 0,
            ..TranslationConfig::default()
        };
        let service = TranslationService::new(mock, cache.clone(), config).with_cancel_token(token);
        let plan = BulkCachePlanner::new(cache.clone()).plan(&["编程", "数据库"], "en", CacheClass::Tag);

        let task = tokio::spawn(async move { warm(&service, &plan, CacheClass::Tag, "en").await });
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TranslationError::Cancelled)));
        assert_eq!(
            cache.get(CacheClass::Tag, "en", "编程"),
            Some("programming".to_string())
        );
        assert!(cache.get(CacheClass::Tag, "en", "数据库").is_none());
        assert!(!cache.is_dirty());
    }
}
