//! 翻译缓存模块
//!
//! 按内容类别（标签 / slug / 分类 / 正文）分区的持久化翻译缓存，带过期时间。
//! 每个类别对应一个 JSON 文件，写入通过临时文件 + 重命名完成，
//! 进程在写入途中崩溃也不会破坏上一次的有效缓存。

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TranslationError};
use crate::types::CacheConfig;

/// 缓存类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheClass {
    Tag,
    Slug,
    Category,
    Article,
}

impl CacheClass {
    pub const ALL: [CacheClass; 4] = [
        CacheClass::Tag,
        CacheClass::Slug,
        CacheClass::Category,
        CacheClass::Article,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheClass::Tag => "tag",
            CacheClass::Slug => "slug",
            CacheClass::Category => "category",
            CacheClass::Article => "article",
        }
    }

    /// 该类别的缓存文件名
    pub fn file_name(self) -> String {
        format!("{}_cache.json", self.as_str())
    }
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub translation: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub class: CacheClass,
}

impl CacheEntry {
    pub fn new(translation: String, class: CacheClass) -> Self {
        Self {
            translation,
            timestamp: Utc::now(),
            class,
        }
    }

    /// 检查条目是否过期
    pub fn is_expired(&self, expiry: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp > expiry
    }
}

/// 单个类别文件的内容：`"{lang}:{text}"` → 条目
pub type ClassEntries = HashMap<String, CacheEntry>;

/// 缓存持久化后端
pub trait CacheStore: Send + Sync {
    /// 读取类别文件；文件不存在时返回空表
    fn load_class_file(&self, class: CacheClass) -> Result<ClassEntries>;

    /// 原子地写入类别文件
    fn save_class_file(&self, class: CacheClass, entries: &ClassEntries) -> Result<()>;
}

/// 基于 JSON 文件的缓存存储
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, class: CacheClass) -> PathBuf {
        self.dir.join(class.file_name())
    }
}

impl CacheStore for JsonFileStore {
    fn load_class_file(&self, class: CacheClass) -> Result<ClassEntries> {
        let path = self.path_for(class);
        if !path.exists() {
            return Ok(ClassEntries::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| TranslationError::filesystem(&path, e))?;
        if content.trim().is_empty() {
            return Ok(ClassEntries::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save_class_file(&self, class: CacheClass, entries: &ClassEntries) -> Result<()> {
        let path = self.path_for(class);
        fs::create_dir_all(&self.dir).map_err(|e| TranslationError::filesystem(&self.dir, e))?;

        // 先完整序列化，再写入同目录下的临时文件，最后重命名覆盖
        let content = serde_json::to_vec_pretty(entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| TranslationError::filesystem(&self.dir, e))?;
        tmp.write_all(&content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| TranslationError::filesystem(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| TranslationError::filesystem(&path, e.error))?;
        Ok(())
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
}

#[derive(Default)]
struct CacheState {
    classes: HashMap<CacheClass, ClassEntries>,
    dirty: HashSet<CacheClass>,
}

impl CacheState {
    fn class_mut(&mut self, class: CacheClass) -> &mut ClassEntries {
        self.classes.entry(class).or_default()
    }
}

/// 翻译缓存
///
/// 所有条目由缓存自身持有，调用方只能按值读写。过期条目在读取时惰性删除，
/// 对调用方而言与未命中无异。
pub struct TranslationCache {
    store: Box<dyn CacheStore>,
    expiry: Duration,
    state: Mutex<CacheState>,
}

fn cache_key(lang: &str, text: &str) -> String {
    format!("{lang}:{text}")
}

impl TranslationCache {
    /// 使用指定存储和过期时间创建缓存
    pub fn new(store: impl CacheStore + 'static, expiry: Duration) -> Self {
        Self {
            store: Box::new(store),
            expiry,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// 根据配置创建基于 JSON 文件的缓存（尚未加载）
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            JsonFileStore::new(&config.dir),
            Duration::days(config.expiry_days),
        )
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 读取缓存；不存在或已过期时返回 `None`，过期条目会被删除
    pub fn get(&self, class: CacheClass, lang: &str, text: &str) -> Option<String> {
        let mut state = self.lock();
        self.get_locked(&mut state, class, &cache_key(lang, text), Utc::now())
    }

    fn get_locked(
        &self,
        state: &mut CacheState,
        class: CacheClass,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let entries = state.classes.get_mut(&class)?;
        let entry = entries.get(key)?;
        if !entry.is_expired(self.expiry, now) {
            return Some(entry.translation.clone());
        }
        entries.remove(key);
        state.dirty.insert(class);
        None
    }

    /// 写入缓存，覆盖旧值并刷新时间戳
    pub fn set(&self, class: CacheClass, lang: &str, text: &str, value: &str) {
        let mut state = self.lock();
        state
            .class_mut(class)
            .insert(cache_key(lang, text), CacheEntry::new(value.to_string(), class));
        state.dirty.insert(class);
    }

    /// 批量读取，只返回命中的条目
    pub fn get_batch<S: AsRef<str>>(
        &self,
        class: CacheClass,
        lang: &str,
        texts: &[S],
    ) -> HashMap<String, String> {
        let mut state = self.lock();
        let now = Utc::now();
        texts
            .iter()
            .filter_map(|text| {
                let text = text.as_ref();
                self.get_locked(&mut state, class, &cache_key(lang, text), now)
                    .map(|value| (text.to_string(), value))
            })
            .collect()
    }

    /// 批量写入
    pub fn set_batch<I>(&self, class: CacheClass, lang: &str, items: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut state = self.lock();
        let mut written = false;
        let entries = state.class_mut(class);
        for (text, value) in items {
            entries.insert(cache_key(lang, &text), CacheEntry::new(value, class));
            written = true;
        }
        if written {
            state.dirty.insert(class);
        }
    }

    /// 从存储加载所有类别
    ///
    /// 文件缺失或损坏时该类别降级为空缓存并记录警告，不会中止启动。
    /// 返回被降级的类别及原因。
    pub fn load(&self) -> Vec<(CacheClass, TranslationError)> {
        let mut degraded = Vec::new();
        let mut state = self.lock();
        for class in CacheClass::ALL {
            match self.store.load_class_file(class) {
                Ok(entries) => {
                    tracing::debug!("加载 {} 缓存 {} 条", class.as_str(), entries.len());
                    state.classes.insert(class, entries);
                }
                Err(e) => {
                    tracing::warn!("{} 缓存加载失败，使用空缓存: {}", class.as_str(), e);
                    state.classes.insert(class, ClassEntries::new());
                    degraded.push((class, e));
                }
            }
            state.dirty.remove(&class);
        }
        degraded
    }

    /// 保存所有有改动的类别
    ///
    /// 写入失败的类别保持"脏"状态，内存中的数据仍然有效，可以重试。
    pub fn save(&self) -> Result<()> {
        let dirty: Vec<CacheClass> = self.lock().dirty.iter().copied().collect();
        self.save_classes(&dirty)
    }

    /// 无论是否有改动，保存所有类别
    pub fn save_all(&self) -> Result<()> {
        self.save_classes(&CacheClass::ALL)
    }

    fn save_classes(&self, classes: &[CacheClass]) -> Result<()> {
        let mut first_error = None;
        for &class in classes {
            let snapshot = {
                let mut state = self.lock();
                state.dirty.remove(&class);
                state.class_mut(class).clone()
            };
            match self.store.save_class_file(class, &snapshot) {
                Ok(()) => tracing::debug!("保存 {} 缓存 {} 条", class.as_str(), snapshot.len()),
                Err(e) => {
                    tracing::warn!("{} 缓存保存失败: {}", class.as_str(), e);
                    self.lock().dirty.insert(class);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 是否有尚未保存的改动
    pub fn is_dirty(&self) -> bool {
        !self.lock().dirty.is_empty()
    }

    pub fn stats(&self, class: CacheClass) -> CacheStats {
        let state = self.lock();
        let now = Utc::now();
        state
            .classes
            .get(&class)
            .map(|entries| CacheStats {
                total: entries.len(),
                expired: entries
                    .values()
                    .filter(|e| e.is_expired(self.expiry, now))
                    .count(),
            })
            .unwrap_or_default()
    }

    /// 删除某类别中的过期条目，返回删除数量
    pub fn purge_expired(&self, class: CacheClass) -> usize {
        let mut state = self.lock();
        let now = Utc::now();
        let expiry = self.expiry;
        let entries = state.class_mut(class);
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(expiry, now));
        let removed = before - entries.len();
        if removed > 0 {
            state.dirty.insert(class);
        }
        removed
    }

    /// 某类别的条目快照（`"{lang}:{text}"` → 条目），按键排序
    pub fn entries(&self, class: CacheClass) -> Vec<(String, CacheEntry)> {
        let state = self.lock();
        let mut entries: Vec<(String, CacheEntry)> = state
            .classes
            .get(&class)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn clear(&self, class: CacheClass) {
        let mut state = self.lock();
        state.class_mut(class).clear();
        state.dirty.insert(class);
    }

    pub fn clear_all(&self) {
        for class in CacheClass::ALL {
            self.clear(class);
        }
    }
}
