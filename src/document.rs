//! 文章文档模型
//!
//! 文档由有序的 front matter（键 → 原始值）和正文组成。这里只做边界切分和
//! 顶层键识别，不解析 YAML；未在字段表中声明的键原样保留。

use std::fs;
use std::path::Path;

use crate::cache::CacheClass;
use crate::error::{Result, TranslationError};
use crate::markdown::LineEnding;

const FRONT_MATTER_MARKER: &str = "---";

/// 文章文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// `(键, 原始值)`，原始值是冒号之后的全部文本（含续行，续行之间用 `\n` 连接）
    pub front_matter: Vec<(String, String)>,
    pub body: String,
    /// front matter 的换行符，按起始标记行识别
    pub line_ending: LineEnding,
    /// 输入带 front matter 块（可能为空）
    pub delimited: bool,
    /// 结束标记 `---` 之后有换行
    pub closing_newline: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            front_matter: Vec::new(),
            body: String::new(),
            line_ending: LineEnding::Lf,
            delimited: false,
            closing_newline: true,
        }
    }
}

impl Document {
    /// 切分 front matter 与正文
    ///
    /// 没有 front matter 时整个输入都是正文。
    pub fn parse(content: &str) -> Result<Self> {
        let Some(rest) = content
            .strip_prefix("---\n")
            .or_else(|| content.strip_prefix("---\r\n"))
        else {
            return Ok(Self {
                body: content.to_string(),
                ..Self::default()
            });
        };

        let mut front_matter: Vec<(String, String)> = Vec::new();
        let mut offset = 0;
        let mut closing = None;

        for line in rest.split_inclusive('\n') {
            offset += line.len();
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed == FRONT_MATTER_MARKER {
                closing = Some(line.ends_with('\n'));
                break;
            }

            let is_top_level = !trimmed.starts_with([' ', '\t', '-', '#']) && !trimmed.is_empty();
            match trimmed.split_once(':') {
                Some((key, value)) if is_top_level => {
                    front_matter.push((key.trim().to_string(), value.to_string()));
                }
                _ => match front_matter.last_mut() {
                    Some((_, raw)) => {
                        raw.push('\n');
                        raw.push_str(trimmed);
                    }
                    None if trimmed.trim().is_empty() || trimmed.starts_with('#') => {}
                    None => {
                        return Err(TranslationError::Parse(format!(
                            "front matter 行无法识别: {trimmed}"
                        )))
                    }
                },
            }
        }

        let Some(closing_newline) = closing else {
            return Err(TranslationError::Parse("front matter 缺少结束标记".to_string()));
        };

        Ok(Self {
            front_matter,
            body: rest[offset..].to_string(),
            line_ending: LineEnding::detect(&content[..content.len() - rest.len()]),
            delimited: true,
            closing_newline,
        })
    }

    /// 重新生成文档文本，未修改时与输入一致
    pub fn render(&self) -> String {
        if self.front_matter.is_empty() && !self.delimited {
            return self.body.clone();
        }
        let newline = self.line_ending.as_str();
        let mut out = format!("{FRONT_MATTER_MARKER}{newline}");
        for (key, raw) in &self.front_matter {
            out.push_str(key);
            out.push(':');
            out.push_str(&raw.replace('\n', newline));
            out.push_str(newline);
        }
        out.push_str(FRONT_MATTER_MARKER);
        if self.closing_newline {
            out.push_str(newline);
        }
        out.push_str(&self.body);
        out
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.front_matter
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn scalar(&self, key: &str) -> Option<String> {
        self.get_raw(key).map(decode_scalar)
    }

    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get_raw(key).and_then(decode_list)
    }

    /// 设置原始值；键不存在时追加到末尾
    pub fn set_raw(&mut self, key: &str, raw: String) {
        match self.front_matter.iter_mut().find(|(k, _)| k == key) {
            Some((_, value)) => *value = raw,
            None => self.front_matter.push((key.to_string(), raw)),
        }
    }

    pub fn set_scalar(&mut self, key: &str, value: &str) {
        self.set_raw(key, format!(" {}", encode_scalar(value)));
    }

    pub fn set_list(&mut self, key: &str, items: &[String]) {
        self.set_raw(key, format!(" {}", encode_list(items)));
    }
}

/// 解码标量：去掉首尾空白与成对引号
pub fn decode_scalar(raw: &str) -> String {
    let value = raw.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        if let Ok(decoded) = serde_json::from_str::<String>(value) {
            return decoded;
        }
        return value[1..value.len() - 1].to_string();
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].replace("''", "'");
    }
    value.to_string()
}

/// 解码列表：支持 `[a, "b"]` 行内写法和 `- a` 块写法
pub fn decode_list(raw: &str) -> Option<Vec<String>> {
    let value = raw.trim();
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return Some(split_flow_items(inner));
    }
    if value.is_empty() {
        return Some(Vec::new());
    }

    let items: Vec<String> = value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix('-').map(|item| decode_scalar(item)))
        .collect::<Option<Vec<_>>>()?;
    Some(items)
}

/// 按逗号切分行内列表，引号内的逗号不切分
fn split_flow_items(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in inner.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .iter()
        .map(|item| decode_scalar(item))
        .filter(|item| !item.is_empty())
        .collect()
}

/// 编码标量，需要时加双引号
pub fn encode_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(": ")
        || value.contains(" #")
        || value.starts_with([
            '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`', '-', '?', ',',
        ])
        || value != value.trim();
    if needs_quotes {
        serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
    } else {
        value.to_string()
    }
}

/// 编码为行内列表，每项都加双引号
pub fn encode_list(items: &[String]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| serde_json::to_string(item).unwrap_or_else(|_| format!("\"{item}\"")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Array,
}

/// 译文格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// 保留译文原样
    Text,
    /// 整理为 slug
    Slug,
}

/// front matter 字段规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub translate: bool,
    pub class: CacheClass,
    pub format: FieldFormat,
}

/// front matter 字段表，未列出的键原样保留
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        name: "title",
        kind: FieldKind::Scalar,
        translate: true,
        class: CacheClass::Article,
        format: FieldFormat::Text,
    },
    FieldRule {
        name: "description",
        kind: FieldKind::Scalar,
        translate: true,
        class: CacheClass::Article,
        format: FieldFormat::Text,
    },
    FieldRule {
        name: "summary",
        kind: FieldKind::Scalar,
        translate: true,
        class: CacheClass::Article,
        format: FieldFormat::Text,
    },
    FieldRule {
        name: "tags",
        kind: FieldKind::Array,
        translate: true,
        class: CacheClass::Tag,
        format: FieldFormat::Slug,
    },
    FieldRule {
        name: "categories",
        kind: FieldKind::Array,
        translate: true,
        class: CacheClass::Category,
        format: FieldFormat::Text,
    },
    FieldRule {
        name: "slug",
        kind: FieldKind::Scalar,
        translate: false,
        class: CacheClass::Slug,
        format: FieldFormat::Slug,
    },
    FieldRule {
        name: "date",
        kind: FieldKind::Scalar,
        translate: false,
        class: CacheClass::Article,
        format: FieldFormat::Text,
    },
    FieldRule {
        name: "draft",
        kind: FieldKind::Scalar,
        translate: false,
        class: CacheClass::Article,
        format: FieldFormat::Text,
    },
];

pub fn field_rule(name: &str) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|rule| rule.name == name)
}

/// 文章来源
pub trait ArticleSource {
    fn read(&self, path: &Path) -> Result<Document>;
}

/// 从本地 UTF-8 文件读取文章
#[derive(Debug, Clone, Copy, Default)]
pub struct FileArticleSource;

impl ArticleSource for FileArticleSource {
    fn read(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path).map_err(|e| TranslationError::filesystem(path, e))?;
        Document::parse(&content)
    }
}
