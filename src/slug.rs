//! Slug 生成
//!
//! [`slugify`] 把译文整理成小写、连字符分隔的 URL 片段。
//! [`heuristic_slug`] 在翻译服务不可达时使用：先查静态词典，剩余汉字转写为拼音。

use pinyin::ToPinyin;

use crate::splitter::is_cjk;

/// 常见博客词汇的静态词典
const DICTIONARY: &[(&str, &str)] = &[
    ("人工智能", "artificial-intelligence"),
    ("机器学习", "machine-learning"),
    ("深度学习", "deep-learning"),
    ("大语言模型", "large-language-model"),
    ("大模型", "llm"),
    ("语言模型", "language-model"),
    ("自然语言处理", "nlp"),
    ("神经网络", "neural-network"),
    ("数据结构", "data-structure"),
    ("算法", "algorithm"),
    ("编程", "programming"),
    ("数据库", "database"),
    ("前端", "frontend"),
    ("后端", "backend"),
    ("全栈", "full-stack"),
    ("教程", "tutorial"),
    ("笔记", "notes"),
    ("生活", "life"),
    ("随笔", "essay"),
    ("技术", "technology"),
    ("学习", "learning"),
    ("开发", "development"),
    ("工具", "tools"),
    ("网络", "network"),
    ("安全", "security"),
    ("设计", "design"),
    ("读书", "reading"),
    ("思考", "thinking"),
    ("总结", "summary"),
    ("入门", "getting-started"),
    ("实践", "practice"),
    ("性能", "performance"),
    ("优化", "optimization"),
    ("架构", "architecture"),
    ("容器", "container"),
    ("云计算", "cloud-computing"),
    ("云原生", "cloud-native"),
    ("操作系统", "operating-system"),
    ("区块链", "blockchain"),
    ("翻译", "translation"),
    ("博客", "blog"),
    ("项目", "project"),
    ("分享", "sharing"),
    ("经验", "experience"),
    ("面试", "interview"),
    ("源码", "source-code"),
    ("分析", "analysis"),
    ("部署", "deployment"),
    ("配置", "configuration"),
    ("运维", "devops"),
    ("测试", "testing"),
    ("开源", "open-source"),
    ("年度", "annual"),
    ("旅行", "travel"),
    ("摄影", "photography"),
    ("音乐", "music"),
    ("电影", "movies"),
];

/// 特殊写法的替换
const SPECIAL_TERMS: &[(&str, &str)] = &[("c++", "cpp"), ("c#", "csharp"), ("f#", "fsharp"), (".net", "dotnet")];

/// 整理为 slug：小写，非字母数字字符替换为 `-`，合并连续的 `-`
///
/// 非 ASCII 字母数字（如保留下来的中文原文）不会被丢弃。
pub fn slugify(text: &str) -> String {
    let mut lowered = text.trim().to_lowercase();
    for (term, replacement) in SPECIAL_TERMS {
        if lowered.contains(term) {
            lowered = lowered.replace(term, &format!(" {replacement} "));
        }
    }

    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// 词典中从 `text` 开头能匹配到的最长词条
fn longest_dictionary_match(text: &str) -> Option<(&'static str, &'static str)> {
    DICTIONARY
        .iter()
        .filter(|(term, _)| text.starts_with(term))
        .max_by_key(|(term, _)| term.len())
        .copied()
}

pub fn dictionary_lookup(text: &str) -> Option<&'static str> {
    let text = text.trim();
    DICTIONARY
        .iter()
        .find(|(term, _)| *term == text)
        .map(|(_, slug)| *slug)
}

/// 启发式 slug：词典 + 拼音转写
///
/// 整体命中词典时直接返回；否则从左到右做最长匹配，未命中的汉字转写为拼音，
/// 其他字符原样保留，最后统一经过 [`slugify`]。
pub fn heuristic_slug(text: &str) -> String {
    if let Some(slug) = dictionary_lookup(text) {
        return slug.to_string();
    }

    let mut words: Vec<String> = Vec::new();
    let mut latin = String::new();
    let mut rest = text.trim();

    while let Some(c) = rest.chars().next() {
        if is_cjk(c) {
            if !latin.is_empty() {
                words.push(std::mem::take(&mut latin));
            }
            if let Some((term, slug)) = longest_dictionary_match(rest) {
                words.push(slug.to_string());
                rest = &rest[term.len()..];
                continue;
            }
            if let Some(pinyin) = c.to_pinyin() {
                words.push(pinyin.plain().to_string());
            }
        } else {
            latin.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    if !latin.is_empty() {
        words.push(latin);
    }

    slugify(&words.join(" "))
}
