//! Markdown 语法保护
//!
//! 在把文本发送给翻译服务之前，用不透明的 ASCII 占位符替换行内代码、链接、
//! 图片、粗体、斜体、删除线和 HTML 标签，翻译完成后再还原。
//!
//! ```rust
//! use blog_translator::guard;
//!
//! let protected = guard::protect("这是**重要**的 `Go` 代码");
//! assert_eq!(protected.text, "这是__BOLD_1__的 __INLINE_CODE_0__ 代码");
//! assert_eq!(protected.restore(&protected.text), "这是**重要**的 `Go` 代码");
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// 被保护的语法元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedElement {
    pub placeholder: String,
    pub original: String,
}

/// 保护结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    /// 替换后的文本
    pub text: String,
    /// 按创建顺序排列的占位符
    pub elements: Vec<ProtectedElement>,
}

impl Protected {
    /// 还原译文中的占位符
    pub fn restore(&self, translated: &str) -> String {
        restore(translated, &self.elements)
    }

    /// 译文中丢失的占位符
    pub fn missing_placeholders(&self, translated: &str) -> Vec<&str> {
        self.elements
            .iter()
            .map(|e| e.placeholder.as_str())
            .filter(|p| !translated.contains(p))
            .collect()
    }

    pub fn as_map(&self) -> HashMap<&str, &str> {
        self.elements
            .iter()
            .map(|e| (e.placeholder.as_str(), e.original.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Construct {
    InlineCode,
    Link,
    Image,
    Bold,
    Italic,
    Strikethrough,
    Html,
}

impl Construct {
    /// 保护顺序，优先级从高到低
    const ORDER: [Construct; 7] = [
        Construct::InlineCode,
        Construct::Link,
        Construct::Image,
        Construct::Bold,
        Construct::Italic,
        Construct::Strikethrough,
        Construct::Html,
    ];

    fn label(self) -> &'static str {
        match self {
            Construct::InlineCode => "INLINE_CODE",
            Construct::Link => "LINK",
            Construct::Image => "IMAGE",
            Construct::Bold => "BOLD",
            Construct::Italic => "ITALIC",
            Construct::Strikethrough => "STRIKE",
            Construct::Html => "HTML",
        }
    }

    fn regex(self) -> &'static Regex {
        static INLINE_CODE: OnceLock<Regex> = OnceLock::new();
        static LINK: OnceLock<Regex> = OnceLock::new();
        static IMAGE: OnceLock<Regex> = OnceLock::new();
        static BOLD: OnceLock<Regex> = OnceLock::new();
        static ITALIC: OnceLock<Regex> = OnceLock::new();
        static STRIKE: OnceLock<Regex> = OnceLock::new();
        static HTML: OnceLock<Regex> = OnceLock::new();

        let (cell, pattern) = match self {
            Construct::InlineCode => (&INLINE_CODE, r"``[^\n]+?``|`[^`\n]+`"),
            Construct::Link => (
                &LINK,
                r"!?\[[^\]\n]*\](?:\([^)\n]*\)|\[[^\]\n]*\])",
            ),
            Construct::Image => (&IMAGE, r"!\[[^\]\n]*\]\([^)\n]*\)"),
            Construct::Bold => (&BOLD, r"\*\*[^*\n]+?\*\*|__[^_\n]+?__"),
            Construct::Italic => (&ITALIC, r"\*[^*\n]+?\*|_[^_\n]+?_"),
            Construct::Strikethrough => (&STRIKE, r"~~[^~\n]+?~~"),
            Construct::Html => (
                &HTML,
                r"<!--[\s\S]*?-->|</?[A-Za-z][A-Za-z0-9-]*(?:\s[^<>]*)?/?>",
            ),
        };
        cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
    }

    fn accepts(self, matched: &str) -> bool {
        match self {
            // 图片留给图片规则处理
            Construct::Link => !matched.starts_with('!'),
            _ => true,
        }
    }
}

struct Guard<'a> {
    source: &'a str,
    counter: usize,
    elements: Vec<ProtectedElement>,
}

impl<'a> Guard<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            counter: 0,
            elements: Vec::new(),
        }
    }

    /// 生成一个在原文和当前文本中都不存在的占位符
    fn next_placeholder(&mut self, construct: Construct, current: &str) -> String {
        loop {
            let candidate = format!("__{}_{}__", construct.label(), self.counter);
            self.counter += 1;
            if !self.source.contains(&candidate) && !current.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// 当前文本中已有占位符的字节区间
    fn placeholder_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans: Vec<(usize, usize)> = self
            .elements
            .iter()
            .flat_map(|e| {
                text.match_indices(e.placeholder.as_str())
                    .map(|(start, m)| (start, start + m.len()))
                    .collect::<Vec<_>>()
            })
            .collect();
        spans.sort_unstable();
        spans
    }

    fn apply(&mut self, construct: Construct, text: String) -> String {
        let spans = self.placeholder_spans(&text);
        let regex = construct.regex();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut pos = 0;

        while pos <= text.len() {
            let Some(m) = regex.find_at(&text, pos) else {
                break;
            };
            let (start, end) = (m.start(), m.end());
            if !construct.accepts(m.as_str()) {
                pos = end;
                continue;
            }

            // 落在已有占位符内部或与其部分重叠的匹配不再保护；完整包含占位符的匹配允许
            let conflicts = spans.iter().any(|&(s, e)| {
                let overlaps = start < e && s < end;
                let contains = start <= s && e <= end;
                overlaps && !contains
            });
            if conflicts {
                pos = start + text[start..].chars().next().map_or(1, char::len_utf8);
                continue;
            }

            let placeholder = self.next_placeholder(construct, &text);
            out.push_str(&text[last..start]);
            out.push_str(&placeholder);
            self.elements.push(ProtectedElement {
                placeholder,
                original: text[start..end].to_string(),
            });
            last = end;
            pos = end;
        }

        out.push_str(&text[last..]);
        out
    }
}

/// 保护 Markdown 行内语法
///
/// 按行内代码 → 链接 → 图片 → 粗体 → 斜体 → 删除线 → HTML 标签的顺序依次替换，
/// 每个匹配都换成新生成的唯一占位符。
pub fn protect(text: &str) -> Protected {
    let mut guard = Guard::new(text);
    let mut current = text.to_string();
    for construct in Construct::ORDER {
        current = guard.apply(construct, current);
    }
    Protected {
        text: current,
        elements: guard.elements,
    }
}

/// 还原占位符
///
/// 按创建顺序的逆序替换，嵌套的保护（如粗体中包含行内代码）可以逐层展开。
pub fn restore(text: &str, elements: &[ProtectedElement]) -> String {
    elements.iter().rev().fold(text.to_string(), |acc, element| {
        acc.replace(&element.placeholder, &element.original)
    })
}

/// 文本是否以占位符开头
pub fn starts_with_placeholder(text: &str) -> bool {
    static START: OnceLock<Regex> = OnceLock::new();
    START
        .get_or_init(|| Regex::new(r"^__[A-Z]+(?:_[A-Z]+)*_\d+__").expect("static pattern is valid"))
        .is_match(text)
}

/// 文本是否以占位符结尾
pub fn ends_with_placeholder(text: &str) -> bool {
    static END: OnceLock<Regex> = OnceLock::new();
    END.get_or_init(|| Regex::new(r"__[A-Z]+(?:_[A-Z]+)*_\d+__$").expect("static pattern is valid"))
        .is_match(text)
}
