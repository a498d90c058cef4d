//! Markdown 分段模块
//!
//! 把正文切成段落级单元。代码块、标题、列表项、引用、分隔线、HTML 块、
//! 表格和链接定义都作为不可再分的整体，只有普通段落会被累积。
//!
//! 每种行分类都是一个作用于单个去空白行的具名谓词，可以单独测试。

use std::sync::OnceLock;

use regex::Regex;

use crate::splitter::contains_cjk;

/// 段落类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Code,
    Heading,
    List,
    Quote,
    HorizontalRule,
    Html,
    Table,
    LinkDefinition,
}

/// 换行符
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// 出现 `\r\n` 即视为 CRLF
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// 段落单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub content: String,
    pub kind: SegmentKind,
    /// 是否需要翻译：代码块永远不翻译，其余类型仅在含中文时翻译
    pub translatable: bool,
    /// 该段之前的空行数，用于还原原文
    pub blank_lines_before: usize,
    /// 原文的换行符，多行内容内部和段间分隔都使用它
    pub line_ending: LineEnding,
}

impl Segment {
    fn new(
        content: String,
        kind: SegmentKind,
        blank_lines_before: usize,
        line_ending: LineEnding,
    ) -> Self {
        let translatable = match kind {
            SegmentKind::Code | SegmentKind::HorizontalRule | SegmentKind::LinkDefinition => false,
            _ => contains_cjk(&content),
        };
        Self {
            content,
            kind,
            translatable,
            blank_lines_before,
            line_ending,
        }
    }
}

pub fn is_code_fence(line: &str) -> bool {
    line.trim().starts_with("```")
}

/// 标题：1–6 个 `#` 后跟空格或行尾；整行都是 `#` 也视为标题
pub fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().all(|c| c == '#') {
        return true;
    }
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && trimmed[hashes..].starts_with([' ', '\t'])
}

/// 列表项：`-`/`*`/`+` 加空格，或数字加 `.`/`)` 再加空格
pub fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some('-' | '*' | '+') => matches!(chars.next(), Some(' ' | '\t')),
        Some(c) if c.is_ascii_digit() => {
            let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
            let rest = &trimmed[digits..];
            digits <= 9 && (rest.starts_with(". ") || rest.starts_with(") "))
        }
        _ => false,
    }
}

pub fn is_block_quote(line: &str) -> bool {
    line.trim().starts_with('>')
}

/// 分隔线：去掉空格后由至少三个相同的 `-`、`*` 或 `_` 组成
pub fn is_horizontal_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(first) = compact.chars().next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_') && compact.len() >= 3 && compact.chars().all(|c| c == first)
}

pub fn is_html_block(line: &str) -> bool {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    chars.next() == Some('<')
        && matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!')
}

pub fn is_table_row(line: &str) -> bool {
    line.trim().starts_with('|')
}

/// 链接引用定义，如 `[id]: https://example.com "title"`
pub fn is_link_definition(line: &str) -> bool {
    static LINK_DEF: OnceLock<Regex> = OnceLock::new();
    LINK_DEF
        .get_or_init(|| Regex::new(r"^\[[^\]]+\]:\s*\S").expect("static pattern is valid"))
        .is_match(line.trim())
}

/// 单行结构判断（代码围栏和表格由调用方单独处理）
fn standalone_kind(line: &str) -> Option<SegmentKind> {
    if is_heading(line) {
        Some(SegmentKind::Heading)
    } else if is_horizontal_rule(line) {
        Some(SegmentKind::HorizontalRule)
    } else if is_list_item(line) {
        Some(SegmentKind::List)
    } else if is_block_quote(line) {
        Some(SegmentKind::Quote)
    } else if is_html_block(line) {
        Some(SegmentKind::Html)
    } else if is_link_definition(line) {
        Some(SegmentKind::LinkDefinition)
    } else {
        None
    }
}

struct Accumulator {
    segments: Vec<Segment>,
    lines: Vec<String>,
    kind: SegmentKind,
    blank_lines: usize,
    blank_before_pending: usize,
    line_ending: LineEnding,
}

impl Accumulator {
    fn new(line_ending: LineEnding) -> Self {
        Self {
            segments: Vec::new(),
            lines: Vec::new(),
            kind: SegmentKind::Text,
            blank_lines: 0,
            blank_before_pending: 0,
            line_ending,
        }
    }

    fn push_line(&mut self, kind: SegmentKind, line: &str) {
        if !self.lines.is_empty() && self.kind != kind {
            self.flush();
        }
        if self.lines.is_empty() {
            self.kind = kind;
            self.blank_before_pending = std::mem::take(&mut self.blank_lines);
        }
        self.lines.push(line.to_string());
    }

    fn emit(&mut self, kind: SegmentKind, line: &str) {
        self.flush();
        let blank = std::mem::take(&mut self.blank_lines);
        self.segments
            .push(Segment::new(line.to_string(), kind, blank, self.line_ending));
    }

    fn blank(&mut self) {
        self.flush();
        self.blank_lines += 1;
    }

    fn flush(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.lines).join(self.line_ending.as_str());
        if content.trim().is_empty() {
            return;
        }
        self.segments.push(Segment::new(
            content,
            self.kind,
            self.blank_before_pending,
            self.line_ending,
        ));
    }
}

/// 切分正文
///
/// 拼接所有段落（按记录的空行数补回分隔）即可还原原文（忽略行尾空白与纯空白行）。
/// 换行符按 [`LineEnding::detect`] 统一识别。
pub fn segment(body: &str) -> Vec<Segment> {
    let mut acc = Accumulator::new(LineEnding::detect(body));
    let mut in_fence = false;

    for line in body.lines() {
        if in_fence {
            acc.push_line(SegmentKind::Code, line);
            if is_code_fence(line) {
                acc.flush();
                in_fence = false;
            }
            continue;
        }

        if is_code_fence(line) {
            acc.flush();
            acc.push_line(SegmentKind::Code, line);
            in_fence = true;
        } else if line.trim().is_empty() {
            acc.blank();
        } else if is_table_row(line) {
            acc.push_line(SegmentKind::Table, line);
        } else if let Some(kind) = standalone_kind(line) {
            acc.emit(kind, line);
        } else {
            acc.push_line(SegmentKind::Text, line);
        }
    }

    // 未闭合的代码块也作为代码整体输出
    acc.flush();
    acc.segments
}

/// 按原始空行还原正文
pub fn join(segments: &[Segment]) -> String {
    let newline = segments
        .first()
        .map_or(LineEnding::Lf, |s| s.line_ending)
        .as_str();
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push_str(newline);
        }
        for _ in 0..segment.blank_lines_before {
            out.push_str(newline);
        }
        out.push_str(&segment.content);
    }
    out
}

/// 拆出段首的结构标记（`## `、`- `、`1. `、`> `），返回 (标记, 正文)
pub fn split_block_marker(segment: &Segment) -> (&str, &str) {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let content = segment.content.as_str();
    match segment.kind {
        SegmentKind::Heading | SegmentKind::List | SegmentKind::Quote => {
            let marker = MARKER.get_or_init(|| {
                Regex::new(r"^\s*(?:#{1,6}[ \t]+|(?:>[ \t]?)+|[-*+][ \t]+(?:\[[ xX]\][ \t]+)?|\d{1,9}[.)][ \t]+)")
                    .expect("static pattern is valid")
            });
            let end = marker.find(content).map_or(0, |m| m.end());
            content.split_at(end)
        }
        _ => ("", content),
    }
}

/// 切分超长段落
///
/// 优先在句末标点处断开，找不到时退回到空白处，都没有时按长度硬切。
/// 长度以字符数计。
pub fn split_long_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let window_end = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        let window = &rest[..window_end];

        let sentence_end = window
            .char_indices()
            .filter(|(_, c)| matches!(c, '。' | '！' | '？' | '.' | '!' | '?'))
            .map(|(i, c)| i + c.len_utf8())
            .last();
        let whitespace_end = window
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .last();

        let cut = sentence_end
            .or(whitespace_end)
            .filter(|&cut| cut > 0)
            .unwrap_or(window_end);

        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
