//! 中英混排文本切分
//!
//! 把一行文本切成按文字类别交替的片段，只有中文片段需要送去翻译，
//! 已经是目标语言的拉丁字母片段原样保留。

/// 文本片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub content: String,
    pub needs_translation: bool,
}

impl TextRun {
    fn new(content: impl Into<String>, needs_translation: bool) -> Self {
        Self {
            content: content.into(),
            needs_translation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Cjk,
    Latin,
    Other,
}

/// CJK 统一表意文字（U+4E00–U+9FFF）
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic() || (('\u{00c0}'..='\u{024f}').contains(&c) && c.is_alphabetic())
}

fn classify(c: char) -> Script {
    if is_cjk(c) {
        Script::Cjk
    } else if is_latin(c) {
        Script::Latin
    } else {
        Script::Other
    }
}

/// 切分一行文本
///
/// 只有在中文与拉丁字母之间切换时才产生边界；标点、数字、空格等字符
/// 附着在当前片段上，不改变其类别。行首的这类字符附着到第一个片段。
///
/// 返回片段列表以及是否存在需要翻译的片段。
pub fn split(line: &str) -> (Vec<TextRun>, bool) {
    let has_cjk = contains_cjk(line);
    if !has_cjk {
        return (vec![TextRun::new(line, false)], false);
    }
    if !line.chars().any(is_latin) {
        return (vec![TextRun::new(line, true)], true);
    }

    let mut runs = Vec::new();
    let mut pending = String::new();
    let mut current: Option<(Script, String)> = None;

    for c in line.chars() {
        let script = classify(c);
        if script == Script::Other {
            match current.as_mut() {
                Some((_, buf)) => buf.push(c),
                None => pending.push(c),
            }
            continue;
        }
        if let Some((open, buf)) = current.as_mut() {
            if *open == script {
                buf.push(c);
                continue;
            }
        }
        if let Some((open, buf)) = current.take() {
            runs.push(TextRun::new(buf, open == Script::Cjk));
        }
        let mut buf = std::mem::take(&mut pending);
        buf.push(c);
        current = Some((script, buf));
    }

    if let Some((open, buf)) = current {
        runs.push(TextRun::new(buf, open == Script::Cjk));
    }

    (runs, true)
}

/// 把片段拆成 (前缀, 核心, 后缀)，前后缀由非文字字符组成
///
/// 只有核心部分会被送去翻译和作为缓存键，空白与标点原样保留。
pub fn trim_run(content: &str) -> (&str, &str, &str) {
    let is_edge = |c: char| classify(c) == Script::Other;
    let start = content
        .char_indices()
        .find(|(_, c)| !is_edge(*c))
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    let end = content
        .char_indices()
        .rev()
        .find(|(_, c)| !is_edge(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(start);
    (&content[..start], &content[start..end], &content[end..])
}

/// 按原顺序拼接片段
///
/// 当两个片段相接处都是 ASCII 字母数字时插入一个空格，
/// 避免翻译后的英文与相邻英文粘连。
pub fn join_runs<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref();
        let needs_space = matches!(
            (out.chars().last(), part.chars().next()),
            (Some(a), Some(b)) if a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric()
        );
        if needs_space {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(runs: &[TextRun]) -> Vec<(&str, bool)> {
        runs.iter()
            .map(|r| (r.content.as_str(), r.needs_translation))
            .collect()
    }

    #[test]
    fn test_no_cjk_is_single_passthrough_run() {
        let (runs, translatable) = split("Hello, Go 1.22!");
        assert!(!translatable);
        assert_eq!(contents(&runs), vec![("Hello, Go 1.22!", false)]);
    }

    #[test]
    fn test_pure_cjk_is_single_translatable_run() {
        let (runs, translatable) = split("你好，世界。2024");
        assert!(translatable);
        assert_eq!(contents(&runs), vec![("你好，世界。2024", true)]);
    }

    #[test]
    fn test_mixed_line_alternates_runs() {
        let (runs, translatable) = split("使用 Go 语言");
        assert!(translatable);
        assert_eq!(
            contents(&runs),
            vec![("使用 ", true), ("Go ", false), ("语言", true)]
        );
    }

    #[test]
    fn test_leading_other_attaches_to_first_run() {
        let (runs, _) = split("2024年 Rust 总结");
        assert_eq!(
            contents(&runs),
            vec![("2024年 ", true), ("Rust ", false), ("总结", true)]
        );
    }

    #[test]
    fn test_concatenation_reconstructs_line() {
        let line = "「深入」理解 Tokio runtime 的调度器 (part 2)";
        let (runs, _) = split(line);
        let rebuilt: String = runs.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(rebuilt, line);
    }

    #[test]
    fn test_latin_extended_counts_as_latin() {
        let (runs, _) = split("café 咖啡");
        assert_eq!(contents(&runs), vec![("café ", false), ("咖啡", true)]);
    }

    #[test]
    fn test_trim_run() {
        assert_eq!(trim_run("  你好，"), ("  ", "你好", "，"));
        assert_eq!(trim_run("这是__"), ("", "这是", "__"));
        assert_eq!(trim_run("..."), ("...", "", ""));
    }

    #[test]
    fn test_join_runs_inserts_space_between_words() {
        assert_eq!(join_runs(["Use", "Go", "language"]), "Use Go language");
        assert_eq!(join_runs(["Use ", "Go"]), "Use Go");
        assert_eq!(join_runs(["(", "Go", ")"]), "(Go)");
    }
}
