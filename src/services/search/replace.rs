//! 替换引擎
//!
//! 从左到右原地替换：光标总是推进到上一次替换末尾之后，
//! 零宽匹配额外前进一个字符，对任意模式都保证终止，
//! 也保证不会在同一轮里替换到已产出的匹配内部。

use ropey::Rope;

use crate::models::{Document, DocumentStore};

use super::searcher::{next_char_boundary, CompiledQuery, UnitSearcher};

/// 单行选区长度超过该值且发生了折行时，替换只作用于选区
pub const SELECTION_REPLACE_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceTarget {
    WholeDocument,
    FromCursor(usize),
    Selection { start: usize, end: usize },
}

/// 推断替换范围：选区跨多行，或单行选区发生折行且超过长度阈值时，
/// 只在选区内替换；否则整篇文档
pub fn infer_replace_target(
    text: &str,
    selection: Option<(usize, usize)>,
    wrap_width: Option<usize>,
) -> ReplaceTarget {
    let Some((a, b)) = selection else {
        return ReplaceTarget::WholeDocument;
    };
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    let end = end.min(text.len());
    let start = start.min(end);

    let multi_line = text[start..end].contains('\n');
    let wrapped = wrap_width
        .map(|w| {
            let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line_end = text[start..]
                .find('\n')
                .map(|i| start + i)
                .unwrap_or(text.len());
            line_end - line_start > w
        })
        .unwrap_or(false);

    if multi_line || (wrapped && end - start > SELECTION_REPLACE_THRESHOLD) {
        ReplaceTarget::Selection { start, end }
    } else {
        ReplaceTarget::WholeDocument
    }
}

/// 在文本上执行替换，返回 (新文本, 替换次数)。
/// 正则模式下替换串先解码转义，再按 $1 风格展开捕获组；
/// 其他模式替换串按字面使用。
pub fn replace_all_in_text(
    text: &str,
    query: &CompiledQuery,
    replacement: &str,
    target: ReplaceTarget,
) -> (String, usize) {
    let mut text = text.to_string();
    let (mut cursor, mut limit) = match target {
        ReplaceTarget::WholeDocument => (0, text.len()),
        ReplaceTarget::FromCursor(pos) => (pos.min(text.len()), text.len()),
        ReplaceTarget::Selection { start, end } => {
            let end = end.min(text.len());
            (start.min(end), end)
        }
    };

    let unescaped;
    let replacement = if query.is_regex() {
        unescaped = unescape_replacement(replacement);
        unescaped.as_str()
    } else {
        replacement
    };

    let mut count = 0usize;
    while cursor <= limit {
        let found = match query {
            CompiledQuery::Regex { regex, .. } => {
                let Some((s, _)) = UnitSearcher::new(query, &text).find_in(cursor, limit) else {
                    break;
                };
                // 在命中位置重新取捕获组用于展开
                let Some(caps) = regex.captures_at(&text[..limit], s) else {
                    break;
                };
                let Some(whole) = caps.get(0) else {
                    break;
                };
                let mut buf = String::new();
                caps.expand(replacement, &mut buf);
                (whole.start(), whole.end(), buf)
            }
            CompiledQuery::Literal { .. } => {
                let Some((s, e)) = UnitSearcher::new(query, &text).find_in(cursor, limit) else {
                    break;
                };
                (s, e, replacement.to_string())
            }
        };

        let (s, e, rep) = found;
        text.replace_range(s..e, &rep);
        count += 1;
        limit = limit + rep.len() - (e - s);
        cursor = s + rep.len();
        if e == s {
            // 零宽匹配：跳过一个字符保证前进；文本末尾无处可进则结束
            let next = next_char_boundary(&text, cursor + 1);
            if next == cursor {
                break;
            }
            cursor = next;
        }
    }

    (text, count)
}

/// 单文档替换，返回替换次数；有替换才标脏
pub fn replace_all_in_document(
    doc: &mut Document,
    query: &CompiledQuery,
    replacement: &str,
    target: ReplaceTarget,
) -> usize {
    let text = doc.text();
    let (new_text, count) = replace_all_in_text(&text, query, replacement, target);
    if count > 0 {
        doc.buffer = Rope::from_str(&new_text);
        doc.dirty = true;
    }
    count
}

/// 多文档替换：对每个打开的文档做整篇替换，累计次数
pub fn replace_in_all_open(
    store: &mut DocumentStore,
    query: &CompiledQuery,
    replacement: &str,
) -> usize {
    let ids: Vec<_> = store.open_ids().to_vec();
    let mut total = 0usize;
    for id in ids {
        if let Some(doc) = store.get_mut(id) {
            total += replace_all_in_document(doc, query, replacement, ReplaceTarget::WholeDocument);
        }
    }
    total
}

fn base_for(c: char) -> Option<(u32, usize)> {
    match c {
        'b' => Some((2, 8)),
        'o' => Some((8, 3)),
        'd' => Some((10, 3)),
        'x' => Some((16, 2)),
        'u' => Some((16, 4)),
        _ => None,
    }
}

fn read_base(digits: &[char], base: u32) -> Option<u32> {
    let mut value = 0u32;
    for &c in digits {
        value = value.checked_mul(base)?.checked_add(c.to_digit(base)?)?;
    }
    Some(value)
}

/// 解码替换串里的转义序列；未知或残缺的序列按原文保留
pub fn unescape_replacement(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' || i + 1 >= chars.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let next = chars[i + 1];
        match next {
            'r' => out.push('\r'),
            'n' => out.push('\n'),
            '0' => out.push('\0'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            _ => {
                if let Some((base, digits)) = base_for(next) {
                    if i + 2 + digits <= chars.len() {
                        if let Some(value) = read_base(&chars[i + 2..i + 2 + digits], base) {
                            if let Some(decoded) = char::from_u32(value) {
                                out.push(decoded);
                                i += 2 + digits;
                                continue;
                            }
                        }
                    }
                }
                out.push('\\');
                out.push(next);
            }
        }
        i += 2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::searcher::QueryOptions;

    fn literal(pattern: &str) -> CompiledQuery {
        CompiledQuery::compile(
            pattern,
            &QueryOptions {
                case_sensitive: true,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn regex(pattern: &str) -> CompiledQuery {
        CompiledQuery::compile(
            pattern,
            &QueryOptions {
                case_sensitive: true,
                whole_word: false,
                use_regex: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_replace_all_literal() {
        let q = literal("foo");
        let (text, count) =
            replace_all_in_text("foo bar foo", &q, "baz", ReplaceTarget::WholeDocument);
        assert_eq!(text, "baz bar baz");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_replace_never_rescans_replacement() {
        // 替换结果里又出现模式时不能二次替换
        let q = literal("ab");
        let (text, count) = replace_all_in_text("abab", &q, "ab!", ReplaceTarget::WholeDocument);
        assert_eq!(text, "ab!ab!");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_replace_selection_only() {
        let q = literal("x");
        let (text, count) = replace_all_in_text(
            "x x x x",
            &q,
            "y",
            ReplaceTarget::Selection { start: 2, end: 5 },
        );
        assert_eq!(text, "x y y x");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_replace_from_cursor() {
        let q = literal("x");
        let (text, count) = replace_all_in_text("x x x", &q, "y", ReplaceTarget::FromCursor(1));
        assert_eq!(text, "x y y");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_zero_width_match_terminates() {
        let q = regex("x*");
        let (text, count) = replace_all_in_text("abc", &q, "", ReplaceTarget::WholeDocument);
        assert_eq!(text, "abc");
        assert!(count >= 1);

        // 零宽匹配 + 非空替换也必须终止
        let q = regex("q*");
        let (_, count) = replace_all_in_text("abc", &q, "-", ReplaceTarget::WholeDocument);
        assert!(count <= 5);
    }

    #[test]
    fn test_zero_width_growing_replacement() {
        let q = regex("(?:^|\\b)");
        let (_, count) = replace_all_in_text("aa bb", &q, "<>", ReplaceTarget::WholeDocument);
        // 终止即可，次数与位置数同阶
        assert!(count <= 6);
    }

    #[test]
    fn test_regex_capture_expansion() {
        let q = regex(r"(\w+)=(\w+)");
        let (text, count) =
            replace_all_in_text("a=1 b=2", &q, "$2=$1", ReplaceTarget::WholeDocument);
        assert_eq!(text, "1=a 2=b");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_literal_replacement_is_verbatim() {
        // 非正则模式不解码转义、不展开捕获引用
        let q = literal("a");
        let (text, _) = replace_all_in_text("a", &q, r"\n$1", ReplaceTarget::WholeDocument);
        assert_eq!(text, r"\n$1");
    }

    #[test]
    fn test_regex_replacement_unescapes() {
        let q = regex("-");
        let (text, _) = replace_all_in_text("a-b", &q, r"\t", ReplaceTarget::WholeDocument);
        assert_eq!(text, "a\tb");
    }

    #[test]
    fn test_unescape_replacement() {
        assert_eq!(unescape_replacement(r"a\nb\t"), "a\nb\t");
        assert_eq!(unescape_replacement(r"\x41B"), "AB");
        assert_eq!(unescape_replacement(r"\d065"), "A");
        assert_eq!(unescape_replacement(r"\\n"), r"\n");
        // 未知转义按原文保留
        assert_eq!(unescape_replacement(r"\q"), r"\q");
        // 残缺的数字序列按原文保留
        assert_eq!(unescape_replacement(r"\x4"), r"\x4");
        assert_eq!(unescape_replacement(r"\xzz"), r"\xzz");
    }

    #[test]
    fn test_infer_target_multi_line_selection() {
        let text = "one\ntwo\nthree";
        assert_eq!(
            infer_replace_target(text, Some((0, 8)), None),
            ReplaceTarget::Selection { start: 0, end: 8 }
        );
    }

    #[test]
    fn test_infer_target_short_selection_whole_document() {
        let text = "one two three";
        assert_eq!(
            infer_replace_target(text, Some((0, 3)), Some(80)),
            ReplaceTarget::WholeDocument
        );
        assert_eq!(
            infer_replace_target(text, None, None),
            ReplaceTarget::WholeDocument
        );
    }

    #[test]
    fn test_infer_target_wrapped_long_selection() {
        // 单行但超过折行宽度，且选区超过阈值
        let text = "x".repeat(100);
        assert_eq!(
            infer_replace_target(&text, Some((0, 40)), Some(30)),
            ReplaceTarget::Selection { start: 0, end: 40 }
        );
        // 选区太短则仍然整篇
        assert_eq!(
            infer_replace_target(&text, Some((0, 10)), Some(30)),
            ReplaceTarget::WholeDocument
        );
    }

    #[test]
    fn test_replace_in_all_open_marks_only_changed_dirty() {
        let mut store = DocumentStore::new();
        let a = store.open_untitled("foo bar");
        let b = store.open_untitled("nothing");
        let c = store.open_untitled("foo foo");

        let q = literal("foo");
        let total = replace_in_all_open(&mut store, &q, "qux");
        assert_eq!(total, 3);
        assert!(store.get(a).unwrap().dirty);
        assert!(!store.get(b).unwrap().dirty);
        assert!(store.get(c).unwrap().dirty);
        assert_eq!(store.get(c).unwrap().text(), "qux qux");
    }
}
