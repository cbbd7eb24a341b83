//! 单元搜索引擎
//!
//! 对一个搜索单元（打开的文档或临时加载的文件）执行查询，
//! 产出 MatchRecord 序列：
//! - 普通/正则模式：提取所在行，归一化后校准行内偏移，超长行围绕
//!   匹配做省略
//! - 函数签名模式：用语言对应的函数定义正则找候选，解析函数名后
//!   再按用户查询做通配比对
//!
//! 每次调用从单元起点重新扫描（可重入，不保留游标状态）。

use rustc_hash::FxHashMap;

use crate::models::{MatchRecord, RecordOwner};
use crate::services::config::FunctionPatterns;

use super::searcher::{next_char_boundary, wildcard_match, CompiledQuery, QueryOptions, UnitSearcher};

/// 展示行的长度预算（字节）
pub const DISPLAY_BUDGET: usize = 255;
/// 省略时保留在匹配前的上下文字节数
const ELIDE_CONTEXT: usize = 24;
const ELLIPSIS: &str = "…";

/// 一次扫描中传给引擎的查询描述
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// 用户输入的原始查询串
    pub pattern: String,
    pub options: QueryOptions,
    /// 函数签名搜索模式
    pub function_mode: bool,
}

/// 一个待搜索的单元：全文 + 归属 + 语言
pub struct SearchUnit<'a> {
    pub owner: RecordOwner,
    pub text: &'a str,
    pub language: Option<&'a str>,
}

pub struct DocumentSearchEngine {
    patterns: FunctionPatterns,
    function_cache: FxHashMap<String, regex::Regex>,
}

impl DocumentSearchEngine {
    pub fn new(patterns: FunctionPatterns) -> Self {
        Self {
            patterns,
            function_cache: FxHashMap::default(),
        }
    }

    /// 搜索一个单元，结果追加到 out。budget 是全局剩余配额，
    /// 减到 0 即停（扫描在文件中途也会停下）。
    pub fn search(
        &mut self,
        unit: &SearchUnit<'_>,
        spec: &QuerySpec,
        compiled: Option<&CompiledQuery>,
        budget: &mut usize,
        out: &mut Vec<MatchRecord>,
    ) {
        if spec.function_mode {
            self.search_functions(unit, spec, budget, out);
            return;
        }
        let Some(query) = compiled else {
            return;
        };

        let searcher = UnitSearcher::new(query, unit.text);
        let mut cursor = 0usize;
        while *budget > 0 {
            let Some((start, end)) = searcher.find_at(cursor) else {
                break;
            };
            out.push(record_for_match(unit.owner, unit.text, start, end));
            *budget -= 1;

            // 空匹配前进一个字符，保证终止
            let next = if end > start {
                end
            } else {
                next_char_boundary(unit.text, end + 1)
            };
            if next <= cursor {
                break;
            }
            cursor = next;
        }
    }

    fn search_functions(
        &mut self,
        unit: &SearchUnit<'_>,
        spec: &QuerySpec,
        budget: &mut usize,
        out: &mut Vec<MatchRecord>,
    ) {
        let Some(language) = unit.language else {
            return;
        };
        let Some(pattern) = self.patterns.get(language) else {
            return;
        };

        if !self.function_cache.contains_key(language) {
            match regex::RegexBuilder::new(pattern).multi_line(true).build() {
                Ok(regex) => {
                    self.function_cache.insert(language.to_string(), regex);
                }
                Err(e) => {
                    tracing::debug!(language, error = %e, "invalid function pattern");
                    return;
                }
            }
        }
        let Some(regex) = self.function_cache.get(language) else {
            return;
        };

        // 非全词匹配时查询串两侧补 *，允许部分名字命中。
        // 函数名不可能包含 * 或 ?，所以通配符无需正则开关。
        let wild = if spec.pattern.is_empty() {
            None
        } else if spec.options.whole_word {
            Some(spec.pattern.clone())
        } else {
            Some(format!("*{}*", spec.pattern))
        };

        let text = unit.text;
        let mut cursor = 0usize;
        while *budget > 0 {
            let Some(m) = regex.find_at(text, cursor) else {
                break;
            };
            let (start, end) = (m.start(), m.end());

            let sig_raw = text[start..end].trim_end_matches(|c| c == '\n' || c == '\r');
            let sig = normalize_signature(&strip_comments(sig_raw));
            let accepted = match &wild {
                None => true,
                Some(w) => parse_signature(&sig)
                    .map(|name| wildcard_match(w, &name))
                    .unwrap_or(false),
            };
            if accepted {
                let line_number = bytecount::count(&text.as_bytes()[..start], b'\n');
                out.push(MatchRecord {
                    owner: unit.owner,
                    match_start: start,
                    match_end: end,
                    line_number,
                    line_text: sig,
                    in_line_start: 0,
                    in_line_end: 0,
                });
                *budget -= 1;
            }

            let next = if end > start {
                end
            } else {
                next_char_boundary(text, end + 1)
            };
            if next <= cursor {
                break;
            }
            cursor = next;
        }
    }
}

/// 由一个命中区间构造展示记录
fn record_for_match(owner: RecordOwner, text: &str, start: usize, end: usize) -> MatchRecord {
    let bytes = text.as_bytes();

    // 展示位置跳过行尾字符（正则可以匹配在行尾上）
    let mut display_pos = start;
    while display_pos < bytes.len() && matches!(bytes[display_pos], b'\n' | b'\r') {
        display_pos += 1;
    }

    let line_number = bytecount::count(&bytes[..display_pos], b'\n');
    let line_start = memchr::memrchr(b'\n', &bytes[..display_pos])
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut line_end = memchr::memchr(b'\n', &bytes[display_pos..])
        .map(|i| display_pos + i)
        .unwrap_or(text.len());
    while line_end > line_start && bytes[line_end - 1] == b'\r' {
        line_end -= 1;
    }

    let raw_line = &text[line_start..line_end];
    let in_start = display_pos - line_start;
    let in_end = end.clamp(display_pos, line_end) - line_start;

    let (line_text, in_start, in_end) = normalize_line(raw_line, in_start, in_end);
    let (line_text, in_start, in_end) = elide_around_match(line_text, in_start, in_end);

    MatchRecord {
        owner,
        match_start: start,
        match_end: end,
        line_number,
        line_text,
        in_line_start: in_start,
        in_line_end: in_end,
    }
}

/// 展示行归一化：控制字符和连续空白折叠为单个空格，
/// 行内偏移同步校准。结果不再含控制字符或连续空格，
/// 因此重复归一化是恒等变换。
pub fn normalize_line(line: &str, start: usize, end: usize) -> (String, usize, usize) {
    let mut out = String::with_capacity(line.len());
    let mut s = start;
    let mut e = end;
    let mut last_space = false;
    for (i, ch) in line.char_indices() {
        let len = ch.len_utf8();
        let space_like = matches!(ch, ' ' | '\t' | '\n' | '\r');
        if space_like {
            if last_space {
                if i < start {
                    s -= len;
                }
                if i < end {
                    e -= len;
                }
            } else {
                out.push(' ');
                last_space = true;
            }
        } else if ch.is_control() {
            if i < start {
                s -= len;
            }
            if i < end {
                e -= len;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    let s = s.min(out.len());
    let e = e.clamp(s, out.len());
    (out, s, e)
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    i = i.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// 行远超展示预算时，截取匹配附近的窗口并加省略标记，
/// 偏移再次校准到截取后的文本
pub fn elide_around_match(line: String, start: usize, end: usize) -> (String, usize, usize) {
    if line.len() <= DISPLAY_BUDGET {
        return (line, start, end);
    }

    let win_start = floor_char_boundary(&line, start.saturating_sub(ELIDE_CONTEXT));
    let win_end = floor_char_boundary(&line, (win_start + DISPLAY_BUDGET).min(line.len()));

    let marker = if win_start > 0 { ELLIPSIS } else { "" };
    let out = format!("{}{}", marker, &line[win_start..win_end]);
    let base = marker.len();
    let new_start = start - win_start + base;
    let new_end = end.clamp(win_start, win_end) - win_start + base;
    (out, new_start, new_end)
}

/// 去掉 /* ... */ 注释；未闭合的注释截断到行尾
fn strip_comments(sig: &str) -> String {
    let mut out = sig.to_string();
    while let Some(pos) = out.find("/*") {
        match out[pos + 2..].find("*/") {
            Some(rel) => out.replace_range(pos..pos + 2 + rel + 2, ""),
            None => out.truncate(pos),
        }
    }
    out
}

/// 签名归一化：去掉 \r 和 '{'，换行和制表符转空格并折叠
fn normalize_signature(sig: &str) -> String {
    let mut out = String::with_capacity(sig.len());
    let mut last_space = false;
    for ch in sig.chars() {
        match ch {
            '\r' | '{' => {}
            ' ' | '\n' | '\t' => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            _ => {
                out.push(ch);
                last_space = false;
            }
        }
    }
    out.trim().to_string()
}

/// 从签名里解析函数名：找 '('，向前跳过分隔符和指针/引用修饰
fn parse_signature(sig: &str) -> Option<String> {
    let brace = sig.find('(')?;
    let head = &sig[..brace];
    let sep = head.rfind(|c: char| matches!(c, '\t' | ' ' | ':' | ',' | '.'));
    let mut start = sep.map(|i| i + 1).unwrap_or(0);
    let bytes = sig.as_bytes();
    while start < brace && matches!(bytes[start], b'*' | b'&' | b'^') {
        start += 1;
    }
    let name = sig[start..brace].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
