//! 查找原语
//!
//! - Literal 模式：memchr Finder，编译时缓存
//! - Regex 模式：regex crate，多行 + CRLF 行尾容忍
//! - 单次查找（find_next / find_prev）带回绕重试
//!
//! 大小写折叠仅处理 ASCII；非 ASCII 的不敏感匹配走 Regex 模式。

use memchr::memmem::Finder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub use_regex: bool,
}

/// 编译好的查询，跨多个搜索单元复用
#[derive(Debug, Clone)]
pub enum CompiledQuery {
    Literal {
        needle: Vec<u8>,
        case_sensitive: bool,
        whole_word: bool,
        finder: Finder<'static>,
    },
    Regex {
        regex: regex::Regex,
        whole_word: bool,
    },
}

impl CompiledQuery {
    /// 编译查询。Regex 模式先重写行尾相关 token，
    /// 尾部 $ 由 CRLF 模式统一处理，三种行尾约定一致。
    pub fn compile(pattern: &str, options: &QueryOptions) -> Result<Self, regex::Error> {
        if options.use_regex {
            let rewritten = preprocess_regex(pattern);
            let regex = regex::RegexBuilder::new(&rewritten)
                .case_insensitive(!options.case_sensitive)
                .multi_line(true)
                .crlf(true)
                .build()?;
            Ok(Self::Regex {
                regex,
                whole_word: options.whole_word,
            })
        } else {
            let needle = if options.case_sensitive {
                pattern.as_bytes().to_vec()
            } else {
                pattern.to_ascii_lowercase().into_bytes()
            };
            let finder = Finder::new(&needle).into_owned();
            Ok(Self::Literal {
                needle,
                case_sensitive: options.case_sensitive,
                whole_word: options.whole_word,
                finder,
            })
        }
    }

    /// 模式有效性预检（输入过程中即可反馈）
    pub fn validate(pattern: &str, options: &QueryOptions) -> Result<(), regex::Error> {
        Self::compile(pattern, options).map(|_| ())
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex { .. })
    }

    pub fn regex(&self) -> Option<&regex::Regex> {
        match self {
            Self::Regex { regex, .. } => Some(regex),
            Self::Literal { .. } => None,
        }
    }
}

/// 把裸 `\n` 重写为三种行尾的交替（字符类内不动）
pub fn preprocess_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') if !in_class => out.push_str(r"(?:\r\n|\n|\r)"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.map(is_word_char).unwrap_or(false) && !after.map(is_word_char).unwrap_or(false)
}

/// i 之后下一个字符边界（最少前进 1 字节）
pub(crate) fn next_char_boundary(text: &str, i: usize) -> usize {
    let mut i = i.min(text.len());
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// 绑定到一个搜索单元的查找器。
/// 大小写不敏感的 Literal 模式在这里做一次性折叠，
/// 之后的重复查找（引擎逐个前进）不再付折叠成本。
pub struct UnitSearcher<'a> {
    query: &'a CompiledQuery,
    text: &'a str,
    folded: Option<Vec<u8>>,
}

impl<'a> UnitSearcher<'a> {
    pub fn new(query: &'a CompiledQuery, text: &'a str) -> Self {
        let folded = match query {
            CompiledQuery::Literal {
                case_sensitive: false,
                ..
            } => Some(text.bytes().map(|b| b.to_ascii_lowercase()).collect()),
            _ => None,
        };
        Self {
            query,
            text,
            folded,
        }
    }

    /// 在 [from, len) 中查找下一个匹配，返回字节区间
    pub fn find_at(&self, from: usize) -> Option<(usize, usize)> {
        self.find_in(from, self.text.len())
    }

    /// 在 [from, to) 中查找下一个匹配。to 必须落在字符边界上。
    pub fn find_in(&self, from: usize, to: usize) -> Option<(usize, usize)> {
        let to = to.min(self.text.len());
        if from > to {
            return None;
        }
        match self.query {
            CompiledQuery::Literal {
                needle,
                finder,
                whole_word,
                ..
            } => {
                if needle.is_empty() {
                    return None;
                }
                let hay: &[u8] = self
                    .folded
                    .as_deref()
                    .unwrap_or_else(|| self.text.as_bytes());
                let mut from = from;
                loop {
                    if from > to {
                        return None;
                    }
                    let pos = finder.find(&hay[from..to])? + from;
                    let end = pos + needle.len();
                    if !*whole_word || is_whole_word(self.text, pos, end) {
                        return Some((pos, end));
                    }
                    from = pos + 1;
                }
            }
            CompiledQuery::Regex { regex, whole_word } => {
                let slice = &self.text[..to];
                let mut from = from;
                loop {
                    let m = regex.find_at(slice, from)?;
                    if !*whole_word || is_whole_word(self.text, m.start(), m.end()) {
                        return Some((m.start(), m.end()));
                    }
                    let next = next_char_boundary(slice, m.start() + 1);
                    if next <= from {
                        return None;
                    }
                    from = next;
                }
            }
        }
    }
}

/// 从光标向前查找；没有则从头回绕重试。
/// 返回 (start, end, wrapped)，只有命中确实在起点之前才算回绕。
pub fn find_next(query: &CompiledQuery, text: &str, from: usize) -> Option<(usize, usize, bool)> {
    let searcher = UnitSearcher::new(query, text);
    if let Some((s, e)) = searcher.find_at(from) {
        return Some((s, e, false));
    }
    let (s, e) = searcher.find_at(0)?;
    if s >= from {
        return None;
    }
    Some((s, e, true))
}

/// 从光标向后查找；没有则从末尾回绕重试
pub fn find_prev(query: &CompiledQuery, text: &str, from: usize) -> Option<(usize, usize, bool)> {
    let searcher = UnitSearcher::new(query, text);
    let mut last_before = None;
    let mut last_any = None;
    let mut cursor = 0usize;
    while let Some((s, e)) = searcher.find_at(cursor) {
        if s < from {
            last_before = Some((s, e));
        }
        last_any = Some((s, e));
        let next = if e > s {
            e
        } else {
            next_char_boundary(text, e + 1)
        };
        if next <= cursor {
            break;
        }
        cursor = next;
    }
    match last_before {
        Some((s, e)) => Some((s, e, false)),
        None => last_any.map(|(s, e)| (s, e, true)),
    }
}

/// `*` / `?` 通配匹配（不区分大小写），函数名筛选和文件名匹配共用
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
