//! Per-language structural span detection.
//!
//! Strategies are line-oriented heuristics: regular expressions recognise
//! declarations, brace counting (skipping strings and comments) or
//! indentation finds where they end. No syntax tree is built.

use std::sync::LazyLock;

use regex::Regex;

use crate::chunker::ChunkType;
use crate::error::ChunkError;
use crate::languages::Lang;

/// Lines scanned past a declaration while looking for its body.
const MAX_SIGNATURE_LINES: usize = 16;

/// A structural unit located by a strategy. Line numbers are zero-based and
/// `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: ChunkType,
    pub name: String,
}

/// Where to look for spans.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    TopLevel,
    /// Members directly inside a class-like span.
    Body(&'a Span),
}

/// Locates functions, classes and methods in one file.
pub trait ChunkStrategy: Send + Sync {
    /// Ordered, non-overlapping spans found in `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError`] when the file's block structure cannot be
    /// followed (unbalanced braces, unterminated string or comment).
    fn spans(&self, lines: &[&str], scope: Scope<'_>) -> Result<Vec<Span>, ChunkError>;

    /// Zero-based indices of import/require lines, in file order.
    fn imports(&self, lines: &[&str]) -> Vec<usize>;
}

/// Default strategy for a language.
#[must_use]
pub fn strategy_for(lang: Lang) -> Box<dyn ChunkStrategy> {
    match lang {
        Lang::Python => Box::new(IndentStrategy),
        other => Box::new(BraceStrategy::new(other)),
    }
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

pattern!(
    RUST_FN,
    r#"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#
);
pattern!(
    RUST_TYPE,
    r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|union|trait|mod)\s+([A-Za-z_]\w*)"
);
pattern!(
    RUST_IMPL,
    r"^\s*(?:unsafe\s+)?impl\b(?:\s*<.*?>)?\s+(?:[^{]*?\bfor\s+)?&?(?:dyn\s+)?([A-Za-z_]\w*)"
);
pattern!(
    RUST_USE,
    r"^(?:pub(?:\s*\([^)]*\))?\s+)?(?:use\s|extern\s+crate\s)"
);

pattern!(
    JS_FN,
    r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)"
);
pattern!(
    JS_ARROW,
    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]*)?=>"
);
pattern!(
    JS_FN_EXPR,
    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?function\b"
);
pattern!(
    JS_CLASS,
    r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)"
);
pattern!(
    TS_INTERFACE,
    r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+([A-Za-z_$][\w$]*)"
);
pattern!(
    JS_METHOD,
    r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?\s*(#?[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\("
);
pattern!(JS_IMPORT, r#"^import[\s{*'"]"#);
pattern!(
    JS_REQUIRE,
    r"^(?:const|let|var)\s+.*=\s*require\("
);

pattern!(GO_FN, r"^func\s+([A-Za-z_]\w*)");
pattern!(
    GO_METHOD,
    r"^func\s*\(\s*(?:\w+\s+)?\*?\s*([A-Za-z_]\w*)(?:\[[^\]]*\])?\s*\)\s*([A-Za-z_]\w*)"
);
pattern!(
    GO_TYPE,
    r"^type\s+([A-Za-z_]\w*)(?:\[[^\]]*\])?\s+(?:struct|interface)\b"
);
pattern!(GO_IMPORT, r"^import\b");

pattern!(PY_DEF, r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)");
pattern!(PY_CLASS, r"^\s*class\s+([A-Za-z_]\w*)");
pattern!(PY_IMPORT, r"^(?:import\s|from\s+\S+\s+import\b)");

/// Call-like words the method pattern must not treat as declarations.
const JS_CONTROL_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "new", "with", "await",
    "typeof", "super",
];

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    Open,
    Close,
    Semi,
}

fn net_depth(toks: &[Tok]) -> i32 {
    toks.iter()
        .map(|t| match t {
            Tok::Open => 1,
            Tok::Close => -1,
            Tok::Semi => 0,
        })
        .sum()
}

/// Line scanner that reports braces and semicolons outside strings and
/// comments. State carries across lines for block comments and multi-line
/// string literals.
#[derive(Debug, Clone)]
struct Lexer {
    lang: Lang,
    block_comment: bool,
    string: Option<char>,
}

impl Lexer {
    fn new(lang: Lang) -> Self {
        Self {
            lang,
            block_comment: false,
            string: None,
        }
    }

    fn in_literal(&self) -> bool {
        self.block_comment || self.string.is_some()
    }

    fn scan(&mut self, line: &str) -> Vec<Tok> {
        let chars: Vec<char> = line.chars().collect();
        let mut toks = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.block_comment {
                if c == '*' && next == Some('/') {
                    self.block_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            if let Some(quote) = self.string {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == quote {
                    self.string = None;
                }
                i += 1;
                continue;
            }

            match c {
                '/' if next == Some('/') => break,
                '/' if next == Some('*') => {
                    self.block_comment = true;
                    i += 2;
                    continue;
                }
                '"' => self.string = Some('"'),
                '`' if self.lang != Lang::Rust => self.string = Some('`'),
                '\'' if self.lang == Lang::Rust => {
                    // Char literal or lifetime; only literals are skipped.
                    if next == Some('\\') {
                        if let Some(p) = chars
                            .get(i + 3..)
                            .and_then(|rest| rest.iter().position(|&ch| ch == '\''))
                        {
                            i += 3 + p + 1;
                            continue;
                        }
                    } else if chars.get(i + 2) == Some(&'\'') {
                        i += 3;
                        continue;
                    }
                }
                '\'' => self.string = Some('\''),
                '{' => toks.push(Tok::Open),
                '}' => toks.push(Tok::Close),
                ';' => toks.push(Tok::Semi),
                _ => {}
            }
            i += 1;
        }

        // Only Rust strings and JS/Go backtick literals may span lines.
        match self.string {
            Some('\'') => self.string = None,
            Some('"') if self.lang != Lang::Rust => self.string = None,
            _ => {}
        }
        toks
    }
}

/// Strategy for brace-delimited languages: Rust, JavaScript, TypeScript, Go.
#[derive(Debug, Clone, Copy)]
pub struct BraceStrategy {
    lang: Lang,
}

impl BraceStrategy {
    #[must_use]
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }

    fn classify(&self, line: &str, owner: Option<&str>) -> Option<(ChunkType, String)> {
        match (self.lang, owner) {
            (Lang::Rust, None) => capture(&RUST_FN, line)
                .map(|n| (ChunkType::Function, n))
                .or_else(|| capture(&RUST_TYPE, line).map(|n| (ChunkType::Class, n)))
                .or_else(|| capture(&RUST_IMPL, line).map(|n| (ChunkType::Class, n))),
            (Lang::Rust, Some(owner)) => {
                capture(&RUST_FN, line).map(|n| (ChunkType::Method, format!("{owner}.{n}")))
            }
            (Lang::JavaScript | Lang::TypeScript, None) => capture(&JS_FN, line)
                .or_else(|| capture(&JS_ARROW, line))
                .or_else(|| capture(&JS_FN_EXPR, line))
                .map(|n| (ChunkType::Function, n))
                .or_else(|| capture(&JS_CLASS, line).map(|n| (ChunkType::Class, n)))
                .or_else(|| {
                    if self.lang == Lang::TypeScript {
                        capture(&TS_INTERFACE, line).map(|n| (ChunkType::Class, n))
                    } else {
                        None
                    }
                }),
            (Lang::JavaScript | Lang::TypeScript, Some(owner)) => capture(&JS_METHOD, line)
                .filter(|n| !JS_CONTROL_WORDS.contains(&n.as_str()))
                .map(|n| (ChunkType::Method, format!("{owner}.{n}"))),
            (Lang::Go, None) => GO_METHOD
                .captures(line)
                .and_then(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .map(|(recv, name)| (ChunkType::Method, format!("{recv}.{name}")))
                .or_else(|| capture(&GO_FN, line).map(|n| (ChunkType::Function, n)))
                .or_else(|| capture(&GO_TYPE, line).map(|n| (ChunkType::Class, n))),
            (Lang::Go | Lang::Python, _) => None,
        }
    }
}

impl ChunkStrategy for BraceStrategy {
    fn spans(&self, lines: &[&str], scope: Scope<'_>) -> Result<Vec<Span>, ChunkError> {
        let (start, end, target, owner) = match scope {
            Scope::TopLevel => (0, lines.len(), 0, None),
            Scope::Body(span) => (
                span.start,
                (span.end + 1).min(lines.len()),
                1,
                Some(span.name.as_str()),
            ),
        };

        let mut lex = Lexer::new(self.lang);
        let mut depth = 0i32;
        let mut spans = Vec::new();
        let mut i = start;

        while i < end {
            if depth == target
                && !lex.in_literal()
                && let Some((kind, name)) = self.classify(lines[i], owner)
            {
                let mut lookahead = lex.clone();
                if let Some((block_end, residual)) = find_block_end(&mut lookahead, lines, i, end)? {
                    spans.push(Span {
                        start: i,
                        end: block_end,
                        kind,
                        name,
                    });
                    lex = lookahead;
                    depth += residual;
                    if depth < 0 {
                        return Err(ChunkError::Unbalanced {
                            line: block_end + 1,
                        });
                    }
                    i = block_end + 1;
                    continue;
                }
            }

            for tok in lex.scan(lines[i]) {
                match tok {
                    Tok::Open => depth += 1,
                    Tok::Close => {
                        depth -= 1;
                        if depth < 0 {
                            return Err(ChunkError::Unbalanced { line: i + 1 });
                        }
                    }
                    Tok::Semi => {}
                }
            }
            i += 1;
        }

        if lex.in_literal() {
            return Err(ChunkError::Unterminated);
        }
        if depth != 0 {
            return Err(ChunkError::Unbalanced { line: end });
        }
        Ok(spans)
    }

    fn imports(&self, lines: &[&str]) -> Vec<usize> {
        match self.lang {
            Lang::Rust => collect_imports(lines, &[&RUST_USE], '{', '}'),
            Lang::JavaScript | Lang::TypeScript => {
                collect_imports(lines, &[&JS_IMPORT, &JS_REQUIRE], '{', '}')
            }
            Lang::Go => collect_imports(lines, &[&GO_IMPORT], '(', ')'),
            Lang::Python => Vec::new(),
        }
    }
}

/// Scan from a declaration line to the brace closing its body.
///
/// Returns `None` for declarations without a body (`struct Unit;`,
/// signatures ending in `;`), otherwise the closing line and the net depth
/// of whatever follows the closing brace on that line.
fn find_block_end(
    lex: &mut Lexer,
    lines: &[&str],
    start: usize,
    limit: usize,
) -> Result<Option<(usize, i32)>, ChunkError> {
    let mut depth = 0i32;
    let mut opened = false;

    for (j, line) in lines.iter().enumerate().take(limit).skip(start) {
        if !opened && j >= start + MAX_SIGNATURE_LINES {
            return Ok(None);
        }
        let toks = lex.scan(line);
        for (k, tok) in toks.iter().enumerate() {
            match tok {
                Tok::Open => {
                    depth += 1;
                    opened = true;
                }
                Tok::Close => {
                    depth -= 1;
                    if depth < 0 {
                        return if opened {
                            Err(ChunkError::Unbalanced { line: j + 1 })
                        } else {
                            Ok(None)
                        };
                    }
                    if opened && depth == 0 {
                        return Ok(Some((j, net_depth(&toks[k + 1..]))));
                    }
                }
                Tok::Semi if !opened => return Ok(None),
                Tok::Semi => {}
            }
        }
    }

    if opened {
        Err(ChunkError::Unbalanced { line: limit })
    } else {
        Ok(None)
    }
}

fn collect_imports(lines: &[&str], patterns: &[&Regex], open: char, close: char) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !patterns.iter().any(|re| re.is_match(lines[i])) {
            i += 1;
            continue;
        }
        let mut balance = 0i64;
        let mut j = i;
        loop {
            let line = lines[j];
            balance += line.matches(open).count() as i64 - line.matches(close).count() as i64;
            out.push(j);
            if balance <= 0 || j + 1 >= lines.len() || j - i >= MAX_SIGNATURE_LINES {
                break;
            }
            j += 1;
        }
        i = j + 1;
    }
    out
}

/// Strategy for Python: declarations end where indentation returns to the
/// declaration's level.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndentStrategy;

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn is_blank(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

/// Last line of the indented block opened by the declaration at `decl`.
fn indent_block_end(lines: &[&str], decl: usize, limit: usize) -> usize {
    let level = indent_of(lines[decl]);

    // Multi-line signatures may close at the declaration's own indent.
    let mut header_end = decl;
    let mut parens = 0i64;
    for (j, line) in lines.iter().enumerate().take(limit).skip(decl) {
        if j > decl + MAX_SIGNATURE_LINES {
            break;
        }
        let code = line.split('#').next().unwrap_or("");
        parens += code.matches(['(', '[', '{']).count() as i64;
        parens -= code.matches([')', ']', '}']).count() as i64;
        if parens <= 0 && code.trim_end().ends_with(':') {
            header_end = j;
            break;
        }
        if parens <= 0 && j > decl {
            break;
        }
    }

    let mut last = header_end;
    for (k, line) in lines.iter().enumerate().take(limit).skip(header_end + 1) {
        if is_blank(line) {
            continue;
        }
        if indent_of(line) > level {
            last = k;
        } else {
            break;
        }
    }
    last
}

/// Move a span start up over decorator lines at the same indentation.
fn with_decorators(lines: &[&str], decl: usize, floor: usize) -> usize {
    let level = indent_of(lines[decl]);
    let mut start = decl;
    while start > floor {
        let prev = lines[start - 1];
        if indent_of(prev) == level && prev.trim_start().starts_with('@') {
            start -= 1;
        } else {
            break;
        }
    }
    start
}

impl ChunkStrategy for IndentStrategy {
    fn spans(&self, lines: &[&str], scope: Scope<'_>) -> Result<Vec<Span>, ChunkError> {
        let mut spans = Vec::new();

        match scope {
            Scope::TopLevel => {
                let mut i = 0;
                while i < lines.len() {
                    let line = lines[i];
                    let found = if indent_of(line) == 0 {
                        capture(&PY_DEF, line)
                            .map(|n| (ChunkType::Function, n))
                            .or_else(|| capture(&PY_CLASS, line).map(|n| (ChunkType::Class, n)))
                    } else {
                        None
                    };
                    if let Some((kind, name)) = found {
                        let end = indent_block_end(lines, i, lines.len());
                        let floor = spans.last().map_or(0, |s: &Span| s.end + 1);
                        spans.push(Span {
                            start: with_decorators(lines, i, floor),
                            end,
                            kind,
                            name,
                        });
                        i = end + 1;
                    } else {
                        i += 1;
                    }
                }
            }
            Scope::Body(owner) => {
                let limit = (owner.end + 1).min(lines.len());
                let Some(header) = (owner.start..limit).find(|&i| PY_CLASS.is_match(lines[i]))
                else {
                    return Ok(spans);
                };
                let base = indent_of(lines[header]);
                let Some(body_indent) = lines[header + 1..limit]
                    .iter()
                    .find(|l| !is_blank(l))
                    .map(|l| indent_of(l))
                    .filter(|&n| n > base)
                else {
                    return Ok(spans);
                };

                let mut i = header + 1;
                while i < limit {
                    let line = lines[i];
                    if indent_of(line) == body_indent
                        && let Some(name) = capture(&PY_DEF, line)
                    {
                        let end = indent_block_end(lines, i, limit);
                        let floor = spans.last().map_or(header + 1, |s: &Span| s.end + 1);
                        spans.push(Span {
                            start: with_decorators(lines, i, floor),
                            end,
                            kind: ChunkType::Method,
                            name: format!("{}.{name}", owner.name),
                        });
                        i = end + 1;
                    } else {
                        i += 1;
                    }
                }
            }
        }

        Ok(spans)
    }

    fn imports(&self, lines: &[&str]) -> Vec<usize> {
        collect_imports(lines, &[&PY_IMPORT], '(', ')')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &str) -> Vec<&str> {
        src.lines().collect()
    }

    fn top(lang: Lang, src: &str) -> Vec<Span> {
        strategy_for(lang)
            .spans(&lines(src), Scope::TopLevel)
            .unwrap()
    }

    #[test]
    fn rust_function_span() {
        let src = "use std::io;\n\nfn hello() {\n    println!(\"{}\", 1);\n}\n";
        let spans = top(Lang::Rust, src);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "hello");
        assert_eq!(spans[0].kind, ChunkType::Function);
        assert_eq!((spans[0].start, spans[0].end), (2, 4));
    }

    #[test]
    fn rust_impl_and_methods() {
        let src = r"struct Foo;

impl Display for Foo {
    fn fmt(&self) -> u8 {
        0
    }

    pub async fn other(&self) {}
}
";
        let all = lines(src);
        let strategy = strategy_for(Lang::Rust);
        let spans = strategy.spans(&all, Scope::TopLevel).unwrap();
        assert_eq!(spans.len(), 1, "unit struct has no body: {spans:?}");
        assert_eq!(spans[0].name, "Foo");
        assert_eq!(spans[0].kind, ChunkType::Class);

        let methods = strategy.spans(&all, Scope::Body(&spans[0])).unwrap();
        let names: Vec<_> = methods.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Foo.fmt", "Foo.other"]);
        assert!(methods.iter().all(|m| m.kind == ChunkType::Method));
    }

    #[test]
    fn braces_in_strings_and_comments_ignored() {
        let src = r#"fn a() {
    let s = "}}}";
    // } stray
    /* { */
    let c = '{';
}

fn b<'a>(x: &'a str) {}
"#;
        let spans = top(Lang::Rust, src);
        let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(spans[0].end, 5);
    }

    #[test]
    fn unbalanced_braces_error() {
        let src = "fn broken() {\n    if x {\n}\n";
        let err = strategy_for(Lang::Rust)
            .spans(&lines(src), Scope::TopLevel)
            .unwrap_err();
        assert!(matches!(err, ChunkError::Unbalanced { .. }));
    }

    #[test]
    fn stray_closing_brace_error() {
        let err = strategy_for(Lang::Go)
            .spans(&lines("}\nfunc main() {}\n"), Scope::TopLevel)
            .unwrap_err();
        assert_eq!(err, ChunkError::Unbalanced { line: 1 });
    }

    #[test]
    fn multiline_signature_found() {
        let src = "pub fn long(\n    a: u32,\n    b: u32,\n) -> u32\nwhere\n    u32: Copy,\n{\n    a + b\n}\n";
        let spans = top(Lang::Rust, src);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 8);
    }

    #[test]
    fn js_functions_arrows_and_classes() {
        let src = r"import { a } from './a';
const b = require('b');

export async function load(id) {
  return fetch(id);
}

const handler = async (req, res) => {
  res.send('ok');
};

class Session {
  constructor(user) {
    this.user = user;
  }

  isValid() {
    if (this.user) {
      return true;
    }
    return false;
  }
}
";
        let all = lines(src);
        let strategy = strategy_for(Lang::JavaScript);
        let spans = strategy.spans(&all, Scope::TopLevel).unwrap();
        let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["load", "handler", "Session"]);

        let methods = strategy.spans(&all, Scope::Body(&spans[2])).unwrap();
        let names: Vec<_> = methods.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Session.constructor", "Session.isValid"]);

        assert_eq!(strategy.imports(&all), vec![0, 1]);
    }

    #[test]
    fn ts_interface_is_class_like() {
        let src = "export interface User {\n  id: string;\n  name: string;\n}\n";
        let spans = top(Lang::TypeScript, src);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, ChunkType::Class);
        assert_eq!(spans[0].name, "User");
    }

    #[test]
    fn js_template_literal_spans_lines() {
        let src = "function render() {\n  return `\n  }\n  `;\n}\n";
        let spans = top(Lang::JavaScript, src);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 4);
    }

    #[test]
    fn go_methods_named_by_receiver() {
        let src = r#"package main

import (
	"fmt"
	"strings"
)

type Server struct {
	addr string
}

func (s *Server) Start() error {
	fmt.Println(s.addr)
	return nil
}

func main() {
	strings.ToUpper("x")
}
"#;
        let all = lines(src);
        let strategy = strategy_for(Lang::Go);
        let spans = strategy.spans(&all, Scope::TopLevel).unwrap();
        let named: Vec<_> = spans.iter().map(|s| (s.kind, s.name.as_str())).collect();
        assert_eq!(
            named,
            [
                (ChunkType::Class, "Server"),
                (ChunkType::Method, "Server.Start"),
                (ChunkType::Function, "main"),
            ]
        );
        assert_eq!(strategy.imports(&all), vec![2, 3, 4, 5]);
    }

    #[test]
    fn python_functions_and_decorators() {
        let src = r"import os
from typing import (
    List,
)

@cache
def load(path):
    return open(path)


def save(path,
         data):
    pass

x = 1
";
        let all = lines(src);
        let strategy = strategy_for(Lang::Python);
        let spans = strategy.spans(&all, Scope::TopLevel).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "load");
        assert_eq!((spans[0].start, spans[0].end), (5, 7));
        assert_eq!(spans[1].name, "save");
        assert_eq!((spans[1].start, spans[1].end), (10, 12));
        assert_eq!(strategy.imports(&all), vec![0, 1, 2, 3]);
    }

    #[test]
    fn python_class_methods() {
        let src = r#"class Greeter:
    """Says things."""

    def hello(self):
        print("hello")

    @staticmethod
    def goodbye():
        print("bye")
"#;
        let all = lines(src);
        let strategy = strategy_for(Lang::Python);
        let spans = strategy.spans(&all, Scope::TopLevel).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 8);

        let methods = strategy.spans(&all, Scope::Body(&spans[0])).unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "Greeter.hello");
        assert_eq!((methods[1].start, methods[1].end), (6, 8));
    }

    #[test]
    fn rust_use_blocks_collected() {
        let src = "use std::{\n    io,\n    fs,\n};\nuse crate::x;\n\nfn f() {}\n";
        assert_eq!(
            strategy_for(Lang::Rust).imports(&lines(src)),
            vec![0, 1, 2, 3, 4]
        );
    }
}
