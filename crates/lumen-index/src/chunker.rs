//! Structural chunking under a token budget, with a sliding-window fallback.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, IndexError, Result};
use crate::languages::{Lang, language_id_for_path};
use crate::source::SourceFile;
use crate::strategy::{ChunkStrategy, Scope, Span, strategy_for};

/// Rough token estimate used for every budget decision: four characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Class,
    Method,
    File,
    Block,
}

impl ChunkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::File => "file",
            Self::Block => "block",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bounded unit of a source file. Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub content: String,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub name: String,
    pub estimated_tokens: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub file_path: String,
    pub chunk_index: usize,
    pub total_chunks_in_file: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Token budget for chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Structural spans below this are dropped (default: 50).
    pub min_chunk_size: usize,
    /// Hard ceiling for every chunk except the error fallback (default: 1500).
    pub max_chunk_size: usize,
    /// Tokens repeated between consecutive windows (default: 150).
    pub overlap_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 50,
            max_chunk_size: 1500,
            overlap_size: 150,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `IndexError::Validation` unless `min < max` and `overlap < max`.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(IndexError::Validation(
                "max_chunk_size must be positive".into(),
            ));
        }
        if self.min_chunk_size >= self.max_chunk_size {
            return Err(IndexError::Validation(format!(
                "min_chunk_size ({}) must be below max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(IndexError::Validation(format!(
                "overlap_size ({}) must be below max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Lines carried into the next window: `floor(overlap / (tokens / lines))`.
///
/// A window averaging zero tokens per line carries nothing, and the result is
/// always strictly fewer lines than the window so each window makes progress.
#[must_use]
pub fn overlap_lines(overlap: usize, tokens: usize, lines: usize) -> usize {
    if overlap == 0 || tokens == 0 || lines == 0 {
        return 0;
    }
    (overlap.saturating_mul(lines) / tokens).min(lines - 1)
}

/// Chunks for one file and the reason it fell back to a whole-file chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    /// Set when structural chunking failed and the file became one
    /// [`ChunkType::File`] chunk.
    pub fallback: Option<ChunkError>,
}

struct FileCtx<'a> {
    path: &'a str,
    language: String,
    file_name: String,
    lines: Vec<&'a str>,
}

/// Splits files into chunks using a per-language [`ChunkStrategy`].
pub struct Chunker {
    config: ChunkerConfig,
    strategies: HashMap<Lang, Box<dyn ChunkStrategy>>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut langs: Vec<_> = self.strategies.keys().map(|l| l.id()).collect();
        langs.sort_unstable();
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .field("strategies", &langs)
            .finish()
    }
}

impl Chunker {
    /// Chunker with the built-in strategies for every [`Lang`].
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Validation` for an inconsistent budget.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        let strategies = Lang::ALL
            .into_iter()
            .map(|lang| (lang, strategy_for(lang)))
            .collect();
        Ok(Self { config, strategies })
    }

    /// Replace the strategy used for `lang`.
    #[must_use]
    pub fn with_strategy(mut self, lang: Lang, strategy: Box<dyn ChunkStrategy>) -> Self {
        self.strategies.insert(lang, strategy);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk one file. Never fails: a file whose structure cannot be followed
    /// becomes a single whole-file chunk.
    #[must_use]
    pub fn chunk(&self, file: &SourceFile) -> Vec<Chunk> {
        self.chunk_file(file).chunks
    }

    /// Like [`Chunker::chunk`], also reporting why structural chunking was
    /// abandoned when the file degraded to a whole-file chunk.
    #[must_use]
    pub fn chunk_file(&self, file: &SourceFile) -> ChunkOutcome {
        if file.content.trim().is_empty() {
            return ChunkOutcome::default();
        }

        let path = Path::new(&file.path);
        let language = if file.language.is_empty() {
            language_id_for_path(path)
        } else {
            file.language.clone()
        };
        let lang = Lang::from_id(&language).or_else(|| Lang::from_path(path));
        let ctx = FileCtx {
            path: &file.path,
            file_name: path
                .file_name()
                .map_or_else(|| file.path.clone(), |n| n.to_string_lossy().into_owned()),
            language,
            lines: file.content.lines().collect(),
        };

        let mut fallback = None;
        let mut chunks = match lang.and_then(|l| self.strategies.get(&l)) {
            Some(strategy) => match self.structural(&ctx, strategy.as_ref()) {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(path = %file.path, "structural chunking failed, using whole file: {e}");
                    fallback = Some(e);
                    vec![self.whole_file(&ctx, &file.content)]
                }
            },
            None => self.window(&ctx, 0, ctx.lines.len(), &ctx.file_name),
        };

        let total = chunks.len();
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.chunk_index = i;
            chunk.total_chunks_in_file = total;
        }
        tracing::debug!(path = %file.path, chunks = total, "chunked");
        ChunkOutcome { chunks, fallback }
    }

    fn structural(
        &self,
        ctx: &FileCtx<'_>,
        strategy: &dyn ChunkStrategy,
    ) -> std::result::Result<Vec<Chunk>, ChunkError> {
        let spans = strategy.spans(&ctx.lines, Scope::TopLevel)?;
        let header = self.import_header(&ctx.lines, &strategy.imports(&ctx.lines))?;

        let mut out = Vec::new();
        for span in &spans {
            self.emit_span(ctx, strategy, span, &header, &mut out)?;
        }

        // Nothing structural survived: index the file as a whole if it fits.
        if out.is_empty() {
            let content = ctx.lines.join("\n");
            if estimate_tokens(&content) <= self.config.max_chunk_size {
                out.push(self.whole_file(ctx, &content));
            } else {
                out = self.window(ctx, 0, ctx.lines.len(), &ctx.file_name);
            }
        }
        Ok(out)
    }

    fn emit_span(
        &self,
        ctx: &FileCtx<'_>,
        strategy: &dyn ChunkStrategy,
        span: &Span,
        header: &str,
        out: &mut Vec<Chunk>,
    ) -> std::result::Result<(), ChunkError> {
        if span.start > span.end || span.end >= ctx.lines.len() {
            return Err(ChunkError::SpanOutOfRange {
                start: span.start,
                end: span.end,
                lines: ctx.lines.len(),
            });
        }
        let body = ctx.lines[span.start..=span.end].join("\n");
        let content = if header.is_empty() {
            body
        } else {
            format!("{header}\n\n{body}")
        };
        let tokens = estimate_tokens(&content);

        if tokens < self.config.min_chunk_size {
            tracing::trace!(path = ctx.path, name = %span.name, tokens, "span below minimum, dropped");
            return Ok(());
        }
        if tokens <= self.config.max_chunk_size {
            out.push(make_chunk(
                ctx,
                content,
                span.kind,
                span.name.clone(),
                span.start,
                span.end,
            ));
            return Ok(());
        }

        if span.kind == ChunkType::Class {
            let members = strategy.spans(&ctx.lines, Scope::Body(span))?;
            if !members.is_empty() {
                return self.emit_members(ctx, strategy, span, &members, header, out);
            }
        }

        let mut part = 0;
        self.window_into(ctx, span.start, span.end + 1, &span.name, &mut part, out);
        Ok(())
    }

    /// Members of an oversized class, with the class lines between them
    /// (header, fields, constants, docstrings) windowed as
    /// `"<Class> (part k)"` blocks in line order.
    fn emit_members(
        &self,
        ctx: &FileCtx<'_>,
        strategy: &dyn ChunkStrategy,
        class: &Span,
        members: &[Span],
        header: &str,
        out: &mut Vec<Chunk>,
    ) -> std::result::Result<(), ChunkError> {
        let mut part = 0;
        let mut covered = class.start;
        for member in members {
            if member.start > covered {
                let to = member.start.min(class.end + 1);
                self.gap_into(ctx, covered, to, &class.name, &mut part, out);
            }
            self.emit_span(ctx, strategy, member, header, out)?;
            covered = covered.max(member.end + 1);
        }
        if covered <= class.end {
            self.gap_into(ctx, covered, class.end + 1, &class.name, &mut part, out);
        }
        Ok(())
    }

    /// Window lines `from..to` unless they hold nothing but punctuation and
    /// whitespace.
    fn gap_into(
        &self,
        ctx: &FileCtx<'_>,
        from: usize,
        to: usize,
        base: &str,
        part: &mut usize,
        out: &mut Vec<Chunk>,
    ) {
        let to = to.min(ctx.lines.len());
        if from >= to {
            return;
        }
        let has_text = ctx.lines[from..to]
            .iter()
            .any(|line| line.chars().any(char::is_alphanumeric));
        if has_text {
            self.window_into(ctx, from, to, base, part, out);
        }
    }

    /// Import lines joined in file order, truncated at a line boundary to a
    /// quarter of the chunk budget.
    fn import_header(
        &self,
        lines: &[&str],
        indices: &[usize],
    ) -> std::result::Result<String, ChunkError> {
        let cap = self.config.max_chunk_size / 4;
        let mut header = String::new();
        let mut chars = 0usize;
        for &i in indices {
            let Some(line) = lines.get(i) else {
                return Err(ChunkError::SpanOutOfRange {
                    start: i,
                    end: i,
                    lines: lines.len(),
                });
            };
            let len = line.chars().count();
            let grown = if header.is_empty() { len } else { chars + 1 + len };
            if grown / 4 > cap {
                break;
            }
            if !header.is_empty() {
                header.push('\n');
            }
            header.push_str(line);
            chars = grown;
        }
        Ok(header)
    }

    fn whole_file(&self, ctx: &FileCtx<'_>, content: &str) -> Chunk {
        make_chunk(
            ctx,
            content.to_string(),
            ChunkType::File,
            ctx.file_name.clone(),
            0,
            ctx.lines.len().saturating_sub(1),
        )
    }

    /// Sliding-window chunks over lines `from..to`, named `"<base> (part k)"`.
    fn window(&self, ctx: &FileCtx<'_>, from: usize, to: usize, base: &str) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut part = 0;
        self.window_into(ctx, from, to, base, &mut part, &mut out);
        out
    }

    /// Append windows over `from..to` to `out`, numbering parts from `part`.
    fn window_into(
        &self,
        ctx: &FileCtx<'_>,
        from: usize,
        to: usize,
        base: &str,
        part: &mut usize,
        out: &mut Vec<Chunk>,
    ) {
        let max = self.config.max_chunk_size.max(1);

        let mut pieces: Vec<(usize, &str)> = Vec::new();
        for (i, line) in ctx.lines.iter().enumerate().take(to).skip(from) {
            if estimate_tokens(line) <= max {
                pieces.push((i, line));
                continue;
            }
            let mut rest: &str = line;
            while !rest.is_empty() {
                let cut = rest
                    .char_indices()
                    .nth(max * 4)
                    .map_or(rest.len(), |(b, _)| b);
                pieces.push((i, &rest[..cut]));
                rest = &rest[cut..];
            }
        }

        let mut win: Vec<(usize, &str)> = Vec::new();
        let mut win_chars = 0usize;
        let mut seeded = 0usize;

        for piece in pieces {
            let len = piece.1.chars().count();
            if !win.is_empty() && (win_chars + 1 + len) / 4 > max {
                let keep = self.flush(ctx, &win, base, part, out);
                win.drain(..win.len() - keep);
                win_chars = joined_chars(&win);
                seeded = win.len();
                if !win.is_empty() && (win_chars + 1 + len) / 4 > max {
                    win.clear();
                    win_chars = 0;
                    seeded = 0;
                }
            }
            win_chars = if win.is_empty() {
                len
            } else {
                win_chars + 1 + len
            };
            win.push(piece);
        }

        if win.len() > seeded {
            self.flush(ctx, &win, base, part, out);
        }
    }

    /// Emit one window and return how many trailing lines seed the next.
    fn flush(
        &self,
        ctx: &FileCtx<'_>,
        win: &[(usize, &str)],
        base: &str,
        part: &mut usize,
        out: &mut Vec<Chunk>,
    ) -> usize {
        let content = win.iter().map(|(_, t)| *t).collect::<Vec<_>>().join("\n");
        let tokens = estimate_tokens(&content);
        if !content.trim().is_empty() {
            *part += 1;
            out.push(make_chunk(
                ctx,
                content,
                ChunkType::Block,
                format!("{base} (part {part})"),
                win[0].0,
                win[win.len() - 1].0,
            ));
        }
        overlap_lines(self.config.overlap_size, tokens, win.len())
    }
}

fn joined_chars(win: &[(usize, &str)]) -> usize {
    let text: usize = win.iter().map(|(_, t)| t.chars().count()).sum();
    text + win.len().saturating_sub(1)
}

fn make_chunk(
    ctx: &FileCtx<'_>,
    content: String,
    chunk_type: ChunkType,
    name: String,
    start: usize,
    end: usize,
) -> Chunk {
    Chunk {
        estimated_tokens: estimate_tokens(&content),
        content,
        chunk_type,
        name,
        start_line: start + 1,
        end_line: end + 1,
        language: ctx.language.clone(),
        file_path: ctx.path.to_string(),
        chunk_index: 0,
        total_chunks_in_file: 0,
        embedding: None,
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use proptest::prelude::*;

    use super::*;

    fn chunker(min: usize, max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            min_chunk_size: min,
            max_chunk_size: max,
            overlap_size: overlap,
        })
        .unwrap()
    }

    fn file(path: &str, content: &str) -> SourceFile {
        SourceFile::new(path, content)
    }

    fn rust_fn(name: &str, body_lines: usize) -> String {
        let mut src = format!("fn {name}() {{\n");
        for i in 0..body_lines {
            let _ = writeln!(src, "    let value_{i} = compute({i});");
        }
        src.push_str("}\n");
        src
    }

    #[test]
    fn thirty_line_function_is_one_chunk() {
        let src = rust_fn("process_payment", 28);
        assert_eq!(src.lines().count(), 30);
        let chunks = chunker(10, 1500, 100).chunk(&file("src/pay.rs", &src));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Function);
        assert_eq!(chunks[0].name, "process_payment");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 30));
        assert_eq!(chunks[0].language, "rust");
    }

    #[test]
    fn small_spans_dropped() {
        let src = format!("{}\nfn tiny() {{}}\n", rust_fn("big_enough", 10));
        let chunks = chunker(20, 1500, 0).chunk(&file("a.rs", &src));
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["big_enough"]);
    }

    #[test]
    fn imports_prepended_to_each_chunk() {
        let src = format!(
            "use std::io;\nuse std::fs;\n\n{}\n{}",
            rust_fn("read_all", 5),
            rust_fn("write_all", 5)
        );
        let chunks = chunker(10, 1500, 0).chunk(&file("io.rs", &src));
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert!(c.content.starts_with("use std::io;\nuse std::fs;\n\nfn "));
        }
        assert_eq!(chunks[1].start_line, 12);
    }

    #[test]
    fn import_header_capped_at_quarter_budget() {
        let mut src = String::new();
        for i in 0..200 {
            let _ = writeln!(src, "use crate::module_{i}::Item;");
        }
        src.push_str(&rust_fn("main", 3));
        let c = chunker(5, 200, 0);
        let chunks = c.chunk(&file("main.rs", &src));
        assert_eq!(chunks.len(), 1);
        let header = chunks[0].content.split("\n\nfn main").next().unwrap();
        assert!(estimate_tokens(header) <= 50);
        assert!(chunks[0].estimated_tokens <= 200);
    }

    #[test]
    fn oversized_class_split_by_method() {
        let mut src = String::from("class Ledger:\n");
        for m in ["credit", "debit", "balance"] {
            let _ = writeln!(src, "    def {m}(self, amount):");
            for i in 0..8 {
                let _ = writeln!(src, "        self.total_{i} = self.total_{i} + amount");
            }
        }
        let chunks = chunker(20, 200, 0).chunk(&file("ledger.py", &src));
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            ["Ledger (part 1)", "Ledger.credit", "Ledger.debit", "Ledger.balance"]
        );
        assert_eq!(chunks[0].chunk_type, ChunkType::Block);
        assert_eq!(chunks[0].content, "class Ledger:");
        assert!(chunks[1..].iter().all(|c| c.chunk_type == ChunkType::Method));
        assert!(chunks.iter().all(|c| c.estimated_tokens <= 200));
    }

    #[test]
    fn oversized_class_keeps_lines_outside_methods() {
        let mut src = String::from("class Rates:\n    \"\"\"VAT rates per region.\"\"\"\n");
        for i in 0..40 {
            let _ = writeln!(src, "    REGION_{i}_VAT_RATE = 0.{:02}", 10 + i);
        }
        src.push_str("    def apply(self, region, amount):\n");
        for i in 0..6 {
            let _ = writeln!(src, "        step_{i} = amount * getattr(self, region) + {i}");
        }
        src.push_str("    FALLBACK_RATE = 0.2\n");

        let c = chunker(5, 120, 0);
        let chunks = c.chunk(&file("rates.py", &src));
        assert!(chunks.iter().any(|c| c.name == "Rates.apply"));
        let parts: Vec<_> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Block)
            .collect();
        assert!(parts.len() > 1);
        for (k, part) in parts.iter().enumerate() {
            assert_eq!(part.name, format!("Rates (part {})", k + 1));
        }
        for line in src.lines().filter(|l| l.chars().any(char::is_alphanumeric)) {
            assert!(
                chunks.iter().any(|c| c.content.lines().any(|l| l == line)),
                "{line:?} not indexed"
            );
        }
        assert_budget(&chunks, c.config());
        for pair in chunks.windows(2) {
            assert!(pair[0].start_line <= pair[1].start_line);
        }
    }

    #[test]
    fn oversized_function_split_into_parts() {
        let src = rust_fn("giant", 120);
        let chunks = chunker(10, 150, 20).chunk(&file("giant.rs", &src));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_type, ChunkType::Block);
            assert_eq!(c.name, format!("giant (part {})", i + 1));
            assert!(c.estimated_tokens <= 150, "{} tokens", c.estimated_tokens);
        }
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, 122);
    }

    #[test]
    fn windows_overlap() {
        let content: String = (0..60).map(|i| format!("line number {i:03} of notes\n")).collect();
        let chunks = chunker(5, 60, 20).chunk(&file("notes.txt", &content));
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line, "windows should overlap");
            assert!(pair[1].start_line > pair[0].start_line, "windows must progress");
        }
        assert_eq!(chunks[0].language, "text");
    }

    #[test]
    fn zero_overlap_windows_are_disjoint() {
        let content: String = (0..40).map(|i| format!("entry {i:03} value\n")).collect();
        let chunks = chunker(5, 40, 0).chunk(&file("data.csv", &content));
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
    }

    #[test]
    fn overlap_zero_average_policy() {
        assert_eq!(overlap_lines(100, 0, 50), 0);
        assert_eq!(overlap_lines(0, 10, 5), 0);
        // 100 tokens over 10 lines: 10 per line, 25 tokens of overlap → 2 lines.
        assert_eq!(overlap_lines(25, 100, 10), 2);
        // Never the whole window.
        assert_eq!(overlap_lines(1000, 10, 4), 3);
    }

    #[test]
    fn blank_heavy_file_terminates() {
        let content = format!("{}word\n{}", "\n".repeat(500), "\n".repeat(500));
        let chunks = chunker(1, 10, 5).chunk(&file("blank.txt", &content));
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.content.trim() == "word"));
    }

    #[test]
    fn long_line_hard_split() {
        let content = "x".repeat(1000);
        let chunks = chunker(1, 50, 0).chunk(&file("min.js.map", &content));
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.estimated_tokens <= 50));
        assert!(chunks.iter().all(|c| c.start_line == 1));
    }

    #[test]
    fn unbalanced_file_falls_back_to_whole_file() {
        let src = "fn broken() {\n    if x {\n        y();\n}\n";
        let chunks = chunker(1, 1500, 0).chunk(&file("broken.rs", src));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::File);
        assert_eq!(chunks[0].name, "broken.rs");
        assert_eq!(chunks[0].content, src);
    }

    #[test]
    fn no_structure_small_file_is_file_chunk() {
        let src = "const LIMIT: usize = 10;\nstatic NAME: &str = \"lumen\";\n";
        let chunks = chunker(1, 1500, 0).chunk(&file("consts.rs", src));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::File);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
    }

    #[test]
    fn empty_file_has_no_chunks() {
        assert!(chunker(1, 100, 0).chunk(&file("empty.rs", "  \n\n")).is_empty());
    }

    #[test]
    fn chunk_indices_assigned() {
        let src = format!("{}{}{}", rust_fn("a", 6), rust_fn("b", 6), rust_fn("c", 6));
        let chunks = chunker(10, 1500, 0).chunk(&file("abc.rs", &src));
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks_in_file, 3);
        }
    }

    #[test]
    fn language_hint_overrides_extension() {
        let src = rust_fn("from_hint", 10);
        let mut f = file("snippet.txt", &src);
        f.language = "rust".into();
        let chunks = chunker(10, 1500, 0).chunk(&f);
        assert_eq!(chunks[0].chunk_type, ChunkType::Function);
    }

    #[test]
    fn custom_strategy_replaces_builtin() {
        struct Nothing;
        impl ChunkStrategy for Nothing {
            fn spans(
                &self,
                _lines: &[&str],
                _scope: Scope<'_>,
            ) -> std::result::Result<Vec<Span>, ChunkError> {
                Err(ChunkError::Unterminated)
            }
            fn imports(&self, _lines: &[&str]) -> Vec<usize> {
                Vec::new()
            }
        }
        let c = chunker(1, 1500, 0).with_strategy(Lang::Rust, Box::new(Nothing));
        let chunks = c.chunk(&file("x.rs", &rust_fn("x", 3)));
        assert_eq!(chunks[0].chunk_type, ChunkType::File);
    }

    #[test]
    fn fallback_reason_reported() {
        let src = "fn broken() {\n    if x {\n        y();\n}\n";
        let outcome = chunker(1, 1500, 0).chunk_file(&file("broken.rs", src));
        assert_eq!(outcome.chunks.len(), 1);
        assert!(matches!(outcome.fallback, Some(ChunkError::Unbalanced { .. })));

        let clean = chunker(1, 1500, 0).chunk_file(&file("ok.rs", &rust_fn("ok", 3)));
        assert!(clean.fallback.is_none());
    }

    struct PastEnd;

    impl ChunkStrategy for PastEnd {
        fn spans(
            &self,
            lines: &[&str],
            _scope: Scope<'_>,
        ) -> std::result::Result<Vec<Span>, ChunkError> {
            Ok(vec![Span {
                start: 0,
                end: lines.len() + 5,
                kind: ChunkType::Function,
                name: "runaway".into(),
            }])
        }
        fn imports(&self, _lines: &[&str]) -> Vec<usize> {
            Vec::new()
        }
    }

    #[test]
    fn span_past_end_of_file_falls_back() {
        let src = rust_fn("short", 1);
        let c = chunker(1, 1500, 0).with_strategy(Lang::Rust, Box::new(PastEnd));
        let outcome = c.chunk_file(&file("short.rs", &src));
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].chunk_type, ChunkType::File);
        assert_eq!(outcome.chunks[0].content, src);
        assert_eq!(
            outcome.fallback,
            Some(ChunkError::SpanOutOfRange {
                start: 0,
                end: 8,
                lines: 3
            })
        );
    }

    #[test]
    fn import_index_past_end_falls_back() {
        struct BadImports;
        impl ChunkStrategy for BadImports {
            fn spans(
                &self,
                _lines: &[&str],
                _scope: Scope<'_>,
            ) -> std::result::Result<Vec<Span>, ChunkError> {
                Ok(Vec::new())
            }
            fn imports(&self, lines: &[&str]) -> Vec<usize> {
                vec![lines.len()]
            }
        }
        let c = chunker(1, 1500, 0).with_strategy(Lang::Rust, Box::new(BadImports));
        let outcome = c.chunk_file(&file("lib.rs", &rust_fn("lib", 2)));
        assert_eq!(outcome.chunks[0].chunk_type, ChunkType::File);
        assert!(matches!(
            outcome.fallback,
            Some(ChunkError::SpanOutOfRange { .. })
        ));
    }

    #[test]
    fn invalid_budget_rejected() {
        let err = Chunker::new(ChunkerConfig {
            min_chunk_size: 100,
            max_chunk_size: 100,
            overlap_size: 0,
        })
        .unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert!(
            ChunkerConfig {
                min_chunk_size: 1,
                max_chunk_size: 100,
                overlap_size: 100,
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn chunk_serializes_camel_case() {
        let chunks = chunker(10, 1500, 0).chunk(&file("a.rs", &rust_fn("a", 10)));
        let json = serde_json::to_value(&chunks[0]).unwrap();
        assert_eq!(json["type"], "function");
        assert!(json.get("estimatedTokens").is_some());
        assert!(json.get("totalChunksInFile").is_some());
        assert!(json.get("embedding").is_none());
    }

    fn generated_rust(bodies: &[Vec<String>]) -> String {
        let mut src = String::from("use std::collections::HashMap;\n\n");
        for (i, body) in bodies.iter().enumerate() {
            let _ = writeln!(src, "fn generated_{i}() {{");
            for line in body {
                let _ = writeln!(src, "    {line}");
            }
            src.push_str("}\n\n");
        }
        src
    }

    fn assert_budget(chunks: &[Chunk], config: &ChunkerConfig) {
        for c in chunks {
            match c.chunk_type {
                ChunkType::Function | ChunkType::Class | ChunkType::Method => {
                    assert!(c.estimated_tokens >= config.min_chunk_size, "{c:?}");
                    assert!(c.estimated_tokens <= config.max_chunk_size, "{c:?}");
                }
                ChunkType::Block | ChunkType::File => {
                    assert!(c.estimated_tokens <= config.max_chunk_size, "{c:?}");
                }
            }
        }
    }

    proptest! {
        #[test]
        fn structural_chunking_deterministic_and_bounded(
            bodies in prop::collection::vec(
                prop::collection::vec("[a-z ]{0,60}", 0..40),
                1..6,
            ),
            min in 1usize..40,
            extra in 20usize..400,
            overlap in 0usize..20,
        ) {
            let c = chunker(min, min + extra, overlap.min(min + extra - 1));
            let f = file("gen.rs", &generated_rust(&bodies));
            let first = c.chunk(&f);
            let second = c.chunk(&f);
            prop_assert_eq!(&first, &second);
            assert_budget(&first, c.config());
        }

        #[test]
        fn window_chunks_bounded(
            lines in prop::collection::vec("[a-zA-Z0-9 ]{0,300}", 0..200),
            max in 2usize..200,
            overlap_pct in 0usize..100,
        ) {
            let overlap = (max - 1) * overlap_pct / 100;
            let c = chunker(1, max, overlap);
            let chunks = c.chunk(&file("notes.txt", &lines.join("\n")));
            assert_budget(&chunks, c.config());
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].start_line >= pair[0].start_line);
            }
        }
    }
}
