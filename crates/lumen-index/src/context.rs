//! Text rendering for chunks: what gets embedded and what the completion
//! model sees.

use std::fmt::Write as _;

use crate::chunker::Chunk;
use crate::store::ScoredChunk;

/// Text sent to the embedding service for `chunk`.
///
/// Prepends the file path, language and entity so conceptual questions
/// ("where is auth handled?") land near the right code.
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + 128);

    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push('\n');

    text.push_str("# Language: ");
    text.push_str(&chunk.language);
    text.push('\n');

    if !chunk.name.is_empty() {
        let _ = writeln!(text, "# {}: {}", chunk.chunk_type, chunk.name);
    }

    text.push_str(&chunk.content);
    text
}

/// Short one-line label for a chunk.
#[must_use]
pub fn chunk_display_header(chunk: &Chunk) -> String {
    let name = if chunk.name.is_empty() {
        chunk.chunk_type.as_str()
    } else {
        &chunk.name
    };
    format!(
        "{} :: {} (lines {}-{})",
        chunk.file_path, name, chunk.start_line, chunk.end_line
    )
}

/// Similarity as a whole percentage.
#[must_use]
pub fn similarity_percent(similarity: f32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = (similarity.clamp(0.0, 1.0) * 100.0).round() as u32;
    pct
}

/// Retrieved chunks as labelled blocks for the completion prompt.
#[must_use]
pub fn format_as_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");

    for scored in chunks {
        let chunk = &scored.chunk;
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" type=\"{}\" name=\"{}\" language=\"{}\" lines=\"{}-{}\" similarity=\"{}%\">",
            chunk.file_path,
            chunk.chunk_type,
            chunk.name,
            chunk.language,
            chunk.start_line,
            chunk.end_line,
            similarity_percent(scored.similarity),
        );
        out.push_str(&chunk.content);
        out.push_str("\n  </chunk>\n");
    }

    out.push_str("</code_context>");
    out
}
