use crate::language::Language;
use crate::tokenizer::Tokenizer;
use crate::{line, markdown, structural, Result};
use log::warn;
use quarry_common::{CacheKey, Chunk};
use std::path::Path;

/// Chunk one file. Strategy is selected by extension; the structural
/// chunker falls back to the line chunker on parse failure. Produced chunks
/// are 0-indexed, contiguous, and each fits `max_chunk_size` tokens;
/// candidates that do not fit are dropped with a warning.
pub fn chunk_document(
    path: &str,
    contents: &str,
    max_chunk_size: usize,
    digest: &CacheKey,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>> {
    let spans = match Language::from_path(Path::new(path)) {
        Some(language) => match structural::chunk(language, contents, max_chunk_size, tokenizer)? {
            structural::Outcome::Chunks(spans) => spans,
            structural::Outcome::Fallback => {
                warn!("structural chunker could not parse {path}; falling back to lines");
                line::chunk(contents, max_chunk_size, tokenizer)
            }
        },
        None if is_markdown(path) => markdown::chunk(contents, max_chunk_size, tokenizer),
        None => line::chunk(contents, max_chunk_size, tokenizer),
    };

    let mut chunks = Vec::with_capacity(spans.len());
    for span in spans {
        if tokenizer.count(&span.content) > max_chunk_size {
            warn!(
                "dropping oversized chunk from {path} (lines {}..{})",
                span.start_line, span.end_line
            );
            continue;
        }
        let index = chunks.len() as u32;
        let mut chunk = Chunk::new(
            digest.clone(),
            index,
            path,
            span.start_line,
            span.end_line,
            span.content,
        );
        chunk.metadata = span.metadata;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn is_markdown(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ApproxTokenizer;
    use pretty_assertions::assert_eq;

    fn digest() -> CacheKey {
        CacheKey::from_contents(b"test contents")
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let content = (0..20)
            .map(|i| format!("line {i} with some padding text"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks =
            chunk_document("notes.txt", &content, 20, &digest(), &ApproxTokenizer).unwrap();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
            assert_eq!(chunk.digest, digest());
            assert_eq!(chunk.filepath, "notes.txt");
            assert!(chunk.start_line <= chunk.end_line);
        }
    }

    #[test]
    fn every_chunk_fits_the_budget() {
        let content = (0..50)
            .map(|i| format!("a somewhat longer line of text number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        for max in [10, 25, 80] {
            let chunks =
                chunk_document("notes.txt", &content, max, &digest(), &ApproxTokenizer).unwrap();
            assert!(chunks
                .iter()
                .all(|c| ApproxTokenizer.count(&c.content) <= max));
        }
    }

    #[test]
    fn markdown_goes_to_the_markdown_chunker() {
        let content = "# Title\n\nbody text";
        let chunks =
            chunk_document("README.md", content, 100, &digest(), &ApproxTokenizer).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("# Title"));
    }

    #[test]
    fn rust_goes_to_the_structural_chunker() {
        let content = "\
fn alpha_function_with_padding() -> i32 {
    1 + 2 + 3 + 4 + 5 + 6
}

fn beta_function_with_padding() -> i32 {
    7 + 8 + 9 + 10 + 11
}
";
        let chunks = chunk_document("src/lib.rs", content, 20, &digest(), &ApproxTokenizer).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("fn alpha_function"));
    }

    #[test]
    fn unparseable_source_falls_back_to_lines() {
        let content = "fn broken( {{{{ not rust at all\nsecond line";
        let chunks = chunk_document("bad.rs", content, 100, &digest(), &ApproxTokenizer).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn single_small_file_is_one_chunk() {
        let chunks =
            chunk_document("a.txt", "hello\nworld\n", 100, &digest(), &ApproxTokenizer).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 0);
        assert_eq!(chunks[0].end_line, 1);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunks = chunk_document("a.txt", "", 100, &digest(), &ApproxTokenizer).unwrap();
        assert!(chunks.is_empty());
    }
}
