use crate::tokenizer::Tokenizer;
use crate::ChunkSpan;

/// Tokens reserved below the budget so a chunk never lands exactly on it.
const MARGIN: usize = 5;

/// Greedy line accumulation: keep adding lines while the running total stays
/// under `max_chunk_size - MARGIN`, then emit and continue. `base_line` is
/// the 0-based line number of `content`'s first line in the original file.
pub(crate) fn chunk(content: &str, max_chunk_size: usize, tokenizer: &dyn Tokenizer) -> Vec<ChunkSpan> {
    chunk_from(content, 0, max_chunk_size, tokenizer)
}

pub(crate) fn chunk_from(
    content: &str,
    base_line: u32,
    max_chunk_size: usize,
    tokenizer: &dyn Tokenizer,
) -> Vec<ChunkSpan> {
    let budget = max_chunk_size.saturating_sub(MARGIN).max(1);
    let mut spans = Vec::new();

    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;
    let mut current_start = 0u32;

    let flush = |spans: &mut Vec<ChunkSpan>, lines: &[&str], start: u32, end: u32| {
        let content = lines.join("\n");
        if content.trim().is_empty() {
            return;
        }
        spans.push(ChunkSpan {
            start_line: base_line + start,
            end_line: base_line + end,
            content,
            metadata: None,
        });
    };

    for (i, line) in content.lines().enumerate() {
        let line_tokens = tokenizer.count(line);
        if !current.is_empty() && current_tokens + line_tokens > budget {
            flush(&mut spans, &current, current_start, i as u32 - 1);
            current.clear();
            current_tokens = 0;
            current_start = i as u32;
        }
        current.push(line);
        current_tokens += line_tokens;
    }
    if !current.is_empty() {
        let end = content.lines().count() as u32 - 1;
        flush(&mut spans, &current, current_start, end);
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ApproxTokenizer;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_content_is_one_chunk() {
        let spans = chunk("hello\nworld", 100, &ApproxTokenizer);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 0);
        assert_eq!(spans[0].end_line, 1);
        assert_eq!(spans[0].content, "hello\nworld");
    }

    #[test]
    fn splits_when_budget_exceeded() {
        // Each line is ~5 tokens; a budget of 20 minus the margin fits two.
        let content = (0..6)
            .map(|i| format!("line number {i} padding"))
            .collect::<Vec<_>>()
            .join("\n");
        let spans = chunk(&content, 20, &ApproxTokenizer);

        assert!(spans.len() > 1);
        // Line ranges tile the file without gaps.
        assert_eq!(spans[0].start_line, 0);
        for pair in spans.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
        assert_eq!(spans.last().unwrap().end_line, 5);
    }

    #[test]
    fn whitespace_only_content_yields_nothing() {
        assert!(chunk("\n  \n\n", 100, &ApproxTokenizer).is_empty());
    }

    #[test]
    fn base_line_offsets_ranges() {
        let spans = chunk_from("a\nb", 10, 100, &ApproxTokenizer);
        assert_eq!(spans[0].start_line, 10);
        assert_eq!(spans[0].end_line, 11);
    }
}
