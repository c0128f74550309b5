use crate::tokenizer::Tokenizer;
use crate::{line, ChunkSpan};

/// Split markdown by header depth. A section that fits the budget becomes
/// one chunk carrying its header as metadata; one that does not is split
/// again at the next header level with the header's token cost subtracted
/// from the budget. Past h6 the line chunker takes over.
pub(crate) fn chunk(content: &str, max_chunk_size: usize, tokenizer: &dyn Tokenizer) -> Vec<ChunkSpan> {
    let lines: Vec<&str> = content.lines().collect();
    let mut spans = Vec::new();
    split_section(&lines, 0, 1, max_chunk_size, None, tokenizer, &mut spans);
    spans
}

fn header_depth(line: &str) -> Option<usize> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes >= 1 && hashes <= 6 && line.as_bytes().get(hashes) == Some(&b' ') {
        Some(hashes)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn split_section(
    lines: &[&str],
    base_line: u32,
    level: usize,
    budget: usize,
    header: Option<&str>,
    tokenizer: &dyn Tokenizer,
    out: &mut Vec<ChunkSpan>,
) {
    if lines.is_empty() {
        return;
    }

    let joined = lines.join("\n");
    if joined.trim().is_empty() {
        return;
    }
    if tokenizer.count(&joined) <= budget {
        out.push(ChunkSpan {
            start_line: base_line,
            end_line: base_line + lines.len() as u32 - 1,
            content: joined,
            metadata: header.map(str::to_string),
        });
        return;
    }
    if level > 6 {
        out.extend(line::chunk_from(&joined, base_line, budget, tokenizer));
        return;
    }

    // Cut at headers of exactly this depth; deeper headers stay inside
    // their section and shallower ones cannot appear mid-section.
    let mut boundaries: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| header_depth(l) == Some(level))
        .map(|(i, _)| i)
        .collect();

    if boundaries.is_empty() {
        // No structure at this depth; try the next one down.
        split_section(lines, base_line, level + 1, budget, header, tokenizer, out);
        return;
    }

    // Preamble before the first header keeps the enclosing header.
    if boundaries[0] > 0 {
        split_section(
            &lines[..boundaries[0]],
            base_line,
            level + 1,
            budget,
            header,
            tokenizer,
            out,
        );
    }

    boundaries.push(lines.len());
    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        let section_header = lines[start];
        let header_cost = tokenizer.count(section_header);
        split_section(
            &lines[start..end],
            base_line + start as u32,
            level + 1,
            budget.saturating_sub(header_cost).max(1),
            Some(section_header),
            tokenizer,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ApproxTokenizer;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_document_is_one_chunk() {
        let spans = chunk("# Title\n\nSome text.", 100, &ApproxTokenizer);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 0);
        assert_eq!(spans[0].end_line, 2);
    }

    #[test]
    fn splits_by_top_level_headers() {
        let doc = "\
# One
alpha alpha alpha alpha alpha alpha alpha alpha
# Two
beta beta beta beta beta beta beta beta beta beta";
        let spans = chunk(doc, 16, &ApproxTokenizer);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].metadata.as_deref(), Some("# One"));
        assert_eq!(spans[1].metadata.as_deref(), Some("# Two"));
        assert!(spans[0].content.starts_with("# One"));
        assert_eq!(spans[1].start_line, 2);
    }

    #[test]
    fn recurses_into_subsections() {
        let doc = "\
# Top
intro intro intro intro intro intro intro intro
## Sub A
aaaa aaaa aaaa aaaa aaaa aaaa aaaa aaaa aaaa
## Sub B
bbbb bbbb bbbb bbbb bbbb bbbb bbbb bbbb bbbb";
        let spans = chunk(doc, 20, &ApproxTokenizer);

        assert!(spans.len() >= 3);
        assert!(spans
            .iter()
            .any(|s| s.metadata.as_deref() == Some("## Sub A")));
        assert!(spans
            .iter()
            .any(|s| s.metadata.as_deref() == Some("## Sub B")));
    }

    #[test]
    fn header_depth_detection() {
        assert_eq!(header_depth("# a"), Some(1));
        assert_eq!(header_depth("### a"), Some(3));
        assert_eq!(header_depth("####### too deep"), None);
        assert_eq!(header_depth("#nospace"), None);
        assert_eq!(header_depth("plain"), None);
    }

    #[test]
    fn headerless_oversize_text_falls_to_lines() {
        let doc = (0..12)
            .map(|i| format!("prose line {i} with several words"))
            .collect::<Vec<_>>()
            .join("\n");
        let spans = chunk(&doc, 16, &ApproxTokenizer);
        assert!(spans.len() > 1);
        assert!(spans.iter().all(|s| s.metadata.is_none()));
    }
}
