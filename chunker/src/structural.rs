use crate::language::Language;
use crate::tokenizer::Tokenizer;
use crate::ChunkSpan;
use std::ops::Range;
use tree_sitter::{Node, Parser};

/// Result of a structural chunking attempt. `Fallback` routes the file to
/// the line chunker.
pub(crate) enum Outcome {
    Chunks(Vec<ChunkSpan>),
    Fallback,
}

pub(crate) fn chunk(
    language: Language,
    content: &str,
    max_chunk_size: usize,
    tokenizer: &dyn Tokenizer,
) -> crate::Result<Outcome> {
    if content.trim().is_empty() {
        return Ok(Outcome::Chunks(Vec::new()));
    }

    let mut parser = Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| crate::ChunkerError::Grammar(format!("{}: {e}", language.name())))?;
    let Some(tree) = parser.parse(content, None) else {
        return Ok(Outcome::Fallback);
    };
    let root = tree.root_node();
    if root.has_error() {
        return Ok(Outcome::Fallback);
    }

    if tokenizer.count(content) <= max_chunk_size {
        return Ok(Outcome::Chunks(vec![ChunkSpan {
            start_line: 0,
            end_line: content.lines().count().saturating_sub(1) as u32,
            content: content.to_string(),
            metadata: None,
        }]));
    }

    let mut spans = Vec::new();
    visit(root, language, content, max_chunk_size, tokenizer, &mut spans);
    Ok(Outcome::Chunks(spans))
}

/// Declaration-boundary walk. A node that fits becomes one chunk; a
/// recognized node that does not gets a collapsed form (nested bodies
/// replaced with a sentinel) before its children are visited individually.
fn visit(
    node: Node,
    language: Language,
    source: &str,
    max_chunk_size: usize,
    tokenizer: &dyn Tokenizer,
    out: &mut Vec<ChunkSpan>,
) {
    let text = match node.utf8_text(source.as_bytes()) {
        Ok(text) => text,
        Err(_) => return,
    };

    if tokenizer.count(text) <= max_chunk_size {
        if !text.trim().is_empty() {
            out.push(span_for(node, text.to_string()));
        }
        return;
    }

    if is_recognized(language, node.kind()) {
        if let Some(collapsed) = collapsed_form(node, language, source) {
            if tokenizer.count(&collapsed) <= max_chunk_size {
                out.push(span_for(node, collapsed));
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(child, language, source, max_chunk_size, tokenizer, out);
    }
}

fn span_for(node: Node, content: String) -> ChunkSpan {
    ChunkSpan {
        start_line: node.start_position().row as u32,
        end_line: node.end_position().row as u32,
        content,
        metadata: None,
    }
}

fn is_recognized(language: Language, kind: &str) -> bool {
    language.recognized_kinds().contains(&kind)
}

fn is_function_like(language: Language, kind: &str) -> bool {
    match language {
        Language::Rust => kind == "function_item",
        Language::Python => kind == "function_definition",
        Language::JavaScript | Language::TypeScript | Language::Tsx => matches!(
            kind,
            "function_declaration" | "generator_function_declaration" | "method_definition"
        ),
        Language::Go => matches!(kind, "function_declaration" | "method_declaration"),
        Language::Cpp => kind == "function_definition",
    }
}

/// The node's text with every top-most function body inside it replaced by
/// the language's sentinel. For a function node that is its own body; for a
/// class-like node the method signatures survive with collapsed bodies.
fn collapsed_form(node: Node, language: Language, source: &str) -> Option<String> {
    let mut bodies: Vec<Range<usize>> = Vec::new();
    collect_function_bodies(node, language, &mut bodies);
    if bodies.is_empty() {
        return None;
    }
    bodies.sort_by_key(|r| r.start);

    let bytes = source.as_bytes();
    let mut result = String::new();
    let mut pos = node.start_byte();
    for body in bodies {
        if body.start < pos {
            continue;
        }
        result.push_str(std::str::from_utf8(&bytes[pos..body.start]).ok()?);
        result.push_str(language.collapsed_sentinel());
        pos = body.end;
    }
    result.push_str(std::str::from_utf8(&bytes[pos..node.end_byte()]).ok()?);
    Some(result)
}

fn collect_function_bodies(node: Node, language: Language, out: &mut Vec<Range<usize>>) {
    if is_function_like(language, node.kind()) {
        if let Some(body) = node.child_by_field_name("body") {
            out.push(body.byte_range());
            return;
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_function_bodies(child, language, out);
    }
}
