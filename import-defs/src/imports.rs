use quarry_chunker::Language;
use tree_sitter::{Node, Parser};

/// One name pulled in by an import statement, with the position of the
/// symbol itself (where a `gotoDefinition` request should point).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedSymbol {
    pub name: String,
    pub line: u32,
    pub character: u32,
}

/// Parse `source` and return the symbols its import statements bind.
/// Languages without an import grammar here yield an empty list.
pub fn parse_imports(language: Language, source: &str) -> Vec<ImportedSymbol> {
    let mut parser = Parser::new();
    if parser.set_language(&language.grammar()).is_err() {
        return Vec::new();
    }
    let Some(tree) = parser.parse(source, None) else {
        return Vec::new();
    };

    let import_kinds: &[&str] = match language {
        Language::Rust => &["use_declaration"],
        Language::Python => &["import_statement", "import_from_statement"],
        Language::JavaScript | Language::TypeScript | Language::Tsx => &["import_statement"],
        Language::Go => &["import_declaration"],
        Language::Cpp => &[],
    };

    let mut symbols = Vec::new();
    let mut cursor = tree.root_node().walk();
    for node in tree.root_node().named_children(&mut cursor) {
        if import_kinds.contains(&node.kind()) {
            collect_bound_names(node, source, &mut symbols);
        }
    }
    symbols
}

/// The bound names are the trailing identifiers of import paths: the leaf
/// of a scoped path, each entry of an import list, or an alias target.
fn collect_bound_names(node: Node, source: &str, out: &mut Vec<ImportedSymbol>) {
    let kind = node.kind();
    if kind == "identifier" || kind == "type_identifier" || kind == "package_identifier" {
        if is_trailing_segment(node) {
            if let Ok(name) = node.utf8_text(source.as_bytes()) {
                out.push(ImportedSymbol {
                    name: name.to_string(),
                    line: node.start_position().row as u32,
                    character: node.start_position().column as u32,
                });
            }
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_bound_names(child, source, out);
    }
}

/// True when this identifier ends its enclosing path: `c` in `a::b::c`,
/// `name` in `from m import name`, every entry of `{x, y}` lists.
fn is_trailing_segment(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    match parent.kind() {
        // Path-shaped parents: only the last segment binds a name.
        "scoped_identifier" | "scoped_use_list" | "dotted_name" | "member_expression" => {
            node.next_named_sibling().is_none()
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(language: Language, source: &str) -> Vec<String> {
        parse_imports(language, source)
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    #[test]
    fn rust_use_paths_bind_their_leaves() {
        let source = "use std::collections::HashMap;\nuse crate::walk::Walker;\n";
        let found = names(Language::Rust, source);
        assert!(found.contains(&"HashMap".to_string()), "{found:?}");
        assert!(found.contains(&"Walker".to_string()));
        assert!(!found.contains(&"std".to_string()));
    }

    #[test]
    fn rust_use_lists_bind_every_entry() {
        let source = "use std::io::{Read, Write};\n";
        let found = names(Language::Rust, source);
        assert!(found.contains(&"Read".to_string()), "{found:?}");
        assert!(found.contains(&"Write".to_string()));
    }

    #[test]
    fn python_from_import() {
        let source = "from os.path import join\nimport sys\n";
        let found = names(Language::Python, source);
        assert!(found.contains(&"join".to_string()), "{found:?}");
        assert!(found.contains(&"sys".to_string()));
    }

    #[test]
    fn typescript_named_imports() {
        let source = "import { readFile, writeFile } from 'fs';\nimport React from 'react';\n";
        let found = names(Language::TypeScript, source);
        assert!(found.contains(&"readFile".to_string()), "{found:?}");
        assert!(found.contains(&"writeFile".to_string()));
        assert!(found.contains(&"React".to_string()));
    }

    #[test]
    fn positions_point_at_the_symbol() {
        let source = "use std::collections::HashMap;\n";
        let symbols = parse_imports(Language::Rust, source);
        let hashmap = symbols
            .iter()
            .find(|s| s.name == "HashMap")
            .expect("HashMap symbol");
        assert_eq!(hashmap.line, 0);
        assert_eq!(
            hashmap.character as usize,
            source.find("HashMap").unwrap()
        );
    }

    #[test]
    fn cpp_yields_nothing() {
        assert!(names(Language::Cpp, "#include <vector>\n").is_empty());
    }

    #[test]
    fn file_without_imports_yields_nothing() {
        assert!(names(Language::Rust, "fn main() {}\n").is_empty());
    }
}
