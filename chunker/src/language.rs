use std::path::Path;

/// Source languages with tree-sitter grammars wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Cpp,
}

impl Language {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "rs" => Some(Language::Rust),
            "py" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "go" => Some(Language::Go),
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::Cpp => "cpp",
        }
    }

    /// Node kinds worth emitting as standalone chunks: class-like,
    /// function-like, and method-like declarations.
    pub(crate) fn recognized_kinds(self) -> &'static [&'static str] {
        match self {
            Language::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "mod_item",
            ],
            Language::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            Language::JavaScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
            ],
            Language::TypeScript | Language::Tsx => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "abstract_class_declaration",
                "method_definition",
                "interface_declaration",
                "enum_declaration",
            ],
            Language::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            Language::Cpp => &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
                "namespace_definition",
            ],
        }
    }

    /// What a collapsed body looks like in this language.
    pub(crate) fn collapsed_sentinel(self) -> &'static str {
        match self {
            Language::Python => "...",
            _ => "{ ... }",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_by_extension() {
        assert_eq!(Language::from_path(Path::new("a/b/lib.rs")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("app.tsx")), Some(Language::Tsx));
        assert_eq!(Language::from_path(Path::new("x.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("notes.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }
}
