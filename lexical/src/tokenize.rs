/// Split text into search terms: words and identifiers, lowercased, with
/// camelCase and digit boundaries contributing sub-tokens alongside the
/// full identifier. Underscores and other punctuation separate tokens, so
/// snake_case splits for free.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_lowercase();
        let parts = split_camel(word);
        if parts.len() > 1 {
            for part in parts {
                terms.push(part.to_lowercase());
            }
        }
        terms.push(lower);
    }
    terms
}

fn split_camel(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let cur = chars[i];
        let boundary = (prev.is_lowercase() && cur.is_uppercase())
            || (prev.is_alphabetic() && cur.is_numeric())
            || (prev.is_numeric() && cur.is_alphabetic())
            // HTTPServer -> HTTP, Server
            || (prev.is_uppercase()
                && cur.is_uppercase()
                && chars.get(i + 1).is_some_and(|next| next.is_lowercase()));
        if boundary {
            parts.push(chars[start..i].iter().collect());
            start = i;
        }
    }
    parts.push(chars[start..].iter().collect());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_words_and_case_folds() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn snake_case_splits_on_underscore() {
        assert_eq!(tokenize("read_file"), vec!["read", "file"]);
    }

    #[test]
    fn camel_case_yields_subtokens_and_whole() {
        assert_eq!(
            tokenize("readFile"),
            vec!["read", "file", "readfile"]
        );
    }

    #[test]
    fn acronym_boundaries() {
        let terms = tokenize("HTTPServer");
        assert!(terms.contains(&"http".to_string()));
        assert!(terms.contains(&"server".to_string()));
    }

    #[test]
    fn digits_split() {
        let terms = tokenize("sha256sum");
        assert!(terms.contains(&"sha".to_string()));
        assert!(terms.contains(&"256".to_string()));
        assert!(terms.contains(&"sum".to_string()));
    }

    #[test]
    fn empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("... --- !!!").is_empty());
    }
}
