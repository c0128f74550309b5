use crate::tag::{escape_dir, Tag};
use std::path::{Path, PathBuf};

/// Resolves every on-disk location the index uses, all rooted under one
/// per-user directory:
///
/// ```text
/// <root>/index/index.sqlite
/// <root>/index/tags/<dir-escaped>/<branch>/<artifactId>/merkle_tree
/// <root>/index/tags/<dir-escaped>/<branch>/<artifactId>/last_sync
/// <root>/index/embeddings/<providerId>__<model>[__<chunkSize>]/
/// <root>/index/lexical/<dir-escaped>/<branch>/
/// ```
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_db(&self) -> PathBuf {
        self.root.join("index").join("index.sqlite")
    }

    pub fn tag_dir(&self, tag: &Tag) -> PathBuf {
        self.root
            .join("index")
            .join("tags")
            .join(escape_dir(&tag.dir))
            .join(&tag.branch)
            .join(tag.artifact.as_str())
    }

    pub fn merkle_tree(&self, tag: &Tag) -> PathBuf {
        self.tag_dir(tag).join("merkle_tree")
    }

    pub fn last_sync(&self, tag: &Tag) -> PathBuf {
        self.tag_dir(tag).join("last_sync")
    }

    pub fn embeddings_dir(
        &self,
        provider_id: &str,
        model: &str,
        chunk_size: Option<usize>,
    ) -> PathBuf {
        let name = match chunk_size {
            Some(size) => format!("{provider_id}__{model}__{size}"),
            None => format!("{provider_id}__{model}"),
        };
        self.root.join("index").join("embeddings").join(name)
    }

    pub fn lexical_dir(&self, dir: &Path, branch: &str) -> PathBuf {
        self.root
            .join("index")
            .join("lexical")
            .join(escape_dir(dir))
            .join(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::ArtifactKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths_follow_layout() {
        let layout = IndexLayout::new("/home/dev/.quarry");
        let tag = Tag::new("/home/dev/proj", "main", ArtifactKind::Embeddings);

        assert_eq!(
            layout.catalog_db(),
            PathBuf::from("/home/dev/.quarry/index/index.sqlite")
        );
        assert_eq!(
            layout.merkle_tree(&tag),
            PathBuf::from("/home/dev/.quarry/index/tags/homedevproj/main/embeddings/merkle_tree")
        );
        assert_eq!(
            layout.embeddings_dir("openai", "text-embedding-3-small", Some(512)),
            PathBuf::from("/home/dev/.quarry/index/embeddings/openai__text-embedding-3-small__512")
        );
        assert_eq!(
            layout.lexical_dir(Path::new("/home/dev/proj"), "main"),
            PathBuf::from("/home/dev/.quarry/index/lexical/homedevproj/main")
        );
    }
}
