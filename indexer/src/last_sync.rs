use quarry_common::{IndexLayout, Tag};
use std::fs;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Record the completion time of a refresh under the tag's directory as an
/// ISO-8601 timestamp.
pub fn write_last_sync(layout: &IndexLayout, tag: &Tag) -> std::io::Result<()> {
    let path = layout.last_sync(tag);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    fs::write(path, now)
}

/// The last completed refresh for `tag`, if any.
pub fn read_last_sync(layout: &IndexLayout, tag: &Tag) -> Option<OffsetDateTime> {
    let raw = fs::read_to_string(layout.last_sync(tag)).ok()?;
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::ArtifactKind;
    use tempfile::TempDir;

    #[test]
    fn round_trips_timestamp() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path());
        let tag = Tag::new("/ws/p", "main", ArtifactKind::Chunks);

        assert!(read_last_sync(&layout, &tag).is_none());
        write_last_sync(&layout, &tag).unwrap();

        let stamp = read_last_sync(&layout, &tag).expect("timestamp written");
        let age = OffsetDateTime::now_utc() - stamp;
        assert!(age.whole_seconds() < 60);
    }
}
