use quarry_common::PathAndCacheKey;

/// The minimal mutation set a refresh must apply for one tag.
///
/// `compute` is content the catalog has never seen under this artifact kind;
/// `add_tag`/`remove_tag` re-point existing artifacts at (or away from) this
/// tag; `del` is content no tag references any more. `update_last_updated`
/// entries had a newer mtime but unchanged contents and only need their
/// timestamp refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    pub compute: Vec<PathAndCacheKey>,
    pub del: Vec<PathAndCacheKey>,
    pub add_tag: Vec<PathAndCacheKey>,
    pub remove_tag: Vec<PathAndCacheKey>,
    pub update_last_updated: Vec<PathAndCacheKey>,
}

impl RefreshPlan {
    /// True when a refresh has nothing to apply to the sub-indexes.
    pub fn is_noop(&self) -> bool {
        self.compute.is_empty()
            && self.del.is_empty()
            && self.add_tag.is_empty()
            && self.remove_tag.is_empty()
    }

    /// Work units for progress accounting; `compute` items weigh four times
    /// as much as tag-only operations.
    pub fn work_units(&self) -> usize {
        self.compute.len() * 4
            + self.del.len()
            + self.add_tag.len()
            + self.remove_tag.len()
    }
}

/// Which operation a `mark_complete` call is acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    Compute,
    AddTag,
    RemoveTag,
    Del,
    UpdateLastUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quarry_common::CacheKey;

    fn item(path: &str) -> PathAndCacheKey {
        PathAndCacheKey::new(path, CacheKey::from_contents(path.as_bytes()))
    }

    #[test]
    fn empty_plan_is_noop() {
        assert!(RefreshPlan::default().is_noop());
    }

    #[test]
    fn timestamp_only_plan_is_noop() {
        let plan = RefreshPlan {
            update_last_updated: vec![item("a.txt")],
            ..Default::default()
        };
        assert!(plan.is_noop());
    }

    #[test]
    fn compute_is_weighted() {
        let plan = RefreshPlan {
            compute: vec![item("a.txt")],
            add_tag: vec![item("b.txt")],
            ..Default::default()
        };
        assert_eq!(plan.work_units(), 5);
    }
}
