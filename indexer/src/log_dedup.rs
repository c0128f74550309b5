use log::warn;
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Deduplicates repeated identical indexing errors by message hash so one
/// broken file does not flood the log during a large refresh.
#[derive(Default)]
pub(crate) struct ErrorDedup {
    seen: HashSet<u64>,
    suppressed: usize,
}

impl ErrorDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: &str) {
        let mut hasher = DefaultHasher::new();
        message.hash(&mut hasher);
        if self.seen.insert(hasher.finish()) {
            warn!("{message}");
        } else {
            self.suppressed += 1;
        }
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_suppressed_repeats() {
        let mut dedup = ErrorDedup::new();
        dedup.warn("same message");
        dedup.warn("same message");
        dedup.warn("other message");
        dedup.warn("same message");
        assert_eq!(dedup.suppressed(), 2);
    }
}
