use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Process-wide registry of workspaces with a refresh in flight.
static ACTIVE: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Single-holder mutual exclusion per workspace directory. Dropping the
/// lease releases it. Retrieval never takes a lease; only refreshes do.
pub(crate) struct RefreshLease {
    dir: PathBuf,
}

impl RefreshLease {
    /// `None` when another refresh already holds this workspace.
    pub fn try_acquire(dir: &Path) -> Option<Self> {
        let mut active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
        if active.insert(dir.to_path_buf()) {
            Some(Self {
                dir: dir.to_path_buf(),
            })
        } else {
            None
        }
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        let mut active = ACTIVE.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.dir);
    }
}
