//! Workspace file enumeration.
//!
//! Walks a root directory honoring the layered ignore ruleset (VCS ignore
//! files, the workspace `.quarryignore`, and a built-in list of artifact and
//! binary patterns) and emits a `path -> last-modified-millis` map for every
//! surviving file. The walk is restartable: the same filesystem state always
//! produces the same mapping.

mod error;
mod walk;

pub use error::{Result, WalkError};
pub use walk::{ContentWalker, WalkedFiles, WalkerConfig, WORKSPACE_IGNORE_FILENAME};
