//! Import-definitions sidecar.
//!
//! For the file the user has open, parse its import statements, resolve each
//! imported symbol through the IDE's `goto_definition`, read the target
//! range, and keep the results in a small LRU keyed by file path. On an
//! active-editor change the new file is pre-warmed asynchronously so the
//! next retrieval or autocomplete call finds it hot.

mod error;
mod imports;
mod service;

pub use error::{ImportDefsError, Result};
pub use imports::{parse_imports, ImportedSymbol};
pub use service::{FileImports, ImportDefinitionsService, ResolvedImport};
