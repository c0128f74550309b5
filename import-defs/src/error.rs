use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportDefsError {
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),

    #[error("import parsing failed: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ImportDefsError>;
