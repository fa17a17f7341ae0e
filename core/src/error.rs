use thiserror::Error;

/// Errors surfaced by the filesystem engine and the block device layer.
///
/// Every operation fails synchronously with one of these; the engine never
/// recovers silently and never terminates the process on malformed input.
#[derive(Debug, Error)]
pub enum FfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("access beyond end of device: offset {offset}, len {len}, device size {size}")]
    OutOfRange { offset: u64, len: usize, size: u64 },

    #[error("malformed image: {0}")]
    MalformedImage(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("no space left on volume")]
    NoSpace,

    #[error("name already exists: {0}")]
    NameConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("entry is not a {0}")]
    TypeMismatch(&'static str),

    #[error("attribute is not settable")]
    InvalidAttr,

    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl From<FfsError> for std::io::Error {
    fn from(err: FfsError) -> Self {
        match err {
            FfsError::Io(inner) => inner,
            other => std::io::Error::other(other),
        }
    }
}
