use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("inconsistent constraints: {0}")]
    InconsistentConstraints(&'static str),
    #[error("constraint violation: {0}")]
    ConstraintViolation(&'static str),
    #[error("invalid strategy: {0}")]
    InvalidStrategy(&'static str),
    #[error("fused buffer not allowed")]
    FusedBufferNotAllowed,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("out of bounds: {0}")]
    OutOfBounds(&'static str),
    #[error("buffer is read-only")]
    ReadOnlyBuffer,
    #[error("invalid schema: {0}")]
    InvalidSchema(&'static str),
    #[error("archive format error: {0}")]
    Format(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Platform error code of an underlying system failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
