use pod5_format::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("signature mismatch at {0}")]
    SignatureMismatch(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container format error: {0}")]
    Format(#[from] FormatError),
    #[error("signal loader worker panicked: {0}")]
    WorkerPanic(String),
}
