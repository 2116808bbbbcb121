use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, HaplotagError>;

/// Everything that can stop a run. Data problems inside the stream (missing
/// tags, unmapped barcodes) are never errors; they are counted and logged.
#[derive(thiserror::Error, Debug)]
pub enum HaplotagError {
    #[error("Error opening file '{}': {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Error reading input: {0}")]
    Read(#[source] io::Error),

    #[error("Error writing: {0}")]
    Write(#[source] io::Error),

    #[error("Error writing log file '{}': {source}", path.display())]
    LogWrite { path: PathBuf, source: io::Error },

    #[error("Invalid whitelist entry on line {line}: {reason}")]
    Whitelist { line: usize, reason: String },

    #[error("Invalid segment table entry on line {line}: {reason}")]
    SegmentTable { line: usize, reason: String },

    #[error("Invalid clear barcode log row on line {line}: {reason}")]
    ClearLog { line: usize, reason: String },

    #[error("Background worker '{0}' panicked")]
    WorkerPanicked(&'static str),
}

pub enum ErrorKind {
    Usage,
    Io,
    Format,
}

impl From<&HaplotagError> for ErrorKind {
    fn from(err: &HaplotagError) -> Self {
        match err {
            HaplotagError::Whitelist { .. }
            | HaplotagError::SegmentTable { .. }
            | HaplotagError::ClearLog { .. } => ErrorKind::Format,
            _ => ErrorKind::Io,
        }
    }
}

pub fn exit_with_error(kind: ErrorKind, message: &str) -> ! {
    match kind {
        ErrorKind::Usage | ErrorKind::Io => log::error!("{}", message),
        ErrorKind::Format => log::error!("Malformed input, {}", message),
    }
    std::process::exit(1);
}
