use std::fmt;

/// Errors from the convenience entry points.
///
/// Source-level trouble (bad literals, missing includes, malformed
/// directives) is not an error: it is recorded as a
/// [`Problem`](crate::Problem) and scanning continues.
#[derive(Debug)]
pub enum ScanError {
    /// Reading the input file failed
    Io(std::io::Error),
    /// The scan was cancelled through a [`CancelHandle`](crate::CancelHandle)
    Cancelled,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Io(err) => write!(f, "I/O error: {err}"),
            ScanError::Cancelled => write!(f, "scan cancelled"),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err)
    }
}
