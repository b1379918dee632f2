use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IngestError {
    Io { path: PathBuf, message: String },
    UnsupportedFormat(PathBuf),
    Parse { path: PathBuf, message: String },
    NoSheets(PathBuf),
    /// Two header cells fold to the same name.
    DuplicateHeader { path: PathBuf, header: String },
    /// Provider-level failure (lookup, pattern mismatch).
    Source(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::UnsupportedFormat(path) => {
                write!(f, "unsupported file type: {}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "cannot parse {}: {message}", path.display())
            }
            Self::NoSheets(path) => write!(f, "workbook has no sheets: {}", path.display()),
            Self::DuplicateHeader { path, header } => {
                write!(f, "duplicate header '{header}' in {}", path.display())
            }
            Self::Source(msg) => write!(f, "source error: {msg}"),
        }
    }
}

impl std::error::Error for IngestError {}

#[derive(Debug)]
pub enum ReportError {
    Io { path: PathBuf, message: String },
    Json(String),
    Workbook(String),
    Zip(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot write {}: {message}", path.display()),
            Self::Json(msg) => write!(f, "JSON serialization error: {msg}"),
            Self::Workbook(msg) => write!(f, "workbook error: {msg}"),
            Self::Zip(msg) => write!(f, "zip error: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {}

pub(crate) fn write_err(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |e| ReportError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
