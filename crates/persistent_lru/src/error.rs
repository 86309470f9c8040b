#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheErrorKind {
    InvalidCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    pub kind: CacheErrorKind,
    pub message: String,
}

impl CacheError {
    pub fn new(kind: CacheErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidVersion,
    InvalidCapacity,
    MissingOps,

    MissingCsvSection,
    MissingJsonSection,
    InvalidDelimiterLength,
    MissingCsvColumns,
    InvalidPath,

    UnknownOp,
    MissingKey,
    InvalidKey,
    MissingValue,
    UnexpectedValue,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidVersion => "InvalidVersion",
            ErrorCode::InvalidCapacity => "InvalidCapacity",
            ErrorCode::MissingOps => "MissingOps",
            ErrorCode::MissingCsvSection => "MissingCsvSection",
            ErrorCode::MissingJsonSection => "MissingJsonSection",
            ErrorCode::InvalidDelimiterLength => "InvalidDelimiterLength",
            ErrorCode::MissingCsvColumns => "MissingCsvColumns",
            ErrorCode::InvalidPath => "InvalidPath",
            ErrorCode::UnknownOp => "UnknownOp",
            ErrorCode::MissingKey => "MissingKey",
            ErrorCode::InvalidKey => "InvalidKey",
            ErrorCode::MissingValue => "MissingValue",
            ErrorCode::UnexpectedValue => "UnexpectedValue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<YamlLocation>,
    pub path: Option<String>,
}

impl ScriptError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.location = Some(YamlLocation { line, column });
        self
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {}:{}", location.line, location.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

pub type ValidationResult = Result<(), Vec<ScriptError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayErrorKind {
    InvalidInput,
    InvalidRecordsPath,
    InvalidCapacity,
    InvalidOp,
    ExpectationFailed,
}

impl ReplayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayErrorKind::InvalidInput => "InvalidInput",
            ReplayErrorKind::InvalidRecordsPath => "InvalidRecordsPath",
            ReplayErrorKind::InvalidCapacity => "InvalidCapacity",
            ReplayErrorKind::InvalidOp => "InvalidOp",
            ReplayErrorKind::ExpectationFailed => "ExpectationFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayError {
    pub kind: ReplayErrorKind,
    pub message: String,
    pub path: Option<String>,
}

impl ReplayError {
    pub fn new(kind: ReplayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{} (path: {})", self.message, path)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<CacheError> for ReplayError {
    fn from(err: CacheError) -> Self {
        ReplayError::new(ReplayErrorKind::InvalidCapacity, err.message).with_path("cache.capacity")
    }
}

impl From<csv::Error> for ReplayError {
    fn from(err: csv::Error) -> Self {
        ReplayError::new(ReplayErrorKind::InvalidInput, format!("csv error: {}", err))
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        ReplayError::new(ReplayErrorKind::InvalidInput, format!("json error: {}", err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayWarningKind {
    ZeroCapacity,
    ExpectationMismatch,
}

impl ReplayWarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayWarningKind::ZeroCapacity => "ZeroCapacity",
            ReplayWarningKind::ExpectationMismatch => "ExpectationMismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayWarning {
    pub kind: ReplayWarningKind,
    pub message: String,
    pub path: Option<String>,
}

impl ReplayWarning {
    pub fn new(kind: ReplayWarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}
