use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ItemNotFound,
    StageNotFound,
    ProjectNotFound,
    ReadonlyField,
    InvalidEnumValue,
    CorruptStore,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ItemNotFound => "E2001",
            Self::StageNotFound => "E2002",
            Self::ProjectNotFound => "E2003",
            Self::ReadonlyField => "E2004",
            Self::InvalidEnumValue => "E2005",
            Self::CorruptStore => "E3001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ItemNotFound => "Item not found",
            Self::StageNotFound => "Stage not found",
            Self::ProjectNotFound => "Project not found",
            Self::ReadonlyField => "Field is system-derived",
            Self::InvalidEnumValue => "Invalid enumerated value",
            Self::CorruptStore => "Corrupt SQLite store",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tally init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .tally/config.toml and retry."),
            Self::ItemNotFound => None,
            Self::StageNotFound => Some("List known stages with `tally stage list`."),
            Self::ProjectNotFound => Some("List known projects with `tally project list`."),
            Self::ReadonlyField => {
                Some("created/done timestamps and report periods are maintained by the tracker.")
            }
            Self::InvalidEnumValue => Some("Use one of the documented values."),
            Self::CorruptStore => Some("Restore .tally/tally.db from a backup."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Domain failures raised by the store and configuration layers.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("no tally project found at {0}")]
    NotInitialized(String),

    #[error("failed to parse {path}: {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("item '{0}' not found")]
    ItemNotFound(String),

    #[error("stage '{0}' not found")]
    StageNotFound(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("field '{0}' is system-derived and cannot be written by a user")]
    ReadonlyField(&'static str),

    #[error("invalid {expected}: '{got}'")]
    InvalidEnumValue { expected: &'static str, got: String },

    #[error("stored timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}

impl TallyError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::StageNotFound(_) => ErrorCode::StageNotFound,
            Self::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            Self::ReadonlyField(_) => ErrorCode::ReadonlyField,
            Self::InvalidEnumValue { .. } => ErrorCode::InvalidEnumValue,
            Self::TimestampOutOfRange(_) => ErrorCode::CorruptStore,
        }
    }

    /// Remediation text, falling back to the generic code message.
    #[must_use]
    pub fn suggestion(&self) -> String {
        let code = self.error_code();
        code.hint().unwrap_or_else(|| code.message()).to_string()
    }
}
