use thiserror::Error;

/// Configuration could not be read, parsed or accepted.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Problems turning a raw dataset row into a [`crate::dataset::Document`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    /// A mapped field is missing from the row.
    #[error("dataset field '{field}' not found (available fields: {})", available.join(", "))]
    Field {
        field: String,
        available: Vec<String>,
    },
    /// A field exists but its value cannot be used.
    #[error("invalid dataset value: {0}")]
    Value(String),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl DatasetError {
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error("numeric scale requires min_value <= max_value (got {min_value} > {max_value})")]
    InvertedRange { min_value: i64, max_value: i64 },
    #[error("custom_category scale requires at least one category")]
    NoCategories,
    #[error("custom_category scale lists '{0}' more than once")]
    DuplicateCategory(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidelineError {
    #[error("guideline name must not be empty")]
    EmptyName,
    #[error("guideline '{name}' prompt must contain '{placeholder}' exactly once (found {found})")]
    Placeholder {
        name: String,
        placeholder: &'static str,
        found: usize,
    },
    #[error("guideline '{name}' has an invalid scoring scale: {source}")]
    Scale {
        name: String,
        #[source]
        source: ScaleError,
    },
    #[error("guideline '{0}' already exists")]
    Duplicate(String),
}

/// Failure of a single judge item. Kept per item so one bad answer never
/// poisons the rest of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgeError {
    /// The endpoint could not be reached, timed out or returned an error status.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The endpoint answered, but the answer violates the scale's contract.
    #[error("answer contract violation: {0}")]
    Contract(String),
    #[error("gave up after {attempts} attempts; last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<JudgeError>,
    },
}

impl JudgeError {
    /// Short machine-readable kind, stored alongside the message in events.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Transport(_) => "transport",
            JudgeError::Contract(_) => "contract",
            JudgeError::Exhausted { last, .. } => last.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("run {run_id} is already {status}; terminal runs are immutable")]
    TerminalRun { run_id: String, status: String },
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}
