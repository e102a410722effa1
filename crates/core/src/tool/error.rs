use std::borrow::Cow;
use std::fmt::{self, Display};

use serde_json::{Map, Value};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input provided to the tool was invalid.
    InvalidInput,
    /// The requested destination, currency, etc. doesn't exist.
    NotFound,
    /// Error occurred while executing the tool.
    ExecutionError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "Invalid input"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::ExecutionError => write!(f, "Execution error"),
        }
    }
}

/// Describes a tool call error.
///
/// Tool errors never fail a turn. They are handed back to the model as a
/// payload, optionally with a guidance telling the model how to carry on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
    guidance: Option<String>,
}

impl Error {
    #[inline]
    fn with_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            reason: None,
            guidance: None,
        }
    }

    /// Creates a new error with the `InvalidInput` kind.
    #[inline]
    pub fn invalid_input() -> Self {
        Self::with_kind(ErrorKind::InvalidInput)
    }

    /// Creates a new error with the `NotFound` kind.
    #[inline]
    pub fn not_found() -> Self {
        Self::with_kind(ErrorKind::NotFound)
    }

    /// Creates a new error with the `ExecutionError` kind.
    #[inline]
    pub fn execution_error() -> Self {
        Self::with_kind(ErrorKind::ExecutionError)
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a guidance for the model to the error.
    #[inline]
    pub fn with_guidance<S: Into<String>>(mut self, guidance: S) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }

    /// Returns the guidance, if any.
    #[inline]
    pub fn guidance(&self) -> Option<&str> {
        self.guidance.as_deref()
    }

    /// Converts the error into the payload handed back to the model.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("error".to_owned(), Value::from(self.reason()));
        if let Some(guidance) = &self.guidance {
            payload.insert("guidance".to_owned(), Value::from(guidance.clone()));
        }
        Value::Object(payload)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason())
    }
}

impl std::error::Error for Error {}
