use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn acquisition_exhausted(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_ACQUISITION_EXHAUSTED", message, trace_id)
    }

    pub fn cancelled(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_CANCELLED", message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

/// Keeps a caller-supplied trace id, or mints a fresh one.
pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Why a raw dump could not be turned into a canonical tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    MissingPayload(&'static str),
    Malformed(String),
    Empty,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::MissingPayload(marker) => write!(f, "no {marker} found in dump"),
            ParseFailure::Malformed(detail) => write!(f, "malformed dump: {detail}"),
            ParseFailure::Empty => write!(f, "dump contained no elements"),
        }
    }
}

impl std::error::Error for ParseFailure {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    AcquisitionExhausted,
    Cancelled,
}

impl AcquireError {
    pub fn into_app_error(self, trace_id: &str) -> AppError {
        match self {
            AcquireError::AcquisitionExhausted => AppError::acquisition_exhausted(
                "Neither uiautomator nor dumpsys produced a UI tree",
                trace_id,
            ),
            AcquireError::Cancelled => AppError::cancelled("UI state acquisition cancelled", trace_id),
        }
    }
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::AcquisitionExhausted => write!(f, "all acquisition methods failed"),
            AcquireError::Cancelled => write!(f, "acquisition cancelled"),
        }
    }
}

impl std::error::Error for AcquireError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    ElementNotFound { index: usize, available: Vec<usize> },
    MissingBounds { index: usize, bounds: Option<String> },
    TargetObscured { index: usize },
}

impl TapError {
    pub fn code(&self) -> &'static str {
        match self {
            TapError::ElementNotFound { .. } => "ERR_ELEMENT_NOT_FOUND",
            TapError::MissingBounds { .. } => "ERR_MISSING_BOUNDS",
            TapError::TargetObscured { .. } => "ERR_TARGET_OBSCURED",
        }
    }

    pub fn into_app_error(self, trace_id: &str) -> AppError {
        AppError::new(self.code(), self.to_string(), trace_id)
    }
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapError::ElementNotFound { index, available } => {
                if available.is_empty() {
                    return write!(f, "No element found with index {index}; no elements cached");
                }
                let shown = available
                    .iter()
                    .take(20)
                    .map(|idx| idx.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if available.len() > 20 {
                    write!(
                        f,
                        "No element found with index {index}. Available indices: {shown}... and {} more",
                        available.len() - 20
                    )
                } else {
                    write!(f, "No element found with index {index}. Available indices: {shown}")
                }
            }
            TapError::MissingBounds { index, bounds: None } => {
                write!(f, "Element {index} has no bounds and cannot be tapped")
            }
            TapError::MissingBounds {
                index,
                bounds: Some(bounds),
            } => write!(f, "Invalid bounds format for element {index}: {bounds}"),
            TapError::TargetObscured { index } => {
                write!(f, "Element {index} is fully obscured by overlapping elements")
            }
        }
    }
}

impl std::error::Error for TapError {}
