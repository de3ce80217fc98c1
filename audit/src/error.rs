//! Error types and result definitions for audit pipeline operations.
//!
//! Provides a single error system with classification, aggregation, and captured
//! diagnostic metadata. The [`AuditError`] type supports single errors, errors with
//! additional detail, and multiple aggregated errors from worker failures.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type using [`AuditError`] as the error type.
pub type AuditResult<T> = Result<T, AuditError>;

/// Detailed payload stored for single [`AuditError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for audit pipeline operations.
///
/// [`AuditError`] can represent a single classified error or multiple
/// aggregated errors, while always carrying the callsite location and a
/// captured backtrace for diagnostics.
#[derive(Debug, Clone)]
pub struct AuditError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture multiple worker failures.
    Many {
        errors: Vec<AuditError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur in the audit pipeline.
///
/// The kinds mirror the failure taxonomy of the pipeline: transient source
/// I/O is retried, malformed events are skipped, an unavailable resume
/// position is fatal, and configuration errors reject a reload without
/// touching the active state.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Stream source errors
    SourceConnectionFailed,
    SourceIoError,
    /// The requested resume position was purged upstream. Fatal: skipping
    /// forward silently would corrupt audit completeness.
    PositionUnavailable,
    /// A single event could not be decoded or normalized. The event is
    /// skipped and counted, the pipeline continues.
    MalformedEvent,

    // Data & transformation errors
    ConversionError,
    InvalidData,

    // Configuration errors
    ConfigError,
    ValidationError,

    // Storage errors
    StorageConnectionFailed,
    StorageQueryFailed,

    // IO & serialization errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & workflow errors
    InvalidState,
    ConsumerWorkerPanic,
    PersistWorkerPanic,

    // Unknown / uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns true if errors of this kind are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed | ErrorKind::SourceIoError | ErrorKind::IoError
        )
    }
}

impl AuditError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns true if this error should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates an [`AuditError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        AuditError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for AuditError {
    fn eq(&self, other: &AuditError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for AuditError {
    /// Hashes the error using only its stable identifying components, the
    /// kind and static description, so that errors of the same category
    /// group together regardless of dynamic detail.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                std::mem::discriminant(&self.repr).hash(state);
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                std::mem::discriminant(&self.repr).hash(state);
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for AuditError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| &**source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`AuditError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for AuditError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> AuditError {
        AuditError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`AuditError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for AuditError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> AuditError {
        AuditError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates an [`AuditError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly
/// without wrapping it.
impl<E> From<Vec<E>> for AuditError
where
    E: Into<AuditError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> AuditError {
        let location = Location::caller();

        let mut errors: Vec<AuditError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        AuditError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`AuditError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for AuditError {
    #[track_caller]
    fn from(err: std::io::Error) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`AuditError`] with the appropriate error kind.
impl From<serde_json::Error> for AuditError {
    #[track_caller]
    fn from(err: serde_json::Error) -> AuditError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`std::str::Utf8Error`] to [`AuditError`] with [`ErrorKind::ConversionError`].
impl From<std::str::Utf8Error> for AuditError {
    #[track_caller]
    fn from(err: std::str::Utf8Error) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("UTF-8 conversion failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`AuditError`] with [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for AuditError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`regex::Error`] to [`AuditError`] with [`ErrorKind::ConfigError`].
///
/// Pattern compilation only happens for configured table patterns and the
/// analyzer catalog, so a failure always indicates bad configuration.
impl From<regex::Error> for AuditError {
    #[track_caller]
    fn from(err: regex::Error) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Pattern compilation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`AuditError`] with the appropriate error kind.
///
/// Maps database errors to [`ErrorKind::StorageQueryFailed`], I/O errors to
/// [`ErrorKind::IoError`], and connection pool errors to
/// [`ErrorKind::StorageConnectionFailed`].
impl From<sqlx::Error> for AuditError {
    #[track_caller]
    fn from(err: sqlx::Error) -> AuditError {
        let kind = match &err {
            sqlx::Error::Database(_) => ErrorKind::StorageQueryFailed,
            sqlx::Error::Io(_) => ErrorKind::IoError,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::StorageConnectionFailed
            }
            _ => ErrorKind::StorageQueryFailed,
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            kind,
            Cow::Borrowed("Change store operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`config::shared::ValidationError`] to [`AuditError`] with
/// [`ErrorKind::ValidationError`].
impl From<config::shared::ValidationError> for AuditError {
    #[track_caller]
    fn from(err: config::shared::ValidationError) -> AuditError {
        let detail = err.to_string();
        let source = Arc::new(err);
        AuditError::from_components(
            ErrorKind::ValidationError,
            Cow::Borrowed("Configuration validation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
