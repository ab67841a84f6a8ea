//! Error types for configuration, buffer registration, and stage execution.
//!
//! This module declares focused, composable error types used across the pool
//! driver and the stage pipeline. Each error carries enough context to make
//! failures actionable while remaining small and cheap to pass around or
//! convert into higher-level variants like [`PipelineError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g. a
//!   run parameter out of range, a buffer view requested at the wrong type,
//!   a duplicate buffer name).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into aggregate
//!   enums so call sites can bubble with `?`.
//! * **Actionability:** Structured fields (offending parameter, expected vs.
//!   actual type names, stage and buffer names) make failure messages useful
//!   without reproducing the issue.
//!
//! ## Error classes
//! Configuration errors are **fatal at startup**: the driver refuses to
//! construct with a degenerate population or pool. Registration and view
//! errors are **programmer errors** — they indicate miswired buffers or
//! stages, never a transient runtime condition, so nothing in this crate
//! retries.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::types::AccessMode;

/// Crate-wide result alias.
pub type CoreResult<T> = Result<T, CoreError>;

/// Returned when a run parameter fails validation at startup.
///
/// ### Fields
/// * `parameter` — Name of the offending configuration field.
/// * `value` — The rejected value, rendered as text.
/// * `constraint` — Human-readable statement of the violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidParameterError {
    /// Name of the offending configuration field.
    pub parameter: &'static str,
    /// The rejected value, rendered as text.
    pub value: String,
    /// The violated constraint.
    pub constraint: &'static str,
}

impl fmt::Display for InvalidParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid run parameter `{}`: {} ({})",
            self.parameter, self.value, self.constraint
        )
    }
}

impl std::error::Error for InvalidParameterError {}

/// Returned when the configured spawn bounds enclose no volume.
///
/// Every axis must satisfy `min < max`; a collapsed or inverted axis would
/// degenerate spawn sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegenerateBoundsError {
    /// Configured lower corner.
    pub min: [f32; 3],
    /// Configured upper corner.
    pub max: [f32; 3],
}

impl fmt::Display for DegenerateBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degenerate spawn bounds: min {:?} must be strictly below max {:?} on every axis",
            self.min, self.max
        )
    }
}

impl std::error::Error for DegenerateBoundsError {}

/// Fatal configuration error detected at initialization.
///
/// The driver must abort startup on any of these; proceeding would create
/// degenerate buffers (see the crate-level error policy).
#[derive(Debug)]
pub enum ConfigError {
    /// A scalar run parameter is out of range.
    Parameter(InvalidParameterError),
    /// The spawn bounds enclose no volume.
    Bounds(DegenerateBoundsError),
    /// A configuration file could not be read.
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A configuration file could not be parsed as TOML.
    Parse {
        /// Path of the file that failed to parse.
        path: String,
        /// Underlying TOML deserialization failure.
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parameter(e) => write!(f, "{e}"),
            ConfigError::Bounds(e) => write!(f, "{e}"),
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config `{path}`: {source}")
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config `{path}`: {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parameter(e) => Some(e),
            ConfigError::Bounds(e) => Some(e),
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl From<InvalidParameterError> for ConfigError {
    fn from(e: InvalidParameterError) -> Self {
        ConfigError::Parameter(e)
    }
}

impl From<DegenerateBoundsError> for ConfigError {
    fn from(e: DegenerateBoundsError) -> Self {
        ConfigError::Bounds(e)
    }
}

/// Returned when a buffer view is requested at a type other than the one the
/// buffer was registered with.
///
/// ### Fields
/// * `buffer` — Name of the buffer.
/// * `expected` — Type name the buffer stores.
/// * `requested` — Type name the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {
    /// Name of the buffer.
    pub buffer: &'static str,
    /// Type name the buffer stores.
    pub expected: &'static str,
    /// Type name the caller asked for.
    pub requested: &'static str,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer `{}` stores {} but was viewed as {}",
            self.buffer, self.expected, self.requested
        )
    }
}

impl std::error::Error for TypeMismatchError {}

/// Returned when a stage touches a buffer outside its declared access set.
///
/// In debug builds the view accessors assert before this error can surface;
/// it exists so the conflict is nameable in messages and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndeclaredAccessError {
    /// Name of the offending stage.
    pub stage: &'static str,
    /// Name of the touched buffer.
    pub buffer: &'static str,
    /// Access mode the stage attempted.
    pub mode: AccessMode,
}

impl fmt::Display for UndeclaredAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage `{}` attempted undeclared {} access to buffer `{}`",
            self.stage, self.mode, self.buffer
        )
    }
}

impl std::error::Error for UndeclaredAccessError {}

/// Errors raised while building or executing a stage pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// A buffer name was registered twice.
    DuplicateBuffer {
        /// The colliding name.
        name: &'static str,
    },
    /// The registry is at [`BUFFER_CAP`](crate::engine::types::BUFFER_CAP).
    BufferLimit {
        /// The capacity that was exceeded.
        cap: usize,
    },
    /// A stage declared the same buffer as both read and write.
    ///
    /// Exclusive write access already covers reads; a double declaration is
    /// always a wiring mistake.
    ReadWriteOverlap {
        /// Name of the offending stage.
        stage: &'static str,
    },
    /// A buffer view was requested at the wrong element type.
    Type(TypeMismatchError),
    /// A stage touched a buffer it never declared.
    Access(UndeclaredAccessError),
    /// A dedicated worker pool could not be built.
    WorkerPool {
        /// Underlying pool construction failure.
        source: rayon::ThreadPoolBuildError,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DuplicateBuffer { name } => {
                write!(f, "buffer `{name}` registered twice")
            }
            PipelineError::BufferLimit { cap } => {
                write!(f, "buffer registry full (capacity {cap})")
            }
            PipelineError::ReadWriteOverlap { stage } => {
                write!(
                    f,
                    "stage `{stage}` declares a buffer as both read and write; declare write only"
                )
            }
            PipelineError::Type(e) => write!(f, "{e}"),
            PipelineError::Access(e) => write!(f, "{e}"),
            PipelineError::WorkerPool { source } => {
                write!(f, "failed to build worker pool: {source}")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Type(e) => Some(e),
            PipelineError::Access(e) => Some(e),
            PipelineError::WorkerPool { source } => Some(source),
            _ => None,
        }
    }
}

impl From<TypeMismatchError> for PipelineError {
    fn from(e: TypeMismatchError) -> Self {
        PipelineError::Type(e)
    }
}

impl From<UndeclaredAccessError> for PipelineError {
    fn from(e: UndeclaredAccessError) -> Self {
        PipelineError::Access(e)
    }
}

/// Top-level error type for the crate.
#[derive(Debug)]
pub enum CoreError {
    /// Fatal startup configuration failure.
    Config(ConfigError),
    /// Pipeline construction or execution failure.
    Pipeline(PipelineError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Config(e) => write!(f, "{e}"),
            CoreError::Pipeline(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Config(e) => Some(e),
            CoreError::Pipeline(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<PipelineError> for CoreError {
    fn from(e: PipelineError) -> Self {
        CoreError::Pipeline(e)
    }
}

impl From<TypeMismatchError> for CoreError {
    fn from(e: TypeMismatchError) -> Self {
        CoreError::Pipeline(PipelineError::Type(e))
    }
}

impl From<UndeclaredAccessError> for CoreError {
    fn from(e: UndeclaredAccessError) -> Self {
        CoreError::Pipeline(PipelineError::Access(e))
    }
}

impl From<InvalidParameterError> for CoreError {
    fn from(e: InvalidParameterError) -> Self {
        CoreError::Config(ConfigError::Parameter(e))
    }
}
