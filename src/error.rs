//! Error types for facefold-rs.
//!
//! Every failure is raised at the point of violation; nothing is retried
//! or suppressed internally. Record-container errors carry enough context
//! to name both the offending key and the mapping that was searched.
//!
//! # Example
//!
//! ```rust
//! use facefold_rs::records::RecordLog;
//! use facefold_rs::HarnessError;
//!
//! let log = RecordLog::new();
//! match log.get("loss") {
//!     Err(HarnessError::KeyNotFound { key, .. }) => assert_eq!(key, "loss"),
//!     other => panic!("expected KeyNotFound, got {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Result type alias for facefold-rs operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that can occur in facefold-rs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HarnessError {
    /// A record key was looked up in a mapping that does not contain it.
    ///
    /// `container` describes the mapping that was searched (its type and
    /// key set) so the message is actionable without a debugger.
    #[error("key `{key}` not found in {container}")]
    KeyNotFound {
        /// The key that was requested.
        key: String,
        /// Description of the mapping searched, including its keys.
        container: String,
    },

    /// A value expected to be a sequence was a scalar.
    #[error("the value of `{key}` is not a sequence: {detail}")]
    InvalidValue {
        /// The key whose value was rejected.
        key: String,
        /// What was found instead of a sequence.
        detail: String,
    },

    /// A positional access went past the end of a column.
    #[error("position {position} is out of range for column `{key}` of length {len}")]
    IndexOutOfRange {
        /// The column accessed.
        key: String,
        /// The requested position.
        position: usize,
        /// The column length at the time of access.
        len: usize,
    },

    /// Fold partitioning error (bad `k`, non-contiguous classes, ...).
    #[error("fold error: {0}")]
    Fold(String),

    /// Dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Metrics accounting error (class index out of range, ...).
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Preprocessing (face-crop) error.
    #[error("preprocess error: {0}")]
    Preprocess(String),

    /// Model forward/backward error, reported by a `Model` implementation.
    #[error("model error: {0}")]
    Model(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
