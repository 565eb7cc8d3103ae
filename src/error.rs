//! Error types for writing streamed archives.
//!
//! Every fallible library operation returns [`Result<T>`], an alias for
//! `Result<T, ArchiveError>`. The variants map onto the ways a streamed member can go wrong:
//!
//! - [`Capability`]: the sink cannot seek, so headers can never be patched.
//! - [`State`]: an operation was called in the wrong lifecycle state.
//! - [`Format`]: a header block failed to decode.
//! - [`Encoding`]: member metadata does not fit its fixed-width header field.
//! - [`Io`]: the underlying sink failed.
//!
//! [`Capability`]: ArchiveError::Capability
//! [`State`]: ArchiveError::State
//! [`Format`]: ArchiveError::Format
//! [`Encoding`]: ArchiveError::Encoding
//! [`Io`]: ArchiveError::Io

use std::io;

/// Result type alias for operations that may return an [`ArchiveError`].
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The sink does not support seeking.
    #[error("sink does not support seeking: {0}")]
    Capability(#[source] io::Error),

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// A header block is malformed.
    #[error("malformed tar header: {0}")]
    Format(String),

    /// A metadata field does not fit its header field.
    #[error("cannot encode field `{field}`: {reason}")]
    Encoding { field: &'static str, reason: String },

    /// I/O error from the underlying sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn encoding(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Encoding {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ArchiveError> for io::Error {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io(err) => err,
            other => io::Error::other(other),
        }
    }
}
