/// Convenience result type used across montage.
pub type MontageResult<T> = Result<T, MontageError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Only [`MontageError::Decode`] is recoverable inside the pipeline (the item is skipped). Every
/// other variant aborts the run.
#[derive(thiserror::Error, Debug)]
pub enum MontageError {
    /// Invalid user-provided configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// A media item could not be opened or decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Internal pipeline failure while producing frames.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The encoder subprocess failed for the given codec.
    #[error("encode error ({codec}): {message}")]
    Encode {
        /// Encoder name passed to `-c:v`.
        codec: String,
        /// Exit status and stderr tail reported by the encoder.
        message: String,
    },

    /// No media item produced any frame.
    #[error("no media: {0}")]
    NoMedia(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MontageError {
    /// Build a [`MontageError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MontageError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`MontageError::Evaluation`] value.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Build a [`MontageError::Encode`] value.
    pub fn encode(codec: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Encode {
            codec: codec.into(),
            message: msg.into(),
        }
    }

    /// Build a [`MontageError::NoMedia`] value.
    pub fn no_media(msg: impl Into<String>) -> Self {
        Self::NoMedia(msg.into())
    }

    /// Return `true` for errors the codec fallback policy may retry.
    pub fn is_encoder_failure(&self) -> bool {
        matches!(self, Self::Encode { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
