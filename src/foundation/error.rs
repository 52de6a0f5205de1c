/// Convenience result type used across Kinetta.
pub type KinettaResult<T> = Result<T, KinettaError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Transient encoder-surface loss is deliberately not represented here: it is
/// recovered in place by the movie writer and reported through `tracing`, not
/// through the error channel.
#[derive(thiserror::Error, Debug)]
pub enum KinettaError {
    /// Shader compile or link failure. Fatal to the filter instance that owns
    /// the program; the caller must not draw with it.
    #[error("shader error: {0}")]
    ShaderCompile(String),

    /// Codec configuration failure. Aborts the recording-start sequence.
    #[error("codec error: {0}")]
    CodecConfig(String),

    /// Container target failure (unwritable path, failed finalize). Aborts
    /// the start sequence and is never retried automatically.
    #[error("muxer error: {0}")]
    MuxerIo(String),

    /// Invalid user-provided data or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal contract breach while driving the pipeline.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KinettaError {
    /// Build a [`KinettaError::ShaderCompile`] value.
    pub fn shader(msg: impl Into<String>) -> Self {
        Self::ShaderCompile(msg.into())
    }

    /// Build a [`KinettaError::CodecConfig`] value.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::CodecConfig(msg.into())
    }

    /// Build a [`KinettaError::MuxerIo`] value.
    pub fn muxer(msg: impl Into<String>) -> Self {
        Self::MuxerIo(msg.into())
    }

    /// Build a [`KinettaError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`KinettaError::Evaluation`] value.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
