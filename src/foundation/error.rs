/// Convenience result type used across the crate.
pub type DynwallResult<T> = Result<T, DynwallError>;

/// Top-level error type for metadata serialization and wallpaper writing.
#[derive(thiserror::Error, Debug)]
pub enum DynwallError {
    /// The output device could not be opened or is not writable.
    #[error("device error: {0}")]
    Device(String),

    /// The encoder failed to produce the container.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Input values were rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON payload or manifest (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(String),
}

impl DynwallError {
    /// Build a [`DynwallError::Device`] error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Build a [`DynwallError::Encoder`] error.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Build a [`DynwallError::Validation`] error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<serde_json::Error> for DynwallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
