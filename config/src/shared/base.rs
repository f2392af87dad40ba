use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A required text field was left empty.
    #[error("`{0}` cannot be empty")]
    EmptyField(&'static str),
    /// The metrics listener port cannot be zero.
    #[error("`metrics.port` cannot be zero")]
    MetricsPortZero,
}
