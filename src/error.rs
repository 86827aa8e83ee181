//! Error types for the fluid core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("no GPU adapter: {0}")]
    NoAdapter(String),

    #[error("request_device failed: {0}")]
    Device(String),

    /// A compute or storage capability is missing. Callers recover by
    /// degrading precision or falling back to the CPU executor.
    #[error("capability unavailable: {0}")]
    Capability(String),

    /// A pass program failed to build. The engine refuses to start.
    #[error("failed to build {pass} pass: {message}")]
    Construction { pass: &'static str, message: String },

    /// Device buffers for a new grid could not be created.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("buffer readback failed: {0}")]
    Readback(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
