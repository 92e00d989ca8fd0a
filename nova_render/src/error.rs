//! Error types for the Nova render core
//!
//! Every fallible operation of the frame scheduler, memory manager and
//! pipeline builders reports one of these variants to its immediate caller.

use std::fmt;

/// Result type for Nova render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nova render errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan call failure, unsupported feature)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (unknown handle, out-of-range copy, unmappable memory)
    InvalidResource(String),

    /// Initialization failed (instance, device, swapchain, configuration)
    InitializationFailed(String),

    /// Operation called in a state that does not allow it
    InvalidOperation(String),

    /// Pipeline could not be built from the supplied shaders and layouts
    InvalidPipeline(String),

    /// The GPU stopped making progress (wait timed out or device lost)
    DeviceLost(String),
}

impl Error {
    /// Whether the render subsystem can keep running after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::InvalidResource(_) | Error::InvalidOperation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::InvalidPipeline(msg) => write!(f, "Invalid pipeline: {}", msg),
            Error::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
