//! services/kiosk/src/error.rs
//!
//! Defines the primary error type for the kiosk service.

use crate::config::ConfigError;
use loyalty_core::ports::PortError;
use loyalty_core::SessionError;

/// The primary error type for the `kiosk` service.
#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
