// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every znet operation.

use crate::keys::ResourceId;

/// Errors returned by znet operations.
///
/// Zero matching subscribers or queryables and an elapsed scouting window are
/// *not* errors; they surface as empty results.
///
/// # Example
///
/// ```rust,no_run
/// use znet::{config, Error, ResKey, Session};
///
/// let session = Session::open(config::config_default())?;
/// match session.write(&ResKey::RId(42), b"payload") {
///     Err(Error::UnknownResource(id)) => println!("id {} was never declared", id),
///     Err(e) => println!("Other error: {}", e),
///     Ok(()) => println!("written"),
/// }
/// # Ok::<(), znet::Error>(())
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A configuration property holds a value that cannot be parsed.
    InvalidConfig { key: u64, value: String },
    /// A `name=value` configuration string names an unknown property.
    UnknownConfigName(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A key references a numeric id that was never declared in this session.
    UnknownResource(ResourceId),
    /// Key expression is empty or otherwise malformed.
    InvalidKey(String),

    // ========================================================================
    // Entity Errors
    // ========================================================================
    /// The session was closed; no entity can be declared on it.
    SessionClosed,
    /// The handle refers to an entity that was already undeclared.
    StaleHandle,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause (scouting sockets).
    IoError(std::io::Error),
    /// A scouting datagram could not be decoded.
    MalformedMessage(&'static str),
    /// The dispatch thread could not be started.
    DispatcherStart(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::InvalidConfig { key, value } => {
                write!(f, "Invalid value for property {:#x}: '{}'", key, value)
            }
            Error::UnknownConfigName(name) => write!(f, "Unknown configuration name: {}", name),
            // Resource
            Error::UnknownResource(id) => write!(f, "Unknown resource id: {}", id),
            Error::InvalidKey(key) => write!(f, "Invalid resource key: '{}'", key),
            // Entity
            Error::SessionClosed => write!(f, "Session is closed"),
            Error::StaleHandle => write!(f, "Handle refers to an undeclared entity"),
            // Transport
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::MalformedMessage(what) => write!(f, "Malformed scouting message: {}", what),
            Error::DispatcherStart(e) => write!(f, "Failed to start dispatch thread: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) | Error::DispatcherStart(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_unknown_resource() {
        let err = Error::UnknownResource(7);
        assert_eq!(err.to_string(), "Unknown resource id: 7");
    }

    #[test]
    fn test_io_error_source_is_preserved() {
        use std::error::Error as _;

        let err = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());
        assert!(Error::SessionClosed.source().is_none());
    }
}
