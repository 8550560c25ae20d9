//! Structured error types for the deeplink crate
//!
//! Two families: [`IpcError`] for channel and instance-lock failures, and
//! [`RegistrationError`] for the scheme-registration collaborator. Nothing
//! here is retried internally; a failure reflects real-time system state
//! and is handed to the caller to act on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Channel and instance-lock failures.
#[derive(Debug, Error)]
pub enum IpcError {
    /// No per-user directory is available to hold channel sockets.
    #[error("no runtime or home directory available for channel sockets")]
    NoChannelDir,

    /// Scheme contains characters outside `[a-z][a-z0-9+.-]*`.
    #[error("invalid scheme '{0}'")]
    InvalidScheme(String),

    #[error("failed to prepare channel directory {path}")]
    ChannelDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind channel socket {path}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to channel socket {path}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write message to channel")]
    Write(#[source] io::Error),

    /// Payload exceeds the channel's per-message bound.
    #[error("message of {len} bytes exceeds the {max}-byte channel limit")]
    MessageTooLarge { len: usize, max: usize },

    #[error("failed to spawn channel listener thread")]
    Spawn(#[source] io::Error),

    #[error("failed to acquire instance lock {path}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IpcError {
    /// True when a send failed because no server was listening anymore.
    ///
    /// This is the lost-race case: the sender already settled on being a
    /// secondary, the primary vanished in the meantime, and there is no
    /// fallback path. Callers swallow it rather than treating it as fatal.
    pub fn is_lost_race(&self) -> bool {
        match self {
            IpcError::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}

/// Scheme-registration collaborator failures.
///
/// The caller decides whether these are fatal; an application can usually
/// keep running without a (re)registered handler.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Scheme contains characters outside `[a-z][a-z0-9+.-]*`.
    #[error("invalid scheme '{0}'")]
    InvalidScheme(String),

    /// No per-user applications or config directory could be determined.
    #[error("no user application directory available for desktop entries")]
    NoApplicationsDir,

    #[error("failed to write desktop entry {path}")]
    WriteEntry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove desktop entry {path}")]
    RemoveEntry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to update default-handler association {path}")]
    Associate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
