use std::io;
use std::net::SocketAddr;

/// Why an inbound protocol message was dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The datagram is not a well-formed OSC packet
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("{address} expects {expected} arguments, got {actual}")]
    Arity {
        address: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} should be {expected}, got {found}")]
    ArgType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown bone: {0}")]
    UnknownBone(String),

    #[error("unknown blend shape: {0}")]
    UnknownShape(String),
}

/// Errors from starting or stopping a capture source
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("receiver I/O error: {0}")]
    Io(#[from] io::Error),

    /// The listen task panicked or was aborted before it released its socket
    #[error("listener task failed: {0}")]
    Join(String),
}

/// Errors from [`crate::ReceiverRegistry::switch_to`]
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("receiver \"{0}\" does not exist")]
    UnknownReceiver(String),

    #[error("failed to stop receiver \"{name}\": {source}")]
    StopFailed {
        name: String,
        #[source]
        source: ReceiverError,
    },

    /// `restored` tells whether the previously active receiver is running again
    #[error("failed to start receiver \"{name}\" (previous receiver restored: {restored}): {source}")]
    StartFailed {
        name: String,
        restored: bool,
        #[source]
        source: ReceiverError,
    },
}

/// Errors loading or saving the scene file
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("scene file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid scene data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to replace scene file: {0}")]
    Persist(io::Error),

    /// A camera component is NaN or infinite and would not survive a save
    #[error("camera has a non-finite component")]
    NonFiniteCamera,
}
