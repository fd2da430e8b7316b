//! Failure kinds shared by both nodes.
//!
//! Each kind is recovered at the loop boundary of the node that produced it:
//! - `AcquisitionError`: retried after a short delay by the sensing loop
//! - `TransportError`: handed to the reconnection policy (field node) or
//!   logged and dropped for the current cycle (sensing node)
//! - `ConnectivityError`: link or session bring-up failed; the caller decides
//!   whether to retry or abort

use std::time::Duration;

/// Camera fetch or image decode failure.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    /// Transport-level failure talking to the camera (timeout, refused, DNS).
    #[error("camera request failed: {0}")]
    Request(String),

    /// Camera answered with a non-success status.
    #[error("camera returned http status {0}")]
    Status(u16),

    /// Reading the body or local file failed.
    #[error("failed to read image payload: {0}")]
    Io(#[from] std::io::Error),

    /// The payload was empty.
    #[error("empty image payload")]
    Empty,

    /// The payload exceeded the configured size cap.
    #[error("image payload exceeds {0} bytes")]
    TooLarge(usize),

    /// The payload could not be decoded into pixels.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The frame source URL scheme is not supported.
    #[error("unsupported frame source: {0}")]
    Unsupported(String),
}

/// Broker or session failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No session handle exists, or the session reported itself disconnected.
    #[error("session not connected")]
    NotConnected,

    /// The broker did not acknowledge the session in time.
    #[error("broker did not acknowledge session within {0:?}")]
    ConnectTimeout(Duration),

    /// A request could not be queued on the client.
    #[error("client request failed: {0}")]
    Client(String),

    /// The underlying connection failed.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Failure to emit a detection event.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("failed to encode detection event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Link or session bring-up failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    /// The link did not report up within the bounded bring-up window.
    #[error("link did not come up after {attempts} checks ({waited:?})")]
    LinkBringupTimeout { attempts: u32, waited: Duration },

    /// The link driver itself failed (e.g. bring-up command error).
    #[error("link driver failed: {0}")]
    Link(String),

    /// Session bring-up was requested while the link is down.
    #[error("link is down")]
    LinkDown,

    /// Session bring-up failed at the broker.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
