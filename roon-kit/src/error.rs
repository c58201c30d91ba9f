// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The error taxonomy used across this crate.

/// Errors arising from decoding or encoding a MOO/1 frame.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The input was empty, missing the `MOO/1` token, had a malformed first line,
    /// an unknown verb, an unsupported protocol version, or a missing/non-integer
    /// `Request-Id` header.
    #[error("invalid moo/1 frame: {0}")]
    InvalidFormat(String),
    /// The body claimed `Content-Type: application/json` but did not parse as JSON.
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the connection engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The provided URL could not be used to open a connection.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The transport failed to establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The connection was closed, locally or remotely.
    #[error("connection closed: {code}{}", reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    ConnectionClosed {
        /// A close code, if known. `0` when none was supplied.
        code: u16,
        /// An optional human-readable reason.
        reason: Option<String>,
    },
    /// A request did not receive a response within its timeout.
    #[error("request timed out")]
    Timeout,
    /// The registration handshake failed.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
    /// The Core has not yet approved this extension; informational, not fatal.
    #[error("awaiting authorization in roon's extension manager")]
    AwaitingAuthorization,
    /// The reconnector exhausted its configured attempt budget.
    #[error("maximum reconnect attempts exceeded")]
    MaxReconnectAttemptsExceeded,
    /// A frame failed to decode; codec errors are dropped per-frame and do not
    /// usually propagate to a caller, but are exposed here for completeness.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by the higher level Transport/Browse services.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// A zone-relative command was issued with no zone or output selected.
    #[error("no zone or output selected")]
    NoZoneSelected,
    /// The Core rejected a transport command.
    #[error("command failed: {0}")]
    CommandFailed(String),
    /// A browse call failed.
    #[error("browse failed: {0}")]
    BrowseFailed(String),
    /// A browse `load` call failed.
    #[error("load failed: {0}")]
    LoadFailed(String),
    /// The underlying connection reported an error.
    #[error(transparent)]
    Connection(#[from] Error),
}

/// Errors raised by the HTTP image-fetch collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ImageError {
    /// The image key was empty.
    #[error("invalid image key")]
    InvalidImageKey,
    /// `scale` was given without both `width` and `height`.
    #[error("scale requires width and height")]
    MissingScaleDimensions,
    /// The HTTP request itself failed (DNS, connect, TLS, ...).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// The response could not be interpreted as an image.
    #[error("invalid response from image service")]
    InvalidResponse,
    /// The Core returned a non-success HTTP status.
    #[error("image service returned http {status}")]
    HttpError {
        /// The HTTP status code returned.
        status: u16,
    },
}
