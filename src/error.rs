// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;
use std::io;

/// Errors raised while decoding a value from the wire codec (§4.1).
#[derive(Debug)]
pub enum DecodeError {
    /// The byte stream ended before a complete value could be decoded.
    UnexpectedEof,

    /// A decimal scalar (integer, length, status code) did not parse.
    MalformedInteger,

    /// A string's declared length disagreed with the bytes actually available.
    TruncatedString,

    /// The separator a token was expected to be followed by was missing.
    MissingSeparator,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnexpectedEof => "unexpected end of stream while decoding",
            Self::MalformedInteger => "malformed integer token",
            Self::TruncatedString => "string length disagrees with available bytes",
            Self::MissingSeparator => "expected separator not found",
        })
    }
}

impl std::error::Error for DecodeError {}

/// Errors raised by the length-prefixed frame transport (§4.2).
#[derive(Debug)]
pub enum FrameError {
    /// The peer closed the connection cleanly before sending a length header.
    PeerClosed,

    /// The peer closed the connection mid-body: the length header was read but
    /// fewer than the declared number of bytes followed.
    Protocol,

    /// Any other I/O failure.
    Io(io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::Protocol => write!(f, "truncated frame"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors raised by the bounded per-key task executor (§4.5).
#[derive(Debug, PartialEq, Eq)]
pub enum ExecutorError {
    /// The task's key queue was already at capacity.
    QueueFull,

    /// The executor has been shut down and no longer accepts tasks.
    Closed,
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueueFull => "task queue is full",
            Self::Closed => "executor is shut down",
        })
    }
}

impl std::error::Error for ExecutorError {}

/// Errors raised validating a [`crate::config::ServerConfig`] (§6).
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors surfaced to a client caller of [`crate::client::Client::remote_call`].
#[derive(Debug)]
pub enum ClientError {
    /// The server returned a non-success status code.
    Remote(crate::packet::StatusCode),

    /// Decoding the response payload failed.
    Decode(DecodeError),

    /// A transport-level failure occurred while sending the call or reading the reply.
    Frame(FrameError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(code) => write!(f, "remote procedure failed with code {code:?}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Frame(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        Self::Frame(FrameError::Io(e))
    }
}
