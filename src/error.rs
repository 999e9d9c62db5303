// Copyright 2026 The rfbcast Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the RFB protocol engine.
//!
//! All fatal errors unwind to the per-connection top-level loop, which closes
//! the socket and returns; they never cross to other connections. Non-fatal
//! conditions (rectangle out of bounds, unsupported pseudo-encoding) are not
//! errors at all: the affected update is dropped and the connection continues.

use std::io;

use thiserror::Error;

/// Fatal, per-connection protocol failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer's 12-byte version reply did not begin with `"RFB"`.
    #[error("handshake failed: peer version string does not begin with \"RFB\"")]
    Handshake,

    /// A message decoder was handed a type byte it does not own.
    ///
    /// Several RFB client messages carry their type byte inside the fixed
    /// header the decoder re-verifies; a mismatch means the dispatcher and
    /// decoder disagree about framing and the stream cannot be trusted.
    #[error("message type {actual} where {expected} was expected")]
    UnexpectedMessageType {
        /// The type byte the decoder expected.
        expected: u8,
        /// The type byte actually consumed from the stream.
        actual: u8,
    },

    /// The dispatcher consumed a type byte no decoder claims.
    ///
    /// The byte is already gone from the stream, so resynchronizing is not
    /// possible; continuing would desynchronize every later message.
    #[error("unknown client message type {0}, cannot resynchronize")]
    UnknownMessageType(u8),

    /// A message had a well-framed header but an invalid field value.
    #[error("malformed {message} message: {detail}")]
    Malformed {
        /// The RFB message name.
        message: &'static str,
        /// What exactly was wrong with it.
        detail: String,
    },

    /// Short read, connection reset, or a capability-interface failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Returns true when this error is an ordinary peer disconnect rather
    /// than a protocol fault, so the caller can log it at info level.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}
