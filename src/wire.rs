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

//! Binary stream primitives for the RFB wire format.
//!
//! All multi-byte integers on the wire are big-endian (network byte order);
//! the fixed-width reads come from [`tokio::io::AsyncReadExt`], which is
//! big-endian by default, and the write side builds messages with
//! [`bytes::BufMut`]. This module adds the two pieces tokio does not
//! provide directly: an end-of-stream-aware lookahead read of the next
//! message-type byte, and an exact-length fill into a fresh buffer.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads the one-byte message-type lookahead that drives the dispatcher.
///
/// Returns `Ok(None)` on a clean end of stream before the byte, which is how
/// a viewer normally terminates the session. A zero-length read anywhere
/// else surfaces as `UnexpectedEof` from the fixed-width readers instead.
pub async fn next_message_type<R>(stream: &mut R) -> io::Result<Option<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    if stream.read(&mut byte).await? == 0 {
        return Ok(None);
    }
    Ok(Some(byte[0]))
}

/// Reads exactly `len` bytes into a fresh buffer, looping over partial reads.
pub async fn read_exact_vec<R>(stream: &mut R, len: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
