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

//! Per-connection RFB session: handshake, message dispatch and updates.
//!
//! One [`Session`] exists per accepted connection and is driven by exactly
//! one task; all protocol state is single-threaded and all I/O on the
//! stream is strictly sequential. The session performs the RFB 3.3
//! handshake once, then loops: read the one-byte message-type lookahead,
//! route to the matching decoder, repeat until the viewer closes the
//! stream.
//!
//! # Protocol Flow
//!
//! 1. **Handshake**: version exchange, no-authentication announcement,
//!    shared-desktop flag, `ServerInit`
//! 2. **Message Loop**: `SetPixelFormat`, `SetEncodings`,
//!    `FramebufferUpdateRequest`, `KeyEvent`, `PointerEvent`,
//!    `ClientCutText`
//! 3. **Updates**: full updates are sent inline from the request decoder;
//!    incremental pushes go through [`Session::send_update`] and
//!    [`Session::send_desktop_resize`] when the embedder detects changes.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::colormap::ColorMap;
use crate::display::{Display, PointerButton};
use crate::encoder;
use crate::error::ProtocolError;
use crate::protocol::{
    PixelFormat, ServerInit, CLIENT_MSG_CLIENT_CUT_TEXT, CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST,
    CLIENT_MSG_KEY_EVENT, CLIENT_MSG_POINTER_EVENT, CLIENT_MSG_SET_ENCODINGS,
    CLIENT_MSG_SET_PIXEL_FORMAT, ENCODING_DESKTOP_SIZE, MAX_CUT_TEXT_LEN, PROTOCOL_VERSION,
    SECURITY_TYPE_NONE,
};
use crate::server::ServerConfig;
use crate::wire;

/// Protocol state for one viewer connection.
///
/// Owns the stream and the negotiated state exclusively; dropped when the
/// connection ends. The color map and display handle are shared with every
/// other session, which is safe because the map is immutable and the
/// display contract requires the collaborator to serialize itself.
pub struct Session<S> {
    /// The connection's byte stream.
    stream: S,
    /// Host capture and injection capabilities.
    display: Arc<dyn Display>,
    /// Shared 8-bit palette, used when the viewer negotiates 8 bpp.
    colormap: Arc<ColorMap>,
    /// Desktop name sent in `ServerInit`.
    desktop_name: String,
    /// Bound on idle lookahead reads; expiry is a normal disconnect.
    idle_timeout: Option<Duration>,
    /// The pixel format updates are encoded in.
    format: PixelFormat,
    /// Encoding identifiers the viewer declared support for. Membership is
    /// all that matters; insertion order is irrelevant.
    encodings: Vec<i32>,
    /// Last known screen width, per the most recent update request.
    screen_width: u16,
    /// Last known screen height, per the most recent update request.
    screen_height: u16,
    /// True once the viewer asked for incremental updates.
    incremental: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an accepted stream in a new session.
    ///
    /// The initial pixel format reflects the host display depth from the
    /// config; nothing is sent until [`Session::handshake`] runs.
    pub fn new(
        stream: S,
        display: Arc<dyn Display>,
        colormap: Arc<ColorMap>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            stream,
            display,
            colormap,
            desktop_name: config.desktop_name.clone(),
            idle_timeout: config.idle_timeout,
            format: PixelFormat::host_default(config.host_depth),
            encodings: Vec::new(),
            screen_width: 0,
            screen_height: 0,
            incremental: false,
        }
    }

    /// Runs the connection to completion: handshake, then the message loop.
    ///
    /// Returns `Ok(())` on a clean disconnect (end of stream or idle
    /// timeout). Any error is fatal to this connection only; the caller is
    /// expected to close the socket and keep serving others.
    pub async fn run(&mut self) -> Result<(), ProtocolError> {
        self.handshake().await?;
        while self.process_next().await? {}
        Ok(())
    }

    /// Performs the RFB 3.3 handshake, exactly once, before any messages.
    ///
    /// Sends the 12-byte version string, validates the viewer's reply,
    /// announces no-authentication, consumes the shared-desktop flag and
    /// sends `ServerInit` with the host's dimensions and pixel format. Any
    /// I/O failure here is fatal to the connection.
    pub async fn handshake(&mut self) -> Result<(), ProtocolError> {
        self.stream.write_all(PROTOCOL_VERSION.as_bytes()).await?;
        self.stream.flush().await?;

        let mut version = [0u8; 12];
        self.stream.read_exact(&mut version).await?;
        if !version.starts_with(b"RFB") {
            return Err(ProtocolError::Handshake);
        }
        debug!(
            "viewer protocol version: {}",
            String::from_utf8_lossy(&version).trim_end()
        );

        self.stream.write_all(&SECURITY_TYPE_NONE).await?;
        self.stream.flush().await?;

        // Accepted but not enforced; this server does not arbitrate between
        // concurrent viewers.
        let shared = self.stream.read_u8().await?;
        debug!("shared-desktop flag: {shared}");

        self.screen_width = self.display.width();
        self.screen_height = self.display.height();

        let init = ServerInit {
            width: self.screen_width,
            height: self.screen_height,
            pixel_format: self.format.clone(),
            name: self.desktop_name.clone(),
        };
        let mut buf = BytesMut::new();
        init.write_to(&mut buf);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;

        info!(
            "handshake complete: {}x{} at {} bpp",
            self.screen_width, self.screen_height, self.format.bits_per_pixel
        );
        Ok(())
    }

    /// Reads and processes one client message.
    ///
    /// Returns `Ok(false)` when the stream reached end-of-stream (or the
    /// idle timeout expired) before a message began; both are normal
    /// termination. A type byte no decoder claims is fatal: the byte is
    /// already consumed, so the stream cannot be resynchronized.
    pub async fn process_next(&mut self) -> Result<bool, ProtocolError> {
        let msg_type = match self.idle_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, wire::next_message_type(&mut self.stream)).await {
                    Ok(read) => read?,
                    Err(_) => {
                        info!("idle for {limit:?}, closing connection");
                        None
                    }
                }
            }
            None => wire::next_message_type(&mut self.stream).await?,
        };

        let Some(msg_type) = msg_type else {
            return Ok(false);
        };

        match msg_type {
            CLIENT_MSG_SET_PIXEL_FORMAT => self.read_set_pixel_format(msg_type).await?,
            CLIENT_MSG_SET_ENCODINGS => self.read_set_encodings(msg_type).await?,
            CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST => {
                self.read_framebuffer_update_request(msg_type).await?;
            }
            CLIENT_MSG_KEY_EVENT => self.read_key_event(msg_type).await?,
            CLIENT_MSG_POINTER_EVENT => self.read_pointer_event(msg_type).await?,
            CLIENT_MSG_CLIENT_CUT_TEXT => self.read_client_cut_text(msg_type).await?,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        }
        Ok(true)
    }

    /// Decodes `SetPixelFormat`: the type byte (which doubles as the first
    /// header byte and must be zero), three padding bytes, then the 16-byte
    /// pixel-format block. No reply is sent.
    async fn read_set_pixel_format(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_SET_PIXEL_FORMAT, msg_type)?;

        let mut padding = [0u8; 3];
        self.stream.read_exact(&mut padding).await?;

        let mut block = [0u8; 16];
        self.stream.read_exact(&mut block).await?;
        let requested = PixelFormat::from_wire(&block);

        if !requested.is_valid() {
            return Err(ProtocolError::Malformed {
                message: "SetPixelFormat",
                detail: format!(
                    "unsupported format: {} bpp, depth {}, shifts {}/{}/{}",
                    requested.bits_per_pixel,
                    requested.depth,
                    requested.red_shift,
                    requested.green_shift,
                    requested.blue_shift
                ),
            });
        }

        info!(
            "viewer set pixel format: {} bpp, depth {}, big-endian {}, true-color {}",
            requested.bits_per_pixel, requested.depth, requested.big_endian, requested.true_color
        );
        self.format = requested;
        Ok(())
    }

    /// Decodes `SetEncodings`: re-verified type byte, one padding byte, a
    /// 2-byte count, then that many 4-byte signed encoding identifiers.
    /// Replaces the declared-encoding set wholesale.
    async fn read_set_encodings(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_SET_ENCODINGS, msg_type)?;

        let _padding = self.stream.read_u8().await?;
        let count = self.stream.read_u16().await?;

        let mut encodings = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            encodings.push(self.stream.read_i32().await?);
        }

        debug!("viewer declared {count} encodings: {encodings:?}");
        self.encodings = encodings;
        Ok(())
    }

    /// Decodes `FramebufferUpdateRequest` and, for a full request, sends
    /// the update inline.
    ///
    /// The request's width and height become the session's last-known
    /// screen size. An incremental request only arms the incremental flag;
    /// the embedder pushes the actual updates later via
    /// [`Session::send_update`].
    async fn read_framebuffer_update_request(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST, msg_type)?;

        let incremental = self.stream.read_u8().await?;
        let x = self.stream.read_u16().await?;
        let y = self.stream.read_u16().await?;
        let width = self.stream.read_u16().await?;
        let height = self.stream.read_u16().await?;

        self.screen_width = width;
        self.screen_height = height;

        match incremental {
            0 => {
                debug!("full update requested: ({x},{y}) {width}x{height}");
                self.incremental = false;
                self.send_update(x, y, width, height).await?;
            }
            1 => {
                self.incremental = true;
            }
            other => {
                return Err(ProtocolError::Malformed {
                    message: "FramebufferUpdateRequest",
                    detail: format!("incremental flag must be 0 or 1, got {other}"),
                });
            }
        }
        Ok(())
    }

    /// Decodes `KeyEvent`: re-verified type byte, down flag, two padding
    /// bytes, 4-byte keysym; forwarded to the display.
    async fn read_key_event(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_KEY_EVENT, msg_type)?;

        let down = self.stream.read_u8().await? != 0;
        let _padding = self.stream.read_u16().await?;
        let keysym = self.stream.read_u32().await?;

        self.display.key_event(keysym, down);
        Ok(())
    }

    /// Decodes `PointerEvent`: re-verified type byte, button mask, x, y.
    ///
    /// Mask 0 is a pure move. Masks 1, 3 and 4 synthesize an immediate
    /// press-and-release of the left, middle and right button. Masks 8 and
    /// 16 are one wheel step up and down. The protocol's mask is really a
    /// bit field of simultaneously held buttons; treating every other value
    /// as a plain move is a known approximation of that.
    async fn read_pointer_event(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_POINTER_EVENT, msg_type)?;

        let mask = self.stream.read_u8().await?;
        let x = self.stream.read_u16().await?;
        let y = self.stream.read_u16().await?;

        match mask {
            0 => self.display.pointer_move(x, y),
            1 => self.click(PointerButton::Left, x, y),
            3 => self.click(PointerButton::Middle, x, y),
            4 => self.click(PointerButton::Right, x, y),
            8 => self.display.pointer_wheel(true),
            16 => self.display.pointer_wheel(false),
            other => {
                debug!("unhandled pointer button mask {other:#04x}, treating as move");
                self.display.pointer_move(x, y);
            }
        }
        Ok(())
    }

    /// Decodes `ClientCutText`: re-verified type byte, three padding bytes,
    /// 4-byte length, then the text as Latin-1 (one byte per character).
    ///
    /// The text is accepted and logged but not forwarded anywhere; wiring
    /// clipboard integration is left to the embedder.
    async fn read_client_cut_text(&mut self, msg_type: u8) -> Result<(), ProtocolError> {
        Self::verify_type(CLIENT_MSG_CLIENT_CUT_TEXT, msg_type)?;

        let mut padding = [0u8; 3];
        self.stream.read_exact(&mut padding).await?;
        let length = self.stream.read_u32().await? as usize;

        if length > MAX_CUT_TEXT_LEN {
            return Err(ProtocolError::Malformed {
                message: "ClientCutText",
                detail: format!("text length {length} exceeds the {MAX_CUT_TEXT_LEN} byte cap"),
            });
        }

        let bytes = wire::read_exact_vec(&mut self.stream, length).await?;
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        debug!("client cut text accepted and ignored ({} chars)", text.len());
        Ok(())
    }

    /// Sends one raw-encoded rectangle at the requested position.
    ///
    /// A rectangle that exceeds the last known screen size is rejected
    /// whole: logged, nothing written, connection kept open. A snapshot
    /// shorter or longer than the rectangle is a capability-contract breach
    /// and surfaces as an I/O error.
    pub async fn send_update(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> Result<(), ProtocolError> {
        if encoder::exceeds_screen(x, y, width, height, self.screen_width, self.screen_height) {
            warn!(
                "dropping update ({x},{y}) {width}x{height}: exceeds {}x{} screen",
                self.screen_width, self.screen_height
            );
            return Ok(());
        }

        let pixels = self.display.image_buffer(x, y, width, height)?;
        let expected = usize::from(width) * usize::from(height);
        if pixels.len() != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "display snapshot returned {} pixels for a {expected}-pixel rectangle",
                    pixels.len()
                ),
            )
            .into());
        }

        let mut buf = BytesMut::with_capacity(16 + expected * self.format.bytes_per_pixel());
        encoder::encode_framebuffer_update(
            &mut buf,
            x,
            y,
            width,
            height,
            &pixels,
            &self.format,
            &self.colormap,
        );
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;

        debug!(
            "sent raw update ({x},{y}) {width}x{height}, {} bytes, {} bpp",
            buf.len(),
            self.format.bits_per_pixel
        );
        Ok(())
    }

    /// Notifies the viewer that the desktop dimensions changed.
    ///
    /// Requires the viewer to have declared the desktop-size
    /// pseudo-encoding; otherwise this is a logged no-op. When supported,
    /// one update message carries the full new screen as a raw rectangle
    /// followed by the zero-payload desktop-size marker.
    pub async fn send_desktop_resize(&mut self) -> Result<(), ProtocolError> {
        if !self.supports_encoding(ENCODING_DESKTOP_SIZE) {
            info!("viewer did not declare the desktop-size pseudo-encoding, skipping resize");
            return Ok(());
        }

        let width = self.display.width();
        let height = self.display.height();
        self.screen_width = width;
        self.screen_height = height;

        let pixels = self.display.image_buffer(0, 0, width, height)?;
        let expected = usize::from(width) * usize::from(height);
        if pixels.len() != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "display snapshot returned {} pixels for a {expected}-pixel screen",
                    pixels.len()
                ),
            )
            .into());
        }

        let mut buf = BytesMut::with_capacity(28 + expected * self.format.bytes_per_pixel());
        encoder::encode_desktop_resize(&mut buf, width, height, &pixels, &self.format, &self.colormap);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;

        info!("sent desktop resize: {width}x{height}");
        Ok(())
    }

    /// True once the viewer has asked for incremental updates; the embedder
    /// polls this to decide whether to push changes.
    #[must_use]
    pub fn wants_incremental(&self) -> bool {
        self.incremental
    }

    /// True if the viewer declared support for `encoding`.
    #[must_use]
    pub fn supports_encoding(&self, encoding: i32) -> bool {
        self.encodings.contains(&encoding)
    }

    /// The session's last known screen size.
    #[must_use]
    pub fn screen_size(&self) -> (u16, u16) {
        (self.screen_width, self.screen_height)
    }

    /// The currently negotiated pixel format.
    #[must_use]
    pub fn pixel_format(&self) -> &PixelFormat {
        &self.format
    }

    /// Injects an immediate press-and-release of one button.
    fn click(&self, button: PointerButton, x: u16, y: u16) {
        self.display.pointer_button(button, true, x, y);
        self.display.pointer_button(button, false, x, y);
    }

    fn verify_type(expected: u8, actual: u8) -> Result<(), ProtocolError> {
        if expected == actual {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedMessageType { expected, actual })
        }
    }
}
