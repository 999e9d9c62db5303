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

//! RFB protocol constants and message structures.
//!
//! This module provides the building blocks for RFB 3.3 communication:
//! the protocol version string, the security-type announcement, client and
//! server message type tags, encoding identifiers, and the `PixelFormat`,
//! `Rectangle` and `ServerInit` wire structures.
//!
//! # Protocol Overview
//!
//! An RFB 3.3 session runs in the following phases:
//! 1. **Protocol Version** - server sends its version, client replies
//! 2. **Security** - server announces the security type (here: none)
//! 3. **Initialization** - client sends the shared-desktop flag, server
//!    replies with `ServerInit`
//! 4. **Normal Operation** - client messages and framebuffer updates share
//!    the stream for the rest of the session

use bytes::{BufMut, BytesMut};

/// The RFB protocol version string advertised by the server.
///
/// This server speaks RFB protocol version 3.3. The string must be exactly
/// 12 bytes including the trailing newline.
pub const PROTOCOL_VERSION: &str = "RFB 003.003\n";

/// The 4-byte security-type announcement for "no authentication".
///
/// In RFB 3.3 the server dictates the security type as a single big-endian
/// u32; value 1 means the connection proceeds without authentication.
pub const SECURITY_TYPE_NONE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

// Client-to-Server Message Types

/// Message type: client requests a different pixel format.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: client declares the encodings it supports.
///
/// Membership in the declared set is what matters to this server; it only
/// checks for the desktop-size pseudo-encoding before sending one.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: client requests a framebuffer update, full or incremental.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: client sends a key press or release.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: client sends a pointer position and button mask.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

/// Message type: client transfers clipboard text to the server.
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data. This is the only
/// server-to-client message this implementation emits after `ServerInit`.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

// Encoding Types

/// Encoding type: raw, one encoded pixel per source pixel, uncompressed.
pub const ENCODING_RAW: i32 = 0;

/// Pseudo-encoding: desktop size.
///
/// Carries no pixel data; a zero-payload rectangle with this encoding tells
/// the viewer the framebuffer dimensions changed.
pub const ENCODING_DESKTOP_SIZE: i32 = -223;

/// Maximum length of the desktop name sent in `ServerInit`, in bytes.
pub const MAX_DESKTOP_NAME_LEN: usize = 255;

/// Upper bound accepted for a `ClientCutText` payload.
///
/// Caps clipboard transfers so a hostile viewer cannot make the server
/// allocate an arbitrarily large buffer from a 4-byte length field.
pub const MAX_CUT_TEXT_LEN: usize = 1024 * 1024;

/// The negotiated pixel format of a session.
///
/// Sixteen bytes on the wire: bits-per-pixel, depth, big-endian flag,
/// true-color flag, three 2-byte channel maxima, three 1-byte channel
/// shifts, and three padding bytes. The shifts and maxima must address
/// disjoint bit ranges within the pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per encoded pixel: 8, 16 or 32 (a 24-bit host display is
    /// promoted to 32 before negotiation; viewers do not support 24).
    pub bits_per_pixel: u8,
    /// Color depth in bits.
    pub depth: u8,
    /// True if multi-byte pixels are sent big-endian.
    pub big_endian: bool,
    /// True for direct RGB pixels, false for palette-indexed pixels.
    pub true_color: bool,
    /// Maximum red value.
    pub red_max: u16,
    /// Maximum green value.
    pub green_max: u16,
    /// Maximum blue value.
    pub blue_max: u16,
    /// Bit position where the red value starts.
    pub red_shift: u8,
    /// Bit position where the green value starts.
    pub green_shift: u8,
    /// Bit position where the blue value starts.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The default format sent in `ServerInit`, reflecting the host's
    /// native display depth.
    ///
    /// A 24-bit depth is promoted to 32 bits. A 16-bit depth uses 5-6-5
    /// packing (maxima 31/63/31, shifts 11/5/0). Everything else, including
    /// the usual 32-bit case, advertises 8 bits per channel at shifts
    /// 16/8/0.
    #[must_use]
    pub fn host_default(host_depth: u8) -> Self {
        let bits = if host_depth == 24 { 32 } else { host_depth };

        if bits == 16 {
            return Self {
                bits_per_pixel: 16,
                depth: 16,
                big_endian: false,
                true_color: true,
                red_max: 0x1F,
                green_max: 0x3F,
                blue_max: 0x1F,
                red_shift: 11,
                green_shift: 5,
                blue_shift: 0,
            };
        }

        Self {
            bits_per_pixel: bits,
            depth: bits,
            big_endian: false,
            true_color: true,
            red_max: 0xFF,
            green_max: 0xFF,
            blue_max: 0xFF,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Parses the 16-byte pixel-format block of a `SetPixelFormat` payload.
    #[must_use]
    pub fn from_wire(block: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: block[0],
            depth: block[1],
            big_endian: block[2] != 0,
            true_color: block[3] != 0,
            red_max: u16::from_be_bytes([block[4], block[5]]),
            green_max: u16::from_be_bytes([block[6], block[7]]),
            blue_max: u16::from_be_bytes([block[8], block[9]]),
            red_shift: block[10],
            green_shift: block[11],
            blue_shift: block[12],
            // block[13..16] is padding
        }
    }

    /// Serializes the 16-byte pixel-format block.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(u8::from(self.big_endian));
        buf.put_u8(u8::from(self.true_color));
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_slice(&[0u8; 3]); // padding
    }

    /// Checks that the format is one this server can encode for.
    ///
    /// Bits per pixel must be 8, 16 or 32, and for true-color formats the
    /// three channel masks (`max << shift`) must fit the pixel and address
    /// disjoint bit ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            return false;
        }
        if !self.true_color {
            return true;
        }

        let bits = self.bits_per_pixel;
        let mask = |max: u16, shift: u8| -> Option<u64> {
            if shift >= 32 {
                return None;
            }
            let m = u64::from(max) << shift;
            // Channel must fit inside the pixel.
            if m >> bits != 0 {
                return None;
            }
            Some(m)
        };

        let (Some(r), Some(g), Some(b)) = (
            mask(self.red_max, self.red_shift),
            mask(self.green_max, self.green_shift),
            mask(self.blue_max, self.blue_shift),
        ) else {
            return false;
        };

        r & g == 0 && g & b == 0 && r & b == 0
    }

    /// Bytes per encoded pixel for this format.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8)
    }
}

/// A rectangle header within a framebuffer update message.
///
/// Each update carries one or more rectangles, each with its own encoding.
/// For raw encoding the pixel payload follows the header; for the
/// desktop-size pseudo-encoding the header is the whole rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width in pixels, greater than zero.
    pub width: u16,
    /// Height in pixels, greater than zero.
    pub height: u16,
    /// Encoding type of the payload that follows (signed 32-bit).
    pub encoding: i32,
}

impl Rectangle {
    /// Writes the 12-byte rectangle header.
    ///
    /// Layout: x, y, width, height as big-endian u16, then the encoding
    /// type as a big-endian i32.
    pub fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_i32(self.encoding);
    }
}

/// The `ServerInit` message sent at the end of the handshake.
///
/// Tells the viewer the framebuffer dimensions, the server's native pixel
/// format and the desktop name.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// Framebuffer width in pixels.
    pub width: u16,
    /// Framebuffer height in pixels.
    pub height: u16,
    /// The pixel format the server will use until the client changes it.
    pub pixel_format: PixelFormat,
    /// Desktop name shown in the viewer's title bar.
    pub name: String,
}

impl ServerInit {
    /// Serializes the message: width, height, the 16-byte pixel-format
    /// block, then the length-prefixed name.
    ///
    /// The name is truncated to [`MAX_DESKTOP_NAME_LEN`] bytes on a
    /// character boundary.
    #[allow(clippy::cast_possible_truncation)] // name length capped at 255
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        self.pixel_format.write_to(buf);

        let mut name = self.name.as_str();
        if name.len() > MAX_DESKTOP_NAME_LEN {
            let mut end = MAX_DESKTOP_NAME_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name = &name[..end];
        }
        buf.put_u32(name.len() as u32);
        buf.put_slice(name.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_default_promotes_24_bit_to_32() {
        let pf = PixelFormat::host_default(24);
        assert_eq!(pf.bits_per_pixel, 32);
        assert_eq!(pf.depth, 32);
        assert_eq!((pf.red_max, pf.green_max, pf.blue_max), (255, 255, 255));
        assert_eq!((pf.red_shift, pf.green_shift, pf.blue_shift), (16, 8, 0));
        assert!(pf.is_valid());
    }

    #[test]
    fn host_default_16_bit_uses_565_packing() {
        let pf = PixelFormat::host_default(16);
        assert_eq!(pf.bits_per_pixel, 16);
        assert_eq!((pf.red_max, pf.green_max, pf.blue_max), (31, 63, 31));
        assert_eq!((pf.red_shift, pf.green_shift, pf.blue_shift), (11, 5, 0));
        assert!(pf.is_valid());
    }

    #[test]
    fn pixel_format_wire_block_round_trips() {
        let pf = PixelFormat::host_default(32);
        let mut buf = BytesMut::new();
        pf.write_to(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[13..16], &[0, 0, 0]);

        let block: [u8; 16] = buf[..].try_into().unwrap();
        assert_eq!(PixelFormat::from_wire(&block), pf);
    }

    #[test]
    fn overlapping_channel_masks_are_invalid() {
        let mut pf = PixelFormat::host_default(32);
        pf.green_shift = 0; // collides with blue
        assert!(!pf.is_valid());

        let mut pf = PixelFormat::host_default(32);
        pf.bits_per_pixel = 12;
        assert!(!pf.is_valid());

        let mut pf = PixelFormat::host_default(16);
        pf.red_shift = 40; // shift cannot exceed the pixel
        assert!(!pf.is_valid());
    }

    #[test]
    fn rectangle_header_layout() {
        let rect = Rectangle {
            x: 1,
            y: 2,
            width: 0x0320,
            height: 0x0258,
            encoding: ENCODING_DESKTOP_SIZE,
        };
        let mut buf = BytesMut::new();
        rect.write_header(&mut buf);
        assert_eq!(
            &buf[..],
            &[0, 1, 0, 2, 0x03, 0x20, 0x02, 0x58, 0xFF, 0xFF, 0xFF, 0x21]
        );
    }

    #[test]
    fn server_init_truncates_long_names() {
        let init = ServerInit {
            width: 800,
            height: 600,
            pixel_format: PixelFormat::host_default(32),
            name: "x".repeat(300),
        };
        let mut buf = BytesMut::new();
        init.write_to(&mut buf);

        // width + height + format block + length prefix + 255 name bytes
        assert_eq!(buf.len(), 2 + 2 + 16 + 4 + 255);
        assert_eq!(&buf[20..24], &[0, 0, 0, 255]);
    }

    #[test]
    fn version_and_security_constants_are_bit_exact() {
        assert_eq!(PROTOCOL_VERSION.len(), 12);
        assert_eq!(PROTOCOL_VERSION.as_bytes(), b"RFB 003.003\n");
        assert_eq!(SECURITY_TYPE_NONE, [0, 0, 0, 1]);
    }
}
