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

//! Framebuffer update message encoding.
//!
//! Builders in this module write complete `FramebufferUpdate` messages into
//! a [`BytesMut`] and perform no I/O, so the exact wire bytes can be tested
//! without a socket. The session layer validates rectangle bounds before
//! calling in and transmits the finished buffer.
//!
//! Wire layout of an update: message type 0, one padding byte, a 2-byte
//! rectangle count, then per rectangle a 12-byte header followed by the raw
//! pixel payload (absent for the desktop-size pseudo-encoding).

use bytes::{BufMut, BytesMut};

use crate::colormap::ColorMap;
use crate::protocol::{
    PixelFormat, Rectangle, ENCODING_DESKTOP_SIZE, ENCODING_RAW, SERVER_MSG_FRAMEBUFFER_UPDATE,
};

/// Returns true when the requested rectangle does not fit the screen.
///
/// Violating rectangles are rejected outright, never truncated.
#[must_use]
pub fn exceeds_screen(x: u16, y: u16, width: u16, height: u16, screen_w: u16, screen_h: u16) -> bool {
    u32::from(x) + u32::from(width) > u32::from(screen_w)
        || u32::from(y) + u32::from(height) > u32::from(screen_h)
}

/// Encodes a single-rectangle raw update at (`x`, `y`).
///
/// `pixels` is the row-major snapshot for exactly that rectangle, in the
/// capability interface's `0x00BBGGRR` layout.
pub fn encode_framebuffer_update(
    buf: &mut BytesMut,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    pixels: &[u32],
    format: &PixelFormat,
    colormap: &ColorMap,
) {
    buf.put_u8(SERVER_MSG_FRAMEBUFFER_UPDATE);
    buf.put_u8(0); // padding
    buf.put_u16(1); // number of rectangles

    Rectangle {
        x,
        y,
        width,
        height,
        encoding: ENCODING_RAW,
    }
    .write_header(buf);
    write_pixels(buf, pixels, format, colormap);
}

/// Encodes a desktop-resize notification: two rectangles in one update.
///
/// Rectangle one is a raw update covering the full new screen; rectangle
/// two is a zero-payload marker at the new dimensions carrying the
/// desktop-size pseudo-encoding. The caller is responsible for checking
/// that the viewer declared support for the pseudo-encoding.
pub fn encode_desktop_resize(
    buf: &mut BytesMut,
    width: u16,
    height: u16,
    pixels: &[u32],
    format: &PixelFormat,
    colormap: &ColorMap,
) {
    buf.put_u8(SERVER_MSG_FRAMEBUFFER_UPDATE);
    buf.put_u8(0); // padding
    buf.put_u16(2); // number of rectangles

    Rectangle {
        x: 0,
        y: 0,
        width,
        height,
        encoding: ENCODING_RAW,
    }
    .write_header(buf);
    write_pixels(buf, pixels, format, colormap);

    Rectangle {
        x: 0,
        y: 0,
        width,
        height,
        encoding: ENCODING_DESKTOP_SIZE,
    }
    .write_header(buf);
}

/// Writes the raw pixel payload in the negotiated format.
///
/// - 8 bpp: one palette index byte per pixel, via the shared [`ColorMap`].
/// - 16 bpp: 5-6-5 packed, two bytes per pixel, byte order per the
///   negotiated big-endian flag.
/// - anything else (the 32-bit true-color case): red, green, blue, zero.
fn write_pixels(buf: &mut BytesMut, pixels: &[u32], format: &PixelFormat, colormap: &ColorMap) {
    buf.reserve(pixels.len() * format.bytes_per_pixel().max(1));

    match format.bits_per_pixel {
        8 => {
            for &pixel in pixels {
                let (r, g, b) = split_rgb(pixel);
                buf.put_u8(colormap.index_of(r, g, b));
            }
        }
        16 => {
            for &pixel in pixels {
                let (r, g, b) = split_rgb(pixel);
                let packed = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
                if format.big_endian {
                    buf.put_u16(packed);
                } else {
                    buf.put_u16_le(packed);
                }
            }
        }
        _ => {
            for &pixel in pixels {
                let (r, g, b) = split_rgb(pixel);
                buf.put_u8(r);
                buf.put_u8(g);
                buf.put_u8(b);
                buf.put_u8(0);
            }
        }
    }
}

/// Splits a capability-interface pixel into its channels: red lives in the
/// low byte, then green, then blue.
#[inline]
#[allow(clippy::cast_possible_truncation)] // intentional byte extraction
fn split_rgb(pixel: u32) -> (u8, u8, u8) {
    (pixel as u8, (pixel >> 8) as u8, (pixel >> 16) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u16, height: u16) -> Vec<u32> {
        (0..u32::from(width) * u32::from(height))
            .map(|i| if i % 2 == 0 { 0x00FF_0000 } else { 0x0000_00FF })
            .collect()
    }

    #[test]
    fn bounds_check_rejects_exactly_the_overflowing_rectangles() {
        // In bounds, including the exact-fit case.
        assert!(!exceeds_screen(0, 0, 800, 600, 800, 600));
        assert!(!exceeds_screen(799, 599, 1, 1, 800, 600));
        // Out of bounds on either axis.
        assert!(exceeds_screen(1, 0, 800, 600, 800, 600));
        assert!(exceeds_screen(0, 1, 800, 600, 800, 600));
        assert!(exceeds_screen(0, 0, 801, 600, 800, 600));
        assert!(exceeds_screen(0, 0, 800, 601, 800, 600));
        // u16 arithmetic must not wrap.
        assert!(exceeds_screen(u16::MAX, 0, u16::MAX, 1, u16::MAX, 1));
    }

    #[test]
    fn raw_update_32_bit_layout_and_length() {
        let map = ColorMap::new();
        let format = PixelFormat::host_default(32);
        let pixels = vec![0x00BB_8040u32; 6]; // b=0xBB g=0x80 r=0x40

        let mut buf = BytesMut::new();
        encode_framebuffer_update(&mut buf, 4, 2, 3, 2, &pixels, &format, &map);

        // header(4) + rect header(12) + 6 pixels * 4 bytes
        assert_eq!(buf.len(), 4 + 12 + 24);
        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        assert_eq!(&buf[4..16], &[0, 4, 0, 2, 0, 3, 0, 2, 0, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[0x40, 0x80, 0xBB, 0x00]);
    }

    #[test]
    fn raw_update_8_bit_payload_is_one_byte_per_pixel() {
        let map = ColorMap::new();
        let format = PixelFormat {
            bits_per_pixel: 8,
            depth: 8,
            ..PixelFormat::host_default(32)
        };
        let pixels = checkerboard(10, 4);

        let mut buf = BytesMut::new();
        encode_framebuffer_update(&mut buf, 0, 0, 10, 4, &pixels, &format, &map);

        assert_eq!(buf.len(), 4 + 12 + 40);
        // 0x00FF0000 is pure blue, 0x000000FF pure red in the snapshot
        // layout.
        assert_eq!(buf[16], map.index_of(0, 0, 255));
        assert_eq!(buf[17], map.index_of(255, 0, 0));
    }

    #[test]
    fn raw_update_16_bit_packs_565() {
        let map = ColorMap::new();
        let format = PixelFormat::host_default(16);
        // r=0xFF g=0x00 b=0x00 -> 0b11111_000000_00000 = 0xF800
        let pixels = vec![0x0000_00FFu32];

        let mut buf = BytesMut::new();
        encode_framebuffer_update(&mut buf, 0, 0, 1, 1, &pixels, &format, &map);
        assert_eq!(buf.len(), 4 + 12 + 2);
        assert_eq!(&buf[16..18], &0xF800u16.to_le_bytes());

        let mut be = PixelFormat::host_default(16);
        be.big_endian = true;
        let mut buf = BytesMut::new();
        encode_framebuffer_update(&mut buf, 0, 0, 1, 1, &pixels, &be, &map);
        assert_eq!(&buf[16..18], &0xF800u16.to_be_bytes());
    }

    #[test]
    fn desktop_resize_emits_two_rectangles_second_without_payload() {
        let map = ColorMap::new();
        let format = PixelFormat::host_default(32);
        let pixels = checkerboard(8, 4);

        let mut buf = BytesMut::new();
        encode_desktop_resize(&mut buf, 8, 4, &pixels, &format, &map);

        // rectangle count is 2
        assert_eq!(&buf[..4], &[0, 0, 0, 2]);
        // first rectangle: raw with full payload
        assert_eq!(&buf[4..16], &[0, 0, 0, 0, 0, 8, 0, 4, 0, 0, 0, 0]);
        // second rectangle starts right after the pixel payload and is a
        // bare header with encoding -223
        let second = 16 + 8 * 4 * 4;
        assert_eq!(
            &buf[second..second + 12],
            &[0, 0, 0, 0, 0, 8, 0, 4, 0xFF, 0xFF, 0xFF, 0x21]
        );
        // zero-length payload: the message ends with the marker header
        assert_eq!(buf.len(), second + 12);
    }
}
