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

//! rfbcast: the server side of the RFB 3.3 remote-framebuffer protocol.
//!
//! Any compliant VNC viewer can connect over a stream socket, negotiate
//! pixel format and (no-)security, and exchange raw screen rectangles,
//! keyboard events, pointer events and clipboard text. Screen capture and
//! input injection live behind the [`Display`] capability trait, so the
//! same protocol engine serves a desktop robot backend, a compositor hook
//! or the bundled headless double.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfbcast::{HeadlessDisplay, RfbServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let display = Arc::new(HeadlessDisplay::new(800, 600));
//!     let server = RfbServer::new(display, ServerConfig::default());
//!     server.listen(5900).await
//! }
//! ```
//!
//! Supported encodings are raw (0) and the desktop-size pseudo-encoding
//! (-223); supported pixel depths are 8, 16 and 32 bits per pixel.
//! Authentication, compressed encodings and multi-viewer arbitration are
//! out of scope.

pub mod colormap;
pub mod display;
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod wire;

pub use colormap::ColorMap;
pub use display::{Display, HeadlessDisplay, InjectedEvent, PointerButton};
pub use error::ProtocolError;
pub use protocol::PixelFormat;
pub use server::{RfbServer, ServerConfig};
pub use session::Session;
