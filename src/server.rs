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

//! TCP listener turning accepted connections into sessions.
//!
//! Each accepted socket becomes one [`Session`](crate::session::Session)
//! driven by its own tokio task. Per-connection failures are logged and
//! dropped there; they never affect other connections or the accept loop.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::colormap::ColorMap;
use crate::display::Display;
use crate::session::Session;

/// Server-wide settings shared by every session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Desktop name sent to viewers in `ServerInit` (truncated to 255
    /// bytes on the wire).
    pub desktop_name: String,
    /// The host display depth the default pixel format is derived from;
    /// 24 is promoted to 32 during negotiation.
    pub host_depth: u8,
    /// Closes a connection whose viewer sends nothing for this long.
    /// `None` waits forever, which matches the bare protocol.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            desktop_name: "rfbcast".to_string(),
            host_depth: 32,
            idle_timeout: None,
        }
    }
}

/// An RFB server: one TCP listener, one session per accepted connection.
#[derive(Clone)]
pub struct RfbServer {
    display: Arc<dyn Display>,
    colormap: Arc<ColorMap>,
    config: ServerConfig,
}

impl RfbServer {
    /// Creates a server around the given display capabilities.
    ///
    /// The 8-bit color map is built here, once, and shared read-only with
    /// every session for the lifetime of the server.
    #[must_use]
    pub fn new(display: Arc<dyn Display>, config: ServerConfig) -> Self {
        Self {
            display,
            colormap: Arc::new(ColorMap::new()),
            config,
        }
    }

    /// Listens on `port` and serves viewers until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns an error only if binding the listener fails; accept errors
    /// are logged and retried.
    pub async fn listen(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        info!("RFB server listening on port {port}");

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            };
            info!("viewer connected from {addr}");

            // Immediate delivery matters more than throughput for input
            // echo and small updates.
            if let Err(e) = stream.set_nodelay(true) {
                warn!("failed to set TCP_NODELAY for {addr}: {e}");
            }

            let display = self.display.clone();
            let colormap = self.colormap.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let mut session = Session::new(stream, display, colormap, &config);
                match session.run().await {
                    Ok(()) => info!("viewer {addr} disconnected"),
                    Err(e) if e.is_disconnect() => info!("viewer {addr} connection closed: {e}"),
                    Err(e) => warn!("viewer {addr} dropped: {e}"),
                }
            });
        }
    }
}
