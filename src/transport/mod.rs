//! WebSocket transport session.
//!
//! A [`TransportSession`] owns one duplex text-message connection at a time
//! and hands received frames to a [`MessageHandler`]. When the connection
//! closes for any reason the session waits a fixed delay and reconnects.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, error, info, warn};
use url::Url;

/// Receive-side callbacks of a session.
pub trait MessageHandler: Send + Sync {
    /// Connection established; `outbound` queues frames for this connection only.
    fn on_open(&self, outbound: Outbound);

    /// One text frame received, in wire order.
    fn on_message(&self, text: &str);

    /// Connection gone. The `Outbound` given to `on_open` is dead from here on.
    fn on_close(&self);
}

/// Non-blocking sending half of a connection.
///
/// Frames are queued and written by the session task, so callers never
/// wait on the network.
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Queue a frame. Returns false if the connection is already gone.
    pub fn send(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }
}

/// Create a detached outbound queue (used by tests and by the session itself)
pub fn outbound_channel() -> (Outbound, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbound { tx }, rx)
}

/// Connection parameters of a session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub url: Url,
    /// Skip TLS certificate and hostname validation
    pub insecure: bool,
    /// Fixed delay between a closed connection and the next attempt
    pub reconnect_delay: Duration,
}

/// Auto-reconnecting WebSocket session
pub struct TransportSession {
    config: SessionConfig,
}

impl TransportSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect, pump frames until the connection closes, wait, repeat.
    ///
    /// Never returns. Every failure is logged and followed by a reconnect
    /// after `reconnect_delay`; there is no retry limit.
    pub async fn run_forever(&self, handler: &dyn MessageHandler) {
        loop {
            match self.run_once(handler).await {
                Ok(()) => info!(url = %self.config.url, "WebSocket connection closed"),
                Err(e) => error!(url = %self.config.url, error = %format!("{e:#}"), "WebSocket session failed"),
            }

            debug!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Waiting before reconnect"
            );
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Run a single connection to completion
    async fn run_once(&self, handler: &dyn MessageHandler) -> Result<()> {
        let connector = self.connector()?;
        let (ws, _response) =
            connect_async_tls_with_config(self.config.url.as_str(), None, false, connector)
                .await
                .with_context(|| format!("Failed to connect to {}", self.config.url))?;

        info!(url = %self.config.url, insecure = self.config.insecure, "WebSocket connection opened");

        let (outbound, mut outbound_rx) = outbound_channel();
        // Keep one sender alive so the queue never reports closed while we pump
        let _keepalive = outbound.clone();
        handler.on_open(outbound);

        let (mut sink, mut stream) = ws.split();
        let result = loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => handler.on_message(&text),
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "WebSocket closed by server");
                        break Ok(());
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames carry nothing for us
                    }
                    Some(Err(e)) => break Err(anyhow::Error::new(e).context("WebSocket receive failed")),
                    None => break Ok(()),
                },

                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Err(anyhow::Error::new(e).context("WebSocket send failed"));
                    }
                }
            }
        };

        handler.on_close();
        if let Err(e) = sink.close().await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
        result
    }

    /// TLS connector for this session. `None` selects the library default,
    /// which validates certificates.
    fn connector(&self) -> Result<Option<Connector>> {
        if !self.config.insecure {
            return Ok(None);
        }

        warn!(url = %self.config.url, "TLS certificate validation disabled");
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .context("Failed to build insecure TLS connector")?;
        Ok(Some(Connector::NativeTls(tls)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_queues_frames_in_order() {
        let (outbound, mut rx) = outbound_channel();
        assert!(outbound.send("first".to_string()));
        assert!(outbound.send("second".to_string()));

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn outbound_reports_closed_connection() {
        let (outbound, rx) = outbound_channel();
        drop(rx);
        assert!(!outbound.send("lost".to_string()));
    }

    #[test]
    fn secure_session_uses_default_connector() {
        let session = TransportSession::new(SessionConfig {
            url: Url::parse("wss://example.com/api/websocket").unwrap(),
            insecure: false,
            reconnect_delay: Duration::from_secs(1),
        });
        assert!(session.connector().unwrap().is_none());
    }

    #[test]
    fn insecure_session_uses_native_tls_connector() {
        let session = TransportSession::new(SessionConfig {
            url: Url::parse("wss://192.168.1.20:8123/api/websocket").unwrap(),
            insecure: true,
            reconnect_delay: Duration::from_secs(1),
        });
        assert!(matches!(
            session.connector().unwrap(),
            Some(Connector::NativeTls(_))
        ));
    }
}
