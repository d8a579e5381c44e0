//! Socket proxy: expose a device-reachable debug endpoint locally
//!
//! Each local client connection obtains a fresh device-side connection
//! from the injected factory, then bytes are relayed until either side
//! closes. Device-side connection failures surface as `connectionError`
//! events on the bus rather than being thrown: the local client may
//! already be connected and waiting.

use std::future::Future;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use hotpush_core::prelude::*;
use hotpush_core::{EventBus, LiveSyncEvent};

/// Error code reported on the bus when the device side cannot be reached.
const DEVICE_CONNECT_ERROR_CODE: i32 = -1;

/// Read buffer size for the device→WebSocket pump.
const RELAY_BUF_SIZE: usize = 16 * 1024;

/// A running proxy listener.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// WebSocket URL of this endpoint (meaningful for WebSocket proxies).
    pub fn ws_url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}", self.local_addr)).expect("valid socket address URL")
    }

    /// Stop accepting new clients. In-flight relays run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.task.abort();
    }
}

/// Start a local TCP listener relaying every client to a fresh
/// device-side connection from `connection_factory`.
pub async fn create_tcp_proxy<F, Fut, S>(
    device_id: &str,
    connection_factory: F,
    bus: EventBus,
) -> Result<ProxyHandle>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let device_id = device_id.to_string();

    info!(device = %device_id, %local_addr, "tcp debug proxy listening");

    let task = tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = wait_true(&mut shutdown_rx) => break,
                accepted = listener.accept() => accepted,
            };

            let (mut client, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(device = %device_id, "proxy accept failed: {e}");
                    continue;
                }
            };
            debug!(device = %device_id, %peer, "proxy client connected");

            let device_stream = match connection_factory().await {
                Ok(stream) => stream,
                Err(e) => {
                    bus.emit(LiveSyncEvent::ConnectionError {
                        device_id: device_id.clone(),
                        message: e.to_string(),
                        code: DEVICE_CONNECT_ERROR_CODE,
                    });
                    continue; // client dropped
                }
            };

            let relay_device = device_id.clone();
            tokio::spawn(async move {
                let mut device_stream = device_stream;
                match tokio::io::copy_bidirectional(&mut client, &mut device_stream).await {
                    Ok((to_device, to_client)) => debug!(
                        device = %relay_device,
                        to_device, to_client, "proxy relay closed"
                    ),
                    Err(e) => debug!(device = %relay_device, "proxy relay ended: {e}"),
                }
            });
        }
        debug!(device = %device_id, "tcp debug proxy stopped");
    });

    Ok(ProxyHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}

/// Start a local WebSocket listener relaying binary messages to a fresh
/// device-side connection per client.
pub async fn create_web_socket_proxy<F, Fut, S>(
    device_id: &str,
    connection_factory: F,
    bus: EventBus,
) -> Result<ProxyHandle>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S>> + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let device_id = device_id.to_string();

    info!(device = %device_id, %local_addr, "websocket debug proxy listening");

    let task = tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = wait_true(&mut shutdown_rx) => break,
                accepted = listener.accept() => accepted,
            };

            let (client, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(device = %device_id, "proxy accept failed: {e}");
                    continue;
                }
            };
            debug!(device = %device_id, %peer, "websocket client connected");

            let device_stream = match connection_factory().await {
                Ok(stream) => stream,
                Err(e) => {
                    bus.emit(LiveSyncEvent::ConnectionError {
                        device_id: device_id.clone(),
                        message: e.to_string(),
                        code: DEVICE_CONNECT_ERROR_CODE,
                    });
                    continue;
                }
            };

            let relay_device = device_id.clone();
            tokio::spawn(async move {
                if let Err(e) = relay_web_socket(client, device_stream).await {
                    debug!(device = %relay_device, "websocket relay ended: {e}");
                }
            });
        }
        debug!(device = %device_id, "websocket debug proxy stopped");
    });

    Ok(ProxyHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}

/// Pump bytes between one accepted WebSocket client and a device stream.
async fn relay_web_socket<S>(client: TcpStream, device_stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws_stream = tokio_tungstenite::accept_async(client)
        .await
        .map_err(|e| Error::protocol(format!("websocket handshake: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (mut device_read, mut device_write) = tokio::io::split(device_stream);

    let mut buf = vec![0u8; RELAY_BUF_SIZE];
    loop {
        tokio::select! {
            message = ws_rx.next() => {
                match message {
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        device_write.write_all(&bytes).await?;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        device_write.write_all(text.as_bytes()).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Ping/pong handled by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(Error::protocol(format!("websocket read: {e}")));
                    }
                }
            }
            read = device_read.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                ws_tx
                    .send(WsMessage::Binary(buf[..n].to_vec().into()))
                    .await
                    .map_err(|e| Error::protocol(format!("websocket write: {e}")))?;
            }
        }
    }

    Ok(())
}

/// Resolve once the flag is `true`.
async fn wait_true(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
