//! Binary socket transport (Android family)
//!
//! Delivers a [`SyncPlan`] to the in-app LiveSync listener over TCP.
//! Delivery is all-or-nothing: the local manifest mirror moves to the
//! post-batch state only once the device acknowledges the commit marker.
//! A transient I/O failure earns exactly one reconnect-and-replay of the
//! entire batch; a second failure is fatal for the device until the next
//! change event.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use hotpush_core::prelude::*;
use hotpush_core::{Device, DeviceAppData};
use hotpush_sync::{HashManifest, SyncPlan};

use crate::archive;
use crate::protocol::{read_frame, write_frame, Frame, ACK_SUCCESS, PROTOCOL_VERSION};

/// Default port the in-app LiveSync listener binds (forwarded to the host
/// by the external device layer).
pub const DEFAULT_LIVESYNC_PORT: u16 = 18183;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SocketTransportConfig {
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl Default for SocketTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// LiveSync client for one (device, app) pair.
pub struct SocketTransport {
    device: Device,
    app: DeviceAppData,
    addr: SocketAddr,
    config: SocketTransportConfig,
    /// Local mirror of the device manifest. Seeded by [`load_manifest`],
    /// committed only on `Ack(success)`.
    ///
    /// [`load_manifest`]: SocketTransport::load_manifest
    manifest: Option<HashManifest>,
}

impl SocketTransport {
    pub fn new(device: Device, app: DeviceAppData, addr: SocketAddr) -> Self {
        Self::with_config(device, app, addr, SocketTransportConfig::default())
    }

    pub fn with_config(
        device: Device,
        app: DeviceAppData,
        addr: SocketAddr,
        config: SocketTransportConfig,
    ) -> Self {
        Self {
            device,
            app,
            addr,
            config,
            manifest: None,
        }
    }

    pub fn app(&self) -> &DeviceAppData {
        &self.app
    }

    /// Current local manifest mirror (pre-batch state until a delivery
    /// is acknowledged).
    pub fn manifest(&self) -> Option<&HashManifest> {
        self.manifest.as_ref()
    }

    fn precheck(&self) -> Result<()> {
        if self.device.is_connected() {
            Ok(())
        } else {
            Err(Error::DeviceUnreachable {
                device_id: self.device.id.clone(),
                state: format!("{:?}", self.device.reachability),
            })
        }
    }

    /// Connect and run the version handshake.
    async fn open(&self) -> Result<TcpStream> {
        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| Error::timeout("device connect", self.config.connect_timeout))??;

        stream.write_all(&[PROTOCOL_VERSION]).await?;

        let mut echo = [0u8; 1];
        timeout(self.config.connect_timeout, stream.read_exact(&mut echo))
            .await
            .map_err(|_| Error::timeout("version handshake", self.config.connect_timeout))??;

        if echo[0] != PROTOCOL_VERSION {
            return Err(Error::ProtocolVersionMismatch {
                device_id: self.device.id.clone(),
                client: PROTOCOL_VERSION,
                device: echo[0],
            });
        }

        Ok(stream)
    }

    /// Fetch the device-side manifest (the protocol's read primitive).
    ///
    /// Updates the local mirror. A corrupt manifest clears the mirror and
    /// is reported so the diff layer can fall back to a full sync.
    pub async fn load_manifest(&mut self) -> Result<Option<HashManifest>> {
        self.precheck()?;
        let mut stream = self.open().await?;

        write_frame(&mut stream, &Frame::ReadManifest).await?;
        let frame = timeout(self.config.ack_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| Error::timeout("manifest query", self.config.ack_timeout))??;

        let manifest = match frame {
            Frame::ManifestData { manifest: None } => None,
            Frame::ManifestData {
                manifest: Some(bytes),
            } => match HashManifest::from_json(&bytes) {
                Ok(m) => Some(m),
                Err(e) => {
                    self.manifest = None;
                    return Err(e);
                }
            },
            other => {
                return Err(Error::protocol(format!(
                    "expected ManifestData, got opcode {}",
                    other.opcode()
                )))
            }
        };

        self.manifest = manifest.clone();
        debug!(
            device = %self.device.id,
            entries = manifest.as_ref().map_or(0, HashManifest::len),
            "loaded device manifest"
        );
        Ok(manifest)
    }

    /// Deliver a planned batch.
    ///
    /// On success the local mirror reflects the delivered batch exactly.
    /// On any failure the mirror keeps its pre-batch value.
    pub async fn deliver(&mut self, plan: &SyncPlan) -> Result<()> {
        self.precheck()?;

        if plan.batch.is_empty() {
            debug!(device = %self.device.id, "empty batch, nothing to deliver");
            return Ok(());
        }

        // Load contents up front so a replay pushes identical bytes.
        let contents = archive::load_batch_contents(&plan.batch).await?;

        match self.try_deliver(plan, &contents).await {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                warn!(
                    device = %self.device.id,
                    "sync interrupted ({e}), reconnecting to replay batch"
                );
                self.try_deliver(plan, &contents).await.map_err(|retry| {
                    Error::sync_failed(&self.device.id, "replay", retry.to_string())
                })?;
            }
            Err(e) => return Err(e),
        }

        self.manifest
            .get_or_insert_with(HashManifest::new)
            .commit_batch(&plan.batch, &plan.hashes);
        info!(
            device = %self.device.id,
            files = plan.batch.file_count(),
            removed = plan.batch.files_to_remove.len(),
            full = plan.batch.is_full_sync,
            "batch delivered"
        );
        Ok(())
    }

    /// One connect-stream-commit attempt over a fresh connection.
    async fn try_deliver(&self, plan: &SyncPlan, contents: &[(String, Vec<u8>)]) -> Result<()> {
        let mut stream = self.open().await?;

        if plan.batch.is_full_sync && archive::should_archive(contents) {
            debug!(
                device = %self.device.id,
                files = contents.len(),
                "packaging full sync as archive"
            );
            let archive = archive::pack_entries_blocking(contents.to_vec()).await?;
            write_frame(&mut stream, &Frame::WriteArchive { archive }).await?;
        } else {
            for (device_path, content) in contents {
                write_frame(
                    &mut stream,
                    &Frame::CreateOrUpdateFile {
                        device_path: device_path.clone(),
                        content: content.clone(),
                    },
                )
                .await?;
            }
            for device_path in &plan.batch.files_to_remove {
                write_frame(
                    &mut stream,
                    &Frame::DeleteFile {
                        device_path: device_path.clone(),
                    },
                )
                .await?;
            }
        }

        write_frame(&mut stream, &Frame::DoSync).await?;

        let frame = timeout(self.config.ack_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| Error::timeout("sync ack", self.config.ack_timeout))??;

        match frame {
            Frame::Ack {
                status: ACK_SUCCESS,
            } => Ok(()),
            Frame::Ack { status } => Err(Error::protocol(format!(
                "device rejected batch with status {status}"
            ))),
            other => Err(Error::protocol(format!(
                "expected Ack, got opcode {}",
                other.opcode()
            ))),
        }
    }
}
