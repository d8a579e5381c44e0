//! LiveSync orchestration
//!
//! One [`LiveSyncProcess`] per project directory: a debounced watcher,
//! one serialized action queue per device, and the per-device sync
//! pipeline (scan → plan → deliver → events). Failures on one device
//! never affect the others in the same process.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use hotpush_core::prelude::*;
use hotpush_core::{Device, EventBus, LiveSyncEvent, SyncBatch};
use hotpush_sync::{compute_batch, enumerate_project_files, HashManifest, IgnoreList};
use hotpush_transport::bundle::BundleTransport;
use hotpush_transport::notify::NotificationTransport;
use hotpush_transport::socket::SocketTransport;

use crate::queue::DeviceQueue;
use crate::settings::Settings;
use crate::watcher::{FileWatcher, WatcherConfig, WatcherMessage};

/// Opaque build step yielding an installable artifact. Supplied by the
/// caller; invoked only when a device has no prior successful sync.
pub type BuildAction =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<PathBuf>> + Send>> + Send + Sync>;

/// One target device of a LiveSync process.
pub struct DeviceDescriptor {
    pub device: Device,
    pub app_identifier: String,
    pub build_action: Option<BuildAction>,
}

/// Either device transport behind one delivery interface.
pub enum DeviceTransport<N> {
    Socket(SocketTransport),
    Bundle(BundleTransport<N>),
}

impl<N: NotificationTransport + Sync> DeviceTransport<N> {
    async fn load_manifest(&mut self) -> Result<Option<HashManifest>> {
        match self {
            DeviceTransport::Socket(t) => t.load_manifest().await,
            DeviceTransport::Bundle(t) => t.load_manifest().await,
        }
    }

    async fn deliver(&mut self, plan: &hotpush_sync::SyncPlan) -> Result<()> {
        match self {
            DeviceTransport::Socket(t) => t.deliver(plan).await,
            DeviceTransport::Bundle(t) => t.deliver(plan).await,
        }
    }

    fn manifest(&self) -> Option<&HashManifest> {
        match self {
            DeviceTransport::Socket(t) => t.manifest(),
            DeviceTransport::Bundle(t) => t.manifest(),
        }
    }
}

/// Transport plus the little bit of per-device sync state the pipeline
/// needs. Exclusively accessed through the device queue.
struct TransportState<N> {
    transport: DeviceTransport<N>,
    manifest_loaded: bool,
    synced_once: bool,
}

/// An error tagged with the pipeline stage it occurred in.
struct StagedError {
    stage: &'static str,
    error: Error,
}

fn staged(stage: &'static str) -> impl FnOnce(Error) -> StagedError {
    move |error| StagedError { stage, error }
}

/// Everything one queued sync operation needs, cheap to clone into the
/// device queue.
struct SyncContext<N> {
    device: Device,
    app_identifier: String,
    build_action: Option<BuildAction>,
    queue: Arc<DeviceQueue>,
    state: Arc<Mutex<TransportState<N>>>,
    bus: EventBus,
    project_dir: PathBuf,
    ignore: IgnoreList,
}

impl<N> Clone for SyncContext<N> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            app_identifier: self.app_identifier.clone(),
            build_action: self.build_action.clone(),
            queue: Arc::clone(&self.queue),
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
            project_dir: self.project_dir.clone(),
            ignore: self.ignore.clone(),
        }
    }
}

impl<N: NotificationTransport + Sync + 'static> SyncContext<N> {
    /// Append one sync run to this device's queue.
    fn trigger(&self, force_full: bool) {
        let ctx = self.clone();
        let accepted = self.queue.enqueue(async move {
            ctx.sync_once(force_full).await;
        });
        if accepted.is_err() {
            debug!(device = %self.device.id, "sync trigger refused: queue stopped");
        }
    }

    async fn sync_once(&self, force_full: bool) {
        self.bus.emit(LiveSyncEvent::SyncStarted {
            device_id: self.device.id.clone(),
            app_identifier: self.app_identifier.clone(),
        });

        match self.run_pipeline(force_full).await {
            Ok(Some(batch)) => {
                self.bus.emit(LiveSyncEvent::SyncExecuted {
                    device_id: self.device.id.clone(),
                    synced_files: batch
                        .files_to_sync
                        .iter()
                        .map(|p| p.device_path.clone())
                        .collect(),
                    removed_files: batch.files_to_remove.clone(),
                    is_full_sync: batch.is_full_sync,
                });
            }
            Ok(None) => {
                self.bus.emit(LiveSyncEvent::SyncNotification {
                    device_id: self.device.id.clone(),
                    message: "up to date".to_string(),
                });
            }
            Err(StagedError { error, .. }) if error.is_cancelled() => {
                debug!(device = %self.device.id, "sync cancelled");
            }
            Err(StagedError { stage, error }) => {
                error!(device = %self.device.id, stage, "sync failed: {error}");
                self.bus.emit(LiveSyncEvent::SyncError {
                    device_id: self.device.id.clone(),
                    stage: stage.to_string(),
                    message: error.to_string(),
                });
            }
        }
    }

    /// scan → manifest → build (first sync only) → plan → deliver.
    async fn run_pipeline(
        &self,
        force_full: bool,
    ) -> std::result::Result<Option<SyncBatch>, StagedError> {
        if !self.device.is_connected() {
            return Err(staged("precheck")(Error::DeviceUnreachable {
                device_id: self.device.id.clone(),
                state: format!("{:?}", self.device.reachability),
            }));
        }

        let files = enumerate_project_files(&self.project_dir, &self.ignore)
            .map_err(staged("scan"))?;

        let mut state = self.state.lock().await;

        if !state.manifest_loaded {
            match state.transport.load_manifest().await {
                Ok(_) => {}
                Err(Error::ManifestCorrupt { message }) => {
                    // Treated as "no manifest": the plan below becomes a
                    // full sync.
                    warn!(device = %self.device.id, "manifest corrupt ({message})");
                }
                Err(e) => return Err(staged("manifest")(e)),
            }
            state.manifest_loaded = true;
        }

        if !state.synced_once && state.transport.manifest().is_none() {
            if let Some(build) = &self.build_action {
                let artifact = (**build)().await.map_err(staged("build"))?;
                self.bus.emit(LiveSyncEvent::SyncNotification {
                    device_id: self.device.id.clone(),
                    message: format!("built {}", artifact.display()),
                });
            }
        }

        let manifest = state.transport.manifest().cloned();
        let plan = compute_batch(&files, manifest.as_ref(), force_full)
            .await
            .map_err(staged("plan"))?;

        if plan.is_noop() {
            return Ok(None);
        }

        state
            .transport
            .deliver(&plan)
            .await
            .map_err(staged("deliver"))?;
        state.synced_once = true;

        Ok(Some(plan.batch))
    }
}

/// A running LiveSync process for one project.
pub struct LiveSyncProcess<N> {
    project_dir: PathBuf,
    bus: EventBus,
    watcher: FileWatcher,
    contexts: HashMap<String, SyncContext<N>>,
    is_stopped: bool,
}

impl<N: NotificationTransport + Sync + 'static> LiveSyncProcess<N> {
    /// Start syncing `project_dir` to the given devices. Triggers an
    /// initial sync per device and begins watching for changes.
    pub fn start(
        project_dir: PathBuf,
        targets: Vec<(DeviceDescriptor, DeviceTransport<N>)>,
        settings: &Settings,
        bus: EventBus,
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(Error::config("no target devices"));
        }

        let ignore = IgnoreList::new(&settings.watcher.ignore)?;

        let mut contexts = HashMap::new();
        for (descriptor, transport) in targets {
            let device_id = descriptor.device.id.clone();
            let context = SyncContext {
                device: descriptor.device,
                app_identifier: descriptor.app_identifier,
                build_action: descriptor.build_action,
                queue: Arc::new(DeviceQueue::new(&device_id)),
                state: Arc::new(Mutex::new(TransportState {
                    transport,
                    manifest_loaded: false,
                    synced_once: false,
                })),
                bus: bus.clone(),
                project_dir: project_dir.clone(),
                ignore: ignore.clone(),
            };
            contexts.insert(device_id, context);
        }

        let mut watcher = FileWatcher::new(
            project_dir.clone(),
            WatcherConfig::new()
                .with_paths(settings.watcher.paths.iter().map(PathBuf::from).collect())
                .with_debounce_ms(settings.watcher.debounce_ms)
                .with_ignore(ignore),
        );
        let (watch_tx, watch_rx) = mpsc::channel(64);
        watcher.start(watch_tx)?;

        let process = Self {
            project_dir,
            bus,
            watcher,
            contexts,
            is_stopped: false,
        };

        process.spawn_dispatcher(watch_rx);
        process.trigger_all(false);

        Ok(process)
    }

    /// Forward debounced change batches to every device queue.
    fn spawn_dispatcher(&self, mut watch_rx: mpsc::Receiver<WatcherMessage>) {
        let contexts: Vec<SyncContext<N>> = self.contexts.values().cloned().collect();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            while let Some(message) = watch_rx.recv().await {
                match message {
                    WatcherMessage::Changed(paths) => {
                        debug!(changes = paths.len(), "dispatching sync to {} device(s)", contexts.len());
                        for ctx in &contexts {
                            ctx.trigger(false);
                        }
                    }
                    WatcherMessage::Error(message) => {
                        warn!("watcher error: {message}");
                        for ctx in &contexts {
                            bus.emit(LiveSyncEvent::SyncError {
                                device_id: ctx.device.id.clone(),
                                stage: "watch".to_string(),
                                message: message.clone(),
                            });
                        }
                    }
                }
            }
            debug!("watch dispatcher finished");
        });
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    /// Queue a sync run on every device.
    pub fn trigger_all(&self, force_full: bool) {
        for ctx in self.contexts.values() {
            ctx.trigger(force_full);
        }
    }

    /// Queue a sync run on one device.
    pub fn trigger_device(&self, device_id: &str, force_full: bool) -> bool {
        match self.contexts.get(device_id) {
            Some(ctx) => {
                ctx.trigger(force_full);
                true
            }
            None => false,
        }
    }

    /// Stop syncing to one device. The in-flight operation drains; queued
    /// ones are refused. Returns `true` when this was the last device and
    /// the whole process stopped.
    pub fn stop_device(&mut self, device_id: &str) -> bool {
        if let Some(ctx) = self.contexts.remove(device_id) {
            ctx.queue.stop();
            self.bus.emit(LiveSyncEvent::SyncStopped {
                device_id: device_id.to_string(),
            });
            info!(device = device_id, "livesync stopped");
        }

        if self.contexts.is_empty() {
            self.watcher.stop();
            self.is_stopped = true;
        }
        self.is_stopped
    }

    /// Stop the whole process: all device queues, then the watcher.
    pub fn stop(&mut self) {
        let ids = self.device_ids();
        for id in ids {
            self.stop_device(&id);
        }
        self.watcher.stop();
        self.is_stopped = true;
    }
}

/// Registry of LiveSync processes, keyed by canonicalized project dir.
pub struct LiveSyncCoordinator<N> {
    processes: HashMap<PathBuf, LiveSyncProcess<N>>,
    bus: EventBus,
}

impl<N: NotificationTransport + Sync + 'static> LiveSyncCoordinator<N> {
    pub fn new(bus: EventBus) -> Self {
        Self {
            processes: HashMap::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn key_for(project_dir: &Path) -> PathBuf {
        dunce::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf())
    }

    /// Start a LiveSync process for a project. At most one process per
    /// project directory.
    pub fn start_sync(
        &mut self,
        project_dir: &Path,
        targets: Vec<(DeviceDescriptor, DeviceTransport<N>)>,
        settings: &Settings,
    ) -> Result<&LiveSyncProcess<N>> {
        let key = Self::key_for(project_dir);
        if self.processes.contains_key(&key) {
            return Err(Error::config(format!(
                "already syncing {}",
                key.display()
            )));
        }

        let process =
            LiveSyncProcess::start(key.clone(), targets, settings, self.bus.clone())?;
        Ok(self.processes.entry(key).or_insert(process))
    }

    pub fn get(&self, project_dir: &Path) -> Option<&LiveSyncProcess<N>> {
        self.processes.get(&Self::key_for(project_dir))
    }

    pub fn is_active(&self, project_dir: &Path) -> bool {
        self.processes.contains_key(&Self::key_for(project_dir))
    }

    /// Stop some devices of a project, or the whole process when
    /// `device_ids` is `None`. The process is destroyed once its last
    /// device stops.
    pub fn stop_sync(&mut self, project_dir: &Path, device_ids: Option<&[String]>) -> Result<()> {
        let key = Self::key_for(project_dir);
        let Some(process) = self.processes.get_mut(&key) else {
            return Err(Error::config(format!(
                "no active livesync for {}",
                key.display()
            )));
        };

        match device_ids {
            Some(ids) => {
                for id in ids {
                    process.stop_device(id);
                }
            }
            None => process.stop(),
        }

        if process.is_stopped() {
            self.processes.remove(&key);
        }
        Ok(())
    }
}
