//! hotpush - push file changes to running mobile apps
//!
//! Binary entry point: wires the LiveSync coordinator to devices named on
//! the command line and prints bus events as JSON lines for consumption
//! by editors and wrappers. Device discovery, native builds and app
//! install are external; this binary only needs device identifiers and,
//! for iOS targets, the host-visible sync mount.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpStream;

use hotpush_app::{
    load_settings, DeviceDescriptor, DeviceTransport, LiveSyncCoordinator, Settings,
};
use hotpush_core::prelude::*;
use hotpush_core::{Device, EventBus, Platform, Reachability};
use hotpush_debug::{create_tcp_proxy, create_web_socket_proxy};
use hotpush_transport::bundle::{BundleTarget, BundleTransport};
use hotpush_transport::socket::{SocketTransport, SocketTransportConfig};
use hotpush_transport::{resolve_device_app_data, NotificationTransport};

/// hotpush - LiveSync for mobile app development
#[derive(Parser, Debug)]
#[command(name = "hotpush")]
#[command(about = "Push file changes to running mobile apps without reinstalling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a project and live-sync changes to the given devices
    Run {
        /// Path to the app project (defaults to the current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Target device as `<id>:<platform>[:emulator]`
        /// (e.g. `emulator-5554:android:emulator`, `00008110-X:ios`)
        #[arg(short, long = "device", required = true)]
        devices: Vec<String>,

        /// App identifier (bundle/package id) installed on the devices
        #[arg(long)]
        app_id: String,

        /// Host-visible sync root for an iOS target, as `<id>=<path>`
        /// (simulator sandbox or mounted device container)
        #[arg(long = "mount")]
        mounts: Vec<String>,

        /// Force a full resync on the first push
        #[arg(long)]
        full: bool,

        /// Override the LiveSync port from config
        #[arg(long)]
        port: Option<u16>,
    },

    /// Expose a device debug endpoint as a local listener
    Proxy {
        /// Device identifier (reported in connection-error events)
        #[arg(long)]
        device: String,

        /// Device-reachable endpoint, as `<host>:<port>`
        #[arg(long)]
        endpoint: String,

        /// Serve WebSocket instead of raw TCP
        #[arg(long)]
        ws: bool,
    },

    /// Write a default .hotpush/config.toml into the project
    Init {
        /// Path to the app project (defaults to the current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

/// Stand-in notification channel for hosts without a device signaling
/// bridge: posts are logged, and the app must be reloaded manually when
/// it does not pick the change up on its own.
#[derive(Clone, Default)]
struct ManualReloadNotifications;

impl NotificationTransport for ManualReloadNotifications {
    async fn post(&self, name: &str, _app_identifier: &str) -> Result<()> {
        info!("posted {name}; reload the app manually if it does not refresh");
        Ok(())
    }

    async fn await_once(
        &self,
        name: &str,
        _app_identifier: &str,
        timeout: Duration,
    ) -> Result<()> {
        tokio::time::sleep(timeout).await;
        Err(Error::timeout(name.to_string(), timeout))
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    hotpush_core::logging::init()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            path,
            devices,
            app_id,
            mounts,
            full,
            port,
        } => run(path, devices, app_id, mounts, full, port).await?,
        Command::Proxy {
            device,
            endpoint,
            ws,
        } => proxy(device, endpoint, ws).await?,
        Command::Init { path } => {
            let project = resolve_project(path)?;
            hotpush_app::init_config_dir(&project)?;
            eprintln!("wrote {}", project.join(".hotpush/config.toml").display());
        }
    }

    Ok(())
}

fn resolve_project(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = path
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| Error::config("cannot determine project directory"))?;
    if !path.is_dir() {
        return Err(Error::config(format!(
            "not a directory: {}",
            path.display()
        )));
    }
    Ok(path)
}

async fn run(
    path: Option<PathBuf>,
    device_specs: Vec<String>,
    app_id: String,
    mount_specs: Vec<String>,
    full: bool,
    port: Option<u16>,
) -> Result<()> {
    let project = resolve_project(path)?;
    let mut settings = load_settings(&project);
    if let Some(port) = port {
        settings.sync.port = port;
    }

    let mounts = parse_mounts(&mount_specs)?;
    let mut targets = Vec::new();
    for spec in &device_specs {
        let device = parse_device_spec(spec)?;
        let transport = build_transport(&device, &app_id, &mounts, full, &settings)?;
        targets.push((
            DeviceDescriptor {
                device: device.clone(),
                app_identifier: app_id.clone(),
                build_action: None,
            },
            transport,
        ));
        eprintln!("syncing to {}", device.display_name());
    }

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut coordinator = LiveSyncCoordinator::new(bus);
    coordinator.start_sync(&project, targets, &settings)?;

    eprintln!("watching {} (ctrl-c to stop)", project.display());
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::config(format!("signal handler: {e}")))?;

    coordinator.stop_sync(&project, None)?;
    Ok(())
}

async fn proxy(device: String, endpoint: String, ws: bool) -> Result<()> {
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let target = endpoint.clone();
    let factory = move || {
        let target = target.clone();
        async move { Ok(TcpStream::connect(&target).await?) }
    };

    let handle = if ws {
        create_web_socket_proxy(&device, factory, bus).await?
    } else {
        create_tcp_proxy(&device, factory, bus).await?
    };

    if ws {
        eprintln!("debug endpoint at {}", handle.ws_url());
    } else {
        eprintln!("debug endpoint at {}", handle.local_addr());
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::config(format!("signal handler: {e}")))?;
    handle.shutdown();
    Ok(())
}

/// Parse `<id>:<platform>[:emulator]`.
fn parse_device_spec(spec: &str) -> Result<Device> {
    let mut parts = spec.split(':');
    let id = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::config(format!("bad device spec {spec:?}")))?;
    let platform_raw = parts
        .next()
        .ok_or_else(|| Error::config(format!("device spec {spec:?} is missing a platform")))?;
    let platform = Platform::parse(platform_raw)
        .ok_or_else(|| Error::config(format!("unknown platform {platform_raw:?}")))?;
    let emulator = match parts.next() {
        None => false,
        Some("emulator") | Some("simulator") => true,
        Some(other) => {
            return Err(Error::config(format!(
                "unexpected device spec suffix {other:?}"
            )))
        }
    };

    Ok(Device {
        id: id.to_string(),
        name: id.to_string(),
        platform,
        emulator,
        reachability: Reachability::Connected,
    })
}

/// Parse `<device-id>=<path>` mount mappings.
fn parse_mounts(specs: &[String]) -> Result<HashMap<String, PathBuf>> {
    let mut mounts = HashMap::new();
    for spec in specs {
        let (id, path) = spec
            .split_once('=')
            .ok_or_else(|| Error::config(format!("bad mount spec {spec:?}")))?;
        mounts.insert(id.to_string(), PathBuf::from(path));
    }
    Ok(mounts)
}

fn build_transport(
    device: &Device,
    app_id: &str,
    mounts: &HashMap<String, PathBuf>,
    force_full: bool,
    settings: &Settings,
) -> Result<DeviceTransport<ManualReloadNotifications>> {
    match device.platform {
        Platform::Android => {
            let app = resolve_device_app_data(device, app_id, false, true, force_full, None)?;
            let addr = format!("127.0.0.1:{}", settings.sync.port)
                .parse()
                .map_err(|e| Error::config(format!("bad sync address: {e}")))?;
            let config = SocketTransportConfig {
                connect_timeout: Duration::from_secs(settings.sync.connect_timeout_secs),
                ack_timeout: Duration::from_secs(settings.sync.ack_timeout_secs),
            };
            Ok(DeviceTransport::Socket(SocketTransport::with_config(
                device.clone(),
                app,
                addr,
                config,
            )))
        }
        Platform::Ios => {
            let mount = mounts.get(&device.id).ok_or_else(|| {
                Error::config(format!(
                    "iOS device {} needs a --mount {}=<path> mapping",
                    device.id, device.id
                ))
            })?;
            let app = resolve_device_app_data(
                device,
                app_id,
                false,
                true,
                force_full,
                Some(mount),
            )?;
            let target = if device.emulator {
                BundleTarget::Simulator {
                    sync_root: PathBuf::from(&app.device_project_root),
                }
            } else {
                BundleTarget::Physical {
                    sync_root: mount.join("LiveSync"),
                    archive_drop: mount.join("sync.zip"),
                }
            };
            Ok(DeviceTransport::Bundle(BundleTransport::new(
                device.clone(),
                app,
                target,
                ManualReloadNotifications,
            )))
        }
    }
}

/// One JSON line per bus event, stamped with the wall clock.
fn print_event(event: &hotpush_core::LiveSyncEvent) {
    let line = serde_json::json!({
        "ts": chrono::Utc::now().to_rfc3339(),
        "payload": event,
    });
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_spec_android_emulator() {
        let device = parse_device_spec("emulator-5554:android:emulator").unwrap();
        assert_eq!(device.id, "emulator-5554");
        assert_eq!(device.platform, Platform::Android);
        assert!(device.emulator);
    }

    #[test]
    fn test_parse_device_spec_ios_physical() {
        let device = parse_device_spec("00008110-X:ios").unwrap();
        assert_eq!(device.platform, Platform::Ios);
        assert!(!device.emulator);
    }

    #[test]
    fn test_parse_device_spec_rejects_garbage() {
        assert!(parse_device_spec("no-platform").is_err());
        assert!(parse_device_spec(":android").is_err());
        assert!(parse_device_spec("x:webos").is_err());
        assert!(parse_device_spec("x:ios:rooted").is_err());
    }

    #[test]
    fn test_parse_mounts() {
        let mounts = parse_mounts(&["iphone-a=/mnt/iphone".to_string()]).unwrap();
        assert_eq!(mounts["iphone-a"], PathBuf::from("/mnt/iphone"));
        assert!(parse_mounts(&["nope".to_string()]).is_err());
    }
}
